//! Dense containers passed between the feature pipeline and the encoder.

use crate::error::{Result, SpeakerError};

/// Row-major 2-D matrix.
///
/// For encoder input the rows are frames (time) and the columns are
/// feature bins. [`crate::AudioProcessor::melspectrogram`] returns the
/// opposite layout; call [`FeatureMatrix::transpose`] on its output.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl FeatureMatrix {
    /// Creates a matrix from row-major data.
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if rows * cols != data.len() {
            return Err(SpeakerError::InvalidFeatures(format!(
                "{rows}x{cols} matrix needs {} values, got {}",
                rows * cols,
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Creates a matrix from rows, e.g. the `[num_frames][num_mels]`
    /// output of a filterbank.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        let n = rows.len();
        let mut data = Vec::with_capacity(n * cols);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != cols {
                return Err(SpeakerError::InvalidFeatures(format!(
                    "row {i} has {} values, expected {cols}",
                    row.len()
                )));
            }
            data.extend(row);
        }
        Ok(Self {
            rows: n,
            cols,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Row `i`, or `None` past the last row.
    pub fn row(&self, i: usize) -> Option<&[f32]> {
        if i >= self.rows {
            return None;
        }
        self.data.get(i * self.cols..(i + 1) * self.cols)
    }

    pub fn transpose(&self) -> Self {
        let mut data = vec![0.0f32; self.data.len()];
        for r in 0..self.rows {
            for c in 0..self.cols {
                data[c * self.rows + r] = self.data[r * self.cols + c];
            }
        }
        Self {
            rows: self.cols,
            cols: self.rows,
            data,
        }
    }
}

impl TryFrom<Vec<Vec<f32>>> for FeatureMatrix {
    type Error = SpeakerError;

    fn try_from(rows: Vec<Vec<f32>>) -> Result<Self> {
        Self::from_rows(rows)
    }
}

/// Batch of equally-shaped `frames x dim` feature matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBatch {
    batch: usize,
    frames: usize,
    dim: usize,
    data: Vec<f32>,
}

impl FeatureBatch {
    /// Stacks matrices into a batch. All matrices must share one shape.
    pub fn stack(matrices: Vec<FeatureMatrix>) -> Result<Self> {
        let Some(first) = matrices.first() else {
            return Err(SpeakerError::InvalidFeatures("empty batch".into()));
        };
        let (frames, dim) = (first.rows, first.cols);
        let batch = matrices.len();
        let mut data = Vec::with_capacity(batch * frames * dim);
        for m in matrices {
            if m.rows != frames || m.cols != dim {
                return Err(SpeakerError::InvalidFeatures(format!(
                    "batch shape mismatch: {}x{} vs {frames}x{dim}",
                    m.rows, m.cols
                )));
            }
            data.extend(m.data);
        }
        Ok(Self {
            batch,
            frames,
            dim,
            data,
        })
    }

    /// `(batch, frames, dim)`.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.batch, self.frames, self.dim)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// The `i`-th `frames x dim` item, row-major. `None` past the end.
    pub fn item(&self, i: usize) -> Option<&[f32]> {
        if i >= self.batch {
            return None;
        }
        let n = self.frames * self.dim;
        self.data.get(i * n..(i + 1) * n)
    }
}

/// A single utterance becomes a batch of one.
impl From<FeatureMatrix> for FeatureBatch {
    fn from(m: FeatureMatrix) -> Self {
        Self {
            batch: 1,
            frames: m.rows,
            dim: m.cols,
            data: m.data,
        }
    }
}

/// Encoder output: one embedding row per batch item.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EmbeddingBatch {
    rows: Vec<Vec<f32>>,
}

impl EmbeddingBatch {
    pub fn new(rows: Vec<Vec<f32>>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, i: usize) -> Option<&[f32]> {
        self.rows.get(i).map(Vec::as_slice)
    }

    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Vec<f32>> {
        self.rows
    }

    /// Takes the first row, consuming the batch.
    pub fn into_first(self) -> Option<Vec<f32>> {
        self.rows.into_iter().next()
    }
}
