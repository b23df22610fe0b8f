//! Conditioning inputs handed to the acoustic model.
//!
//! An acoustic model declares at construction whether it looks voices up in
//! a discrete speaker-id table or takes continuous x-vectors. The two modes
//! are mutually exclusive per forward pass.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpeakerError};

/// What the acoustic model expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditioningMode {
    /// Integer ids into an embedding table of `num_speakers` rows.
    SpeakerIds { num_speakers: usize },
    /// Continuous vectors of length `dim`.
    XVectors { dim: usize },
}

/// One batch of conditioning, serialized under its field name:
/// `{"speaker_ids": [0, 3]}` or `{"x_vectors": [[0.1, ...], ...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditioningInput {
    SpeakerIds(Vec<usize>),
    XVectors(Vec<Vec<f64>>),
}

impl ConditioningInput {
    /// Field name the acoustic model reads this input from.
    pub fn key(&self) -> &'static str {
        match self {
            Self::SpeakerIds(_) => "speaker_ids",
            Self::XVectors(_) => "x_vectors",
        }
    }

    pub fn batch_size(&self) -> usize {
        match self {
            Self::SpeakerIds(ids) => ids.len(),
            Self::XVectors(vectors) => vectors.len(),
        }
    }

    /// Checks the input against the model's declared mode.
    pub fn validate(&self, mode: &ConditioningMode) -> Result<()> {
        match (self, mode) {
            (Self::SpeakerIds(ids), ConditioningMode::SpeakerIds { num_speakers }) => {
                if let Some(&id) = ids.iter().find(|&&id| id >= *num_speakers) {
                    return Err(SpeakerError::Conditioning(format!(
                        "speaker id {id} out of range for {num_speakers} speakers"
                    )));
                }
                Ok(())
            }
            (Self::XVectors(vectors), ConditioningMode::XVectors { dim }) => {
                if let Some(v) = vectors.iter().find(|v| v.len() != *dim) {
                    return Err(SpeakerError::DimensionMismatch {
                        expected: *dim,
                        got: v.len(),
                    });
                }
                Ok(())
            }
            (input, mode) => Err(SpeakerError::Conditioning(format!(
                "model expects {mode:?}, got {}",
                input.key()
            ))),
        }
    }
}
