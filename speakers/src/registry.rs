//! Speaker registry: id mapping, x-vector table and an optional encoder.

use std::path::{Path, PathBuf};

use rand::Rng;

use crate::conditioning::{ConditioningInput, ConditioningMode};
use crate::encoder::EncoderAdapter;
use crate::error::{Result, SpeakerError};
use crate::features::{EmbeddingBatch, FeatureBatch};
use crate::ids::{SpeakerIdMap, SpeakerItem};
use crate::io;
use crate::xvector::{Sampling, XVectorTable};

/// How a registry got its data. Recorded in application order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Ids derived from corpus items.
    Items { count: usize },
    /// X-vector table loaded from a document.
    XVectorsFile(PathBuf),
    /// Id mapping loaded from a document.
    SpeakerIdsFile(PathBuf),
}

/// Manages the multi-speaker setup of a TTS model.
///
/// Three scenarios are covered:
///
/// 1. Models with a speaker embedding table only need the name -> id
///    mapping ([`SpeakerRegistry::parse_speakers_from_items`],
///    [`SpeakerRegistry::load_ids_file`]).
/// 2. Models conditioned on precomputed x-vectors read them from a table
///    document ([`SpeakerRegistry::load_x_vectors_file`]).
/// 3. X-vectors computed at inference time go through an attached
///    [`EncoderAdapter`].
///
/// The x-vector document format is:
///
/// ```text
/// {
///     "clip_name.wav": {
///         "name": "speakerA",
///         "embedding": [<x_vector_values>]
///     },
///     ...
/// }
/// ```
#[derive(Debug, Default)]
pub struct SpeakerRegistry {
    speaker_ids: SpeakerIdMap,
    x_vectors: XVectorTable,
    speaker_names: Vec<String>,
    clip_ids: Vec<String>,
    encoder: Option<EncoderAdapter>,
    sources: Vec<Source>,
}

impl SpeakerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder<'a>() -> SpeakerRegistryBuilder<'a> {
        SpeakerRegistryBuilder::default()
    }

    /// Number of speakers in the id mapping.
    pub fn num_speakers(&self) -> usize {
        self.speaker_ids.len()
    }

    /// Dimension of the stored x-vectors, taken from the first entry.
    pub fn x_vector_dim(&self) -> Result<usize> {
        self.x_vectors.dim().ok_or(SpeakerError::EmptyTable)
    }

    /// Replaces the id mapping with ids derived from `items`.
    pub fn parse_speakers_from_items<I: SpeakerItem>(
        &mut self,
        items: &[I],
    ) -> (&SpeakerIdMap, usize) {
        self.speaker_ids = SpeakerIdMap::from_items(items);
        self.sources.push(Source::Items { count: items.len() });
        (&self.speaker_ids, self.speaker_ids.len())
    }

    pub fn save_ids_file(&self, path: impl AsRef<Path>) -> Result<()> {
        io::save_speaker_ids(path.as_ref(), &self.speaker_ids)
    }

    pub fn load_ids_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.speaker_ids = io::load_speaker_ids(path)?;
        self.sources.push(Source::SpeakerIdsFile(path.to_path_buf()));
        Ok(())
    }

    pub fn save_x_vectors_file(&self, path: impl AsRef<Path>) -> Result<()> {
        io::save_x_vectors(path.as_ref(), &self.x_vectors)
    }

    /// Loads an x-vector table and refreshes the derived indices.
    ///
    /// The id mapping is rebuilt from the speakers present in the table.
    pub fn load_x_vectors_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let table = io::load_x_vectors(path)?;
        self.speaker_names = table.speaker_names();
        self.clip_ids = table.clip_ids();
        self.speaker_ids = SpeakerIdMap::from_names(self.speaker_names.iter().map(String::as_str));
        self.x_vectors = table;
        self.sources.push(Source::XVectorsFile(path.to_path_buf()));
        Ok(())
    }

    pub fn get_x_vector_by_clip(&self, clip_id: &str) -> Result<&[f64]> {
        self.x_vectors
            .get(clip_id)
            .map(|e| e.embedding.as_slice())
            .ok_or_else(|| SpeakerError::NotFound {
                clip_id: clip_id.to_string(),
            })
    }

    /// All x-vectors of `speaker` in stored order. Unknown speakers yield
    /// an empty list.
    pub fn get_x_vectors_by_speaker(&self, speaker: &str) -> Vec<&[f64]> {
        self.x_vectors.embeddings_by_speaker(speaker)
    }

    /// Mean x-vector of `speaker`. [`Sampling::Random`] uses the thread rng.
    pub fn get_mean_x_vector(&self, speaker: &str, sampling: Sampling) -> Result<Vec<f64>> {
        self.get_mean_x_vector_with_rng(speaker, sampling, &mut rand::thread_rng())
    }

    pub fn get_mean_x_vector_with_rng<R: Rng + ?Sized>(
        &self,
        speaker: &str,
        sampling: Sampling,
        rng: &mut R,
    ) -> Result<Vec<f64>> {
        self.x_vectors.mean_by_speaker(speaker, sampling, rng)
    }

    pub fn get_speakers(&self) -> &SpeakerIdMap {
        &self.speaker_ids
    }

    /// Sorted distinct speaker names of the last loaded x-vector table.
    pub fn speaker_names(&self) -> &[String] {
        &self.speaker_names
    }

    /// Sorted clip ids of the last loaded x-vector table.
    pub fn get_clips(&self) -> &[String] {
        &self.clip_ids
    }

    pub fn x_vectors(&self) -> &XVectorTable {
        &self.x_vectors
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    /// Attaches an encoder, replacing any previous one.
    pub fn set_encoder(&mut self, encoder: EncoderAdapter) {
        self.encoder = Some(encoder);
    }

    pub fn encoder(&self) -> Option<&EncoderAdapter> {
        self.encoder.as_ref()
    }

    fn require_encoder(&self) -> Result<&EncoderAdapter> {
        self.encoder.as_ref().ok_or(SpeakerError::EncoderNotInitialized)
    }

    pub fn compute_x_vector(&self, features: impl Into<FeatureBatch>) -> Result<EmbeddingBatch> {
        self.require_encoder()?.compute_x_vector(features)
    }

    pub fn compute_x_vector_from_clip(&self, wav_file: impl AsRef<Path>) -> Result<Vec<f64>> {
        self.require_encoder()?.compute_x_vector_from_clip(wav_file.as_ref())
    }

    pub fn compute_x_vector_from_clips<P: AsRef<Path>>(
        &self,
        wav_files: &[P],
    ) -> Result<Vec<f64>> {
        self.require_encoder()?.compute_x_vector_from_clips(wav_files)
    }

    /// Conditioning mode for a model with a speaker embedding table.
    pub fn conditioning_mode_for_ids(&self) -> ConditioningMode {
        ConditioningMode::SpeakerIds {
            num_speakers: self.num_speakers(),
        }
    }

    /// Conditioning mode for a model fed with stored x-vectors.
    pub fn conditioning_mode_for_x_vectors(&self) -> Result<ConditioningMode> {
        Ok(ConditioningMode::XVectors {
            dim: self.x_vector_dim()?,
        })
    }

    /// Speaker ids for a batch of speaker names.
    pub fn speaker_id_input(&self, speakers: &[&str]) -> Result<ConditioningInput> {
        let ids = speakers
            .iter()
            .map(|&name| {
                self.speaker_ids
                    .get(name)
                    .ok_or_else(|| SpeakerError::Conditioning(format!("unknown speaker {name:?}")))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ConditioningInput::SpeakerIds(ids))
    }

    /// Mean x-vectors for a batch of speaker names.
    pub fn x_vector_input(
        &self,
        speakers: &[&str],
        sampling: Sampling,
    ) -> Result<ConditioningInput> {
        let vectors = speakers
            .iter()
            .map(|&name| self.get_mean_x_vector(name, sampling))
            .collect::<Result<Vec<_>>>()?;
        Ok(ConditioningInput::XVectors(vectors))
    }

    /// Embedding projection for inspection. Not available yet.
    pub fn run_umap(&self) -> Result<Vec<[f64; 2]>> {
        Err(SpeakerError::NotImplemented("run_umap"))
    }

    /// Embedding plot. Not available yet.
    pub fn plot_embeddings(&self) -> Result<()> {
        Err(SpeakerError::NotImplemented("plot_embeddings"))
    }
}

/// Populates a [`SpeakerRegistry`] from any combination of sources.
///
/// Sources are applied in a fixed order: items, x-vector file, id file,
/// then the encoder.
#[derive(Default)]
pub struct SpeakerRegistryBuilder<'a> {
    items: Option<Box<dyn FnOnce(&mut SpeakerRegistry) + 'a>>,
    x_vectors_file: Option<PathBuf>,
    speaker_ids_file: Option<PathBuf>,
    encoder: Option<EncoderAdapter>,
}

impl<'a> SpeakerRegistryBuilder<'a> {
    pub fn items<I: SpeakerItem + 'a>(mut self, items: &'a [I]) -> Self {
        self.items = Some(Box::new(move |registry: &mut SpeakerRegistry| {
            registry.parse_speakers_from_items(items);
        }));
        self
    }

    pub fn x_vectors_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.x_vectors_file = Some(path.into());
        self
    }

    pub fn speaker_ids_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.speaker_ids_file = Some(path.into());
        self
    }

    pub fn encoder(mut self, encoder: EncoderAdapter) -> Self {
        self.encoder = Some(encoder);
        self
    }

    pub fn build(self) -> Result<SpeakerRegistry> {
        let mut registry = SpeakerRegistry::new();
        if let Some(parse) = self.items {
            parse(&mut registry);
        }
        if let Some(path) = self.x_vectors_file {
            registry.load_x_vectors_file(path)?;
        }
        if let Some(path) = self.speaker_ids_file {
            registry.load_ids_file(path)?;
        }
        if let Some(encoder) = self.encoder {
            registry.set_encoder(encoder);
        }
        Ok(registry)
    }
}
