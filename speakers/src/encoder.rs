//! Speaker encoder adapter: audio clips in, x-vectors out.
//!
//! The encoder network and the feature pipeline are external collaborators,
//! reached through [`SpeakerEncoder`] and [`AudioProcessor`]. A backend
//! ([`EncoderBackend`]) builds both from one [`EncoderConfig`], so an adapter
//! always owns a matching pair.
//!
//! # Pipeline
//!
//! 1. `load_waveform(path, encoder_sample_rate)`
//! 2. `melspectrogram(waveform)` -> `num_mels x frames`
//! 3. transpose -> `frames x num_mels`, batch of one
//! 4. `compute_embedding(batch)` -> first row
//!
//! Several clips are averaged in embedding space with a running sum, so only
//! one clip's features are resident at a time.

use std::path::Path;

use crate::config::{AudioConfig, EncoderConfig};
use crate::error::{Result, SpeakerError};
use crate::features::{EmbeddingBatch, FeatureBatch, FeatureMatrix};

/// Pretrained network mapping feature batches to embeddings.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` so an adapter can be moved into a
/// worker. Use one adapter per worker; it is never mutated after init.
pub trait SpeakerEncoder: Send + Sync {
    /// Loads trained weights. Keys and shapes must match exactly.
    /// `eval` switches the network to inference mode.
    fn load_checkpoint(&mut self, config_path: &Path, model_path: &Path, eval: bool) -> Result<()>;

    /// Computes one embedding per batch item.
    fn compute_embedding(&self, batch: &FeatureBatch) -> Result<EmbeddingBatch>;
}

/// Waveform loading and feature extraction.
pub trait AudioProcessor: Send + Sync {
    /// Loads a clip resampled to `sample_rate`.
    fn load_waveform(&self, path: &Path, sample_rate: u32) -> Result<Vec<f32>>;

    /// Mel spectrogram laid out as `num_mels x frames`.
    fn melspectrogram(&self, waveform: &[f32]) -> Result<FeatureMatrix>;

    fn sample_rate(&self) -> u32;

    fn normalize_level(&self) -> bool;

    fn set_normalize_level(&mut self, enabled: bool);

    fn trim_silence(&self) -> bool;

    fn set_trim_silence(&mut self, enabled: bool);
}

/// Builds the encoder network and its feature pipeline from a config.
pub trait EncoderBackend {
    /// Constructs an untrained network for `config`.
    fn setup_model(&self, config: &EncoderConfig) -> Result<Box<dyn SpeakerEncoder>>;

    /// Constructs the feature pipeline for the config's audio section.
    fn audio_processor(&self, audio: &AudioConfig) -> Result<Box<dyn AudioProcessor>>;
}

/// Preprocessing rules applied on top of the loaded config.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreprocessPolicy {
    /// Force level normalization and silence trimming on, whatever the
    /// encoder's config says.
    pub force_clean_audio: bool,
}

impl Default for PreprocessPolicy {
    fn default() -> Self {
        Self {
            force_clean_audio: true,
        }
    }
}

/// An initialized speaker encoder with its dedicated feature pipeline.
pub struct EncoderAdapter {
    config: EncoderConfig,
    encoder: Box<dyn SpeakerEncoder>,
    processor: Box<dyn AudioProcessor>,
    policy: PreprocessPolicy,
}

impl std::fmt::Debug for EncoderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderAdapter")
            .field("sample_rate", &self.sample_rate())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl EncoderAdapter {
    /// Loads the config, builds the network, loads weights in eval mode and
    /// builds the feature pipeline with the default [`PreprocessPolicy`].
    pub fn init(
        backend: &dyn EncoderBackend,
        model_path: &Path,
        config_path: &Path,
    ) -> Result<Self> {
        Self::init_with_policy(backend, model_path, config_path, PreprocessPolicy::default())
    }

    pub fn init_with_policy(
        backend: &dyn EncoderBackend,
        model_path: &Path,
        config_path: &Path,
        policy: PreprocessPolicy,
    ) -> Result<Self> {
        let config = EncoderConfig::load(config_path)?;
        let mut encoder = backend.setup_model(&config)?;
        encoder.load_checkpoint(config_path, model_path, true)?;
        let processor = backend.audio_processor(&config.audio)?;
        let adapter = Self::from_parts(config, encoder, processor, policy);
        tracing::info!(
            model = %model_path.display(),
            sample_rate = adapter.sample_rate(),
            force_clean_audio = policy.force_clean_audio,
            "speakers: speaker encoder ready"
        );
        Ok(adapter)
    }

    /// Assembles an adapter from already-built collaborators.
    /// The policy is applied to `processor`.
    pub fn from_parts(
        config: EncoderConfig,
        encoder: Box<dyn SpeakerEncoder>,
        mut processor: Box<dyn AudioProcessor>,
        policy: PreprocessPolicy,
    ) -> Self {
        if policy.force_clean_audio {
            processor.set_normalize_level(true);
            processor.set_trim_silence(true);
        }
        Self {
            config,
            encoder,
            processor,
            policy,
        }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    pub fn policy(&self) -> PreprocessPolicy {
        self.policy
    }

    pub fn processor(&self) -> &dyn AudioProcessor {
        self.processor.as_ref()
    }

    /// Sample rate clips are loaded at.
    pub fn sample_rate(&self) -> u32 {
        self.processor.sample_rate()
    }

    /// Runs the encoder on features extracted elsewhere.
    ///
    /// Accepts a single `frames x dim` matrix or a batch; the raw encoder
    /// output is returned with one row per batch item.
    pub fn compute_x_vector(&self, features: impl Into<FeatureBatch>) -> Result<EmbeddingBatch> {
        self.encoder.compute_embedding(&features.into())
    }

    /// Computes the x-vector of one clip, widened to the precision x-vector
    /// tables store.
    pub fn compute_x_vector_from_clip(&self, wav_file: &Path) -> Result<Vec<f64>> {
        Ok(self.embed_clip(wav_file)?.into_iter().map(f64::from).collect())
    }

    /// Computes the mean x-vector of several clips. Sums in f64.
    pub fn compute_x_vector_from_clips<P: AsRef<Path>>(
        &self,
        wav_files: &[P],
    ) -> Result<Vec<f64>> {
        let mut sum: Option<Vec<f64>> = None;
        for wav_file in wav_files {
            let x_vector = self.embed_clip(wav_file.as_ref())?;
            let acc = sum.get_or_insert_with(|| vec![0.0; x_vector.len()]);
            if acc.len() != x_vector.len() {
                return Err(SpeakerError::DimensionMismatch {
                    expected: acc.len(),
                    got: x_vector.len(),
                });
            }
            for (a, x) in acc.iter_mut().zip(x_vector) {
                *a += f64::from(x);
            }
        }
        let mut mean = sum.ok_or(SpeakerError::NoClips)?;
        let n = wav_files.len() as f64;
        for v in &mut mean {
            *v /= n;
        }
        Ok(mean)
    }

    fn embed_clip(&self, wav_file: &Path) -> Result<Vec<f32>> {
        let waveform = self.processor.load_waveform(wav_file, self.sample_rate())?;
        let spec = self.processor.melspectrogram(&waveform)?;
        let batch = FeatureBatch::from(spec.transpose());
        let x_vector = self
            .encoder
            .compute_embedding(&batch)?
            .into_first()
            .ok_or_else(|| SpeakerError::Encoder("encoder returned no embedding".into()))?;
        tracing::debug!(
            clip = %wav_file.display(),
            dim = x_vector.len(),
            "speakers: computed x-vector"
        );
        Ok(x_vector)
    }
}
