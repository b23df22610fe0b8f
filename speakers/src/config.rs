//! Speaker encoder configuration documents.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::io::load_json;

/// Encoder configuration: the audio section used to build the feature
/// pipeline plus opaque model parameters handed to the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Model architecture name, if the document carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub model_params: Value,

    /// Remaining top-level keys.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EncoderConfig {
    /// Reads a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let cfg: Self = load_json(path)?;
        tracing::debug!(
            path = %path.display(),
            model = cfg.model.as_deref().unwrap_or("-"),
            sample_rate = cfg.audio.sample_rate,
            "speakers: loaded encoder config"
        );
        Ok(cfg)
    }
}

/// Audio section of an encoder config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate the encoder was trained at (default: 16000).
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// Number of mel bins (default: 80).
    #[serde(default = "default_num_mels")]
    pub num_mels: usize,

    /// Normalize input level before feature extraction.
    #[serde(default)]
    pub do_sound_norm: bool,

    /// Trim leading and trailing silence.
    #[serde(default)]
    pub do_trim_silence: bool,

    /// Processor-specific keys (fft size, hop length, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_sample_rate() -> u32 {
    16000
}

fn default_num_mels() -> usize {
    80
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            num_mels: default_num_mels(),
            do_sound_norm: false,
            do_trim_silence: false,
            extra: Map::new(),
        }
    }
}
