//! Speaker identity data for multi-speaker text-to-speech.
//!
//! # Overview
//!
//! A [`SpeakerRegistry`] serves two kinds of conditioning for an acoustic
//! model:
//!
//! - a dense integer id per speaker name ([`SpeakerIdMap`]), for models with
//!   a speaker embedding table;
//! - fixed-dimensional x-vectors per clip ([`XVectorTable`]), aggregated per
//!   speaker with [`SpeakerRegistry::get_mean_x_vector`].
//!
//! X-vectors come either from a precomputed document or from an attached
//! [`EncoderAdapter`], which runs a pretrained speaker encoder on audio
//! clips through its own feature pipeline.
//!
//! # Documents
//!
//! ```text
//! speaker ids: {"spk_01": 0, "spk_02": 1}
//! x-vectors:   {"c1.wav": {"name": "spk_01", "embedding": [0.12, ...]}, ...}
//! ```
//!
//! Both are UTF-8 JSON, written with 4-space indentation.

mod conditioning;
mod config;
mod encoder;
mod error;
mod features;
mod ids;
pub mod io;
mod registry;
mod xvector;

pub use conditioning::{ConditioningInput, ConditioningMode};
pub use config::{AudioConfig, EncoderConfig};
pub use encoder::{AudioProcessor, EncoderAdapter, EncoderBackend, PreprocessPolicy, SpeakerEncoder};
pub use error::{Result, SpeakerError};
pub use features::{EmbeddingBatch, FeatureBatch, FeatureMatrix};
pub use ids::{CorpusItem, SpeakerIdMap, SpeakerItem};
pub use registry::{Source, SpeakerRegistry, SpeakerRegistryBuilder};
pub use xvector::{Sampling, XVectorEntry, XVectorTable, mean_embedding};
