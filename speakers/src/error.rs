use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by speaker registry and encoder operations.
#[derive(Debug, Error)]
pub enum SpeakerError {
    #[error("speakers: clip {clip_id:?} not found")]
    NotFound { clip_id: String },

    #[error("speakers: speaker {speaker:?} has {available} samples, {requested} requested")]
    NotEnoughSamples {
        speaker: String,
        requested: usize,
        available: usize,
    },

    #[error("speakers: no x-vectors selected for speaker {speaker:?}")]
    EmptySelection { speaker: String },

    #[error("speakers: no clips given")]
    NoClips,

    #[error("speakers: x-vector table is empty")]
    EmptyTable,

    #[error("speakers: x-vector of clip {clip_id:?} has non-finite values")]
    NonFinite { clip_id: String },

    #[error("speakers: dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("speakers: io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("speakers: invalid document {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("speakers: invalid features: {0}")]
    InvalidFeatures(String),

    #[error("speakers: speaker encoder is not initialized")]
    EncoderNotInitialized,

    #[error("speakers: encoder error: {0}")]
    Encoder(String),

    #[error("speakers: audio error on {}: {message}", .path.display())]
    Audio { path: PathBuf, message: String },

    #[error("speakers: conditioning error: {0}")]
    Conditioning(String),

    #[error("speakers: {0} is not implemented yet")]
    NotImplemented(&'static str),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SpeakerError>;
