//! Error types for the recorder engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::media::{ObjectId, ObjectKind};

/// Errors reported by a media engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine runtime failed to start.
    #[error("Engine startup failed: {0}")]
    Startup(String),

    /// Audio pipeline could not be reset.
    #[error("Audio reset failed: {0}")]
    AudioReset(String),

    /// Video pipeline could not be reset.
    #[error("Video reset failed: {0}")]
    VideoReset(String),

    /// Object creation failed.
    #[error("Failed to create {kind} '{type_id}'")]
    CreateFailed { kind: ObjectKind, type_id: String },

    /// Handle does not refer to a live object.
    #[error("Unknown object: {0:?}")]
    UnknownObject(ObjectId),

    /// Scene graph operation failed.
    #[error("Scene operation failed: {0}")]
    Scene(String),
}

/// Result alias for engine calls.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors loading or saving the recorder configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read or written.
    #[error("Config IO error for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for the config model.
    #[error("Config parse error for {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
