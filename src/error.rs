//! Error types, one enum per concern.

use std::path::PathBuf;
use std::time::Duration;

use crate::jobs::model::JobId;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// A job id that is not a canonical non-negative integer.
#[derive(Debug, thiserror::Error)]
#[error("Invalid job id: {0:?}")]
pub struct InvalidJobId(pub String);

/// Job store (filesystem) errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt id marker {path}: {contents:?}")]
    CorruptIdMarker { path: PathBuf, contents: String },

    #[error("Job directory for {0} already exists")]
    JobExists(JobId),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Submission-time errors, surfaced synchronously to the caller.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Malformed {media_type} document: {reason}")]
    MalformedDocument { media_type: String, reason: String },

    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    #[error("Job {id} store failure: {source}")]
    Store {
        id: JobId,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Allocation(#[from] StoreError),
}

/// Failures while preparing or running a queued job.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("Failed to prepare job: {0}")]
    Prepare(String),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Tool output could not be read: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tool timed out after {0:?}")]
    Timeout(Duration),
}
