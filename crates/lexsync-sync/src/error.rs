//! Error types for the sync module.

use std::fmt;

use thiserror::Error;

/// Which half of a bidirectional exchange failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    /// Sending local commits to the peer.
    Upload,
    /// Fetching state or commits from the peer.
    Download,
}

impl fmt::Display for SyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncStep::Upload => f.write_str("upload"),
            SyncStep::Download => f.write_str("download"),
        }
    }
}

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A push or pull failed; `step` says which.
    #[error("{step} failed: {message}")]
    Step {
        step: SyncStep,
        message: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The peer sent a payload we refuse to interpret (e.g. `null`).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// HTTP transport error.
    #[error("transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The peer answered with a body that does not decode.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// Peer answered with a non-success status.
    #[error("peer returned {status} for {url}")]
    Status { status: u16, url: String },

    /// The local replica failed to store or replay commits.
    #[error("replica error: {0}")]
    Replica(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Core validation failed.
    #[error("core error: {0}")]
    Core(#[from] lexsync_core::CoreError),

    /// Sync was cancelled.
    #[error("sync cancelled")]
    Cancelled,
}

impl SyncError {
    /// Wrap as a step failure.
    ///
    /// Cancellation and errors already tagged with a step pass through.
    /// Transport and decode errors become the step's source directly.
    pub fn at_step(self, step: SyncStep, message: impl Into<String>) -> Self {
        let source: Box<dyn std::error::Error + Send + Sync> = match self {
            SyncError::Cancelled | SyncError::Step { .. } => return self,
            SyncError::Http(e) => Box::new(e),
            SyncError::Decode(e) => Box::new(e),
            other => Box::new(other),
        };
        SyncError::Step {
            step,
            message: message.into(),
            source,
        }
    }

    /// The step that failed, when this is a step failure.
    pub fn step(&self) -> Option<SyncStep> {
        match self {
            SyncError::Step { step, .. } => Some(*step),
            _ => None,
        }
    }

    pub fn replica(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        SyncError::Replica(Box::new(err))
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
