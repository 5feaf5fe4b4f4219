//! Error types for the data model.

use lexsync_core::{ChangeError, CommitId, CoreError, EntityId};
use lexsync_store::StoreError;
use lexsync_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during data model operations.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Chain or argument validation failed.
    #[error("validation error: {0}")]
    Core(#[from] CoreError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// A change could not be built, e.g. from a patch.
    #[error("change error: {0}")]
    Change(#[from] ChangeError),

    /// A commit failed to replay; it was not stored.
    #[error("commit {commit} failed to replay: {source}")]
    Replay {
        commit: CommitId,
        #[source]
        source: ChangeError,
    },

    /// Entity not found.
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Invalid operation.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl ModelError {
    pub fn is_replay(&self) -> bool {
        matches!(self, ModelError::Replay { .. })
    }
}

/// Result type for data model operations.
pub type Result<T> = std::result::Result<T, ModelError>;
