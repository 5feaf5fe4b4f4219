//! Error types for lexsync core.

use thiserror::Error;

use crate::entity::EntityKind;
use crate::types::{CommitId, EntityId};

/// Errors from commit handling and chain validation.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid commit hash {hash:?}: {reason}")]
    InvalidHash { hash: String, reason: String },

    #[error(
        "commit {commit} does not match expected hash, parent hash [{actual_parent}] != [{expected_parent}]"
    )]
    ChainBroken {
        commit: CommitId,
        expected_parent: String,
        actual_parent: String,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("decoding error: {0}")]
    Decoding(String),
}

/// Errors raised while constructing or applying a single change.
#[derive(Debug, Error)]
pub enum ChangeError {
    #[error("{change}: {reason}")]
    CannotCreate {
        change: &'static str,
        reason: &'static str,
    },

    #[error("{change} expects a {expected:?} but entity {entity} is a {found:?}")]
    WrongEntityKind {
        change: &'static str,
        entity: EntityId,
        expected: EntityKind,
        found: EntityKind,
    },

    #[error("{change} targets {expected} but was applied to {actual}")]
    WrongEntity {
        change: &'static str,
        expected: EntityId,
        actual: EntityId,
    },

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("patch error: {0}")]
    Patch(#[from] PatchError),

    #[error("change context error: {0}")]
    Context(String),
}

/// Errors produced by JSON patch documents and the patch rewriter.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("invalid pointer {0:?}")]
    InvalidPointer(String),

    #[error("path {0:?} does not exist")]
    PathNotFound(String),

    #[error("operation {op} at {path:?} requires a value")]
    MissingValue { op: &'static str, path: String },

    #[error("index {index} out of range at {path:?}")]
    IndexOutOfRange { path: String, index: usize },

    #[error("operation {op} is not supported for {field}")]
    Unsupported { op: &'static str, field: String },

    #[error("value at {path:?} has the wrong shape: {source}")]
    Value {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("entity serialization failed: {0}")]
    Entity(#[source] serde_json::Error),

    #[error("{0}")]
    Invalid(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
