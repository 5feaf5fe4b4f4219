//! # lexsync core
//!
//! Pure primitives for the lexsync commit log: clocks, commits, changes,
//! and the sync diff.
//!
//! This crate does no I/O. Storage lives in `lexsync-store` and transport
//! in `lexsync-sync`.
//!
//! ## Key Types
//!
//! - [`HybridClock`] - Monotonic timestamp source shared by one replica
//! - [`Commit`] - A timestamped, hash-linked bundle of change records
//! - [`Change`] - Closed set of typed mutations, replayed through [`EntityChange`]
//! - [`SyncState`] - Per-client high-water marks exchanged between peers
//! - [`PatchDocument`] - Generic field patches, rewritten into typed changes
//!
//! ## Ordering
//!
//! The log order is `(wall clock, counter, commit id)`. Commit hashes are
//! recomputed whenever that order shifts; see [`commit`].

pub mod chain;
pub mod change;
pub mod clock;
pub mod commit;
pub mod context;
pub mod entity;
pub mod error;
pub mod extract;
pub mod patch;
pub mod rewrite;
pub mod sync_state;
pub mod types;

pub use chain::{link_chain, validate_commits};
pub use change::{Change, EntityChange};
pub use clock::{
    millis_to_datetime, HybridClock, HybridTimestamp, ManualTimeSource, SystemTimeSource,
    TimeSource,
};
pub use commit::{compare_commits, sort_commits, ChangeRecord, Commit, CommitMetadata};
pub use context::{ChangeContext, MemoryContext};
pub use entity::{
    ComplexFormComponent, ComplexFormType, Entity, EntityKind, Entry, MultiString, PartOfSpeech,
    SemanticDomain, Sense,
};
pub use error::{ChangeError, CoreError, PatchError};
pub use patch::{OperationType, PatchDocument, PatchOperation};
pub use rewrite::{Field, FieldPath, ListIndex, NamingPolicy};
pub use sync_state::{compute_changes, compute_missing, compute_sync_state, ChangesResult, SyncState};
pub use types::{ClientId, CommitId, EntityId};
