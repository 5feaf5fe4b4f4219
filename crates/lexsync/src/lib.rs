//! # Lexsync
//!
//! Offline-first replicated commit log for dictionary data.
//!
//! ## Overview
//!
//! Every replica keeps the full history of a project as a log of commits.
//! Entities (entries, senses, parts of speech, ...) are never stored
//! directly; they are materialized by replaying typed changes in log order.
//! Replicas converge by exchanging the commits the other side lacks.
//!
//! ## Key Concepts
//!
//! - **Commit**: Immutable bundle of changes, ordered by hybrid timestamp
//! - **Replay**: Entity state is a pure function of the ordered log
//! - **Tombstone**: Deletion marks an entity; dependents follow on replay
//! - **Sync**: Pull and push by per-client high-water marks, idempotently
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lexsync::{DataModel, DataModelConfig};
//! use lexsync::core::{change::CreateEntryChange, Change, ClientId, EntityId, SystemTimeSource};
//! use lexsync::store::SqliteStore;
//!
//! async fn example() -> lexsync::Result<()> {
//!     let store = SqliteStore::open("project.sqlite")?;
//!     let model = DataModel::open(
//!         store,
//!         SystemTimeSource,
//!         ClientId::new_v4(),
//!         DataModelConfig::default(),
//!     )
//!     .await?;
//!
//!     let entry = EntityId::new_v4();
//!     model
//!         .add_change(Change::CreateEntry(
//!             CreateEntryChange::new(entry).with_lexeme_form("en", "apple"),
//!         ))
//!         .await?;
//!
//!     // let results = model.sync_with(&remote, &cancel).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `lexsync::core` - Clock, commits, changes, entities, sync diff
//! - `lexsync::store` - Commit store trait, memory and SQLite stores
//! - `lexsync::sync` - RPC contract, HTTP client, sync sessions

pub mod error;
pub mod model;
pub mod snapshot;

pub use lexsync_core as core;
pub use lexsync_store as store;
pub use lexsync_sync as sync;

pub use error::{ModelError, Result};
pub use model::{DataModel, DataModelConfig};
pub use snapshot::Snapshots;

pub use lexsync_core::{
    Change, ChangesResult, ClientId, Commit, CommitId, Entity, EntityId, EntityKind,
    HybridTimestamp, PatchDocument, SyncState,
};
pub use lexsync_sync::{CancellationToken, LocalRpc, RemoteReplica, SyncResults, Syncable};
