//! # lexsync store
//!
//! Persistence for the commit log. The [`CommitStore`] trait hides the
//! backend; [`SqliteStore`] is the durable one and [`MemoryStore`] backs
//! tests and throwaway replicas.
//!
//! ## Key Types
//!
//! - [`CommitStore`] - Async interface over an append-mostly commit log
//! - [`SqliteStore`] - SQLite storage with versioned migrations
//! - [`MemoryStore`] - In-memory storage with the same semantics
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lexsync_store::{CommitStore, SqliteStore};
//!
//! async fn example() -> lexsync_store::Result<()> {
//!     let store = SqliteStore::open("project.db")?;
//!     let commits = store.current_commits().await?;
//!     println!("{} commits", commits.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent appends**: adding a commit whose id is already stored is
//!   a no-op, so duplicate delivery from a peer is harmless.
//! - **Mutable slots**: only `hash`/`parent_hash` (on re-linearization) and
//!   the sync date are ever rewritten.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::CommitStore;
