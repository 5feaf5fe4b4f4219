//! # Lexsync Testkit
//!
//! Testing utilities for lexsync.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: authors with scripted clocks, change helpers, seeded stores
//! - **Generators**: Proptest strategies for ids, timestamps, commits and sync states
//!
//! ## Test Fixtures
//!
//! ```rust
//! use lexsync_testkit::fixtures::{create_entry, Author};
//! use lexsync_core::EntityId;
//!
//! let author = Author::new(1_000);
//! let commit = author.commit(vec![create_entry(EntityId::new_v4(), "apple")]);
//! assert_eq!(commit.client_id, author.client_id);
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use lexsync_testkit::generators::commit_set;
//!
//! proptest! {
//!     #[test]
//!     fn own_state_misses_nothing(commits in commit_set(3, 20)) {
//!         let state = lexsync_core::compute_sync_state(&commits);
//!         prop_assert!(lexsync_core::compute_missing(&commits, &state).is_empty());
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{authors, linked, seeded_store, Author};
pub use generators::{commit_set, sync_state};
