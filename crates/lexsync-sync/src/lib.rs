//! # Lexsync Sync
//!
//! Sync transport and bidirectional merge between replicas of a commit log.
//!
//! ## Overview
//!
//! A replica syncs with a peer through four RPCs ([`SyncRpc`]): health
//! check, push commits, pull sync state, and pull missing commits. The
//! diff on each side works from per-client high-water marks, so an
//! exchange only moves commits the other side has not seen (plus,
//! occasionally, some it has; duplicates are skipped by id).
//!
//! ## Key Properties
//!
//! - **Idempotent**: pushing or pulling a commit twice is a no-op
//! - **Resumable**: a failed or cancelled sync leaves nothing to undo;
//!   the next attempt rediscovers what is still missing
//! - **Health-gated**: peers are checked at most once per TTL, and failed
//!   checks are cached too
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lexsync_sync::{HealthCache, HttpSyncConfig, HttpSyncRpc, RemoteReplica};
//!
//! # fn example(project_id: uuid::Uuid) -> lexsync_sync::Result<()> {
//! let health = Arc::new(HealthCache::new());
//! let rpc = HttpSyncRpc::new(HttpSyncConfig::new("https://lex.example.org", project_id))?;
//! let remote = RemoteReplica::new(rpc, health);
//! // let results = lexsync_sync::sync_with(&local, &remote, &cancel).await?;
//! # let _ = remote;
//! # Ok(())
//! # }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Local                               Remote
//!   |-------- checkConnection -------->|   (cached per authority)
//!   |-------- get -------------------->|
//!   |<------- SyncState ---------------|
//!   |-------- add (batches) ---------->|   Upload
//!   |-------- changes (our state) ---->|
//!   |<------- ChangesResult -----------|   Download
//!   |   replay, then stamp sync dates  |
//! ```

pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod loopback;
pub mod rpc;
pub mod session;
pub mod syncable;

pub use config::{HttpSyncConfig, SyncConfig, DEFAULT_PUSH_BATCH_SIZE, DEFAULT_REQUEST_TIMEOUT};
pub use error::{Result, SyncError, SyncStep};
pub use health::{HealthCache, DEFAULT_HEALTH_TTL};
pub use http::HttpSyncRpc;
pub use loopback::LocalRpc;
pub use rpc::SyncRpc;
pub use session::{sync_many, sync_with, SyncResults, SyncSession};
pub use syncable::{RemoteReplica, Syncable, DOWNLOAD_FAILED};

pub use tokio_util::sync::CancellationToken;
