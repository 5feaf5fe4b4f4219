//! The commit store: the abstract interface for commit persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lexsync_core::{
    compute_changes, compute_sync_state, ChangesResult, ClientId, Commit, CommitId,
    HybridTimestamp, SyncState,
};

use crate::error::{Result, StoreError};

/// Async interface for commit persistence.
///
/// Commits are returned in log order `(wall clock, counter, id)` unless a
/// method says otherwise. SQLite work runs on `spawn_blocking`.
#[async_trait]
pub trait CommitStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Commit Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert commits, skipping ids that are already stored.
    ///
    /// Returns how many commits were new.
    async fn add_commits(&self, commits: &[Commit]) -> Result<usize>;

    async fn get_commit(&self, id: &CommitId) -> Result<Option<Commit>>;

    async fn has_commit(&self, id: &CommitId) -> Result<bool>;

    /// Every stored commit, in log order.
    async fn current_commits(&self) -> Result<Vec<Commit>>;

    /// Commits authored by one client, in log order.
    async fn commits_by_client(&self, client: &ClientId) -> Result<Vec<Commit>>;

    /// Look a commit up by its current chain hash.
    async fn find_by_hash(&self, hash: &str) -> Result<Option<Commit>>;

    /// The last commit in log order.
    async fn latest_commit(&self) -> Result<Option<Commit>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Mutable Slots
    // ─────────────────────────────────────────────────────────────────────────

    /// Persist `hash`/`parent_hash` of re-linked commits.
    async fn update_hashes(&self, commits: &[Commit]) -> Result<()>;

    /// Stamp (or clear) the sync date of the given commits.
    async fn set_sync_date(&self, ids: &[CommitId], date: Option<DateTime<Utc>>) -> Result<()>;

    /// Commits never confirmed with a peer.
    async fn unsynced_commits(&self) -> Result<Vec<Commit>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Sync Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Drop commits that are already stored, keeping input order.
    async fn filter_existing(&self, commits: Vec<Commit>) -> Result<Vec<Commit>> {
        let mut fresh = Vec::with_capacity(commits.len());
        for commit in commits {
            if !self.has_commit(&commit.id).await? {
                fresh.push(commit);
            }
        }
        Ok(fresh)
    }

    async fn latest_timestamp(&self) -> Result<Option<HybridTimestamp>> {
        Ok(self.latest_commit().await?.map(|c| c.timestamp))
    }

    async fn get_sync_state(&self) -> Result<SyncState> {
        Ok(compute_sync_state(&self.current_commits().await?))
    }

    /// Commits the peer described by `peer` is missing, with our state.
    async fn get_changes(&self, peer: &SyncState) -> Result<ChangesResult> {
        let commits = self.current_commits().await?;
        compute_changes(&commits, Some(peer)).map_err(|e| StoreError::InvalidData(e.to_string()))
    }
}
