//! Both ends of a sync exchange, local or remote.

use std::sync::Arc;

use async_trait::async_trait;
use lexsync_core::{ChangesResult, ClientId, Commit, CommitId, SyncState};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Result, SyncStep};
use crate::health::HealthCache;
use crate::rpc::SyncRpc;

/// Message of every failed pull of commits.
pub const DOWNLOAD_FAILED: &str = "Failed to download dictionary changes";

/// A replica that can take part in [`sync_with`](crate::sync_with).
#[async_trait]
pub trait Syncable: Send + Sync {
    /// Whether syncing against this replica should be attempted at all.
    async fn should_sync(&self, cancel: &CancellationToken) -> bool;

    async fn get_sync_state(&self, cancel: &CancellationToken) -> Result<SyncState>;

    /// Commits this replica has that a replica at `other` lacks.
    async fn get_changes(
        &self,
        other: &SyncState,
        cancel: &CancellationToken,
    ) -> Result<ChangesResult>;

    /// Store and replay commits received from a peer.
    ///
    /// Commits already present are skipped. A replay failure stops the
    /// batch; commits replayed before it stay applied.
    async fn add_range_from_sync(&self, commits: Vec<Commit>, cancel: &CancellationToken)
        -> Result<()>;

    /// Record that these commits have been exchanged with a peer.
    async fn mark_synced(&self, _ids: &[CommitId]) -> Result<()> {
        Ok(())
    }

    /// Which of `ids` this replica holds. Lets a sync stamp the commits a
    /// failed replay kept. Replicas that cannot tell report none.
    async fn known_commits(&self, _ids: &[CommitId]) -> Result<Vec<CommitId>> {
        Ok(Vec::new())
    }
}

/// A peer reached through a [`SyncRpc`].
pub struct RemoteReplica<R> {
    rpc: R,
    health: Arc<HealthCache>,
    client_id: Option<ClientId>,
}

impl<R: SyncRpc> RemoteReplica<R> {
    pub fn new(rpc: R, health: Arc<HealthCache>) -> Self {
        Self {
            rpc,
            health,
            client_id: None,
        }
    }

    /// Report pushes as originating from `client_id`.
    pub fn with_client_id(mut self, client_id: ClientId) -> Self {
        self.client_id = Some(client_id);
        self
    }

    pub fn rpc(&self) -> &R {
        &self.rpc
    }
}

#[async_trait]
impl<R: SyncRpc> Syncable for RemoteReplica<R> {
    async fn should_sync(&self, cancel: &CancellationToken) -> bool {
        self.health.is_healthy(&self.rpc, cancel).await
    }

    async fn get_sync_state(&self, cancel: &CancellationToken) -> Result<SyncState> {
        self.rpc
            .pull_sync_state(cancel)
            .await
            .map_err(|e| e.at_step(SyncStep::Download, "Failed to fetch the remote sync state"))
    }

    async fn get_changes(
        &self,
        other: &SyncState,
        cancel: &CancellationToken,
    ) -> Result<ChangesResult> {
        let mut changes = self
            .rpc
            .pull_missing_commits(other, cancel)
            .await
            .map_err(|e| e.at_step(SyncStep::Download, DOWNLOAD_FAILED))?;
        // Sync dates are local bookkeeping; whatever the peer sent is meaningless here.
        for commit in &mut changes.missing_commits {
            commit.set_sync_date(None);
        }
        debug!(
            authority = self.rpc.authority(),
            count = changes.missing_commits.len(),
            "pulled commits"
        );
        Ok(changes)
    }

    async fn add_range_from_sync(
        &self,
        commits: Vec<Commit>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.rpc
            .push_commits(&commits, self.client_id, cancel)
            .await
            .map_err(|e| e.at_step(SyncStep::Upload, "Failed to upload dictionary changes"))
    }
}
