//! The four-operation RPC contract between a replica and its peer.

use async_trait::async_trait;
use lexsync_core::{ChangesResult, ClientId, Commit, SyncState};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Remote side of a sync exchange.
///
/// Every call takes a cancellation token; a cancelled call returns
/// [`SyncError::Cancelled`](crate::SyncError::Cancelled) and has no local
/// side effects.
#[async_trait]
pub trait SyncRpc: Send + Sync {
    /// Identifies the peer for health caching (host and port).
    fn authority(&self) -> &str;

    /// `Ok(true)` when the peer answered with success.
    ///
    /// A non-success answer is `Ok(false)`; transport failures are errors.
    async fn health_check(&self, cancel: &CancellationToken) -> Result<bool>;

    /// Send commits to the peer. Commits it already has are ignored.
    async fn push_commits(
        &self,
        commits: &[Commit],
        client_id: Option<ClientId>,
        cancel: &CancellationToken,
    ) -> Result<()>;

    async fn pull_sync_state(&self, cancel: &CancellationToken) -> Result<SyncState>;

    /// Commits the peer has that a replica at `local` lacks.
    async fn pull_missing_commits(
        &self,
        local: &SyncState,
        cancel: &CancellationToken,
    ) -> Result<ChangesResult>;
}
