//! Bidirectional merge between two [`Syncable`] replicas.

use lexsync_core::{Commit, CommitId};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{Result, SyncError, SyncStep};
use crate::syncable::Syncable;

/// Outcome of one sync exchange.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncResults {
    /// Commits pulled from the remote and replayed locally.
    pub missing_from_local: Vec<Commit>,
    /// Commits pushed to the remote.
    pub missing_from_remote: Vec<Commit>,
    /// False when either side declined to sync.
    pub is_synced: bool,
}

impl SyncResults {
    /// Nothing exchanged because a side declined.
    pub fn not_synced() -> Self {
        Self::default()
    }
}

/// Runs sync exchanges with a fixed configuration.
///
/// A session holds no per-peer state; one project's sync must still not
/// run concurrently with itself.
#[derive(Debug, Clone, Default)]
pub struct SyncSession {
    config: SyncConfig,
}

impl SyncSession {
    pub fn new(config: SyncConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Push what `remote` lacks, then pull and replay what `local` lacks.
    ///
    /// A failed push leaves local history untouched. A failed replay
    /// leaves the commits replayed before it applied; the next sync
    /// rediscovers the rest. Pushed batches are stamped as soon as the
    /// remote accepts them, pulled commits once they are replayed.
    pub async fn sync_with(
        &self,
        local: &dyn Syncable,
        remote: &dyn Syncable,
        cancel: &CancellationToken,
    ) -> Result<SyncResults> {
        if !local.should_sync(cancel).await || !remote.should_sync(cancel).await {
            debug!("sync skipped, a replica declined");
            return Ok(SyncResults::not_synced());
        }

        // Phase 1: learn what the remote has seen.
        check_cancelled(cancel)?;
        let remote_state = remote.get_sync_state(cancel).await?;

        // Phase 2: push what it is missing.
        let local_changes = local.get_changes(&remote_state, cancel).await?;
        let pushed = local_changes.missing_commits;
        self.push(local, remote, &pushed, cancel).await?;

        // Phase 3: pull what we are missing, as of our own state.
        check_cancelled(cancel)?;
        let remote_changes = remote
            .get_changes(&local_changes.peer_sync_state, cancel)
            .await?;
        let pulled = remote_changes.missing_commits;

        // Phase 4: replay locally. Errors here are not step failures.
        if !pulled.is_empty() {
            let ids: Vec<CommitId> = pulled.iter().map(|c| c.id).collect();
            if let Err(e) = local.add_range_from_sync(pulled.clone(), cancel).await {
                stamp_kept(local, &ids).await;
                return Err(e);
            }
            local.mark_synced(&ids).await?;
        }

        info!(
            pushed = pushed.len(),
            pulled = pulled.len(),
            "sync complete"
        );
        Ok(SyncResults {
            missing_from_local: pulled,
            missing_from_remote: pushed,
            is_synced: true,
        })
    }

    /// Sync `local` with every remote, then push each remote whatever it
    /// still lacks after the others were merged in.
    ///
    /// Returns one result per remote, in order.
    pub async fn sync_many(
        &self,
        local: &dyn Syncable,
        remotes: &[&dyn Syncable],
        cancel: &CancellationToken,
    ) -> Result<Vec<SyncResults>> {
        let mut results = Vec::with_capacity(remotes.len());
        for remote in remotes {
            results.push(self.sync_with(local, *remote, cancel).await?);
        }

        for (remote, result) in remotes.iter().zip(results.iter_mut()) {
            if !result.is_synced {
                continue;
            }
            check_cancelled(cancel)?;
            let state = remote.get_sync_state(cancel).await?;
            let missing = local.get_changes(&state, cancel).await?.missing_commits;
            if missing.is_empty() {
                continue;
            }
            self.push(local, *remote, &missing, cancel).await?;
            result.missing_from_remote.extend(missing);
        }
        Ok(results)
    }

    /// Send `commits` in batches, stamping each batch once accepted.
    async fn push(
        &self,
        local: &dyn Syncable,
        remote: &dyn Syncable,
        commits: &[Commit],
        cancel: &CancellationToken,
    ) -> Result<()> {
        for batch in commits.chunks(self.config.push_batch_size.max(1)) {
            check_cancelled(cancel)?;
            remote
                .add_range_from_sync(batch.to_vec(), cancel)
                .await
                .map_err(|e| e.at_step(SyncStep::Upload, "Failed to upload dictionary changes"))?;
            let ids: Vec<CommitId> = batch.iter().map(|c| c.id).collect();
            local.mark_synced(&ids).await?;
        }
        Ok(())
    }
}

/// Stamp the pulled commits a failed replay still kept.
///
/// The replay error is what the caller sees, so failures here are only logged.
async fn stamp_kept(local: &dyn Syncable, pulled: &[CommitId]) {
    let kept = match local.known_commits(pulled).await {
        Ok(kept) => kept,
        Err(e) => {
            warn!(error = %e, "could not list commits kept by a failed replay");
            return;
        }
    };
    if kept.is_empty() {
        return;
    }
    if let Err(e) = local.mark_synced(&kept).await {
        warn!(error = %e, kept = kept.len(), "could not stamp commits kept by a failed replay");
    }
}

/// [`SyncSession::sync_with`] with the default configuration.
pub async fn sync_with(
    local: &dyn Syncable,
    remote: &dyn Syncable,
    cancel: &CancellationToken,
) -> Result<SyncResults> {
    SyncSession::default().sync_with(local, remote, cancel).await
}

/// [`SyncSession::sync_many`] with the default configuration.
pub async fn sync_many(
    local: &dyn Syncable,
    remotes: &[&dyn Syncable],
    cancel: &CancellationToken,
) -> Result<Vec<SyncResults>> {
    SyncSession::default().sync_many(local, remotes, cancel).await
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }
    Ok(())
}
