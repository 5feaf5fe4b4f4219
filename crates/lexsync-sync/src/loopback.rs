//! In-process [`SyncRpc`] serving another replica directly.
//!
//! Payloads still pass through their JSON form, so a loopback exchange
//! sees the same data an HTTP exchange would.

use std::sync::Arc;

use async_trait::async_trait;
use lexsync_core::{ChangesResult, ClientId, Commit, SyncState};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, SyncError};
use crate::rpc::SyncRpc;
use crate::syncable::Syncable;

/// Serves the four RPCs from a [`Syncable`] in the same process.
pub struct LocalRpc<S> {
    target: Arc<S>,
    authority: String,
}

impl<S: Syncable> LocalRpc<S> {
    pub fn new(target: Arc<S>) -> Self {
        Self::named(target, "local")
    }

    /// Use a distinct authority so several loopbacks get separate health entries.
    pub fn named(target: Arc<S>, authority: impl Into<String>) -> Self {
        Self {
            target,
            authority: authority.into(),
        }
    }

    pub fn target(&self) -> &Arc<S> {
        &self.target
    }
}

fn over_wire<T: Serialize + DeserializeOwned>(value: &T) -> Result<T> {
    let bytes = serde_json::to_vec(value)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }
    Ok(())
}

#[async_trait]
impl<S: Syncable> SyncRpc for LocalRpc<S> {
    fn authority(&self) -> &str {
        &self.authority
    }

    async fn health_check(&self, cancel: &CancellationToken) -> Result<bool> {
        check_cancelled(cancel)?;
        Ok(self.target.should_sync(cancel).await)
    }

    async fn push_commits(
        &self,
        commits: &[Commit],
        _client_id: Option<ClientId>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        check_cancelled(cancel)?;
        let commits = over_wire(&commits.to_vec())?;
        self.target.add_range_from_sync(commits, cancel).await
    }

    async fn pull_sync_state(&self, cancel: &CancellationToken) -> Result<SyncState> {
        check_cancelled(cancel)?;
        over_wire(&self.target.get_sync_state(cancel).await?)
    }

    async fn pull_missing_commits(
        &self,
        local: &SyncState,
        cancel: &CancellationToken,
    ) -> Result<ChangesResult> {
        check_cancelled(cancel)?;
        over_wire(&self.target.get_changes(local, cancel).await?)
    }
}
