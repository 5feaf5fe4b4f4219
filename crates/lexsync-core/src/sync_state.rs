//! Per-client high-water marks and the missing-commit diff.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::clock::millis_to_datetime;
use crate::commit::{sort_commits, Commit};
use crate::error::{CoreError, Result};
use crate::types::ClientId;

/// Latest wall clock (epoch millis) seen from each authoring client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncState(pub BTreeMap<ClientId, i64>);

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, client: &ClientId) -> Option<i64> {
        self.0.get(client).copied()
    }

    pub fn insert(&mut self, client: ClientId, millis: i64) {
        self.0.insert(client, millis);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ClientId, &i64)> {
        self.0.iter()
    }
}

impl FromIterator<(ClientId, i64)> for SyncState {
    fn from_iter<I: IntoIterator<Item = (ClientId, i64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Commits a peer lacks, plus the state of the side that computed them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesResult {
    pub missing_commits: Vec<Commit>,
    pub peer_sync_state: SyncState,
}

impl ChangesResult {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Group commits by author and keep each author's latest wall clock.
pub fn compute_sync_state<'a>(commits: impl IntoIterator<Item = &'a Commit>) -> SyncState {
    let mut state = SyncState::new();
    for commit in commits {
        let millis = commit.timestamp.wall_millis();
        state
            .0
            .entry(commit.client_id)
            .and_modify(|m| *m = (*m).max(millis))
            .or_insert(millis);
    }
    state
}

/// Local commits the peer described by `peer` has not seen, in log order.
///
/// Works per authoring client: a client the peer has never heard of
/// contributes all of its commits, otherwise only commits newer than the
/// peer's mark for it. This can resend commits the peer already holds when
/// its history from that client has gaps; replay is idempotent so that is
/// accepted.
pub fn compute_missing(local: &[Commit], peer: &SyncState) -> Vec<Commit> {
    let local_state = compute_sync_state(local);
    let mut missing: Vec<Commit> = local
        .iter()
        .filter(|commit| {
            let Some(peer_millis) = peer.get(&commit.client_id) else {
                return true;
            };
            let local_max = local_state.get(&commit.client_id).unwrap_or(i64::MIN);
            local_max > peer_millis && commit.timestamp.wall_clock > millis_to_datetime(peer_millis)
        })
        .cloned()
        .collect();
    sort_commits(&mut missing);
    missing
}

/// Diff `local` against a peer's state and attach the local state.
///
/// A missing peer state is an error, never an empty one.
pub fn compute_changes(local: &[Commit], peer: Option<&SyncState>) -> Result<ChangesResult> {
    let peer = peer.ok_or_else(|| CoreError::InvalidArgument("peer sync state is required".into()))?;
    Ok(ChangesResult {
        missing_commits: compute_missing(local, peer),
        peer_sync_state: compute_sync_state(local),
    })
}
