//! Commits: identified, timestamped units of history.
//!
//! `hash` and `parent_hash` are NOT a permanent content fingerprint. They
//! record the commit's position in the chain as of the last time the chain
//! was linearized, and are recomputed whenever commits from other clients
//! land earlier in the total order. Never assume a commit's hash is stable
//! across a merge; use its `id` for identity.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::xxh64;

use crate::change::{Change, EntityChange};
use crate::clock::HybridTimestamp;
use crate::error::{CoreError, Result};
use crate::types::{ClientId, CommitId, EntityId};

/// Local bookkeeping stored alongside a commit but outside the hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitMetadata {
    /// When this commit was last confirmed as exchanged with the sync peer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_date: Option<DateTime<Utc>>,
}

/// A single change inside a commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    /// Position of the change within its commit.
    pub index: u32,
    pub commit_id: CommitId,
    pub entity_id: EntityId,
    pub change: Change,
}

impl ChangeRecord {
    pub fn new(index: u32, commit_id: CommitId, change: Change) -> Self {
        Self {
            index,
            commit_id,
            entity_id: change.entity_id(),
            change,
        }
    }
}

/// An immutable unit of history authored by one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commit {
    pub id: CommitId,
    pub client_id: ClientId,
    pub timestamp: HybridTimestamp,
    hash: String,
    parent_hash: String,
    pub change_records: Vec<ChangeRecord>,
    #[serde(default)]
    pub metadata: CommitMetadata,
}

impl Commit {
    /// Create a commit with a fresh id, linked to the empty predecessor.
    pub fn new(client_id: ClientId, timestamp: HybridTimestamp) -> Self {
        Self::with_id(CommitId::new_v4(), client_id, timestamp)
    }

    /// Create a commit with a caller-chosen id.
    pub fn with_id(id: CommitId, client_id: ClientId, timestamp: HybridTimestamp) -> Self {
        Self {
            id,
            client_id,
            timestamp,
            hash: hash_link(&id, &[]),
            parent_hash: String::new(),
            change_records: Vec::new(),
            metadata: CommitMetadata::default(),
        }
    }

    /// Rebuild a commit exactly as it was persisted, hashes included.
    pub fn from_stored(
        id: CommitId,
        client_id: ClientId,
        timestamp: HybridTimestamp,
        hash: String,
        parent_hash: String,
        change_records: Vec<ChangeRecord>,
        metadata: CommitMetadata,
    ) -> Self {
        Self {
            id,
            client_id,
            timestamp,
            hash,
            parent_hash,
            change_records,
            metadata,
        }
    }

    /// Append a change; its index is its position in the commit.
    pub fn push_change(&mut self, change: Change) {
        let index = self.change_records.len() as u32;
        self.change_records
            .push(ChangeRecord::new(index, self.id, change));
    }

    /// Builder-style [`push_change`](Self::push_change).
    pub fn with_change(mut self, change: Change) -> Self {
        self.push_change(change);
        self
    }

    pub fn with_changes(mut self, changes: impl IntoIterator<Item = Change>) -> Self {
        for change in changes {
            self.push_change(change);
        }
        self
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn parent_hash(&self) -> &str {
        &self.parent_hash
    }

    /// Link this commit behind `parent_hash`, recomputing its own hash.
    pub fn set_parent_hash(&mut self, parent_hash: &str) -> Result<()> {
        self.hash = self.generate_hash(parent_hash)?;
        self.parent_hash = parent_hash.to_string();
        Ok(())
    }

    /// The hash this commit would have behind `parent_hash`.
    pub fn generate_hash(&self, parent_hash: &str) -> Result<String> {
        let parent = hex::decode(parent_hash).map_err(|e| CoreError::InvalidHash {
            hash: parent_hash.to_string(),
            reason: e.to_string(),
        })?;
        Ok(hash_link(&self.id, &parent))
    }

    /// Total-order key: wall clock, counter, then id.
    pub fn compare_key(&self) -> (HybridTimestamp, CommitId) {
        (self.timestamp, self.id)
    }

    pub fn sync_date(&self) -> Option<DateTime<Utc>> {
        self.metadata.sync_date
    }

    pub fn set_sync_date(&mut self, sync_date: Option<DateTime<Utc>>) {
        self.metadata.sync_date = sync_date;
    }

    /// Ids of every entity touched by this commit, in record order.
    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.change_records.iter().map(|r| r.entity_id)
    }
}

impl fmt::Display for Commit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] @ {} by {}",
            self.id, self.hash, self.timestamp, self.client_id
        )
    }
}

/// Order two commits by their total-order key.
pub fn compare_commits(a: &Commit, b: &Commit) -> Ordering {
    a.compare_key().cmp(&b.compare_key())
}

/// Sort commits into the default log order.
pub fn sort_commits(commits: &mut [Commit]) {
    commits.sort_by(compare_commits);
}

// The id is hashed in GUID byte order (first three fields little-endian) so
// hashes match peers that serialize ids that way.
fn hash_link(id: &CommitId, parent: &[u8]) -> String {
    let mut input = Vec::with_capacity(16 + parent.len());
    input.extend_from_slice(&id.as_uuid().to_bytes_le());
    input.extend_from_slice(parent);
    format!("{:016X}", xxh64(&input, 0))
}
