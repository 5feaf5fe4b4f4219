//! In-memory implementation of the commit store.
//!
//! Same semantics as SQLite, no persistence.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lexsync_core::{ClientId, Commit, CommitId, HybridTimestamp};
use parking_lot::RwLock;

use crate::error::Result;
use crate::traits::CommitStore;

type OrderKey = (HybridTimestamp, CommitId);

/// In-memory commit store. All data is lost when the store is dropped.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Commits in log order.
    commits: BTreeMap<OrderKey, Commit>,
    /// Id index into `commits`.
    keys: HashMap<CommitId, OrderKey>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.read().commits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MemoryStoreInner {
    fn get_mut(&mut self, id: &CommitId) -> Option<&mut Commit> {
        let key = self.keys.get(id)?;
        self.commits.get_mut(key)
    }
}

#[async_trait]
impl CommitStore for MemoryStore {
    async fn add_commits(&self, commits: &[Commit]) -> Result<usize> {
        let mut inner = self.inner.write();
        let mut added = 0;
        for commit in commits {
            if inner.keys.contains_key(&commit.id) {
                continue;
            }
            let key = commit.compare_key();
            inner.keys.insert(commit.id, key);
            inner.commits.insert(key, commit.clone());
            added += 1;
        }
        Ok(added)
    }

    async fn get_commit(&self, id: &CommitId) -> Result<Option<Commit>> {
        let inner = self.inner.read();
        Ok(inner.keys.get(id).and_then(|key| inner.commits.get(key)).cloned())
    }

    async fn has_commit(&self, id: &CommitId) -> Result<bool> {
        Ok(self.inner.read().keys.contains_key(id))
    }

    async fn current_commits(&self) -> Result<Vec<Commit>> {
        Ok(self.inner.read().commits.values().cloned().collect())
    }

    async fn commits_by_client(&self, client: &ClientId) -> Result<Vec<Commit>> {
        Ok(self
            .inner
            .read()
            .commits
            .values()
            .filter(|c| c.client_id == *client)
            .cloned()
            .collect())
    }

    async fn find_by_hash(&self, hash: &str) -> Result<Option<Commit>> {
        Ok(self
            .inner
            .read()
            .commits
            .values()
            .find(|c| c.hash() == hash)
            .cloned())
    }

    async fn latest_commit(&self) -> Result<Option<Commit>> {
        Ok(self
            .inner
            .read()
            .commits
            .last_key_value()
            .map(|(_, c)| c.clone()))
    }

    async fn update_hashes(&self, commits: &[Commit]) -> Result<()> {
        let mut inner = self.inner.write();
        for commit in commits {
            if let Some(stored) = inner.get_mut(&commit.id) {
                *stored = Commit::from_stored(
                    stored.id,
                    stored.client_id,
                    stored.timestamp,
                    commit.hash().to_string(),
                    commit.parent_hash().to_string(),
                    std::mem::take(&mut stored.change_records),
                    stored.metadata.clone(),
                );
            }
        }
        Ok(())
    }

    async fn set_sync_date(&self, ids: &[CommitId], date: Option<DateTime<Utc>>) -> Result<()> {
        let mut inner = self.inner.write();
        for id in ids {
            if let Some(stored) = inner.get_mut(id) {
                stored.set_sync_date(date);
            }
        }
        Ok(())
    }

    async fn unsynced_commits(&self) -> Result<Vec<Commit>> {
        Ok(self
            .inner
            .read()
            .commits
            .values()
            .filter(|c| c.sync_date().is_none())
            .cloned()
            .collect())
    }
}
