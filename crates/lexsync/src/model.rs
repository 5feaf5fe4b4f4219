//! The DataModel: one local replica of a project's commit log.
//!
//! The model owns the store, the hybrid clock and the replay engine.
//! Every write goes through [`DataModel::add_range`], which stores the
//! commits, re-links the hash chain and folds them into the snapshots.

use std::slice;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lexsync_core::change::JsonPatchChange;
use lexsync_core::{
    link_chain, sort_commits, validate_commits, Change, ChangesResult, ClientId, Commit,
    CommitId, Entity, EntityId, EntityKind, HybridClock, PatchDocument, SyncState,
    SystemTimeSource, TimeSource,
};
use lexsync_store::CommitStore;
use lexsync_sync::{CancellationToken, SyncConfig, SyncError, SyncResults, SyncSession, Syncable};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{ModelError, Result};
use crate::snapshot::Snapshots;

/// Configuration for the DataModel.
#[derive(Debug, Clone)]
pub struct DataModelConfig {
    /// Validate the whole hash chain after every append.
    pub auto_validate: bool,
    /// Sync configuration.
    pub sync: SyncConfig,
}

impl Default for DataModelConfig {
    fn default() -> Self {
        Self {
            auto_validate: true,
            sync: SyncConfig::default(),
        }
    }
}

impl DataModelConfig {
    pub fn with_auto_validate(mut self, auto_validate: bool) -> Self {
        self.auto_validate = auto_validate;
        self
    }

    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }
}

/// A local replica.
///
/// Provides a unified API for:
/// - Recording local changes as commits
/// - Accepting commits from peers
/// - Querying materialized entities, now or at a point in time
/// - Syncing with a remote replica
pub struct DataModel<S: CommitStore, T: TimeSource = SystemTimeSource> {
    store: Arc<S>,
    clock: HybridClock<T>,
    client_id: ClientId,
    config: DataModelConfig,
    /// Also serializes writers: held for the whole of every append.
    snapshots: Mutex<Snapshots>,
}

impl<S: CommitStore> DataModel<S, SystemTimeSource> {
    /// Open a replica on the system clock.
    pub async fn open_system(store: S, client_id: ClientId) -> Result<Self> {
        Self::open(store, SystemTimeSource, client_id, DataModelConfig::default()).await
    }
}

impl<S: CommitStore, T: TimeSource> DataModel<S, T> {
    /// Open a replica over `store`.
    ///
    /// The clock is seeded with the newest stored timestamp so new commits
    /// always sort after existing history, and the snapshots are rebuilt
    /// from the full log.
    pub async fn open(
        store: S,
        time_source: T,
        client_id: ClientId,
        config: DataModelConfig,
    ) -> Result<Self> {
        let clock = match store.latest_timestamp().await? {
            Some(latest) => HybridClock::with_last_issued(time_source, latest),
            None => HybridClock::new(time_source),
        };
        let commits = store.current_commits().await?;
        let snapshots = Snapshots::replay(&commits).await?;
        info!(%client_id, commits = commits.len(), "opened replica");

        Ok(Self {
            store: Arc::new(store),
            clock,
            client_id,
            config,
            snapshots: Mutex::new(snapshots),
        })
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn clock(&self) -> &HybridClock<T> {
        &self.clock
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &DataModelConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Local Changes
    // ─────────────────────────────────────────────────────────────────────────

    /// Record one change as a new commit.
    pub async fn add_change(&self, change: Change) -> Result<Commit> {
        self.add_changes(vec![change]).await
    }

    /// Record several changes as one atomic commit.
    pub async fn add_changes(&self, changes: Vec<Change>) -> Result<Commit> {
        if changes.is_empty() {
            return Err(ModelError::InvalidOperation(
                "a commit needs at least one change".into(),
            ));
        }
        let commit = Commit::new(self.client_id, self.clock.get_timestamp()).with_changes(changes);
        self.add_commit(commit).await
    }

    /// Append a prepared commit and return it as stored.
    pub async fn add_commit(&self, commit: Commit) -> Result<Commit> {
        let id = commit.id;
        self.add_range(vec![commit]).await?;
        self.store
            .get_commit(&id)
            .await?
            .ok_or_else(|| ModelError::InvalidOperation(format!("commit {id} was not stored")))
    }

    /// Apply a generic patch to an entity.
    ///
    /// Relationship fields of senses and entries become their typed
    /// changes; everything else rides along as a JSON patch change.
    pub async fn patch_entity(&self, id: EntityId, patch: PatchDocument) -> Result<Commit> {
        let entity = self
            .get_latest(id)
            .await
            .ok_or(ModelError::EntityNotFound(id))?;
        let changes = match &entity {
            Entity::Sense(sense) => sense.to_changes(patch)?,
            Entity::Entry(entry) => entry.to_changes(patch)?,
            _ if patch.is_empty() => Vec::new(),
            _ => vec![Change::JsonPatch(JsonPatchChange::new(id, patch))],
        };
        self.add_changes(changes).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Appending History
    // ─────────────────────────────────────────────────────────────────────────

    /// Store and replay commits, skipping ids already known.
    ///
    /// Commits are taken in log order. A commit that fails to replay is
    /// not stored and its error is returned; the commits before it stay.
    /// Returns how many commits were added.
    pub async fn add_range(&self, commits: Vec<Commit>) -> Result<usize> {
        let mut snapshots = self.snapshots.lock().await;

        let mut fresh = self.store.filter_existing(commits).await?;
        sort_commits(&mut fresh);
        fresh.dedup_by_key(|c| c.id);
        if fresh.is_empty() {
            return Ok(0);
        }

        let split = fresh.partition_point(|c| !snapshots.extends_tip(c));
        let (past, future) = fresh.split_at(split);
        if !past.is_empty() {
            self.insert_past(&mut snapshots, past).await?;
        }

        let mut applied = Vec::with_capacity(future.len());
        let mut failure = None;
        for commit in future {
            match snapshots.apply_commit(commit).await {
                Ok(()) => applied.push(commit.clone()),
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        if !applied.is_empty() {
            self.persist(&applied).await?;
        }
        if let Some(e) = failure {
            return Err(e);
        }

        debug!(added = fresh.len(), rebuilt = !past.is_empty(), "appended commits");
        Ok(fresh.len())
    }

    /// Accept commits pulled from a peer.
    ///
    /// The clock first catches up with the incoming timestamps so later
    /// local commits sort after them. Replay errors propagate.
    pub async fn add_range_from_sync(&self, commits: Vec<Commit>) -> Result<usize> {
        self.clock.merge_observed(commits.iter().map(|c| c.timestamp));
        self.add_range(commits).await
    }

    /// Commits sorting before the snapshot tip force a rebuild.
    async fn insert_past(&self, snapshots: &mut Snapshots, past: &[Commit]) -> Result<()> {
        match self.rebuild_with(past).await {
            Ok(rebuilt) => {
                self.persist(past).await?;
                *snapshots = rebuilt;
                Ok(())
            }
            Err(e) if e.is_replay() && past.len() > 1 => {
                // Find the failing commit, keeping everything before it.
                for commit in past {
                    let rebuilt = self.rebuild_with(slice::from_ref(commit)).await?;
                    self.persist(slice::from_ref(commit)).await?;
                    *snapshots = rebuilt;
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn rebuild_with(&self, extra: &[Commit]) -> Result<Snapshots> {
        let mut commits = self.store.current_commits().await?;
        commits.extend_from_slice(extra);
        sort_commits(&mut commits);
        Snapshots::replay(&commits).await
    }

    /// Store commits and re-link the chain from the oldest of them.
    async fn persist(&self, commits: &[Commit]) -> Result<()> {
        self.store.add_commits(commits).await?;

        let Some(oldest) = commits.iter().map(Commit::compare_key).min() else {
            return Ok(());
        };
        let mut all = self.store.current_commits().await?;
        let start = all.partition_point(|c| c.compare_key() < oldest);
        let parent = match start {
            0 => String::new(),
            n => all[n - 1].hash().to_string(),
        };
        link_chain(&mut all[start..], &parent)?;
        self.store.update_hashes(&all[start..]).await?;

        if self.config.auto_validate {
            validate_commits(&all)?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Current state of an entity, tombstoned ones included.
    pub async fn get_latest(&self, id: EntityId) -> Option<Entity> {
        self.snapshots.lock().await.get(id)
    }

    /// Live entities of one kind.
    pub async fn entities(&self, kind: EntityKind) -> Vec<Entity> {
        self.snapshots.lock().await.live(kind)
    }

    /// State of an entity as of `time`, replaying only commits whose wall
    /// clock is not after it.
    pub async fn get_entity_at(&self, time: DateTime<Utc>, id: EntityId) -> Result<Option<Entity>> {
        let commits: Vec<Commit> = self
            .store
            .current_commits()
            .await?
            .into_iter()
            .filter(|c| c.timestamp.wall_clock <= time)
            .collect();
        Ok(Snapshots::replay(&commits).await?.get(id))
    }

    /// Check the stored hash chain end to end.
    pub async fn validate_commits(&self) -> Result<()> {
        validate_commits(&self.store.current_commits().await?)?;
        Ok(())
    }

    pub async fn get_sync_state(&self) -> Result<SyncState> {
        Ok(self.store.get_sync_state().await?)
    }

    /// Commits a peer at `peer` is missing.
    pub async fn get_changes(&self, peer: &SyncState) -> Result<ChangesResult> {
        Ok(self.store.get_changes(peer).await?)
    }

    /// Commits never confirmed with a peer.
    pub async fn pending_commits(&self) -> Result<Vec<Commit>> {
        Ok(self.store.unsynced_commits().await?)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Sync with a remote replica.
    pub async fn sync_with(
        &self,
        remote: &dyn Syncable,
        cancel: &CancellationToken,
    ) -> Result<SyncResults> {
        let session = SyncSession::new(self.config.sync.clone());
        Ok(session.sync_with(self, remote, cancel).await?)
    }

    /// Sync with several remotes, then push each whatever it still lacks.
    pub async fn sync_many(
        &self,
        remotes: &[&dyn Syncable],
        cancel: &CancellationToken,
    ) -> Result<Vec<SyncResults>> {
        let session = SyncSession::new(self.config.sync.clone());
        Ok(session.sync_many(self, remotes, cancel).await?)
    }
}

#[async_trait]
impl<S: CommitStore, T: TimeSource> Syncable for DataModel<S, T> {
    async fn should_sync(&self, _cancel: &CancellationToken) -> bool {
        true
    }

    async fn get_sync_state(&self, _cancel: &CancellationToken) -> lexsync_sync::Result<SyncState> {
        self.store
            .get_sync_state()
            .await
            .map_err(SyncError::replica)
    }

    async fn get_changes(
        &self,
        other: &SyncState,
        _cancel: &CancellationToken,
    ) -> lexsync_sync::Result<ChangesResult> {
        self.store
            .get_changes(other)
            .await
            .map_err(SyncError::replica)
    }

    async fn add_range_from_sync(
        &self,
        commits: Vec<Commit>,
        _cancel: &CancellationToken,
    ) -> lexsync_sync::Result<()> {
        DataModel::add_range_from_sync(self, commits)
            .await
            .map(|_| ())
            .map_err(SyncError::replica)
    }

    async fn mark_synced(&self, ids: &[CommitId]) -> lexsync_sync::Result<()> {
        self.store
            .set_sync_date(ids, Some(self.clock.source().now()))
            .await
            .map_err(SyncError::replica)
    }

    async fn known_commits(&self, ids: &[CommitId]) -> lexsync_sync::Result<Vec<CommitId>> {
        let mut known = Vec::with_capacity(ids.len());
        for id in ids {
            if self.store.has_commit(id).await.map_err(SyncError::replica)? {
                known.push(*id);
            }
        }
        Ok(known)
    }
}
