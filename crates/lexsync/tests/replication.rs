//! Replicas exchanging commits until they agree.

use std::sync::Arc;

use async_trait::async_trait;
use lexsync::core::{millis_to_datetime, ManualTimeSource};
use lexsync::store::{CommitStore, MemoryStore};
use lexsync::sync::{HealthCache, SyncError};
use lexsync::{
    CancellationToken, ChangesResult, Commit, DataModel, DataModelConfig, Entity, EntityId,
    EntityKind, LocalRpc, ModelError, RemoteReplica, SyncState, Syncable,
};
use lexsync_testkit::fixtures::{create_entry, create_sense, delete, Author};

type Replica = DataModel<MemoryStore, Arc<ManualTimeSource>>;

async fn replica(author: &Author) -> anyhow::Result<Replica> {
    Ok(DataModel::open(
        MemoryStore::default(),
        author.source(),
        author.client_id,
        DataModelConfig::default(),
    )
    .await?)
}

/// Hand `to` everything `from` has that it lacks.
async fn pull(from: &Replica, to: &Replica) -> anyhow::Result<usize> {
    let changes = from.get_changes(&to.get_sync_state().await?).await?;
    Ok(to.add_range_from_sync(changes.missing_commits).await?)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn sense_deleted_at(entity: Option<Entity>) -> Option<chrono::DateTime<chrono::Utc>> {
    entity.and_then(|e| e.deleted_at())
}

#[tokio::test]
async fn test_pulling_twice_is_idempotent() -> anyhow::Result<()> {
    let alice = Author::new(1_000);
    let bob = Author::new(1_000);
    let a = replica(&alice).await?;
    let b = replica(&bob).await?;

    let entry = EntityId::new_v4();
    a.add_change(create_entry(entry, "apple")).await?;
    a.add_change(create_sense(EntityId::new_v4(), entry, "fruit")).await?;

    let commits = a.store().current_commits().await?;
    assert_eq!(b.add_range_from_sync(commits.clone()).await?, 2);
    let before = b.entities(EntityKind::Sense).await;

    assert_eq!(b.add_range_from_sync(commits).await?, 0);
    assert_eq!(b.entities(EntityKind::Sense).await, before);
    b.validate_commits().await?;
    Ok(())
}

#[tokio::test]
async fn test_delete_before_sense_in_log_order() -> anyhow::Result<()> {
    let alice = Author::new(1_000);
    let bob = Author::new(1_000);
    let a = replica(&alice).await?;
    let b = replica(&bob).await?;

    let entry = EntityId::new_v4();
    let sense = EntityId::new_v4();
    a.add_change(create_entry(entry, "apple")).await?;
    pull(&a, &b).await?;

    // Concurrent edits: the delete sorts first.
    alice.set_time(2_000);
    a.add_change(delete(entry)).await?;
    bob.set_time(3_000);
    b.add_change(create_sense(sense, entry, "fruit")).await?;

    // `a` receives the sense after its tip, `b` receives the delete before its tip.
    pull(&b, &a).await?;
    pull(&a, &b).await?;

    for replica in [&a, &b] {
        assert!(replica.get_latest(entry).await.is_some_and(|e| e.is_deleted()));
        assert_eq!(
            sense_deleted_at(replica.get_latest(sense).await),
            Some(millis_to_datetime(3_000))
        );
        replica.validate_commits().await?;
    }
    assert_eq!(a.get_sync_state().await?, b.get_sync_state().await?);
    Ok(())
}

#[tokio::test]
async fn test_delete_after_sense_in_log_order() -> anyhow::Result<()> {
    let alice = Author::new(1_000);
    let bob = Author::new(1_000);
    let a = replica(&alice).await?;
    let b = replica(&bob).await?;

    let entry = EntityId::new_v4();
    let sense = EntityId::new_v4();
    a.add_change(create_entry(entry, "apple")).await?;
    pull(&a, &b).await?;

    bob.set_time(3_000);
    b.add_change(create_sense(sense, entry, "fruit")).await?;
    alice.set_time(4_000);
    a.add_change(delete(entry)).await?;

    // Opposite arrival order from the other test.
    pull(&a, &b).await?;
    pull(&b, &a).await?;

    for replica in [&a, &b] {
        assert_eq!(
            sense_deleted_at(replica.get_latest(sense).await),
            Some(millis_to_datetime(4_000))
        );
        assert!(replica.entities(EntityKind::Sense).await.is_empty());
    }
    Ok(())
}

#[tokio::test]
async fn test_sync_over_loopback_converges() -> anyhow::Result<()> {
    init_tracing();
    let alice = Author::new(1_000);
    let bob = Author::new(1_000);
    let a = replica(&alice).await?;
    let b = Arc::new(replica(&bob).await?);

    let apple = EntityId::new_v4();
    let pear = EntityId::new_v4();
    a.add_change(create_entry(apple, "apple")).await?;
    bob.set_time(1_500);
    b.add_change(create_entry(pear, "pear")).await?;

    let remote = RemoteReplica::new(LocalRpc::new(Arc::clone(&b)), Arc::new(HealthCache::new()));
    let cancel = CancellationToken::new();
    let results = a.sync_with(&remote, &cancel).await?;

    assert!(results.is_synced);
    assert_eq!(results.missing_from_local.len(), 1);
    assert_eq!(results.missing_from_remote.len(), 1);
    assert!(a.pending_commits().await?.is_empty());

    for replica in [&a, b.as_ref()] {
        assert!(replica.get_latest(apple).await.is_some());
        assert!(replica.get_latest(pear).await.is_some());
        assert_eq!(replica.entities(EntityKind::Entry).await.len(), 2);
    }

    // Nothing left to exchange.
    let again = a.sync_with(&remote, &cancel).await?;
    assert!(again.missing_from_local.is_empty());
    assert!(again.missing_from_remote.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_pulled_commits_advance_the_clock() -> anyhow::Result<()> {
    let alice = Author::new(9_000);
    let bob = Author::new(1_000);
    let a = replica(&alice).await?;
    let b = replica(&bob).await?;

    a.add_change(create_entry(EntityId::new_v4(), "apple")).await?;
    pull(&a, &b).await?;

    let local = b.add_change(create_entry(EntityId::new_v4(), "pear")).await?;
    assert!(local.timestamp.wall_millis() >= 9_000);
    b.validate_commits().await?;
    Ok(())
}

/// A peer that stores whatever it is sent and never replays it.
#[derive(Default)]
struct Archive {
    store: MemoryStore,
}

#[async_trait]
impl Syncable for Archive {
    async fn should_sync(&self, _cancel: &CancellationToken) -> bool {
        true
    }

    async fn get_sync_state(&self, _cancel: &CancellationToken) -> lexsync::sync::Result<SyncState> {
        self.store.get_sync_state().await.map_err(SyncError::replica)
    }

    async fn get_changes(
        &self,
        other: &SyncState,
        _cancel: &CancellationToken,
    ) -> lexsync::sync::Result<ChangesResult> {
        self.store.get_changes(other).await.map_err(SyncError::replica)
    }

    async fn add_range_from_sync(
        &self,
        commits: Vec<Commit>,
        _cancel: &CancellationToken,
    ) -> lexsync::sync::Result<()> {
        self.store.add_commits(&commits).await.map_err(SyncError::replica)?;
        Ok(())
    }
}

#[tokio::test]
async fn test_failed_pull_keeps_stamps_for_what_landed() -> anyhow::Result<()> {
    let alice = Author::new(500);
    let carol = Author::new(0);
    let a = replica(&alice).await?;
    a.add_change(create_entry(EntityId::new_v4(), "apple")).await?;

    let pear = EntityId::new_v4();
    let plum = EntityId::new_v4();
    let archive = Archive::default();
    archive
        .store
        .add_commits(&[
            carol.commit_at(1_000, vec![create_entry(pear, "pear")]),
            carol.commit_at(2_000, vec![delete(EntityId::new_v4())]),
            carol.commit_at(3_000, vec![create_entry(plum, "plum")]),
        ])
        .await?;

    let err = a
        .sync_with(&archive, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::Sync(_)));

    // The push went through and the replay kept its prefix; both are stamped.
    assert_eq!(archive.store.current_commits().await?.len(), 4);
    assert!(a.get_latest(pear).await.is_some());
    assert!(a.get_latest(plum).await.is_none());
    assert!(a.pending_commits().await?.is_empty());
    assert_eq!(a.store().current_commits().await?.len(), 2);
    Ok(())
}
