//! Local history: patches, point-in-time queries, reopening, failed commits.

use std::sync::Arc;

use lexsync::core::{millis_to_datetime, sort_commits, ManualTimeSource};
use lexsync::store::{CommitStore, MemoryStore, SqliteStore};
use lexsync::{
    Change, Commit, DataModel, DataModelConfig, Entity, EntityId, EntityKind, ModelError, PatchDocument,
};
use lexsync_testkit::fixtures::{create_entry, create_part_of_speech, create_sense, delete, Author};
use proptest::prelude::*;

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

#[tokio::test]
async fn test_patch_splits_into_typed_changes() -> anyhow::Result<()> {
    let author = Author::new(1_000);
    let model = replica(&author).await?;

    let entry = EntityId::new_v4();
    let sense = EntityId::new_v4();
    let noun = EntityId::new_v4();
    model
        .add_changes(vec![
            create_entry(entry, "apple"),
            create_sense(sense, entry, "fruit"),
            create_part_of_speech(noun, "noun"),
        ])
        .await?;

    let patch = PatchDocument::new()
        .replace("/partOfSpeechId", noun)?
        .replace("/gloss/en", "pome")?;
    let commit = model.patch_entity(sense, patch).await?;

    let changes: Vec<&Change> = commit.change_records.iter().map(|r| &r.change).collect();
    assert_eq!(changes.len(), 2);
    assert!(matches!(changes[0], Change::SetPartOfSpeech(_)));
    assert!(matches!(changes[1], Change::JsonPatch(_)));

    let Some(Entity::Sense(patched)) = model.get_latest(sense).await else {
        panic!("sense missing");
    };
    assert_eq!(patched.part_of_speech_id, Some(noun));
    assert_eq!(patched.gloss.get("en"), Some("pome"));

    // Deleting the part of speech clears the reference but keeps the sense.
    model.add_change(delete(noun)).await?;
    let Some(Entity::Sense(after)) = model.get_latest(sense).await else {
        panic!("sense missing");
    };
    assert_eq!(after.part_of_speech_id, None);
    assert!(after.deleted_at.is_none());
    Ok(())
}

#[tokio::test]
async fn test_patch_unknown_entity_is_not_found() -> anyhow::Result<()> {
    let author = Author::new(1_000);
    let model = replica(&author).await?;

    let missing = EntityId::new_v4();
    let err = model
        .patch_entity(missing, PatchDocument::new().remove("/note/en"))
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::EntityNotFound(id) if id == missing));
    Ok(())
}

#[tokio::test]
async fn test_empty_commit_is_rejected() -> anyhow::Result<()> {
    let author = Author::new(1_000);
    let model = replica(&author).await?;

    let err = model.add_changes(Vec::new()).await.unwrap_err();
    assert!(matches!(err, ModelError::InvalidOperation(_)));
    assert!(model.store().current_commits().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_failed_commit_is_not_stored() -> anyhow::Result<()> {
    let author = Author::new(1_000);
    let model = replica(&author).await?;

    let entry = EntityId::new_v4();
    model.add_change(create_entry(entry, "apple")).await?;

    // Deleting something that never existed cannot be replayed.
    author.set_time(2_000);
    let err = model.add_change(delete(EntityId::new_v4())).await.unwrap_err();
    assert!(err.is_replay());

    assert_eq!(model.store().current_commits().await?.len(), 1);
    assert!(model.get_latest(entry).await.is_some());
    model.validate_commits().await?;
    Ok(())
}

#[tokio::test]
async fn test_entity_at_point_in_time() -> anyhow::Result<()> {
    let author = Author::new(1_000);
    let model = replica(&author).await?;

    let entry = EntityId::new_v4();
    model.add_change(create_entry(entry, "apple")).await?;
    author.set_time(2_000);
    model
        .patch_entity(entry, PatchDocument::new().replace("/lexemeForm/en", "pear")?)
        .await?;

    let headword = |entity: Option<Entity>| {
        entity
            .and_then(|e| e.as_entry().and_then(|e| e.headword().map(str::to_string)))
    };

    assert_eq!(model.get_entity_at(millis_to_datetime(500), entry).await?, None);
    assert_eq!(
        headword(model.get_entity_at(millis_to_datetime(1_500), entry).await?),
        Some("apple".to_string())
    );
    assert_eq!(
        headword(model.get_entity_at(millis_to_datetime(2_000), entry).await?),
        Some("pear".to_string())
    );
    assert_eq!(headword(model.get_latest(entry).await), Some("pear".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_reopen_seeds_clock_and_replays() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("project.sqlite");
    let author = Author::new(5_000);
    let entry = EntityId::new_v4();

    let first = {
        let model = DataModel::open(
            SqliteStore::open(&path)?,
            author.source(),
            author.client_id,
            DataModelConfig::default(),
        )
        .await?;
        model.add_change(create_entry(entry, "apple")).await?
    };

    // The wall clock went backwards while the replica was closed.
    let source = Arc::new(ManualTimeSource::at_millis(1_000));
    let model = DataModel::open(
        SqliteStore::open(&path)?,
        source,
        author.client_id,
        DataModelConfig::default(),
    )
    .await?;

    assert!(model.get_latest(entry).await.is_some());
    let second = model.add_change(create_entry(EntityId::new_v4(), "pear")).await?;
    assert!(second.timestamp > first.timestamp);
    assert_eq!(model.entities(EntityKind::Entry).await.len(), 2);
    model.validate_commits().await?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Arrival order
// ─────────────────────────────────────────────────────────────────────────────

/// Entries, senses under random entries, and deletes of some entries,
/// each stamped after whatever it depends on.
fn history() -> impl Strategy<Value = (Vec<(usize, i64, bool, i64)>, Vec<(usize, usize, i64)>)> {
    let entries = prop::collection::vec((0usize..3, 0i64..1_000, any::<bool>(), 1i64..500), 1..6);
    entries.prop_flat_map(|entries| {
        let count = entries.len();
        let senses = prop::collection::vec((0usize..3, 0..count, 1i64..500), 0..6);
        (Just(entries), senses)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Each author's commits arrive in their own order, a few at a time,
    /// while the authors themselves arrive in any order. A delete never
    /// reaches a replica before the create it targets.
    #[test]
    fn test_arrival_order_does_not_matter(
        (entries, senses) in history(),
        order in Just(vec![0usize, 1, 2]).prop_shuffle(),
        chunk in 1usize..4,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let authors: Vec<Author> = (0..3).map(|_| Author::new(0)).collect();
            let ids: Vec<EntityId> = entries.iter().map(|_| EntityId::new_v4()).collect();

            let mut by_author: Vec<Vec<Commit>> = vec![Vec::new(); authors.len()];
            for (i, &(by, at, deleted, delay)) in entries.iter().enumerate() {
                by_author[by].push(authors[by].commit_at(at, vec![create_entry(ids[i], "word")]));
                if deleted {
                    by_author[by].push(authors[by].commit_at(at + delay, vec![delete(ids[i])]));
                }
            }
            let mut all_ids = ids.clone();
            for &(by, entry, delay) in &senses {
                let sense = EntityId::new_v4();
                all_ids.push(sense);
                let at = entries[entry].1 + delay;
                by_author[by].push(authors[by].commit_at(at, vec![create_sense(sense, ids[entry], "gloss")]));
            }
            for commits in &mut by_author {
                sort_commits(commits);
            }

            let forward = replica(&Author::new(0)).await.unwrap();
            forward.add_range_from_sync(by_author.concat()).await.unwrap();

            let scattered = replica(&Author::new(0)).await.unwrap();
            for &author in &order {
                for batch in by_author[author].chunks(chunk) {
                    scattered.add_range_from_sync(batch.to_vec()).await.unwrap();
                }
            }

            for kind in [EntityKind::Entry, EntityKind::Sense] {
                assert_eq!(forward.entities(kind).await, scattered.entities(kind).await);
            }
            for id in all_ids {
                assert_eq!(forward.get_latest(id).await, scattered.get_latest(id).await);
            }
            assert_eq!(
                forward.get_sync_state().await.unwrap(),
                scattered.get_sync_state().await.unwrap()
            );
            scattered.validate_commits().await.unwrap();
        });
    }
}
