//! In-memory replay engine.
//!
//! Holds the materialized state of every entity. Commits are applied
//! atomically: records go into a staging map that is merged only when the
//! whole commit succeeds.

use std::collections::HashMap;

use async_trait::async_trait;
use lexsync_core::{
    ChangeContext, ChangeError, ChangeRecord, Commit, CommitId, Entity, EntityChange, EntityId,
    EntityKind, HybridTimestamp,
};
use tracing::debug;

use crate::error::{ModelError, Result};

/// Materialized entities and the last commit folded into them.
#[derive(Debug, Default)]
pub struct Snapshots {
    entities: HashMap<EntityId, Entity>,
    tip: Option<(HybridTimestamp, CommitId)>,
    applied: usize,
}

impl Snapshots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay `commits` (in log order) from an empty state.
    pub async fn replay(commits: &[Commit]) -> Result<Self> {
        let mut snapshots = Self::new();
        for commit in commits {
            snapshots.apply_commit(commit).await?;
        }
        debug!(commits = commits.len(), entities = snapshots.len(), "replayed history");
        Ok(snapshots)
    }

    /// Ordering key of the newest applied commit.
    pub fn tip(&self) -> Option<(HybridTimestamp, CommitId)> {
        self.tip
    }

    /// Whether `commit` sorts after everything applied so far.
    pub fn extends_tip(&self, commit: &Commit) -> bool {
        self.tip.map_or(true, |tip| commit.compare_key() > tip)
    }

    pub fn applied_commits(&self) -> usize {
        self.applied
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Current state of an entity, tombstoned ones included.
    ///
    /// Entries come back with their component and complex form views
    /// filled from live [`Entity::ComplexFormComponent`]s.
    pub fn get(&self, id: EntityId) -> Option<Entity> {
        let mut entity = self.entities.get(&id)?.clone();
        if let Entity::Entry(entry) = &mut entity {
            let mut links: Vec<_> = self
                .entities
                .values()
                .filter(|e| !e.is_deleted())
                .filter_map(Entity::as_component)
                .filter(|c| c.complex_form_entry_id == id || c.component_entry_id == id)
                .cloned()
                .collect();
            links.sort_by_key(|c| c.id);
            entry.components = links
                .iter()
                .filter(|c| c.complex_form_entry_id == id)
                .cloned()
                .collect();
            entry.complex_forms = links
                .into_iter()
                .filter(|c| c.component_entry_id == id)
                .collect();
        }
        Some(entity)
    }

    /// Live entities of one kind, ordered by id.
    pub fn live(&self, kind: EntityKind) -> Vec<Entity> {
        let mut ids: Vec<EntityId> = self
            .entities
            .values()
            .filter(|e| e.kind() == kind && !e.is_deleted())
            .map(Entity::id)
            .collect();
        ids.sort();
        ids.into_iter().filter_map(|id| self.get(id)).collect()
    }

    /// Apply every record of `commit`, or none of them.
    pub async fn apply_commit(&mut self, commit: &Commit) -> Result<()> {
        let mut records: Vec<&ChangeRecord> = commit.change_records.iter().collect();
        records.sort_by_key(|r| r.index);

        let mut staged = HashMap::new();
        for record in records {
            self.apply_record(commit, record, &mut staged)
                .await
                .map_err(|source| ModelError::Replay {
                    commit: commit.id,
                    source,
                })?;
        }

        self.entities.extend(staged);
        self.tip = self.tip.max(Some(commit.compare_key()));
        self.applied += 1;
        Ok(())
    }

    async fn apply_record(
        &self,
        commit: &Commit,
        record: &ChangeRecord,
        staged: &mut HashMap<EntityId, Entity>,
    ) -> std::result::Result<(), ChangeError> {
        let id = record.entity_id;
        let current = staged.get(&id).or_else(|| self.entities.get(&id)).cloned();
        let was_deleted = current.as_ref().is_some_and(Entity::is_deleted);
        let mut entity = match current {
            Some(entity) => entity,
            None => record.change.new_entity(commit)?,
        };

        let ctx = StagedContext {
            commit,
            base: &self.entities,
            staged: &*staged,
            applying: id,
        };
        record.change.apply_change(&mut entity, &ctx).await?;

        let now_deleted = entity.is_deleted();
        staged.insert(id, entity);
        if now_deleted && !was_deleted {
            self.cascade_delete(id, commit, staged);
        }
        Ok(())
    }

    /// Tell every live dependent of `deleted` that it is gone, following
    /// dependents that become deleted in turn.
    fn cascade_delete(
        &self,
        deleted: EntityId,
        commit: &Commit,
        staged: &mut HashMap<EntityId, Entity>,
    ) {
        let mut pending = vec![deleted];
        while let Some(gone) = pending.pop() {
            let dependents: Vec<Entity> = visible(&self.entities, staged)
                .filter(|e| !e.is_deleted() && e.references().contains(&gone))
                .cloned()
                .collect();
            for mut dependent in dependents {
                dependent.remove_reference(gone, commit);
                if dependent.is_deleted() {
                    debug!(entity = %dependent.id(), reference = %gone, "tombstoned dependent");
                    pending.push(dependent.id());
                }
                staged.insert(dependent.id(), dependent);
            }
        }
    }
}

/// Staged entities shadow base ones.
fn visible<'a>(
    base: &'a HashMap<EntityId, Entity>,
    staged: &'a HashMap<EntityId, Entity>,
) -> impl Iterator<Item = &'a Entity> + 'a {
    staged
        .values()
        .chain(base.values().filter(move |e| !staged.contains_key(&e.id())))
}

/// The view a change sees while one of its commit's records is applied.
///
/// The entity being applied is hidden; it is handed to the change directly.
struct StagedContext<'a> {
    commit: &'a Commit,
    base: &'a HashMap<EntityId, Entity>,
    staged: &'a HashMap<EntityId, Entity>,
    applying: EntityId,
}

#[async_trait]
impl ChangeContext for StagedContext<'_> {
    fn commit(&self) -> &Commit {
        self.commit
    }

    async fn get_current(&self, id: EntityId) -> std::result::Result<Option<Entity>, ChangeError> {
        if id == self.applying {
            return Ok(None);
        }
        Ok(self
            .staged
            .get(&id)
            .or_else(|| self.base.get(&id))
            .cloned())
    }

    async fn objects_referencing(
        &self,
        id: EntityId,
    ) -> std::result::Result<Vec<Entity>, ChangeError> {
        Ok(visible(self.base, self.staged)
            .filter(|e| e.id() != self.applying)
            .filter(|e| !e.is_deleted() && e.references().contains(&id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lexsync_core::change::{
        AddEntryComponentChange, CreateEntryChange, CreateSenseChange, DeleteChange,
        JsonPatchChange,
    };
    use lexsync_core::{Change, ClientId, PatchDocument};

    fn commit(millis: i64, changes: Vec<Change>) -> Commit {
        Commit::new(ClientId::NIL, HybridTimestamp::from_millis(millis, 0)).with_changes(changes)
    }

    fn create_entry(id: EntityId) -> Change {
        Change::CreateEntry(CreateEntryChange::new(id).with_lexeme_form("en", "apple"))
    }

    #[tokio::test]
    async fn test_replay_builds_entities() {
        let entry = EntityId::new_v4();
        let sense = EntityId::new_v4();
        let snapshots = Snapshots::replay(&[
            commit(1, vec![create_entry(entry)]),
            commit(2, vec![Change::CreateSense(CreateSenseChange::new(sense, entry))]),
        ])
        .await
        .unwrap();

        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots.applied_commits(), 2);
        assert_eq!(snapshots.get(sense).unwrap().as_sense().unwrap().entry_id, entry);
    }

    #[tokio::test]
    async fn test_failed_commit_leaves_state_untouched() {
        let entry = EntityId::new_v4();
        let mut snapshots = Snapshots::replay(&[commit(1, vec![create_entry(entry)])])
            .await
            .unwrap();
        let tip = snapshots.tip();

        // second record cannot create an entity from nothing
        let bad = commit(
            2,
            vec![
                Change::Delete(DeleteChange::new(entry)),
                Change::JsonPatch(JsonPatchChange::new(
                    EntityId::new_v4(),
                    PatchDocument::new().remove("/note"),
                )),
            ],
        );
        let err = snapshots.apply_commit(&bad).await.unwrap_err();

        assert!(err.is_replay());
        assert!(!snapshots.get(entry).unwrap().is_deleted());
        assert_eq!(snapshots.tip(), tip);
    }

    #[tokio::test]
    async fn test_delete_cascades_through_dependents() {
        let entry = EntityId::new_v4();
        let other = EntityId::new_v4();
        let sense = EntityId::new_v4();
        let link = EntityId::new_v4();
        let delete = commit(4, vec![Change::Delete(DeleteChange::new(entry))]);

        let snapshots = Snapshots::replay(&[
            commit(1, vec![create_entry(entry), create_entry(other)]),
            commit(2, vec![Change::CreateSense(CreateSenseChange::new(sense, entry))]),
            commit(
                3,
                vec![Change::AddEntryComponent(AddEntryComponentChange::new(
                    link,
                    other,
                    entry,
                    Some(sense),
                ))],
            ),
            delete.clone(),
        ])
        .await
        .unwrap();

        let when = Some(delete.timestamp.wall_clock);
        assert_eq!(snapshots.get(sense).unwrap().deleted_at(), when);
        assert_eq!(snapshots.get(link).unwrap().deleted_at(), when);
        assert!(!snapshots.get(other).unwrap().is_deleted());
    }

    #[tokio::test]
    async fn test_entry_view_lists_live_components() {
        let form = EntityId::new_v4();
        let part = EntityId::new_v4();
        let link = EntityId::new_v4();
        let snapshots = Snapshots::replay(&[
            commit(1, vec![create_entry(form), create_entry(part)]),
            commit(
                2,
                vec![Change::AddEntryComponent(AddEntryComponentChange::new(
                    link, form, part, None,
                ))],
            ),
        ])
        .await
        .unwrap();

        let form_entry = snapshots.get(form).unwrap();
        let components = &form_entry.as_entry().unwrap().components;
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].id, link);

        let part_entry = snapshots.get(part).unwrap();
        assert_eq!(part_entry.as_entry().unwrap().complex_forms.len(), 1);
        assert_eq!(snapshots.live(EntityKind::Entry).len(), 2);
    }

    #[tokio::test]
    async fn test_extends_tip() {
        let mut snapshots = Snapshots::new();
        let first = commit(10, vec![create_entry(EntityId::new_v4())]);
        assert!(snapshots.extends_tip(&first));

        snapshots.apply_commit(&first).await.unwrap();
        assert!(!snapshots.extends_tip(&commit(5, vec![])));
        assert!(snapshots.extends_tip(&commit(20, vec![])));
    }
}
