//! Read-only view of materialized state handed to changes during replay.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::commit::Commit;
use crate::entity::Entity;
use crate::error::ChangeError;
use crate::types::EntityId;

/// Capabilities a change may use while it is being replayed.
///
/// Queries see the state produced by every commit ordered before the one
/// being replayed (and by earlier records of the same commit).
#[async_trait]
pub trait ChangeContext: Send + Sync {
    /// The commit that owns the change being replayed.
    fn commit(&self) -> &Commit;

    /// Current state of an entity, including tombstoned ones.
    async fn get_current(&self, id: EntityId) -> Result<Option<Entity>, ChangeError>;

    /// Every live entity that lists `id` among its references.
    async fn objects_referencing(&self, id: EntityId) -> Result<Vec<Entity>, ChangeError>;

    /// Whether the referenced entity is gone.
    ///
    /// An id that was never created counts as deleted: the reference
    /// cannot be trusted either way.
    async fn is_deleted(&self, id: EntityId) -> Result<bool, ChangeError> {
        Ok(self
            .get_current(id)
            .await?
            .map_or(true, |entity| entity.is_deleted()))
    }

    /// Like [`is_deleted`](Self::is_deleted), treating `None` as not deleted.
    async fn is_deleted_opt(&self, id: Option<EntityId>) -> Result<bool, ChangeError> {
        match id {
            Some(id) => self.is_deleted(id).await,
            None => Ok(false),
        }
    }
}

/// A [`ChangeContext`] over an in-memory entity map.
pub struct MemoryContext<'a> {
    commit: &'a Commit,
    entities: &'a HashMap<EntityId, Entity>,
}

impl<'a> MemoryContext<'a> {
    pub fn new(commit: &'a Commit, entities: &'a HashMap<EntityId, Entity>) -> Self {
        Self { commit, entities }
    }
}

#[async_trait]
impl ChangeContext for MemoryContext<'_> {
    fn commit(&self) -> &Commit {
        self.commit
    }

    async fn get_current(&self, id: EntityId) -> Result<Option<Entity>, ChangeError> {
        Ok(self.entities.get(&id).cloned())
    }

    async fn objects_referencing(&self, id: EntityId) -> Result<Vec<Entity>, ChangeError> {
        Ok(self
            .entities
            .values()
            .filter(|e| !e.is_deleted() && e.references().contains(&id))
            .cloned()
            .collect())
    }
}
