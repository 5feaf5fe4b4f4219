use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{cannot_create, EntityChange};
use crate::commit::Commit;
use crate::context::ChangeContext;
use crate::entity::Entity;
use crate::error::ChangeError;
use crate::types::EntityId;

/// Tombstones an entity as of the commit's wall clock.
///
/// Dependents are not touched here; the replay engine asks each entity that
/// references this one to drop the reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteChange {
    pub entity_id: EntityId,
}

impl DeleteChange {
    pub fn new(entity_id: EntityId) -> Self {
        Self { entity_id }
    }
}

#[async_trait]
impl EntityChange for DeleteChange {
    fn name(&self) -> &'static str {
        "DeleteChange"
    }

    fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    fn new_entity(&self, _commit: &Commit) -> Result<Entity, ChangeError> {
        Err(cannot_create(self.name()))
    }

    async fn apply_change(
        &self,
        entity: &mut Entity,
        ctx: &dyn ChangeContext,
    ) -> Result<(), ChangeError> {
        entity.set_deleted_at(Some(ctx.commit().timestamp.wall_clock));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::HybridTimestamp;
    use crate::context::MemoryContext;
    use crate::entity::PartOfSpeech;
    use crate::types::ClientId;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_delete_uses_commit_time() {
        let commit = Commit::new(ClientId::new_v4(), HybridTimestamp::from_millis(4_200, 0));
        let entities = HashMap::new();
        let ctx = MemoryContext::new(&commit, &entities);
        let id = EntityId::new_v4();
        let mut entity = Entity::PartOfSpeech(PartOfSpeech {
            id,
            ..Default::default()
        });

        DeleteChange::new(id).apply_change(&mut entity, &ctx).await.unwrap();
        assert_eq!(entity.deleted_at(), Some(commit.timestamp.wall_clock));
    }
}
