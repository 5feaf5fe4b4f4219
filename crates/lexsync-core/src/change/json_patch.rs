use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::EntityChange;
use crate::commit::Commit;
use crate::context::ChangeContext;
use crate::entity::Entity;
use crate::error::{ChangeError, PatchError};
use crate::patch::{parse_pointer, PatchDocument};
use crate::types::EntityId;

/// Applies a generic patch document to an existing entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonPatchChange {
    pub entity_id: EntityId,
    pub patch: PatchDocument,
}

impl JsonPatchChange {
    pub fn new(entity_id: EntityId, patch: PatchDocument) -> Self {
        Self { entity_id, patch }
    }
}

#[async_trait]
impl EntityChange for JsonPatchChange {
    fn name(&self) -> &'static str {
        "JsonPatchChange"
    }

    fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    fn new_entity(&self, _commit: &Commit) -> Result<Entity, ChangeError> {
        Err(ChangeError::CannotCreate {
            change: self.name(),
            reason: "cannot originate an entity from a patch",
        })
    }

    async fn apply_change(
        &self,
        entity: &mut Entity,
        _ctx: &dyn ChangeContext,
    ) -> Result<(), ChangeError> {
        for op in self.patch.operations() {
            let tokens = parse_pointer(&op.path)?;
            if tokens.first().map_or(true, |t| t == "id") {
                return Err(PatchError::Invalid(format!("path {:?} cannot be patched", op.path)).into());
            }
        }
        let mut json = entity.to_json().map_err(PatchError::Entity)?;
        self.patch.apply_to_value(&mut json)?;
        entity
            .replace_from_json(json)
            .map_err(PatchError::Entity)?;
        Ok(())
    }
}
