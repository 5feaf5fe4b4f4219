use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{cannot_create, component_mut, EntityChange};
use crate::commit::Commit;
use crate::context::ChangeContext;
use crate::entity::{ComplexFormComponent, Entity};
use crate::error::ChangeError;
use crate::types::EntityId;

/// Links a component entry (optionally one of its senses) into a complex form.
///
/// The link is tombstoned when any end of it is gone, or when it would make
/// an entry a component of itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddEntryComponentChange {
    pub entity_id: EntityId,
    pub complex_form_entry_id: EntityId,
    pub component_entry_id: EntityId,
    #[serde(default)]
    pub component_sense_id: Option<EntityId>,
}

impl AddEntryComponentChange {
    pub fn new(
        entity_id: EntityId,
        complex_form_entry_id: EntityId,
        component_entry_id: EntityId,
        component_sense_id: Option<EntityId>,
    ) -> Self {
        Self {
            entity_id,
            complex_form_entry_id,
            component_entry_id,
            component_sense_id,
        }
    }

    /// Build from a component value; a nil id gets a fresh one.
    pub fn from_component(component: &ComplexFormComponent) -> Self {
        let id = if component.id == EntityId::NIL {
            EntityId::new_v4()
        } else {
            component.id
        };
        Self::new(
            id,
            component.complex_form_entry_id,
            component.component_entry_id,
            component.component_sense_id,
        )
    }
}

#[async_trait]
impl EntityChange for AddEntryComponentChange {
    fn name(&self) -> &'static str {
        "AddEntryComponentChange"
    }

    fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    fn new_entity(&self, _commit: &Commit) -> Result<Entity, ChangeError> {
        Ok(Entity::ComplexFormComponent(ComplexFormComponent {
            id: self.entity_id,
            complex_form_entry_id: self.complex_form_entry_id,
            component_entry_id: self.component_entry_id,
            component_sense_id: self.component_sense_id,
            deleted_at: None,
        }))
    }

    async fn apply_change(
        &self,
        entity: &mut Entity,
        ctx: &dyn ChangeContext,
    ) -> Result<(), ChangeError> {
        let component = component_mut(self.name(), entity)?;
        tombstone_if_dangling(component, ctx).await
    }
}

/// Which end of a component link to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "set")]
pub enum ComponentTarget {
    #[serde(rename = "complexForm")]
    ComplexForm {
        #[serde(rename = "complexFormEntryId")]
        complex_form_entry_id: EntityId,
    },
    #[serde(rename = "component")]
    Component {
        #[serde(rename = "componentEntryId")]
        component_entry_id: EntityId,
    },
    #[serde(rename = "componentSense")]
    ComponentSense {
        #[serde(rename = "componentEntryId")]
        component_entry_id: EntityId,
        #[serde(rename = "componentSenseId", default)]
        component_sense_id: Option<EntityId>,
    },
}

/// Re-points one end of an existing component link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetComplexFormComponentChange {
    pub entity_id: EntityId,
    pub target: ComponentTarget,
}

impl SetComplexFormComponentChange {
    pub fn new_complex_form(component_id: EntityId, complex_form_entry_id: EntityId) -> Self {
        Self {
            entity_id: component_id,
            target: ComponentTarget::ComplexForm {
                complex_form_entry_id,
            },
        }
    }

    pub fn new_component(component_id: EntityId, component_entry_id: EntityId) -> Self {
        Self {
            entity_id: component_id,
            target: ComponentTarget::Component { component_entry_id },
        }
    }

    pub fn new_component_sense(
        component_id: EntityId,
        component_entry_id: EntityId,
        component_sense_id: Option<EntityId>,
    ) -> Self {
        Self {
            entity_id: component_id,
            target: ComponentTarget::ComponentSense {
                component_entry_id,
                component_sense_id,
            },
        }
    }
}

#[async_trait]
impl EntityChange for SetComplexFormComponentChange {
    fn name(&self) -> &'static str {
        "SetComplexFormComponentChange"
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
        let component = component_mut(self.name(), entity)?;
        match self.target {
            ComponentTarget::ComplexForm {
                complex_form_entry_id,
            } => component.complex_form_entry_id = complex_form_entry_id,
            ComponentTarget::Component { component_entry_id } => {
                component.component_entry_id = component_entry_id;
                component.component_sense_id = None;
            }
            ComponentTarget::ComponentSense {
                component_entry_id,
                component_sense_id,
            } => {
                component.component_entry_id = component_entry_id;
                component.component_sense_id = component_sense_id;
            }
        }
        tombstone_if_dangling(component, ctx).await
    }
}

async fn tombstone_if_dangling(
    component: &mut ComplexFormComponent,
    ctx: &dyn ChangeContext,
) -> Result<(), ChangeError> {
    if component.deleted_at.is_some() {
        return Ok(());
    }
    let dangling = ctx.is_deleted(component.complex_form_entry_id).await?
        || ctx.is_deleted(component.component_entry_id).await?
        || ctx.is_deleted_opt(component.component_sense_id).await?;
    if dangling || has_reference_cycle(component, ctx).await? {
        component.deleted_at = Some(ctx.commit().timestamp.wall_clock);
    }
    Ok(())
}

/// Walks up from the complex form through the forms that use it; reaching
/// the component entry means the link would close a loop.
async fn has_reference_cycle(
    link: &ComplexFormComponent,
    ctx: &dyn ChangeContext,
) -> Result<bool, ChangeError> {
    if link.complex_form_entry_id == link.component_entry_id {
        return Ok(true);
    }
    let mut visited = HashSet::from([link.id]);
    let mut queue = VecDeque::from([link.complex_form_entry_id]);
    while let Some(form) = queue.pop_front() {
        if form == link.component_entry_id {
            return Ok(true);
        }
        for other in ctx.objects_referencing(form).await? {
            let Entity::ComplexFormComponent(other) = other else {
                continue;
            };
            if !visited.insert(other.id) {
                continue;
            }
            if other.complex_form_entry_id == link.component_entry_id {
                return Ok(true);
            }
            queue.push_back(other.complex_form_entry_id);
        }
    }
    Ok(false)
}
