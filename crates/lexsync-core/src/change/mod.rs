//! Typed changes and the replay contract.
//!
//! Replay of one entity: the first record for an entity id calls
//! [`EntityChange::new_entity`], then `apply_change` runs on the result;
//! every later record calls `apply_change` on the entity built so far.
//! Running `apply_change` right after creation lets create changes check
//! the entities they reference.

mod component;
mod delete;
mod entry;
mod json_patch;
mod sense;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::commit::Commit;
use crate::context::ChangeContext;
use crate::entity::{ComplexFormComponent, Entity, EntityKind, Entry, Sense};
use crate::error::ChangeError;
use crate::types::EntityId;

pub use component::{AddEntryComponentChange, ComponentTarget, SetComplexFormComponentChange};
pub use delete::DeleteChange;
pub use entry::{
    AddComplexFormTypeChange, CreateComplexFormTypeChange, CreateEntryChange,
    RemoveComplexFormTypeChange, ReplaceComplexFormTypeChange,
};
pub use json_patch::JsonPatchChange;
pub use sense::{
    AddSemanticDomainChange, CreatePartOfSpeechChange, CreateSemanticDomainChange,
    CreateSenseChange, RemoveSemanticDomainChange, ReplaceSemanticDomainChange,
    SetPartOfSpeechChange,
};

/// The operations every change kind supports.
#[async_trait]
pub trait EntityChange: Send + Sync {
    /// Type name used in the serialized `$type` tag and in errors.
    fn name(&self) -> &'static str;

    /// The entity this change targets.
    fn entity_id(&self) -> EntityId;

    /// Build the entity when this is the first change seen for it.
    fn new_entity(&self, commit: &Commit) -> Result<Entity, ChangeError>;

    /// Mutate an existing entity.
    async fn apply_change(
        &self,
        entity: &mut Entity,
        ctx: &dyn ChangeContext,
    ) -> Result<(), ChangeError>;
}

/// Every change the log understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum Change {
    #[serde(rename = "CreateEntryChange")]
    CreateEntry(CreateEntryChange),
    #[serde(rename = "CreateSenseChange")]
    CreateSense(CreateSenseChange),
    #[serde(rename = "CreatePartOfSpeechChange")]
    CreatePartOfSpeech(CreatePartOfSpeechChange),
    #[serde(rename = "CreateSemanticDomainChange")]
    CreateSemanticDomain(CreateSemanticDomainChange),
    #[serde(rename = "CreateComplexFormTypeChange")]
    CreateComplexFormType(CreateComplexFormTypeChange),
    #[serde(rename = "AddEntryComponentChange")]
    AddEntryComponent(AddEntryComponentChange),
    #[serde(rename = "SetComplexFormComponentChange")]
    SetComplexFormComponent(SetComplexFormComponentChange),
    #[serde(rename = "SetPartOfSpeechChange")]
    SetPartOfSpeech(SetPartOfSpeechChange),
    #[serde(rename = "AddSemanticDomainChange")]
    AddSemanticDomain(AddSemanticDomainChange),
    #[serde(rename = "ReplaceSemanticDomainChange")]
    ReplaceSemanticDomain(ReplaceSemanticDomainChange),
    #[serde(rename = "RemoveSemanticDomainChange")]
    RemoveSemanticDomain(RemoveSemanticDomainChange),
    #[serde(rename = "AddComplexFormTypeChange")]
    AddComplexFormType(AddComplexFormTypeChange),
    #[serde(rename = "ReplaceComplexFormTypeChange")]
    ReplaceComplexFormType(ReplaceComplexFormTypeChange),
    #[serde(rename = "RemoveComplexFormTypeChange")]
    RemoveComplexFormType(RemoveComplexFormTypeChange),
    #[serde(rename = "DeleteChange")]
    Delete(DeleteChange),
    #[serde(rename = "JsonPatchChange")]
    JsonPatch(JsonPatchChange),
}

macro_rules! each_change {
    ($change:expr, $inner:ident => $body:expr) => {
        match $change {
            Change::CreateEntry($inner) => $body,
            Change::CreateSense($inner) => $body,
            Change::CreatePartOfSpeech($inner) => $body,
            Change::CreateSemanticDomain($inner) => $body,
            Change::CreateComplexFormType($inner) => $body,
            Change::AddEntryComponent($inner) => $body,
            Change::SetComplexFormComponent($inner) => $body,
            Change::SetPartOfSpeech($inner) => $body,
            Change::AddSemanticDomain($inner) => $body,
            Change::ReplaceSemanticDomain($inner) => $body,
            Change::RemoveSemanticDomain($inner) => $body,
            Change::AddComplexFormType($inner) => $body,
            Change::ReplaceComplexFormType($inner) => $body,
            Change::RemoveComplexFormType($inner) => $body,
            Change::Delete($inner) => $body,
            Change::JsonPatch($inner) => $body,
        }
    };
}

#[async_trait]
impl EntityChange for Change {
    fn name(&self) -> &'static str {
        each_change!(self, c => c.name())
    }

    fn entity_id(&self) -> EntityId {
        each_change!(self, c => c.entity_id())
    }

    fn new_entity(&self, commit: &Commit) -> Result<Entity, ChangeError> {
        each_change!(self, c => c.new_entity(commit))
    }

    async fn apply_change(
        &self,
        entity: &mut Entity,
        ctx: &dyn ChangeContext,
    ) -> Result<(), ChangeError> {
        if entity.id() != self.entity_id() {
            return Err(ChangeError::WrongEntity {
                change: self.name(),
                expected: self.entity_id(),
                actual: entity.id(),
            });
        }
        each_change!(self, c => c.apply_change(entity, ctx).await)
    }
}

impl Change {
    /// Whether this change can originate an entity.
    pub fn creates_entity(&self) -> bool {
        matches!(
            self,
            Change::CreateEntry(_)
                | Change::CreateSense(_)
                | Change::CreatePartOfSpeech(_)
                | Change::CreateSemanticDomain(_)
                | Change::CreateComplexFormType(_)
                | Change::AddEntryComponent(_)
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared helpers for change implementations
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn cannot_create(change: &'static str) -> ChangeError {
    ChangeError::CannotCreate {
        change,
        reason: "unsupported: this change cannot originate an entity",
    }
}

fn wrong_kind(change: &'static str, entity: &Entity, expected: EntityKind) -> ChangeError {
    ChangeError::WrongEntityKind {
        change,
        entity: entity.id(),
        expected,
        found: entity.kind(),
    }
}

pub(crate) fn entry_mut<'a>(change: &'static str, entity: &'a mut Entity) -> Result<&'a mut Entry, ChangeError> {
    match entity {
        Entity::Entry(entry) => Ok(entry),
        other => Err(wrong_kind(change, other, EntityKind::Entry)),
    }
}

pub(crate) fn sense_mut<'a>(change: &'static str, entity: &'a mut Entity) -> Result<&'a mut Sense, ChangeError> {
    match entity {
        Entity::Sense(sense) => Ok(sense),
        other => Err(wrong_kind(change, other, EntityKind::Sense)),
    }
}

pub(crate) fn component_mut<'a>(
    change: &'static str,
    entity: &'a mut Entity,
) -> Result<&'a mut ComplexFormComponent, ChangeError> {
    match entity {
        Entity::ComplexFormComponent(component) => Ok(component),
        other => Err(wrong_kind(change, other, EntityKind::ComplexFormComponent)),
    }
}
