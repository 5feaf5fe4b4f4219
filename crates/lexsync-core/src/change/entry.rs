use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{cannot_create, entry_mut, EntityChange};
use crate::commit::Commit;
use crate::context::ChangeContext;
use crate::entity::{ComplexFormType, Entity, Entry, MultiString};
use crate::error::ChangeError;
use crate::types::EntityId;

/// Creates a new [`Entry`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEntryChange {
    pub entity_id: EntityId,
    #[serde(default)]
    pub lexeme_form: MultiString,
    #[serde(default)]
    pub citation_form: MultiString,
    #[serde(default)]
    pub literal_meaning: MultiString,
    #[serde(default)]
    pub note: MultiString,
}

impl CreateEntryChange {
    pub fn new(entity_id: EntityId) -> Self {
        Self {
            entity_id,
            ..Default::default()
        }
    }

    pub fn with_lexeme_form(mut self, ws: &str, text: &str) -> Self {
        self.lexeme_form = self.lexeme_form.with(ws, text);
        self
    }

    pub fn with_citation_form(mut self, ws: &str, text: &str) -> Self {
        self.citation_form = self.citation_form.with(ws, text);
        self
    }

    pub fn with_note(mut self, ws: &str, text: &str) -> Self {
        self.note = self.note.with(ws, text);
        self
    }

    /// Capture an existing entry as the change that would create it.
    pub fn from_entry(entry: &Entry) -> Self {
        Self {
            entity_id: entry.id,
            lexeme_form: entry.lexeme_form.clone(),
            citation_form: entry.citation_form.clone(),
            literal_meaning: entry.literal_meaning.clone(),
            note: entry.note.clone(),
        }
    }
}

#[async_trait]
impl EntityChange for CreateEntryChange {
    fn name(&self) -> &'static str {
        "CreateEntryChange"
    }

    fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    fn new_entity(&self, _commit: &Commit) -> Result<Entity, ChangeError> {
        Ok(Entity::Entry(Entry {
            id: self.entity_id,
            lexeme_form: self.lexeme_form.clone(),
            citation_form: self.citation_form.clone(),
            literal_meaning: self.literal_meaning.clone(),
            note: self.note.clone(),
            ..Default::default()
        }))
    }

    async fn apply_change(
        &self,
        entity: &mut Entity,
        _ctx: &dyn ChangeContext,
    ) -> Result<(), ChangeError> {
        entry_mut(self.name(), entity)?;
        Ok(())
    }
}

/// Creates a [`ComplexFormType`] that entries can be tagged with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateComplexFormTypeChange {
    pub entity_id: EntityId,
    #[serde(default)]
    pub name: MultiString,
}

impl CreateComplexFormTypeChange {
    pub fn new(entity_id: EntityId, name: MultiString) -> Self {
        Self { entity_id, name }
    }
}

#[async_trait]
impl EntityChange for CreateComplexFormTypeChange {
    fn name(&self) -> &'static str {
        "CreateComplexFormTypeChange"
    }

    fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    fn new_entity(&self, _commit: &Commit) -> Result<Entity, ChangeError> {
        Ok(Entity::ComplexFormType(ComplexFormType {
            id: self.entity_id,
            name: self.name.clone(),
            deleted_at: None,
        }))
    }

    async fn apply_change(
        &self,
        _entity: &mut Entity,
        _ctx: &dyn ChangeContext,
    ) -> Result<(), ChangeError> {
        Ok(())
    }
}

/// Tags an entry with a complex form type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddComplexFormTypeChange {
    pub entity_id: EntityId,
    pub complex_form_type: ComplexFormType,
}

impl AddComplexFormTypeChange {
    pub fn new(entry_id: EntityId, complex_form_type: ComplexFormType) -> Self {
        Self {
            entity_id: entry_id,
            complex_form_type,
        }
    }
}

#[async_trait]
impl EntityChange for AddComplexFormTypeChange {
    fn name(&self) -> &'static str {
        "AddComplexFormTypeChange"
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
        let entry = entry_mut(self.name(), entity)?;
        if ctx.is_deleted(self.complex_form_type.id).await? {
            return Ok(());
        }
        if !entry
            .complex_form_types
            .iter()
            .any(|t| t.id == self.complex_form_type.id)
        {
            entry.complex_form_types.push(self.complex_form_type.clone());
        }
        Ok(())
    }
}

/// Removes a complex form type from an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveComplexFormTypeChange {
    pub entity_id: EntityId,
    pub complex_form_type_id: EntityId,
}

impl RemoveComplexFormTypeChange {
    pub fn new(entry_id: EntityId, complex_form_type_id: EntityId) -> Self {
        Self {
            entity_id: entry_id,
            complex_form_type_id,
        }
    }
}

#[async_trait]
impl EntityChange for RemoveComplexFormTypeChange {
    fn name(&self) -> &'static str {
        "RemoveComplexFormTypeChange"
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
        _ctx: &dyn ChangeContext,
    ) -> Result<(), ChangeError> {
        let entry = entry_mut(self.name(), entity)?;
        entry
            .complex_form_types
            .retain(|t| t.id != self.complex_form_type_id);
        Ok(())
    }
}

/// Swaps one complex form type on an entry for another, keeping its position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceComplexFormTypeChange {
    pub entity_id: EntityId,
    pub old_complex_form_type_id: EntityId,
    pub new_complex_form_type: ComplexFormType,
}

impl ReplaceComplexFormTypeChange {
    pub fn new(
        entry_id: EntityId,
        old_complex_form_type_id: EntityId,
        new_complex_form_type: ComplexFormType,
    ) -> Self {
        Self {
            entity_id: entry_id,
            old_complex_form_type_id,
            new_complex_form_type,
        }
    }
}

#[async_trait]
impl EntityChange for ReplaceComplexFormTypeChange {
    fn name(&self) -> &'static str {
        "ReplaceComplexFormTypeChange"
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
        let replacement_deleted = ctx.is_deleted(self.new_complex_form_type.id).await?;
        let entry = entry_mut(self.name(), entity)?;
        let new_id = self.new_complex_form_type.id;
        let already_present = new_id != self.old_complex_form_type_id
            && entry.complex_form_types.iter().any(|t| t.id == new_id);

        let Some(position) = entry
            .complex_form_types
            .iter()
            .position(|t| t.id == self.old_complex_form_type_id)
        else {
            return Ok(());
        };
        if replacement_deleted || already_present {
            entry.complex_form_types.remove(position);
        } else {
            entry.complex_form_types[position] = self.new_complex_form_type.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::HybridTimestamp;
    use crate::context::MemoryContext;
    use crate::types::ClientId;
    use chrono::Utc;
    use std::collections::HashMap;

    fn commit() -> Commit {
        Commit::new(ClientId::new_v4(), HybridTimestamp::from_millis(10, 0))
    }

    fn form_type(name: &str) -> ComplexFormType {
        ComplexFormType {
            id: EntityId::new_v4(),
            name: MultiString::new().with("en", name),
            deleted_at: None,
        }
    }

    fn types_map(types: &[ComplexFormType]) -> HashMap<EntityId, Entity> {
        types
            .iter()
            .map(|t| (t.id, Entity::ComplexFormType(t.clone())))
            .collect()
    }

    fn entry_with(types: Vec<ComplexFormType>) -> Entity {
        Entity::Entry(Entry {
            id: EntityId::new_v4(),
            complex_form_types: types,
            ..Default::default()
        })
    }

    #[test]
    fn test_create_entry_copies_fields() {
        let id = EntityId::new_v4();
        let change = CreateEntryChange::new(id)
            .with_lexeme_form("en", "run")
            .with_note("en", "verb");

        let entity = change.new_entity(&commit()).unwrap();
        let entry = entity.as_entry().unwrap();
        assert_eq!(entry.id, id);
        assert_eq!(entry.lexeme_form.get("en"), Some("run"));
        assert_eq!(entry.note.get("en"), Some("verb"));
        assert!(!entity.is_deleted());
    }

    #[tokio::test]
    async fn test_add_complex_form_type_is_idempotent() {
        let compound = form_type("compound");
        let entities = types_map(&[compound.clone()]);
        let commit = commit();
        let ctx = MemoryContext::new(&commit, &entities);
        let mut entry = entry_with(Vec::new());
        let change = AddComplexFormTypeChange::new(entry.id(), compound.clone());

        change.apply_change(&mut entry, &ctx).await.unwrap();
        change.apply_change(&mut entry, &ctx).await.unwrap();

        assert_eq!(entry.as_entry().unwrap().complex_form_types, vec![compound]);
    }

    #[tokio::test]
    async fn test_add_deleted_complex_form_type_is_skipped() {
        let mut idiom = form_type("idiom");
        idiom.deleted_at = Some(Utc::now());
        let entities = types_map(&[idiom.clone()]);
        let commit = commit();
        let ctx = MemoryContext::new(&commit, &entities);
        let mut entry = entry_with(Vec::new());

        AddComplexFormTypeChange::new(entry.id(), idiom)
            .apply_change(&mut entry, &ctx)
            .await
            .unwrap();

        assert!(entry.as_entry().unwrap().complex_form_types.is_empty());
    }

    #[tokio::test]
    async fn test_replace_keeps_position() {
        let a = form_type("a");
        let b = form_type("b");
        let c = form_type("c");
        let entities = types_map(&[a.clone(), b.clone(), c.clone()]);
        let commit = commit();
        let ctx = MemoryContext::new(&commit, &entities);
        let mut entry = entry_with(vec![a.clone(), b.clone()]);

        ReplaceComplexFormTypeChange::new(entry.id(), a.id, c.clone())
            .apply_change(&mut entry, &ctx)
            .await
            .unwrap();

        assert_eq!(entry.as_entry().unwrap().complex_form_types, vec![c, b]);
    }

    #[tokio::test]
    async fn test_remove_complex_form_type() {
        let a = form_type("a");
        let entities = HashMap::new();
        let commit = commit();
        let ctx = MemoryContext::new(&commit, &entities);
        let mut entry = entry_with(vec![a.clone()]);

        RemoveComplexFormTypeChange::new(entry.id(), a.id)
            .apply_change(&mut entry, &ctx)
            .await
            .unwrap();

        assert!(entry.as_entry().unwrap().complex_form_types.is_empty());
    }

    #[tokio::test]
    async fn test_entry_change_on_sense_is_rejected() {
        let entities = HashMap::new();
        let commit = commit();
        let ctx = MemoryContext::new(&commit, &entities);
        let mut sense = Entity::Sense(Default::default());

        let result = RemoveComplexFormTypeChange::new(sense.id(), EntityId::new_v4())
            .apply_change(&mut sense, &ctx)
            .await;
        assert!(matches!(result, Err(ChangeError::WrongEntityKind { .. })));
    }
}
