use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{cannot_create, sense_mut, EntityChange};
use crate::commit::Commit;
use crate::context::ChangeContext;
use crate::entity::{Entity, MultiString, PartOfSpeech, SemanticDomain, Sense};
use crate::error::ChangeError;
use crate::types::EntityId;

/// Creates a [`Sense`] under an entry.
///
/// If the entry, or the part of speech, or a semantic domain is gone when
/// this replays, the sense is tombstoned or the dangling reference dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSenseChange {
    pub entity_id: EntityId,
    pub entry_id: EntityId,
    #[serde(default)]
    pub gloss: MultiString,
    #[serde(default)]
    pub definition: MultiString,
    #[serde(default)]
    pub part_of_speech_id: Option<EntityId>,
    #[serde(default)]
    pub semantic_domains: Vec<SemanticDomain>,
}

impl CreateSenseChange {
    pub fn new(entity_id: EntityId, entry_id: EntityId) -> Self {
        Self {
            entity_id,
            entry_id,
            ..Default::default()
        }
    }

    pub fn with_gloss(mut self, ws: &str, text: &str) -> Self {
        self.gloss = self.gloss.with(ws, text);
        self
    }

    pub fn with_definition(mut self, ws: &str, text: &str) -> Self {
        self.definition = self.definition.with(ws, text);
        self
    }

    pub fn with_part_of_speech(mut self, id: EntityId) -> Self {
        self.part_of_speech_id = Some(id);
        self
    }

    pub fn with_semantic_domain(mut self, domain: SemanticDomain) -> Self {
        self.semantic_domains.push(domain);
        self
    }
}

#[async_trait]
impl EntityChange for CreateSenseChange {
    fn name(&self) -> &'static str {
        "CreateSenseChange"
    }

    fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    fn new_entity(&self, _commit: &Commit) -> Result<Entity, ChangeError> {
        Ok(Entity::Sense(Sense {
            id: self.entity_id,
            entry_id: self.entry_id,
            gloss: self.gloss.clone(),
            definition: self.definition.clone(),
            part_of_speech_id: self.part_of_speech_id,
            semantic_domains: self.semantic_domains.clone(),
            deleted_at: None,
        }))
    }

    async fn apply_change(
        &self,
        entity: &mut Entity,
        ctx: &dyn ChangeContext,
    ) -> Result<(), ChangeError> {
        let entry_deleted = ctx.is_deleted(self.entry_id).await?;
        let pos_deleted = ctx.is_deleted_opt(self.part_of_speech_id).await?;
        let mut live_domains = Vec::with_capacity(self.semantic_domains.len());
        for domain in &self.semantic_domains {
            if !ctx.is_deleted(domain.id).await? {
                live_domains.push(domain.id);
            }
        }

        let sense = sense_mut(self.name(), entity)?;
        if entry_deleted && sense.deleted_at.is_none() {
            sense.deleted_at = Some(ctx.commit().timestamp.wall_clock);
        }
        if pos_deleted {
            sense.part_of_speech_id = None;
        }
        sense.semantic_domains.retain(|d| live_domains.contains(&d.id));
        Ok(())
    }
}

/// Sets or clears a sense's part of speech.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPartOfSpeechChange {
    pub entity_id: EntityId,
    pub part_of_speech_id: Option<EntityId>,
}

impl SetPartOfSpeechChange {
    pub fn new(sense_id: EntityId, part_of_speech_id: Option<EntityId>) -> Self {
        Self {
            entity_id: sense_id,
            part_of_speech_id,
        }
    }
}

#[async_trait]
impl EntityChange for SetPartOfSpeechChange {
    fn name(&self) -> &'static str {
        "SetPartOfSpeechChange"
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
        let deleted = ctx.is_deleted_opt(self.part_of_speech_id).await?;
        let sense = sense_mut(self.name(), entity)?;
        sense.part_of_speech_id = if deleted { None } else { self.part_of_speech_id };
        Ok(())
    }
}

/// Adds a semantic domain to a sense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddSemanticDomainChange {
    pub entity_id: EntityId,
    pub semantic_domain: SemanticDomain,
}

impl AddSemanticDomainChange {
    pub fn new(sense_id: EntityId, semantic_domain: SemanticDomain) -> Self {
        Self {
            entity_id: sense_id,
            semantic_domain,
        }
    }
}

#[async_trait]
impl EntityChange for AddSemanticDomainChange {
    fn name(&self) -> &'static str {
        "AddSemanticDomainChange"
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
        let deleted = ctx.is_deleted(self.semantic_domain.id).await?;
        let sense = sense_mut(self.name(), entity)?;
        if deleted || sense.semantic_domains.iter().any(|d| d.id == self.semantic_domain.id) {
            return Ok(());
        }
        sense.semantic_domains.push(self.semantic_domain.clone());
        Ok(())
    }
}

/// Swaps one semantic domain on a sense for another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaceSemanticDomainChange {
    pub entity_id: EntityId,
    pub old_semantic_domain_id: EntityId,
    pub semantic_domain: SemanticDomain,
}

impl ReplaceSemanticDomainChange {
    pub fn new(sense_id: EntityId, old_semantic_domain_id: EntityId, semantic_domain: SemanticDomain) -> Self {
        Self {
            entity_id: sense_id,
            old_semantic_domain_id,
            semantic_domain,
        }
    }
}

#[async_trait]
impl EntityChange for ReplaceSemanticDomainChange {
    fn name(&self) -> &'static str {
        "ReplaceSemanticDomainChange"
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
        let deleted = ctx.is_deleted(self.semantic_domain.id).await?;
        let sense = sense_mut(self.name(), entity)?;
        let new_id = self.semantic_domain.id;
        let duplicate = new_id != self.old_semantic_domain_id
            && sense.semantic_domains.iter().any(|d| d.id == new_id);

        let Some(position) = sense
            .semantic_domains
            .iter()
            .position(|d| d.id == self.old_semantic_domain_id)
        else {
            return Ok(());
        };
        if deleted || duplicate {
            sense.semantic_domains.remove(position);
        } else {
            sense.semantic_domains[position] = self.semantic_domain.clone();
        }
        Ok(())
    }
}

/// Removes a semantic domain from a sense.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveSemanticDomainChange {
    pub entity_id: EntityId,
    pub semantic_domain_id: EntityId,
}

impl RemoveSemanticDomainChange {
    pub fn new(sense_id: EntityId, semantic_domain_id: EntityId) -> Self {
        Self {
            entity_id: sense_id,
            semantic_domain_id,
        }
    }
}

#[async_trait]
impl EntityChange for RemoveSemanticDomainChange {
    fn name(&self) -> &'static str {
        "RemoveSemanticDomainChange"
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
        let sense = sense_mut(self.name(), entity)?;
        sense.semantic_domains.retain(|d| d.id != self.semantic_domain_id);
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePartOfSpeechChange {
    pub entity_id: EntityId,
    #[serde(default)]
    pub name: MultiString,
    #[serde(default)]
    pub predefined: bool,
}

impl CreatePartOfSpeechChange {
    pub fn new(entity_id: EntityId, name: MultiString) -> Self {
        Self {
            entity_id,
            name,
            predefined: false,
        }
    }
}

#[async_trait]
impl EntityChange for CreatePartOfSpeechChange {
    fn name(&self) -> &'static str {
        "CreatePartOfSpeechChange"
    }

    fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    fn new_entity(&self, _commit: &Commit) -> Result<Entity, ChangeError> {
        Ok(Entity::PartOfSpeech(PartOfSpeech {
            id: self.entity_id,
            name: self.name.clone(),
            predefined: self.predefined,
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSemanticDomainChange {
    pub entity_id: EntityId,
    #[serde(default)]
    pub name: MultiString,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub predefined: bool,
}

impl CreateSemanticDomainChange {
    pub fn new(entity_id: EntityId, name: MultiString, code: impl Into<String>) -> Self {
        Self {
            entity_id,
            name,
            code: code.into(),
            predefined: false,
        }
    }
}

#[async_trait]
impl EntityChange for CreateSemanticDomainChange {
    fn name(&self) -> &'static str {
        "CreateSemanticDomainChange"
    }

    fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    fn new_entity(&self, _commit: &Commit) -> Result<Entity, ChangeError> {
        Ok(Entity::SemanticDomain(SemanticDomain {
            id: self.entity_id,
            name: self.name.clone(),
            code: self.code.clone(),
            predefined: self.predefined,
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
