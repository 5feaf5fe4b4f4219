//! Dictionary entities materialized by replaying changes.
//!
//! Every entity carries a `deleted_at` tombstone instead of being removed,
//! so a replayed change can always ask whether something it references is
//! gone.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::commit::Commit;
use crate::types::EntityId;

/// Text in several writing systems, keyed by writing system id (`"en"`, `"fr"`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MultiString(pub BTreeMap<String, String>);

impl MultiString {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ws: impl Into<String>, text: impl Into<String>) -> Self {
        self.0.insert(ws.into(), text.into());
        self
    }

    pub fn get(&self, ws: &str) -> Option<&str> {
        self.0.get(ws).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The first non-empty value, in writing system order.
    pub fn first(&self) -> Option<&str> {
        self.0.values().map(String::as_str).find(|s| !s.is_empty())
    }
}

/// A headword in the dictionary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: EntityId,
    #[serde(default)]
    pub lexeme_form: MultiString,
    #[serde(default)]
    pub citation_form: MultiString,
    #[serde(default)]
    pub literal_meaning: MultiString,
    #[serde(default)]
    pub note: MultiString,
    #[serde(default)]
    pub complex_form_types: Vec<ComplexFormType>,
    /// Components of this entry when it is a complex form. Query-side view,
    /// filled from [`ComplexFormComponent`] entities.
    #[serde(default)]
    pub components: Vec<ComplexFormComponent>,
    /// Complex forms that use this entry as a component. Query-side view.
    #[serde(default)]
    pub complex_forms: Vec<ComplexFormComponent>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entry {
    pub fn headword(&self) -> Option<&str> {
        self.citation_form.first().or_else(|| self.lexeme_form.first())
    }
}

/// One meaning of an entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sense {
    pub id: EntityId,
    pub entry_id: EntityId,
    #[serde(default)]
    pub gloss: MultiString,
    #[serde(default)]
    pub definition: MultiString,
    #[serde(default)]
    pub part_of_speech_id: Option<EntityId>,
    #[serde(default)]
    pub semantic_domains: Vec<SemanticDomain>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Links a complex form entry to one of its component entries (and
/// optionally a specific sense of that component).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexFormComponent {
    pub id: EntityId,
    pub complex_form_entry_id: EntityId,
    pub component_entry_id: EntityId,
    #[serde(default)]
    pub component_sense_id: Option<EntityId>,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartOfSpeech {
    pub id: EntityId,
    #[serde(default)]
    pub name: MultiString,
    #[serde(default)]
    pub predefined: bool,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticDomain {
    pub id: EntityId,
    #[serde(default)]
    pub name: MultiString,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub predefined: bool,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexFormType {
    pub id: EntityId,
    #[serde(default)]
    pub name: MultiString,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Discriminator for [`Entity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Entry,
    Sense,
    ComplexFormComponent,
    PartOfSpeech,
    SemanticDomain,
    ComplexFormType,
}

/// Any materialized entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "$type")]
pub enum Entity {
    Entry(Entry),
    Sense(Sense),
    ComplexFormComponent(ComplexFormComponent),
    PartOfSpeech(PartOfSpeech),
    SemanticDomain(SemanticDomain),
    ComplexFormType(ComplexFormType),
}

macro_rules! each_entity {
    ($entity:expr, $inner:ident => $body:expr) => {
        match $entity {
            Entity::Entry($inner) => $body,
            Entity::Sense($inner) => $body,
            Entity::ComplexFormComponent($inner) => $body,
            Entity::PartOfSpeech($inner) => $body,
            Entity::SemanticDomain($inner) => $body,
            Entity::ComplexFormType($inner) => $body,
        }
    };
}

impl Entity {
    pub fn id(&self) -> EntityId {
        each_entity!(self, e => e.id)
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Entry(_) => EntityKind::Entry,
            Entity::Sense(_) => EntityKind::Sense,
            Entity::ComplexFormComponent(_) => EntityKind::ComplexFormComponent,
            Entity::PartOfSpeech(_) => EntityKind::PartOfSpeech,
            Entity::SemanticDomain(_) => EntityKind::SemanticDomain,
            Entity::ComplexFormType(_) => EntityKind::ComplexFormType,
        }
    }

    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        each_entity!(self, e => e.deleted_at)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at().is_some()
    }

    pub fn set_deleted_at(&mut self, deleted_at: Option<DateTime<Utc>>) {
        each_entity!(self, e => e.deleted_at = deleted_at)
    }

    /// Ids of other entities this entity depends on.
    pub fn references(&self) -> Vec<EntityId> {
        match self {
            Entity::Entry(entry) => entry.complex_form_types.iter().map(|t| t.id).collect(),
            Entity::Sense(sense) => {
                let mut refs = vec![sense.entry_id];
                refs.extend(sense.part_of_speech_id);
                refs.extend(sense.semantic_domains.iter().map(|d| d.id));
                refs
            }
            Entity::ComplexFormComponent(component) => {
                let mut refs = vec![component.complex_form_entry_id, component.component_entry_id];
                refs.extend(component.component_sense_id);
                refs
            }
            Entity::PartOfSpeech(_) | Entity::SemanticDomain(_) | Entity::ComplexFormType(_) => {
                Vec::new()
            }
        }
    }

    /// React to a referenced entity being deleted in `commit`.
    ///
    /// Optional references are dropped; required ones tombstone this entity
    /// as of the commit's wall clock.
    pub fn remove_reference(&mut self, id: EntityId, commit: &Commit) {
        let deleted_at = commit.timestamp.wall_clock;
        match self {
            Entity::Entry(entry) => {
                entry.complex_form_types.retain(|t| t.id != id);
                entry
                    .components
                    .retain(|c| c.component_entry_id != id && c.component_sense_id != Some(id));
                entry.complex_forms.retain(|c| c.complex_form_entry_id != id);
            }
            Entity::Sense(sense) => {
                if sense.entry_id == id {
                    sense.deleted_at = Some(deleted_at);
                }
                if sense.part_of_speech_id == Some(id) {
                    sense.part_of_speech_id = None;
                }
                sense.semantic_domains.retain(|d| d.id != id);
            }
            Entity::ComplexFormComponent(component) => {
                if component.complex_form_entry_id == id
                    || component.component_entry_id == id
                    || component.component_sense_id == Some(id)
                {
                    component.deleted_at = Some(deleted_at);
                }
            }
            Entity::PartOfSpeech(_) | Entity::SemanticDomain(_) | Entity::ComplexFormType(_) => {}
        }
    }

    /// Serialize the inner entity (without the `$type` tag).
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        each_entity!(self, e => serde_json::to_value(e))
    }

    /// Replace the inner entity with `value`, keeping the variant.
    pub fn replace_from_json(&mut self, value: serde_json::Value) -> serde_json::Result<()> {
        fn decode<T: DeserializeOwned>(slot: &mut T, value: serde_json::Value) -> serde_json::Result<()> {
            *slot = serde_json::from_value(value)?;
            Ok(())
        }
        each_entity!(self, e => decode(e, value))
    }

    pub fn as_entry(&self) -> Option<&Entry> {
        match self {
            Entity::Entry(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_sense(&self) -> Option<&Sense> {
        match self {
            Entity::Sense(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_component(&self) -> Option<&ComplexFormComponent> {
        match self {
            Entity::ComplexFormComponent(c) => Some(c),
            _ => None,
        }
    }
}

impl From<Entry> for Entity {
    fn from(e: Entry) -> Self {
        Entity::Entry(e)
    }
}

impl From<Sense> for Entity {
    fn from(s: Sense) -> Self {
        Entity::Sense(s)
    }
}

impl From<ComplexFormComponent> for Entity {
    fn from(c: ComplexFormComponent) -> Self {
        Entity::ComplexFormComponent(c)
    }
}
