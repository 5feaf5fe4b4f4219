//! Turns generic patches against entries and senses into typed changes.
//!
//! Relationship fields (part of speech, semantic domains, components,
//! complex form types) must be logged as their own change kinds so that
//! deletions of the referenced entities propagate on replay. Everything
//! else in the patch travels as a single [`JsonPatchChange`].

use crate::change::{
    AddComplexFormTypeChange, AddEntryComponentChange, AddSemanticDomainChange, Change,
    DeleteChange, JsonPatchChange, RemoveComplexFormTypeChange, RemoveSemanticDomainChange,
    ReplaceComplexFormTypeChange, ReplaceSemanticDomainChange, SetComplexFormComponentChange,
    SetPartOfSpeechChange,
};
use crate::entity::{ComplexFormComponent, ComplexFormType, Entry, SemanticDomain, Sense};
use crate::error::{ChangeError, PatchError};
use crate::patch::{OperationType, PatchDocument};
use crate::rewrite::{Field, ListIndex};
use crate::types::EntityId;

impl Sense {
    pub const GLOSS: Field = Field::new("gloss");
    pub const DEFINITION: Field = Field::new("definition");
    pub const PART_OF_SPEECH_ID: Field = Field::new("part_of_speech_id");
    pub const SEMANTIC_DOMAINS: Field = Field::new("semantic_domains");

    /// Split `patch` into the changes that reproduce it on this sense.
    pub fn to_changes(&self, mut patch: PatchDocument) -> Result<Vec<Change>, ChangeError> {
        let mut changes = patch.rewrite_scalar::<Option<EntityId>, _>(
            &Self::PART_OF_SPEECH_ID.into(),
            |value, op| {
                let part_of_speech_id = match op {
                    OperationType::Add | OperationType::Replace => value.flatten(),
                    OperationType::Remove => None,
                };
                Ok(Change::SetPartOfSpeech(SetPartOfSpeechChange::new(
                    self.id,
                    part_of_speech_id,
                )))
            },
        )?;

        changes.extend(patch.rewrite_list::<SemanticDomain, _>(
            &Self::SEMANTIC_DOMAINS.into(),
            |domain, index, op| {
                let field = "semantic domains";
                if index == ListIndex::Whole {
                    return Err(unsupported(op, field));
                }
                Ok(match op {
                    OperationType::Add => Change::AddSemanticDomain(AddSemanticDomainChange::new(
                        self.id,
                        required(domain, op, field)?,
                    )),
                    OperationType::Replace => {
                        let current = at(&self.semantic_domains, index, field)?;
                        Change::ReplaceSemanticDomain(ReplaceSemanticDomainChange::new(
                            self.id,
                            current.id,
                            required(domain, op, field)?,
                        ))
                    }
                    OperationType::Remove => {
                        let current = at(&self.semantic_domains, index, field)?;
                        Change::RemoveSemanticDomain(RemoveSemanticDomainChange::new(self.id, current.id))
                    }
                })
            },
        )?);

        push_leftover(&mut changes, self.id, patch);
        Ok(changes)
    }
}

impl Entry {
    pub const LEXEME_FORM: Field = Field::new("lexeme_form");
    pub const CITATION_FORM: Field = Field::new("citation_form");
    pub const NOTE: Field = Field::new("note");
    pub const COMPONENTS: Field = Field::new("components");
    pub const COMPLEX_FORMS: Field = Field::new("complex_forms");
    pub const COMPLEX_FORM_TYPES: Field = Field::new("complex_form_types");

    /// Split `patch` into the changes that reproduce it on this entry.
    pub fn to_changes(&self, mut patch: PatchDocument) -> Result<Vec<Change>, ChangeError> {
        let mut changes = patch.rewrite_list::<ComplexFormComponent, _>(
            &Self::COMPONENTS.into(),
            |component, index, op| rewrite_component(&self.components, component, index, op),
        )?;
        changes.extend(patch.rewrite_list::<ComplexFormComponent, _>(
            &Self::COMPLEX_FORMS.into(),
            |component, index, op| rewrite_component(&self.complex_forms, component, index, op),
        )?);
        changes.extend(patch.rewrite_list::<ComplexFormType, _>(
            &Self::COMPLEX_FORM_TYPES.into(),
            |form_type, index, op| {
                let field = "complex form types";
                if index == ListIndex::Whole {
                    return Err(unsupported(op, field));
                }
                Ok(match op {
                    OperationType::Add => Change::AddComplexFormType(AddComplexFormTypeChange::new(
                        self.id,
                        required(form_type, op, field)?,
                    )),
                    OperationType::Remove => {
                        let id = match form_type {
                            Some(t) => t.id,
                            None => at(&self.complex_form_types, index, field)?.id,
                        };
                        Change::RemoveComplexFormType(RemoveComplexFormTypeChange::new(self.id, id))
                    }
                    OperationType::Replace => {
                        let current = at(&self.complex_form_types, index, field)?;
                        Change::ReplaceComplexFormType(ReplaceComplexFormTypeChange::new(
                            self.id,
                            current.id,
                            required(form_type, op, field)?,
                        ))
                    }
                })
            },
        )?);

        push_leftover(&mut changes, self.id, patch);
        Ok(changes)
    }
}

fn rewrite_component(
    current: &[ComplexFormComponent],
    component: Option<ComplexFormComponent>,
    index: ListIndex,
    op: OperationType,
) -> Result<Change, ChangeError> {
    let field = "components";
    if index == ListIndex::Whole {
        return Err(unsupported(op, field));
    }
    match op {
        OperationType::Add => {
            let component = required(component, op, field)?;
            Ok(Change::AddEntryComponent(AddEntryComponentChange::from_component(&component)))
        }
        OperationType::Remove => {
            let id = match component {
                Some(c) => c.id,
                None => at(current, index, field)?.id,
            };
            Ok(Change::Delete(DeleteChange::new(id)))
        }
        OperationType::Replace => {
            let new = required(component, op, field)?;
            let old = at(current, index, field)?;
            if old.id != new.id {
                return Err(ChangeError::Malformed(format!(
                    "component id mismatch, expected {} but found {}",
                    old.id, new.id
                )));
            }
            if old.component_entry_id != new.component_entry_id
                && old.complex_form_entry_id != new.complex_form_entry_id
            {
                return Err(ChangeError::Malformed(
                    "both component and complex form changed".into(),
                ));
            }
            let change = if old.component_entry_id != new.component_entry_id {
                SetComplexFormComponentChange::new_component(old.id, new.component_entry_id)
            } else if old.component_sense_id != new.component_sense_id {
                SetComplexFormComponentChange::new_component_sense(
                    old.id,
                    new.component_entry_id,
                    new.component_sense_id,
                )
            } else if old.complex_form_entry_id != new.complex_form_entry_id {
                SetComplexFormComponentChange::new_complex_form(old.id, new.complex_form_entry_id)
            } else {
                return Err(ChangeError::Malformed(format!(
                    "replace of component {} changes nothing",
                    old.id
                )));
            };
            Ok(Change::SetComplexFormComponent(change))
        }
    }
}

fn push_leftover(changes: &mut Vec<Change>, id: EntityId, patch: PatchDocument) {
    if !patch.is_empty() {
        changes.push(Change::JsonPatch(JsonPatchChange::new(id, patch)));
    }
}

fn required<T>(value: Option<T>, op: OperationType, field: &str) -> Result<T, ChangeError> {
    value.ok_or_else(|| {
        PatchError::MissingValue {
            op: op.as_str(),
            path: field.to_string(),
        }
        .into()
    })
}

fn at<'a, T>(items: &'a [T], index: ListIndex, field: &str) -> Result<&'a T, ChangeError> {
    match index.resolve(items.len()) {
        Some(i) => Ok(&items[i]),
        None if index == ListIndex::Whole => Err(PatchError::Invalid(format!(
            "whole-list operations are not supported for {field}"
        ))
        .into()),
        None => Err(PatchError::IndexOutOfRange {
            path: field.to_string(),
            index: match index {
                ListIndex::FromStart(i) => i,
                _ => items.len(),
            },
        }
        .into()),
    }
}

fn unsupported(op: OperationType, field: &str) -> ChangeError {
    PatchError::Unsupported {
        op: op.as_str(),
        field: field.to_string(),
    }
    .into()
}
