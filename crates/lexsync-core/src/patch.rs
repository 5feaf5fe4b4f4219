//! Field-level JSON patch documents (`add`, `replace`, `remove`).
//!
//! Paths are JSON pointers relative to the entity's own JSON object, e.g.
//! `/gloss/en` or `/semanticDomains/-`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::PatchError;
use crate::rewrite::NamingPolicy;

/// The kind of a patch operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Add,
    Replace,
    Remove,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Add => "add",
            OperationType::Replace => "replace",
            OperationType::Remove => "remove",
        }
    }
}

/// One operation of a patch document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchOperation {
    pub op: OperationType,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

/// An ordered list of patch operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatchDocument {
    operations: Vec<PatchOperation>,
    /// Naming convention used when field paths are turned into pointers.
    #[serde(skip)]
    naming: NamingPolicy,
}

impl PatchDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_operations(operations: Vec<PatchOperation>) -> Self {
        Self {
            operations,
            naming: NamingPolicy::default(),
        }
    }

    pub fn with_naming(mut self, naming: NamingPolicy) -> Self {
        self.naming = naming;
        self
    }

    pub fn naming(&self) -> NamingPolicy {
        self.naming
    }

    pub fn add(mut self, path: impl Into<String>, value: impl Serialize) -> Result<Self, PatchError> {
        self.push(OperationType::Add, path.into(), Some(to_value(value)?));
        Ok(self)
    }

    pub fn replace(
        mut self,
        path: impl Into<String>,
        value: impl Serialize,
    ) -> Result<Self, PatchError> {
        self.push(OperationType::Replace, path.into(), Some(to_value(value)?));
        Ok(self)
    }

    pub fn remove(mut self, path: impl Into<String>) -> Self {
        self.push(OperationType::Remove, path.into(), None);
        self
    }

    pub fn push(&mut self, op: OperationType, path: String, value: Option<Value>) {
        self.operations.push(PatchOperation { op, path, value });
    }

    pub fn operations(&self) -> &[PatchOperation] {
        &self.operations
    }

    pub(crate) fn operations_mut(&mut self) -> &mut Vec<PatchOperation> {
        &mut self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Apply every operation, in order, to a JSON value.
    ///
    /// On error the target may be partially patched.
    pub fn apply_to_value(&self, target: &mut Value) -> Result<(), PatchError> {
        for op in &self.operations {
            apply_operation(target, op)?;
        }
        Ok(())
    }

    /// Apply the document to a typed value through its JSON form.
    ///
    /// The target is left untouched if any operation fails.
    pub fn apply_to<T>(&self, target: &mut T) -> Result<(), PatchError>
    where
        T: Serialize + DeserializeOwned,
    {
        let mut json = serde_json::to_value(&*target).map_err(PatchError::Entity)?;
        self.apply_to_value(&mut json)?;
        *target = serde_json::from_value(json).map_err(PatchError::Entity)?;
        Ok(())
    }
}

fn to_value(value: impl Serialize) -> Result<Value, PatchError> {
    serde_json::to_value(value).map_err(PatchError::Entity)
}

/// Split a JSON pointer into unescaped reference tokens.
pub fn parse_pointer(path: &str) -> Result<Vec<String>, PatchError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = path.strip_prefix('/') else {
        return Err(PatchError::InvalidPointer(path.to_string()));
    };
    Ok(rest
        .split('/')
        .map(|token| token.replace("~1", "/").replace("~0", "~"))
        .collect())
}

/// Escape a single reference token for use in a pointer.
pub fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

fn apply_operation(target: &mut Value, op: &PatchOperation) -> Result<(), PatchError> {
    let tokens = parse_pointer(&op.path)?;
    match op.op {
        OperationType::Add | OperationType::Replace => {
            let value = op.value.clone().ok_or_else(|| PatchError::MissingValue {
                op: op.op.as_str(),
                path: op.path.clone(),
            })?;
            set(target, &tokens, value, op)
        }
        OperationType::Remove => remove(target, &tokens, &op.path),
    }
}

fn set(target: &mut Value, tokens: &[String], value: Value, op: &PatchOperation) -> Result<(), PatchError> {
    let Some((last, parents)) = tokens.split_last() else {
        *target = value;
        return Ok(());
    };
    let parent = navigate(target, parents, &op.path)?;
    match parent {
        Value::Object(map) => {
            map.insert(last.clone(), value);
            Ok(())
        }
        Value::Array(items) => {
            if op.op == OperationType::Add && last == "-" {
                items.push(value);
                return Ok(());
            }
            let index = parse_index(last, &op.path)?;
            match op.op {
                OperationType::Add if index <= items.len() => {
                    items.insert(index, value);
                    Ok(())
                }
                OperationType::Replace if index < items.len() => {
                    items[index] = value;
                    Ok(())
                }
                _ => Err(PatchError::IndexOutOfRange {
                    path: op.path.clone(),
                    index,
                }),
            }
        }
        _ => Err(PatchError::PathNotFound(op.path.clone())),
    }
}

fn remove(target: &mut Value, tokens: &[String], path: &str) -> Result<(), PatchError> {
    let Some((last, parents)) = tokens.split_last() else {
        return Err(PatchError::Invalid("cannot remove the document root".into()));
    };
    match navigate(target, parents, path)? {
        Value::Object(map) => map
            .remove(last)
            .map(|_| ())
            .ok_or_else(|| PatchError::PathNotFound(path.to_string())),
        Value::Array(items) => {
            let index = parse_index(last, path)?;
            if index >= items.len() {
                return Err(PatchError::IndexOutOfRange {
                    path: path.to_string(),
                    index,
                });
            }
            items.remove(index);
            Ok(())
        }
        _ => Err(PatchError::PathNotFound(path.to_string())),
    }
}

fn navigate<'v>(target: &'v mut Value, tokens: &[String], path: &str) -> Result<&'v mut Value, PatchError> {
    let mut current = target;
    for token in tokens {
        current = match current {
            Value::Object(map) => map.get_mut(token),
            Value::Array(items) => {
                let index = parse_index(token, path)?;
                items.get_mut(index)
            }
            _ => None,
        }
        .ok_or_else(|| PatchError::PathNotFound(path.to_string()))?;
    }
    Ok(current)
}

fn parse_index(token: &str, path: &str) -> Result<usize, PatchError> {
    if token.len() > 1 && token.starts_with('0') {
        return Err(PatchError::InvalidPointer(path.to_string()));
    }
    token
        .parse()
        .map_err(|_| PatchError::InvalidPointer(path.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pointer_unescapes_tokens() {
        assert_eq!(parse_pointer("/a~1b/c~0d").unwrap(), vec!["a/b", "c~d"]);
        assert!(parse_pointer("").unwrap().is_empty());
        assert!(matches!(parse_pointer("no-slash"), Err(PatchError::InvalidPointer(_))));
    }

    #[test]
    fn test_add_appends_and_inserts() {
        let mut doc = json!({ "list": [1, 3] });
        PatchDocument::new()
            .add("/list/-", 4)
            .unwrap()
            .add("/list/1", 2)
            .unwrap()
            .apply_to_value(&mut doc)
            .unwrap();

        assert_eq!(doc, json!({ "list": [1, 2, 3, 4] }));
    }

    #[test]
    fn test_replace_and_remove_members() {
        let mut doc = json!({ "gloss": { "en": "dog", "fr": "chien" }, "note": "x" });
        PatchDocument::new()
            .replace("/gloss/en", "hound")
            .unwrap()
            .remove("/gloss/fr")
            .remove("/note")
            .apply_to_value(&mut doc)
            .unwrap();

        assert_eq!(doc, json!({ "gloss": { "en": "hound" } }));
    }

    #[test]
    fn test_remove_missing_member_fails() {
        let mut doc = json!({ "a": 1 });
        let result = PatchDocument::new().remove("/b").apply_to_value(&mut doc);
        assert!(matches!(result, Err(PatchError::PathNotFound(_))));
    }

    #[test]
    fn test_replace_out_of_range_fails() {
        let mut doc = json!({ "list": [] });
        let result = PatchDocument::new()
            .replace("/list/0", 1)
            .unwrap()
            .apply_to_value(&mut doc);
        assert!(matches!(result, Err(PatchError::IndexOutOfRange { index: 0, .. })));
    }

    #[test]
    fn test_missing_value_rejected() {
        let mut doc = json!({});
        let mut patch = PatchDocument::new();
        patch.push(OperationType::Add, "/a".into(), None);

        assert!(matches!(
            patch.apply_to_value(&mut doc),
            Err(PatchError::MissingValue { op: "add", .. })
        ));
    }

    #[test]
    fn test_leading_zero_index_rejected() {
        let mut doc = json!({ "list": [1, 2] });
        let result = PatchDocument::new().remove("/list/01").apply_to_value(&mut doc);
        assert!(matches!(result, Err(PatchError::InvalidPointer(_))));
    }

    #[test]
    fn test_document_serializes_as_operation_list() {
        let patch = PatchDocument::new().remove("/note");
        let json = serde_json::to_value(&patch).unwrap();
        assert_eq!(json, json!([{ "op": "remove", "path": "/note" }]));

        let back: PatchDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back, patch);
    }
}
