//! Rewrites generic patch operations into typed [`Change`]s.
//!
//! Callers describe a field with a [`FieldPath`]; the path is rendered to a
//! JSON pointer with the same naming rules serde uses for the entity, so a
//! pointer authored against the entity's JSON matches the field it names.
//! Operations that match are removed from the patch document and turned
//! into changes by a caller-supplied factory. Anything left over stays in
//! the document.

use std::borrow::Cow;

use serde::de::DeserializeOwned;

use crate::change::Change;
use crate::error::{ChangeError, PatchError};
use crate::patch::{escape_token, OperationType, PatchDocument, PatchOperation};

/// How Rust field names map to JSON member names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NamingPolicy {
    /// `part_of_speech_id` becomes `partOfSpeechId`.
    #[default]
    CamelCase,
    /// Names are used verbatim.
    AsIs,
}

impl NamingPolicy {
    pub fn convert<'a>(&self, name: &'a str) -> Cow<'a, str> {
        match self {
            NamingPolicy::AsIs => Cow::Borrowed(name),
            NamingPolicy::CamelCase => Cow::Owned(to_camel_case(name)),
        }
    }
}

fn to_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for ch in name.chars() {
        if ch == '_' {
            upper_next = !out.is_empty();
            continue;
        }
        if out.is_empty() {
            out.extend(ch.to_lowercase());
        } else if upper_next {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
        upper_next = false;
    }
    out
}

/// A struct field as seen by serde.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    name: &'static str,
    rename: Option<&'static str>,
}

impl Field {
    pub const fn new(name: &'static str) -> Self {
        Self { name, rename: None }
    }

    /// A field carrying an explicit `#[serde(rename = "...")]`.
    pub const fn renamed(name: &'static str, json_name: &'static str) -> Self {
        Self {
            name,
            rename: Some(json_name),
        }
    }

    pub fn json_name(&self, naming: NamingPolicy) -> Cow<'static, str> {
        match self.rename {
            Some(rename) => Cow::Borrowed(rename),
            None => naming.convert(self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Field(Field),
    Key(String),
    Index(usize),
}

/// A path from an entity root to one of its (possibly nested) values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    segments: Vec<Segment>,
}

impl FieldPath {
    pub fn field(field: Field) -> Self {
        Self {
            segments: vec![Segment::Field(field)],
        }
    }

    pub fn then(mut self, field: Field) -> Self {
        self.segments.push(Segment::Field(field));
        self
    }

    /// A map key, e.g. a writing system in a [`MultiString`](crate::MultiString).
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.segments.push(Segment::Key(key.into()));
        self
    }

    pub fn index(mut self, index: usize) -> Self {
        self.segments.push(Segment::Index(index));
        self
    }

    /// Render as a JSON pointer.
    pub fn to_pointer(&self, naming: NamingPolicy) -> String {
        let mut pointer = String::new();
        for segment in &self.segments {
            pointer.push('/');
            match segment {
                Segment::Field(field) => pointer.push_str(&escape_token(&field.json_name(naming))),
                Segment::Key(key) => pointer.push_str(&escape_token(key)),
                Segment::Index(index) => pointer.push_str(&index.to_string()),
            }
        }
        pointer
    }
}

impl From<Field> for FieldPath {
    fn from(field: Field) -> Self {
        FieldPath::field(field)
    }
}

/// Which element of a list an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListIndex {
    /// The operation targets the list itself.
    Whole,
    /// Position counted from the front.
    FromStart(usize),
    /// Position counted from the back; `FromEnd(1)` is the append slot `-`.
    FromEnd(usize),
}

impl ListIndex {
    /// Resolve against a list of length `len`. `FromEnd(1)` resolves to the
    /// last existing element.
    pub fn resolve(&self, len: usize) -> Option<usize> {
        match *self {
            ListIndex::Whole => None,
            ListIndex::FromStart(i) => (i < len).then_some(i),
            ListIndex::FromEnd(n) => len.checked_sub(n),
        }
    }
}

impl PatchDocument {
    /// Convert every operation whose path is exactly `path`.
    pub fn rewrite_scalar<T, F>(
        &mut self,
        path: &FieldPath,
        mut factory: F,
    ) -> Result<Vec<Change>, ChangeError>
    where
        T: DeserializeOwned,
        F: FnMut(Option<T>, OperationType) -> Result<Change, ChangeError>,
    {
        let pointer = path.to_pointer(self.naming());
        self.rewrite_matching(
            |op| (op.path == pointer).then_some(()),
            |op, ()| factory(decode(op)?, op.op),
        )
    }

    /// Convert every operation addressing the list at `path` or one of its
    /// elements. Operations below an element (`/list/0/name`) or with an
    /// unparseable trailing segment are left in the document.
    ///
    /// Operations on the whole list reach the factory without a value,
    /// since their value is a list rather than one element.
    pub fn rewrite_list<T, F>(
        &mut self,
        path: &FieldPath,
        mut factory: F,
    ) -> Result<Vec<Change>, ChangeError>
    where
        T: DeserializeOwned,
        F: FnMut(Option<T>, ListIndex, OperationType) -> Result<Change, ChangeError>,
    {
        let pointer = path.to_pointer(self.naming());
        self.rewrite_matching(
            |op| list_index(&pointer, &op.path),
            |op, index| match index {
                ListIndex::Whole => factory(None, index, op.op),
                _ => factory(decode(op)?, index, op.op),
            },
        )
    }

    /// Drop every operation at or below `path` without converting it.
    pub fn remove_path(&mut self, path: &FieldPath) -> usize {
        let pointer = path.to_pointer(self.naming());
        let prefix = format!("{pointer}/");
        let before = self.len();
        self.operations_mut()
            .retain(|op| op.path != pointer && !op.path.starts_with(&prefix));
        before - self.len()
    }

    // Matched operations are only removed once every factory call succeeded.
    fn rewrite_matching<M, P, F>(&mut self, matcher: P, mut convert: F) -> Result<Vec<Change>, ChangeError>
    where
        P: Fn(&PatchOperation) -> Option<M>,
        F: FnMut(&PatchOperation, M) -> Result<Change, ChangeError>,
    {
        let mut changes = Vec::new();
        let mut matched = Vec::new();
        for (position, op) in self.operations().iter().enumerate() {
            if let Some(m) = matcher(op) {
                changes.push(convert(op, m)?);
                matched.push(position);
            }
        }
        let mut position = 0;
        self.operations_mut().retain(|_| {
            let keep = !matched.contains(&position);
            position += 1;
            keep
        });
        Ok(changes)
    }
}

fn list_index(list_pointer: &str, op_path: &str) -> Option<ListIndex> {
    if op_path == list_pointer {
        return Some(ListIndex::Whole);
    }
    let last = op_path.strip_prefix(list_pointer)?.strip_prefix('/')?;
    if last.contains('/') {
        return None;
    }
    if last == "-" {
        return Some(ListIndex::FromEnd(1));
    }
    last.parse().ok().map(ListIndex::FromStart)
}

fn decode<T: DeserializeOwned>(op: &PatchOperation) -> Result<Option<T>, ChangeError> {
    op.value
        .clone()
        .map(|value| {
            serde_json::from_value(value).map_err(|source| PatchError::Value {
                path: op.path.clone(),
                source,
            })
        })
        .transpose()
        .map_err(ChangeError::from)
}
