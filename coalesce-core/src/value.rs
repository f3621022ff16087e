//! The stored value model: field values and normalized cache objects.
//!
//! A [`CacheObject`] is a flat field map. Each field holds a [`FieldValue`]:
//! a scalar, an explicit null, an embedded (un-normalizable) object, a list,
//! or a [`Reference`](FieldValue::Reference) to another normalized object.
//!
//! # Field-type invariant
//!
//! Once a field holds a reference, later merges for that field must keep a
//! reference of the same declared type. Mixing referenced and literal data
//! under one field is a corruption condition, detected by [`field_conflict`]
//! and surfaced by the object store rather than silently overwritten.

use crate::identity::{CacheKey, ScopeTag};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One stored field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Explicit null. Overwrites any prior value on merge; distinct from an
    /// absent field, which leaves the prior value untouched.
    Null,
    /// A JSON scalar (string, number, bool).
    Scalar(Value),
    /// An embedded object that could not be keyed, stored verbatim.
    Object(BTreeMap<String, FieldValue>),
    /// A list, element-wise, order-preserving.
    List(Vec<FieldValue>),
    /// A normalized child, stored once in the object store.
    Reference(CacheKey),
}

impl FieldValue {
    /// Convert a decoded JSON tree verbatim, with no reference extraction.
    /// Used for opaque payloads and embedded un-keyed objects.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
            Value::Array(items) => Self::List(items.into_iter().map(Self::from_json).collect()),
            scalar => Self::Scalar(scalar),
        }
    }

    /// Short name of the value shape, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Scalar(_) => "scalar",
            Self::Object(_) => "object",
            Self::List(_) => "list",
            Self::Reference(_) => "reference",
        }
    }

    /// Whether any reference occurs anywhere in this value.
    pub fn contains_reference(&self) -> bool {
        match self {
            Self::Reference(_) => true,
            Self::List(items) => items.iter().any(Self::contains_reference),
            Self::Object(fields) => fields.values().any(Self::contains_reference),
            Self::Null | Self::Scalar(_) => false,
        }
    }
}

/// Why an incoming field value cannot replace an existing one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldConflict {
    /// Referenced and literal data mixed under one field.
    ShapeMismatch {
        existing: &'static str,
        incoming: &'static str,
    },
    /// A reference was replaced by a reference of a different declared type.
    ReferenceTypeChanged { expected: String, got: String },
}

/// Check the field-type invariant for one field merge.
///
/// Explicit null is compatible in both directions: it clears a field, and a
/// cleared field may later be repopulated with any shape.
pub fn field_conflict(existing: &FieldValue, incoming: &FieldValue) -> Option<FieldConflict> {
    if matches!(existing, FieldValue::Null) || matches!(incoming, FieldValue::Null) {
        return None;
    }
    if let (FieldValue::Reference(old), FieldValue::Reference(new)) = (existing, incoming) {
        let (expected, got) = (old.type_name(), new.type_name());
        if expected != got {
            return Some(FieldConflict::ReferenceTypeChanged {
                expected: expected.unwrap_or("?").to_string(),
                got: got.unwrap_or("?").to_string(),
            });
        }
        return None;
    }
    if existing.contains_reference() != incoming.contains_reference() {
        return Some(FieldConflict::ShapeMismatch {
            existing: existing.kind(),
            incoming: incoming.kind(),
        });
    }
    None
}

/// A normalized object: flat field map plus an optional scope tag.
///
/// The scope tag is clearing metadata, not identity; two objects with the
/// same key but different tags are still the same entity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CacheObject {
    fields: BTreeMap<String, FieldValue>,
    scope: Option<ScopeTag>,
}

impl CacheObject {
    /// Create an empty object.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an object from a field map.
    pub fn from_fields(fields: BTreeMap<String, FieldValue>) -> Self {
        Self {
            fields,
            scope: None,
        }
    }

    /// Attach a scope tag, consuming self.
    pub fn with_scope(mut self, scope: Option<ScopeTag>) -> Self {
        self.scope = scope;
        self
    }

    /// Set a field value.
    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    /// Look up a field value.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Iterate over fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the object has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The scope tag attached at merge time, if any.
    pub fn scope(&self) -> Option<&ScopeTag> {
        self.scope.as_ref()
    }

    /// Replace the scope tag.
    pub fn set_scope(&mut self, scope: Option<ScopeTag>) {
        self.scope = scope;
    }
}
