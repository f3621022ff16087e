//! Response tree normalization.
//!
//! Depth-first walk of a decoded response tree. Children are normalized
//! before their parents so child references exist before the parent record
//! is built. Keyed objects become pending store merges and are replaced in
//! the parent by a [`FieldValue::Reference`]; unkeyed objects stay embedded
//! and mark the whole query opaque.
//!
//! The root node is the query's own reference graph, never a keyed entity,
//! so it is exempt from keying (and from the opaque poisoning rule).

use crate::resolver::ResolverRegistry;
use coalesce_core::{CacheKey, CacheObject, FieldValue, ResolutionError, ScopeTag};
use serde_json::Value;
use std::collections::BTreeMap;

/// The query-record side of a normalization: either a reference graph that
/// re-materializes through the object store, or the literal tree.
#[derive(Debug, Clone, PartialEq)]
pub enum RootShape {
    /// Every object in the tree was keyed (or is the root wrapper).
    Normalized(FieldValue),
    /// At least one object could not be keyed; the tree is stored verbatim.
    Opaque(FieldValue),
}

/// Output of normalizing one response tree.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResponse {
    /// Pending object merges, children before parents.
    pub pending: Vec<(CacheKey, CacheObject)>,
    /// The root shape for the query record.
    pub root: RootShape,
}

impl NormalizedResponse {
    /// Whether the owning query record will be opaque.
    pub fn is_opaque(&self) -> bool {
        matches!(self.root, RootShape::Opaque(_))
    }
}

/// Walks decoded response trees and extracts addressable objects.
pub struct Normalizer<'a> {
    resolver: &'a ResolverRegistry,
    type_field: &'a str,
    scope: Option<ScopeTag>,
}

impl<'a> Normalizer<'a> {
    /// Create a normalizer for one response.
    pub fn new(resolver: &'a ResolverRegistry, type_field: &'a str, scope: Option<ScopeTag>) -> Self {
        Self {
            resolver,
            type_field,
            scope,
        }
    }

    /// Normalize a decoded response tree.
    ///
    /// Keyed objects are emitted as pending merges even when the tree as a
    /// whole ends up opaque: the store still learns everything addressable
    /// the response contained.
    pub fn normalize(&self, tree: &Value) -> Result<NormalizedResponse, ResolutionError> {
        let mut pending = Vec::new();
        let mut opaque = false;
        let root_value = self.walk(tree, true, &mut pending, &mut opaque)?;

        let root = if opaque {
            RootShape::Opaque(FieldValue::from_json(tree.clone()))
        } else {
            RootShape::Normalized(root_value)
        };
        tracing::debug!(
            pending = pending.len(),
            opaque,
            "normalized response tree"
        );
        Ok(NormalizedResponse { pending, root })
    }

    fn walk(
        &self,
        value: &Value,
        is_root: bool,
        pending: &mut Vec<(CacheKey, CacheObject)>,
        opaque: &mut bool,
    ) -> Result<FieldValue, ResolutionError> {
        match value {
            Value::Null => Ok(FieldValue::Null),
            Value::Array(items) => {
                // Element-wise, order preserved in the resulting list.
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.walk(item, false, pending, opaque)?);
                }
                Ok(FieldValue::List(out))
            }
            Value::Object(map) => {
                // Children before parents: a parent's record may only hold
                // references to already-emitted children.
                let mut fields = BTreeMap::new();
                for (name, child) in map {
                    fields.insert(name.clone(), self.walk(child, false, pending, opaque)?);
                }
                if is_root {
                    return Ok(FieldValue::Object(fields));
                }

                let type_name = map.get(self.type_field).and_then(Value::as_str);
                if let Some(type_name) = type_name {
                    if let Some(key) = self.resolver.resolve(type_name, map)? {
                        let object =
                            CacheObject::from_fields(fields).with_scope(self.scope.clone());
                        pending.push((key.clone(), object));
                        return Ok(FieldValue::Reference(key));
                    }
                }
                // Unkeyed: stays embedded and poisons the query to opaque.
                *opaque = true;
                Ok(FieldValue::Object(fields))
            }
            scalar => Ok(FieldValue::Scalar(scalar.clone())),
        }
    }
}
