//! Identity resolver registry.
//!
//! One rule per domain type, registered before first use, decides whether an
//! object is individually addressable. Rules must be pure and deterministic:
//! the normalizer calls them once per object per response.
//!
//! Three outcomes are kept strictly apart:
//! - unregistered type or rule declines ⇒ object stays embedded (unkeyed)
//! - rule produces an id ⇒ `CacheKey` of the form `TypeName:id`
//! - rule fails ⇒ [`ResolutionError`], fatal to the enclosing fetch;
//!   ambiguity is never silently treated as unkeyed

use coalesce_core::{CacheKey, ResolutionError};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// An identity rule: inspects an object's fields and returns the entity id,
/// `None` to decline, or an error description when identity is ambiguous.
pub type IdentityRule = dyn Fn(&Map<String, Value>) -> Result<Option<String>, String> + Send + Sync;

/// Registry of identity rules, keyed by type name.
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    rules: HashMap<String, Arc<IdentityRule>>,
}

impl ResolverRegistry {
    /// Create an empty registry. Unregistered types resolve to unkeyed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule for a type. Registering the same type again replaces
    /// the previous rule.
    pub fn register<F>(&mut self, type_name: impl Into<String>, rule: F)
    where
        F: Fn(&Map<String, Value>) -> Result<Option<String>, String> + Send + Sync + 'static,
    {
        self.rules.insert(type_name.into(), Arc::new(rule));
    }

    /// Register the common case: key by the string/number value of one
    /// id field. Objects missing the field decline normalization.
    pub fn register_id_field(&mut self, type_name: impl Into<String>, id_field: impl Into<String>) {
        let id_field = id_field.into();
        self.register(type_name, move |fields| {
            match fields.get(&id_field) {
                None | Some(Value::Null) => Ok(None),
                Some(Value::String(s)) => Ok(Some(s.clone())),
                Some(Value::Number(n)) => Ok(Some(n.to_string())),
                Some(other) => Err(format!(
                    "id field {id_field} has non-identifier shape: {}",
                    match other {
                        Value::Array(_) => "array",
                        Value::Object(_) => "object",
                        _ => "bool",
                    }
                )),
            }
        });
    }

    /// Whether a rule exists for the type.
    pub fn is_registered(&self, type_name: &str) -> bool {
        self.rules.contains_key(type_name)
    }

    /// Resolve an object's cache key.
    pub fn resolve(
        &self,
        type_name: &str,
        fields: &Map<String, Value>,
    ) -> Result<Option<CacheKey>, ResolutionError> {
        let Some(rule) = self.rules.get(type_name) else {
            return Ok(None);
        };
        match rule(fields) {
            Ok(None) => Ok(None),
            Ok(Some(id)) if id.is_empty() => Err(ResolutionError::EmptyKey {
                type_name: type_name.to_string(),
            }),
            Ok(Some(id)) => Ok(Some(CacheKey::new(type_name, &id))),
            Err(reason) => Err(ResolutionError::RuleFailed {
                type_name: type_name.to_string(),
                reason,
            }),
        }
    }
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&String> = self.rules.keys().collect();
        types.sort();
        f.debug_struct("ResolverRegistry")
            .field("types", &types)
            .finish()
    }
}
