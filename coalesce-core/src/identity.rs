//! Identity types for cached entities and recorded queries.
//!
//! A [`CacheKey`] names one logical entity (`TypeName:id` by convention) and
//! is only ever minted by the identity resolver in `coalesce-cache`. A
//! [`QueryIdentity`] names one recorded query execution: operation name plus
//! a digest of its canonicalized variables, so logically-equal variable maps
//! produce the same identity regardless of key order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Separator between the type name and the entity id in a rendered key.
const KEY_SEPARATOR: char = ':';

/// Globally unique identity of one logical entity in the object store.
///
/// Opaque to callers: the only producer is a registered identity rule, and
/// the only consumers are the object store and the reference graph of a
/// recorded query. Two keys are the same entity iff they compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Build a key from a type name and a domain identifier.
    pub fn new(type_name: &str, id: &str) -> Self {
        Self(format!("{type_name}{KEY_SEPARATOR}{id}"))
    }

    /// The rendered key string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The type-name prefix of the key, if the key follows the
    /// `TypeName:id` convention.
    pub fn type_name(&self) -> Option<&str> {
        self.0.split_once(KEY_SEPARATOR).map(|(t, _)| t)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// External scope identifier (e.g. an account id) attached to cached data
/// at merge time. Used only for scoped clearing; never part of identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeTag(String);

impl ScopeTag {
    /// Create a scope tag from an external identifier.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The tag value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one recorded query: operation name plus a SHA-256 digest of
/// its canonicalized variables.
///
/// Canonicalization sorts object keys recursively before hashing, so
/// `{a: 1, b: 2}` and `{b: 2, a: 1}` identify the same record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryIdentity {
    operation: String,
    variables_digest: String,
}

impl QueryIdentity {
    /// Build the identity for an operation and its variables.
    pub fn new(operation: impl Into<String>, variables: &Value) -> Self {
        let canonical = canonical_variables(variables);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Self {
            operation: operation.into(),
            variables_digest: hex::encode(hasher.finalize()),
        }
    }

    /// The operation name this identity belongs to.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Hex digest of the canonicalized variables.
    pub fn variables_digest(&self) -> &str {
        &self.variables_digest
    }
}

impl fmt::Display for QueryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short digest is enough to disambiguate in logs.
        write!(f, "{}#{}", self.operation, &self.variables_digest[..12])
    }
}

/// Render a JSON value in canonical form: object keys sorted recursively,
/// no insignificant whitespace.
pub fn canonical_variables(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_key_format() {
        let key = CacheKey::new("Account", "123");
        assert_eq!(key.as_str(), "Account:123");
        assert_eq!(key.type_name(), Some("Account"));
    }

    #[test]
    fn test_cache_key_equality_is_identity() {
        assert_eq!(CacheKey::new("Account", "1"), CacheKey::new("Account", "1"));
        assert_ne!(CacheKey::new("Account", "1"), CacheKey::new("Account", "2"));
        assert_ne!(CacheKey::new("Account", "1"), CacheKey::new("User", "1"));
    }

    #[test]
    fn test_query_identity_ignores_key_order() {
        let a = QueryIdentity::new("GetBalance", &json!({"accountId": 123, "currency": "EUR"}));
        let b = QueryIdentity::new("GetBalance", &json!({"currency": "EUR", "accountId": 123}));
        assert_eq!(a, b);
    }

    #[test]
    fn test_query_identity_distinguishes_variables() {
        let a = QueryIdentity::new("GetBalance", &json!({"accountId": 123}));
        let b = QueryIdentity::new("GetBalance", &json!({"accountId": 124}));
        assert_ne!(a, b);
        assert_eq!(a.operation(), b.operation());
    }

    #[test]
    fn test_query_identity_distinguishes_operations() {
        let vars = json!({"accountId": 123});
        let a = QueryIdentity::new("GetBalance", &vars);
        let b = QueryIdentity::new("GetAccountDetails", &vars);
        assert_ne!(a, b);
    }

    #[test]
    fn test_canonical_nested_objects() {
        let canonical = canonical_variables(&json!({
            "b": {"y": 2, "x": 1},
            "a": [{"q": true, "p": false}],
        }));
        assert_eq!(canonical, r#"{"a":[{"p":false,"q":true}],"b":{"x":1,"y":2}}"#);
    }
}
