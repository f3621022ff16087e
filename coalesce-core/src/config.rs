//! Configuration types

use crate::error::{CacheResult, ConfigError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Name of the per-object type-name field assumed when none is configured.
pub const DEFAULT_TYPE_FIELD: &str = "__typename";

/// Time-to-live for a recorded query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ttl {
    /// Never fresh: every access refetches.
    Never,
    /// Fresh until the given age is exceeded. A zero duration is never
    /// fresh, same as [`Ttl::Never`].
    Finite(Duration),
    /// Never stale until explicitly invalidated.
    Infinite,
}

impl Ttl {
    /// Whether a record of the given age is stale under this TTL.
    pub fn is_expired(&self, age: Duration) -> bool {
        match self {
            Self::Never => true,
            Self::Finite(ttl) => ttl.is_zero() || age > *ttl,
            Self::Infinite => false,
        }
    }
}

/// What to do when a merge detects a field-type mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MergeConflictPolicy {
    /// Drop the offending field, commit the rest of the write.
    #[default]
    FailField,
    /// Abort the whole response merge.
    FailAll,
}

/// Cache configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL applied when neither a per-call override nor a per-operation
    /// entry matches.
    pub default_ttl: Ttl,
    /// Per-operation TTLs, keyed by operation name.
    pub per_operation_ttl: HashMap<String, Ttl>,
    /// Conflict handling for field-type mismatches on merge.
    pub merge_conflict_policy: MergeConflictPolicy,
    /// Name of the field carrying an object's type name in decoded trees.
    pub type_field: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Ttl::Finite(Duration::from_secs(300)),
            per_operation_ttl: HashMap::new(),
            merge_conflict_policy: MergeConflictPolicy::default(),
            type_field: DEFAULT_TYPE_FIELD.to_string(),
        }
    }
}

impl CacheConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the global default TTL.
    pub fn with_default_ttl(mut self, ttl: Ttl) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Declare a TTL for one operation.
    pub fn with_operation_ttl(mut self, operation: impl Into<String>, ttl: Ttl) -> Self {
        self.per_operation_ttl.insert(operation.into(), ttl);
        self
    }

    /// Set the merge conflict policy.
    pub fn with_merge_policy(mut self, policy: MergeConflictPolicy) -> Self {
        self.merge_conflict_policy = policy;
        self
    }

    /// Set the type-name field.
    pub fn with_type_field(mut self, field: impl Into<String>) -> Self {
        self.type_field = field.into();
        self
    }

    /// Resolve the TTL for one fetch: explicit per-call override, then the
    /// per-operation declaration, then the global default.
    pub fn ttl_for(&self, operation: &str, override_ttl: Option<Ttl>) -> Ttl {
        override_ttl
            .or_else(|| self.per_operation_ttl.get(operation).copied())
            .unwrap_or(self.default_ttl)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> CacheResult<()> {
        if self.type_field.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "type_field".to_string(),
                value: String::new(),
                reason: "type_field must not be empty".to_string(),
            }
            .into());
        }
        for operation in self.per_operation_ttl.keys() {
            if operation.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "per_operation_ttl".to_string(),
                    value: String::new(),
                    reason: "operation names must not be empty".to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}
