//! Error types for cache operations.
//!
//! Resolution and corruption failures are deliberately distinct from cache
//! misses: both may force a refetch in practice, but callers must be able to
//! tell "nothing cached" apart from "the cache disagreed with itself".

use crate::identity::CacheKey;
use thiserror::Error;

/// Identity resolution errors. Fatal to the enclosing fetch; never
/// downgraded to "unkeyed".
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Identity rule for {type_name} failed: {reason}")]
    RuleFailed { type_name: String, reason: String },

    #[error("Identity rule for {type_name} produced an empty key")]
    EmptyKey { type_name: String },
}

/// Cache corruption detected during a merge or record write.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CorruptionError {
    #[error(
        "Field type mismatch on {key} field {field}: stored {existing}, incoming {incoming}"
    )]
    FieldTypeMismatch {
        key: CacheKey,
        field: String,
        existing: &'static str,
        incoming: &'static str,
    },

    #[error("Reference type changed on {key} field {field}: expected {expected}, got {got}")]
    ReferenceTypeChanged {
        key: CacheKey,
        field: String,
        expected: String,
        got: String,
    },

    #[error("Query record for {operation} changed mode ({previous} -> {attempted})")]
    RecordModeChanged {
        operation: String,
        previous: &'static str,
        attempted: &'static str,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all cache operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Cache corruption: {0}")]
    Corruption(#[from] CorruptionError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// No record exists for the query at all.
    #[error("Cache miss for {operation}")]
    Miss { operation: String },

    /// A record exists but its reference graph has a dangling key, so it
    /// cannot be materialized. Treated as an ordinary miss by fetch
    /// policies, but distinguishable for diagnostics.
    #[error("Partial cache miss for {operation}: dangling reference {missing}")]
    PartialMiss { operation: String, missing: CacheKey },

    /// Opaque transport failure, passed through unchanged.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl CacheError {
    /// Whether this error means "nothing usable in the cache" for fetch
    /// policy purposes. Resolution and corruption errors are NOT misses.
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Miss { .. } | Self::PartialMiss { .. })
    }
}

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
