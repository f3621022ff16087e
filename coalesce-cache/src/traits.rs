//! Transport seam, operation requests, and cache statistics.
//!
//! The cache never parses a query language or speaks a wire protocol. It
//! consumes decoded response trees from a [`Transport`] supplied by the
//! caller, tagged with an operation identity.

use async_trait::async_trait;
use coalesce_core::{QueryIdentity, ScopeTag};
use serde_json::Value;

/// One query or mutation execution request.
///
/// `variables` participate in the query identity after canonicalization;
/// `scope` is clearing metadata stamped on everything the response writes.
#[derive(Debug, Clone)]
pub struct OperationRequest {
    /// Operation name, e.g. `GetBalance`.
    pub operation: String,
    /// Decoded variables for this execution.
    pub variables: Value,
    /// Scope tag attached to records written by this execution.
    pub scope: Option<ScopeTag>,
}

impl OperationRequest {
    /// Create a request with no scope tag.
    pub fn new(operation: impl Into<String>, variables: Value) -> Self {
        Self {
            operation: operation.into(),
            variables,
            scope: None,
        }
    }

    /// Attach a scope tag.
    pub fn with_scope(mut self, scope: ScopeTag) -> Self {
        self.scope = Some(scope);
        self
    }

    /// The query record identity for this request.
    pub fn identity(&self) -> QueryIdentity {
        QueryIdentity::new(self.operation.clone(), &self.variables)
    }
}

/// Transport abstraction over the network/decoding layer.
///
/// Implementations execute the named operation and return the decoded
/// response tree. Transport failures are opaque to the cache and passed
/// through to the caller unchanged.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute an operation and return its decoded response tree.
    async fn execute(&self, request: &OperationRequest) -> Result<Value, String>;
}

/// Statistics about cache usage.
///
/// Counts only — no field contents, so the struct is safe to log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of fetches served from the cache.
    pub hits: u64,
    /// Number of fetches that went to the transport.
    pub misses: u64,
    /// Number of objects currently in the store.
    pub object_count: u64,
    /// Number of recorded queries.
    pub query_count: u64,
    /// Number of recorded queries currently stale.
    pub stale_query_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
