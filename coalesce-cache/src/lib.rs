//! COALESCE Cache - Normalized Object Cache for Query APIs
//!
//! Given a stream of query executions (each producing a decoded, nested
//! response tree) and mutation executions (each producing a partial update),
//! this crate maintains a single deduplicated store of domain objects such
//! that any two queries referencing the same logical entity observe a
//! consistent value, and a mutation's effect is visible to every
//! previously-cached query that referenced the mutated entity.
//!
//! # Design Philosophy
//!
//! Consistency is structural, not event-driven: a mutation merges into the
//! shared object store and every normalized query record sees the change on
//! its next materialization, with no query-level bookkeeping. Queries whose
//! trees cannot be keyed degrade to opaque blobs that mutations deliberately
//! do not touch.
//!
//! # Example
//!
//! ```ignore
//! let mut resolver = ResolverRegistry::new();
//! resolver.register_id_field("Account", "id");
//!
//! let cache = QueryCache::new(CacheConfig::default(), resolver, transport)?;
//!
//! let mut stream = cache.fetch(
//!     OperationRequest::new("GetBalance", json!({"accountId": 123})),
//!     FetchPolicy::CacheFirst,
//!     None,
//! );
//! let result = stream.next().await.expect("one emission")?;
//! ```

pub mod client;
pub mod mutation;
pub mod normalize;
pub mod policy;
pub mod records;
pub mod resolver;
pub mod store;
pub mod traits;

pub use client::QueryCache;
pub use mutation::MutationOutcome;
pub use normalize::{NormalizedResponse, Normalizer, RootShape};
pub use policy::{FetchPolicy, FetchResult, FetchStream, ResultSource};
pub use records::{QueryRecord, QueryRecordTable, RecordBody};
pub use resolver::{IdentityRule, ResolverRegistry};
pub use store::{MergeReport, ObjectStore};
pub use traits::{CacheStats, OperationRequest, Transport};

// Re-export the core types callers need at the boundary.
pub use coalesce_core::{
    CacheConfig, CacheError, CacheKey, CacheObject, CacheResult, FieldValue, MergeConflictPolicy,
    QueryIdentity, ScopeTag, Ttl,
};
