//! Mutation application.
//!
//! A mutation response runs through the same normalization pipeline as a
//! query response and merges into the object store. The returned set of
//! changed keys is the sole staleness signal: no query record is touched
//! and no eager re-materialization happens. Normalized queries simply see
//! the new values on their next read.
//!
//! Opaque query records are deliberately not patched, even when a mutation
//! response happens to contain matching field names. A blob without a
//! reference graph cannot be updated without risking silent divergence;
//! callers refetch those queries explicitly.

use crate::normalize::Normalizer;
use crate::resolver::ResolverRegistry;
use crate::store::ObjectStore;
use coalesce_core::{CacheConfig, CacheKey, CacheResult, ScopeTag};
use serde_json::Value;
use std::collections::BTreeSet;

/// Result of applying one mutation response.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome {
    /// The decoded response tree, unchanged.
    pub data: Value,
    /// Keys whose stored fields actually changed. Queries referencing none
    /// of these keys are unaffected.
    pub touched: BTreeSet<CacheKey>,
}

/// Normalize a mutation response and merge it into the object store.
///
/// Returns exactly the keys whose fields changed value. Re-applying a
/// mutation response that changes nothing returns an empty set.
pub fn apply_mutation(
    response: &Value,
    resolver: &ResolverRegistry,
    config: &CacheConfig,
    scope: Option<ScopeTag>,
    objects: &mut ObjectStore,
) -> CacheResult<BTreeSet<CacheKey>> {
    let normalized = Normalizer::new(resolver, &config.type_field, scope).normalize(response)?;
    let report = objects.merge_all(normalized.pending, config.merge_conflict_policy)?;
    tracing::debug!(touched = report.changed.len(), "mutation applied");
    Ok(report.changed)
}
