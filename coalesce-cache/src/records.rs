//! Query record table and freshness tracking.
//!
//! One record per `(operation, canonicalized variables)` identity. A record
//! is either normalized (a root reference graph re-materialized through the
//! object store) or opaque (a literal payload), decided at first write and
//! fixed for the record's lifetime.
//!
//! Materializing a normalized record walks the reference graph; any missing
//! key fails the whole materialization with a partial miss rather than
//! producing a partially-null tree.

use crate::normalize::RootShape;
use crate::store::ObjectStore;
use coalesce_core::{
    CacheError, CacheKey, CacheResult, CorruptionError, FieldValue, QueryIdentity, ScopeTag,
    Timestamp, Ttl,
};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// The stored body of a query record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordBody {
    /// Root reference graph, resolved through the object store on read.
    Normalized(FieldValue),
    /// Literal payload, returned verbatim on read.
    Opaque(FieldValue),
}

impl RecordBody {
    /// Short mode name for diagnostics.
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Normalized(_) => "normalized",
            Self::Opaque(_) => "opaque",
        }
    }
}

impl From<RootShape> for RecordBody {
    fn from(root: RootShape) -> Self {
        match root {
            RootShape::Normalized(value) => Self::Normalized(value),
            RootShape::Opaque(value) => Self::Opaque(value),
        }
    }
}

/// One recorded query with its freshness entry.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRecord {
    body: RecordBody,
    fetched_at: Timestamp,
    ttl: Ttl,
    scope: Option<ScopeTag>,
}

impl QueryRecord {
    /// The record body.
    pub fn body(&self) -> &RecordBody {
        &self.body
    }

    /// When the backing response was fetched.
    pub fn fetched_at(&self) -> Timestamp {
        self.fetched_at
    }

    /// The TTL resolved at fetch time.
    pub fn ttl(&self) -> Ttl {
        self.ttl
    }

    /// Whether the record is stale at the given instant.
    pub fn is_stale(&self, now: Timestamp) -> bool {
        let age = now
            .signed_duration_since(self.fetched_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        self.ttl.is_expired(age)
    }

    /// The scope tag attached at record time, if any.
    pub fn scope(&self) -> Option<&ScopeTag> {
        self.scope.as_ref()
    }
}

/// Table of recorded queries.
#[derive(Debug, Clone, Default)]
pub struct QueryRecordTable {
    records: HashMap<QueryIdentity, QueryRecord>,
}

impl QueryRecordTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write or refresh a record.
    ///
    /// A record keeps its normalized/opaque mode for life: a refresh whose
    /// tree changed normalizability is rejected as corruption so the caller
    /// must explicitly clear the record first.
    pub fn record(
        &mut self,
        identity: QueryIdentity,
        body: RecordBody,
        ttl: Ttl,
        scope: Option<ScopeTag>,
        now: Timestamp,
    ) -> Result<(), CorruptionError> {
        if let Some(existing) = self.records.get(&identity) {
            if existing.body.mode() != body.mode() {
                return Err(CorruptionError::RecordModeChanged {
                    operation: identity.operation().to_string(),
                    previous: existing.body.mode(),
                    attempted: body.mode(),
                });
            }
        }
        tracing::debug!(identity = %identity, mode = body.mode(), "recording query");
        self.records.insert(
            identity,
            QueryRecord {
                body,
                fetched_at: now,
                ttl,
                scope,
            },
        );
        Ok(())
    }

    /// Look up a record.
    pub fn get(&self, identity: &QueryIdentity) -> Option<&QueryRecord> {
        self.records.get(identity)
    }

    /// Whether a record exists and is stale. `None` when no record exists.
    pub fn is_stale(&self, identity: &QueryIdentity, now: Timestamp) -> Option<bool> {
        self.records.get(identity).map(|r| r.is_stale(now))
    }

    /// Reconstruct the full result value for a recorded query.
    ///
    /// Opaque records return their literal payload. Normalized records walk
    /// the reference graph through the object store; a dangling reference
    /// anywhere fails with [`CacheError::PartialMiss`].
    pub fn materialize(
        &self,
        identity: &QueryIdentity,
        objects: &ObjectStore,
    ) -> CacheResult<Value> {
        let record = self.records.get(identity).ok_or_else(|| CacheError::Miss {
            operation: identity.operation().to_string(),
        })?;
        match &record.body {
            RecordBody::Opaque(literal) => {
                let mut path = Vec::new();
                render(literal, objects, identity, &mut path)
            }
            RecordBody::Normalized(root) => {
                let mut path = Vec::new();
                render(root, objects, identity, &mut path)
            }
        }
    }

    /// Remove one record. Returns whether it existed.
    pub fn remove(&mut self, identity: &QueryIdentity) -> bool {
        self.records.remove(identity).is_some()
    }

    /// Remove every record carrying the given scope tag. Returns the number
    /// removed.
    pub fn delete_scope(&mut self, scope: &ScopeTag) -> u64 {
        let before = self.records.len();
        self.records.retain(|_, record| record.scope() != Some(scope));
        (before - self.records.len()) as u64
    }

    /// Remove everything. Returns the number removed.
    pub fn clear(&mut self) -> u64 {
        let count = self.records.len() as u64;
        self.records.clear();
        count
    }

    /// Number of recorded queries.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records stale at the given instant.
    pub fn stale_count(&self, now: Timestamp) -> u64 {
        self.records.values().filter(|r| r.is_stale(now)).count() as u64
    }
}

fn render(
    value: &FieldValue,
    objects: &ObjectStore,
    identity: &QueryIdentity,
    path: &mut Vec<CacheKey>,
) -> CacheResult<Value> {
    match value {
        FieldValue::Null => Ok(Value::Null),
        FieldValue::Scalar(scalar) => Ok(scalar.clone()),
        FieldValue::List(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(render(item, objects, identity, path)?);
            }
            Ok(Value::Array(out))
        }
        FieldValue::Object(fields) => {
            let mut map = serde_json::Map::new();
            for (name, field) in fields {
                map.insert(name.clone(), render(field, objects, identity, path)?);
            }
            Ok(Value::Object(map))
        }
        FieldValue::Reference(key) => {
            if path.contains(key) {
                // Reference cycle: terminate with the bare key rather than
                // recursing forever.
                tracing::debug!(key = %key, "reference cycle during materialization");
                return Ok(Value::String(key.to_string()));
            }
            let object = objects.get(key).ok_or_else(|| CacheError::PartialMiss {
                operation: identity.operation().to_string(),
                missing: key.clone(),
            })?;
            path.push(key.clone());
            let mut map = serde_json::Map::new();
            for (name, field) in object.fields() {
                map.insert(name.clone(), render(field, objects, identity, path)?);
            }
            path.pop();
            Ok(Value::Object(map))
        }
    }
}
