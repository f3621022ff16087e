//! The flat object store: `CacheKey` → field map, with field-level merge.
//!
//! Merges are partial: fields absent from the incoming object are retained,
//! present fields (including explicit null) overwrite. A field-type
//! mismatch is a corruption condition handled per the configured policy —
//! drop the field and keep the rest, or abort the whole write.
//!
//! The store is not internally synchronized. It is owned by the client's
//! cache state behind a single writer lock; a whole-response
//! [`merge_all`](ObjectStore::merge_all) runs to completion inside that
//! lock, so readers never observe a half-merged response.

use coalesce_core::value::{field_conflict, FieldConflict};
use coalesce_core::{
    CacheKey, CacheObject, CorruptionError, FieldValue, MergeConflictPolicy, ScopeTag,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Outcome of one whole-response merge transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Keys whose stored fields actually changed value. The change signal
    /// for "which queries are now stale".
    pub changed: BTreeSet<CacheKey>,
    /// Fields dropped under [`MergeConflictPolicy::FailField`], as
    /// `(key, field)` pairs.
    pub dropped: Vec<(CacheKey, String)>,
}

/// In-memory map of normalized objects.
#[derive(Debug, Clone, Default)]
pub struct ObjectStore {
    objects: HashMap<CacheKey, CacheObject>,
}

impl ObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an object by key.
    pub fn get(&self, key: &CacheKey) -> Option<&CacheObject> {
        self.objects.get(key)
    }

    /// Number of objects in the store.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Merge a set of pending records as one all-or-nothing transaction.
    ///
    /// Conflicts are detected across the whole set before anything is
    /// written, so `FailAll` aborts without partial effects and `FailField`
    /// knows every field it will drop up front.
    pub fn merge_all(
        &mut self,
        pending: Vec<(CacheKey, CacheObject)>,
        policy: MergeConflictPolicy,
    ) -> Result<MergeReport, CorruptionError> {
        // Detection pass. Each field is judged against the committed store
        // plus the values already accepted from earlier records in this
        // batch, so a response mentioning the same key twice cannot mix
        // shapes either. Non-conflicting repeats follow the
        // children-before-parents order: the later record wins.
        let mut dropped: Vec<(usize, CacheKey, String)> = Vec::new();
        let mut effective: HashMap<&CacheKey, BTreeMap<&str, &FieldValue>> = HashMap::new();
        for (index, (key, incoming)) in pending.iter().enumerate() {
            let seen = effective.entry(key).or_default();
            for (field, incoming_value) in incoming.fields() {
                let existing_value = seen
                    .get(field.as_str())
                    .copied()
                    .or_else(|| self.objects.get(key).and_then(|o| o.get(field)));
                if let Some(existing_value) = existing_value {
                    if let Some(conflict) = field_conflict(existing_value, incoming_value) {
                        let error = corruption_for(key, field, conflict);
                        if policy == MergeConflictPolicy::FailAll {
                            return Err(error);
                        }
                        tracing::warn!(key = %key, field = %field, error = %error,
                            "dropping corrupted field from merge");
                        dropped.push((index, key.clone(), field.clone()));
                        // The rejected value must not become the effective
                        // shape for later records in the batch.
                        continue;
                    }
                }
                seen.insert(field.as_str(), incoming_value);
            }
        }
        drop(effective);

        // Apply pass.
        let mut changed = BTreeSet::new();
        for (index, (key, incoming)) in pending.into_iter().enumerate() {
            if self.apply_one(&key, incoming, index, &dropped) {
                changed.insert(key);
            }
        }
        if !changed.is_empty() {
            tracing::debug!(changed = changed.len(), "merge transaction committed");
        }
        Ok(MergeReport {
            changed,
            dropped: dropped.into_iter().map(|(_, key, field)| (key, field)).collect(),
        })
    }

    /// Merge a single record. Convenience wrapper over [`merge_all`].
    ///
    /// Returns whether any stored field changed value.
    pub fn merge(
        &mut self,
        key: CacheKey,
        incoming: CacheObject,
        policy: MergeConflictPolicy,
    ) -> Result<bool, CorruptionError> {
        let report = self.merge_all(vec![(key.clone(), incoming)], policy)?;
        Ok(report.changed.contains(&key))
    }

    fn apply_one(
        &mut self,
        key: &CacheKey,
        incoming: CacheObject,
        index: usize,
        dropped: &[(usize, CacheKey, String)],
    ) -> bool {
        let entry = self.objects.entry(key.clone()).or_default();
        let mut changed = false;
        let incoming_scope = incoming.scope().cloned();
        for (field, value) in incoming.fields() {
            if dropped.iter().any(|(i, _, f)| *i == index && f == field) {
                continue;
            }
            if entry.get(field) != Some(value) {
                entry.insert(field.clone(), value.clone());
                changed = true;
            }
        }
        // Scope is metadata: the latest writer's tag wins, silently.
        if incoming_scope.is_some() && entry.scope() != incoming_scope.as_ref() {
            entry.set_scope(incoming_scope);
        }
        changed
    }

    /// Remove one object. Returns whether it existed.
    pub fn delete(&mut self, key: &CacheKey) -> bool {
        self.objects.remove(key).is_some()
    }

    /// Remove every object carrying the given scope tag. Returns the number
    /// removed.
    pub fn delete_scope(&mut self, scope: &ScopeTag) -> u64 {
        let before = self.objects.len();
        self.objects.retain(|_, object| object.scope() != Some(scope));
        (before - self.objects.len()) as u64
    }

    /// Remove everything. Returns the number removed.
    pub fn clear(&mut self) -> u64 {
        let count = self.objects.len() as u64;
        self.objects.clear();
        count
    }
}

fn corruption_for(key: &CacheKey, field: &str, conflict: FieldConflict) -> CorruptionError {
    match conflict {
        FieldConflict::ShapeMismatch { existing, incoming } => CorruptionError::FieldTypeMismatch {
            key: key.clone(),
            field: field.to_string(),
            existing,
            incoming,
        },
        FieldConflict::ReferenceTypeChanged { expected, got } => {
            CorruptionError::ReferenceTypeChanged {
                key: key.clone(),
                field: field.to_string(),
                expected,
                got,
            }
        }
    }
}
