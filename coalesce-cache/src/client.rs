//! The query cache client: fetch policy engine and cache manager boundary.
//!
//! One [`QueryCache`] owns the shared state (object store + query record
//! table) behind a single `tokio::sync::RwLock`. A whole-response merge
//! runs synchronously inside the writer lock, so readers observe each
//! response all-or-nothing and `clear_all` waits for any in-flight merge
//! before applying. Network fetches happen outside the lock and suspend
//! only the issuing call.
//!
//! Every fetch runs in a spawned task feeding a [`FetchStream`]; dropping
//! the stream cancels delivery to the caller but never a merge that has
//! already taken the lock.

use crate::mutation::{self, MutationOutcome};
use crate::normalize::Normalizer;
use crate::policy::{FetchPolicy, FetchResult, FetchStream};
use crate::records::QueryRecordTable;
use crate::resolver::ResolverRegistry;
use crate::store::ObjectStore;
use crate::traits::{CacheStats, OperationRequest, Transport};
use chrono::Utc;
use coalesce_core::{
    CacheConfig, CacheError, CacheKey, CacheResult, QueryIdentity, ScopeTag, Ttl,
};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct CacheState {
    objects: ObjectStore,
    records: QueryRecordTable,
}

struct Inner {
    config: CacheConfig,
    resolver: ResolverRegistry,
    transport: Arc<dyn Transport>,
    state: RwLock<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Client-side normalized object cache for query-based APIs.
///
/// Constructed once per session and shared by cloning (cheap, `Arc`-backed).
/// Torn down by [`clear_all`](Self::clear_all) on session end to prevent
/// cross-session data exposure.
#[derive(Clone)]
pub struct QueryCache {
    inner: Arc<Inner>,
}

impl QueryCache {
    /// Create a cache with the given configuration, identity rules and
    /// transport. Fails when the configuration is invalid.
    pub fn new(
        config: CacheConfig,
        resolver: ResolverRegistry,
        transport: Arc<dyn Transport>,
    ) -> CacheResult<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                resolver,
                transport,
                state: RwLock::new(CacheState::default()),
                hits: AtomicU64::new(0),
                misses: AtomicU64::new(0),
            }),
        })
    }

    /// Execute a query through the fetch policy engine.
    ///
    /// Must be called inside a tokio runtime: the fetch runs in a spawned
    /// task and delivers its one or two emissions through the returned
    /// stream.
    pub fn fetch(
        &self,
        request: OperationRequest,
        policy: FetchPolicy,
        ttl_override: Option<Ttl>,
    ) -> FetchStream {
        let (tx, stream) = FetchStream::channel();
        let cache = self.clone();
        tokio::spawn(async move {
            cache.run_fetch(request, policy, ttl_override, tx).await;
        });
        stream
    }

    async fn run_fetch(
        &self,
        request: OperationRequest,
        policy: FetchPolicy,
        ttl_override: Option<Ttl>,
        tx: mpsc::Sender<CacheResult<FetchResult>>,
    ) {
        let identity = request.identity();
        let ttl = self.inner.config.ttl_for(&request.operation, ttl_override);
        tracing::debug!(identity = %identity, ?policy, "fetch");

        match policy {
            FetchPolicy::CacheOnly => {
                let result = self.materialize_any(&identity).await;
                self.count(result.is_ok());
                let _ = tx.send(result.map(FetchResult::cache)).await;
            }
            FetchPolicy::CacheFirst => match self.materialize_fresh(&identity).await {
                Ok(data) => {
                    self.count(true);
                    let _ = tx.send(Ok(FetchResult::cache(data))).await;
                }
                Err(err) if err.is_miss() => {
                    self.count(false);
                    let result = self.fetch_and_store(&request, &identity, ttl).await;
                    let _ = tx.send(result.map(FetchResult::network)).await;
                }
                Err(err) => {
                    let _ = tx.send(Err(err)).await;
                }
            },
            FetchPolicy::NetworkOnly => {
                self.count(false);
                let result = self.fetch_and_store(&request, &identity, ttl).await;
                let _ = tx.send(result.map(FetchResult::network)).await;
            }
            FetchPolicy::NetworkOnlyNoStore => {
                self.count(false);
                let result = self
                    .inner
                    .transport
                    .execute(&request)
                    .await
                    .map_err(CacheError::Transport);
                let _ = tx.send(result.map(FetchResult::network)).await;
            }
            FetchPolicy::CacheAndNetwork => {
                // Cache emission first, staleness ignored; its success is
                // independent of the network leg below.
                let cache_emitted = match self.materialize_any(&identity).await {
                    Ok(data) => {
                        let _ = tx.send(Ok(FetchResult::cache(data))).await;
                        true
                    }
                    Err(err) if err.is_miss() => false,
                    Err(err) => {
                        let _ = tx.send(Err(err)).await;
                        return;
                    }
                };
                self.count(cache_emitted);
                let result = self.fetch_and_store(&request, &identity, ttl).await;
                let _ = tx.send(result.map(FetchResult::network)).await;
            }
        }
    }

    /// Execute a mutation and merge its result into the shared store.
    ///
    /// Every normalized query referencing a touched key observes the new
    /// values on its next materialization. Opaque query records are not
    /// updated and must be refetched by the caller.
    pub async fn mutate(&self, request: OperationRequest) -> CacheResult<MutationOutcome> {
        let tree = self
            .inner
            .transport
            .execute(&request)
            .await
            .map_err(CacheError::Transport)?;
        let mut state = self.inner.state.write().await;
        let touched = mutation::apply_mutation(
            &tree,
            &self.inner.resolver,
            &self.inner.config,
            request.scope.clone(),
            &mut state.objects,
        )?;
        Ok(MutationOutcome {
            data: tree,
            touched,
        })
    }

    /// Materialize the record regardless of staleness.
    async fn materialize_any(&self, identity: &QueryIdentity) -> CacheResult<Value> {
        let state = self.inner.state.read().await;
        state.records.materialize(identity, &state.objects)
    }

    /// Materialize only when a record exists and is fresh; stale records
    /// report as misses.
    async fn materialize_fresh(&self, identity: &QueryIdentity) -> CacheResult<Value> {
        let state = self.inner.state.read().await;
        match state.records.is_stale(identity, Utc::now()) {
            Some(false) => state.records.materialize(identity, &state.objects),
            _ => Err(CacheError::Miss {
                operation: identity.operation().to_string(),
            }),
        }
    }

    /// Network fetch, normalize, merge and record as one transaction, then
    /// materialize the freshly-recorded value under the same lock.
    ///
    /// A transport success is never turned into a fetch failure by
    /// cache-side corruption: a rejected write is logged and the decoded
    /// payload is delivered unstored, as under no-store fetches.
    async fn fetch_and_store(
        &self,
        request: &OperationRequest,
        identity: &QueryIdentity,
        ttl: Ttl,
    ) -> CacheResult<Value> {
        let tree = self
            .inner
            .transport
            .execute(request)
            .await
            .map_err(CacheError::Transport)?;
        let normalized = Normalizer::new(
            &self.inner.resolver,
            &self.inner.config.type_field,
            request.scope.clone(),
        )
        .normalize(&tree)?;

        let mut state = self.inner.state.write().await;
        let stored = match state
            .objects
            .merge_all(normalized.pending, self.inner.config.merge_conflict_policy)
        {
            Ok(_) => state.records.record(
                identity.clone(),
                normalized.root.into(),
                ttl,
                request.scope.clone(),
                Utc::now(),
            ),
            Err(error) => Err(error),
        };
        if let Err(error) = stored {
            tracing::error!(identity = %identity, %error,
                "response rejected by cache, delivering unstored payload");
            return Ok(tree);
        }
        state.records.materialize(identity, &state.objects)
    }

    fn count(&self, hit: bool) {
        if hit {
            self.inner.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.inner.misses.fetch_add(1, Ordering::Relaxed);
        }
    }

    // ------------------------------------------------------------------
    // Cache manager boundary
    // ------------------------------------------------------------------

    /// Remove everything. Atomic with respect to readers: waits for any
    /// in-progress merge, then applies in one step. Required before a
    /// session/identity change.
    pub async fn clear_all(&self) {
        let mut state = self.inner.state.write().await;
        let objects = state.objects.clear();
        let records = state.records.clear();
        tracing::info!(objects, records, "cache cleared");
    }

    /// Remove every object and query record carrying the given scope tag.
    /// Returns the number of entries removed. Records left with dangling
    /// references materialize as partial misses afterwards.
    pub async fn clear_scope(&self, scope: &ScopeTag) -> u64 {
        let mut state = self.inner.state.write().await;
        let removed = state.objects.delete_scope(scope) + state.records.delete_scope(scope);
        tracing::info!(scope = %scope, removed, "scope cleared");
        removed
    }

    /// Remove a single object. Returns whether it existed.
    pub async fn clear_one(&self, key: &CacheKey) -> bool {
        let mut state = self.inner.state.write().await;
        state.objects.delete(key)
    }

    /// Remove a single query record. Returns whether it existed.
    pub async fn clear_query(&self, identity: &QueryIdentity) -> bool {
        let mut state = self.inner.state.write().await;
        state.records.remove(identity)
    }

    /// Debug introspection: counts only, no field contents.
    pub async fn stats(&self) -> CacheStats {
        let state = self.inner.state.read().await;
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            object_count: state.objects.len() as u64,
            query_count: state.records.len() as u64,
            stale_query_count: state.records.stale_count(Utc::now()),
        }
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("resolver", &self.inner.resolver)
            .finish_non_exhaustive()
    }
}
