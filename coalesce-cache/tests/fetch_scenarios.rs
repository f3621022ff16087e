//! End-to-end fetch and mutation scenarios
//!
//! Tests verify:
//! - Shared-entity propagation (one merge updates every referencing query)
//! - Reference lists (collection queries re-materialize mutated members)
//! - Per-operation TTL overriding the default
//! - cache-and-network emitting stale data first, fresh data second
//! - FailAll merge policy aborting a whole response
//! - Scope-tagged teardown leaving other scopes intact

use async_trait::async_trait;
use coalesce_cache::{
    CacheConfig, CacheError, FetchPolicy, OperationRequest, QueryCache, ResolverRegistry,
    ResultSource, ScopeTag, Transport, Ttl,
};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Scripted transport: responses are consumed in order per operation, with
/// the last one sticky.
#[derive(Default)]
struct ScriptedTransport {
    responses: Mutex<HashMap<String, VecDeque<Result<Value, String>>>>,
    calls: AtomicU64,
}

impl ScriptedTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn respond(&self, operation: &str, value: Value) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .entry(operation.to_string())
            .or_default()
            .push_back(Ok(value));
        self
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: &OperationRequest) -> Result<Value, String> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let mut responses = self.responses.lock().unwrap();
        let queue = responses
            .get_mut(&request.operation)
            .ok_or_else(|| format!("no scripted response for {}", request.operation))?;
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().ok_or("response queue empty")?
        }
    }
}

fn banking_resolver() -> ResolverRegistry {
    let mut resolver = ResolverRegistry::new();
    resolver.register_id_field("Account", "id");
    resolver.register_id_field("Transaction", "id");
    resolver
}

fn cache(config: CacheConfig, transport: Arc<ScriptedTransport>) -> QueryCache {
    QueryCache::new(config, banking_resolver(), transport).unwrap()
}

async fn fetch_data(cache: &QueryCache, request: OperationRequest, policy: FetchPolicy) -> Value {
    cache
        .fetch(request, policy, None)
        .final_result()
        .await
        .unwrap()
        .data
}

#[tokio::test]
async fn test_transaction_list_reflects_mutated_member() {
    init_tracing();
    let transport = ScriptedTransport::new();
    transport.respond(
        "GetTransactions",
        json!({
            "account": {
                "__typename": "Account", "id": 1,
                "transactions": [
                    {"__typename": "Transaction", "id": 10, "amount": 100, "status": "pending"},
                    {"__typename": "Transaction", "id": 11, "amount": 250, "status": "settled"}
                ]
            }
        }),
    );
    transport.respond(
        "ConfirmTransaction",
        json!({"confirm": {"__typename": "Transaction", "id": 10, "status": "settled"}}),
    );
    let cache = cache(CacheConfig::default(), transport.clone());

    let list_request = OperationRequest::new("GetTransactions", json!({"accountId": 1}));
    fetch_data(&cache, list_request.clone(), FetchPolicy::CacheFirst).await;

    cache
        .mutate(OperationRequest::new("ConfirmTransaction", json!({"id": 10})))
        .await
        .unwrap();

    // The list query re-materializes through the store without refetching.
    let calls_before = transport.calls();
    let data = fetch_data(&cache, list_request, FetchPolicy::CacheOnly).await;
    assert_eq!(data["account"]["transactions"][0]["status"], json!("settled"));
    assert_eq!(data["account"]["transactions"][0]["amount"], json!(100));
    assert_eq!(data["account"]["transactions"][1]["status"], json!("settled"));
    assert_eq!(transport.calls(), calls_before);
}

#[tokio::test]
async fn test_per_operation_ttl_overrides_default() {
    init_tracing();
    let transport = ScriptedTransport::new();
    transport.respond("GetRates", json!({"rates": {"usd": 1.0}}));
    transport.respond("GetBalance", json!({
        "account": {"__typename": "Account", "id": 1, "balance": 5000}
    }));
    let config = CacheConfig::default().with_operation_ttl("GetRates", Ttl::Never);
    let cache = cache(config, transport.clone());

    let rates = OperationRequest::new("GetRates", json!({}));
    let balance = OperationRequest::new("GetBalance", json!({"accountId": 1}));

    for _ in 0..2 {
        fetch_data(&cache, rates.clone(), FetchPolicy::CacheFirst).await;
        fetch_data(&cache, balance.clone(), FetchPolicy::CacheFirst).await;
    }

    // GetRates is always stale under Ttl::Never; GetBalance keeps the
    // default TTL and is served from cache the second time.
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn test_cache_and_network_emits_stale_then_fresh() {
    init_tracing();
    let transport = ScriptedTransport::new();
    transport
        .respond("GetBalance", json!({
            "account": {"__typename": "Account", "id": 1, "balance": 5000}
        }))
        .respond("GetBalance", json!({
            "account": {"__typename": "Account", "id": 1, "balance": 4000}
        }));
    // Every record is stale the instant it is written.
    let config = CacheConfig::default().with_default_ttl(Ttl::Never);
    let cache = cache(config, transport.clone());

    let request = OperationRequest::new("GetBalance", json!({"accountId": 1}));
    fetch_data(&cache, request.clone(), FetchPolicy::CacheFirst).await;

    // Staleness does not suppress the cache emission, it only means the
    // network leg always runs.
    let mut stream = cache.fetch(request, FetchPolicy::CacheAndNetwork, None);
    let first = stream.next().await.unwrap().unwrap();
    let second = stream.next().await.unwrap().unwrap();

    assert_eq!(first.source, ResultSource::Cache);
    assert_eq!(first.data["account"]["balance"], json!(5000));
    assert_eq!(second.source, ResultSource::Network);
    assert_eq!(second.data["account"]["balance"], json!(4000));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_fail_all_policy_rejects_whole_response_but_delivers_payload() {
    init_tracing();
    let transport = ScriptedTransport::new();
    transport.respond("GetAccount", json!({
        "account": {
            "__typename": "Account", "id": 1,
            "lastTransaction": {"__typename": "Transaction", "id": 10, "amount": 100}
        }
    }));
    // Same field arrives as a plain scalar the second time.
    let summary = json!({
        "account": {"__typename": "Account", "id": 1, "lastTransaction": "txn-10", "balance": 7}
    });
    transport.respond("GetAccountSummary", summary.clone());
    let config =
        CacheConfig::default().with_merge_policy(coalesce_cache::MergeConflictPolicy::FailAll);
    let cache = cache(config, transport.clone());

    fetch_data(
        &cache,
        OperationRequest::new("GetAccount", json!({"id": 1})),
        FetchPolicy::CacheFirst,
    )
    .await;

    // The transport succeeded, so the caller still gets the payload; it
    // just never enters the shared store.
    let result = cache
        .fetch(
            OperationRequest::new("GetAccountSummary", json!({"id": 1})),
            FetchPolicy::CacheFirst,
            None,
        )
        .final_result()
        .await
        .unwrap();
    assert_eq!(result.source, ResultSource::Network);
    assert_eq!(result.data, summary);

    // Nothing from the rejected response landed: the stored account still
    // materializes with its original reference and no balance, and the
    // summary query has no record.
    let data = fetch_data(
        &cache,
        OperationRequest::new("GetAccount", json!({"id": 1})),
        FetchPolicy::CacheOnly,
    )
    .await;
    assert_eq!(data["account"]["lastTransaction"]["amount"], json!(100));
    assert_eq!(data["account"].get("balance"), None);

    let missing = cache
        .fetch(
            OperationRequest::new("GetAccountSummary", json!({"id": 1})),
            FetchPolicy::CacheOnly,
            None,
        )
        .final_result()
        .await;
    assert!(matches!(missing, Err(CacheError::Miss { .. })));
}

#[tokio::test]
async fn test_scope_teardown_spares_other_scopes() {
    init_tracing();
    let transport = ScriptedTransport::new();
    transport.respond("GetBalance", json!({
        "account": {"__typename": "Account", "id": 1, "balance": 5000}
    }));
    transport.respond("GetRates", json!({"rates": {"usd": 1.0}}));
    let cache = cache(CacheConfig::default(), transport.clone());

    let session = OperationRequest::new("GetBalance", json!({"accountId": 1}))
        .with_scope(ScopeTag::new("session-a"));
    let shared = OperationRequest::new("GetRates", json!({}));
    fetch_data(&cache, session.clone(), FetchPolicy::CacheFirst).await;
    fetch_data(&cache, shared.clone(), FetchPolicy::CacheFirst).await;

    let removed = cache.clear_scope(&ScopeTag::new("session-a")).await;
    assert!(removed >= 2);

    let gone = cache
        .fetch(session, FetchPolicy::CacheOnly, None)
        .final_result()
        .await;
    assert!(matches!(gone, Err(CacheError::Miss { .. })));

    let kept = fetch_data(&cache, shared, FetchPolicy::CacheOnly).await;
    assert_eq!(kept["rates"]["usd"], json!(1.0));
}
