//! Fetch policies and the multi-emission result stream.
//!
//! `cache-and-network` delivers two results over time (cache first, network
//! second), so every fetch returns a [`FetchStream`] rather than a single
//! value. The other policies yield exactly one emission. The stream is
//! backed by a bounded channel whose sender lives in a spawned task: a
//! caller dropping the stream cancels only its own pending results, never a
//! store merge already in progress.

use coalesce_core::{CacheError, CacheResult};
use serde_json::Value;
use tokio::sync::mpsc;

/// How a fetch call interacts with the cache and the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchPolicy {
    /// Serve from cache when fresh; otherwise fetch, merge, record.
    CacheFirst,
    /// Always fetch, merge and record; staleness is irrelevant.
    NetworkOnly,
    /// Emit the cached value immediately when a record exists (even stale),
    /// then always fetch and emit the network result as well.
    CacheAndNetwork,
    /// Serve from cache or fail; never touches the transport.
    CacheOnly,
    /// Fetch and return directly without writing the shared store.
    NetworkOnlyNoStore,
}

impl FetchPolicy {
    /// Whether the policy can ever call the transport.
    pub fn may_use_network(&self) -> bool {
        !matches!(self, Self::CacheOnly)
    }

    /// Whether a network response is normalized into the shared store.
    pub fn writes_store(&self) -> bool {
        !matches!(self, Self::CacheOnly | Self::NetworkOnlyNoStore)
    }
}

/// Where one emission came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultSource {
    Cache,
    Network,
}

/// One fetch emission: a materialized (or raw, for no-store fetches) result
/// value, tagged with its origin.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResult {
    pub source: ResultSource,
    pub data: Value,
}

impl FetchResult {
    pub(crate) fn cache(data: Value) -> Self {
        Self {
            source: ResultSource::Cache,
            data,
        }
    }

    pub(crate) fn network(data: Value) -> Self {
        Self {
            source: ResultSource::Network,
            data,
        }
    }
}

/// Stream of fetch emissions.
///
/// Yields one result for most policies, up to two for
/// [`FetchPolicy::CacheAndNetwork`], then `None`. Dropping the stream
/// abandons undelivered emissions without affecting store writes.
pub struct FetchStream {
    rx: mpsc::Receiver<CacheResult<FetchResult>>,
}

impl FetchStream {
    /// Create a stream and its sending half. Capacity 2 covers the maximum
    /// emission count, so the producer task never blocks on a slow caller.
    pub(crate) fn channel() -> (mpsc::Sender<CacheResult<FetchResult>>, Self) {
        let (tx, rx) = mpsc::channel(2);
        (tx, Self { rx })
    }

    /// Await the next emission. `None` once the fetch has completed.
    pub async fn next(&mut self) -> Option<CacheResult<FetchResult>> {
        self.rx.recv().await
    }

    /// Drain the stream and return its final emission.
    ///
    /// For `cache-and-network` this is the network result; for every other
    /// policy it is the only result.
    pub async fn final_result(mut self) -> CacheResult<FetchResult> {
        let mut last = None;
        while let Some(result) = self.rx.recv().await {
            last = Some(result);
        }
        last.unwrap_or_else(|| {
            Err(CacheError::Transport(
                "fetch ended without emitting a result".to_string(),
            ))
        })
    }
}

impl std::fmt::Debug for FetchStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchStream").finish_non_exhaustive()
    }
}
