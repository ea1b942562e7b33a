//! Per-process embedding cache with single-flight population.
//!
//! Embeddings are deterministic and expensive, so they cache aggressively:
//! L1-only, keyed by the SHA-256 of the normalized query text. N concurrent
//! requests for the same text issue at most one upstream call; every waiter
//! receives the same immutable `Arc`d vector. In-flight entries are removed
//! on completion, success or failure.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::sync::Cache;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

use super::EmbeddingProvider;
use super::error::EmbeddingError;
use crate::cache::metrics::CacheMetrics;
use crate::constants::{DEFAULT_EMBEDDING_TTL_SECS, DEFAULT_L1_EMBEDDING_CAPACITY};
use crate::hashing::hash_text;

type Key = [u8; 32];
type Flight = Arc<OnceCell<Arc<Vec<f32>>>>;

#[derive(Clone)]
struct CachedVector {
    vector: Arc<Vec<f32>>,
    expires_at: Instant,
}

/// Bounded LRU of query embeddings plus the single-flight map guarding
/// upstream calls.
pub struct EmbeddingCache {
    entries: Cache<Key, CachedVector>,
    inflight: Mutex<HashMap<Key, Flight>>,
    ttl: Duration,
    metrics: Arc<CacheMetrics>,
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingCache")
            .field("entries", &self.entries.entry_count())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl EmbeddingCache {
    /// Creates a cache with default capacity and TTL.
    pub fn new() -> Self {
        Self::with_settings(
            DEFAULT_L1_EMBEDDING_CAPACITY,
            Duration::from_secs(DEFAULT_EMBEDDING_TTL_SECS),
        )
    }

    /// Creates a cache with explicit capacity and per-entry TTL.
    pub fn with_settings(capacity: u64, ttl: Duration) -> Self {
        Self {
            entries: Cache::builder().max_capacity(capacity).build(),
            inflight: Mutex::new(HashMap::new()),
            ttl,
            metrics: Arc::new(CacheMetrics::default()),
        }
    }

    /// Counters for the metrics endpoint.
    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    /// Number of live entries.
    pub fn len(&self) -> u64 {
        self.entries.entry_count()
    }

    /// Returns `true` when no entries are cached.
    pub fn is_empty(&self) -> bool {
        self.entries.entry_count() == 0
    }

    /// Drops every cached vector.
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    fn lookup(&self, key: &Key) -> Option<Arc<Vec<f32>>> {
        let cached = self.entries.get(key)?;
        if cached.expires_at <= Instant::now() {
            // Expired entries are removed on access.
            self.entries.invalidate(key);
            self.metrics.record_eviction();
            return None;
        }
        Some(cached.vector)
    }

    fn store(&self, key: Key, vector: Arc<Vec<f32>>) {
        self.entries.insert(
            key,
            CachedVector {
                vector,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Returns the cached embedding for `text`, or computes it through
    /// `provider` under a single-flight guard.
    #[instrument(skip(self, text, provider), fields(text_len = text.len()))]
    pub async fn get_or_compute(
        &self,
        text: &str,
        provider: &dyn EmbeddingProvider,
    ) -> Result<Arc<Vec<f32>>, EmbeddingError> {
        let key = hash_text(text);

        if let Some(vector) = self.lookup(&key) {
            self.metrics.record_l1_hit();
            debug!("embedding cache hit");
            return Ok(vector);
        }

        let flight: Flight = {
            let mut inflight = self.inflight.lock();
            Arc::clone(inflight.entry(key).or_default())
        };

        let result = flight
            .get_or_try_init(|| async {
                self.metrics.record_miss();
                let started = Instant::now();
                let vector = provider.embed(text).await.map(Arc::new)?;
                self.metrics
                    .record_populate_latency(started.elapsed().as_micros() as u64);
                self.store(key, Arc::clone(&vector));
                Ok::<_, EmbeddingError>(vector)
            })
            .await
            .map(Arc::clone);

        {
            let mut inflight = self.inflight.lock();
            inflight.remove(&key);
        }

        if result.is_err() {
            self.metrics.record_error();
        }
        result
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new()
    }
}
