//! Tiered result cache: L1 in-process + L2 shared KV.
//!
//! Consulted in order; an L2 hit populates L1 before returning. L2 payloads
//! are MessagePack with named fields; entries that fail to decode are
//! discarded on read. The tier never fails a request: every KV error
//! degrades to the slower path and bumps a counter.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use super::error::KvError;
use super::key::{flush_pattern, group_pattern, result_cache_key};
use super::l1::L1ResultCache;
use super::l2::KvBackend;
use super::metrics::CacheMetrics;
use crate::constants::{DEFAULT_L1_RESULT_CAPACITY, DEFAULT_RESULT_TTL_SECS};
use crate::search::SearchResults;

/// Tunables for the tiered cache.
#[derive(Debug, Clone)]
pub struct ResultCacheConfig {
    /// Incremented to invalidate every entry after an incompatible change.
    pub version: u32,
    /// Key prefix shared by every entry.
    pub prefix: String,
    /// Default TTL applied when `set` is called without one.
    pub default_ttl: Duration,
    /// L1 entry bound.
    pub l1_capacity: u64,
}

impl Default for ResultCacheConfig {
    fn default() -> Self {
        Self {
            version: 1,
            prefix: crate::config::DEFAULT_CACHE_PREFIX.to_string(),
            default_ttl: Duration::from_secs(DEFAULT_RESULT_TTL_SECS),
            l1_capacity: DEFAULT_L1_RESULT_CAPACITY,
        }
    }
}

/// Two-tier memoization of fully fused search results.
pub struct ResultCache<K: KvBackend> {
    l1: L1ResultCache,
    kv: Option<K>,
    config: ResultCacheConfig,
    metrics: Arc<CacheMetrics>,
}

impl<K: KvBackend> std::fmt::Debug for ResultCache<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("l1", &self.l1)
            .field("l2_enabled", &self.kv.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl<K: KvBackend> ResultCache<K> {
    /// Builds the tier. `kv = None` runs L1-only.
    pub fn new(kv: Option<K>, config: ResultCacheConfig) -> Self {
        Self {
            l1: L1ResultCache::with_capacity(config.l1_capacity),
            kv,
            config,
            metrics: Arc::new(CacheMetrics::default()),
        }
    }

    /// Counters for the metrics endpoint.
    pub fn metrics(&self) -> &Arc<CacheMetrics> {
        &self.metrics
    }

    /// Whether the shared tier is configured.
    pub fn has_l2(&self) -> bool {
        self.kv.is_some()
    }

    /// Number of live L1 entries.
    pub fn l1_len(&self) -> u64 {
        self.l1.run_pending_tasks();
        self.l1.len()
    }

    /// Derives the key for a request; exposed so tests can assert layout.
    pub fn key_for(
        &self,
        query: &str,
        group_ids: &[String],
        params: &serde_json::Value,
    ) -> String {
        result_cache_key(
            &self.config.prefix,
            self.config.version,
            query,
            group_ids,
            params,
        )
    }

    /// Cached results for a prepared request, or `None`.
    #[instrument(skip(self, query, params), fields(query_len = query.len()))]
    pub async fn get(
        &self,
        query: &str,
        group_ids: &[String],
        params: &serde_json::Value,
    ) -> Option<Arc<SearchResults>> {
        let started = Instant::now();
        let key = self.key_for(query, group_ids, params);

        if let Some(results) = self.l1.lookup(&key) {
            self.metrics.record_l1_hit();
            self.metrics
                .record_hit_latency(started.elapsed().as_micros() as u64);
            debug!("result cache L1 hit");
            return Some(results);
        }

        let Some(kv) = self.kv.as_ref() else {
            self.metrics.record_miss();
            return None;
        };
        match kv.get(&key).await {
            Ok(Some(bytes)) => match decode(&bytes) {
                Ok(results) => {
                    let results = Arc::new(results);
                    self.l1
                        .insert(&key, Arc::clone(&results), self.config.default_ttl);
                    self.metrics.record_l2_hit();
                    self.metrics
                        .record_hit_latency(started.elapsed().as_micros() as u64);
                    debug!("result cache L2 hit");
                    Some(results)
                }
                Err(e) => {
                    // Format drift: drop the entry rather than serve garbage.
                    warn!(error = %e, "discarding corrupt L2 entry");
                    self.metrics.record_error();
                    let _ = kv.delete(&key).await;
                    self.metrics.record_miss();
                    None
                }
            },
            Ok(None) => {
                self.metrics.record_miss();
                None
            }
            Err(e) => {
                warn!(error = %e, "L2 read failed, degrading to L1-only");
                self.metrics.record_error();
                self.metrics.record_miss();
                None
            }
        }
    }

    /// Stores results in both tiers. KV failures are logged, never raised.
    #[instrument(skip_all, fields(query_len = query.len()))]
    pub async fn set(
        &self,
        query: &str,
        group_ids: &[String],
        params: &serde_json::Value,
        results: Arc<SearchResults>,
        ttl: Option<Duration>,
    ) {
        let started = Instant::now();
        let ttl = ttl.unwrap_or(self.config.default_ttl);
        let key = self.key_for(query, group_ids, params);

        self.l1.insert(&key, Arc::clone(&results), ttl);

        if let Some(kv) = self.kv.as_ref() {
            match encode(&results) {
                Ok(bytes) => {
                    if let Err(e) = kv.set_ex(&key, bytes, ttl).await {
                        warn!(error = %e, "L2 write failed");
                        self.metrics.record_error();
                    }
                }
                Err(e) => {
                    warn!(error = %e, "result payload not serializable");
                    self.metrics.record_error();
                }
            }
        }

        self.metrics
            .record_populate_latency(started.elapsed().as_micros() as u64);
    }

    /// Removes every entry scoped to `group_id`; returns the L2 key count
    /// removed. L1 is cleared wholesale: its keys are opaque hashes.
    #[instrument(skip(self))]
    pub async fn invalidate_group(&self, group_id: &str) -> u64 {
        self.l1.clear();
        match self.kv.as_ref() {
            Some(kv) => {
                let pattern = group_pattern(&self.config.prefix, group_id);
                self.delete_pattern(kv, &pattern).await
            }
            None => 0,
        }
    }

    /// Drops every entry in both tiers; returns the L2 key count removed.
    #[instrument(skip(self))]
    pub async fn flush(&self) -> u64 {
        self.l1.clear();
        match self.kv.as_ref() {
            Some(kv) => {
                let pattern = flush_pattern(&self.config.prefix);
                self.delete_pattern(kv, &pattern).await
            }
            None => 0,
        }
    }

    /// Liveness of the shared tier; `true` when running L1-only.
    pub async fn l2_healthy(&self) -> bool {
        match self.kv.as_ref() {
            Some(kv) => kv.ping().await.is_ok(),
            None => true,
        }
    }

    async fn delete_pattern(&self, kv: &K, pattern: &str) -> u64 {
        match kv.delete_matching(pattern).await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, pattern, "L2 invalidation failed");
                self.metrics.record_error();
                0
            }
        }
    }
}

fn encode(results: &SearchResults) -> Result<Vec<u8>, KvError> {
    rmp_serde::to_vec_named(results).map_err(|e| KvError::Corrupt {
        message: e.to_string(),
    })
}

fn decode(bytes: &[u8]) -> Result<SearchResults, KvError> {
    rmp_serde::from_slice(bytes).map_err(|e| KvError::Corrupt {
        message: e.to_string(),
    })
}
