//! Composition root: the request pipeline wired together.
//!
//! Built once at startup and threaded through the HTTP layer; owns the
//! inbound backpressure semaphore and the request counters. No component
//! reads global state.


use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{info, instrument};

use crate::cache::{CacheMetricsSnapshot, KvBackend, ResultCache};
use crate::error::SearchError;
use crate::graph::GraphBackend;
use crate::hashing::hash_to_u64;
use crate::query::{PreparedQuery, QueryPreparer, SearchRequest};
use crate::search::{RetrievalEngine, SearchResults};

/// Request-level counters, lock-free.
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    requests: AtomicU64,
    rejected: AtomicU64,
    failed: AtomicU64,
    degraded: AtomicU64,
}

/// Point-in-time export of [`ServiceMetrics`].
#[derive(Debug, Clone, Serialize)]
pub struct ServiceMetricsSnapshot {
    pub requests: u64,
    pub rejected: u64,
    pub failed: u64,
    pub degraded: u64,
}

/// Everything the metrics endpoint exposes.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub service: ServiceMetricsSnapshot,
    pub result_cache: CacheMetricsSnapshot,
    pub embedding_cache: CacheMetricsSnapshot,
}

/// Liveness summary for the health endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthStatus {
    pub database_ok: bool,
    pub cache_ok: bool,
}

impl HealthStatus {
    /// Whether the deployment is fully serviceable.
    pub fn is_healthy(&self) -> bool {
        self.database_ok && self.cache_ok
    }
}

/// One completed search, with its provenance.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Shared, immutable fused results.
    pub results: Arc<SearchResults>,
    /// Served from the result cache rather than computed.
    pub cache_hit: bool,
    /// Telemetry labels of degraded methods/rerankers; empty when clean.
    pub failed_methods: Vec<String>,
    /// Wall-clock time spent inside the service.
    pub latency_ms: f64,
}

/// The search core: preparer, cache tier, retrieval engine, plus accounting.
pub struct SearchService<G: GraphBackend, K: KvBackend> {
    preparer: QueryPreparer,
    cache: ResultCache<K>,
    engine: RetrievalEngine<G>,
    inbound: Semaphore,
    metrics: ServiceMetrics,
}

impl<G: GraphBackend, K: KvBackend> std::fmt::Debug for SearchService<G, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("preparer", &self.preparer)
            .field("cache", &self.cache)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl<G: GraphBackend, K: KvBackend> SearchService<G, K> {
    /// Wires the pipeline. `max_concurrent_requests` is the inbound cap;
    /// requests over it are rejected, never queued.
    pub fn new(
        preparer: QueryPreparer,
        cache: ResultCache<K>,
        engine: RetrievalEngine<G>,
        max_concurrent_requests: usize,
    ) -> Self {
        Self {
            preparer,
            cache,
            engine,
            inbound: Semaphore::new(max_concurrent_requests),
            metrics: ServiceMetrics::default(),
        }
    }

    /// Runs one search through the full pipeline.
    #[instrument(skip(self, request), fields(query_len = request.query.len()))]
    pub async fn search(&self, request: SearchRequest) -> Result<SearchOutcome, SearchError> {
        let started = Instant::now();

        let _permit = self.inbound.try_acquire().map_err(|_| {
            self.metrics.rejected.fetch_add(1, Ordering::Relaxed);
            SearchError::ResourceExhausted("concurrent request cap reached".to_string())
        })?;
        self.metrics.requests.fetch_add(1, Ordering::Relaxed);

        let result = self.search_inner(request, started).await;
        if result.is_err() {
            self.metrics.failed.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    async fn search_inner(
        &self,
        request: SearchRequest,
        started: Instant,
    ) -> Result<SearchOutcome, SearchError> {
        let mut prepared = self.preparer.validate(request)?;

        if prepared.config.limit == 0 {
            return Ok(SearchOutcome {
                results: Arc::new(SearchResults::default()),
                cache_hit: false,
                failed_methods: Vec::new(),
                latency_ms: elapsed_ms(started),
            });
        }

        let groups = prepared.filter.sorted_group_ids();
        let params = cache_params(&prepared);

        if let Some(results) = self.cache.get(&prepared.text, &groups, &params).await {
            return Ok(SearchOutcome {
                results,
                cache_hit: true,
                failed_methods: Vec::new(),
                latency_ms: elapsed_ms(started),
            });
        }

        self.preparer.resolve_embedding(&mut prepared).await?;
        let outcome = self.engine.run(&prepared).await?;
        let results = Arc::new(outcome.results);

        if outcome.failed_methods.is_empty() {
            self.cache
                .set(&prepared.text, &groups, &params, Arc::clone(&results), None)
                .await;
        } else {
            // A degraded result must not be served for a full TTL.
            self.metrics.degraded.fetch_add(1, Ordering::Relaxed);
        }

        Ok(SearchOutcome {
            results,
            cache_hit: false,
            failed_methods: outcome.failed_methods,
            latency_ms: elapsed_ms(started),
        })
    }

    /// Drops every cached result scoped to `group_id`; idempotent.
    pub async fn invalidate_group(&self, group_id: &str) -> u64 {
        let removed = self.cache.invalidate_group(group_id).await;
        info!(group_id, removed, "group invalidation complete");
        removed
    }

    /// Drops the whole result cache.
    pub async fn flush_cache(&self) -> u64 {
        self.preparer.embedding_cache().clear();
        self.cache.flush().await
    }

    /// Probes the graph store and the shared cache tier.
    pub async fn health(&self) -> HealthStatus {
        let database_ok = self.engine.graph().ping().await.is_ok();
        let cache_ok = self.cache.l2_healthy().await;
        HealthStatus {
            database_ok,
            cache_ok,
        }
    }

    /// Counters for the metrics endpoint.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            service: ServiceMetricsSnapshot {
                requests: self.metrics.requests.load(Ordering::Relaxed),
                rejected: self.metrics.rejected.load(Ordering::Relaxed),
                failed: self.metrics.failed.load(Ordering::Relaxed),
                degraded: self.metrics.degraded.load(Ordering::Relaxed),
            },
            result_cache: self.cache.metrics().snapshot(),
            embedding_cache: self.preparer.embedding_cache().metrics().snapshot(),
        }
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1_000.0
}

/// Canonicalizable parameter bag for the cache key: the full config, the
/// filter, and a fingerprint of any caller-supplied vector (two callers
/// sending different vectors for the same text must not share an entry).
/// Vectors the core computed itself are deterministic per text and stay
/// out of the key, so cache hits skip embedding acquisition entirely.
fn cache_params(prepared: &PreparedQuery) -> serde_json::Value {
    let vector_fingerprint = prepared
        .caller_supplied_vector
        .then(|| prepared.query_vector.as_ref())
        .flatten()
        .map(|v| {
            let bytes: Vec<u8> = v.iter().flat_map(|f| f.to_le_bytes()).collect();
            format!("{:016x}", hash_to_u64(&bytes))
        });

    serde_json::json!({
        "config": prepared.config,
        "filter": prepared.filter,
        "vector": vector_fingerprint,
    })
}
