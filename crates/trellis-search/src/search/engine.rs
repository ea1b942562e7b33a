//! Parallel retrieval and fusion.
//!
//! Enabled methods fan out as concurrent tasks, each under its own
//! deadline and bounded by a per-request semaphore so one burst cannot
//! drain the connection pool. A method failure degrades the response;
//! only a kind whose every method failed escalates, and the request then
//! fails with the most severe collected error.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::config::{KindConfig, RerankerKind, SearchMethod};
use super::fusion::{
    FactDeduper, MmrReranker, NodeDistanceReranker, Reranker, RrfReranker, candidates_from,
};
use super::methods::{MethodFailure, RankedItem, RankedList};
use super::results::{Scored, SearchResults, UuidKeyed, sort_scored};
use crate::constants::{DEFAULT_METHOD_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::error::{ErrorKind, SearchError};
use crate::graph::{GraphBackend, GraphResult};
use crate::model::{Edge, EntityKind};
use crate::query::PreparedQuery;

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deadline for one retrieval method.
    pub method_timeout: Duration,
    /// Aggregate deadline for the whole fan-out.
    pub request_timeout: Duration,
    /// Concurrent method tasks per request.
    pub max_concurrent_methods: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            method_timeout: Duration::from_secs(DEFAULT_METHOD_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_concurrent_methods: 8,
        }
    }
}

/// Fused results plus the telemetry trail of what degraded.
#[derive(Debug, Clone)]
pub struct EngineOutcome {
    pub results: SearchResults,
    /// Labels of failed methods and degraded rerankers,
    /// e.g. `node.similarity` or `edge.mmr_rerank`.
    pub failed_methods: Vec<String>,
}

impl EngineOutcome {
    /// Whether anything along the way failed.
    pub fn is_degraded(&self) -> bool {
        !self.failed_methods.is_empty()
    }
}

/// What one kind's fan-out produced.
struct Harvest<T> {
    rankings: Vec<RankedList>,
    records: HashMap<Uuid, T>,
    failures: Vec<MethodFailure>,
    attempted: usize,
}

impl<T> Default for Harvest<T> {
    fn default() -> Self {
        Self {
            rankings: Vec::new(),
            records: HashMap::new(),
            failures: Vec::new(),
            attempted: 0,
        }
    }
}

impl<T> Harvest<T> {
    /// Every attempted method failed; the kind cannot contribute.
    fn all_failed(&self) -> bool {
        self.attempted > 0 && self.rankings.is_empty() && !self.failures.is_empty()
    }

    fn candidate_uuids(&self) -> Vec<Uuid> {
        self.records.keys().copied().collect()
    }
}

fn depth_score(depth: u32) -> f64 {
    1.0 / (1.0 + depth as f64)
}

fn fetch_limit(limit: usize) -> usize {
    // Headroom so fusion has more than one method's worth to rank.
    limit.max(1) * 2
}

/// Parallel retrieval against the graph adapter, then fusion.
pub struct RetrievalEngine<G: GraphBackend> {
    graph: Arc<G>,
    config: EngineConfig,
}

impl<G: GraphBackend> std::fmt::Debug for RetrievalEngine<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<G: GraphBackend> RetrievalEngine<G> {
    pub fn new(graph: Arc<G>, config: EngineConfig) -> Self {
        Self { graph, config }
    }

    pub fn graph(&self) -> &Arc<G> {
        &self.graph
    }

    /// Runs every enabled method and fuses the outcome.
    #[instrument(skip(self, prepared), fields(query_len = prepared.text.len()))]
    pub async fn run(&self, prepared: &PreparedQuery) -> Result<EngineOutcome, SearchError> {
        if prepared.config.limit == 0 {
            return Ok(EngineOutcome {
                results: SearchResults::default(),
                failed_methods: Vec::new(),
            });
        }

        let deadline = Instant::now() + self.config.request_timeout;
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_methods));

        let (edges, nodes, episodes, communities) = tokio::join!(
            self.harvest_edges(prepared, &semaphore, deadline),
            self.harvest_nodes(prepared, &semaphore, deadline),
            self.harvest_episodes(prepared, &semaphore, deadline),
            self.harvest_communities(prepared, &semaphore, deadline),
        );

        // A kind whose every enabled method failed sinks the request with
        // the most severe collected error.
        let mut fatal: Option<MethodFailure> = None;
        {
            let mut consider = |all_failed: bool, failures: &[MethodFailure]| {
                if !all_failed {
                    return;
                }
                for failure in failures {
                    let worse = fatal
                        .as_ref()
                        .is_none_or(|f| failure.error.severity() > f.error.severity());
                    if worse {
                        fatal = Some(failure.clone());
                    }
                }
            };
            consider(edges.all_failed(), &edges.failures);
            consider(nodes.all_failed(), &nodes.failures);
            consider(episodes.all_failed(), &episodes.failures);
            consider(communities.all_failed(), &communities.failures);
        }
        if let Some(failure) = fatal {
            return Err(SearchError::from_kind(
                failure.error,
                format!("{}: {}", failure.label(), failure.message),
            ));
        }

        let mut failed_methods: Vec<String> = edges
            .failures
            .iter()
            .chain(&nodes.failures)
            .chain(&episodes.failures)
            .chain(&communities.failures)
            .map(MethodFailure::label)
            .collect();

        let edge_list = self
            .fuse_kind(EntityKind::Edge, edges, prepared, &mut failed_methods)
            .await;
        let node_list = self
            .fuse_kind(EntityKind::Node, nodes, prepared, &mut failed_methods)
            .await;
        let episode_list = self
            .fuse_kind(EntityKind::Episode, episodes, prepared, &mut failed_methods)
            .await;
        let community_list = self
            .fuse_kind(EntityKind::Community, communities, prepared, &mut failed_methods)
            .await;

        let limit = prepared.config.limit;
        let min_score = prepared.config.reranker_min_score;

        let mut edge_scored = finish(edge_list, min_score, limit * 2);
        dedup_edges(&mut edge_scored);
        edge_scored.truncate(limit);

        let results = SearchResults {
            edges: edge_scored,
            nodes: finish(node_list, min_score, limit),
            episodes: finish(episode_list, min_score, limit),
            communities: finish(community_list, min_score, limit),
        };

        debug!(
            edges = results.edges.len(),
            nodes = results.nodes.len(),
            episodes = results.episodes.len(),
            communities = results.communities.len(),
            degraded = !failed_methods.is_empty(),
            "retrieval complete"
        );

        Ok(EngineOutcome {
            results,
            failed_methods,
        })
    }

    /// Applies the configured reranker, fetching auxiliary data (candidate
    /// embeddings, center distances) in one batched call. A failed fetch
    /// degrades to RRF and is recorded.
    async fn fuse_kind<T: UuidKeyed>(
        &self,
        kind: EntityKind,
        harvest: Harvest<T>,
        prepared: &PreparedQuery,
        failed_methods: &mut Vec<String>,
    ) -> (HashMap<Uuid, T>, Vec<(Uuid, f64)>) {
        let candidates = candidates_from(&harvest.rankings);
        if candidates.is_empty() {
            return (harvest.records, Vec::new());
        }

        let cfg = prepared.config.kind_config(kind);
        let uuids = harvest.candidate_uuids();

        let reranker: Box<dyn Reranker + Send + Sync> = match cfg.reranker {
            RerankerKind::Rrf => Box::new(RrfReranker::default()),
            RerankerKind::Mmr => match self.mmr_reranker(kind, cfg, prepared, &uuids).await {
                Some(reranker) => reranker,
                None => {
                    failed_methods.push(format!("{}.mmr_rerank", kind.as_str()));
                    Box::new(RrfReranker::default())
                }
            },
            RerankerKind::NodeDistance => {
                match self.distance_reranker(prepared, &uuids).await {
                    Some(reranker) => reranker,
                    None => {
                        failed_methods.push(format!("{}.node_distance_rerank", kind.as_str()));
                        Box::new(RrfReranker::default())
                    }
                }
            }
        };

        (harvest.records, reranker.rerank(&candidates))
    }

    async fn mmr_reranker(
        &self,
        kind: EntityKind,
        cfg: &KindConfig,
        prepared: &PreparedQuery,
        uuids: &[Uuid],
    ) -> Option<Box<dyn Reranker + Send + Sync>> {
        let query_vector = prepared.query_vector.clone()?;
        let fetched = match kind {
            EntityKind::Node => self.graph.node_embeddings(uuids).await,
            EntityKind::Edge => self.graph.edge_embeddings(uuids).await,
            EntityKind::Community => self.graph.community_embeddings(uuids).await,
            // Episodes carry no embeddings; config validation keeps MMR
            // off them.
            EntityKind::Episode => Ok(HashMap::new()),
        };
        match fetched {
            Ok(embeddings) => Some(Box::new(MmrReranker::new(
                cfg.mmr_lambda,
                query_vector,
                embeddings,
            ))),
            Err(e) => {
                warn!(kind = kind.as_str(), error = %e, "embedding fetch failed, falling back to rrf");
                None
            }
        }
    }

    async fn distance_reranker(
        &self,
        prepared: &PreparedQuery,
        uuids: &[Uuid],
    ) -> Option<Box<dyn Reranker + Send + Sync>> {
        let center = prepared
            .filter
            .center_node_uuid
            .or_else(|| prepared.filter.bfs_origin_node_uuids.first().copied())?;
        match self.graph.distances_from(center, uuids).await {
            Ok(distances) => Some(Box::new(NodeDistanceReranker::new(distances))),
            Err(e) => {
                warn!(error = %e, "distance fetch failed, falling back to rrf");
                None
            }
        }
    }

    async fn harvest_edges(
        &self,
        prepared: &PreparedQuery,
        semaphore: &Arc<Semaphore>,
        deadline: Instant,
    ) -> Harvest<Edge> {
        let cfg = &prepared.config.edge_config;
        if !cfg.enabled {
            return Harvest::default();
        }
        let fetch = fetch_limit(prepared.config.limit);

        let outcomes = join_all(cfg.search_methods.iter().map(|method| async move {
            let scored = match method {
                SearchMethod::Fulltext => {
                    self.timed(EntityKind::Edge, *method, semaphore, deadline, async {
                        self.graph
                            .fulltext_edges(&prepared.text, &prepared.filter, fetch)
                            .await
                    })
                    .await?
                }
                SearchMethod::Similarity => {
                    let vector = query_vector(prepared, EntityKind::Edge, *method)?;
                    self.timed(EntityKind::Edge, *method, semaphore, deadline, async {
                        self.graph
                            .similar_edges(&vector, &prepared.filter, fetch, cfg.sim_min_score)
                            .await
                    })
                    .await?
                }
                SearchMethod::Bfs => {
                    let origins = prepared.filter.bfs_origins();
                    let depth = cfg.bfs_max_depth;
                    self.timed(EntityKind::Edge, *method, semaphore, deadline, async {
                        if origins.is_empty() || depth == 0 {
                            return Ok(Vec::new());
                        }
                        let reached = self
                            .graph
                            .bfs_edges(&origins, depth, &prepared.filter, fetch)
                            .await?;
                        Ok(reached
                            .into_iter()
                            .map(|(edge, d)| (edge, depth_score(d)))
                            .collect())
                    })
                    .await?
                }
            };
            Ok::<_, MethodFailure>((*method, scored))
        }))
        .await;

        let mut harvest = Harvest::default();
        harvest.attempted = outcomes.len();
        for outcome in outcomes {
            match outcome {
                Ok((method, scored)) => {
                    // Records violating the model invariants never leave
                    // the adapter layer.
                    let valid: Vec<(Edge, f64)> = scored
                        .into_iter()
                        .filter(|(e, _)| {
                            let ok = e.temporal_ordering_holds()
                                && e.source_node_uuid != e.target_node_uuid;
                            if !ok {
                                warn!(uuid = %e.uuid, "dropping edge violating invariants");
                            }
                            ok
                        })
                        .collect();
                    harvest.rankings.push(ranked_list(method, &valid, |e| e.uuid));
                    for (edge, _) in valid {
                        harvest.records.insert(edge.uuid, edge);
                    }
                }
                Err(failure) => harvest.failures.push(failure),
            }
        }
        harvest
    }

    async fn harvest_nodes(
        &self,
        prepared: &PreparedQuery,
        semaphore: &Arc<Semaphore>,
        deadline: Instant,
    ) -> Harvest<crate::model::Node> {
        let cfg = &prepared.config.node_config;
        if !cfg.enabled {
            return Harvest::default();
        }
        let fetch = fetch_limit(prepared.config.limit);

        let outcomes = join_all(cfg.search_methods.iter().map(|method| async move {
            let scored = match method {
                SearchMethod::Fulltext => {
                    self.timed(EntityKind::Node, *method, semaphore, deadline, async {
                        self.graph
                            .fulltext_nodes(&prepared.text, &prepared.filter, fetch)
                            .await
                    })
                    .await?
                }
                SearchMethod::Similarity => {
                    let vector = query_vector(prepared, EntityKind::Node, *method)?;
                    self.timed(EntityKind::Node, *method, semaphore, deadline, async {
                        self.graph
                            .similar_nodes(&vector, &prepared.filter, fetch, cfg.sim_min_score)
                            .await
                    })
                    .await?
                }
                SearchMethod::Bfs => {
                    let origins = prepared.filter.bfs_origins();
                    let depth = cfg.bfs_max_depth;
                    self.timed(EntityKind::Node, *method, semaphore, deadline, async {
                        if origins.is_empty() || depth == 0 {
                            return Ok(Vec::new());
                        }
                        let reached = self
                            .graph
                            .bfs_nodes(&origins, depth, &prepared.filter, fetch)
                            .await?;
                        Ok(reached
                            .into_iter()
                            .map(|(node, d)| (node, depth_score(d)))
                            .collect())
                    })
                    .await?
                }
            };
            Ok::<_, MethodFailure>((*method, scored))
        }))
        .await;

        collect_harvest(outcomes, |n| n.uuid)
    }

    async fn harvest_episodes(
        &self,
        prepared: &PreparedQuery,
        semaphore: &Arc<Semaphore>,
        deadline: Instant,
    ) -> Harvest<crate::model::Episode> {
        let cfg = &prepared.config.episode_config;
        if !cfg.enabled {
            return Harvest::default();
        }
        let fetch = fetch_limit(prepared.config.limit);

        let outcomes = join_all(cfg.search_methods.iter().map(|method| async move {
            let scored = self
                .timed(EntityKind::Episode, *method, semaphore, deadline, async {
                    self.graph
                        .fulltext_episodes(&prepared.text, &prepared.filter, fetch)
                        .await
                })
                .await?;
            Ok::<_, MethodFailure>((*method, scored))
        }))
        .await;

        collect_harvest(outcomes, |e| e.uuid)
    }

    async fn harvest_communities(
        &self,
        prepared: &PreparedQuery,
        semaphore: &Arc<Semaphore>,
        deadline: Instant,
    ) -> Harvest<crate::model::Community> {
        let cfg = &prepared.config.community_config;
        if !cfg.enabled {
            return Harvest::default();
        }
        let fetch = fetch_limit(prepared.config.limit);

        let outcomes = join_all(cfg.search_methods.iter().map(|method| async move {
            let scored = match method {
                SearchMethod::Fulltext => {
                    self.timed(EntityKind::Community, *method, semaphore, deadline, async {
                        self.graph
                            .fulltext_communities(&prepared.text, &prepared.filter, fetch)
                            .await
                    })
                    .await?
                }
                SearchMethod::Similarity => {
                    let vector = query_vector(prepared, EntityKind::Community, *method)?;
                    self.timed(EntityKind::Community, *method, semaphore, deadline, async {
                        self.graph
                            .similar_communities(
                                &vector,
                                &prepared.filter,
                                fetch,
                                cfg.sim_min_score,
                            )
                            .await
                    })
                    .await?
                }
                SearchMethod::Bfs => {
                    return Err(MethodFailure {
                        kind: EntityKind::Community,
                        method: *method,
                        error: ErrorKind::InvalidInput,
                        message: "bfs is not supported for communities".to_string(),
                    });
                }
            };
            Ok::<_, MethodFailure>((*method, scored))
        }))
        .await;

        collect_harvest(outcomes, |c| c.uuid)
    }

    /// Bounds one method task by the per-method deadline, the remaining
    /// request budget, and the per-request concurrency cap.
    async fn timed<T>(
        &self,
        kind: EntityKind,
        method: SearchMethod,
        semaphore: &Arc<Semaphore>,
        deadline: Instant,
        fut: impl Future<Output = GraphResult<Vec<(T, f64)>>>,
    ) -> Result<Vec<(T, f64)>, MethodFailure> {
        let _permit =
            semaphore
                .acquire()
                .await
                .map_err(|_| MethodFailure {
                    kind,
                    method,
                    error: ErrorKind::Internal,
                    message: "method semaphore closed".to_string(),
                })?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        let budget = self.config.method_timeout.min(remaining);
        if budget.is_zero() {
            return Err(MethodFailure {
                kind,
                method,
                error: ErrorKind::Unavailable,
                message: "request deadline exhausted before dispatch".to_string(),
            });
        }

        match tokio::time::timeout(budget, fut).await {
            Ok(Ok(scored)) => Ok(scored),
            Ok(Err(e)) => Err(MethodFailure {
                kind,
                method,
                error: e.kind(),
                message: e.to_string(),
            }),
            Err(_) => Err(MethodFailure {
                kind,
                method,
                error: ErrorKind::Unavailable,
                message: format!("timed out after {}ms", budget.as_millis()),
            }),
        }
    }
}

fn query_vector(
    prepared: &PreparedQuery,
    kind: EntityKind,
    method: SearchMethod,
) -> Result<Arc<Vec<f32>>, MethodFailure> {
    prepared.query_vector.clone().ok_or(MethodFailure {
        kind,
        method,
        error: ErrorKind::Internal,
        message: "similarity requested without a query embedding".to_string(),
    })
}

fn ranked_list<T>(method: SearchMethod, scored: &[(T, f64)], uuid_of: impl Fn(&T) -> Uuid) -> RankedList {
    RankedList {
        method,
        items: scored
            .iter()
            .map(|(item, score)| RankedItem {
                uuid: uuid_of(item),
                raw_score: *score,
            })
            .collect(),
    }
}

fn collect_harvest<T>(
    outcomes: Vec<Result<(SearchMethod, Vec<(T, f64)>), MethodFailure>>,
    uuid_of: impl Fn(&T) -> Uuid,
) -> Harvest<T> {
    let mut harvest = Harvest::default();
    harvest.attempted = outcomes.len();
    for outcome in outcomes {
        match outcome {
            Ok((method, scored)) => {
                harvest.rankings.push(ranked_list(method, &scored, &uuid_of));
                for (item, _) in scored {
                    harvest.records.insert(uuid_of(&item), item);
                }
            }
            Err(failure) => harvest.failures.push(failure),
        }
    }
    harvest
}

/// Min-score filter, record join, canonical sort, truncation.
fn finish<T: UuidKeyed>(
    (mut records, fused): (HashMap<Uuid, T>, Vec<(Uuid, f64)>),
    min_score: f64,
    limit: usize,
) -> Vec<Scored<T>> {
    let mut out = Vec::with_capacity(fused.len().min(limit));
    for (uuid, score) in fused {
        if score < min_score {
            continue;
        }
        if let Some(item) = records.remove(&uuid) {
            out.push(Scored { item, score });
        }
    }
    sort_scored(&mut out);
    out.truncate(limit);
    out
}

fn dedup_edges(edges: &mut Vec<Scored<Edge>>) {
    let mut deduper = FactDeduper::new();
    edges.retain(|scored| deduper.accept(&scored.item.fact));
}
