//! Typed search configuration.
//!
//! Defaults are fixed at construction; validation happens once at the edge.
//! Unknown fields and unknown enum values are rejected during
//! deserialization, which is how the legacy flat request schema is turned
//! away.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_RESULT_LIMIT, MAX_BFS_DEPTH, MAX_RESULT_LIMIT};
use crate::error::SearchError;
use crate::model::EntityKind;

/// One retrieval method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    /// Lexical BM25 query against the store's text index.
    Fulltext,
    /// Cosine similarity against the kind's embedding index.
    Similarity,
    /// Breadth-first expansion from anchor nodes.
    Bfs,
}

impl SearchMethod {
    /// Stable lowercase name for telemetry labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMethod::Fulltext => "fulltext",
            SearchMethod::Similarity => "similarity",
            SearchMethod::Bfs => "bfs",
        }
    }
}

/// Fusion strategy applied to a kind's method lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RerankerKind {
    /// Reciprocal rank fusion.
    Rrf,
    /// Maximal marginal relevance.
    Mmr,
    /// Ascending graph distance from a center node.
    NodeDistance,
}

impl RerankerKind {
    /// Stable name for telemetry labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            RerankerKind::Rrf => "rrf",
            RerankerKind::Mmr => "mmr",
            RerankerKind::NodeDistance => "node_distance",
        }
    }
}

/// Per-kind retrieval settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KindConfig {
    /// Include this kind in the response.
    pub enabled: bool,
    /// Methods to run, each as an independent parallel task.
    pub search_methods: Vec<SearchMethod>,
    /// Fusion strategy for this kind.
    pub reranker: RerankerKind,
    /// Hop bound for BFS expansion.
    pub bfs_max_depth: u32,
    /// Cosine floor applied inside the similarity method.
    pub sim_min_score: f64,
    /// MMR relevance/diversity trade-off.
    pub mmr_lambda: f64,
}

impl Default for KindConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            search_methods: vec![SearchMethod::Fulltext, SearchMethod::Similarity],
            reranker: RerankerKind::Rrf,
            bfs_max_depth: 2,
            sim_min_score: 0.0,
            mmr_lambda: 0.5,
        }
    }
}

impl KindConfig {
    /// A disabled kind that contributes nothing.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            search_methods: Vec::new(),
            ..Self::default()
        }
    }
}

/// Full request configuration across kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SearchConfig {
    /// Max results per kind. Zero short-circuits to an empty response.
    pub limit: usize,
    /// Post-rerank combined-score floor.
    pub reranker_min_score: f64,
    pub edge_config: KindConfig,
    pub node_config: KindConfig,
    pub episode_config: KindConfig,
    pub community_config: KindConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_RESULT_LIMIT,
            reranker_min_score: 0.0,
            edge_config: KindConfig::default(),
            node_config: KindConfig::default(),
            episode_config: KindConfig {
                enabled: false,
                search_methods: vec![SearchMethod::Fulltext],
                ..KindConfig::default()
            },
            community_config: KindConfig {
                enabled: false,
                ..KindConfig::default()
            },
        }
    }
}

impl SearchConfig {
    /// The per-kind block for `kind`.
    pub fn kind_config(&self, kind: EntityKind) -> &KindConfig {
        match kind {
            EntityKind::Edge => &self.edge_config,
            EntityKind::Node => &self.node_config,
            EntityKind::Episode => &self.episode_config,
            EntityKind::Community => &self.community_config,
        }
    }

    /// Methods a kind supports: episodes carry no embedding and cannot be
    /// traversed to, communities cannot be traversed to.
    pub fn allowed_methods(kind: EntityKind) -> &'static [SearchMethod] {
        match kind {
            EntityKind::Edge | EntityKind::Node => &[
                SearchMethod::Fulltext,
                SearchMethod::Similarity,
                SearchMethod::Bfs,
            ],
            EntityKind::Episode => &[SearchMethod::Fulltext],
            EntityKind::Community => &[SearchMethod::Fulltext, SearchMethod::Similarity],
        }
    }

    /// Range and combination checks, run once at the edge.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.limit > MAX_RESULT_LIMIT {
            return Err(SearchError::InvalidInput(format!(
                "limit {} exceeds maximum {}",
                self.limit, MAX_RESULT_LIMIT
            )));
        }
        if !(0.0..=f64::MAX).contains(&self.reranker_min_score) {
            return Err(SearchError::InvalidInput(
                "reranker_min_score must be non-negative".to_string(),
            ));
        }

        for kind in [
            EntityKind::Edge,
            EntityKind::Node,
            EntityKind::Episode,
            EntityKind::Community,
        ] {
            let config = self.kind_config(kind);
            if !config.enabled {
                continue;
            }
            if config.bfs_max_depth > MAX_BFS_DEPTH {
                return Err(SearchError::InvalidInput(format!(
                    "{}_config.bfs_max_depth {} exceeds maximum {}",
                    kind.as_str(),
                    config.bfs_max_depth,
                    MAX_BFS_DEPTH
                )));
            }
            if !(0.0..=1.0).contains(&config.sim_min_score) {
                return Err(SearchError::InvalidInput(format!(
                    "{}_config.sim_min_score must be within [0, 1]",
                    kind.as_str()
                )));
            }
            if !(0.0..=1.0).contains(&config.mmr_lambda) {
                return Err(SearchError::InvalidInput(format!(
                    "{}_config.mmr_lambda must be within [0, 1]",
                    kind.as_str()
                )));
            }
            for method in &config.search_methods {
                if !Self::allowed_methods(kind).contains(method) {
                    return Err(SearchError::InvalidInput(format!(
                        "method '{}' is not supported for kind '{}'",
                        method.as_str(),
                        kind.as_str()
                    )));
                }
            }
            if kind == EntityKind::Episode && config.reranker == RerankerKind::Mmr {
                return Err(SearchError::InvalidInput(
                    "mmr reranker is not supported for episodes".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Clamps the per-kind limit to the deployment maximum.
    pub fn clamp_limit(&mut self, max: usize) {
        if self.limit > max {
            self.limit = max;
        }
    }

    /// Whether any enabled kind needs the query embedding (similarity
    /// method or MMR reranker).
    pub fn needs_query_embedding(&self) -> bool {
        [
            &self.edge_config,
            &self.node_config,
            &self.episode_config,
            &self.community_config,
        ]
        .into_iter()
        .filter(|c| c.enabled)
        .any(|c| {
            c.search_methods.contains(&SearchMethod::Similarity)
                || c.reranker == RerankerKind::Mmr
        })
    }

    /// Whether any enabled kind reranks by node distance.
    pub fn needs_center_node(&self) -> bool {
        [
            &self.edge_config,
            &self.node_config,
            &self.episode_config,
            &self.community_config,
        ]
        .into_iter()
        .filter(|c| c.enabled)
        .any(|c| c.reranker == RerankerKind::NodeDistance)
    }

    /// Enabled kinds in response order.
    pub fn enabled_kinds(&self) -> Vec<EntityKind> {
        let mut kinds = Vec::new();
        for kind in [
            EntityKind::Edge,
            EntityKind::Node,
            EntityKind::Episode,
            EntityKind::Community,
        ] {
            if self.kind_config(kind).enabled {
                kinds.push(kind);
            }
        }
        kinds
    }
}
