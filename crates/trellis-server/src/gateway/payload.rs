//! Wire shapes for the search endpoints.
//!
//! Inbound payloads deserialize strictly (unknown fields and enum values
//! are rejected); outbound records render datetimes as RFC 3339 UTC with
//! a trailing `Z` and identifiers as lowercased hyphenated UUIDs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use trellis::graph::records::render_datetime;
use trellis::model::{Community, Edge, Episode, EpisodeSource, Node, SearchFilter};
use trellis::query::SearchRequest;
use trellis::search::config::{KindConfig, RerankerKind, SearchMethod};
use trellis::search::{Scored, SearchConfig, SearchResults};
use trellis::service::SearchOutcome;

/// `POST /search` request body.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchRequestPayload {
    pub query: String,
    #[serde(default)]
    pub config: SearchConfig,
    #[serde(default)]
    pub filters: FiltersPayload,
    #[serde(default)]
    pub center_node_uuid: Option<Uuid>,
    #[serde(default)]
    pub bfs_origin_node_uuids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub query_vector: Option<Vec<f32>>,
}

/// Request-scoped filter set.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FiltersPayload {
    pub group_ids: Vec<String>,
    /// Node-type restriction; `entity_type` is the single-value spelling.
    pub node_labels: Vec<String>,
    pub entity_type: Option<String>,
    pub valid_after: Option<DateTime<Utc>>,
    pub valid_before: Option<DateTime<Utc>>,
    pub include_invalidated: bool,
}

impl SearchRequestPayload {
    /// Lowers the wire shape into the core request.
    pub fn into_request(self) -> SearchRequest {
        let mut node_labels = self.filters.node_labels;
        if let Some(entity_type) = self.filters.entity_type {
            node_labels.push(entity_type);
        }

        SearchRequest {
            query: self.query,
            config: self.config,
            filter: SearchFilter {
                group_ids: self.filters.group_ids,
                node_labels,
                valid_after: self.filters.valid_after,
                valid_before: self.filters.valid_before,
                center_node_uuid: self.center_node_uuid,
                bfs_origin_node_uuids: self.bfs_origin_node_uuids.unwrap_or_default(),
                include_invalidated: self.filters.include_invalidated,
            },
            query_vector: self.query_vector,
        }
    }
}

/// Flattened per-kind config used by `POST /search/edges` and
/// `POST /search/nodes`.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PerKindConfigPayload {
    pub limit: usize,
    pub reranker_min_score: f64,
    pub search_methods: Vec<SearchMethod>,
    pub reranker: RerankerKind,
    pub bfs_max_depth: u32,
    pub sim_min_score: f64,
    pub mmr_lambda: f64,
}

impl Default for PerKindConfigPayload {
    fn default() -> Self {
        let kind = KindConfig::default();
        Self {
            limit: SearchConfig::default().limit,
            reranker_min_score: 0.0,
            search_methods: kind.search_methods,
            reranker: kind.reranker,
            bfs_max_depth: kind.bfs_max_depth,
            sim_min_score: kind.sim_min_score,
            mmr_lambda: kind.mmr_lambda,
        }
    }
}

impl PerKindConfigPayload {
    fn kind_config(&self) -> KindConfig {
        KindConfig {
            enabled: true,
            search_methods: self.search_methods.clone(),
            reranker: self.reranker,
            bfs_max_depth: self.bfs_max_depth,
            sim_min_score: self.sim_min_score,
            mmr_lambda: self.mmr_lambda,
        }
    }

    /// A full config with only the edge kind enabled.
    pub fn to_edge_config(&self) -> SearchConfig {
        SearchConfig {
            limit: self.limit,
            reranker_min_score: self.reranker_min_score,
            edge_config: self.kind_config(),
            node_config: KindConfig::disabled(),
            episode_config: KindConfig::disabled(),
            community_config: KindConfig::disabled(),
        }
    }

    /// A full config with only the node kind enabled.
    pub fn to_node_config(&self) -> SearchConfig {
        SearchConfig {
            limit: self.limit,
            reranker_min_score: self.reranker_min_score,
            node_config: self.kind_config(),
            edge_config: KindConfig::disabled(),
            episode_config: KindConfig::disabled(),
            community_config: KindConfig::disabled(),
        }
    }
}

/// Flattened episode config: episodes retrieve by full-text only, so the
/// subset is smaller.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EpisodeConfigPayload {
    pub limit: usize,
    pub reranker_min_score: f64,
    pub reranker: RerankerKind,
}

impl Default for EpisodeConfigPayload {
    fn default() -> Self {
        Self {
            limit: SearchConfig::default().limit,
            reranker_min_score: 0.0,
            reranker: RerankerKind::Rrf,
        }
    }
}

impl EpisodeConfigPayload {
    /// A full config with only the episode kind enabled.
    pub fn to_episode_config(&self) -> SearchConfig {
        SearchConfig {
            limit: self.limit,
            reranker_min_score: self.reranker_min_score,
            episode_config: KindConfig {
                enabled: true,
                search_methods: vec![SearchMethod::Fulltext],
                reranker: self.reranker,
                ..KindConfig::default()
            },
            edge_config: KindConfig::disabled(),
            node_config: KindConfig::disabled(),
            community_config: KindConfig::disabled(),
        }
    }
}

impl PerKindConfigPayload {
    /// A full config with only the community kind enabled.
    pub fn to_community_config(&self) -> SearchConfig {
        SearchConfig {
            limit: self.limit,
            reranker_min_score: self.reranker_min_score,
            community_config: self.kind_config(),
            edge_config: KindConfig::disabled(),
            node_config: KindConfig::disabled(),
            episode_config: KindConfig::disabled(),
        }
    }
}

/// Episode request body (`/search/episodes`).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EpisodeSearchRequestPayload {
    pub query: String,
    #[serde(default)]
    pub config: EpisodeConfigPayload,
    #[serde(default)]
    pub filters: FiltersPayload,
}

impl EpisodeSearchRequestPayload {
    pub fn into_request(self) -> SearchRequest {
        SearchRequest {
            query: self.query,
            config: self.config.to_episode_config(),
            filter: SearchFilter {
                group_ids: self.filters.group_ids,
                node_labels: Vec::new(),
                valid_after: self.filters.valid_after,
                valid_before: self.filters.valid_before,
                center_node_uuid: None,
                bfs_origin_node_uuids: Vec::new(),
                include_invalidated: self.filters.include_invalidated,
            },
            query_vector: None,
        }
    }
}

/// Per-kind request body (`/search/edges`, `/search/nodes`).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KindSearchRequestPayload {
    pub query: String,
    #[serde(default)]
    pub config: PerKindConfigPayload,
    #[serde(default)]
    pub filters: FiltersPayload,
    #[serde(default)]
    pub center_node_uuid: Option<Uuid>,
    #[serde(default)]
    pub bfs_origin_node_uuids: Option<Vec<Uuid>>,
    #[serde(default)]
    pub query_vector: Option<Vec<f32>>,
}

impl KindSearchRequestPayload {
    pub fn into_request(self, config: SearchConfig) -> SearchRequest {
        let mut node_labels = self.filters.node_labels;
        if let Some(entity_type) = self.filters.entity_type {
            node_labels.push(entity_type);
        }

        SearchRequest {
            query: self.query,
            config,
            filter: SearchFilter {
                group_ids: self.filters.group_ids,
                node_labels,
                valid_after: self.filters.valid_after,
                valid_before: self.filters.valid_before,
                center_node_uuid: self.center_node_uuid,
                bfs_origin_node_uuids: self.bfs_origin_node_uuids.unwrap_or_default(),
                include_invalidated: self.filters.include_invalidated,
            },
            query_vector: self.query_vector,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct NodePayload {
    pub uuid: String,
    pub name: String,
    pub node_type: String,
    pub summary: String,
    pub group_id: String,
    pub created_at: String,
    pub score: f64,
}

impl From<&Scored<Node>> for NodePayload {
    fn from(scored: &Scored<Node>) -> Self {
        let node = &scored.item;
        Self {
            uuid: node.uuid.to_string(),
            name: node.name.clone(),
            node_type: node.node_type().to_string(),
            summary: node.summary.clone(),
            group_id: node.group_id.clone(),
            created_at: render_datetime(&node.created_at),
            score: scored.score,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EdgePayload {
    pub uuid: String,
    pub source_node_uuid: String,
    pub target_node_uuid: String,
    pub name: String,
    pub fact: String,
    pub valid_at: Option<String>,
    pub invalid_at: Option<String>,
    pub created_at: String,
    pub expired_at: Option<String>,
    pub score: f64,
}

impl From<&Scored<Edge>> for EdgePayload {
    fn from(scored: &Scored<Edge>) -> Self {
        let edge = &scored.item;
        Self {
            uuid: edge.uuid.to_string(),
            source_node_uuid: edge.source_node_uuid.to_string(),
            target_node_uuid: edge.target_node_uuid.to_string(),
            name: edge.name.clone(),
            fact: edge.fact.clone(),
            valid_at: edge.valid_at.as_ref().map(render_datetime),
            invalid_at: edge.invalid_at.as_ref().map(render_datetime),
            created_at: render_datetime(&edge.created_at),
            expired_at: edge.expired_at.as_ref().map(render_datetime),
            score: scored.score,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EpisodePayload {
    pub uuid: String,
    pub name: String,
    pub content: String,
    pub source: EpisodeSource,
    pub source_description: String,
    pub created_at: String,
    pub valid_at: String,
    pub score: f64,
}

impl From<&Scored<Episode>> for EpisodePayload {
    fn from(scored: &Scored<Episode>) -> Self {
        let episode = &scored.item;
        Self {
            uuid: episode.uuid.to_string(),
            name: episode.name.clone(),
            content: episode.content.clone(),
            source: episode.source,
            source_description: episode.source_description.clone(),
            created_at: render_datetime(&episode.created_at),
            valid_at: render_datetime(&episode.valid_at),
            score: scored.score,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CommunityPayload {
    pub uuid: String,
    pub name: String,
    pub summary: String,
    pub group_id: String,
    pub created_at: String,
    pub score: f64,
}

impl From<&Scored<Community>> for CommunityPayload {
    fn from(scored: &Scored<Community>) -> Self {
        let community = &scored.item;
        Self {
            uuid: community.uuid.to_string(),
            name: community.name.clone(),
            summary: community.summary.clone(),
            group_id: community.group_id.clone(),
            created_at: render_datetime(&community.created_at),
            score: scored.score,
        }
    }
}

/// `POST /search` response body.
#[derive(Debug, Serialize)]
pub struct SearchResponsePayload {
    pub edges: Vec<EdgePayload>,
    pub nodes: Vec<NodePayload>,
    pub episodes: Vec<EpisodePayload>,
    pub communities: Vec<CommunityPayload>,
    pub latency_ms: f64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_methods: Vec<String>,
}

impl SearchResponsePayload {
    pub fn from_outcome(outcome: &SearchOutcome) -> Self {
        let results: &SearchResults = &outcome.results;
        Self {
            edges: results.edges.iter().map(EdgePayload::from).collect(),
            nodes: results.nodes.iter().map(NodePayload::from).collect(),
            episodes: results.episodes.iter().map(EpisodePayload::from).collect(),
            communities: results
                .communities
                .iter()
                .map(CommunityPayload::from)
                .collect(),
            latency_ms: outcome.latency_ms,
            degraded: !outcome.failed_methods.is_empty(),
            failed_methods: outcome.failed_methods.clone(),
        }
    }
}

/// `POST /search/edges` response body.
#[derive(Debug, Serialize)]
pub struct EdgeSearchResponsePayload {
    pub edges: Vec<EdgePayload>,
    pub latency_ms: f64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

/// `POST /search/nodes` response body.
#[derive(Debug, Serialize)]
pub struct NodeSearchResponsePayload {
    pub nodes: Vec<NodePayload>,
    pub latency_ms: f64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

/// `POST /search/episodes` response body.
#[derive(Debug, Serialize)]
pub struct EpisodeSearchResponsePayload {
    pub episodes: Vec<EpisodePayload>,
    pub latency_ms: f64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

/// `POST /search/communities` response body.
#[derive(Debug, Serialize)]
pub struct CommunitySearchResponsePayload {
    pub communities: Vec<CommunityPayload>,
    pub latency_ms: f64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

/// Inbound ingestion webhook (cache invalidation).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IngestionEventPayload {
    pub operation: String,
    pub group_id: String,
    #[serde(default)]
    pub entity_ids: Vec<Uuid>,
}

/// Webhook acknowledgement.
#[derive(Debug, Serialize)]
pub struct InvalidationResponsePayload {
    pub invalidated: u64,
}

/// `GET /health` body.
#[derive(Debug, Serialize)]
pub struct HealthResponsePayload {
    pub status: &'static str,
    pub database: &'static str,
}
