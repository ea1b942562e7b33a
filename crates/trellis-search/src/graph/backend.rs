//! The uniform retrieval interface the engine programs against.

use std::collections::HashMap;

use async_trait::async_trait;
use uuid::Uuid;

use super::error::GraphResult;
use crate::model::{Community, Edge, Episode, Node, SearchFilter};

/// Uniform retrieval surface over one graph store, hiding its dialect.
///
/// Ordering contracts: fulltext and similarity results come back in
/// descending score order with ties broken by ascending identifier; BFS
/// results come back ordered by depth then identifier. Implementations
/// enforce this themselves since stores differ on tie handling.
#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// BM25 query against the node name/summary text index.
    async fn fulltext_nodes(
        &self,
        query: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> GraphResult<Vec<(Node, f64)>>;

    /// BM25 query against the edge name/fact text index.
    async fn fulltext_edges(
        &self,
        query: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> GraphResult<Vec<(Edge, f64)>>;

    /// BM25 query against the episode content text index.
    async fn fulltext_episodes(
        &self,
        query: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> GraphResult<Vec<(Episode, f64)>>;

    /// BM25 query against the community name/summary text index.
    async fn fulltext_communities(
        &self,
        query: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> GraphResult<Vec<(Community, f64)>>;

    /// Cosine query against node embeddings, filtered to `min_score`.
    async fn similar_nodes(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        limit: usize,
        min_score: f64,
    ) -> GraphResult<Vec<(Node, f64)>>;

    /// Cosine query against edge fact embeddings.
    async fn similar_edges(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        limit: usize,
        min_score: f64,
    ) -> GraphResult<Vec<(Edge, f64)>>;

    /// Cosine query against community embeddings.
    async fn similar_communities(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        limit: usize,
        min_score: f64,
    ) -> GraphResult<Vec<(Community, f64)>>;

    /// Nodes within `max_depth` hops of the origins, with their depth.
    async fn bfs_nodes(
        &self,
        origins: &[Uuid],
        max_depth: u32,
        filter: &SearchFilter,
        limit: usize,
    ) -> GraphResult<Vec<(Node, u32)>>;

    /// Edges reachable within `max_depth` hops of the origins.
    async fn bfs_edges(
        &self,
        origins: &[Uuid],
        max_depth: u32,
        filter: &SearchFilter,
        limit: usize,
    ) -> GraphResult<Vec<(Edge, u32)>>;

    /// Batched embedding fetch for MMR over nodes.
    async fn node_embeddings(&self, uuids: &[Uuid]) -> GraphResult<HashMap<Uuid, Vec<f32>>>;

    /// Batched embedding fetch for MMR over edges.
    async fn edge_embeddings(&self, uuids: &[Uuid]) -> GraphResult<HashMap<Uuid, Vec<f32>>>;

    /// Batched embedding fetch for MMR over communities.
    async fn community_embeddings(&self, uuids: &[Uuid]) -> GraphResult<HashMap<Uuid, Vec<f32>>>;

    /// Shortest-path distances from `center` to each of `uuids`;
    /// unreachable nodes are absent from the map.
    async fn distances_from(
        &self,
        center: Uuid,
        uuids: &[Uuid],
    ) -> GraphResult<HashMap<Uuid, u32>>;

    /// Liveness probe.
    async fn ping(&self) -> GraphResult<()>;
}
