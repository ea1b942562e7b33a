//! In-memory graph backend for tests and examples.
//!
//! Holds a small fixture graph and answers the full [`GraphBackend`]
//! surface deterministically: fulltext scores are query-term overlap
//! counts, similarity is exact cosine, BFS runs over an adjacency map
//! built from the stored edges. Individual methods can be scripted to
//! fail to exercise degraded paths.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use super::backend::GraphBackend;
use super::error::{GraphError, GraphResult};
use crate::embedding::cosine_similarity;
use crate::model::{Community, Edge, Episode, Node, SearchFilter};

/// Scriptable in-memory [`GraphBackend`].
#[derive(Default)]
pub struct MockGraphBackend {
    nodes: RwLock<Vec<Node>>,
    edges: RwLock<Vec<Edge>>,
    episodes: RwLock<Vec<Episode>>,
    communities: RwLock<Vec<Community>>,
    failing: Mutex<HashSet<&'static str>>,
    down: AtomicBool,
}

impl std::fmt::Debug for MockGraphBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockGraphBackend")
            .field("nodes", &self.nodes.read().len())
            .field("edges", &self.edges.read().len())
            .finish_non_exhaustive()
    }
}

impl MockGraphBackend {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&self, node: Node) {
        self.nodes.write().push(node);
    }

    pub fn add_edge(&self, edge: Edge) {
        self.edges.write().push(edge);
    }

    pub fn add_episode(&self, episode: Episode) {
        self.episodes.write().push(episode);
    }

    pub fn add_community(&self, community: Community) {
        self.communities.write().push(community);
    }

    /// Scripts `method` (trait method name) to fail with a dialect error.
    pub fn fail_method(&self, method: &'static str) {
        self.failing.lock().insert(method);
    }

    /// Clears a scripted failure.
    pub fn restore_method(&self, method: &'static str) {
        self.failing.lock().remove(method);
    }

    /// Marks the whole store unreachable.
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self, method: &'static str) -> GraphResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(GraphError::ConnectionFailed {
                url: "mock://graph".to_string(),
                message: "store marked down".to_string(),
            });
        }
        if self.failing.lock().contains(method) {
            return Err(GraphError::QueryFailed {
                message: format!("scripted failure for {method}"),
            });
        }
        Ok(())
    }

    fn adjacency(&self, filter: &SearchFilter) -> HashMap<Uuid, Vec<(Uuid, Uuid)>> {
        // node -> (neighbor, edge uuid); undirected view of the graph.
        let mut adjacency: HashMap<Uuid, Vec<(Uuid, Uuid)>> = HashMap::new();
        for edge in self.edges.read().iter() {
            if !edge_matches_filter(edge, filter) {
                continue;
            }
            adjacency
                .entry(edge.source_node_uuid)
                .or_default()
                .push((edge.target_node_uuid, edge.uuid));
            adjacency
                .entry(edge.target_node_uuid)
                .or_default()
                .push((edge.source_node_uuid, edge.uuid));
        }
        adjacency
    }

    /// Multi-source BFS returning node depths up to `max_depth`.
    fn bfs_depths(
        &self,
        origins: &[Uuid],
        max_depth: u32,
        filter: &SearchFilter,
    ) -> HashMap<Uuid, u32> {
        let adjacency = self.adjacency(filter);
        let mut depths: HashMap<Uuid, u32> = HashMap::new();
        let mut queue: VecDeque<(Uuid, u32)> = VecDeque::new();

        for origin in origins {
            depths.insert(*origin, 0);
            queue.push_back((*origin, 0));
        }

        while let Some((current, depth)) = queue.pop_front() {
            if depth == max_depth {
                continue;
            }
            for (neighbor, _) in adjacency.get(&current).into_iter().flatten() {
                if !depths.contains_key(neighbor) {
                    depths.insert(*neighbor, depth + 1);
                    queue.push_back((*neighbor, depth + 1));
                }
            }
        }
        depths
    }
}

fn group_matches(group_id: &str, filter: &SearchFilter) -> bool {
    filter.group_ids.is_empty() || filter.group_ids.iter().any(|g| g == group_id)
}

fn node_matches_filter(node: &Node, filter: &SearchFilter) -> bool {
    if !group_matches(&node.group_id, filter) {
        return false;
    }
    if !filter.node_labels.is_empty()
        && !node.labels.iter().any(|l| filter.node_labels.contains(l))
    {
        return false;
    }
    true
}

fn edge_matches_filter(edge: &Edge, filter: &SearchFilter) -> bool {
    if !group_matches(&edge.group_id, filter) {
        return false;
    }
    if !filter.include_invalidated && edge.is_invalidated() {
        return false;
    }
    if let Some(after) = filter.valid_after {
        if edge.valid_at.is_none_or(|v| v < after) {
            return false;
        }
    }
    if let Some(before) = filter.valid_before {
        if edge.valid_at.is_none_or(|v| v > before) {
            return false;
        }
    }
    true
}

/// Query-term overlap count; the mock's stand-in for a BM25 weight.
fn fulltext_score(query: &str, haystack: &str) -> f64 {
    let haystack = haystack.to_lowercase();
    query
        .to_lowercase()
        .split_whitespace()
        .filter(|term| haystack.contains(*term))
        .count() as f64
}

fn rank_scored<T>(mut items: Vec<(T, f64)>, limit: usize, uuid_of: impl Fn(&T) -> Uuid) -> Vec<(T, f64)> {
    items.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| uuid_of(&a.0).cmp(&uuid_of(&b.0)))
    });
    items.truncate(limit);
    items
}

#[async_trait]
impl GraphBackend for MockGraphBackend {
    async fn fulltext_nodes(
        &self,
        query: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> GraphResult<Vec<(Node, f64)>> {
        self.check("fulltext_nodes")?;
        let matches: Vec<(Node, f64)> = self
            .nodes
            .read()
            .iter()
            .filter(|n| node_matches_filter(n, filter))
            .map(|n| {
                let score = fulltext_score(query, &format!("{} {}", n.name, n.summary));
                (n.clone(), score)
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();
        Ok(rank_scored(matches, limit, |n| n.uuid))
    }

    async fn fulltext_edges(
        &self,
        query: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> GraphResult<Vec<(Edge, f64)>> {
        self.check("fulltext_edges")?;
        let matches: Vec<(Edge, f64)> = self
            .edges
            .read()
            .iter()
            .filter(|e| edge_matches_filter(e, filter))
            .map(|e| {
                let score = fulltext_score(query, &format!("{} {}", e.name, e.fact));
                (e.clone(), score)
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();
        Ok(rank_scored(matches, limit, |e| e.uuid))
    }

    async fn fulltext_episodes(
        &self,
        query: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> GraphResult<Vec<(Episode, f64)>> {
        self.check("fulltext_episodes")?;
        let matches: Vec<(Episode, f64)> = self
            .episodes
            .read()
            .iter()
            .filter(|e| group_matches(&e.group_id, filter))
            .map(|e| {
                let score = fulltext_score(query, &format!("{} {}", e.name, e.content));
                (e.clone(), score)
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();
        Ok(rank_scored(matches, limit, |e| e.uuid))
    }

    async fn fulltext_communities(
        &self,
        query: &str,
        filter: &SearchFilter,
        limit: usize,
    ) -> GraphResult<Vec<(Community, f64)>> {
        self.check("fulltext_communities")?;
        let matches: Vec<(Community, f64)> = self
            .communities
            .read()
            .iter()
            .filter(|c| group_matches(&c.group_id, filter))
            .map(|c| {
                let score = fulltext_score(query, &format!("{} {}", c.name, c.summary));
                (c.clone(), score)
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();
        Ok(rank_scored(matches, limit, |c| c.uuid))
    }

    async fn similar_nodes(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        limit: usize,
        min_score: f64,
    ) -> GraphResult<Vec<(Node, f64)>> {
        self.check("similar_nodes")?;
        let matches: Vec<(Node, f64)> = self
            .nodes
            .read()
            .iter()
            .filter(|n| node_matches_filter(n, filter))
            .filter_map(|n| {
                let embedding = n.embedding.as_ref()?;
                let score = cosine_similarity(embedding, vector);
                (score >= min_score).then(|| (n.clone(), score))
            })
            .collect();
        Ok(rank_scored(matches, limit, |n| n.uuid))
    }

    async fn similar_edges(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        limit: usize,
        min_score: f64,
    ) -> GraphResult<Vec<(Edge, f64)>> {
        self.check("similar_edges")?;
        let matches: Vec<(Edge, f64)> = self
            .edges
            .read()
            .iter()
            .filter(|e| edge_matches_filter(e, filter))
            .filter_map(|e| {
                let embedding = e.embedding.as_ref()?;
                let score = cosine_similarity(embedding, vector);
                (score >= min_score).then(|| (e.clone(), score))
            })
            .collect();
        Ok(rank_scored(matches, limit, |e| e.uuid))
    }

    async fn similar_communities(
        &self,
        vector: &[f32],
        filter: &SearchFilter,
        limit: usize,
        min_score: f64,
    ) -> GraphResult<Vec<(Community, f64)>> {
        self.check("similar_communities")?;
        let matches: Vec<(Community, f64)> = self
            .communities
            .read()
            .iter()
            .filter(|c| group_matches(&c.group_id, filter))
            .filter_map(|c| {
                let embedding = c.embedding.as_ref()?;
                let score = cosine_similarity(embedding, vector);
                (score >= min_score).then(|| (c.clone(), score))
            })
            .collect();
        Ok(rank_scored(matches, limit, |c| c.uuid))
    }

    async fn bfs_nodes(
        &self,
        origins: &[Uuid],
        max_depth: u32,
        filter: &SearchFilter,
        limit: usize,
    ) -> GraphResult<Vec<(Node, u32)>> {
        self.check("bfs_nodes")?;
        if origins.is_empty() || max_depth == 0 {
            return Ok(Vec::new());
        }
        let depths = self.bfs_depths(origins, max_depth, filter);
        let mut reached: Vec<(Node, u32)> = self
            .nodes
            .read()
            .iter()
            .filter(|n| node_matches_filter(n, filter))
            .filter_map(|n| {
                let depth = depths.get(&n.uuid)?;
                (*depth > 0).then(|| (n.clone(), *depth))
            })
            .collect();
        reached.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.uuid.cmp(&b.0.uuid)));
        reached.truncate(limit);
        Ok(reached)
    }

    async fn bfs_edges(
        &self,
        origins: &[Uuid],
        max_depth: u32,
        filter: &SearchFilter,
        limit: usize,
    ) -> GraphResult<Vec<(Edge, u32)>> {
        self.check("bfs_edges")?;
        if origins.is_empty() || max_depth == 0 {
            return Ok(Vec::new());
        }
        let depths = self.bfs_depths(origins, max_depth, filter);
        let mut reached: Vec<(Edge, u32)> = self
            .edges
            .read()
            .iter()
            .filter(|e| edge_matches_filter(e, filter))
            .filter_map(|e| {
                let nearest = depths
                    .get(&e.source_node_uuid)
                    .min(depths.get(&e.target_node_uuid))?;
                let depth = nearest + 1;
                (depth <= max_depth).then_some((e.clone(), depth))
            })
            .collect();
        reached.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.uuid.cmp(&b.0.uuid)));
        reached.truncate(limit);
        Ok(reached)
    }

    async fn node_embeddings(&self, uuids: &[Uuid]) -> GraphResult<HashMap<Uuid, Vec<f32>>> {
        self.check("node_embeddings")?;
        let wanted: HashSet<&Uuid> = uuids.iter().collect();
        Ok(self
            .nodes
            .read()
            .iter()
            .filter(|n| wanted.contains(&n.uuid))
            .filter_map(|n| Some((n.uuid, n.embedding.clone()?)))
            .collect())
    }

    async fn edge_embeddings(&self, uuids: &[Uuid]) -> GraphResult<HashMap<Uuid, Vec<f32>>> {
        self.check("edge_embeddings")?;
        let wanted: HashSet<&Uuid> = uuids.iter().collect();
        Ok(self
            .edges
            .read()
            .iter()
            .filter(|e| wanted.contains(&e.uuid))
            .filter_map(|e| Some((e.uuid, e.embedding.clone()?)))
            .collect())
    }

    async fn community_embeddings(&self, uuids: &[Uuid]) -> GraphResult<HashMap<Uuid, Vec<f32>>> {
        self.check("community_embeddings")?;
        let wanted: HashSet<&Uuid> = uuids.iter().collect();
        Ok(self
            .communities
            .read()
            .iter()
            .filter(|c| wanted.contains(&c.uuid))
            .filter_map(|c| Some((c.uuid, c.embedding.clone()?)))
            .collect())
    }

    async fn distances_from(
        &self,
        center: Uuid,
        uuids: &[Uuid],
    ) -> GraphResult<HashMap<Uuid, u32>> {
        self.check("distances_from")?;
        let depths = self.bfs_depths(&[center], u32::MAX, &SearchFilter::default());
        Ok(uuids
            .iter()
            .filter_map(|u| depths.get(u).map(|d| (*u, *d)))
            .collect())
    }

    async fn ping(&self) -> GraphResult<()> {
        self.check("ping")
    }
}
