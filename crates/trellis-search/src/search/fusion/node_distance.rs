//! Distance-from-center reranking.

use std::collections::HashMap;

use uuid::Uuid;

use super::{Candidate, Reranker};

/// Orders by ascending shortest-path distance from the designated center
/// node. Items at equal distance keep their incoming order; unreachable
/// items go last. The combined score is `1/(1 + distance)` so the response
/// stays sorted by descending score.
pub struct NodeDistanceReranker {
    distances: HashMap<Uuid, u32>,
}

impl NodeDistanceReranker {
    /// Builds the reranker from the batched shortest-path distances.
    pub fn new(distances: HashMap<Uuid, u32>) -> Self {
        Self { distances }
    }

    fn distance_score(&self, uuid: &Uuid) -> f64 {
        match self.distances.get(uuid) {
            Some(d) => 1.0 / (1.0 + *d as f64),
            None => 0.0,
        }
    }
}

impl Reranker for NodeDistanceReranker {
    fn name(&self) -> &'static str {
        "node_distance"
    }

    fn score(&self, candidate: &Candidate) -> f64 {
        self.distance_score(&candidate.uuid)
    }

    fn rerank(&self, candidates: &[Candidate]) -> Vec<(Uuid, f64)> {
        let mut ordered: Vec<(Uuid, f64)> = candidates
            .iter()
            .map(|c| (c.uuid, self.distance_score(&c.uuid)))
            .collect();
        // Stable sort keeps incoming order within a distance bucket.
        ordered.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
        });
        ordered
    }
}
