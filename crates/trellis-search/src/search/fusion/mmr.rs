//! Maximal marginal relevance.

use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use super::{Candidate, Reranker};
use crate::embedding::cosine_similarity;

/// Iterative selection trading query relevance against redundancy:
/// each step picks the candidate maximizing
/// `λ·sim(c, query) − (1−λ)·max over selected sim(c, s)`.
///
/// Candidates without a fetched embedding score zero on both terms and
/// sink to the tail.
pub struct MmrReranker {
    lambda: f64,
    query: Arc<Vec<f32>>,
    embeddings: HashMap<Uuid, Vec<f32>>,
}

impl MmrReranker {
    /// Builds the reranker from the query vector and the batched candidate
    /// embeddings fetched from the store.
    pub fn new(lambda: f64, query: Arc<Vec<f32>>, embeddings: HashMap<Uuid, Vec<f32>>) -> Self {
        Self {
            lambda,
            query,
            embeddings,
        }
    }

    fn query_similarity(&self, uuid: &Uuid) -> f64 {
        self.embeddings
            .get(uuid)
            .map(|e| cosine_similarity(e, &self.query))
            .unwrap_or(0.0)
    }
}

impl Reranker for MmrReranker {
    fn name(&self) -> &'static str {
        "mmr"
    }

    /// The relevance component alone; the diversity penalty only exists
    /// relative to an already-selected set.
    fn score(&self, candidate: &Candidate) -> f64 {
        self.lambda * self.query_similarity(&candidate.uuid)
    }

    fn rerank(&self, candidates: &[Candidate]) -> Vec<(Uuid, f64)> {
        let mut remaining: Vec<Uuid> = candidates.iter().map(|c| c.uuid).collect();
        let mut selected: Vec<(Uuid, f64)> = Vec::with_capacity(remaining.len());

        while !remaining.is_empty() {
            let mut best_idx = 0;
            let mut best_score = f64::NEG_INFINITY;

            for (idx, uuid) in remaining.iter().enumerate() {
                let relevance = self.lambda * self.query_similarity(uuid);
                let redundancy = selected
                    .iter()
                    .filter_map(|(sel, _)| {
                        let a = self.embeddings.get(uuid)?;
                        let b = self.embeddings.get(sel)?;
                        Some(cosine_similarity(a, b))
                    })
                    .fold(f64::NEG_INFINITY, f64::max);
                let penalty = if redundancy == f64::NEG_INFINITY {
                    0.0
                } else {
                    (1.0 - self.lambda) * redundancy
                };
                let marginal = relevance - penalty;

                let wins = marginal > best_score
                    || (marginal == best_score && *uuid < remaining[best_idx]);
                if wins {
                    best_idx = idx;
                    best_score = marginal;
                }
            }

            let uuid = remaining.swap_remove(best_idx);
            selected.push((uuid, best_score));
        }

        selected
    }
}
