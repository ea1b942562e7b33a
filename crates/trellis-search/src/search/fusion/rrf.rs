//! Reciprocal rank fusion.

use super::{Candidate, Reranker};
use crate::constants::RRF_K;

/// Σ over methods of 1/(k + rank), ranks 1-based; methods a candidate is
/// absent from contribute zero.
#[derive(Debug, Clone)]
pub struct RrfReranker {
    k: f64,
}

impl RrfReranker {
    /// RRF with an explicit rank constant.
    pub fn new(k: f64) -> Self {
        Self { k }
    }
}

impl Default for RrfReranker {
    fn default() -> Self {
        Self { k: RRF_K }
    }
}

impl Reranker for RrfReranker {
    fn name(&self) -> &'static str {
        "rrf"
    }

    fn score(&self, candidate: &Candidate) -> f64 {
        candidate
            .ranks
            .iter()
            .flatten()
            .map(|rank| 1.0 / (self.k + *rank as f64))
            .sum()
    }
}
