//! Fusion and reranking of per-method ranked lists.
//!
//! Rerankers work at list granularity: a candidate table is built once per
//! kind, then a single strategy orders it. Per-item virtual dispatch never
//! happens on the hot path.

pub mod dedup;
pub mod mmr;
pub mod node_distance;
pub mod rrf;

#[cfg(test)]
mod tests;

pub use dedup::FactDeduper;
pub use mmr::MmrReranker;
pub use node_distance::NodeDistanceReranker;
pub use rrf::RrfReranker;

use std::collections::HashMap;

use uuid::Uuid;

use super::methods::RankedList;

/// A candidate's appearance across every method list for its kind.
///
/// `ranks` and `raw_scores` are parallel to the method lists handed to
/// [`candidates_from`]; `None` marks absence from that method. Ranks are
/// 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub uuid: Uuid,
    pub ranks: Vec<Option<usize>>,
    pub raw_scores: Vec<Option<f64>>,
}

/// Builds the candidate table, preserving first-seen order (method order,
/// then rank) as the incoming order rerankers may rely on.
pub fn candidates_from(rankings: &[RankedList]) -> Vec<Candidate> {
    let mut order: Vec<Uuid> = Vec::new();
    let mut table: HashMap<Uuid, Candidate> = HashMap::new();

    for (method_idx, ranking) in rankings.iter().enumerate() {
        for (position, item) in ranking.items.iter().enumerate() {
            let candidate = table.entry(item.uuid).or_insert_with(|| {
                order.push(item.uuid);
                Candidate {
                    uuid: item.uuid,
                    ranks: vec![None; rankings.len()],
                    raw_scores: vec![None; rankings.len()],
                }
            });
            candidate.ranks[method_idx] = Some(position + 1);
            candidate.raw_scores[method_idx] = Some(item.raw_score);
        }
    }

    order
        .into_iter()
        .map(|uuid| table.remove(&uuid).expect("candidate recorded on insert"))
        .collect()
}

/// A fusion strategy over one kind's candidate table.
pub trait Reranker {
    /// Strategy name for telemetry.
    fn name(&self) -> &'static str;

    /// Combined score for a single candidate.
    fn score(&self, candidate: &Candidate) -> f64;

    /// Orders the table by descending combined score, ties broken by
    /// ascending identifier. Strategies with cross-candidate interactions
    /// (MMR, distance) override this.
    fn rerank(&self, candidates: &[Candidate]) -> Vec<(Uuid, f64)> {
        let mut scored: Vec<(Uuid, f64)> = candidates
            .iter()
            .map(|c| (c.uuid, self.score(c)))
            .collect();
        sort_by_score_desc(&mut scored);
        scored
    }
}

/// Descending score, ascending identifier on ties.
pub(crate) fn sort_by_score_desc(items: &mut [(Uuid, f64)]) {
    items.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
}
