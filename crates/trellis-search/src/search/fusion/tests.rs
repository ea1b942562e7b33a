use std::collections::HashMap;
use std::sync::Arc;

use uuid::Uuid;

use super::*;
use crate::search::config::SearchMethod;
use crate::search::methods::{RankedItem, RankedList};

fn uuid(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

fn ranking(method: SearchMethod, uuids: &[Uuid]) -> RankedList {
    RankedList {
        method,
        items: uuids
            .iter()
            .enumerate()
            .map(|(i, u)| RankedItem {
                uuid: *u,
                raw_score: 1.0 - i as f64 * 0.1,
            })
            .collect(),
    }
}

#[test]
fn test_candidates_preserve_first_seen_order() {
    let (a, b, c) = (uuid(1), uuid(2), uuid(3));
    let rankings = vec![
        ranking(SearchMethod::Fulltext, &[a, b]),
        ranking(SearchMethod::Similarity, &[c, b]),
    ];

    let candidates = candidates_from(&rankings);
    let order: Vec<Uuid> = candidates.iter().map(|c| c.uuid).collect();
    assert_eq!(order, vec![a, b, c]);

    let b_candidate = &candidates[1];
    assert_eq!(b_candidate.ranks, vec![Some(2), Some(2)]);
    let c_candidate = &candidates[2];
    assert_eq!(c_candidate.ranks, vec![None, Some(1)]);
}

#[test]
fn test_rrf_basic_fusion() {
    // Full-text returns [n1, n2, n3]; similarity returns [n3, n4, n2].
    let (n1, n2, n3, n4) = (uuid(1), uuid(2), uuid(3), uuid(4));
    let rankings = vec![
        ranking(SearchMethod::Fulltext, &[n1, n2, n3]),
        ranking(SearchMethod::Similarity, &[n3, n4, n2]),
    ];

    let fused = RrfReranker::default().rerank(&candidates_from(&rankings));
    let order: Vec<Uuid> = fused.iter().map(|(u, _)| *u).collect();

    // With k = 60 and 1-based ranks:
    //   n3 = 1/63 + 1/61, n2 = 1/62 + 1/63, n1 = 1/61, n4 = 1/62.
    assert_eq!(order, vec![n3, n2, n1, n4]);

    let scores: HashMap<Uuid, f64> = fused.into_iter().collect();
    assert!((scores[&n3] - (1.0 / 63.0 + 1.0 / 61.0)).abs() < 1e-12);
    assert!((scores[&n2] - (1.0 / 62.0 + 1.0 / 63.0)).abs() < 1e-12);
    assert!((scores[&n1] - 1.0 / 61.0).abs() < 1e-12);
    assert!((scores[&n4] - 1.0 / 62.0).abs() < 1e-12);
}

#[test]
fn test_rrf_ties_break_by_identifier() {
    let (a, b) = (uuid(7), uuid(9));
    // Both appear only once at the same rank of different methods.
    let rankings = vec![
        ranking(SearchMethod::Fulltext, &[b]),
        ranking(SearchMethod::Similarity, &[a]),
    ];

    let fused = RrfReranker::default().rerank(&candidates_from(&rankings));
    assert_eq!(fused[0].0, a);
    assert_eq!(fused[1].0, b);
    assert_eq!(fused[0].1, fused[1].1);
}

#[test]
fn test_rrf_empty_input() {
    let fused = RrfReranker::default().rerank(&candidates_from(&[]));
    assert!(fused.is_empty());
}

#[test]
fn test_mmr_prefers_diverse_candidates() {
    // c1..c5 with query similarities ≈ .9, .88, .87, .5, .4; c2/c3 are
    // near-duplicates of c1 (cosine ≥ .95), c4/c5 point elsewhere.
    let (c1, c2, c3, c4, c5) = (uuid(1), uuid(2), uuid(3), uuid(4), uuid(5));
    let query = Arc::new(vec![1.0f32, 0.0]);
    let embeddings: HashMap<Uuid, Vec<f32>> = [
        (c1, vec![0.9f32, 0.43589]),
        (c2, vec![0.88, 0.47497]),
        (c3, vec![0.87, 0.49309]),
        (c4, vec![0.5, -0.86603]),
        (c5, vec![0.4, -0.91652]),
    ]
    .into_iter()
    .collect();

    let rankings = vec![ranking(SearchMethod::Similarity, &[c1, c2, c3, c4, c5])];
    let reranker = MmrReranker::new(0.5, query, embeddings);
    let fused = reranker.rerank(&candidates_from(&rankings));
    let order: Vec<Uuid> = fused.iter().map(|(u, _)| *u).collect();

    assert_eq!(order[0], c1);
    assert!(
        order[1] == c4 || order[1] == c5,
        "second pick must favor a diverse candidate, got {:?}",
        order[1]
    );
    assert_eq!(order.len(), 5);
}

#[test]
fn test_mmr_missing_embeddings_sink() {
    let (a, b) = (uuid(1), uuid(2));
    let query = Arc::new(vec![1.0f32, 0.0]);
    let embeddings: HashMap<Uuid, Vec<f32>> =
        [(a, vec![1.0f32, 0.0])].into_iter().collect();

    let rankings = vec![ranking(SearchMethod::Similarity, &[b, a])];
    let fused = MmrReranker::new(0.5, query, embeddings).rerank(&candidates_from(&rankings));
    assert_eq!(fused[0].0, a);
}

#[test]
fn test_node_distance_orders_by_distance_unreachable_last() {
    let (near, far, lost, also_near) = (uuid(1), uuid(2), uuid(3), uuid(4));
    let distances: HashMap<Uuid, u32> =
        [(near, 1), (far, 3), (also_near, 1)].into_iter().collect();

    let rankings = vec![ranking(
        SearchMethod::Fulltext,
        &[lost, far, near, also_near],
    )];
    let fused = NodeDistanceReranker::new(distances).rerank(&candidates_from(&rankings));
    let order: Vec<Uuid> = fused.iter().map(|(u, _)| *u).collect();

    // Equal distance keeps incoming order: `near` appeared before
    // `also_near` in the candidate table.
    assert_eq!(order, vec![near, also_near, far, lost]);
    assert_eq!(fused[3].1, 0.0);
}

#[test]
fn test_sequence_ratio_values() {
    use super::dedup::sequence_ratio;

    assert_eq!(sequence_ratio("", ""), 1.0);
    assert_eq!(sequence_ratio("abc", "abc"), 1.0);
    assert_eq!(sequence_ratio("abc", "xyz"), 0.0);

    // Trailing punctuation: 2·19 / (19 + 20).
    let ratio = sequence_ratio("alice works at acme", "alice works at acme.");
    assert!((ratio - 38.0 / 39.0).abs() < 1e-12);

    // A mid-sentence insertion keeps both flanking blocks matched:
    // 2·19 / (19 + 25).
    let ratio = sequence_ratio("alice works at acme", "alice works daily at acme");
    assert!((ratio - 38.0 / 44.0).abs() < 1e-12);
}

#[test]
fn test_dedup_matching_blocks_survive_mid_insertion() {
    // The matching-blocks ratio scores a mid-clause insertion at ~0.86,
    // over the threshold; an edit-distance ratio would sit at 0.76 and
    // wrongly keep the duplicate.
    let mut deduper = FactDeduper::new();
    assert!(deduper.accept("Alice works at Acme"));
    assert!(!deduper.accept("Alice works daily at Acme"));
    assert_eq!(deduper.len(), 1);
}

#[test]
fn test_dedup_exact_and_near_duplicates() {
    let mut deduper = FactDeduper::new();

    assert!(deduper.accept("Alice works at Acme"));
    // Punctuation-only difference: char-sequence similarity > 0.85.
    assert!(!deduper.accept("Alice works at Acme."));
    // Case/whitespace difference: identical normalized fingerprint.
    assert!(!deduper.accept("alice   WORKS at acme"));
    // Different phrasing survives.
    assert!(deduper.accept("Alice is employed by Acme"));

    assert_eq!(deduper.len(), 2);
}

#[test]
fn test_dedup_rejects_empty_facts() {
    let mut deduper = FactDeduper::new();
    assert!(!deduper.accept("   "));
    assert!(deduper.is_empty());
}

#[test]
fn test_reranker_names() {
    assert_eq!(RrfReranker::default().name(), "rrf");
    assert_eq!(
        MmrReranker::new(0.5, Arc::new(vec![]), HashMap::new()).name(),
        "mmr"
    );
    assert_eq!(NodeDistanceReranker::new(HashMap::new()).name(), "node_distance");
}
