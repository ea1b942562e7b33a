use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use super::config::{RerankerKind, SearchConfig, SearchMethod};
use super::engine::{EngineConfig, RetrievalEngine};
use crate::error::ErrorKind;
use crate::graph::MockGraphBackend;
use crate::model::{Edge, Node, SearchFilter};
use crate::query::PreparedQuery;

fn uuid(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

fn node(n: u128, name: &str, summary: &str, embedding: Option<Vec<f32>>) -> Node {
    Node {
        uuid: uuid(n),
        name: name.to_string(),
        labels: vec!["Person".to_string()],
        summary: summary.to_string(),
        embedding,
        group_id: "g1".to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        attributes: BTreeMap::new(),
    }
}

fn edge(n: u128, source: u128, target: u128, fact: &str, embedding: Option<Vec<f32>>) -> Edge {
    Edge {
        uuid: uuid(n),
        source_node_uuid: uuid(source),
        target_node_uuid: uuid(target),
        name: "WORKS_AT".to_string(),
        fact: fact.to_string(),
        embedding,
        episodes: Vec::new(),
        group_id: "g1".to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        valid_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        invalid_at: None,
        expired_at: None,
    }
}

fn prepared(query: &str, config: SearchConfig, vector: Option<Vec<f32>>) -> PreparedQuery {
    PreparedQuery {
        text: query.to_string(),
        config,
        filter: SearchFilter {
            group_ids: vec!["g1".to_string()],
            ..Default::default()
        },
        query_vector: vector.map(Arc::new),
        caller_supplied_vector: false,
    }
}

fn engine(graph: Arc<MockGraphBackend>) -> RetrievalEngine<MockGraphBackend> {
    RetrievalEngine::new(graph, EngineConfig::default())
}

fn fixture_graph() -> Arc<MockGraphBackend> {
    let graph = Arc::new(MockGraphBackend::new());
    graph.add_node(node(1, "Alice", "founder of Acme", Some(vec![1.0, 0.0, 0.0, 0.0])));
    graph.add_node(node(2, "Acme", "a software company", Some(vec![0.0, 1.0, 0.0, 0.0])));
    graph.add_node(node(3, "Bob", "engineer at Acme", Some(vec![0.9, 0.1, 0.0, 0.0])));
    graph.add_edge(edge(10, 1, 2, "Alice founded Acme", Some(vec![1.0, 0.0, 0.0, 0.0])));
    graph.add_edge(edge(11, 3, 2, "Bob works at Acme", Some(vec![0.5, 0.5, 0.0, 0.0])));
    graph
}

#[tokio::test]
async fn test_hybrid_search_returns_sorted_results() {
    let graph = fixture_graph();
    let outcome = engine(Arc::clone(&graph))
        .run(&prepared(
            "Alice Acme",
            SearchConfig::default(),
            Some(vec![1.0, 0.0, 0.0, 0.0]),
        ))
        .await
        .unwrap();

    assert!(!outcome.is_degraded());
    assert!(!outcome.results.nodes.is_empty());
    assert!(!outcome.results.edges.is_empty());

    for pair in outcome.results.nodes.windows(2) {
        assert!(
            pair[0].score > pair[1].score
                || (pair[0].score == pair[1].score && pair[0].uuid() < pair[1].uuid())
        );
    }
}

#[tokio::test]
async fn test_degraded_when_similarity_fails() {
    let graph = fixture_graph();
    graph.fail_method("similar_nodes");

    let outcome = engine(Arc::clone(&graph))
        .run(&prepared(
            "Alice Acme",
            SearchConfig::default(),
            Some(vec![1.0, 0.0, 0.0, 0.0]),
        ))
        .await
        .unwrap();

    assert!(outcome.is_degraded());
    assert!(outcome
        .failed_methods
        .contains(&"node.similarity".to_string()));
    // Full-text still contributes nodes.
    assert!(!outcome.results.nodes.is_empty());
}

#[tokio::test]
async fn test_request_fails_when_every_method_of_a_kind_fails() {
    let graph = fixture_graph();
    graph.fail_method("fulltext_nodes");
    graph.fail_method("similar_nodes");

    let err = engine(Arc::clone(&graph))
        .run(&prepared(
            "Alice Acme",
            SearchConfig::default(),
            Some(vec![1.0, 0.0, 0.0, 0.0]),
        ))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::DependencyFailed);
}

#[tokio::test]
async fn test_similarity_empty_contribution_is_not_a_failure() {
    let graph = fixture_graph();
    let mut config = SearchConfig::default();
    config.node_config.sim_min_score = 0.99;

    // Query vector orthogonal to everything: similarity yields nothing,
    // full-text still contributes.
    let outcome = engine(Arc::clone(&graph))
        .run(&prepared(
            "Alice",
            config,
            Some(vec![0.0, 0.0, 0.0, 1.0]),
        ))
        .await
        .unwrap();

    assert!(!outcome.is_degraded());
    assert!(!outcome.results.nodes.is_empty());
}

#[tokio::test]
async fn test_limit_zero_short_circuits() {
    let graph = fixture_graph();
    let config = SearchConfig {
        limit: 0,
        ..SearchConfig::default()
    };

    let outcome = engine(Arc::clone(&graph))
        .run(&prepared("Alice", config, Some(vec![1.0, 0.0, 0.0, 0.0])))
        .await
        .unwrap();

    assert!(outcome.results.is_empty());
    assert!(!outcome.is_degraded());
}

#[tokio::test]
async fn test_bfs_without_origins_contributes_nothing() {
    let graph = fixture_graph();
    let mut config = SearchConfig::default();
    config.node_config.search_methods = vec![SearchMethod::Bfs];
    config.node_config.bfs_max_depth = 0;
    config.edge_config.enabled = false;

    let outcome = engine(Arc::clone(&graph))
        .run(&prepared("Alice", config, None))
        .await
        .unwrap();

    assert!(outcome.results.nodes.is_empty());
    assert!(!outcome.is_degraded());
}

#[tokio::test]
async fn test_bfs_expansion_finds_neighbors() {
    let graph = fixture_graph();
    let mut config = SearchConfig::default();
    config.node_config.search_methods = vec![SearchMethod::Bfs];
    config.edge_config.enabled = false;

    let mut p = prepared("Alice", config, None);
    p.filter.bfs_origin_node_uuids = vec![uuid(1)];

    let outcome = engine(Arc::clone(&graph)).run(&p).await.unwrap();
    let found: Vec<Uuid> = outcome.results.nodes.iter().map(|n| n.uuid()).collect();

    // Acme at depth 1, Bob at depth 2 through Acme; Alice herself is not
    // part of the expansion.
    assert!(found.contains(&uuid(2)));
    assert!(found.contains(&uuid(3)));
    assert!(!found.contains(&uuid(1)));
}

#[tokio::test]
async fn test_edge_fact_deduplication() {
    let graph = Arc::new(MockGraphBackend::new());
    graph.add_node(node(1, "Alice", "", None));
    graph.add_node(node(2, "Acme", "", None));
    graph.add_node(node(3, "Bob", "", None));
    graph.add_edge(edge(10, 1, 2, "Alice works at Acme", None));
    graph.add_edge(edge(11, 1, 3, "Alice works at Acme.", None));
    graph.add_edge(edge(12, 1, 2, "Alice is employed by Acme", None));

    let mut config = SearchConfig::default();
    config.edge_config.search_methods = vec![SearchMethod::Fulltext];
    config.node_config.enabled = false;

    let outcome = engine(Arc::clone(&graph))
        .run(&prepared("Alice Acme works employed", config, None))
        .await
        .unwrap();

    let facts: Vec<&str> = outcome
        .results
        .edges
        .iter()
        .map(|e| e.item.fact.as_str())
        .collect();

    // Exactly one of the punctuation twins survives; the different
    // phrasing may stay.
    let twins = facts
        .iter()
        .filter(|f| f.starts_with("Alice works at Acme"))
        .count();
    assert_eq!(twins, 1);
    assert!(facts.len() <= 2);
}

#[tokio::test]
async fn test_malformed_edges_are_dropped() {
    let graph = Arc::new(MockGraphBackend::new());
    graph.add_node(node(1, "Alice", "", None));
    graph.add_node(node(2, "Acme", "", None));
    // Self-loop.
    graph.add_edge(edge(10, 1, 1, "Alice knows Alice", None));
    // Inverted bitemporal pair.
    let mut bad = edge(11, 1, 2, "Alice founded Acme", None);
    bad.valid_at = Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap());
    bad.invalid_at = Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    graph.add_edge(bad);
    graph.add_edge(edge(12, 1, 2, "Alice leads Acme", None));

    let mut config = SearchConfig::default();
    config.edge_config.search_methods = vec![SearchMethod::Fulltext];
    config.node_config.enabled = false;

    let outcome = engine(Arc::clone(&graph))
        .run(&prepared("Alice", config, None))
        .await
        .unwrap();

    let uuids: Vec<Uuid> = outcome.results.edges.iter().map(|e| e.uuid()).collect();
    assert_eq!(uuids, vec![uuid(12)]);
}

#[tokio::test]
async fn test_reranker_min_score_drops_everything() {
    let graph = fixture_graph();
    let config = SearchConfig {
        reranker_min_score: 10.0,
        ..SearchConfig::default()
    };

    let outcome = engine(Arc::clone(&graph))
        .run(&prepared("Alice", config, Some(vec![1.0, 0.0, 0.0, 0.0])))
        .await
        .unwrap();

    assert!(outcome.results.is_empty());
}

#[tokio::test]
async fn test_mmr_rerank_fetch_failure_falls_back_to_rrf() {
    let graph = fixture_graph();
    graph.fail_method("node_embeddings");

    let mut config = SearchConfig::default();
    config.node_config.reranker = RerankerKind::Mmr;

    let outcome = engine(Arc::clone(&graph))
        .run(&prepared(
            "Alice Acme",
            config,
            Some(vec![1.0, 0.0, 0.0, 0.0]),
        ))
        .await
        .unwrap();

    assert!(outcome
        .failed_methods
        .contains(&"node.mmr_rerank".to_string()));
    assert!(!outcome.results.nodes.is_empty());
}

#[tokio::test]
async fn test_node_distance_rerank_orders_by_center_proximity() {
    let graph = fixture_graph();
    let mut config = SearchConfig::default();
    config.node_config.reranker = RerankerKind::NodeDistance;
    config.edge_config.enabled = false;

    let mut p = prepared("Alice Acme engineer", config, Some(vec![1.0, 0.0, 0.0, 0.0]));
    p.filter.center_node_uuid = Some(uuid(2));

    let outcome = engine(Arc::clone(&graph)).run(&p).await.unwrap();
    let order: Vec<Uuid> = outcome.results.nodes.iter().map(|n| n.uuid()).collect();

    // Acme is the center (distance 0); Alice and Bob sit one hop out.
    assert_eq!(order.first(), Some(&uuid(2)));
}
