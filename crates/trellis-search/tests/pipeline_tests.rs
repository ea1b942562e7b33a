//! End-to-end pipeline tests over the public crate surface, using the
//! mock backends.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use uuid::Uuid;

use trellis::cache::{MockKvBackend, ResultCache, ResultCacheConfig};
use trellis::embedding::{EmbeddingCache, EmbeddingProvider, MockEmbedder};
use trellis::graph::MockGraphBackend;
use trellis::model::{Edge, Episode, EpisodeSource, Node, SearchFilter};
use trellis::query::{QueryPreparer, SearchRequest};
use trellis::search::{EngineConfig, RetrievalEngine, SearchConfig};
use trellis::service::SearchService;

fn uuid(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

fn ts(y: i32, m: u32, d: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

fn node(n: u128, name: &str, summary: &str, embedding: Vec<f32>) -> Node {
    Node {
        uuid: uuid(n),
        name: name.to_string(),
        labels: vec!["Person".to_string()],
        summary: summary.to_string(),
        embedding: Some(embedding),
        group_id: "g1".to_string(),
        created_at: ts(2024, 1, 1),
        attributes: BTreeMap::new(),
    }
}

fn edge(n: u128, source: u128, target: u128, name: &str, fact: &str) -> Edge {
    Edge {
        uuid: uuid(n),
        source_node_uuid: uuid(source),
        target_node_uuid: uuid(target),
        name: name.to_string(),
        fact: fact.to_string(),
        embedding: Some(vec![1.0, 0.0, 0.0, 0.0]),
        episodes: vec![uuid(100)],
        group_id: "g1".to_string(),
        created_at: ts(2024, 1, 1),
        valid_at: Some(ts(2024, 1, 1)),
        invalid_at: None,
        expired_at: None,
    }
}

fn build_service(
    graph: Arc<MockGraphBackend>,
) -> SearchService<MockGraphBackend, Arc<MockKvBackend>> {
    let embedder = Arc::new(MockEmbedder::new(4));
    let preparer = QueryPreparer::new(
        embedder as Arc<dyn EmbeddingProvider>,
        Arc::new(EmbeddingCache::new()),
        false,
    );
    let cache = ResultCache::new(
        Some(Arc::new(MockKvBackend::new())),
        ResultCacheConfig::default(),
    );
    let engine = RetrievalEngine::new(graph, EngineConfig::default());
    SearchService::new(preparer, cache, engine, 16)
}

fn seeded_graph() -> Arc<MockGraphBackend> {
    let graph = Arc::new(MockGraphBackend::new());
    graph.add_node(node(1, "Alice", "founder of Acme", vec![1.0, 0.0, 0.0, 0.0]));
    graph.add_node(node(2, "Acme", "a software company", vec![0.0, 1.0, 0.0, 0.0]));
    graph.add_node(node(3, "Bob", "engineer at Acme", vec![0.8, 0.2, 0.0, 0.0]));
    graph.add_edge(edge(10, 1, 2, "FOUNDED", "Alice founded Acme"));
    graph.add_edge(edge(11, 3, 2, "WORKS_AT", "Bob works at Acme"));
    graph.add_episode(Episode {
        uuid: uuid(100),
        name: "onboarding notes".to_string(),
        content: "Alice founded Acme in 2019; Bob joined as the first engineer".to_string(),
        source: EpisodeSource::Text,
        source_description: "meeting transcript".to_string(),
        group_id: "g1".to_string(),
        created_at: ts(2024, 1, 1),
        valid_at: ts(2019, 6, 1),
        entity_edges: vec![uuid(10)],
    });
    graph
}

fn request(query: &str) -> SearchRequest {
    SearchRequest::new(query, vec!["g1".to_string()])
}

#[tokio::test]
async fn test_full_pipeline_returns_all_requested_kinds() {
    let service = build_service(seeded_graph());

    let mut req = request("Alice Acme founded");
    req.config.episode_config.enabled = true;

    let outcome = service.search(req).await.unwrap();
    assert!(!outcome.results.nodes.is_empty());
    assert!(!outcome.results.edges.is_empty());
    assert!(!outcome.results.episodes.is_empty());
    assert!(outcome.failed_methods.is_empty());

    // Returned edges reference nodes that exist in the store.
    let node_ids: Vec<Uuid> = vec![uuid(1), uuid(2), uuid(3)];
    for edge in &outcome.results.edges {
        assert!(node_ids.contains(&edge.item.source_node_uuid));
        assert!(node_ids.contains(&edge.item.target_node_uuid));
    }

    // Every kind is ordered by descending score with identifier ties.
    for pair in outcome.results.edges.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    for pair in outcome.results.nodes.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn test_bitemporal_exclusion_and_opt_in() {
    let graph = seeded_graph();
    let mut superseded = edge(12, 1, 2, "LEADS", "Alice leads Acme");
    superseded.invalid_at = Some(ts(2024, 2, 1));
    graph.add_edge(superseded);

    let service = build_service(graph);

    // Superseded edges are excluded by default.
    let outcome = service.search(request("Alice leads Acme")).await.unwrap();
    assert!(!outcome.results.edges.iter().any(|e| e.item.uuid == uuid(12)));

    // A caller may opt in to seeing them.
    let mut req = request("Alice leads Acme");
    req.filter = SearchFilter {
        group_ids: vec!["g1".to_string()],
        include_invalidated: true,
        ..Default::default()
    };
    let outcome = service.search(req).await.unwrap();
    assert!(outcome.results.edges.iter().any(|e| e.item.uuid == uuid(12)));
    // And the pair is still well-ordered on every returned edge.
    for e in &outcome.results.edges {
        assert!(e.item.temporal_ordering_holds());
    }
}

#[tokio::test]
async fn test_group_isolation() {
    let graph = seeded_graph();
    let mut foreign = node(7, "Alice", "a different Alice", vec![1.0, 0.0, 0.0, 0.0]);
    foreign.group_id = "g2".to_string();
    graph.add_node(foreign);

    let service = build_service(graph);
    let outcome = service.search(request("Alice")).await.unwrap();

    assert!(outcome.results.nodes.iter().all(|n| n.item.group_id == "g1"));
}

#[tokio::test]
async fn test_results_roundtrip_through_wire_encoding() {
    let service = build_service(seeded_graph());
    let outcome = service.search(request("Alice Acme")).await.unwrap();

    let encoded = rmp_serde::to_vec_named(&*outcome.results).unwrap();
    let decoded: trellis::search::SearchResults = rmp_serde::from_slice(&encoded).unwrap();
    assert_eq!(decoded, *outcome.results);
}

#[tokio::test]
async fn test_limit_bounds_every_kind() {
    let graph = seeded_graph();
    for i in 20..40 {
        graph.add_node(node(i, "Acme", "another Acme office", vec![0.0, 1.0, 0.0, 0.0]));
    }
    let service = build_service(graph);

    let mut req = request("Acme");
    req.config = SearchConfig {
        limit: 3,
        ..SearchConfig::default()
    };

    let outcome = service.search(req).await.unwrap();
    assert!(outcome.results.nodes.len() <= 3);
    assert!(outcome.results.edges.len() <= 3);
}
