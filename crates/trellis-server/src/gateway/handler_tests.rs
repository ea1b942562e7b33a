use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use trellis::cache::{MockKvBackend, ResultCache, ResultCacheConfig};
use trellis::embedding::{EmbeddingCache, EmbeddingProvider, MockEmbedder};
use trellis::graph::MockGraphBackend;
use trellis::model::{Community, Edge, Episode, EpisodeSource, Node};
use trellis::query::QueryPreparer;
use trellis::search::{EngineConfig, RetrievalEngine};
use trellis::service::SearchService;

use super::{GatewayState, create_router_with_state};

fn uuid(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

struct TestApp {
    app: Router,
    graph: Arc<MockGraphBackend>,
}

fn test_app() -> TestApp {
    let graph = Arc::new(MockGraphBackend::new());
    graph.add_node(Node {
        uuid: uuid(1),
        name: "Alice".to_string(),
        labels: vec!["Person".to_string()],
        summary: "founder of Acme".to_string(),
        embedding: Some(vec![1.0, 0.0, 0.0, 0.0]),
        group_id: "g1".to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        attributes: BTreeMap::new(),
    });
    graph.add_node(Node {
        uuid: uuid(2),
        name: "Acme".to_string(),
        labels: vec!["Organization".to_string()],
        summary: "a software company".to_string(),
        embedding: Some(vec![0.0, 1.0, 0.0, 0.0]),
        group_id: "g1".to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        attributes: BTreeMap::new(),
    });
    graph.add_edge(Edge {
        uuid: uuid(10),
        source_node_uuid: uuid(1),
        target_node_uuid: uuid(2),
        name: "FOUNDED".to_string(),
        fact: "Alice founded Acme".to_string(),
        embedding: Some(vec![1.0, 0.0, 0.0, 0.0]),
        episodes: Vec::new(),
        group_id: "g1".to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        valid_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
        invalid_at: None,
        expired_at: None,
    });

    graph.add_episode(Episode {
        uuid: uuid(100),
        name: "founding memo".to_string(),
        content: "Alice founded Acme in 2019".to_string(),
        source: EpisodeSource::Text,
        source_description: "archived memo".to_string(),
        group_id: "g1".to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        valid_at: Utc.with_ymd_and_hms(2019, 3, 1, 0, 0, 0).unwrap(),
        entity_edges: vec![uuid(10)],
    });
    graph.add_community(Community {
        uuid: uuid(200),
        name: "Acme staff".to_string(),
        summary: "people working at Acme".to_string(),
        embedding: Some(vec![0.5, 0.5, 0.0, 0.0]),
        group_id: "g1".to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    });

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
    let engine = RetrievalEngine::new(Arc::clone(&graph), EngineConfig::default());
    let service = SearchService::new(preparer, cache, engine, 16);

    TestApp {
        app: create_router_with_state(GatewayState::new(service)),
        graph,
    }
}

async fn post_json(app: &Router, path: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::post(path)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn get_json(app: &Router, path: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn search_body(query: &str) -> Value {
    json!({
        "query": query,
        "filters": {"group_ids": ["g1"]}
    })
}

#[tokio::test]
async fn test_combined_search_happy_path() {
    let t = test_app();
    let (status, body) = post_json(&t.app, "/search", search_body("Alice Acme")).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["latency_ms"].is_number());
    assert!(body.get("degraded").is_none());

    let nodes = body["nodes"].as_array().unwrap();
    assert!(!nodes.is_empty());
    let alice = nodes
        .iter()
        .find(|n| n["uuid"] == uuid(1).to_string())
        .expect("Alice in results");
    assert_eq!(alice["node_type"], "Person");
    assert!(alice["created_at"].as_str().unwrap().ends_with('Z'));

    let edges = body["edges"].as_array().unwrap();
    assert_eq!(edges[0]["fact"], "Alice founded Acme");
    assert_eq!(edges[0]["source_node_uuid"], uuid(1).to_string());
    assert!(edges[0]["score"].is_number());
}

#[tokio::test]
async fn test_empty_query_is_rejected() {
    let t = test_app();
    let (status, body) = post_json(&t.app, "/search", search_body("   ")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
    assert_eq!(body["retryable"], false);
}

#[tokio::test]
async fn test_legacy_flat_schema_is_rejected() {
    let t = test_app();
    // `alpha` belonged to the retired flat schema.
    let (status, body) = post_json(
        &t.app,
        "/search",
        json!({
            "query": "Alice",
            "config": {"limit": 10, "alpha": 0.5},
            "filters": {"group_ids": ["g1"]}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
}

#[tokio::test]
async fn test_unknown_reranker_is_rejected() {
    let t = test_app();
    let (status, _) = post_json(
        &t.app,
        "/search",
        json!({
            "query": "Alice",
            "config": {"node_config": {"reranker": "cross_encoder"}},
            "filters": {"group_ids": ["g1"]}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_degraded_similarity_returns_200_with_flag() {
    let t = test_app();
    t.graph.fail_method("similar_nodes");

    let (status, body) = post_json(&t.app, "/search", search_body("Alice Acme")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["degraded"], true);
    assert!(body["failed_methods"]
        .as_array()
        .unwrap()
        .iter()
        .any(|m| m == "node.similarity"));
    assert!(!body["nodes"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_node_search_endpoint_returns_only_nodes() {
    let t = test_app();
    let (status, body) = post_json(
        &t.app,
        "/search/nodes",
        json!({
            "query": "Alice",
            "config": {"limit": 5, "search_methods": ["fulltext"]},
            "filters": {"group_ids": ["g1"]}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert!(!body["nodes"].as_array().unwrap().is_empty());
    assert!(body.get("edges").is_none());
}

#[tokio::test]
async fn test_edge_search_endpoint_returns_only_edges() {
    let t = test_app();
    let (status, body) = post_json(
        &t.app,
        "/search/edges",
        json!({
            "query": "founded",
            "config": {"search_methods": ["fulltext"]},
            "filters": {"group_ids": ["g1"]}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["edges"].as_array().unwrap().len(), 1);
    assert!(body.get("nodes").is_none());
}

#[tokio::test]
async fn test_episode_search_endpoint() {
    let t = test_app();
    let (status, body) = post_json(
        &t.app,
        "/search/episodes",
        json!({
            "query": "founded Acme",
            "config": {"limit": 5},
            "filters": {"group_ids": ["g1"]}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let episodes = body["episodes"].as_array().unwrap();
    assert_eq!(episodes.len(), 1);
    assert_eq!(episodes[0]["source"], "text");
    assert_eq!(episodes[0]["content"], "Alice founded Acme in 2019");
    assert!(episodes[0]["valid_at"].as_str().unwrap().starts_with("2019-03-01"));
}

#[tokio::test]
async fn test_community_search_endpoint() {
    let t = test_app();
    let (status, body) = post_json(
        &t.app,
        "/search/communities",
        json!({
            "query": "Acme staff",
            "config": {"search_methods": ["fulltext"]},
            "filters": {"group_ids": ["g1"]}
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let communities = body["communities"].as_array().unwrap();
    assert_eq!(communities.len(), 1);
    assert_eq!(communities[0]["name"], "Acme staff");
}

#[tokio::test]
async fn test_health_reports_database_state() {
    let t = test_app();
    let (status, body) = get_json(&t.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "ok");

    t.graph.set_down(true);
    let (status, body) = get_json(&t.app, "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["database"], "unreachable");
}

#[tokio::test]
async fn test_repeat_search_hits_cache() {
    let t = test_app();

    let (_, first) = post_json(&t.app, "/search", search_body("Alice Acme")).await;
    let (_, second) = post_json(&t.app, "/search", search_body("Alice Acme")).await;

    // Identical payloads modulo the measured latency.
    let strip = |mut v: Value| {
        v.as_object_mut().unwrap().remove("latency_ms");
        v
    };
    assert_eq!(strip(first), strip(second));

    let (_, metrics) = get_json(&t.app, "/metrics").await;
    assert_eq!(metrics["result_cache"]["l1_hits"], 1);
}

#[tokio::test]
async fn test_webhook_invalidation_round_trip() {
    let t = test_app();

    post_json(&t.app, "/search", search_body("Alice Acme")).await;

    let event = json!({
        "operation": "add_episode",
        "group_id": "g1",
        "entity_ids": [uuid(1).to_string()]
    });
    let (status, body) = post_json(&t.app, "/webhooks/ingestion", event.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["invalidated"], 1);

    // Idempotent: replaying the event is a harmless no-op.
    let (status, body) = post_json(&t.app, "/webhooks/ingestion", event).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["invalidated"], 0);

    // The next identical search is recomputed, not served from cache.
    post_json(&t.app, "/search", search_body("Alice Acme")).await;
    let (_, metrics) = get_json(&t.app, "/metrics").await;
    assert_eq!(metrics["result_cache"]["l1_hits"], 0);
    assert_eq!(metrics["result_cache"]["misses"], 2);
}

#[tokio::test]
async fn test_webhook_rejects_unknown_fields() {
    let t = test_app();
    let (status, body) = post_json(
        &t.app,
        "/webhooks/ingestion",
        json!({
            "operation": "add_episode",
            "group_id": "g1",
            "entity_ids": [],
            "shard": "s1"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_input");
}

#[tokio::test]
async fn test_bfs_origins_accepted_in_payload() {
    let t = test_app();
    let (status, body) = post_json(
        &t.app,
        "/search",
        json!({
            "query": "Acme",
            "config": {
                "node_config": {"search_methods": ["bfs"]},
                "edge_config": {"enabled": false}
            },
            "filters": {"group_ids": ["g1"]},
            "bfs_origin_node_uuids": [uuid(1).to_string()]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let nodes = body["nodes"].as_array().unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0]["uuid"], uuid(2).to_string());
}
