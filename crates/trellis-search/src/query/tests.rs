use std::sync::Arc;

use super::*;
use crate::embedding::MockEmbedder;
use crate::error::ErrorKind;
use crate::search::config::{RerankerKind, SearchMethod};

fn preparer(allow_unscoped: bool) -> (QueryPreparer, Arc<MockEmbedder>) {
    let embedder = Arc::new(MockEmbedder::new(8));
    let preparer = QueryPreparer::new(
        Arc::clone(&embedder) as Arc<dyn EmbeddingProvider>,
        Arc::new(EmbeddingCache::new()),
        allow_unscoped,
    );
    (preparer, embedder)
}

fn scoped_request(query: &str) -> SearchRequest {
    SearchRequest::new(query, vec!["g1".to_string()])
}

#[test]
fn test_normalize_collapses_whitespace() {
    assert_eq!(
        normalize_query("  who   founded\t\nAcme? ").unwrap(),
        "who founded Acme?"
    );
}

#[test]
fn test_normalize_rejects_empty() {
    let err = normalize_query("   \t ").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn test_normalize_rejects_oversize() {
    let long = "a ".repeat(4097);
    let err = normalize_query(&long).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_prepare_computes_embedding_once() {
    let (preparer, embedder) = preparer(false);

    let prepared = preparer.prepare(scoped_request("who founded Acme?")).await.unwrap();
    assert!(prepared.query_vector.is_some());
    assert_eq!(embedder.call_count(), 1);

    // Same normalized text: served from the embedding cache.
    let again = preparer
        .prepare(scoped_request("  who founded   Acme? "))
        .await
        .unwrap();
    assert_eq!(embedder.call_count(), 1);
    assert_eq!(prepared.query_vector.unwrap(), again.query_vector.unwrap());
}

#[tokio::test]
async fn test_prepare_skips_embedding_when_not_needed() {
    let (preparer, embedder) = preparer(false);

    let mut request = scoped_request("who founded Acme?");
    request.config.edge_config.search_methods = vec![SearchMethod::Fulltext];
    request.config.node_config.search_methods = vec![SearchMethod::Fulltext];

    let prepared = preparer.prepare(request).await.unwrap();
    assert!(prepared.query_vector.is_none());
    assert_eq!(embedder.call_count(), 0);
}

#[tokio::test]
async fn test_prepare_accepts_caller_vector() {
    let (preparer, embedder) = preparer(false);

    let mut request = scoped_request("who founded Acme?");
    request.query_vector = Some(vec![0.5; 8]);

    let prepared = preparer.prepare(request).await.unwrap();
    assert_eq!(prepared.query_vector.unwrap().len(), 8);
    assert_eq!(embedder.call_count(), 0);
}

#[tokio::test]
async fn test_prepare_rejects_bad_dimension() {
    let (preparer, _) = preparer(false);

    let mut request = scoped_request("who founded Acme?");
    request.query_vector = Some(vec![0.5; 4]);

    let err = preparer.prepare(request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_prepare_rejects_unscoped_by_default() {
    let (preparer, _) = preparer(false);
    let err = preparer
        .prepare(SearchRequest::new("who founded Acme?", Vec::new()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_prepare_allows_unscoped_when_enabled() {
    let (preparer, _) = preparer(true);
    let prepared = preparer
        .prepare(SearchRequest::new("who founded Acme?", Vec::new()))
        .await
        .unwrap();
    assert!(prepared.filter.group_ids.is_empty());
}

#[tokio::test]
async fn test_prepare_requires_center_for_node_distance() {
    let (preparer, _) = preparer(false);

    let mut request = scoped_request("who founded Acme?");
    request.config.node_config.reranker = RerankerKind::NodeDistance;

    let err = preparer.prepare(request).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[tokio::test]
async fn test_prepare_clamps_limit() {
    let (preparer, _) = preparer(false);

    let mut request = scoped_request("who founded Acme?");
    request.config.limit = 100;

    let prepared = preparer.prepare(request).await.unwrap();
    assert_eq!(prepared.config.limit, 100);
}

#[tokio::test]
async fn test_prepare_embedding_failure_propagates_kind() {
    let (preparer, embedder) = preparer(false);
    embedder.fail_next(crate::embedding::EmbeddingError::Unreachable {
        url: "http://localhost:1".to_string(),
        message: "refused".to_string(),
    });

    let err = preparer
        .prepare(scoped_request("who founded Acme?"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
}
