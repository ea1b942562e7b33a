use std::sync::Arc;
use std::time::Duration;

use super::*;

#[test]
fn test_cosine_similarity_identity() {
    let v = vec![0.5f32, 0.5, 0.5, 0.5];
    assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
}

#[test]
fn test_cosine_similarity_orthogonal() {
    let a = vec![1.0f32, 0.0];
    let b = vec![0.0f32, 1.0];
    assert!(cosine_similarity(&a, &b).abs() < 1e-9);
}

#[test]
fn test_cosine_similarity_degenerate_inputs() {
    assert_eq!(cosine_similarity(&[], &[]), 0.0);
    assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
}

#[tokio::test]
async fn test_mock_embedder_is_deterministic() {
    let embedder = MockEmbedder::new(64);
    let a = embedder.embed("who founded Acme?").await.unwrap();
    let b = embedder.embed("who founded Acme?").await.unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
    assert_ne!(a, embedder.embed("something else").await.unwrap());
}

#[tokio::test]
async fn test_cache_hit_returns_same_vector() {
    let cache = EmbeddingCache::new();
    let embedder = MockEmbedder::new(32);

    let first = cache.get_or_compute("foo", &embedder).await.unwrap();
    let second = cache.get_or_compute("foo", &embedder).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(embedder.call_count(), 1);
    assert_eq!(cache.metrics().snapshot().l1_hits, 1);
}

#[tokio::test]
async fn test_cache_expiry_recomputes() {
    let cache = EmbeddingCache::with_settings(16, Duration::from_millis(10));
    let embedder = MockEmbedder::new(32);

    cache.get_or_compute("foo", &embedder).await.unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    cache.get_or_compute("foo", &embedder).await.unwrap();

    assert_eq!(embedder.call_count(), 2);
}

#[tokio::test]
async fn test_single_flight_coalesces_concurrent_requests() {
    let cache = Arc::new(EmbeddingCache::new());
    let embedder = Arc::new(MockEmbedder::new(32));
    embedder.set_delay(Duration::from_millis(50));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let cache = Arc::clone(&cache);
        let embedder = Arc::clone(&embedder);
        handles.push(tokio::spawn(async move {
            cache
                .get_or_compute("same query", embedder.as_ref())
                .await
                .unwrap()
        }));
    }

    let mut vectors = Vec::new();
    for handle in handles {
        vectors.push(handle.await.unwrap());
    }

    assert_eq!(embedder.call_count(), 1);
    for pair in vectors.windows(2) {
        assert_eq!(pair[0], pair[1]);
    }
}

#[tokio::test]
async fn test_failure_is_not_cached() {
    let cache = EmbeddingCache::new();
    let embedder = MockEmbedder::new(32);

    embedder.fail_next(EmbeddingError::Unreachable {
        url: "http://localhost:1".to_string(),
        message: "connection refused".to_string(),
    });
    let err = cache.get_or_compute("foo", &embedder).await.unwrap_err();
    assert_eq!(err.kind(), crate::error::ErrorKind::Unavailable);

    // Next call goes upstream again and succeeds.
    let vector = cache.get_or_compute("foo", &embedder).await.unwrap();
    assert_eq!(vector.len(), 32);
    assert_eq!(embedder.call_count(), 2);
}

#[tokio::test]
async fn test_clear_forces_recompute() {
    let cache = EmbeddingCache::new();
    let embedder = MockEmbedder::new(32);

    cache.get_or_compute("foo", &embedder).await.unwrap();
    cache.clear();
    // moka applies invalidation lazily; entry count is eventually zero but
    // the lookup path must already miss.
    cache.get_or_compute("foo", &embedder).await.unwrap();
    assert_eq!(embedder.call_count(), 2);
}
