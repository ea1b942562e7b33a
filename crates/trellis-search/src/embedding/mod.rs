//! Embedding collaborator client and per-process cache.
//!
//! The collaborator is external; only its HTTP contract is consumed
//! ([`client`]). Vectors are cached L1-only with single-flight population
//! ([`cache`]).

pub mod cache;
pub mod client;
pub mod error;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(test)]
mod tests;

pub use cache::EmbeddingCache;
pub use client::{EmbeddingClientConfig, HttpEmbedder};
pub use error::EmbeddingError;

#[cfg(any(test, feature = "mock"))]
pub use mock::MockEmbedder;

/// Anything that can turn text into a fixed-dimension vector.
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// The deployment-wide vector dimension this provider produces.
    fn dimension(&self) -> usize;

    /// Embeds a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Cosine similarity between two vectors of equal length.
///
/// Returns 0.0 when either vector has zero norm; callers treat that as
/// "no similarity signal" rather than an error.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
