//! Deterministic in-memory embedder for tests and examples.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::EmbeddingProvider;
use super::error::EmbeddingError;

/// Embedder that derives a unit-norm vector from the SHA-256 of the text.
///
/// Identical texts always produce identical vectors, which makes the
/// single-flight and cache-equality properties directly testable. A failure
/// can be scripted to exercise degraded paths.
pub struct MockEmbedder {
    dimension: usize,
    calls: AtomicUsize,
    fail_next: Mutex<Option<EmbeddingError>>,
    delay: Mutex<Option<std::time::Duration>>,
}

impl MockEmbedder {
    /// Creates a mock producing vectors of `dimension`.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: AtomicUsize::new(0),
            fail_next: Mutex::new(None),
            delay: Mutex::new(None),
        }
    }

    /// Number of upstream calls made so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Scripts the next call to fail with `error`.
    pub fn fail_next(&self, error: EmbeddingError) {
        *self.fail_next.lock() = Some(error);
    }

    /// Adds an artificial delay to every call, for single-flight races.
    pub fn set_delay(&self, delay: std::time::Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// The deterministic vector for `text`, without counting a call.
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let digest = crate::hashing::hash_text(text);
        let mut vector = Vec::with_capacity(self.dimension);
        for i in 0..self.dimension {
            let byte = digest[i % digest.len()];
            // Spread bytes into [-1, 1], perturbed by position so long
            // vectors are not periodic.
            let value = ((byte as i32 - 128) as f32 / 128.0) + (i as f32 * 1e-4);
            vector.push(value);
        }
        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for MockEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.fail_next.lock().take() {
            return Err(error);
        }
        Ok(self.vector_for(text))
    }
}
