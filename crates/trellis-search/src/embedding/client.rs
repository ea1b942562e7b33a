//! HTTP client for the embedding collaborator.
//!
//! Wire contract: `POST {input: [text], model}` answered by
//! `{data: [{embedding: [f32 × D]}]}`. Any 2xx with a well-formed body is
//! accepted. Transport failures are retried with exponential backoff and
//! jitter; contract violations are not.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

use super::EmbeddingProvider;
use super::error::EmbeddingError;
use crate::constants::DEFAULT_MAX_CONCURRENT_EMBEDDINGS;

/// Tunables for the HTTP embedder.
#[derive(Debug, Clone)]
pub struct EmbeddingClientConfig {
    /// Full endpoint URL.
    pub url: String,
    /// Model name forwarded to the collaborator.
    pub model: String,
    /// Deployment-wide embedding dimension.
    pub dimension: usize,
    /// Per-attempt request timeout.
    pub request_timeout: Duration,
    /// Retry attempts after the first failure, transport errors only.
    pub max_retries: u32,
    /// Base delay for exponential backoff.
    pub backoff_base: Duration,
    /// Concurrency cap across all requests.
    pub max_concurrency: usize,
    /// How long to wait for a concurrency permit before rejecting.
    pub permit_timeout: Duration,
}

impl Default for EmbeddingClientConfig {
    fn default() -> Self {
        Self {
            url: crate::config::DEFAULT_EMBEDDING_URL.to_string(),
            model: crate::config::DEFAULT_EMBEDDING_MODEL.to_string(),
            dimension: crate::constants::DEFAULT_EMBEDDING_DIM,
            request_timeout: Duration::from_secs(10),
            max_retries: 2,
            backoff_base: Duration::from_millis(100),
            max_concurrency: DEFAULT_MAX_CONCURRENT_EMBEDDINGS,
            permit_timeout: Duration::from_secs(1),
        }
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: [&'a str; 1],
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

/// Reqwest-backed [`EmbeddingProvider`].
pub struct HttpEmbedder {
    http: reqwest::Client,
    config: EmbeddingClientConfig,
    limiter: Arc<Semaphore>,
}

impl std::fmt::Debug for HttpEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpEmbedder")
            .field("url", &self.config.url)
            .field("model", &self.config.model)
            .field("dimension", &self.config.dimension)
            .finish_non_exhaustive()
    }
}

impl HttpEmbedder {
    /// Builds a client from config. The underlying HTTP client carries the
    /// per-attempt timeout.
    pub fn new(config: EmbeddingClientConfig) -> Result<Self, EmbeddingError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| EmbeddingError::Unreachable {
                url: config.url.clone(),
                message: e.to_string(),
            })?;
        let limiter = Arc::new(Semaphore::new(config.max_concurrency));
        Ok(Self {
            http,
            config,
            limiter,
        })
    }

    async fn request_once(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let body = EmbeddingRequest {
            input: [text],
            model: &self.config.model,
        };

        let response = self
            .http
            .post(&self.config.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbeddingError::Unreachable {
                url: self.config.url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::BadStatus {
                status: status.as_u16(),
                message: truncate(&message, 256),
            });
        }

        let parsed: EmbeddingResponse =
            response
                .json()
                .await
                .map_err(|e| EmbeddingError::MalformedResponse {
                    message: e.to_string(),
                })?;

        let first = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::MalformedResponse {
                message: "empty data array".to_string(),
            })?;

        if first.embedding.len() != self.config.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.config.dimension,
                actual: first.embedding.len(),
            });
        }

        Ok(first.embedding)
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.backoff_base.as_millis() as u64;
        let exp = base.saturating_mul(1u64 << attempt.min(8));
        let jitter = rand::rng().random_range(0..=base.max(1));
        Duration::from_millis(exp + jitter)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for HttpEmbedder {
    fn dimension(&self) -> usize {
        self.config.dimension
    }

    #[instrument(skip(self, text), fields(text_len = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let permit = tokio::time::timeout(
            self.config.permit_timeout,
            Arc::clone(&self.limiter).acquire_owned(),
        )
        .await
        .map_err(|_| EmbeddingError::TooManyRequests)?
        .map_err(|_| EmbeddingError::TooManyRequests)?;
        let _permit = permit;

        let mut attempt = 0u32;
        loop {
            match self.request_once(text).await {
                Ok(vector) => {
                    debug!(dimension = vector.len(), attempt, "embedding acquired");
                    return Ok(vector);
                }
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let delay = self.backoff_delay(attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, error = %e, "embedding attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
