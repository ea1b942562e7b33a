use thiserror::Error;

use crate::error::ErrorKind;

/// Errors from the embedding collaborator and its cache.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Endpoint unreachable or timed out after the retry budget.
    #[error("embedding endpoint '{url}' unreachable: {message}")]
    Unreachable {
        /// Endpoint URL.
        url: String,
        /// Error message.
        message: String,
    },

    /// Endpoint answered with a non-2xx status.
    #[error("embedding endpoint returned status {status}: {message}")]
    BadStatus {
        /// HTTP status code.
        status: u16,
        /// Response body excerpt.
        message: String,
    },

    /// 2xx response whose body did not match the contract.
    #[error("malformed embedding response: {message}")]
    MalformedResponse {
        /// What was wrong.
        message: String,
    },

    /// Returned vector had the wrong dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Deployment-wide dimension.
        expected: usize,
        /// Dimension received.
        actual: usize,
    },

    /// Concurrency cap reached.
    #[error("too many concurrent embedding requests")]
    TooManyRequests,
}

impl EmbeddingError {
    /// Collapse into the request-level taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EmbeddingError::Unreachable { .. } => ErrorKind::Unavailable,
            EmbeddingError::BadStatus { .. }
            | EmbeddingError::MalformedResponse { .. }
            | EmbeddingError::DimensionMismatch { .. } => ErrorKind::DependencyFailed,
            EmbeddingError::TooManyRequests => ErrorKind::ResourceExhausted,
        }
    }

    /// Whether an internal retry may help.
    pub(crate) fn is_transient(&self) -> bool {
        matches!(self, EmbeddingError::Unreachable { .. })
    }
}
