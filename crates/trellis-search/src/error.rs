//! Top-level error taxonomy.
//!
//! Every failure surfaced to a caller collapses into one of five
//! [`ErrorKind`]s; the HTTP layer maps kinds to status codes and the
//! `retryable` hint. Area-specific errors (embedding, cache, graph) convert
//! into [`SearchError`] at the component boundary.

use thiserror::Error;

use crate::embedding::EmbeddingError;
use crate::graph::GraphError;

/// Coarse classification of a failure, stable across component boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller error: empty/oversize query, bad dimension, unknown enum value.
    InvalidInput,
    /// External dependency unreachable or timed out.
    Unavailable,
    /// Dependency returned a well-formed error (missing index, dialect error).
    DependencyFailed,
    /// Pool exhausted, inbound cap reached, or embedding concurrency cap hit.
    ResourceExhausted,
    /// Invariant violated inside the core.
    Internal,
}

impl ErrorKind {
    /// Wire name used in error responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::DependencyFailed => "dependency_failed",
            ErrorKind::ResourceExhausted => "resource_exhausted",
            ErrorKind::Internal => "internal",
        }
    }

    /// Whether a caller may retry the identical request.
    pub fn retryable(&self) -> bool {
        matches!(self, ErrorKind::Unavailable | ErrorKind::ResourceExhausted)
    }

    /// Severity order used when collapsing multiple method failures into
    /// one request error. Higher wins.
    pub(crate) fn severity(&self) -> u8 {
        match self {
            ErrorKind::InvalidInput => 0,
            ErrorKind::ResourceExhausted => 1,
            ErrorKind::DependencyFailed => 2,
            ErrorKind::Unavailable => 3,
            ErrorKind::Internal => 4,
        }
    }
}

/// Request-fatal error carrying its [`ErrorKind`] and a human message.
#[derive(Debug, Error)]
pub enum SearchError {
    /// Caller supplied an unusable request.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A dependency could not be reached.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// A dependency answered with an error.
    #[error("dependency failed: {0}")]
    DependencyFailed(String),

    /// A bounded resource is at capacity.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The core violated one of its own invariants.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SearchError {
    /// The kind this error collapses to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SearchError::InvalidInput(_) => ErrorKind::InvalidInput,
            SearchError::Unavailable(_) => ErrorKind::Unavailable,
            SearchError::DependencyFailed(_) => ErrorKind::DependencyFailed,
            SearchError::ResourceExhausted(_) => ErrorKind::ResourceExhausted,
            SearchError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether a caller may retry the identical request.
    pub fn retryable(&self) -> bool {
        self.kind().retryable()
    }

    pub(crate) fn from_kind(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::InvalidInput => SearchError::InvalidInput(message),
            ErrorKind::Unavailable => SearchError::Unavailable(message),
            ErrorKind::DependencyFailed => SearchError::DependencyFailed(message),
            ErrorKind::ResourceExhausted => SearchError::ResourceExhausted(message),
            ErrorKind::Internal => SearchError::Internal(message),
        }
    }
}

impl From<EmbeddingError> for SearchError {
    fn from(err: EmbeddingError) -> Self {
        SearchError::from_kind(err.kind(), err.to_string())
    }
}

impl From<GraphError> for SearchError {
    fn from(err: GraphError) -> Self {
        SearchError::from_kind(err.kind(), err.to_string())
    }
}
