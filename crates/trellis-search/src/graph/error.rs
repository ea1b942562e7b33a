use thiserror::Error;

use crate::error::ErrorKind;

/// Result alias for graph-adapter operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors surfaced by the graph-store adapter.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Could not reach the store.
    #[error("graph store at '{url}' unreachable: {message}")]
    ConnectionFailed {
        /// Endpoint URL.
        url: String,
        /// Error message.
        message: String,
    },

    /// Authentication rejected.
    #[error("graph store authentication failed: {message}")]
    AuthFailed {
        /// Error message.
        message: String,
    },

    /// The store rejected a query (missing index, dialect error).
    #[error("graph query failed: {message}")]
    QueryFailed {
        /// Error message.
        message: String,
    },

    /// A query exceeded its deadline.
    #[error("graph query timed out after {elapsed_ms}ms")]
    Timeout {
        /// Time spent before aborting.
        elapsed_ms: u64,
    },

    /// No pooled connection became available within the bounded wait.
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// A returned record did not match the canonical projection.
    #[error("malformed record: {message}")]
    MalformedRecord {
        /// What was wrong.
        message: String,
    },
}

impl GraphError {
    /// Collapse into the request-level taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphError::ConnectionFailed { .. }
            | GraphError::AuthFailed { .. }
            | GraphError::Timeout { .. } => ErrorKind::Unavailable,
            GraphError::QueryFailed { .. } => ErrorKind::DependencyFailed,
            GraphError::PoolExhausted => ErrorKind::ResourceExhausted,
            GraphError::MalformedRecord { .. } => ErrorKind::Internal,
        }
    }
}
