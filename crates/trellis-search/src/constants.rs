//! Cross-cutting, shared constants.
//!
//! Prefer deriving secondary constants from primary ones to avoid drift.
//! The embedding dimension is a deployment-wide invariant: every vector
//! (query, node, edge, community) must agree on it, and boundaries validate
//! with [`validate_embedding_dim`] rather than assuming.

/// Default embedding dimension when `TRELLIS_EMBEDDING_DIM` is unset.
pub const DEFAULT_EMBEDDING_DIM: usize = 768;

/// Maximum query length in characters, after trimming.
pub const MAX_QUERY_LEN: usize = 4096;

/// Maximum results per entity kind.
pub const MAX_RESULT_LIMIT: usize = 100;

/// Default results per entity kind.
pub const DEFAULT_RESULT_LIMIT: usize = 10;

/// Reciprocal-rank-fusion rank constant.
pub const RRF_K: f64 = 60.0;

/// Character-sequence similarity above which two facts are duplicates.
pub const DEDUP_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Upper bound on BFS expansion depth.
pub const MAX_BFS_DEPTH: u32 = 5;

/// Episode content ceiling in characters.
pub const MAX_EPISODE_CONTENT_LEN: usize = 100_000;

/// Default L1 capacity for cached search results.
pub const DEFAULT_L1_RESULT_CAPACITY: u64 = 1_000;

/// Default L1 capacity for cached embeddings.
pub const DEFAULT_L1_EMBEDDING_CAPACITY: u64 = 10_000;

/// Default TTL for cached search results, in seconds.
pub const DEFAULT_RESULT_TTL_SECS: u64 = 300;

/// Default TTL for cached embeddings, in seconds.
pub const DEFAULT_EMBEDDING_TTL_SECS: u64 = 3_600;

/// Default graph-store connection pool size.
pub const DEFAULT_POOL_SIZE: usize = 10;

/// Default per-method retrieval deadline, in seconds.
pub const DEFAULT_METHOD_TIMEOUT_SECS: u64 = 5;

/// Default aggregate request deadline, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Assembled-query byte ceiling for dialects without parameter binding.
pub const MAX_INLINE_QUERY_BYTES: usize = 10_000;

/// Largest array inlined into a non-parameterized query.
pub const MAX_INLINE_ARRAY_LEN: usize = 100;

/// Largest serialized JSON property inlined into a non-parameterized query.
pub const MAX_INLINE_JSON_BYTES: usize = 500;

/// Default cap on concurrent inbound requests.
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 256;

/// Default cap on concurrent embedding collaborator calls.
pub const DEFAULT_MAX_CONCURRENT_EMBEDDINGS: usize = 32;

/// Error returned when a runtime embedding dimension disagrees with the
/// deployment-wide dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionMismatch {
    /// Deployment-wide dimension.
    pub expected: usize,
    /// Dimension actually observed.
    pub actual: usize,
}

impl std::fmt::Display for DimensionMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "embedding dimension mismatch: expected {}, got {}",
            self.expected, self.actual
        )
    }
}

impl std::error::Error for DimensionMismatch {}

/// Validates that a runtime embedding dimension matches the expected one.
///
/// Use at module boundaries to catch mismatches early rather than deep in
/// the retrieval pipeline.
pub fn validate_embedding_dim(actual: usize, expected: usize) -> Result<(), DimensionMismatch> {
    if actual != expected {
        return Err(DimensionMismatch { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_embedding_dim_match() {
        assert!(validate_embedding_dim(768, 768).is_ok());
    }

    #[test]
    fn test_validate_embedding_dim_mismatch() {
        let err = validate_embedding_dim(384, 768).unwrap_err();
        assert_eq!(
            err,
            DimensionMismatch {
                expected: 768,
                actual: 384
            }
        );
        assert!(err.to_string().contains("768"));
        assert!(err.to_string().contains("384"));
    }
}
