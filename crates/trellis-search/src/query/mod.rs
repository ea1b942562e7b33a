//! Query preparation: normalization, filter resolution, limit bounding,
//! and embedding acquisition.
//!
//! Everything downstream of this module trusts the [`PreparedQuery`]: the
//! filter set is frozen here, limits are clamped to deployment maxima, and
//! the query vector (when any enabled method needs one) is already an
//! immutable shared handle.

#[cfg(test)]
mod tests;

use std::sync::Arc;

use tracing::instrument;

use crate::constants::{MAX_QUERY_LEN, MAX_RESULT_LIMIT};
use crate::embedding::{EmbeddingCache, EmbeddingProvider};
use crate::error::SearchError;
use crate::model::SearchFilter;
use crate::search::SearchConfig;

/// A raw inbound request, as the HTTP layer hands it over.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub config: SearchConfig,
    pub filter: SearchFilter,
    /// Caller-precomputed query embedding of dimension D.
    pub query_vector: Option<Vec<f32>>,
}

impl SearchRequest {
    /// A request with default config, scoped to `group_ids`.
    pub fn new(query: impl Into<String>, group_ids: Vec<String>) -> Self {
        Self {
            query: query.into(),
            config: SearchConfig::default(),
            filter: SearchFilter {
                group_ids,
                ..Default::default()
            },
            query_vector: None,
        }
    }
}

/// A canonical request ready for retrieval.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    /// Whitespace-collapsed query text.
    pub text: String,
    pub config: SearchConfig,
    pub filter: SearchFilter,
    /// Shared query embedding; present whenever any enabled kind runs
    /// similarity or MMR.
    pub query_vector: Option<Arc<Vec<f32>>>,
    /// Whether the vector came from the caller rather than the embedding
    /// collaborator. Cache keys only depend on caller-supplied vectors.
    pub caller_supplied_vector: bool,
}

/// Turns raw requests into [`PreparedQuery`]s.
pub struct QueryPreparer {
    provider: Arc<dyn EmbeddingProvider>,
    embeddings: Arc<EmbeddingCache>,
    max_limit: usize,
    allow_unscoped: bool,
}

impl std::fmt::Debug for QueryPreparer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryPreparer")
            .field("dimension", &self.provider.dimension())
            .field("max_limit", &self.max_limit)
            .field("allow_unscoped", &self.allow_unscoped)
            .finish_non_exhaustive()
    }
}

impl QueryPreparer {
    /// Builds a preparer around the embedding collaborator and its cache.
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        embeddings: Arc<EmbeddingCache>,
        allow_unscoped: bool,
    ) -> Self {
        Self {
            provider,
            embeddings,
            max_limit: MAX_RESULT_LIMIT,
            allow_unscoped,
        }
    }

    /// The embedding cache, shared with the metrics endpoint.
    pub fn embedding_cache(&self) -> &Arc<EmbeddingCache> {
        &self.embeddings
    }

    /// Synchronous half of preparation: normalization, config and filter
    /// validation, limit clamping, caller-vector dimension check. No I/O,
    /// so the result cache can be consulted before any embedding call.
    pub fn validate(&self, request: SearchRequest) -> Result<PreparedQuery, SearchError> {
        let text = normalize_query(&request.query)?;

        let mut config = request.config;
        config.validate()?;
        config.clamp_limit(self.max_limit);

        let filter = request.filter;
        if !filter.is_group_scoped() && !self.allow_unscoped {
            return Err(SearchError::InvalidInput(
                "request names no group_ids and tenancy-wide queries are disabled".to_string(),
            ));
        }
        if config.needs_center_node()
            && filter.center_node_uuid.is_none()
            && filter.bfs_origin_node_uuids.is_empty()
        {
            return Err(SearchError::InvalidInput(
                "node_distance reranker requires center_node_uuid".to_string(),
            ));
        }

        let query_vector = match request.query_vector {
            Some(vector) => {
                let expected = self.provider.dimension();
                if vector.len() != expected {
                    return Err(SearchError::InvalidInput(format!(
                        "query_vector dimension {} does not match deployment dimension {}",
                        vector.len(),
                        expected
                    )));
                }
                Some(Arc::new(vector))
            }
            None => None,
        };

        Ok(PreparedQuery {
            text,
            config,
            filter,
            caller_supplied_vector: query_vector.is_some(),
            query_vector,
        })
    }

    /// Asynchronous half: acquires the query embedding through the
    /// per-process cache and its single-flight guard, when any enabled
    /// method needs one and the caller did not supply a vector.
    pub async fn resolve_embedding(&self, prepared: &mut PreparedQuery) -> Result<(), SearchError> {
        if prepared.query_vector.is_none() && prepared.config.needs_query_embedding() {
            let vector = self
                .embeddings
                .get_or_compute(&prepared.text, self.provider.as_ref())
                .await?;
            prepared.query_vector = Some(vector);
        }
        Ok(())
    }

    /// Both halves in order.
    #[instrument(skip(self, request), fields(query_len = request.query.len()))]
    pub async fn prepare(&self, request: SearchRequest) -> Result<PreparedQuery, SearchError> {
        let mut prepared = self.validate(request)?;
        self.resolve_embedding(&mut prepared).await?;
        Ok(prepared)
    }
}

/// Collapses internal whitespace and enforces the length bounds.
pub fn normalize_query(raw: &str) -> Result<String, SearchError> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return Err(SearchError::InvalidInput("query is empty".to_string()));
    }
    if collapsed.chars().count() > MAX_QUERY_LEN {
        return Err(SearchError::InvalidInput(format!(
            "query exceeds {MAX_QUERY_LEN} characters"
        )));
    }
    Ok(collapsed)
}
