use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request-scoped predicate set, frozen at preparation time.
///
/// Group identifiers are the tenancy boundary: an empty list means
/// tenancy-wide, which the preparer only permits when the deployment
/// explicitly allows it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    /// ANY-of match over group identifiers.
    #[serde(default)]
    pub group_ids: Vec<String>,

    /// Restrict nodes to these type labels (ANY-of).
    #[serde(default)]
    pub node_labels: Vec<String>,

    /// Lower bound on `valid_at`.
    #[serde(default)]
    pub valid_after: Option<DateTime<Utc>>,

    /// Upper bound on `valid_at`.
    #[serde(default)]
    pub valid_before: Option<DateTime<Utc>>,

    /// Center node for distance-based reranking and implicit BFS origins.
    #[serde(default)]
    pub center_node_uuid: Option<Uuid>,

    /// Explicit BFS origin identifiers.
    #[serde(default)]
    pub bfs_origin_node_uuids: Vec<Uuid>,

    /// Include edges whose `invalid_at` is set. Superseded edges are
    /// excluded by default.
    #[serde(default)]
    pub include_invalidated: bool,
}

impl SearchFilter {
    /// BFS origins: explicit list first, falling back to the center node.
    pub fn bfs_origins(&self) -> Vec<Uuid> {
        if !self.bfs_origin_node_uuids.is_empty() {
            return self.bfs_origin_node_uuids.clone();
        }
        self.center_node_uuid.into_iter().collect()
    }

    /// Whether the filter scopes to at least one group.
    pub fn is_group_scoped(&self) -> bool {
        !self.group_ids.is_empty()
    }

    /// Group identifiers sorted for deterministic cache keys.
    pub fn sorted_group_ids(&self) -> Vec<String> {
        let mut ids = self.group_ids.clone();
        ids.sort();
        ids.dedup();
        ids
    }
}
