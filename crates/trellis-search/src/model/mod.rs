//! Canonical projections of graph-store records.
//!
//! The search core never owns graph data. These types hold the fields
//! projected out of the store for the lifetime of a request (plus cached
//! copies in the result cache). Instants are UTC and render as RFC 3339
//! with a trailing `Z`.

mod filter;


pub use filter::SearchFilter;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The four searchable entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A directed, named relationship carrying a fact sentence.
    Edge,
    /// An extracted entity.
    Node,
    /// A source text record.
    Episode,
    /// A cluster of nodes with a summary.
    Community,
}

impl EntityKind {
    /// Stable lowercase name, used in telemetry and method labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Edge => "edge",
            EntityKind::Node => "node",
            EntityKind::Episode => "episode",
            EntityKind::Community => "community",
        }
    }
}

/// An extracted entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub uuid: Uuid,
    pub name: String,
    /// Free-string type labels; the first label doubles as `node_type` on
    /// the wire.
    pub labels: Vec<String>,
    pub summary: String,
    /// Dense embedding over name+summary. Dimension equals the
    /// deployment-wide D when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub group_id: String,
    pub created_at: DateTime<Utc>,
    /// Domain-specific scalar attributes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl Node {
    /// Primary type label, defaulting to `entity`.
    pub fn node_type(&self) -> &str {
        self.labels.first().map(String::as_str).unwrap_or("entity")
    }
}

/// A directed, named relationship between two distinct nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub uuid: Uuid,
    pub source_node_uuid: Uuid,
    pub target_node_uuid: Uuid,
    /// Relation name, SCREAMING_SNAKE_CASE by convention.
    pub name: String,
    /// Natural-language fact sentence the edge encodes.
    pub fact: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Episodes that evidence this edge.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub episodes: Vec<Uuid>,
    pub group_id: String,
    pub created_at: DateTime<Utc>,
    /// Start of the period the fact is considered true.
    pub valid_at: Option<DateTime<Utc>>,
    /// Set when the edge is logically superseded; never earlier than
    /// `valid_at`.
    pub invalid_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
}

impl Edge {
    /// Whether the bitemporal pair is ordered. Malformed records fail this
    /// and are dropped during normalization.
    pub fn temporal_ordering_holds(&self) -> bool {
        match (self.valid_at, self.invalid_at) {
            (Some(valid), Some(invalid)) => invalid >= valid,
            _ => true,
        }
    }

    /// Whether the edge has been superseded.
    pub fn is_invalidated(&self) -> bool {
        self.invalid_at.is_some()
    }
}

/// Provenance category of an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EpisodeSource {
    Text,
    Message,
    Structured,
}

impl Default for EpisodeSource {
    fn default() -> Self {
        EpisodeSource::Text
    }
}

/// A textual record that contributed facts to the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub uuid: Uuid,
    pub name: String,
    /// Raw content, non-empty, bounded by
    /// [`crate::constants::MAX_EPISODE_CONTENT_LEN`].
    pub content: String,
    #[serde(default)]
    pub source: EpisodeSource,
    pub source_description: String,
    pub group_id: String,
    pub created_at: DateTime<Utc>,
    /// Reference instant: the time the content describes.
    pub valid_at: DateTime<Utc>,
    /// Entity edges this episode produced.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entity_edges: Vec<Uuid>,
}

/// A node cluster; node-shaped for search purposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Community {
    pub uuid: Uuid,
    pub name: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    pub group_id: String,
    pub created_at: DateTime<Utc>,
}
