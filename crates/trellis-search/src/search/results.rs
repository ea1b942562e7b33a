//! Fused, scored result shapes returned to callers and memoized by the cache tier.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Community, Edge, Episode, Node};

/// Anything addressable by its 128-bit identifier.
pub trait UuidKeyed {
    /// The record's identifier.
    fn uuid(&self) -> Uuid;
}

impl UuidKeyed for Node {
    fn uuid(&self) -> Uuid {
        self.uuid
    }
}

impl UuidKeyed for Edge {
    fn uuid(&self) -> Uuid {
        self.uuid
    }
}

impl UuidKeyed for Episode {
    fn uuid(&self) -> Uuid {
        self.uuid
    }
}

impl UuidKeyed for Community {
    fn uuid(&self) -> Uuid {
        self.uuid
    }
}

/// A record with its final combined score attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scored<T> {
    /// The projected record.
    #[serde(flatten)]
    pub item: T,
    /// Final combined score after fusion and reranking.
    pub score: f64,
}

impl<T: UuidKeyed> Scored<T> {
    /// Identifier of the underlying record.
    pub fn uuid(&self) -> Uuid {
        self.item.uuid()
    }
}

/// Sorts by descending score, ties broken by ascending identifier.
pub fn sort_scored<T: UuidKeyed>(items: &mut [Scored<T>]) {
    items.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.uuid().cmp(&b.uuid()))
    });
}

/// One fused, ordered result list per entity kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    #[serde(default)]
    pub edges: Vec<Scored<Edge>>,
    #[serde(default)]
    pub nodes: Vec<Scored<Node>>,
    #[serde(default)]
    pub episodes: Vec<Scored<Episode>>,
    #[serde(default)]
    pub communities: Vec<Scored<Community>>,
}

impl SearchResults {
    /// Whether every kind came back empty.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
            && self.nodes.is_empty()
            && self.episodes.is_empty()
            && self.communities.is_empty()
    }

    /// Total items across kinds.
    pub fn len(&self) -> usize {
        self.edges.len() + self.nodes.len() + self.episodes.len() + self.communities.len()
    }
}
