//! Per-method ranked lists flowing from retrieval into fusion.

use uuid::Uuid;

use super::config::SearchMethod;
use crate::error::ErrorKind;
use crate::model::EntityKind;

/// One item in a method's ranking; rank is the position in the list.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedItem {
    pub uuid: Uuid,
    /// Method-native score: BM25 weight, cosine similarity, or 1/(1+depth).
    pub raw_score: f64,
}

/// The ordered output of a single retrieval method for one kind.
#[derive(Debug, Clone, PartialEq)]
pub struct RankedList {
    pub method: SearchMethod,
    pub items: Vec<RankedItem>,
}

impl RankedList {
    /// An empty contribution, still counted as a successful method run.
    pub fn empty(method: SearchMethod) -> Self {
        Self {
            method,
            items: Vec::new(),
        }
    }
}

/// A retrieval method that failed without failing the request.
#[derive(Debug, Clone)]
pub struct MethodFailure {
    pub kind: EntityKind,
    pub method: SearchMethod,
    pub error: ErrorKind,
    pub message: String,
}

impl MethodFailure {
    /// Telemetry label, e.g. `node.similarity`.
    pub fn label(&self) -> String {
        format!("{}.{}", self.kind.as_str(), self.method.as_str())
    }
}
