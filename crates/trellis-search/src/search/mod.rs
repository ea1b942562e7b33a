//! Retrieval engine and fusion/reranking.

pub mod config;
pub mod engine;
pub mod fusion;
pub mod methods;
pub mod results;

#[cfg(test)]
mod engine_tests;

pub use config::{KindConfig, RerankerKind, SearchConfig, SearchMethod};
pub use engine::{EngineConfig, EngineOutcome, RetrievalEngine};
pub use methods::{MethodFailure, RankedItem, RankedList};
pub use results::{Scored, SearchResults, UuidKeyed, sort_scored};
