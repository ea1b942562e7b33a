//! # Trellis Search
//!
//! Hybrid retrieval core for a temporally-aware knowledge graph.
//!
//! Trellis sits between a client and a property-graph store and answers
//! natural-language queries with ranked entities, relationships, and the
//! source episodes that evidence them.
//!
//! ```text
//! Request → Prepare → L1/L2 cache → ∥ {fulltext, similarity, bfs} → Fuse → Cache → Respond
//! ```
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use trellis::config::Config;
//!
//! # fn run() -> Result<(), trellis::config::ConfigError> {
//! let config = Config::from_env()?;
//! println!("Graph store at {}", config.graph_url);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature flags
//!
//! | Feature | Purpose |
//! |---------|---------|
//! | `mock` | In-memory graph/KV/embedding backends for tests and examples |
//!
//! ## Modules
//!
//! - [`query`] - Query normalization, filter resolution, embedding acquisition
//! - [`cache`] - Tiered result cache (L1 in-process + L2 shared KV)
//! - [`search`] - Parallel retrieval, fusion, reranking, deduplication
//! - [`graph`] - Graph-store adapter (Cypher and Redis-graph dialects)
//! - [`embedding`] - Embedding collaborator client and per-process cache
//! - [`service`] - Composition root tying the pipeline together
//!
//! Links: repo/issues at the crate `repository` URL.

#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod cache;
pub mod config;
pub mod constants;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod hashing;
pub mod model;
pub mod query;
pub mod search;
pub mod service;

pub use error::{ErrorKind, SearchError};
pub use model::{Community, Edge, EntityKind, Episode, Node, SearchFilter};
pub use search::{SearchConfig, SearchResults};
pub use service::SearchService;
