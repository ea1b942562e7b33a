//! Graph-store adapter.
//!
//! One [`GraphBackend`] trait, two dialects: [`cypher::CypherBackend`]
//! binds parameters over Bolt; [`redisgraph::RedisGraphBackend`] escapes
//! literals inline for GRAPH.QUERY. Both share record normalization
//! ([`records`]) and the bounded connection pool ([`pool`]).

pub mod backend;
pub mod cypher;
pub mod error;
pub mod escape;
pub mod pool;
pub mod records;
pub mod redisgraph;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use backend::GraphBackend;
pub use cypher::CypherBackend;
pub use error::{GraphError, GraphResult};
pub use pool::{ConnectionPool, PooledConnection};
pub use redisgraph::RedisGraphBackend;

#[cfg(any(test, feature = "mock"))]
pub use mock::MockGraphBackend;
