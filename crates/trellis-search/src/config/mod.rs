//! Environment configuration.
//!
//! Every option lives on [`Config`]; nothing is read from the environment
//! after startup. The composition root consumes this once and threads the
//! pieces through.

pub mod error;

#[cfg(test)]
mod tests;

pub use error::ConfigError;

use std::env;
use std::net::IpAddr;

use crate::constants::{
    DEFAULT_EMBEDDING_DIM, DEFAULT_EMBEDDING_TTL_SECS, DEFAULT_L1_EMBEDDING_CAPACITY,
    DEFAULT_L1_RESULT_CAPACITY, DEFAULT_MAX_CONCURRENT_EMBEDDINGS,
    DEFAULT_MAX_CONCURRENT_REQUESTS, DEFAULT_METHOD_TIMEOUT_SECS, DEFAULT_POOL_SIZE,
    DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_RESULT_TTL_SECS,
};

/// Which query dialect the graph store speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphDialect {
    /// Cypher-family store reached over Bolt; parameter binding available.
    Cypher,
    /// Redis-style graph module; literals escaped inline.
    RedisGraph,
}

impl GraphDialect {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.to_ascii_lowercase().as_str() {
            "cypher" | "neo4j" => Ok(GraphDialect::Cypher),
            "redisgraph" | "falkordb" => Ok(GraphDialect::RedisGraph),
            _ => Err(ConfigError::UnknownDialect {
                value: value.to_string(),
            }),
        }
    }
}

/// Deployment configuration, environment-backed.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind_addr: IpAddr,

    pub graph_dialect: GraphDialect,
    pub graph_url: String,
    pub graph_user: Option<String>,
    pub graph_password: Option<String>,
    /// Graph key for Redis-style stores.
    pub graph_name: String,
    pub pool_size: usize,
    pub pool_acquire_timeout_secs: u64,

    /// L2 cache endpoint; `None` degrades the tier to L1-only.
    pub cache_url: Option<String>,
    /// Bumping this invalidates every cached result.
    pub cache_version: u32,
    pub cache_prefix: String,
    pub result_ttl_secs: u64,
    pub l1_result_capacity: u64,
    pub l1_embedding_capacity: u64,
    pub embedding_ttl_secs: u64,

    pub embedding_url: String,
    pub embedding_model: String,
    pub embedding_dim: usize,

    pub method_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub max_concurrent_requests: usize,
    pub max_concurrent_embeddings: usize,

    /// Permit queries that name no group identifier.
    pub allow_unscoped_queries: bool,
}

pub const DEFAULT_GRAPH_URL: &str = "bolt://localhost:7687";
pub const DEFAULT_CACHE_PREFIX: &str = "trellis:cache:";
pub const DEFAULT_EMBEDDING_URL: &str = "http://localhost:11434/v1/embeddings";
pub const DEFAULT_EMBEDDING_MODEL: &str = "mxbai-embed-large";

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3004,
            bind_addr: IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)),
            graph_dialect: GraphDialect::Cypher,
            graph_url: DEFAULT_GRAPH_URL.to_string(),
            graph_user: None,
            graph_password: None,
            graph_name: "trellis".to_string(),
            pool_size: DEFAULT_POOL_SIZE,
            pool_acquire_timeout_secs: 2,
            cache_url: None,
            cache_version: 1,
            cache_prefix: DEFAULT_CACHE_PREFIX.to_string(),
            result_ttl_secs: DEFAULT_RESULT_TTL_SECS,
            l1_result_capacity: DEFAULT_L1_RESULT_CAPACITY,
            l1_embedding_capacity: DEFAULT_L1_EMBEDDING_CAPACITY,
            embedding_ttl_secs: DEFAULT_EMBEDDING_TTL_SECS,
            embedding_url: DEFAULT_EMBEDDING_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            method_timeout_secs: DEFAULT_METHOD_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            max_concurrent_embeddings: DEFAULT_MAX_CONCURRENT_EMBEDDINGS,
            allow_unscoped_queries: false,
        }
    }
}

impl Config {
    const ENV_PORT: &'static str = "TRELLIS_PORT";
    const ENV_BIND_ADDR: &'static str = "TRELLIS_BIND_ADDR";
    const ENV_GRAPH_DIALECT: &'static str = "TRELLIS_GRAPH_DIALECT";
    const ENV_GRAPH_URL: &'static str = "TRELLIS_GRAPH_URL";
    const ENV_GRAPH_USER: &'static str = "TRELLIS_GRAPH_USER";
    const ENV_GRAPH_PASSWORD: &'static str = "TRELLIS_GRAPH_PASSWORD";
    const ENV_GRAPH_NAME: &'static str = "TRELLIS_GRAPH_NAME";
    const ENV_POOL_SIZE: &'static str = "TRELLIS_POOL_SIZE";
    const ENV_POOL_ACQUIRE_TIMEOUT: &'static str = "TRELLIS_POOL_ACQUIRE_TIMEOUT_SECS";
    const ENV_CACHE_URL: &'static str = "TRELLIS_CACHE_URL";
    const ENV_CACHE_VERSION: &'static str = "TRELLIS_CACHE_VERSION";
    const ENV_RESULT_TTL: &'static str = "TRELLIS_RESULT_TTL_SECS";
    const ENV_L1_RESULT_CAPACITY: &'static str = "TRELLIS_L1_RESULT_CAPACITY";
    const ENV_L1_EMBEDDING_CAPACITY: &'static str = "TRELLIS_L1_EMBEDDING_CAPACITY";
    const ENV_EMBEDDING_TTL: &'static str = "TRELLIS_EMBEDDING_TTL_SECS";
    const ENV_EMBEDDING_URL: &'static str = "TRELLIS_EMBEDDING_URL";
    const ENV_EMBEDDING_MODEL: &'static str = "TRELLIS_EMBEDDING_MODEL";
    const ENV_EMBEDDING_DIM: &'static str = "TRELLIS_EMBEDDING_DIM";
    const ENV_METHOD_TIMEOUT: &'static str = "TRELLIS_METHOD_TIMEOUT_SECS";
    const ENV_REQUEST_TIMEOUT: &'static str = "TRELLIS_REQUEST_TIMEOUT_SECS";
    const ENV_MAX_CONCURRENT_REQUESTS: &'static str = "TRELLIS_MAX_CONCURRENT_REQUESTS";
    const ENV_MAX_CONCURRENT_EMBEDDINGS: &'static str = "TRELLIS_MAX_CONCURRENT_EMBEDDINGS";
    const ENV_ALLOW_UNSCOPED: &'static str = "TRELLIS_ALLOW_UNSCOPED_QUERIES";

    /// Reads configuration from the environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = Self::parse_port_from_env(defaults.port)?;
        let bind_addr = Self::parse_bind_addr_from_env(defaults.bind_addr)?;

        let graph_dialect = match env::var(Self::ENV_GRAPH_DIALECT) {
            Ok(value) => GraphDialect::parse(&value)?,
            Err(_) => defaults.graph_dialect,
        };

        Ok(Self {
            port,
            bind_addr,
            graph_dialect,
            graph_url: Self::parse_string(Self::ENV_GRAPH_URL, defaults.graph_url),
            graph_user: Self::parse_optional_string(Self::ENV_GRAPH_USER),
            graph_password: Self::parse_optional_string(Self::ENV_GRAPH_PASSWORD),
            graph_name: Self::parse_string(Self::ENV_GRAPH_NAME, defaults.graph_name),
            pool_size: Self::parse_usize(Self::ENV_POOL_SIZE, defaults.pool_size)?,
            pool_acquire_timeout_secs: Self::parse_u64(
                Self::ENV_POOL_ACQUIRE_TIMEOUT,
                defaults.pool_acquire_timeout_secs,
            )?,
            cache_url: Self::parse_optional_string(Self::ENV_CACHE_URL),
            cache_version: Self::parse_u32(Self::ENV_CACHE_VERSION, defaults.cache_version)?,
            cache_prefix: defaults.cache_prefix,
            result_ttl_secs: Self::parse_u64(Self::ENV_RESULT_TTL, defaults.result_ttl_secs)?,
            l1_result_capacity: Self::parse_u64(
                Self::ENV_L1_RESULT_CAPACITY,
                defaults.l1_result_capacity,
            )?,
            l1_embedding_capacity: Self::parse_u64(
                Self::ENV_L1_EMBEDDING_CAPACITY,
                defaults.l1_embedding_capacity,
            )?,
            embedding_ttl_secs: Self::parse_u64(
                Self::ENV_EMBEDDING_TTL,
                defaults.embedding_ttl_secs,
            )?,
            embedding_url: Self::parse_string(Self::ENV_EMBEDDING_URL, defaults.embedding_url),
            embedding_model: Self::parse_string(
                Self::ENV_EMBEDDING_MODEL,
                defaults.embedding_model,
            ),
            embedding_dim: Self::parse_usize(Self::ENV_EMBEDDING_DIM, defaults.embedding_dim)?,
            method_timeout_secs: Self::parse_u64(
                Self::ENV_METHOD_TIMEOUT,
                defaults.method_timeout_secs,
            )?,
            request_timeout_secs: Self::parse_u64(
                Self::ENV_REQUEST_TIMEOUT,
                defaults.request_timeout_secs,
            )?,
            max_concurrent_requests: Self::parse_usize(
                Self::ENV_MAX_CONCURRENT_REQUESTS,
                defaults.max_concurrent_requests,
            )?,
            max_concurrent_embeddings: Self::parse_usize(
                Self::ENV_MAX_CONCURRENT_EMBEDDINGS,
                defaults.max_concurrent_embeddings,
            )?,
            allow_unscoped_queries: Self::parse_bool(
                Self::ENV_ALLOW_UNSCOPED,
                defaults.allow_unscoped_queries,
            ),
        })
    }

    /// Bounds checks that cannot be expressed in parsing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding_dim == 0 {
            return Err(ConfigError::OutOfRange {
                var: Self::ENV_EMBEDDING_DIM,
                message: "embedding dimension must be non-zero".to_string(),
            });
        }
        if self.pool_size == 0 {
            return Err(ConfigError::OutOfRange {
                var: Self::ENV_POOL_SIZE,
                message: "pool size must be non-zero".to_string(),
            });
        }
        if self.max_concurrent_requests == 0 {
            return Err(ConfigError::OutOfRange {
                var: Self::ENV_MAX_CONCURRENT_REQUESTS,
                message: "request cap must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    /// Socket address string for the HTTP listener.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    fn parse_port_from_env(default: u16) -> Result<u16, ConfigError> {
        match env::var(Self::ENV_PORT) {
            Ok(value) => {
                let port: u16 = value.parse().map_err(|e| ConfigError::PortParseError {
                    value: value.clone(),
                    source: e,
                })?;
                if port == 0 {
                    return Err(ConfigError::InvalidPort { value });
                }
                Ok(port)
            }
            Err(_) => Ok(default),
        }
    }

    fn parse_bind_addr_from_env(default: IpAddr) -> Result<IpAddr, ConfigError> {
        match env::var(Self::ENV_BIND_ADDR) {
            Ok(value) => value
                .parse()
                .map_err(|e| ConfigError::InvalidBindAddr { value, source: e }),
            Err(_) => Ok(default),
        }
    }

    fn parse_string(var: &'static str, default: String) -> String {
        env::var(var).unwrap_or(default)
    }

    fn parse_optional_string(var: &'static str) -> Option<String> {
        env::var(var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_u64(var: &'static str, default: u64) -> Result<u64, ConfigError> {
        match env::var(var) {
            Ok(value) => value
                .parse()
                .map_err(|e| ConfigError::IntParseError { var, value, source: e }),
            Err(_) => Ok(default),
        }
    }

    fn parse_u32(var: &'static str, default: u32) -> Result<u32, ConfigError> {
        match env::var(var) {
            Ok(value) => value
                .parse()
                .map_err(|e| ConfigError::IntParseError { var, value, source: e }),
            Err(_) => Ok(default),
        }
    }

    fn parse_usize(var: &'static str, default: usize) -> Result<usize, ConfigError> {
        match env::var(var) {
            Ok(value) => value
                .parse()
                .map_err(|e| ConfigError::IntParseError { var, value, source: e }),
            Err(_) => Ok(default),
        }
    }

    fn parse_bool(var: &'static str, default: bool) -> bool {
        match env::var(var) {
            Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
            Err(_) => default,
        }
    }
}
