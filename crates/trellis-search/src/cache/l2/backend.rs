//! Pluggable key/value backends for the shared tier.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, instrument};

use super::super::error::KvError;

/// Minimal surface the shared tier needs from a KV store.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Fetches a payload, `None` on miss.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    /// Stores a payload with a TTL.
    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), KvError>;

    /// Removes one key.
    async fn delete(&self, key: &str) -> Result<(), KvError>;

    /// Scan-and-delete every key matching a glob pattern; returns the
    /// number removed.
    async fn delete_matching(&self, pattern: &str) -> Result<u64, KvError>;

    /// Liveness probe.
    async fn ping(&self) -> Result<(), KvError>;
}

#[async_trait]
impl<K: KvBackend> KvBackend for std::sync::Arc<K> {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        (**self).get(key).await
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), KvError> {
        (**self).set_ex(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        (**self).delete(key).await
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64, KvError> {
        (**self).delete_matching(pattern).await
    }

    async fn ping(&self) -> Result<(), KvError> {
        (**self).ping().await
    }
}

/// Redis-backed [`KvBackend`] over a multiplexed connection manager.
pub struct RedisKvBackend {
    manager: ConnectionManager,
    url: String,
}

impl std::fmt::Debug for RedisKvBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisKvBackend")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl RedisKvBackend {
    /// Connects to `url` and verifies the connection with a PING.
    pub async fn connect(url: &str) -> Result<Self, KvError> {
        let client = redis::Client::open(url).map_err(|e| KvError::ConnectionFailed {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let manager =
            ConnectionManager::new(client)
                .await
                .map_err(|e| KvError::ConnectionFailed {
                    url: url.to_string(),
                    message: e.to_string(),
                })?;

        let backend = Self {
            manager,
            url: url.to_string(),
        };
        backend.ping().await?;
        Ok(backend)
    }
}

#[async_trait]
impl KvBackend for RedisKvBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let mut conn = self.manager.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| KvError::OperationFailed {
                op: "GET",
                message: e.to_string(),
            })?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), KvError> {
        let mut conn = self.manager.clone();
        let ttl_secs = ttl.as_secs().max(1);
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(|e| KvError::OperationFailed {
                op: "SET",
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let mut conn = self.manager.clone();
        let _: u64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| KvError::OperationFailed {
                op: "DEL",
                message: e.to_string(),
            })?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_matching(&self, pattern: &str) -> Result<u64, KvError> {
        let mut conn = self.manager.clone();
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| KvError::OperationFailed {
                    op: "SCAN",
                    message: e.to_string(),
                })?;

            if !keys.is_empty() {
                let count: u64 = redis::cmd("DEL")
                    .arg(&keys)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| KvError::OperationFailed {
                        op: "DEL",
                        message: e.to_string(),
                    })?;
                removed += count;
            }

            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        debug!(pattern, removed, "kv pattern invalidation complete");
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), KvError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| KvError::OperationFailed {
                op: "PING",
                message: e.to_string(),
            })?;
        Ok(())
    }
}
