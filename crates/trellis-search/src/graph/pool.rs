//! Bounded pool of long-lived graph-store connections.
//!
//! Acquire is fair FIFO (tokio semaphore order) with a bounded wait;
//! hitting the bound surfaces [`GraphError::PoolExhausted`] so the caller
//! can shed load instead of queueing without limit. Concurrent retrievals
//! each hold their own connection; a guard returns it on drop.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::error::{GraphError, GraphResult};

struct PoolInner<C> {
    idle: Mutex<VecDeque<C>>,
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
}

/// Fixed-size connection pool.
pub struct ConnectionPool<C> {
    inner: Arc<PoolInner<C>>,
    size: usize,
}

impl<C> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            size: self.size,
        }
    }
}

impl<C> std::fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("size", &self.size)
            .field("available", &self.inner.permits.available_permits())
            .finish()
    }
}

impl<C> ConnectionPool<C> {
    /// Builds a pool over pre-established connections.
    pub fn new(connections: Vec<C>, acquire_timeout: Duration) -> Self {
        let size = connections.len();
        Self {
            inner: Arc::new(PoolInner {
                idle: Mutex::new(connections.into()),
                permits: Arc::new(Semaphore::new(size)),
                acquire_timeout,
            }),
            size,
        }
    }

    /// Checks out a connection, waiting at most the configured bound.
    pub async fn acquire(&self) -> GraphResult<PooledConnection<C>> {
        let permit = tokio::time::timeout(
            self.inner.acquire_timeout,
            Arc::clone(&self.inner.permits).acquire_owned(),
        )
        .await
        .map_err(|_| GraphError::PoolExhausted)?
        .map_err(|_| GraphError::PoolExhausted)?;

        let connection = self
            .inner
            .idle
            .lock()
            .pop_front()
            .expect("permit held but no idle connection");

        Ok(PooledConnection {
            connection: Some(connection),
            inner: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Total connections managed.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Connections not currently checked out.
    pub fn available(&self) -> usize {
        self.inner.permits.available_permits()
    }
}

/// A checked-out connection; returns itself to the pool on drop.
pub struct PooledConnection<C> {
    connection: Option<C>,
    inner: Arc<PoolInner<C>>,
    _permit: OwnedSemaphorePermit,
}

impl<C> std::fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection").finish()
    }
}

impl<C> std::ops::Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &C {
        self.connection.as_ref().expect("connection present until drop")
    }
}

impl<C> std::ops::DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut C {
        self.connection.as_mut().expect("connection present until drop")
    }
}

impl<C> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.inner.idle.lock().push_back(connection);
        }
    }
}
