//! Tiered result cache (L1 in-process LRU + L2 shared KV) and the
//! embedding cache's shared counters.
//!
//! See [`tiered::ResultCache`] for the request-facing surface.

pub mod error;
pub mod key;
pub mod l1;
pub mod l2;
pub mod metrics;
pub mod tiered;


pub use error::KvError;
pub use l1::L1ResultCache;
pub use l2::{KvBackend, RedisKvBackend};
pub use metrics::{CacheMetrics, CacheMetricsSnapshot};
pub use tiered::{ResultCache, ResultCacheConfig};

#[cfg(any(test, feature = "mock"))]
pub use l2::MockKvBackend;
