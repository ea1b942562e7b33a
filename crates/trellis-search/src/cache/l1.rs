//! L1 in-process result cache.
//!
//! A bounded LRU of `Arc`-shared search results. Each entry carries its own
//! expiry; expired entries are removed on access rather than by a sweeper.

use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::sync::Cache;

use crate::search::SearchResults;

#[derive(Clone)]
struct L1Entry {
    results: Arc<SearchResults>,
    expires_at: Instant,
}

/// Bounded LRU keyed by the derived cache key.
pub struct L1ResultCache {
    entries: Cache<String, L1Entry>,
}

impl L1ResultCache {
    /// Creates a cache holding at most `capacity` entries.
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            entries: Cache::builder().max_capacity(capacity).build(),
        }
    }

    /// Returns the live entry for `key`, removing it when expired.
    pub fn lookup(&self, key: &str) -> Option<Arc<SearchResults>> {
        let entry = self.entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            self.entries.invalidate(key);
            return None;
        }
        Some(entry.results)
    }

    /// Inserts `results` under `key`, expiring after `ttl`.
    pub fn insert(&self, key: &str, results: Arc<SearchResults>, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            L1Entry {
                results,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Removes one entry.
    pub fn remove(&self, key: &str) {
        self.entries.invalidate(key);
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }

    /// Number of live entries.
    pub fn len(&self) -> u64 {
        self.entries.entry_count()
    }

    /// Returns `true` when no entries are cached.
    pub fn is_empty(&self) -> bool {
        self.entries.entry_count() == 0
    }

    /// Runs pending maintenance in the underlying cache. Tests use this to
    /// observe eviction deterministically.
    pub fn run_pending_tasks(&self) {
        self.entries.run_pending_tasks();
    }
}

impl std::fmt::Debug for L1ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("L1ResultCache")
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}
