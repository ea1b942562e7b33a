//! In-memory KV backend for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::super::error::KvError;
use super::backend::KvBackend;

/// HashMap-backed [`KvBackend`] honoring TTLs and glob patterns, with a
/// switch to simulate an outage.
#[derive(Debug, Default)]
pub struct MockKvBackend {
    entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
    unavailable: AtomicBool,
}

impl MockKvBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the store going down (`true`) or recovering (`false`).
    pub fn set_unavailable(&self, down: bool) {
        self.unavailable.store(down, Ordering::SeqCst);
    }

    /// Number of live (unexpired) keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|(_, expiry)| *expiry > now)
            .count()
    }

    /// Returns `true` when no live keys remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrites a key's expiry, for TTL tests.
    pub fn expire_now(&self, key: &str) {
        if let Some(entry) = self.entries.lock().get_mut(key) {
            entry.1 = Instant::now();
        }
    }

    fn check_available(&self) -> Result<(), KvError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(KvError::ConnectionFailed {
                url: "mock://".to_string(),
                message: "backend marked unavailable".to_string(),
            });
        }
        Ok(())
    }
}

/// Glob match supporting `*` only, which is all the tier emits.
fn glob_match(pattern: &str, key: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == key;
    }

    let mut remainder = key;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match remainder.strip_prefix(part) {
                Some(rest) => remainder = rest,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return remainder.ends_with(part);
        } else {
            match remainder.find(part) {
                Some(pos) => remainder = &remainder[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

#[async_trait]
impl KvBackend for MockKvBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        self.check_available()?;
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some((value, expiry)) if *expiry > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), KvError> {
        self.check_available()?;
        self.entries
            .lock()
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        self.check_available()?;
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn delete_matching(&self, pattern: &str) -> Result<u64, KvError> {
        self.check_available()?;
        let mut entries = self.entries.lock();
        let doomed: Vec<String> = entries
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        for key in &doomed {
            entries.remove(key);
        }
        Ok(doomed.len() as u64)
    }

    async fn ping(&self) -> Result<(), KvError> {
        self.check_available()
    }
}
