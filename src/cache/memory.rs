//! In-process cache backend.
//!
//! Suitable for single-node deployments, local development and tests. Entries
//! are kept in a bounded LRU; once capacity is reached the least recently used
//! entry is dropped, version counters included.

use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use lru::LruCache;

use super::backend::{BackendError, CacheBackend};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::memory";

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

pub struct MemoryBackend {
    entries: RwLock<LruCache<String, Entry>>,
}

impl MemoryBackend {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    /// Number of stored entries, expired ones included until they are touched.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "get");
        match entries.get(key) {
            None => return Ok(None),
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => {}
        }
        entries.pop(key);
        Ok(None)
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), BackendError> {
        let entry = Entry {
            value: value.to_string(),
            // A deadline past the clock's range never expires.
            expires_at: ttl.and_then(|ttl| Instant::now().checked_add(ttl)),
        };
        rw_write(&self.entries, SOURCE, "set").put(key.to_string(), entry);
        Ok(())
    }

    async fn increment(&self, key: &str) -> Result<i64, BackendError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "increment");

        let (current, expires_at) = match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                let current = entry.value.parse::<i64>().map_err(|_| {
                    BackendError::command("increment", format!("value at `{key}` is not an integer"))
                })?;
                (current, entry.expires_at)
            }
            _ => (0, None),
        };

        let next = current
            .checked_add(1)
            .ok_or_else(|| BackendError::command("increment", "increment would overflow"))?;
        entries.put(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }
}
