//! TTL cache for ephemeral render snapshots
//!
//! Wraps the LRU cache with a fixed entry lifetime: entries past the TTL
//! are expired on read regardless of how recently they were accessed.

use crate::lru::{ByteSized, CacheStats, LruCache};
use std::hash::Hash;
use std::time::Duration;

/// LRU cache whose entries additionally expire after a fixed lifetime
#[derive(Debug)]
pub struct TtlCache<K, V> {
    inner: LruCache<K, V>,
    ttl: Duration,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: ByteSized + Clone,
{
    pub fn new(max_entries: usize, max_bytes: usize, ttl: Duration) -> Self {
        Self {
            inner: LruCache::new(max_entries, max_bytes),
            ttl,
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.inner.insert(key, value);
    }

    /// Retrieve a value, expiring it first if it has outlived the TTL
    pub fn get(&mut self, key: &K) -> Option<V> {
        if let Some(entry) = self.inner.peek_entry(key) {
            if entry.timestamp.elapsed() > self.ttl {
                self.inner.remove(key);
                return None;
            }
        }
        self.inner.get(key)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.remove(key)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }
}
