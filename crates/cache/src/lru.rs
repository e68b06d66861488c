//! LRU cache with dual limits
//!
//! Provides in-memory caching with automatic eviction when either the
//! entry-count limit or the total byte budget is exceeded.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::time::Instant;

/// Byte-size estimation for cached values
///
/// The cache tracks a byte budget in addition to an entry count, so every
/// cached value must report an estimate of its in-memory size.
pub trait ByteSized {
    fn byte_size(&self) -> usize;
}

impl ByteSized for Vec<u8> {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

impl ByteSized for String {
    fn byte_size(&self) -> usize {
        self.len()
    }
}

impl<T: ByteSized> ByteSized for Vec<T> {
    fn byte_size(&self) -> usize {
        self.iter().map(ByteSized::byte_size).sum()
    }
}

/// A single cached value with its bookkeeping
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    /// The cached value
    pub data: T,

    /// When this entry was inserted
    pub timestamp: Instant,

    /// Number of times this entry has been read
    pub access_count: u64,

    /// Logical clock value of the most recent read (0 = never read)
    pub last_accessed: u64,

    /// Byte-size estimate recorded at insertion
    pub size: usize,
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of entries currently in the cache
    pub entries: usize,

    /// Total estimated bytes held
    pub bytes_used: usize,

    /// Configured entry-count limit
    pub max_entries: usize,

    /// Configured byte budget
    pub max_bytes: usize,

    /// Number of cache hits
    pub hits: u64,

    /// Number of cache misses
    pub misses: u64,

    /// Number of entries evicted to stay within limits
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// LRU cache with an entry-count limit and a byte budget
///
/// Eviction picks the entry with the lowest last-access time; entries that
/// have never been read tie at zero and fall out in insertion order. Both
/// limits are enforced before every insert, count first, so the cache never
/// exceeds either one.
#[derive(Debug)]
pub struct LruCache<K, V> {
    entries: HashMap<K, CacheEntry<V>>,

    /// Keys in insertion order, oldest at the front. May contain keys that
    /// were since removed; stale keys are skipped during eviction.
    insertion_order: VecDeque<K>,

    /// Logical clock, incremented on every read
    tick: u64,

    bytes_used: usize,
    max_entries: usize,
    max_bytes: usize,
    stats: CacheStats,
}

impl<K, V> LruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: ByteSized + Clone,
{
    /// Create a cache with the given entry-count limit and byte budget
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            insertion_order: VecDeque::new(),
            tick: 0,
            bytes_used: 0,
            max_entries,
            max_bytes,
            stats: CacheStats {
                max_entries,
                max_bytes,
                ..Default::default()
            },
        }
    }

    /// Insert a value, evicting as needed to respect both limits
    ///
    /// An existing entry under the same key is replaced without counting as
    /// an eviction.
    pub fn insert(&mut self, key: K, value: V) {
        let size = value.byte_size();

        // A value bigger than the whole budget can never fit; inserting it
        // would evict everything and still blow the limit.
        if size > self.max_bytes {
            log::debug!("cache refused oversized entry ({size} bytes)");
            return;
        }

        if let Some(old) = self.entries.remove(&key) {
            self.bytes_used = self.bytes_used.saturating_sub(old.size);
            self.insertion_order.retain(|k| k != &key);
        }

        // Count limit first, then the byte budget.
        while self.entries.len() >= self.max_entries && !self.entries.is_empty() {
            if !self.evict_one() {
                break;
            }
        }
        while self.bytes_used + size > self.max_bytes && !self.entries.is_empty() {
            if !self.evict_one() {
                break;
            }
        }

        self.entries.insert(
            key.clone(),
            CacheEntry {
                data: value,
                timestamp: Instant::now(),
                access_count: 0,
                last_accessed: 0,
                size,
            },
        );
        self.insertion_order.push_back(key);
        self.bytes_used += size;
        self.sync_stats();
    }

    /// Retrieve a value, updating recency tracking
    pub fn get(&mut self, key: &K) -> Option<V> {
        self.tick += 1;
        let tick = self.tick;

        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.access_count += 1;
                entry.last_accessed = tick;
                self.stats.hits += 1;
                Some(entry.data.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Look at an entry's bookkeeping without touching recency
    pub fn peek_entry(&self, key: &K) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    /// Remove a single entry
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let entry = self.entries.remove(key)?;
        self.bytes_used = self.bytes_used.saturating_sub(entry.size);
        self.insertion_order.retain(|k| k != key);
        self.sync_stats();
        Some(entry.data)
    }

    /// Remove every entry whose key fails the predicate
    ///
    /// Used for revision-based invalidation: drop everything derived from a
    /// stale document revision in one pass.
    pub fn retain<F: FnMut(&K) -> bool>(&mut self, mut keep: F) {
        let mut removed_bytes = 0;
        self.entries.retain(|k, entry| {
            if keep(k) {
                true
            } else {
                removed_bytes += entry.size;
                false
            }
        });
        self.bytes_used = self.bytes_used.saturating_sub(removed_bytes);
        let entries = &self.entries;
        self.insertion_order.retain(|k| entries.contains_key(k));
        self.sync_stats();
    }

    /// Drop all entries
    pub fn clear(&mut self) {
        self.entries.clear();
        self.insertion_order.clear();
        self.bytes_used = 0;
        self.sync_stats();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Evict the least-recently-accessed entry
    ///
    /// Ties on last-access break by insertion order: the insertion queue is
    /// scanned oldest-first and a strictly smaller access time is required
    /// to displace the current candidate.
    fn evict_one(&mut self) -> bool {
        let mut victim: Option<(K, u64)> = None;

        for key in &self.insertion_order {
            let Some(entry) = self.entries.get(key) else {
                continue;
            };
            match &victim {
                Some((_, best)) if entry.last_accessed >= *best => {}
                _ => victim = Some((key.clone(), entry.last_accessed)),
            }
        }

        let Some((key, _)) = victim else {
            return false;
        };

        if let Some(entry) = self.entries.remove(&key) {
            self.bytes_used = self.bytes_used.saturating_sub(entry.size);
            self.stats.evictions += 1;
            log::debug!("cache evicted entry ({} bytes)", entry.size);
        }
        self.insertion_order.retain(|k| k != &key);
        self.sync_stats();
        true
    }

    fn sync_stats(&mut self) {
        self.stats.entries = self.entries.len();
        self.stats.bytes_used = self.bytes_used;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(max_entries: usize, max_bytes: usize) -> LruCache<u32, Vec<u8>> {
        LruCache::new(max_entries, max_bytes)
    }

    #[test]
    fn test_insert_and_get() {
        let mut c = cache(4, 1024);
        c.insert(1, vec![1, 2, 3]);

        assert_eq!(c.get(&1), Some(vec![1, 2, 3]));
        assert_eq!(c.get(&2), None);
        assert_eq!(c.stats().hits, 1);
        assert_eq!(c.stats().misses, 1);
    }

    #[test]
    fn test_count_limit_never_exceeded() {
        let mut c = cache(3, 1024);
        for key in 0..4 {
            c.insert(key, vec![0u8; 8]);
        }

        assert_eq!(c.len(), 3);
        assert_eq!(c.stats().evictions, 1);
    }

    #[test]
    fn test_never_accessed_entries_evict_in_insertion_order() {
        let mut c = cache(3, 1024);
        c.insert(0, vec![0u8; 8]);
        c.insert(1, vec![0u8; 8]);
        c.insert(2, vec![0u8; 8]);
        c.insert(3, vec![0u8; 8]);

        assert!(!c.contains_key(&0));
        assert!(c.contains_key(&1));
        assert!(c.contains_key(&2));
        assert!(c.contains_key(&3));
    }

    #[test]
    fn test_accessed_entry_survives_eviction() {
        let mut c = cache(3, 1024);
        c.insert(0, vec![0u8; 8]);
        c.insert(1, vec![0u8; 8]);
        c.insert(2, vec![0u8; 8]);

        // Touch the oldest entry, then push past the limit. The untouched
        // key 1 is now the least recently accessed and must go instead.
        assert!(c.get(&0).is_some());
        c.insert(3, vec![0u8; 8]);

        assert_eq!(c.len(), 3);
        assert!(c.contains_key(&0));
        assert!(!c.contains_key(&1));
    }

    #[test]
    fn test_byte_budget_evicts_until_fit() {
        let mut c = cache(16, 100);
        c.insert(1, vec![0u8; 40]);
        c.insert(2, vec![0u8; 40]);
        c.insert(3, vec![0u8; 40]);

        assert!(c.stats().bytes_used <= 100);
        assert!(!c.contains_key(&1));
        assert!(c.contains_key(&2));
        assert!(c.contains_key(&3));
    }

    #[test]
    fn test_replacing_entry_updates_bytes() {
        let mut c = cache(4, 1024);
        c.insert(1, vec![0u8; 100]);
        c.insert(1, vec![0u8; 10]);

        assert_eq!(c.len(), 1);
        assert_eq!(c.stats().bytes_used, 10);
        assert_eq!(c.stats().evictions, 0);
    }

    #[test]
    fn test_remove() {
        let mut c = cache(4, 1024);
        c.insert(1, vec![1]);

        assert_eq!(c.remove(&1), Some(vec![1]));
        assert_eq!(c.remove(&1), None);
        assert_eq!(c.stats().bytes_used, 0);
    }

    #[test]
    fn test_retain_drops_stale_keys() {
        let mut c = cache(8, 1024);
        for key in 0..6 {
            c.insert(key, vec![0u8; 4]);
        }

        c.retain(|k| *k % 2 == 0);

        assert_eq!(c.len(), 3);
        assert!(c.contains_key(&0));
        assert!(!c.contains_key(&1));
        assert_eq!(c.stats().bytes_used, 12);
    }

    #[test]
    fn test_entry_bookkeeping() {
        let mut c = cache(4, 1024);
        c.insert(1, vec![0u8; 7]);

        let entry = c.peek_entry(&1).unwrap();
        assert_eq!(entry.size, 7);
        assert_eq!(entry.access_count, 0);
        assert_eq!(entry.last_accessed, 0);

        c.get(&1);
        c.get(&1);
        let entry = c.peek_entry(&1).unwrap();
        assert_eq!(entry.access_count, 2);
        assert!(entry.last_accessed > 0);
    }

    #[test]
    fn test_oversized_entry_refused() {
        let mut c = cache(4, 100);
        c.insert(1, vec![0u8; 50]);
        c.insert(2, vec![0u8; 500]);

        assert!(!c.contains_key(&2));
        assert!(c.contains_key(&1));
    }

    #[test]
    fn test_clear() {
        let mut c = cache(4, 1024);
        c.insert(1, vec![1]);
        c.insert(2, vec![2]);

        c.clear();

        assert!(c.is_empty());
        assert_eq!(c.stats().bytes_used, 0);
    }

    #[test]
    fn test_randomized_churn_respects_limits() {
        use rand::Rng;

        let mut rng = rand::thread_rng();
        let mut c = cache(16, 2048);

        for _ in 0..2000 {
            let key: u32 = rng.gen_range(0..64);
            if rng.gen_bool(0.5) {
                let len = rng.gen_range(0..256);
                c.insert(key, vec![0u8; len]);
            } else {
                c.get(&key);
            }

            assert!(c.len() <= 16);
            assert!(c.stats().bytes_used <= 2048);
        }
    }
}
