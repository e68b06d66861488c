//! Page and text-index cache system
//!
//! In-memory caches with LRU eviction: a dual-limit (entry count + byte
//! budget) cache for rendered pages and derived text indices, and a TTL
//! variant for ephemeral render snapshots.

pub mod lru;
pub mod ttl;

pub use lru::{ByteSized, CacheEntry, CacheStats, LruCache};
pub use ttl::TtlCache;
