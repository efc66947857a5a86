//! The lookup cache for recently-seen `(host, method, path)` triples (spec
//! §3 "Cache entry", §4.5 "Cache insertion discipline", §5 "Cache
//! concurrency").
//!
//! Backed by a sharded `lru::LruCache`, grounded on the teacher's
//! `ShardedLruCache` in `app/gateway_fast.rs` — sharding by key hash keeps
//! contention low under concurrent `get`/`put` without requiring the whole
//! cache to be lock-free. Unlike the teacher's cache, this one lives inside
//! the [`crate::mux::snapshot::Snapshot`] it was built for and is dropped
//! with it, which is how the spec's "reload is the invalidation" (§3 I3, §5)
//! is satisfied: there is no separate invalidation protocol to get wrong.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use lru::LruCache;

use super::ipfilter::IpFilterChain;
use super::path::PathDescriptor;

/// The outcome a cache entry (or its freshly computed equivalent) represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Match,
    MethodNotAllowed,
    NotFound,
}

/// One cached routing decision. Bounded by the lifetime of the snapshot that
/// produced it (spec I3).
pub struct CacheEntry {
    pub kind: CacheKind,
    pub path: Option<Arc<PathDescriptor>>,
    pub ip_filter_chain: Option<IpFilterChain>,
    cached: AtomicBool,
}

impl CacheEntry {
    pub fn new(kind: CacheKind, path: Option<Arc<PathDescriptor>>, ip_filter_chain: Option<IpFilterChain>) -> Self {
        Self {
            kind,
            path,
            ip_filter_chain,
            cached: AtomicBool::new(false),
        }
    }

    /// Marks this entry as having been inserted into the cache, returning
    /// `true` the first time (spec "Setting cached_flag ... prevents
    /// repeated insertion of the same in-memory entry"). Racing callers see
    /// at most one `true`.
    pub fn mark_cached(&self) -> bool {
        self.cached
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

const SHARDS: usize = 16;

struct Shard {
    lru: RwLock<LruCache<String, Arc<CacheEntry>>>,
}

/// Concurrent, sharded, bounded-capacity route cache.
pub struct RouteCache {
    shards: Vec<Shard>,
}

impl RouteCache {
    /// `capacity` is the total number of entries across all shards; each
    /// shard gets an even share (minimum 1), matching the teacher's
    /// per-shard sizing in `ShardedLruCache::new`.
    pub fn new(capacity: usize) -> Self {
        let per_shard = (capacity / SHARDS).max(1);
        let cap = NonZeroUsize::new(per_shard).expect("per-shard capacity is at least 1");
        let shards = (0..SHARDS)
            .map(|_| Shard {
                lru: RwLock::new(LruCache::new(cap)),
            })
            .collect();
        Self { shards }
    }

    fn shard_for(&self, key: &str) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARDS]
    }

    /// Builds the cache key for a request: `host | method | path` (spec
    /// §4.2 "Cache probe"). Headers and source IP are deliberately excluded
    /// (spec §9 "Cache key").
    pub fn key(host: &str, method: &str, path: &str) -> String {
        let mut k = String::with_capacity(host.len() + method.len() + path.len() + 2);
        k.push_str(host);
        k.push('|');
        k.push_str(method);
        k.push('|');
        k.push_str(path);
        k
    }

    pub fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        match self.shard_for(key).lru.read() {
            Ok(shard) => shard.peek(key).cloned(),
            Err(e) => {
                log::error!("route cache: read lock poisoned: {e}");
                None
            }
        }
    }

    /// Overwrites are permitted under concurrent writers; last writer wins
    /// (spec §5 "Cache concurrency").
    pub fn put(&self, key: String, entry: Arc<CacheEntry>) {
        match self.shard_for(&key).lru.write() {
            Ok(mut shard) => {
                shard.put(key, entry);
            }
            Err(e) => {
                log::error!("route cache: write lock poisoned: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let cache = RouteCache::new(32);
        let key = RouteCache::key("a.example:8080", "GET", "/x");
        let entry = Arc::new(CacheEntry::new(CacheKind::NotFound, None, None));
        cache.put(key.clone(), entry);
        assert!(cache.get(&key).is_some());
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn mark_cached_is_idempotent_under_race() {
        let entry = CacheEntry::new(CacheKind::NotFound, None, None);
        assert!(entry.mark_cached());
        assert!(!entry.mark_cached());
    }

    #[test]
    fn eviction_respects_small_capacity() {
        let cache = RouteCache::new(SHARDS); // 1 slot per shard
        for i in 0..100 {
            let key = format!("host|GET|/p{i}");
            cache.put(key, Arc::new(CacheEntry::new(CacheKind::NotFound, None, None)));
        }
        // No panics, and the structure remains queryable.
        assert!(cache.get("host|GET|/p99").is_some());
    }
}
