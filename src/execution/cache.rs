//! Attribute Cache (spec §4.8): memoizes filter outputs keyed by
//! `(filter_signature, object_identity)` so that reordering the permutation
//! never redoes work already done for an object.
//!
//! Values live in a [`DashMap`] for lock-free concurrent reads; a
//! `parking_lot`-guarded recency queue tracks LRU order for eviction. Stale
//! duplicate keys left behind by repeated inserts are resolved lazily: a
//! recency-queue entry whose key has already been evicted (or superseded)
//! is simply dropped when popped, rather than eagerly deduplicated on every
//! insert.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

/// Identity of an in-flight object, as assigned by the object-store
/// collaborator.
pub type ObjectId = u64;

/// One filter's cached output for one object (spec §4.8: "the score and the
/// set of attributes the filter emitted").
#[derive(Debug, Clone)]
pub struct CachedAttrs {
    pub score: i32,
    pub attrs: HashMap<String, Vec<u8>>,
}

impl CachedAttrs {
    fn size_bytes(&self) -> usize {
        std::mem::size_of::<i32>()
            + self
                .attrs
                .iter()
                .map(|(k, v)| k.len() + v.len())
                .sum::<usize>()
    }
}

/// Snapshot of cache activity, surfaced through `Search.stats` (spec §6).
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub bytes_used: usize,
}

type CacheKey = (u64, ObjectId);

/// Bounded LRU cache of filter evaluation results.
pub struct AttributeCache {
    entries: DashMap<CacheKey, CachedAttrs>,
    recency: Mutex<VecDeque<CacheKey>>,
    bytes_used: AtomicUsize,
    byte_budget: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl AttributeCache {
    pub fn new(byte_budget: usize) -> Self {
        AttributeCache {
            entries: DashMap::new(),
            recency: Mutex::new(VecDeque::new()),
            bytes_used: AtomicUsize::new(0),
            byte_budget,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Look up a cached result (spec §4.7, "Query Attribute Cache").
    pub fn get(&self, filter_signature: u64, object_id: ObjectId) -> Option<CachedAttrs> {
        let key = (filter_signature, object_id);
        match self.entries.get(&key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a filter's result, then evict least-recently-used entries
    /// until the cache is back under budget.
    pub fn insert(&self, filter_signature: u64, object_id: ObjectId, value: CachedAttrs) {
        let key = (filter_signature, object_id);
        let size = value.size_bytes();
        if let Some(previous) = self.entries.insert(key, value) {
            self.bytes_used.fetch_sub(previous.size_bytes(), Ordering::Relaxed);
        }
        self.bytes_used.fetch_add(size, Ordering::Relaxed);
        self.recency.lock().push_back(key);
        self.evict_if_needed();
    }

    fn evict_if_needed(&self) {
        let mut recency = self.recency.lock();
        while self.bytes_used.load(Ordering::Relaxed) > self.byte_budget {
            let Some(key) = recency.pop_front() else {
                break;
            };
            if let Some((_, removed)) = self.entries.remove(&key) {
                self.bytes_used.fetch_sub(removed.size_bytes(), Ordering::Relaxed);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            bytes_used: self.bytes_used.load(Ordering::Relaxed),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
