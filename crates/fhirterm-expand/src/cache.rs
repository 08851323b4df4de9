//! LRU caches shared across expansions.
//!
//! Keys always carry the snapshot the value was read from, so entries written
//! before a closure rebuild are never served to readers of the new index.
//! Thread-safe using `parking_lot::Mutex` for LRU operations.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;

use fhirterm_closure::ClosureRecord;
use fhirterm_types::{ConceptId, ConceptSet};
use lru::LruCache;
use parking_lot::Mutex;

use crate::config::CacheConfig;
use crate::traits::PropertyFilter;

/// Statistics about a cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently held.
    pub entries: usize,
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that missed.
    pub misses: u64,
}

struct Inner<K: Hash + Eq, V> {
    lru: LruCache<K, V>,
    hits: u64,
    misses: u64,
}

struct SharedLru<K: Hash + Eq, V> {
    inner: Mutex<Inner<K, V>>,
}

impl<K: Hash + Eq, V: Clone> SharedLru<K, V> {
    fn new(config: &CacheConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                lru: LruCache::new(capacity),
                hits: 0,
                misses: 0,
            }),
        }
    }

    fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.lock();
        match inner.lru.get(key).cloned() {
            Some(value) => {
                inner.hits += 1;
                Some(value)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    fn put(&self, key: K, value: V) {
        self.inner.lock().lru.put(key, value);
    }

    fn clear(&self) {
        self.inner.lock().lru.clear();
    }

    fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.lru.len(),
            hits: inner.hits,
            misses: inner.misses,
        }
    }
}

/// Decoded closure records keyed by (index generation, concept id).
pub struct RecordCache {
    lru: SharedLru<(u64, ConceptId), Arc<ClosureRecord>>,
}

impl RecordCache {
    /// Creates a cache holding at most `config.max_entries` records.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            lru: SharedLru::new(config),
        }
    }

    /// Record of `concept_id` as read from index generation `generation`.
    pub fn get(&self, generation: u64, concept_id: ConceptId) -> Option<Arc<ClosureRecord>> {
        self.lru.get(&(generation, concept_id))
    }

    /// Stores a record read from index generation `generation`.
    pub fn put(&self, generation: u64, record: Arc<ClosureRecord>) {
        self.lru.put((generation, record.concept_id), record);
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.lru.clear();
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.lru.stats()
    }
}

impl std::fmt::Debug for RecordCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCache")
            .field("stats", &self.stats())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct FilterKey {
    system: String,
    snapshot: u64,
    filter: PropertyFilter,
}

/// Results of attribute filters keyed by (system, snapshot, filter).
pub struct FilterCache {
    lru: SharedLru<FilterKey, Arc<ConceptSet>>,
}

impl FilterCache {
    /// Creates a cache holding at most `config.max_entries` filter results.
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            lru: SharedLru::new(config),
        }
    }

    /// Cached result of `filter` on `system` at `snapshot`.
    pub fn get(
        &self,
        system: &str,
        snapshot: u64,
        filter: &PropertyFilter,
    ) -> Option<Arc<ConceptSet>> {
        self.lru.get(&FilterKey {
            system: system.to_string(),
            snapshot,
            filter: filter.clone(),
        })
    }

    /// Stores the result of `filter` on `system` at `snapshot`.
    pub fn put(&self, system: &str, snapshot: u64, filter: &PropertyFilter, result: Arc<ConceptSet>) {
        self.lru.put(
            FilterKey {
                system: system.to_string(),
                snapshot,
                filter: filter.clone(),
            },
            result,
        );
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.lru.clear();
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.lru.stats()
    }
}

impl std::fmt::Debug for FilterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterCache")
            .field("stats", &self.stats())
            .finish()
    }
}
