//! Concurrent insert-once cache
//!
//! A mutex-guarded map whose critical sections are a single lookup or a
//! single insert. Values are computed outside the lock, so two threads that
//! miss on the same key at the same time both compute it; the first insert
//! wins and the later result is dropped. Computations stored here must be
//! deterministic in their key for that to be harmless.

use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::debug;
use rustc_hash::FxHashMap;

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the map
    pub hits: usize,
    /// Lookups that found nothing
    pub misses: usize,
    /// Values inserted
    pub inserts: usize,
    /// Inserts that lost against a concurrent insert of the same key
    pub races: usize,
    /// Current number of entries
    pub entries: usize,
}

impl CacheStats {
    /// Calculate hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Inner<K, V> {
    map: FxHashMap<K, V>,
    stats: CacheStats,
}

/// Map from `K` to `V` shared between threads, filled at most once per key
/// until cleared.
pub struct ConcurrentCache<K, V> {
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> Default for ConcurrentCache<K, V> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner {
                map: FxHashMap::default(),
                stats: CacheStats::default(),
            }),
        }
    }
}

impl<K, V> ConcurrentCache<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    /// Create a new empty cache
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        // Every critical section is a single map operation, so a panic while
        // holding the lock cannot leave the map half-updated.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up a key
    pub fn lookup(&self, key: &K) -> Option<V> {
        let mut inner = self.lock();
        match inner.map.get(key).cloned() {
            Some(value) => {
                inner.stats.hits += 1;
                Some(value)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Insert `value` unless the key is already present.
    ///
    /// Returns the value stored under the key afterwards: `value` itself, or
    /// the one inserted earlier.
    pub fn insert_if_absent(&self, key: K, value: V) -> V {
        let mut inner = self.lock();
        if let Some(existing) = inner.map.get(&key) {
            let existing = existing.clone();
            inner.stats.races += 1;
            debug!("Concurrent insert lost; keeping the existing entry");
            return existing;
        }
        inner.map.insert(key, value.clone());
        inner.stats.inserts += 1;
        inner.stats.entries = inner.map.len();
        value
    }

    /// Return the cached value for `key`, computing and inserting it on a
    /// miss.
    ///
    /// `compute` runs without the lock held. If it fails nothing is stored
    /// and the error is returned. If another thread inserted the key while
    /// `compute` ran, that entry wins and is returned instead.
    pub fn get_or_try_insert_with<E, F>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.lookup(&key) {
            return Ok(value);
        }
        let value = compute()?;
        Ok(self.insert_if_absent(key, value))
    }

    /// Remove every entry
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.map.clear();
        inner.stats.entries = 0;
    }

    /// Get number of cached entries
    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the statistics
    pub fn stats(&self) -> CacheStats {
        self.lock().stats.clone()
    }

    /// Reset statistics (entry count is kept)
    pub fn reset_stats(&self) {
        let mut inner = self.lock();
        let entries = inner.map.len();
        inner.stats = CacheStats {
            entries,
            ..CacheStats::default()
        };
    }
}
