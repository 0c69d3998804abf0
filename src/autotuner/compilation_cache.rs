//! Process-wide cache of compiled autotuning candidates

use std::sync::{Arc, LazyLock};

use log::{debug, trace};

use super::CompileOutcome;
use crate::backend::{CacheStats, CompilationKey, ConcurrentCache, Executable};
use crate::error::Result;

/// A cached compilation: the executable, or why there is none
pub type CachedExecutable = CompileOutcome<Arc<dyn Executable>>;

static GLOBAL_CACHE: LazyLock<Arc<CompilationCache>> =
    LazyLock::new(|| Arc::new(CompilationCache::new()));

/// Maps (computation, candidate) to its compilation outcome.
///
/// Skipped outcomes are cached like executables: a candidate that failed
/// to specialize or exhausted device resources is never attempted again
/// until the cache is cleared. Hard errors are not cached.
#[derive(Default)]
pub struct CompilationCache {
    entries: ConcurrentCache<CompilationKey, CachedExecutable>,
}

impl CompilationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cache shared by every engine that was not given its own
    pub fn global() -> Arc<CompilationCache> {
        Arc::clone(&GLOBAL_CACHE)
    }

    /// Return the outcome cached for `key`, compiling it on a miss.
    ///
    /// `compile` runs without the cache lock held, so two threads missing on
    /// the same key may both compile; the first to insert wins and both
    /// receive its outcome.
    pub fn get_or_compile<F>(&self, key: CompilationKey, compile: F) -> Result<CachedExecutable>
    where
        F: FnOnce() -> Result<CachedExecutable>,
    {
        let mut compiled_here = false;
        let outcome = self.entries.get_or_try_insert_with(key.clone(), || {
            compiled_here = true;
            trace!("Compilation cache miss: {key}");
            compile()
        })?;
        if !compiled_here {
            debug!("Compilation cache hit: {key}");
        }
        Ok(outcome)
    }

    pub fn lookup(&self, key: &CompilationKey) -> Option<CachedExecutable> {
        self.entries.lookup(key)
    }

    /// Drop every entry. Executables already handed out stay valid.
    pub fn clear(&self) {
        debug!("Clearing compilation cache ({} entries)", self.entries.len());
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        self.entries.stats()
    }
}
