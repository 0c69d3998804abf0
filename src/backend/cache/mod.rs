//! Compilation caching
//!
//! Compiled candidates are cached per (computation, device class,
//! configuration) so that a sweep never compiles the same candidate twice
//! in the common case.

mod key;
mod store;

pub use key::{AutotuneCacheKey, CandidateConfig, CompilationKey};
pub use store::{CacheStats, ConcurrentCache};
