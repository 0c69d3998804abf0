//! Backend module
//!
//! Interfaces to the collaborators of the engine and the shared plumbing
//! around them.
//!
//! ## Architecture
//!
//! - **Traits**: compiler, module, executable, stream, timer, allocator
//! - **Memory**: non-owning device memory handles and owned result buffers
//! - **Execution**: arguments, run options and outputs of one execution
//! - **Device**: advisory exclusive/shared device leases
//! - **Cache**: cache keys and the concurrent insert-once cache
//! - **Host**: in-process reference backend

pub mod cache;
pub mod device;
pub mod execution;
pub mod host;
pub mod memory;
pub mod traits;

pub use cache::{AutotuneCacheKey, CacheStats, CandidateConfig, CompilationKey, ConcurrentCache};
pub use device::{DeviceLocks, ExclusiveLease, SharedLease};
pub use execution::{ExecutionInput, ExecutionOutput, RunOptions, execution_inputs_from_buffers};
pub use memory::{DeviceMemory, ScopedBuffer};
pub use traits::{
    Compiler, Computation, DeviceAllocator, DeviceTimer, Executable, Module, Stream,
};
