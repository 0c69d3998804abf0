//! Harp Autotune: compile-and-profile engine for kernel autotuning
//!
//! Given a computation and a candidate tuning configuration, the engine
//! produces a compiled executable (or learns that the configuration does not
//! apply), runs it once to warm up, then runs it again with the device to
//! itself while measuring elapsed device time.
//!
//! # Architecture
//!
//! - **autotuner**: compilation cache, compile-and-profile engine, sweeps
//! - **backend**: collaborator traits, device memory, leases, cache
//!   primitives and an in-process host backend
//! - **config**: debug options carried by modules
//! - **error**: error types
//! - **shape**: element types and shapes of parameters and results

// ============================================================================
// Core Modules
// ============================================================================

pub mod autotuner;
pub mod backend;
pub mod config;
pub mod error;
pub mod shape;

// ============================================================================
// Re-exports
// ============================================================================

pub use autotuner::{
    AutotunerCompileUtil, CompilationCache, CompileOutcome, HardErrorPolicy, SkipReason, Sweep,
    SweepReport,
};
pub use error::{AutotuneError, Result};

// ============================================================================
// Prelude
// ============================================================================

/// Prelude module with commonly used types and traits
pub mod prelude {
    // Engine
    pub use crate::autotuner::{
        AutotunerCompileUtil, CachedExecutable, CompilationCache, CompileOutcome, HardErrorPolicy,
        SkipReason, Sweep, SweepReport, TrialOutcome, TrialResult,
    };

    // Collaborators
    pub use crate::backend::{
        AutotuneCacheKey, CandidateConfig, Compiler, Computation, DeviceAllocator, DeviceMemory,
        Executable, Module, Stream,
    };

    // Configuration and errors
    pub use crate::config::{DebugOptions, ModuleConfig};
    pub use crate::error::{AutotuneError, BackendError, DeviceError, SpecializationError};

    // Shapes
    pub use crate::shape::{DType, Shape};
}

// ============================================================================
// Tests
// ============================================================================
