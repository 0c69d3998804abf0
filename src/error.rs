//! Error types for the compile-and-profile engine
//!
//! Expected outcomes (an inapplicable configuration, a backend running out of
//! on-device resources) are not errors here: they surface as
//! [`CompileOutcome::Skipped`](crate::autotuner::CompileOutcome::Skipped).
//! Everything in this module is a hard failure.

use thiserror::Error;

/// Errors reported by a backend compiler
#[derive(Debug, Error)]
pub enum BackendError {
    /// The chosen configuration needs more on-device memory (shared memory,
    /// scratch, registers) than the target provides.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Lowering or code generation failed
    #[error("Compilation failed: {0}")]
    Compilation(String),

    /// The module uses something this backend cannot express
    #[error("Unsupported by backend: {0}")]
    Unsupported(String),
}

/// Errors reported by the device layer (streams, timers, memory)
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Kernel execution failed
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Device memory allocation failed
    #[error("Allocation of {size} bytes on device {ordinal} failed: {reason}")]
    Allocation {
        ordinal: usize,
        size: usize,
        reason: String,
    },

    /// A handle does not refer to live memory on this device
    #[error("Invalid device memory handle {0:#x}")]
    InvalidHandle(u64),

    /// A copy was enqueued with an inconsistent size
    #[error("Memcpy of {size} bytes does not fit (src={src_size}, dst={dst_size})")]
    CopyOutOfBounds {
        size: usize,
        src_size: usize,
        dst_size: usize,
    },

    /// Waiting for the stream to drain failed
    #[error("Stream synchronization failed: {0}")]
    Synchronization(String),

    /// The device timer could not be created or read
    #[error("Timer error: {0}")]
    Timer(String),
}

/// Errors returned by a caller-supplied specialization function
#[derive(Debug, Error)]
pub enum SpecializationError {
    /// The candidate configuration cannot be applied to this computation.
    /// This is an expected outcome during a sweep.
    #[error("Incompatible configuration: {0}")]
    Incompatible(String),

    /// Any other failure while rewriting the computation
    #[error("Specialization failed: {0}")]
    Failed(String),
}

/// Hard errors from a compile-and-profile call
#[derive(Debug, Error)]
pub enum AutotuneError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Device(#[from] DeviceError),

    /// The specialization function failed for a reason other than an
    /// incompatible configuration.
    #[error("Specialization failed: {0}")]
    Specialization(String),
}

/// Result alias for engine operations
pub type Result<T, E = AutotuneError> = std::result::Result<T, E>;
