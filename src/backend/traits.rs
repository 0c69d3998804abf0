//! Backend trait definitions
//!
//! The engine never talks to a driver directly. Compilers, streams, timers,
//! allocators and compiled executables are supplied by a backend through the
//! traits below. [`host`](super::host) provides an in-process implementation.

use std::fmt;
use std::time::Duration;

use super::device::{DeviceLocks, ExclusiveLease};
use super::execution::{ExecutionInput, ExecutionOutput, RunOptions};
use super::memory::DeviceMemory;
use crate::config::ModuleConfig;
use crate::error::{BackendError, DeviceError};
use crate::shape::Shape;

/// Device memory allocator
///
/// How memory is carved up is the backend's business; the engine only
/// allocates result buffers through this interface and returns them on drop.
pub trait DeviceAllocator: Send + Sync {
    /// Allocate `size` bytes on the given device
    fn allocate(&self, device_ordinal: usize, size: usize) -> Result<DeviceMemory, DeviceError>;

    /// Return memory obtained from [`allocate`](Self::allocate)
    fn deallocate(&self, device_ordinal: usize, memory: DeviceMemory) -> Result<(), DeviceError>;
}

/// Timer measuring device time on one stream
///
/// The timer starts when it is created by [`Stream::create_timer`].
pub trait DeviceTimer {
    /// Stop the timer and return the elapsed device time.
    ///
    /// Blocks until all work enqueued on the stream before this call has
    /// completed.
    fn elapsed_duration(self: Box<Self>) -> Result<Duration, DeviceError>;
}

/// In-order queue of device work
pub trait Stream: Send + Sync {
    /// Ordinal of the device this stream belongs to
    fn device_ordinal(&self) -> usize;

    /// Enqueue a copy of `size` bytes from `src` to `dst`.
    ///
    /// Completion is ordered with respect to other work on this stream only.
    fn memcpy_device_to_device(
        &self,
        dst: &DeviceMemory,
        src: &DeviceMemory,
        size: usize,
    ) -> Result<(), DeviceError>;

    /// Block the calling thread until every enqueued operation has finished.
    fn block_host_until_done(&self) -> Result<(), DeviceError>;

    /// Start a timer bound to this stream.
    fn create_timer(&self) -> Result<Box<dyn DeviceTimer + '_>, DeviceError>;

    /// Request the advisory exclusive execution window on this device.
    ///
    /// The default implementation uses the process-wide [`DeviceLocks`].
    fn exclusive_lease(&self) -> ExclusiveLease {
        DeviceLocks::global().acquire_exclusive(self.device_ordinal())
    }
}

/// A compiled, executable unit
pub trait Executable: Send + Sync + fmt::Debug {
    /// Name of the module this executable was compiled from
    fn name(&self) -> &str;

    /// Shapes of the entry parameters, in argument order
    fn parameter_shapes(&self) -> &[Shape];

    /// Shape of the root result
    fn result_shape(&self) -> &Shape;

    /// Enqueue execution on `run_options.stream()`.
    ///
    /// Arguments are passed in parameter order. The result buffer is
    /// allocated through `run_options.allocator()` and owned by the returned
    /// output.
    fn execute_on_stream(
        &self,
        run_options: &RunOptions<'_>,
        arguments: Vec<ExecutionInput<'_>>,
    ) -> Result<ExecutionOutput, DeviceError>;
}

/// The computation being tuned, before specialization.
///
/// Only its configuration is consulted: the compile step starts from its
/// debug options.
pub trait Computation {
    fn config(&self) -> &ModuleConfig;
}

/// A specialized module ready to be handed to a [`Compiler`]
pub trait Module: Send {
    fn name(&self) -> &str;

    fn config(&self) -> &ModuleConfig;

    fn config_mut(&mut self) -> &mut ModuleConfig;
}

/// Backend compiler
///
/// Lowers a specialized module into an executable for one device.
pub trait Compiler: Send + Sync {
    type Module: Module;

    /// Compile `module` for the device at `device_ordinal`.
    ///
    /// Returns [`BackendError::ResourceExhausted`] when the module needs more
    /// on-device resources than the device provides.
    fn run_backend(
        &self,
        module: Self::Module,
        device_ordinal: usize,
    ) -> Result<Box<dyn Executable>, BackendError>;
}
