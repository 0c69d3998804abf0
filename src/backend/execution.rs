//! Arguments, options and results of a single execution.

use std::sync::Arc;

use super::device::ExclusiveLease;
use super::memory::{DeviceMemory, ScopedBuffer};
use super::traits::{DeviceAllocator, Executable, Stream};
use crate::shape::Shape;

/// One argument of an execution
///
/// The buffer is borrowed from the caller: an input never outlives the call
/// that built it and never frees the memory.
#[derive(Debug)]
pub struct ExecutionInput<'a> {
    shape: Shape,
    buffer: &'a DeviceMemory,
}

impl<'a> ExecutionInput<'a> {
    /// Bind `buffer` to a parameter of the given shape without taking ownership
    pub fn unowned(shape: Shape, buffer: &'a DeviceMemory) -> Self {
        Self { shape, buffer }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn buffer(&self) -> &DeviceMemory {
        self.buffer
    }
}

/// Bind caller-owned buffers to the parameters of `executable`.
///
/// # Panics
///
/// Panics if the number of buffers differs from the number of parameters.
/// That is a bug in the caller, not a runtime condition.
pub fn execution_inputs_from_buffers<'a>(
    executable: &dyn Executable,
    buffers: &'a [DeviceMemory],
) -> Vec<ExecutionInput<'a>> {
    let params = executable.parameter_shapes();
    assert_eq!(
        params.len(),
        buffers.len(),
        "executable `{}` expects {} parameters, got {} buffers",
        executable.name(),
        params.len(),
        buffers.len()
    );

    // Executables compiled for autotuning have no input-output aliasing, so
    // the caller's buffers can be passed unowned.
    params
        .iter()
        .zip(buffers)
        .map(|(shape, buffer)| ExecutionInput::unowned(shape.clone(), buffer))
        .collect()
}

/// Result of one execution; owns the result buffer.
#[derive(Debug)]
pub struct ExecutionOutput {
    result: ScopedBuffer,
}

impl ExecutionOutput {
    pub fn new(result: ScopedBuffer) -> Self {
        Self { result }
    }

    pub fn result(&self) -> &ScopedBuffer {
        &self.result
    }

    /// Take ownership of the result buffer
    pub fn consume_result(self) -> ScopedBuffer {
        self.result
    }
}

/// Options an executable is run with
pub struct RunOptions<'a> {
    device_ordinal: usize,
    stream: &'a dyn Stream,
    allocator: &'a Arc<dyn DeviceAllocator>,
    exclusive_lease: Option<&'a ExclusiveLease>,
}

impl<'a> RunOptions<'a> {
    pub fn new(
        device_ordinal: usize,
        stream: &'a dyn Stream,
        allocator: &'a Arc<dyn DeviceAllocator>,
    ) -> Self {
        Self {
            device_ordinal,
            stream,
            allocator,
            exclusive_lease: None,
        }
    }

    /// Run while holding the exclusive execution window of the device
    pub fn with_exclusive_lease(mut self, lease: &'a ExclusiveLease) -> Self {
        self.exclusive_lease = Some(lease);
        self
    }

    pub fn device_ordinal(&self) -> usize {
        self.device_ordinal
    }

    pub fn stream(&self) -> &'a dyn Stream {
        self.stream
    }

    pub fn allocator(&self) -> &'a Arc<dyn DeviceAllocator> {
        self.allocator
    }

    /// True when the caller holds the exclusive window and nothing else
    /// should run on the device meanwhile.
    pub fn requires_exclusive_lock_on_device(&self) -> bool {
        self.exclusive_lease.is_some()
    }

    pub fn exclusive_lease(&self) -> Option<&'a ExclusiveLease> {
        self.exclusive_lease
    }
}
