//! In-process host backend
//!
//! A reference implementation of every backend trait that runs on the
//! calling thread. Device memory is a byte store keyed by opaque handles,
//! streams complete work as soon as it is enqueued, and kernels are plain
//! closures over byte slices. It is used to exercise the engine without a
//! GPU.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::trace;
use rustc_hash::FxHashMap;

use super::device::DeviceLocks;
use super::execution::{ExecutionInput, ExecutionOutput, RunOptions};
use super::memory::{DeviceMemory, ScopedBuffer};
use super::traits::{
    Compiler, Computation, DeviceAllocator, DeviceTimer, Executable, Module, Stream,
};
use crate::config::ModuleConfig;
use crate::error::{BackendError, DeviceError};
use crate::shape::Shape;

/// Scratch memory available to one host kernel (mirrors a 48 KiB shared
/// memory budget)
pub const DEFAULT_SCRATCH_LIMIT: usize = 48 * 1024;

const HANDLE_BASE: u64 = 0x1000;

/// Kernel body: receives the argument bytes in parameter order and returns
/// the result bytes.
pub type HostKernel = Arc<dyn Fn(&[Vec<u8>]) -> Vec<u8> + Send + Sync>;

// ============================================================================
// Device memory
// ============================================================================

/// Host "device": allocator and backing store for device memory handles
pub struct HostDevice {
    ordinal: usize,
    memory: Mutex<FxHashMap<u64, Vec<u8>>>,
    next_handle: AtomicU64,
}

impl HostDevice {
    /// Create device 0
    pub fn new() -> Arc<Self> {
        Self::with_ordinal(0)
    }

    pub fn with_ordinal(ordinal: usize) -> Arc<Self> {
        Arc::new(Self {
            ordinal,
            memory: Mutex::new(FxHashMap::default()),
            next_handle: AtomicU64::new(HANDLE_BASE),
        })
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    fn memory(&self) -> MutexGuard<'_, FxHashMap<u64, Vec<u8>>> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate a buffer initialised with `data`
    pub fn upload(&self, data: &[u8]) -> Result<DeviceMemory, DeviceError> {
        let memory = self.allocate(self.ordinal, data.len())?;
        self.write(&memory, data)?;
        Ok(memory)
    }

    /// Overwrite the start of `memory` with `data`
    pub fn write(&self, memory: &DeviceMemory, data: &[u8]) -> Result<(), DeviceError> {
        let mut store = self.memory();
        let bytes = store
            .get_mut(&memory.opaque())
            .ok_or(DeviceError::InvalidHandle(memory.opaque()))?;
        if data.len() > bytes.len() {
            return Err(DeviceError::CopyOutOfBounds {
                size: data.len(),
                src_size: data.len(),
                dst_size: bytes.len(),
            });
        }
        bytes[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Read the full contents of `memory`
    pub fn read(&self, memory: &DeviceMemory) -> Result<Vec<u8>, DeviceError> {
        self.memory()
            .get(&memory.opaque())
            .cloned()
            .ok_or(DeviceError::InvalidHandle(memory.opaque()))
    }

    /// Number of allocations not yet returned
    pub fn live_allocations(&self) -> usize {
        self.memory().len()
    }
}

impl DeviceAllocator for HostDevice {
    fn allocate(&self, device_ordinal: usize, size: usize) -> Result<DeviceMemory, DeviceError> {
        if device_ordinal != self.ordinal {
            return Err(DeviceError::Allocation {
                ordinal: device_ordinal,
                size,
                reason: format!("host device has ordinal {}", self.ordinal),
            });
        }
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.memory().insert(handle, vec![0; size]);
        Ok(DeviceMemory::new(handle, size))
    }

    fn deallocate(&self, _device_ordinal: usize, memory: DeviceMemory) -> Result<(), DeviceError> {
        self.memory()
            .remove(&memory.opaque())
            .map(|_| ())
            .ok_or(DeviceError::InvalidHandle(memory.opaque()))
    }
}

impl fmt::Debug for HostDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostDevice")
            .field("ordinal", &self.ordinal)
            .field("live_allocations", &self.live_allocations())
            .finish()
    }
}

// ============================================================================
// Stream and timer
// ============================================================================

/// Stream on a [`HostDevice`]. Work completes when it is enqueued.
#[derive(Debug)]
pub struct HostStream {
    device: Arc<HostDevice>,
    copies: AtomicUsize,
    syncs: AtomicUsize,
    timers: AtomicUsize,
}

impl HostStream {
    pub fn new(device: Arc<HostDevice>) -> Self {
        Self {
            device,
            copies: AtomicUsize::new(0),
            syncs: AtomicUsize::new(0),
            timers: AtomicUsize::new(0),
        }
    }

    pub fn device(&self) -> &Arc<HostDevice> {
        &self.device
    }

    /// Copies enqueued so far
    pub fn copies(&self) -> usize {
        self.copies.load(Ordering::SeqCst)
    }

    /// Host synchronizations so far
    pub fn syncs(&self) -> usize {
        self.syncs.load(Ordering::SeqCst)
    }

    /// Timers created so far
    pub fn timers(&self) -> usize {
        self.timers.load(Ordering::SeqCst)
    }
}

impl Stream for HostStream {
    fn device_ordinal(&self) -> usize {
        self.device.ordinal()
    }

    fn memcpy_device_to_device(
        &self,
        dst: &DeviceMemory,
        src: &DeviceMemory,
        size: usize,
    ) -> Result<(), DeviceError> {
        if size > src.size() || size > dst.size() {
            return Err(DeviceError::CopyOutOfBounds {
                size,
                src_size: src.size(),
                dst_size: dst.size(),
            });
        }
        let bytes = self.device.read(src)?;
        self.device.write(dst, &bytes[..size])?;
        self.copies.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn block_host_until_done(&self) -> Result<(), DeviceError> {
        self.syncs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn create_timer(&self) -> Result<Box<dyn DeviceTimer + '_>, DeviceError> {
        self.timers.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(HostTimer {
            stream: self,
            start: Instant::now(),
        }))
    }
}

/// Wall-clock timer bound to a [`HostStream`]
pub struct HostTimer<'a> {
    stream: &'a HostStream,
    start: Instant,
}

impl DeviceTimer for HostTimer<'_> {
    fn elapsed_duration(self: Box<Self>) -> Result<Duration, DeviceError> {
        self.stream.block_host_until_done()?;
        // Host clocks can be coarser than a tiny kernel; report at least one tick.
        Ok(self.start.elapsed().max(Duration::from_nanos(1)))
    }
}

// ============================================================================
// Modules, compiler, executables
// ============================================================================

/// A host computation: shapes plus a kernel closure
#[derive(Clone)]
pub struct HostModule {
    name: String,
    config: ModuleConfig,
    parameters: Vec<Shape>,
    result: Shape,
    scratch_bytes: usize,
    kernel: HostKernel,
}

impl HostModule {
    pub fn new<F>(name: impl Into<String>, parameters: Vec<Shape>, result: Shape, kernel: F) -> Self
    where
        F: Fn(&[Vec<u8>]) -> Vec<u8> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            config: ModuleConfig::default(),
            parameters,
            result,
            scratch_bytes: 0,
            kernel: Arc::new(kernel),
        }
    }

    /// Scratch memory the compiled kernel needs
    pub fn with_scratch_bytes(mut self, bytes: usize) -> Self {
        self.scratch_bytes = bytes;
        self
    }

    pub fn with_config(mut self, config: ModuleConfig) -> Self {
        self.config = config;
        self
    }

    pub fn parameters(&self) -> &[Shape] {
        &self.parameters
    }

    pub fn result(&self) -> &Shape {
        &self.result
    }

    pub fn scratch_bytes(&self) -> usize {
        self.scratch_bytes
    }
}

impl fmt::Debug for HostModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostModule")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("result", &self.result)
            .field("scratch_bytes", &self.scratch_bytes)
            .finish()
    }
}

impl Module for HostModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn config(&self) -> &ModuleConfig {
        &self.config
    }

    fn config_mut(&mut self) -> &mut ModuleConfig {
        &mut self.config
    }
}

impl Computation for HostModule {
    fn config(&self) -> &ModuleConfig {
        &self.config
    }
}

/// Compiler producing [`HostExecutable`]s
#[derive(Debug)]
pub struct HostCompiler {
    device: Arc<HostDevice>,
    scratch_limit: usize,
    compilations: AtomicUsize,
    executions: Arc<AtomicUsize>,
}

impl HostCompiler {
    pub fn new(device: Arc<HostDevice>) -> Self {
        Self {
            device,
            scratch_limit: DEFAULT_SCRATCH_LIMIT,
            compilations: AtomicUsize::new(0),
            executions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_scratch_limit(mut self, bytes: usize) -> Self {
        self.scratch_limit = bytes;
        self
    }

    /// Calls to `run_backend` so far
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::SeqCst)
    }

    /// Executions of any executable produced by this compiler
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }
}

impl Compiler for HostCompiler {
    type Module = HostModule;

    fn run_backend(
        &self,
        module: HostModule,
        device_ordinal: usize,
    ) -> Result<Box<dyn Executable>, BackendError> {
        self.compilations.fetch_add(1, Ordering::SeqCst);
        if device_ordinal != self.device.ordinal() {
            return Err(BackendError::Unsupported(format!(
                "device {device_ordinal} is not driven by this compiler"
            )));
        }
        if module.scratch_bytes > self.scratch_limit {
            return Err(BackendError::ResourceExhausted(format!(
                "`{}` needs {} bytes of scratch memory, device provides {}",
                module.name, module.scratch_bytes, self.scratch_limit
            )));
        }
        trace!("Compiled host module `{}`", module.name);
        Ok(Box::new(HostExecutable {
            name: module.name,
            parameters: module.parameters,
            result: module.result,
            kernel: module.kernel,
            device: Arc::clone(&self.device),
            executions: Arc::clone(&self.executions),
        }))
    }
}

/// Executable running a kernel closure on the host
pub struct HostExecutable {
    name: String,
    parameters: Vec<Shape>,
    result: Shape,
    kernel: HostKernel,
    device: Arc<HostDevice>,
    executions: Arc<AtomicUsize>,
}

impl fmt::Debug for HostExecutable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostExecutable")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .field("result", &self.result)
            .finish()
    }
}

impl Executable for HostExecutable {
    fn name(&self) -> &str {
        &self.name
    }

    fn parameter_shapes(&self) -> &[Shape] {
        &self.parameters
    }

    fn result_shape(&self) -> &Shape {
        &self.result
    }

    fn execute_on_stream(
        &self,
        run_options: &RunOptions<'_>,
        arguments: Vec<ExecutionInput<'_>>,
    ) -> Result<ExecutionOutput, DeviceError> {
        let ordinal = run_options.device_ordinal();

        // Cooperate with whoever holds the exclusive window
        let _shared = (!run_options.requires_exclusive_lock_on_device())
            .then(|| DeviceLocks::global().acquire_shared(ordinal));

        if arguments.len() != self.parameters.len() {
            return Err(DeviceError::Execution(format!(
                "`{}` expects {} arguments, got {}",
                self.name,
                self.parameters.len(),
                arguments.len()
            )));
        }

        let mut inputs = Vec::with_capacity(arguments.len());
        for (i, argument) in arguments.iter().enumerate() {
            let needed = argument.shape().byte_size();
            let mut bytes = self.device.read(argument.buffer())?;
            if bytes.len() < needed {
                return Err(DeviceError::Execution(format!(
                    "argument {i} of `{}` is {} bytes, {} needs {needed}",
                    self.name,
                    bytes.len(),
                    argument.shape()
                )));
            }
            bytes.truncate(needed);
            inputs.push(bytes);
        }

        let output = (self.kernel)(&inputs);
        if output.len() != self.result.byte_size() {
            return Err(DeviceError::Execution(format!(
                "`{}` produced {} bytes for result {}",
                self.name,
                output.len(),
                self.result
            )));
        }

        let result = ScopedBuffer::allocate(run_options.allocator(), ordinal, output.len())?;
        self.device.write(result.root_buffer(), &output)?;
        self.executions.fetch_add(1, Ordering::SeqCst);
        Ok(ExecutionOutput::new(result))
    }
}
