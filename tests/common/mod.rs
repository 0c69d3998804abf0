//! Common test utilities for engine integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use harp_autotune::backend::host::{HostCompiler, HostDevice, HostModule, HostStream};
use harp_autotune::prelude::*;
use serde::{Deserialize, Serialize};

/// Elements of every test vector
pub const LEN: usize = 4;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn i32_bytes(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn bytes_i32(bytes: &[u8]) -> Vec<i32> {
    bytes
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn vector() -> Shape {
    Shape::new(DType::I32, vec![LEN])
}

/// Elementwise `a + b` over two i32 vectors
pub fn add_module(name: &str) -> HostModule {
    HostModule::new(name, vec![vector(), vector()], vector(), |inputs: &[Vec<u8>]| {
        let a = bytes_i32(&inputs[0]);
        let b = bytes_i32(&inputs[1]);
        let sum: Vec<i32> = a.iter().zip(&b).map(|(x, y)| x.wrapping_add(*y)).collect();
        i32_bytes(&sum)
    })
}

/// Tiling candidate for [`add_module`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tiling {
    pub block: usize,
    pub scratch_kib: usize,
}

pub fn candidate(block: usize, scratch_kib: usize) -> CandidateConfig {
    CandidateConfig::new(&Tiling { block, scratch_kib }).unwrap()
}

/// Specialization function counting its invocations.
///
/// A block size that does not divide [`LEN`] is incompatible; the scratch
/// request is forwarded to the module so that large ones exhaust the
/// compiler's limit.
#[derive(Default)]
pub struct CountingSpecializer {
    calls: AtomicUsize,
}

impl CountingSpecializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn specialize(&self, config: &CandidateConfig) -> Result<HostModule, SpecializationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let tiling: Tiling = config
            .decode()
            .map_err(|e| SpecializationError::Failed(e.to_string()))?;
        if tiling.block == 0 || LEN % tiling.block != 0 {
            return Err(SpecializationError::Incompatible(format!(
                "block {} does not divide {LEN}",
                tiling.block
            )));
        }
        Ok(add_module(&format!("add_b{}", tiling.block))
            .with_scratch_bytes(tiling.scratch_kib * 1024))
    }
}

/// Compiler that fails with a hard error a fixed number of times first
pub struct FlakyCompiler {
    inner: HostCompiler,
    failures_left: AtomicUsize,
}

impl FlakyCompiler {
    pub fn new(inner: HostCompiler, failures: usize) -> Self {
        Self {
            inner,
            failures_left: AtomicUsize::new(failures),
        }
    }

    pub fn inner(&self) -> &HostCompiler {
        &self.inner
    }
}

impl Compiler for FlakyCompiler {
    type Module = HostModule;

    fn run_backend(
        &self,
        module: HostModule,
        device_ordinal: usize,
    ) -> Result<Box<dyn Executable>, BackendError> {
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(BackendError::Compilation("backend crashed".into()));
        }
        self.inner.run_backend(module, device_ordinal)
    }
}

/// Host device, stream and engine with a private compilation cache
pub struct Fixture<B: Compiler = HostCompiler> {
    pub device: Arc<HostDevice>,
    pub stream: HostStream,
    pub cache: Arc<CompilationCache>,
    pub util: AutotunerCompileUtil<B>,
}

impl Fixture<HostCompiler> {
    pub fn new() -> Self {
        Self::on_device(HostDevice::new())
    }

    pub fn on_device(device: Arc<HostDevice>) -> Self {
        let compiler = HostCompiler::new(Arc::clone(&device));
        Self::with_compiler(device, compiler)
    }
}

impl<B: Compiler> Fixture<B> {
    pub fn with_compiler(device: Arc<HostDevice>, compiler: B) -> Self {
        init_logger();
        let cache = Arc::new(CompilationCache::new());
        let allocator: Arc<dyn DeviceAllocator> = device.clone();
        let util = AutotunerCompileUtil::new(compiler, allocator, device.ordinal())
            .with_cache(Arc::clone(&cache));
        Self {
            stream: HostStream::new(Arc::clone(&device)),
            device,
            cache,
            util,
        }
    }

    pub fn upload_i32(&self, values: &[i32]) -> DeviceMemory {
        self.device.upload(&i32_bytes(values)).unwrap()
    }

    pub fn read_i32(&self, memory: &DeviceMemory) -> Vec<i32> {
        bytes_i32(&self.device.read(memory).unwrap())
    }

    /// Two input vectors and a zeroed output vector
    pub fn buffers(&self) -> ([DeviceMemory; 2], DeviceMemory) {
        let a = self.upload_i32(&[1, 2, 3, 4]);
        let b = self.upload_i32(&[10, 20, 30, 40]);
        let out = self.upload_i32(&[0; LEN]);
        ([a, b], out)
    }
}

pub fn cache_key(fingerprint: &str) -> AutotuneCacheKey {
    AutotuneCacheKey::new("host", fingerprint)
}
