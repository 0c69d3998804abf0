//! Compile and profile a single autotuning candidate

use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace};

use super::{CachedExecutable, CompilationCache, CompileOutcome, SkipReason};
use crate::backend::{
    AutotuneCacheKey, CandidateConfig, CompilationKey, Compiler, Computation, DeviceAllocator,
    DeviceMemory, ExclusiveLease, ExecutionInput, ExecutionOutput, Executable, Module, RunOptions,
    Stream, execution_inputs_from_buffers,
};
use crate::error::{AutotuneError, BackendError, Result, SpecializationError};

/// Compiles candidates for one device and measures how long they run.
///
/// Compilation goes through a [`CompilationCache`], the process-wide one
/// unless another is supplied with [`with_cache`](Self::with_cache).
pub struct AutotunerCompileUtil<B: Compiler> {
    compiler: B,
    allocator: Arc<dyn DeviceAllocator>,
    device_ordinal: usize,
    cache: Arc<CompilationCache>,
}

impl<B: Compiler> AutotunerCompileUtil<B> {
    pub fn new(compiler: B, allocator: Arc<dyn DeviceAllocator>, device_ordinal: usize) -> Self {
        Self {
            compiler,
            allocator,
            device_ordinal,
            cache: CompilationCache::global(),
        }
    }

    /// Use `cache` instead of the process-wide compilation cache
    pub fn with_cache(mut self, cache: Arc<CompilationCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn compiler(&self) -> &B {
        &self.compiler
    }

    pub fn device_ordinal(&self) -> usize {
        self.device_ordinal
    }

    pub fn cache(&self) -> &Arc<CompilationCache> {
        &self.cache
    }

    /// Empty the process-wide compilation cache
    pub fn clear_compilation_cache() {
        CompilationCache::global().clear();
    }

    /// Compile `config` for `computation` and time one run of the result.
    ///
    /// Returns `Ok(None)` when the candidate was skipped, now or by an
    /// earlier call. `output_buffer` receives the result of the timed run.
    ///
    /// # Panics
    ///
    /// Panics if the number of `input_buffers` does not match the parameter
    /// count of the executable, or if `output_buffer` differs in size from
    /// the executable's result.
    #[allow(clippy::too_many_arguments)]
    pub fn generate_and_profile<C, F>(
        &self,
        computation: &C,
        cache_key: &AutotuneCacheKey,
        config: &CandidateConfig,
        stream: &dyn Stream,
        input_buffers: &[DeviceMemory],
        output_buffer: DeviceMemory,
        specialize: F,
    ) -> Result<Option<Duration>>
    where
        C: Computation + ?Sized,
        F: FnOnce() -> std::result::Result<B::Module, SpecializationError>,
    {
        let outcome = self.compile(computation, cache_key, config, specialize)?;
        self.profile_executable(outcome.executable(), stream, input_buffers, output_buffer)
    }

    /// Compile a candidate, consulting the compilation cache first
    pub fn compile<C, F>(
        &self,
        computation: &C,
        cache_key: &AutotuneCacheKey,
        config: &CandidateConfig,
        specialize: F,
    ) -> Result<CachedExecutable>
    where
        C: Computation + ?Sized,
        F: FnOnce() -> std::result::Result<B::Module, SpecializationError>,
    {
        let key = CompilationKey::new(cache_key.clone(), config.clone());
        self.cache
            .get_or_compile(key, || self.compile_no_cache(computation, specialize))
    }

    /// Specialize and compile a candidate without touching the cache
    pub fn compile_no_cache<C, F>(&self, computation: &C, specialize: F) -> Result<CachedExecutable>
    where
        C: Computation + ?Sized,
        F: FnOnce() -> std::result::Result<B::Module, SpecializationError>,
    {
        match specialize() {
            Ok(module) => self.run_backend(computation, module),
            Err(SpecializationError::Incompatible(reason)) => {
                debug!("Skipping candidate: incompatible configuration: {reason}");
                Ok(CompileOutcome::Skipped(
                    SkipReason::IncompatibleConfiguration(reason),
                ))
            }
            Err(SpecializationError::Failed(message)) => {
                Err(AutotuneError::Specialization(message))
            }
        }
    }

    fn run_backend<C>(&self, computation: &C, mut module: B::Module) -> Result<CachedExecutable>
    where
        C: Computation + ?Sized,
    {
        let options = computation.config().debug_options().for_autotuning();
        module.config_mut().set_debug_options(options);

        let name = module.name().to_string();
        match self.compiler.run_backend(module, self.device_ordinal) {
            Ok(executable) => {
                trace!("Compiled candidate `{name}`");
                Ok(CompileOutcome::Compiled(Arc::from(executable)))
            }
            Err(BackendError::ResourceExhausted(reason)) => {
                debug!("Skipping candidate `{name}`: resource exhausted: {reason}");
                Ok(CompileOutcome::Skipped(SkipReason::ResourceExhausted(
                    reason,
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Profile `executable` if there is one; `Ok(None)` otherwise
    pub fn profile_executable(
        &self,
        executable: Option<&dyn Executable>,
        stream: &dyn Stream,
        input_buffers: &[DeviceMemory],
        output_buffer: DeviceMemory,
    ) -> Result<Option<Duration>> {
        match executable {
            Some(executable) => self
                .profile(executable, stream, input_buffers, output_buffer)
                .map(Some),
            None => Ok(None),
        }
    }

    /// Warm up `executable`, then time one run of it with the device to
    /// itself and copy its result into `output_buffer`.
    ///
    /// # Panics
    ///
    /// Same conditions as [`generate_and_profile`](Self::generate_and_profile).
    pub fn profile(
        &self,
        executable: &dyn Executable,
        stream: &dyn Stream,
        input_buffers: &[DeviceMemory],
        output_buffer: DeviceMemory,
    ) -> Result<Duration> {
        {
            let arguments = execution_inputs_from_buffers(executable, input_buffers);
            let _warmup = self.execute(executable, stream, arguments, None)?;
            stream.block_host_until_done()?;
        }

        let arguments = execution_inputs_from_buffers(executable, input_buffers);
        let lease = stream.exclusive_lease();
        let timer = stream.create_timer()?;
        let output = self.execute(executable, stream, arguments, Some(&lease))?;
        let duration = timer.elapsed_duration()?;
        drop(lease);

        let result = output.consume_result();
        let result_memory = *result.root_buffer();
        assert_eq!(
            output_buffer.size(),
            result_memory.size(),
            "output buffer of {} bytes cannot hold the {}-byte result of `{}`",
            output_buffer.size(),
            result_memory.size(),
            executable.name()
        );
        // The result buffer is released when `result` drops; the copy is
        // ordered before any reuse of it on this stream.
        stream.memcpy_device_to_device(&output_buffer, &result_memory, result_memory.size())?;

        debug!("Profiled `{}`: {duration:?}", executable.name());
        Ok(duration)
    }

    /// Run `executable` once on `stream`.
    ///
    /// With `exclusive_lease`, the run is marked as requiring the device to
    /// itself.
    pub fn execute(
        &self,
        executable: &dyn Executable,
        stream: &dyn Stream,
        arguments: Vec<ExecutionInput<'_>>,
        exclusive_lease: Option<&ExclusiveLease>,
    ) -> Result<ExecutionOutput> {
        let mut run_options =
            RunOptions::new(self.device_ordinal, stream, &self.allocator);
        if let Some(lease) = exclusive_lease {
            run_options = run_options.with_exclusive_lease(lease);
        }
        Ok(executable.execute_on_stream(&run_options, arguments)?)
    }
}
