//! Compilation configuration
//!
//! [`DebugOptions`] holds the options that influence what a backend compiler
//! does besides producing code: dumping, autotune-result files, internal
//! parallelism. They travel with each module in a [`ModuleConfig`].
//!
//! Defaults can be seeded from the environment:
//! - `HARP_DUMP_TO`: directory for compilation dumps
//! - `HARP_DUMP_AUTOTUNE_RESULTS_TO`: file to write autotune results to
//! - `HARP_LOAD_AUTOTUNE_RESULTS_FROM`: file to read autotune results from
//! - `HARP_DUMP_LLVMIR=1`: dump the low-level IR of each kernel
//! - `HARP_COMPILATION_PARALLELISM`: worker threads used by one compilation
//!   (0 lets the backend decide)
//! - `HARP_ENABLE_RUNTIME_EXECUTABLE=0`: disable the runtime executable path
//! - `HARP_OPT_LEVEL`: code generator optimization level (0-3)

use std::path::PathBuf;

/// Debug and dump options consumed by backend compilers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugOptions {
    /// Directory to dump compilation artifacts into
    pub dump_to: Option<PathBuf>,
    /// File autotune results are written to after compilation
    pub dump_autotune_results_to: Option<PathBuf>,
    /// File autotune results are loaded from before compilation
    pub load_autotune_results_from: Option<PathBuf>,
    /// Dump the low-level IR of every kernel
    pub dump_llvmir: bool,
    /// Worker threads used inside a single compilation (0 = backend default)
    pub force_compilation_parallelism: usize,
    /// Lower to the runtime executable instead of the thunk sequence
    pub enable_runtime_executable: bool,
    /// Optimization level handed to the code generator (0-3)
    pub opt_level: u8,
    /// Allow reassociation and approximate math in generated kernels
    pub enable_fast_math: bool,
}

impl Default for DebugOptions {
    fn default() -> Self {
        Self {
            dump_to: None,
            dump_autotune_results_to: None,
            load_autotune_results_from: None,
            dump_llvmir: false,
            force_compilation_parallelism: 0,
            enable_runtime_executable: true,
            opt_level: 2,
            enable_fast_math: false,
        }
    }
}

impl DebugOptions {
    /// Defaults overridden by `HARP_*` environment variables
    pub fn from_env() -> Self {
        let mut options = Self::default();

        if let Some(dir) = std::env::var_os("HARP_DUMP_TO") {
            options.dump_to = Some(PathBuf::from(dir));
        }
        if let Some(path) = std::env::var_os("HARP_DUMP_AUTOTUNE_RESULTS_TO") {
            options.dump_autotune_results_to = Some(PathBuf::from(path));
        }
        if let Some(path) = std::env::var_os("HARP_LOAD_AUTOTUNE_RESULTS_FROM") {
            options.load_autotune_results_from = Some(PathBuf::from(path));
        }
        if let Some(flag) = env_flag("HARP_DUMP_LLVMIR") {
            options.dump_llvmir = flag;
        }
        if let Ok(value) = std::env::var("HARP_COMPILATION_PARALLELISM") {
            match value.trim().parse() {
                Ok(n) => options.force_compilation_parallelism = n,
                Err(_) => log::warn!("Ignoring HARP_COMPILATION_PARALLELISM={value:?}"),
            }
        }
        if let Some(flag) = env_flag("HARP_ENABLE_RUNTIME_EXECUTABLE") {
            options.enable_runtime_executable = flag;
        }
        if let Ok(value) = std::env::var("HARP_OPT_LEVEL") {
            match value.trim().parse::<u8>() {
                Ok(level) => options.opt_level = level.min(3),
                Err(_) => log::warn!("Ignoring HARP_OPT_LEVEL={value:?}"),
            }
        }

        options
    }

    /// Options to compile one autotuning candidate with.
    ///
    /// Dumps and autotune-result files are turned off, and compilation runs
    /// on the calling thread: candidates are already compiled from an outer
    /// parallel sweep.
    pub fn for_autotuning(&self) -> Self {
        Self {
            dump_to: None,
            dump_autotune_results_to: None,
            load_autotune_results_from: None,
            dump_llvmir: false,
            force_compilation_parallelism: 1,
            enable_runtime_executable: false,
            ..self.clone()
        }
    }

    pub fn with_dump_to(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_to = Some(dir.into());
        self
    }

    pub fn with_dump_llvmir(mut self, enabled: bool) -> Self {
        self.dump_llvmir = enabled;
        self
    }

    pub fn with_compilation_parallelism(mut self, threads: usize) -> Self {
        self.force_compilation_parallelism = threads;
        self
    }

    pub fn with_opt_level(mut self, level: u8) -> Self {
        self.opt_level = level.min(3);
        self
    }

    pub fn with_fast_math(mut self, enabled: bool) -> Self {
        self.enable_fast_math = enabled;
        self
    }
}

fn env_flag(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => {
            log::warn!("Ignoring {name}={value:?}");
            None
        }
    }
}

/// Per-module compilation configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleConfig {
    debug_options: DebugOptions,
}

impl ModuleConfig {
    pub fn new(debug_options: DebugOptions) -> Self {
        Self { debug_options }
    }

    pub fn debug_options(&self) -> &DebugOptions {
        &self.debug_options
    }

    pub fn set_debug_options(&mut self, options: DebugOptions) {
        self.debug_options = options;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_for_autotuning_clears_side_effects() {
        let options = DebugOptions::default()
            .with_dump_to("/tmp/dumps")
            .with_dump_llvmir(true)
            .with_compilation_parallelism(8)
            .with_opt_level(3)
            .with_fast_math(true);
        let tuned = options.for_autotuning();

        assert_eq!(tuned.dump_to, None);
        assert_eq!(tuned.dump_autotune_results_to, None);
        assert_eq!(tuned.load_autotune_results_from, None);
        assert!(!tuned.dump_llvmir);
        assert_eq!(tuned.force_compilation_parallelism, 1);
        assert!(!tuned.enable_runtime_executable);

        // Code generation options carry over
        assert_eq!(tuned.opt_level, 3);
        assert!(tuned.enable_fast_math);
    }

    #[test]
    fn test_from_env() {
        // SAFETY: no other test reads these variables.
        unsafe {
            std::env::set_var("HARP_DUMP_LLVMIR", "true");
            std::env::set_var("HARP_COMPILATION_PARALLELISM", "4");
        }
        let options = DebugOptions::from_env();
        unsafe {
            std::env::remove_var("HARP_DUMP_LLVMIR");
            std::env::remove_var("HARP_COMPILATION_PARALLELISM");
        }

        assert!(options.dump_llvmir);
        assert_eq!(options.force_compilation_parallelism, 4);
    }

    #[test]
    fn test_module_config_roundtrip() {
        let mut config = ModuleConfig::default();
        assert_eq!(config.debug_options(), &DebugOptions::default());

        config.set_debug_options(DebugOptions::default().with_compilation_parallelism(2));
        assert_eq!(config.debug_options().force_compilation_parallelism, 2);
    }
}
