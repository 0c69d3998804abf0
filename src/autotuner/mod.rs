//! Autotuning compile-and-profile engine
//!
//! Given a computation and one candidate configuration, the engine
//! specializes and compiles the computation (through a process-wide cache),
//! runs it once to warm up, then runs it again under an exclusive device
//! lease while timing it.
//!
//! ## Outcomes
//!
//! A candidate that cannot be applied to the computation, or that needs more
//! on-device resources than the device has, is not an error: it compiles to
//! [`CompileOutcome::Skipped`] and profiles to `Ok(None)`. Everything else
//! that goes wrong is an [`AutotuneError`](crate::error::AutotuneError).
//!
//! ## Example
//!
//! ```ignore
//! let util = AutotunerCompileUtil::new(compiler, allocator, 0);
//! let duration = util.generate_and_profile(
//!     &computation, &cache_key, &config,
//!     &stream, &inputs, output,
//!     || specialize(&computation, &config),
//! )?;
//! ```

mod compilation_cache;
mod compile_util;
mod sweep;

use std::fmt;
use std::sync::Arc;

use crate::backend::Executable;

pub use compilation_cache::{CachedExecutable, CompilationCache};
pub use compile_util::AutotunerCompileUtil;
pub use sweep::{HardErrorPolicy, Sweep, SweepReport, TrialOutcome, TrialResult};

/// Why a candidate produced no executable
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The specialization function refused the configuration
    IncompatibleConfiguration(String),
    /// The backend ran out of on-device resources for this configuration
    ResourceExhausted(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::IncompatibleConfiguration(reason) => {
                write!(f, "incompatible configuration: {reason}")
            }
            SkipReason::ResourceExhausted(reason) => write!(f, "resource exhausted: {reason}"),
        }
    }
}

/// Result of compiling one candidate
#[derive(Debug, Clone)]
pub enum CompileOutcome<T> {
    Compiled(T),
    Skipped(SkipReason),
}

impl<T> CompileOutcome<T> {
    pub fn is_compiled(&self) -> bool {
        matches!(self, CompileOutcome::Compiled(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, CompileOutcome::Skipped(_))
    }

    pub fn compiled(&self) -> Option<&T> {
        match self {
            CompileOutcome::Compiled(value) => Some(value),
            CompileOutcome::Skipped(_) => None,
        }
    }

    pub fn into_compiled(self) -> Option<T> {
        match self {
            CompileOutcome::Compiled(value) => Some(value),
            CompileOutcome::Skipped(_) => None,
        }
    }

    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match self {
            CompileOutcome::Compiled(_) => None,
            CompileOutcome::Skipped(reason) => Some(reason),
        }
    }
}

impl CompileOutcome<Arc<dyn Executable>> {
    /// Borrow the executable, if there is one
    pub fn executable(&self) -> Option<&dyn Executable> {
        self.compiled().map(|executable| executable.as_ref())
    }
}
