//! Sweeps over the candidate configurations of one computation
//!
//! Candidates are compiled in parallel (compilation is CPU-bound and goes
//! through the cache), then profiled one after the other on a single stream
//! so that timed runs never overlap.

use std::time::Duration;

use log::{debug, info, warn};
use rayon::prelude::*;

use super::{AutotunerCompileUtil, CompileOutcome, SkipReason};
use crate::backend::{AutotuneCacheKey, CandidateConfig, Compiler, Computation, DeviceMemory, Stream};
use crate::error::{Result, SpecializationError};

/// What a sweep does when a candidate fails with a hard error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardErrorPolicy {
    /// Stop the sweep and return the error
    Abort,
    /// Record the failure against the candidate and continue
    SkipCandidate,
}

/// What happened to one candidate
#[derive(Debug, Clone, PartialEq)]
pub enum TrialOutcome {
    Measured(Duration),
    Skipped(SkipReason),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct TrialResult {
    pub config: CandidateConfig,
    pub outcome: TrialOutcome,
}

impl TrialResult {
    pub fn duration(&self) -> Option<Duration> {
        match self.outcome {
            TrialOutcome::Measured(duration) => Some(duration),
            _ => None,
        }
    }
}

/// Results of a sweep, in candidate order
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub trials: Vec<TrialResult>,
}

impl SweepReport {
    /// The fastest measured candidate
    pub fn best(&self) -> Option<&TrialResult> {
        self.measured().min_by_key(|trial| trial.duration())
    }

    pub fn measured(&self) -> impl Iterator<Item = &TrialResult> {
        self.trials
            .iter()
            .filter(|trial| matches!(trial.outcome, TrialOutcome::Measured(_)))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &TrialResult> {
        self.trials
            .iter()
            .filter(|trial| matches!(trial.outcome, TrialOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> impl Iterator<Item = &TrialResult> {
        self.trials
            .iter()
            .filter(|trial| matches!(trial.outcome, TrialOutcome::Failed(_)))
    }
}

/// Compile-then-profile driver over a list of candidates
pub struct Sweep<'a, B: Compiler> {
    util: &'a AutotunerCompileUtil<B>,
    policy: HardErrorPolicy,
}

impl<'a, B: Compiler> Sweep<'a, B> {
    pub fn new(util: &'a AutotunerCompileUtil<B>, policy: HardErrorPolicy) -> Self {
        Self { util, policy }
    }

    pub fn policy(&self) -> HardErrorPolicy {
        self.policy
    }

    /// Compile every candidate, then profile the ones that compiled.
    ///
    /// `specialize` rewrites the computation for one candidate. Every
    /// profiled candidate writes its result into `output_buffer`.
    #[allow(clippy::too_many_arguments)]
    pub fn run<C, F>(
        &self,
        computation: &C,
        cache_key: &AutotuneCacheKey,
        candidates: &[CandidateConfig],
        stream: &dyn Stream,
        input_buffers: &[DeviceMemory],
        output_buffer: DeviceMemory,
        specialize: F,
    ) -> Result<SweepReport>
    where
        C: Computation + Sync + ?Sized,
        F: Fn(&CandidateConfig) -> std::result::Result<B::Module, SpecializationError> + Sync,
    {
        info!(
            "Autotuning {cache_key}: {} candidates",
            candidates.len()
        );

        let compiled: Vec<_> = candidates
            .par_iter()
            .map(|config| {
                self.util
                    .compile(computation, cache_key, config, || specialize(config))
            })
            .collect();

        let mut report = SweepReport {
            trials: Vec::with_capacity(candidates.len()),
        };
        for (config, outcome) in candidates.iter().zip(compiled) {
            let outcome = match outcome {
                Ok(CompileOutcome::Compiled(executable)) => self
                    .util
                    .profile(executable.as_ref(), stream, input_buffers, output_buffer)
                    .map(TrialOutcome::Measured),
                Ok(CompileOutcome::Skipped(reason)) => Ok(TrialOutcome::Skipped(reason)),
                Err(e) => Err(e),
            };

            let outcome = match (outcome, self.policy) {
                (Ok(outcome), _) => outcome,
                (Err(e), HardErrorPolicy::Abort) => {
                    warn!("Aborting sweep of {cache_key} at {config:?}: {e}");
                    return Err(e);
                }
                (Err(e), HardErrorPolicy::SkipCandidate) => {
                    warn!("Candidate {config:?} failed: {e}");
                    TrialOutcome::Failed(e.to_string())
                }
            };
            debug!("{config:?}: {outcome:?}");
            report.trials.push(TrialResult {
                config: config.clone(),
                outcome,
            });
        }

        match report.best() {
            Some(best) => info!(
                "Best candidate for {cache_key}: {:?} ({:?})",
                best.config,
                best.duration().unwrap_or_default()
            ),
            None => info!("No candidate for {cache_key} could be measured"),
        }
        Ok(report)
    }
}
