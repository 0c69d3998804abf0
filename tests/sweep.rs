mod common;

use std::sync::Arc;

use common::*;
use harp_autotune::backend::host::{HostCompiler, HostDevice, HostModule};
use harp_autotune::prelude::*;
use rstest::rstest;

fn candidates() -> Vec<CandidateConfig> {
    vec![
        candidate(1, 0),
        candidate(3, 0),
        candidate(2, 64),
        candidate(2, 0),
        candidate(4, 16),
    ]
}

#[rstest]
#[case::abort(HardErrorPolicy::Abort)]
#[case::skip_candidate(HardErrorPolicy::SkipCandidate)]
fn test_sweep_classifies_candidates(#[case] policy: HardErrorPolicy) {
    let fx = Fixture::new();
    let spec = CountingSpecializer::new();
    let (inputs, out) = fx.buffers();
    let candidates = candidates();

    let report = Sweep::new(&fx.util, policy)
        .run(
            &add_module("add"),
            &cache_key("add"),
            &candidates,
            &fx.stream,
            &inputs,
            out,
            |config| spec.specialize(config),
        )
        .unwrap();

    assert_eq!(report.trials.len(), candidates.len());
    for (trial, config) in report.trials.iter().zip(&candidates) {
        assert_eq!(&trial.config, config);
    }
    assert!(matches!(
        report.trials[1].outcome,
        TrialOutcome::Skipped(SkipReason::IncompatibleConfiguration(_))
    ));
    assert!(matches!(
        report.trials[2].outcome,
        TrialOutcome::Skipped(SkipReason::ResourceExhausted(_))
    ));
    assert_eq!(report.measured().count(), 3);
    assert_eq!(report.failed().count(), 0);

    let best = report.best().unwrap();
    assert!(best.duration().is_some());
    assert_eq!(fx.read_i32(&out), vec![11, 22, 33, 44]);
    assert_eq!(spec.calls(), candidates.len());
    // Compiled and skipped candidates alike are cached
    assert_eq!(fx.cache.len(), candidates.len());
}

#[test]
fn test_second_sweep_reuses_compilations() {
    let fx = Fixture::new();
    let spec = CountingSpecializer::new();
    let (inputs, out) = fx.buffers();
    let candidates = candidates();
    let sweep = Sweep::new(&fx.util, HardErrorPolicy::Abort);
    let run = || {
        sweep
            .run(
                &add_module("add"),
                &cache_key("add"),
                &candidates,
                &fx.stream,
                &inputs,
                out,
                |config| spec.specialize(config),
            )
            .unwrap()
    };

    run();
    let compilations = fx.util.compiler().compilations();
    let report = run();

    assert_eq!(spec.calls(), candidates.len());
    assert_eq!(fx.util.compiler().compilations(), compilations);
    assert_eq!(report.measured().count(), 3);
}

fn failing_specializer(
    spec: &CountingSpecializer,
    config: &CandidateConfig,
) -> Result<HostModule, SpecializationError> {
    let tiling: Tiling = config.decode().unwrap();
    if tiling.block == 2 && tiling.scratch_kib == 0 {
        return Err(SpecializationError::Failed("rewrite crashed".into()));
    }
    spec.specialize(config)
}

#[test]
fn test_skip_candidate_policy_records_failures() {
    let fx = Fixture::new();
    let spec = CountingSpecializer::new();
    let (inputs, out) = fx.buffers();
    let candidates = candidates();

    let report = Sweep::new(&fx.util, HardErrorPolicy::SkipCandidate)
        .run(
            &add_module("add"),
            &cache_key("add"),
            &candidates,
            &fx.stream,
            &inputs,
            out,
            |config| failing_specializer(&spec, config),
        )
        .unwrap();

    assert_eq!(
        report.trials[3].outcome,
        TrialOutcome::Failed("Specialization failed: rewrite crashed".into())
    );
    assert_eq!(report.failed().count(), 1);
    assert_eq!(report.measured().count(), 2);
    // The failure is not cached
    assert_eq!(fx.cache.len(), candidates.len() - 1);
}

#[test]
fn test_abort_policy_returns_error() {
    let fx = Fixture::new();
    let spec = CountingSpecializer::new();
    let (inputs, out) = fx.buffers();

    let err = Sweep::new(&fx.util, HardErrorPolicy::Abort)
        .run(
            &add_module("add"),
            &cache_key("add"),
            &candidates(),
            &fx.stream,
            &inputs,
            out,
            |config| failing_specializer(&spec, config),
        )
        .unwrap_err();

    assert!(matches!(err, AutotuneError::Specialization(m) if m == "rewrite crashed"));
}

#[test]
fn test_sweep_with_no_measurable_candidate() {
    let device = HostDevice::new();
    let fx = Fixture::with_compiler(
        Arc::clone(&device),
        HostCompiler::new(device).with_scratch_limit(0),
    );
    let spec = CountingSpecializer::new();
    let (inputs, out) = fx.buffers();
    let candidates = [candidate(1, 1), candidate(3, 0)];

    let report = Sweep::new(&fx.util, HardErrorPolicy::Abort)
        .run(
            &add_module("add"),
            &cache_key("add"),
            &candidates,
            &fx.stream,
            &inputs,
            out,
            |config| spec.specialize(config),
        )
        .unwrap();

    assert!(report.best().is_none());
    assert_eq!(report.skipped().count(), 2);
    assert_eq!(fx.util.compiler().executions(), 0);
}
