mod common;

use std::sync::{Arc, Barrier};
use std::thread;

use common::*;
use harp_autotune::backend::CompilationKey;
use harp_autotune::prelude::*;

#[test]
fn test_concurrent_callers_share_one_executable() {
    const THREADS: usize = 8;

    let fx = Fixture::new();
    let spec = CountingSpecializer::new();
    let computation = add_module("add");
    let key = cache_key("add");
    let config = candidate(2, 0);
    let barrier = Barrier::new(THREADS);

    let executables: Vec<Arc<dyn Executable>> = thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    barrier.wait();
                    fx.util
                        .compile(&computation, &key, &config, || spec.specialize(&config))
                        .unwrap()
                        .into_compiled()
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    // Racing misses may compile more than once, but only one entry survives
    let first = &executables[0];
    assert!(executables.iter().all(|e| Arc::ptr_eq(e, first)));
    assert_eq!(fx.cache.len(), 1);

    let stats = fx.cache.stats();
    assert_eq!(stats.inserts, 1);
    assert_eq!(stats.races + 1, spec.calls());
    assert_eq!(stats.hits + stats.misses, THREADS);
}

#[test]
fn test_concurrent_profiling_of_distinct_candidates() {
    let fx = Fixture::new();
    let spec = CountingSpecializer::new();
    let computation = add_module("add");
    let key = cache_key("add");
    let (inputs, _) = fx.buffers();
    let configs = [candidate(1, 0), candidate(2, 0), candidate(4, 0), candidate(3, 0)];

    let outputs: Vec<_> = configs.iter().map(|_| fx.upload_i32(&[0; LEN])).collect();
    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = configs
            .iter()
            .zip(&outputs)
            .map(|(config, out)| {
                let (fx, spec, computation, key, inputs) = (&fx, &spec, &computation, &key, &inputs);
                s.spawn(move || {
                    fx.util
                        .generate_and_profile(
                            computation,
                            key,
                            config,
                            &fx.stream,
                            inputs,
                            *out,
                            || spec.specialize(config),
                        )
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(results[..3].iter().all(Option::is_some));
    assert_eq!(results[3], None);
    for out in &outputs[..3] {
        assert_eq!(fx.read_i32(out), vec![11, 22, 33, 44]);
    }
    assert_eq!(fx.read_i32(&outputs[3]), vec![0; LEN]);
    assert_eq!(fx.cache.len(), 4);
}

#[test]
fn test_lookup_distinguishes_skip_from_absent() {
    let fx = Fixture::new();
    let spec = CountingSpecializer::new();
    let key = cache_key("add");
    let config = candidate(3, 0);
    let compilation_key = CompilationKey::new(key.clone(), config.clone());

    assert!(fx.cache.lookup(&compilation_key).is_none());

    fx.util
        .compile(&add_module("add"), &key, &config, || spec.specialize(&config))
        .unwrap();

    let cached = fx.cache.lookup(&compilation_key).unwrap();
    assert!(matches!(
        cached.skip_reason(),
        Some(SkipReason::IncompatibleConfiguration(_))
    ));
}

#[test]
fn test_injected_caches_are_isolated() {
    let a = Fixture::new();
    let b = Fixture::new();
    let spec = CountingSpecializer::new();
    let key = cache_key("add");
    let config = candidate(2, 0);

    for fx in [&a, &b] {
        fx.util
            .compile(&add_module("add"), &key, &config, || spec.specialize(&config))
            .unwrap();
    }

    assert_eq!(spec.calls(), 2);
    assert_eq!(a.cache.len(), 1);
    assert_eq!(b.cache.len(), 1);
}
