use std::time::{Duration, Instant};

use miogemm_bench::{CostModel, FindParams, SimConfig, SimDevice, Tuner};
use miogemm_core::{
    derive_substream_seed, Constraints, DevInfo, Geometry, HyPas, Offsets, RngHandle, Ver, Writer,
};
use miogemm_graph::SearchGraph;

fn tuner_with(gg: &Geometry, config: SimConfig) -> Tuner {
    let device = SimDevice::with_config(DevInfo::default_test_device(), config);
    Tuner::new(Box::new(device), gg.clone(), Offsets::zero()).unwrap()
}

/// The starting assignment the driver will draw for this seed.
fn expected_start(gg: &Geometry, seed: u64) -> HyPas {
    let graph = SearchGraph::new(
        gg.clone(),
        DevInfo::default_test_device(),
        &Constraints::empty(),
    )
    .unwrap();
    let mut rng = RngHandle::from_seed(derive_substream_seed(seed, 0));
    graph.random_valid_start(&mut rng).unwrap()
}

#[test]
fn constant_times_terminate_at_the_starting_assignment() {
    let gg = Geometry::default_packed(32, 32, 32).unwrap();
    let params = FindParams {
        n_runs_per_bench: Some(2),
        allow_restart: false,
        seed: 77,
        ..FindParams::default()
    };
    // Every candidate costs exactly the same, so nothing ever improves on
    // the start and the search ends with its neighborhood exhausted.
    let config = SimConfig {
        cost: CostModel::ConstantNs(1_000_000),
        ..SimConfig::default()
    };
    let mut tuner = tuner_with(&gg, config);
    let solution = tuner
        .find(30.0, &Constraints::empty(), &params, &mut Writer::silent())
        .unwrap();
    assert_eq!(solution.hypas, expected_start(&gg, 77));
}

#[test]
fn the_budget_cuts_the_search_off() {
    let gg = Geometry::default_packed(16, 16, 16).unwrap();
    let params = FindParams {
        n_runs_per_bench: Some(2),
        seed: 3,
        ..FindParams::default()
    };
    // 20 ms of real sleep per main enqueue, 50 ms budget: the search must
    // stop after a handful of enqueues.
    let config = SimConfig {
        sleep_per_main_enqueue: Some(Duration::from_millis(20)),
        ..SimConfig::default()
    };
    let mut tuner = tuner_with(&gg, config);
    let begin = Instant::now();
    let solution = tuner
        .find(0.05, &Constraints::empty(), &params, &mut Writer::silent())
        .unwrap();
    let elapsed = begin.elapsed();
    assert!(elapsed >= Duration::from_millis(40), "stopped too early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(120), "overran the budget: {elapsed:?}");
    assert!(solution.median_time_ms.is_finite());
}

#[test]
fn a_poisoned_start_is_never_returned() {
    let gg = Geometry::default_packed(16, 16, 16).unwrap();
    // Accuracy mode plus a device that corrupts the first main program:
    // the starting assignment fails its check and must stay rejected.
    let params = FindParams {
        n_runs_per_bench: Some(2),
        allow_restart: false,
        verbosity: Ver::Accuracy,
        seed: 5,
        ..FindParams::default()
    };
    let config = SimConfig {
        corrupt_first_main: true,
        ..SimConfig::default()
    };
    let mut tuner = tuner_with(&gg, config);
    let solution = tuner
        .find(10.0, &Constraints::empty(), &params, &mut Writer::silent())
        .unwrap();
    assert_ne!(solution.hypas, expected_start(&gg, 5));
}

#[test]
fn identical_seeds_find_identical_solutions() {
    let gg = Geometry::default_packed(32, 32, 32).unwrap();
    let params = FindParams {
        n_runs_per_bench: Some(2),
        allow_restart: false,
        seed: 11,
        ..FindParams::default()
    };
    let run = |params: &FindParams| {
        let mut tuner = tuner_with(&gg, SimConfig::default());
        tuner
            .find(30.0, &Constraints::empty(), params, &mut Writer::silent())
            .unwrap()
    };
    let first = run(&params);
    let second = run(&params);
    assert_eq!(first.hypas, second.hypas);
    assert_eq!(first.median_time_ms, second.median_time_ms);
    assert_eq!(first.main_kernel.source, second.main_kernel.source);
}

#[test]
fn descent_never_returns_something_slower_than_its_start() {
    let gg = Geometry::default_packed(32, 32, 32).unwrap();
    let params = FindParams {
        n_runs_per_bench: Some(2),
        allow_restart: false,
        seed: 13,
        ..FindParams::default()
    };
    let mut tuner = tuner_with(&gg, SimConfig::default());
    let solution = tuner
        .find(30.0, &Constraints::empty(), &params, &mut Writer::silent())
        .unwrap();

    // Benchmark the start alone on a fresh device for comparison.
    let start = expected_start(&gg, 13);
    let mut probe = tuner_with(&gg, SimConfig::default());
    let start_result = probe
        .benchmarker_mut()
        .benchmark(&start, &params, false, None, &mut Writer::silent())
        .unwrap();
    assert!(solution.median_time_ms <= start_result.median_time_ms);
}

#[test]
fn deterministic_enforcement_keeps_split_k_out() {
    let gg = Geometry::default_packed(32, 32, 32).unwrap();
    let params = FindParams {
        n_runs_per_bench: Some(2),
        enforce_deterministic: true,
        allow_restart: false,
        seed: 29,
        ..FindParams::default()
    };
    let mut tuner = tuner_with(&gg, SimConfig::default());
    let solution = tuner
        .find(30.0, &Constraints::empty(), &params, &mut Writer::silent())
        .unwrap();
    assert!(!solution.hypas.uses_atomics());
}

#[test]
fn fixed_constraints_are_honored_by_the_result() {
    let gg = Geometry::default_packed(32, 32, 32).unwrap();
    let constraints = Constraints::from_string("C_UNR8_GAL2").unwrap();
    let params = FindParams {
        n_runs_per_bench: Some(2),
        allow_restart: false,
        seed: 31,
        ..FindParams::default()
    };
    let mut tuner = tuner_with(&gg, SimConfig::default());
    let solution = tuner
        .find(10.0, &constraints, &params, &mut Writer::silent())
        .unwrap();
    assert_eq!(solution.hypas.non_chi(miogemm_core::NonChi::Unr), 8);
    assert_eq!(solution.hypas.non_chi(miogemm_core::NonChi::Gal), 2);
}
