use miogemm_bench::{gflops_at, CompileMemo, FindParams, SimDevice, SummStat};
use miogemm_core::{DevInfo, Geometry};

#[test]
fn median_handles_odd_and_even_counts() {
    assert_eq!(SummStat::Median.reduce(&[3.0, 1.0, 2.0]), 2.0);
    assert_eq!(SummStat::Median.reduce(&[4.0, 1.0, 2.0, 3.0]), 2.5);
    assert_eq!(SummStat::Median.reduce(&[7.0]), 7.0);
}

#[test]
fn mean_and_max_reduce_as_expected() {
    let times = [1.0, 2.0, 6.0];
    assert_eq!(SummStat::Mean.reduce(&times), 3.0);
    assert_eq!(SummStat::Max.reduce(&times), 6.0);
}

#[test]
fn empty_times_never_win() {
    for stat in [SummStat::Mean, SummStat::Median, SummStat::Max] {
        assert_eq!(stat.reduce(&[]), f64::INFINITY);
    }
}

#[test]
fn gflops_follows_the_flop_count() {
    let gg = Geometry::default_packed(1000, 1000, 1000).unwrap();
    // 2e9 flops in one millisecond is 2 tflop/s.
    assert!((gflops_at(&gg, 1.0) - 2000.0).abs() < 1.0e-9);
    assert_eq!(gflops_at(&gg, 0.0), 0.0);
    assert_eq!(gflops_at(&gg, f64::INFINITY), 0.0);
}

#[test]
fn find_params_deserialize_with_defaults() {
    let params: FindParams = serde_json::from_str("{}").unwrap();
    assert_eq!(params.sum_stat, SummStat::Median);
    assert!(params.allow_restart);
    assert!(!params.enforce_deterministic);
    assert_eq!(params.epsilon_ms, 0.0);
    assert_eq!(params.n_runs_per_bench, None);

    let params: FindParams =
        serde_json::from_str(r#"{"sum_stat":"Max","n_runs_per_bench":4,"seed":9}"#).unwrap();
    assert_eq!(params.sum_stat, SummStat::Max);
    assert_eq!(params.n_runs_per_bench, Some(4));
    assert_eq!(params.seed, 9);
}

#[test]
fn compile_memo_reuses_programs_by_source() {
    let mut device = SimDevice::new(DevInfo::default_test_device());
    let memo = CompileMemo::new();
    let source_a = "#define MIOG_KTYPE 2\n#define X 1\n";
    let source_b = "#define MIOG_KTYPE 2\n#define X 2\n";

    let p1 = memo.get_or_compile(&mut device, source_a, "miog_betac").unwrap();
    let p2 = memo.get_or_compile(&mut device, source_a, "miog_betac").unwrap();
    let p3 = memo.get_or_compile(&mut device, source_b, "miog_betac").unwrap();
    assert_eq!(p1, p2);
    assert_ne!(p1, p3);
    assert_eq!(memo.len(), 2);
}
