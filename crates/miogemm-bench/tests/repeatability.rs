use miogemm_bench::{BenchStatus, Benchmarker, FindParams, SimConfig, SimDevice, Tuner};
use miogemm_core::{DevInfo, Geometry, GraphRole, HyPas, NonChi, Offsets, Writer};

const BASELINE_32: &str = "A_MIC2_PAD1_PLU0_LIW0_MIW0_WOS0__B_MIC2_PAD1_PLU0_LIW0_MIW0_WOS0__C_UNR8_GAL1_PUN0_ICE1_NAW64_UFO0_MAC64_SKW10";

fn fresh_bench(gg: &Geometry) -> Benchmarker {
    let device = SimDevice::with_config(DevInfo::default_test_device(), SimConfig::default());
    Benchmarker::new(Box::new(device), gg.clone(), Offsets::zero()).unwrap()
}

fn params_two_runs() -> FindParams {
    FindParams {
        n_runs_per_bench: Some(2),
        ..FindParams::default()
    }
}

#[test]
fn reused_inputs_reproduce_the_device_output_bitwise() {
    let gg = Geometry::default_packed(32, 32, 32).unwrap();
    let hp = HyPas::from_string(BASELINE_32).unwrap();
    let params = params_two_runs();

    let mut bench = fresh_bench(&gg);
    let first = bench
        .benchmark(&hp, &params, false, None, &mut Writer::silent())
        .unwrap();
    assert_eq!(first.status, BenchStatus::Ok);
    let c_first = bench.read_back_c().unwrap();

    // C is restored before every candidate, so a second pass over the same
    // inputs must land on exactly the same bytes.
    let second = bench
        .benchmark(&hp, &params, false, None, &mut Writer::silent())
        .unwrap();
    assert_eq!(second.status, BenchStatus::Ok);
    let c_second = bench.read_back_c().unwrap();
    assert_eq!(c_first, c_second);
}

#[test]
fn separate_devices_agree_on_the_result() {
    let gg = Geometry::default_packed(32, 32, 32).unwrap();
    let hp = HyPas::from_string(BASELINE_32).unwrap();
    let params = params_two_runs();

    let mut bench_a = fresh_bench(&gg);
    let mut bench_b = fresh_bench(&gg);
    bench_a
        .benchmark(&hp, &params, true, None, &mut Writer::silent())
        .unwrap();
    bench_b
        .benchmark(&hp, &params, true, None, &mut Writer::silent())
        .unwrap();
    assert_eq!(bench_a.read_back_c().unwrap(), bench_b.read_back_c().unwrap());
}

#[test]
fn multibench_reports_every_candidate() {
    let gg = Geometry::default_packed(32, 32, 32).unwrap();
    let baseline = HyPas::from_string(BASELINE_32).unwrap();
    let mut wider = baseline.clone();
    wider.at_mut(GraphRole::C).set(NonChi::Unr.index(), 16);
    let mut broken = baseline.clone();
    broken.at_mut(GraphRole::C).set(NonChi::Ice.index(), 9); // beyond the k chunks

    let device = SimDevice::new(DevInfo::default_test_device());
    let mut tuner = Tuner::new(Box::new(device), gg, Offsets::zero()).unwrap();
    let results = tuner
        .benchgemm(
            &[baseline, wider, broken],
            &params_two_runs(),
            &mut Writer::silent(),
        )
        .unwrap();
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].status, BenchStatus::Ok);
    assert_eq!(results[1].status, BenchStatus::Ok);
    assert_eq!(results[2].status, BenchStatus::DeriveFailed);
    assert!(results[0].median_time_ms.is_finite());
    assert!(results[1].median_time_ms.is_finite());
}
