use miogemm_core::{derive, Chi, DeriveFailure, DevInfo, Geometry, GraphRole, HyPas, NonChi};

fn baseline() -> HyPas {
    HyPas::from_string(
        "A_MIC4_PAD1_PLU0_LIW0_MIW0_WOS0__B_MIC4_PAD1_PLU0_LIW0_MIW0_WOS0__C_UNR16_GAL1_PUN0_ICE1_NAW64_UFO0_MAC256_SKW10",
    )
    .unwrap()
}

fn square(side: usize) -> Geometry {
    Geometry::default_packed(side, side, side).unwrap()
}

#[test]
fn baseline_derives_with_expected_shapes() {
    let dp = derive(&square(256), &DevInfo::default_test_device(), &baseline()).unwrap();
    assert_eq!((dp.wg_dim_m, dp.wg_dim_n), (16, 16));
    assert_eq!((dp.macro_tile_m, dp.macro_tile_n), (64, 64));
    assert_eq!((dp.n_groups_m, dp.n_groups_n), (4, 4));
    assert_eq!(dp.main_local_work_size, 256);
    assert_eq!(dp.main_global_work_size, 4 * 4 * 256);
    assert_eq!(dp.per_thread_work, 16);
    assert_eq!(dp.loads_per_thread_a, 4);
    assert!(dp.beta_in_main);
    assert!(!dp.uses_atomics);
    // 16 unrolls of two padded 64-wide tiles, in f32.
    assert_eq!(dp.local_mem_bytes, 16 * (65 + 65) * 4);
}

#[test]
fn oversized_tile_with_deep_unroll_overflows_local_memory() {
    // Macro tile 128x128 with unroll 64 against a 16 KiB device.
    let mut hp = baseline();
    hp.at_mut(GraphRole::A).set(Chi::Mic.index(), 8);
    hp.at_mut(GraphRole::B).set(Chi::Mic.index(), 8);
    hp.at_mut(GraphRole::C).set(NonChi::Unr.index(), 64);
    let mut devinfo = DevInfo::default_test_device();
    devinfo.local_mem_bytes = 16 * 1024;
    let err = derive(&square(256), &devinfo, &hp).unwrap_err();
    assert_eq!(err.kind, DeriveFailure::LocalMemoryOverflow);
}

#[test]
fn macro_tile_larger_than_the_problem_is_rejected() {
    let err = derive(&square(32), &DevInfo::default_test_device(), &baseline()).unwrap_err();
    assert_eq!(err.kind, DeriveFailure::TileExceedsProblem);
}

#[test]
fn workspace_staging_without_workspace_is_rejected() {
    let mut hp = baseline();
    hp.at_mut(GraphRole::A).set(Chi::Wos.index(), 1); // WOS on, but ws_size = 0
    let err = derive(&square(256), &DevInfo::default_test_device(), &hp).unwrap_err();
    assert_eq!(err.kind, DeriveFailure::WorkspaceMissing);
}

#[test]
fn workspace_staging_succeeds_when_workspace_is_provided() {
    let mut hp = baseline();
    hp.at_mut(GraphRole::A).set(Chi::Wos.index(), 2);
    let gg = Geometry::from_string(
        "tC0_tA0_tB0_colMaj1_m256_n256_k256_lda256_ldb256_ldc256_ws262144_f32",
    )
    .unwrap();
    let dp = derive(&gg, &DevInfo::default_test_device(), &hp).unwrap();
    assert_eq!(dp.ws_elements_a, 256 * 256);
    assert_eq!(dp.required_ws_bytes, 256 * 256 * 4);
    assert!(dp.access_a.from_workspace);
    // The coalescing copy flips the orientation.
    assert!(dp.access_a.transposed);
    assert!(!dp.access_b.from_workspace);
}

#[test]
fn extreme_skew_is_infeasible() {
    let mut hp = baseline();
    hp.at_mut(GraphRole::C).set(NonChi::Mac.index(), 64);
    hp.at_mut(GraphRole::C).set(NonChi::Skw.index(), 7);
    // 2^6 work items, centre exponent 3, skew -3 lands at 0: feasible.
    assert!(derive(&square(256), &DevInfo::default_test_device(), &hp).is_ok());
    hp.at_mut(GraphRole::C).set(NonChi::Skw.index(), 17);
    let err = derive(&square(256), &DevInfo::default_test_device(), &hp).unwrap_err();
    assert_eq!(err.kind, DeriveFailure::SkewInfeasible);
}

#[test]
fn unbalanced_tile_loads_are_an_illegal_micro_tile() {
    let mut hp = baseline();
    // 16 * 8 loads over 256 work items does not divide evenly.
    hp.at_mut(GraphRole::A).set(Chi::Mic.index(), 1);
    hp.at_mut(GraphRole::B).set(Chi::Mic.index(), 1);
    hp.at_mut(GraphRole::C).set(NonChi::Unr.index(), 8);
    let err = derive(&square(256), &DevInfo::default_test_device(), &hp).unwrap_err();
    assert_eq!(err.kind, DeriveFailure::IllegalMicroTile);
}

#[test]
fn split_factor_beyond_the_unroll_chunks_is_rejected() {
    let mut hp = baseline();
    hp.at_mut(GraphRole::C).set(NonChi::Ice.index(), 64);
    let err = derive(&square(256), &DevInfo::default_test_device(), &hp).unwrap_err();
    assert_eq!(err.kind, DeriveFailure::Other);
}

#[test]
fn split_k_turns_off_in_main_beta_and_turns_on_atomics() {
    let mut hp = baseline();
    hp.at_mut(GraphRole::C).set(NonChi::Ice.index(), 4);
    let dp = derive(&square(256), &DevInfo::default_test_device(), &hp).unwrap();
    assert!(!dp.beta_in_main);
    assert!(dp.uses_atomics);
    assert_eq!(dp.split_k, 4);
    assert_eq!(dp.k_per_chunk, 64);
    assert_eq!(dp.main_global_work_size, 4 * 4 * 4 * 256);
}

#[test]
fn f64_on_a_device_without_f64_support_is_rejected() {
    let gg = Geometry::from_string(
        "tC0_tA0_tB0_colMaj1_m256_n256_k256_lda256_ldb256_ldc256_ws0_f64",
    )
    .unwrap();
    let mut devinfo = DevInfo::default_test_device();
    devinfo.supports_f64 = false;
    let err = derive(&gg, &devinfo, &baseline()).unwrap_err();
    assert_eq!(err.kind, DeriveFailure::Other);
}
