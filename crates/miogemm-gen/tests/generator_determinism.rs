use miogemm_core::{DevInfo, Geometry, GraphRole, HyPas, NonChi};
use miogemm_gen::Bundle;

const BASELINE: &str = "A_MIC4_PAD1_PLU0_LIW0_MIW0_WOS0__B_MIC4_PAD1_PLU0_LIW0_MIW0_WOS0__C_UNR16_GAL1_PUN0_ICE1_NAW64_UFO0_MAC256_SKW10";

fn generate(hp: &HyPas) -> Bundle {
    let gg = Geometry::default_packed(256, 256, 256).unwrap();
    Bundle::generate(&gg, &DevInfo::default_test_device(), hp).unwrap()
}

#[test]
fn identical_inputs_emit_byte_identical_sources() {
    let hp = HyPas::from_string(BASELINE).unwrap();
    let first = generate(&hp);
    let second = generate(&hp);
    assert_eq!(first.kernels.len(), second.kernels.len());
    for (a, b) in first.kernels.iter().zip(second.kernels.iter()) {
        assert_eq!(a.entry_name, b.entry_name);
        assert_eq!(a.source, b.source);
        assert_eq!(a.global_work_size, b.global_work_size);
        assert_eq!(a.local_work_size, b.local_work_size);
    }
}

#[test]
fn different_assignments_emit_different_sources() {
    let hp = HyPas::from_string(BASELINE).unwrap();
    let mut other = hp.clone();
    other.at_mut(GraphRole::C).set(NonChi::Unr.index(), 32);
    let first = generate(&hp);
    let second = generate(&other);
    let main_a = first.kernel(miogemm_gen::KernelType::Main).unwrap();
    let main_b = second.kernel(miogemm_gen::KernelType::Main).unwrap();
    assert_ne!(main_a.source, main_b.source);
}

#[test]
fn knobs_and_derived_quantities_appear_as_definitions() {
    let hp = HyPas::from_string(BASELINE).unwrap();
    let bundle = generate(&hp);
    let main = bundle.kernel(miogemm_gen::KernelType::Main).unwrap();
    for expected in [
        "#define MICRO_TILE_A 4",
        "#define MICRO_TILE_B 4",
        "#define UNROLL 16",
        "#define N_WORK_ITEMS_PER_GROUP 256",
        "#define MACRO_TILE_M 64",
        "#define MACRO_TILE_N 64",
        "#define MIOG_M 256",
        "#define SKEW 10",
    ] {
        assert!(
            main.source.contains(expected),
            "main kernel is missing {expected:?}"
        );
    }
    assert!(main.source.contains("__kernel void miog_main("));
}

#[test]
fn work_sizes_match_the_derived_parameters() {
    let hp = HyPas::from_string(BASELINE).unwrap();
    let bundle = generate(&hp);
    let main = bundle.kernel(miogemm_gen::KernelType::Main).unwrap();
    assert_eq!(main.global_work_size, bundle.derived.main_global_work_size);
    assert_eq!(main.local_work_size, bundle.derived.main_local_work_size);
}

#[test]
fn sources_never_contain_a_bare_separator_line() {
    // The solution serialization reserves `---` lines for itself.
    let hp = HyPas::from_string(BASELINE).unwrap();
    for kernel in &generate(&hp).kernels {
        assert!(!kernel.source.lines().any(|line| line == "---"));
    }
}
