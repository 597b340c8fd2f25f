use miogemm_core::{Chi, Constraints, GraphRole, HyPas, MiogError, NonChi};

const BASELINE: &str = "A_MIC4_PAD1_PLU0_LIW0_MIW0_WOS0__B_MIC4_PAD1_PLU0_LIW0_MIW0_WOS0__C_UNR16_GAL1_PUN0_ICE1_NAW64_UFO0_MAC256_SKW10";

#[test]
fn parse_emit_round_trips() {
    let hp = HyPas::from_string(BASELINE).unwrap();
    assert_eq!(hp.canonical_string(), BASELINE);
    assert_eq!(HyPas::from_string(&hp.canonical_string()).unwrap(), hp);
}

#[test]
fn knobs_parse_in_any_order_but_emit_canonically() {
    let shuffled = "B_WOS0_MIC4_MIW0_PAD1_PLU0_LIW0__C_SKW10_MAC256_UNR16_GAL1_PUN0_ICE1_NAW64_UFO0__A_MIC4_PAD1_PLU0_LIW0_MIW0_WOS0";
    let hp = HyPas::from_string(shuffled).unwrap();
    assert_eq!(hp.canonical_string(), BASELINE);
}

#[test]
fn typed_accessors_read_the_expected_knobs() {
    let hp = HyPas::from_string(BASELINE).unwrap();
    assert_eq!(hp.chi(GraphRole::A, Chi::Mic), 4);
    assert_eq!(hp.chi(GraphRole::B, Chi::Pad), 1);
    assert_eq!(hp.non_chi(NonChi::Unr), 16);
    assert_eq!(hp.non_chi(NonChi::Mac), 256);
    assert!(!hp.uses_atomics());
}

#[test]
fn split_k_assignments_report_atomics() {
    let hp = HyPas::from_string(BASELINE).unwrap();
    let mut split = hp;
    split.at_mut(GraphRole::C).set(NonChi::Ice.index(), 3);
    assert!(split.uses_atomics());
}

#[test]
fn malformed_assignments_are_rejected() {
    let unknown_role = BASELINE.replace("A_MIC4", "D_MIC4");
    let chi_knob_on_c = BASELINE.replace("C_UNR16", "C_MIC16");
    for s in [
        "",
        "A_MIC4",
        // role D does not exist
        unknown_role.as_str(),
        // duplicate knob
        "A_MIC4_MIC5_PAD1_PLU0_LIW0_MIW0_WOS0__B_MIC4_PAD1_PLU0_LIW0_MIW0_WOS0__C_UNR16_GAL1_PUN0_ICE1_NAW64_UFO0_MAC256_SKW10",
        // missing knob (no WOS on A)
        "A_MIC4_PAD1_PLU0_LIW0_MIW0__B_MIC4_PAD1_PLU0_LIW0_MIW0_WOS0__C_UNR16_GAL1_PUN0_ICE1_NAW64_UFO0_MAC256_SKW10",
        // Chi knob on role C
        chi_knob_on_c.as_str(),
    ] {
        assert!(
            matches!(HyPas::from_string(s), Err(MiogError::UserInput(_))),
            "expected rejection for {s:?}"
        );
    }
}

#[test]
fn constraints_overwrite_only_named_knobs() {
    let mut hp = HyPas::from_string(BASELINE).unwrap();
    let constraints = Constraints::from_string("A_WOS1_PAD2:C_ICE4").unwrap();
    hp.apply_constraints(&constraints);
    assert_eq!(hp.chi(GraphRole::A, Chi::Wos), 1);
    assert_eq!(hp.chi(GraphRole::A, Chi::Pad), 2);
    assert_eq!(hp.non_chi(NonChi::Ice), 4);
    // Everything else is untouched.
    assert_eq!(hp.chi(GraphRole::A, Chi::Mic), 4);
    assert_eq!(hp.chi(GraphRole::B, Chi::Wos), 0);
    assert_eq!(hp.non_chi(NonChi::Unr), 16);
}

#[test]
fn constraint_application_is_idempotent() {
    let constraints = Constraints::from_string("B_MIC2:C_UNR32_GAL3").unwrap();
    let mut once = HyPas::from_string(BASELINE).unwrap();
    once.apply_constraints(&constraints);
    let mut twice = once.clone();
    twice.apply_constraints(&constraints);
    assert_eq!(once, twice);
}

#[test]
fn colon_joined_constraints_accept_empty_segments() {
    let constraints = Constraints::from_string(":A_MIC8::").unwrap();
    let mut hp = HyPas::from_string(BASELINE).unwrap();
    hp.apply_constraints(&constraints);
    assert_eq!(hp.chi(GraphRole::A, Chi::Mic), 8);
}

#[test]
fn unknown_constraint_knob_is_user_input() {
    assert!(matches!(
        Constraints::from_string("A_XYZ3"),
        Err(MiogError::UserInput(_))
    ));
}

#[test]
fn start_range_strings_do_not_fix_knobs() {
    let constraints = Constraints::from_strings("A_WOS0", "C_MAC64").unwrap();
    let mut hp = HyPas::from_string(BASELINE).unwrap();
    hp.apply_constraints(&constraints);
    // MAC came from the start-range narrowing, so it must not be applied.
    assert_eq!(hp.non_chi(NonChi::Mac), 256);
    assert_eq!(hp.chi(GraphRole::A, Chi::Wos), 0);
}
