use miogemm_core::{FloatType, Geometry, GraphRole, MiogError};

#[test]
fn parse_emit_round_trips_the_canonical_example() {
    let s = "tC0_tA0_tB0_colMaj1_m64_n64_k64_lda64_ldb64_ldc64_ws0_f32";
    let gg = Geometry::from_string(s).unwrap();
    assert_eq!(gg.m, 64);
    assert_eq!(gg.n, 64);
    assert_eq!(gg.k, 64);
    assert!(gg.is_col_major);
    assert!(!gg.t_a && !gg.t_b && !gg.t_c);
    assert_eq!(gg.floattype, FloatType::F32);
    assert_eq!(gg.canonical_string(), s);
}

#[test]
fn parse_emit_round_trips_across_flags_and_widths() {
    for s in [
        "tC1_tA0_tB1_colMaj0_m48_n19_k81_lda84_ldb24_ldc51_ws0_f64",
        "tC0_tA1_tB0_colMaj1_m100_n100_k100_lda103_ldb105_ldc107_ws4000_f32",
        "tC0_tA0_tB0_colMaj0_m7_n9_k11_lda11_ldb9_ldc9_ws0_f32",
    ] {
        let gg = Geometry::from_string(s).unwrap();
        assert_eq!(gg.canonical_string(), s, "round trip failed for {s}");
    }
}

#[test]
fn coalesced_axes_follow_transpose_and_layout() {
    // Col-major, no transposes: A is m-coalesced, B and C are k/m.
    let gg = Geometry::from_string("tC0_tA0_tB0_colMaj1_m10_n20_k30_lda10_ldb30_ldc10_ws0_f32")
        .unwrap();
    assert_eq!(gg.coal_dim(GraphRole::A), 10);
    assert_eq!(gg.uncoal_dim(GraphRole::A), 30);
    assert_eq!(gg.coal_dim(GraphRole::B), 30);
    assert_eq!(gg.uncoal_dim(GraphRole::B), 20);
    assert_eq!(gg.coal_dim(GraphRole::C), 10);
    assert_eq!(gg.uncoal_dim(GraphRole::C), 20);

    // Transposing A flips its coalesced axis to k.
    let gg = Geometry::from_string("tC0_tA1_tB0_colMaj1_m10_n20_k30_lda30_ldb30_ldc10_ws0_f32")
        .unwrap();
    assert_eq!(gg.coal_dim(GraphRole::A), 30);
    assert_eq!(gg.uncoal_dim(GraphRole::A), 10);
}

#[test]
fn leading_dimension_below_coalesced_axis_is_rejected() {
    let err = Geometry::from_string("tC0_tA0_tB0_colMaj1_m64_n64_k64_lda63_ldb64_ldc64_ws0_f32")
        .unwrap_err();
    assert!(matches!(err, MiogError::UserInput(_)));
}

#[test]
fn malformed_strings_are_rejected_with_user_input() {
    for s in [
        "",
        "tC0_tA0_tB0",
        "tC2_tA0_tB0_colMaj1_m64_n64_k64_lda64_ldb64_ldc64_ws0_f32",
        "tA0_tC0_tB0_colMaj1_m64_n64_k64_lda64_ldb64_ldc64_ws0_f32",
        "tC0_tA0_tB0_colMaj1_m64_n64_k64_lda64_ldb64_ldc64_ws0_f16",
        "tC0_tA0_tB0_colMaj1_m0_n64_k64_lda64_ldb64_ldc64_ws0_f32",
        "tC0_tA0_tB0_colMaj1_m64_n64_k64_lda64_ldb64_ldc64_ws0_f32_extra",
    ] {
        assert!(
            matches!(Geometry::from_string(s), Err(MiogError::UserInput(_))),
            "expected rejection for {s:?}"
        );
    }
}

#[test]
fn element_index_covers_all_layout_combinations() {
    // Row-major, no transpose: (row, col) lands at row * ld + col.
    let gg = Geometry::from_string("tC0_tA0_tB0_colMaj0_m4_n5_k6_lda6_ldb5_ldc5_ws0_f32").unwrap();
    assert_eq!(gg.element_index(GraphRole::A, 2, 3), 2 * 6 + 3);
    // Col-major, transposed A: logical (row, col) is stored at (col, row).
    let gg = Geometry::from_string("tC0_tA1_tB0_colMaj1_m4_n5_k6_lda6_ldb6_ldc4_ws0_f32").unwrap();
    assert_eq!(gg.element_index(GraphRole::A, 2, 3), 3 + 2 * 6);
}
