use miogemm_core::{Geometry, HyPas, KernelSource, Solution};

fn sample_solution() -> Solution {
    Solution {
        geometry: Geometry::from_string(
            "tC0_tA0_tB0_colMaj1_m64_n64_k64_lda64_ldb64_ldc64_ws0_f32",
        )
        .unwrap(),
        hypas: HyPas::from_string(
            "A_MIC4_PAD1_PLU0_LIW0_MIW0_WOS0__B_MIC4_PAD1_PLU0_LIW0_MIW0_WOS0__C_UNR16_GAL1_PUN0_ICE1_NAW64_UFO0_MAC256_SKW10",
        )
        .unwrap(),
        median_time_ms: 0.12345,
        median_gflops: 4247.5,
        discovery_time_s: 1.5,
        main_kernel: KernelSource {
            name: "miog_main".to_string(),
            source: "#define MIOG_M 64\n__kernel void miog_main() {}\n".to_string(),
        },
        betac_kernel: None,
        ws_kernels: Vec::new(),
    }
}

#[test]
fn text_round_trips_a_single_kernel_solution() {
    let solution = sample_solution();
    let text = solution.to_text();
    let parsed = Solution::from_text(&text).unwrap();
    assert_eq!(parsed, solution);
}

#[test]
fn text_round_trips_a_full_bundle() {
    let mut solution = sample_solution();
    solution.ws_kernels = vec![
        KernelSource {
            name: "miog_wsa".to_string(),
            source: "/* stage a */\n".to_string(),
        },
        KernelSource {
            name: "miog_wsb".to_string(),
            source: "/* stage b */\n".to_string(),
        },
    ];
    solution.betac_kernel = Some(KernelSource {
        name: "miog_betac".to_string(),
        source: "/* scale c */\n".to_string(),
    });
    let parsed = Solution::from_text(&solution.to_text()).unwrap();
    assert_eq!(parsed, solution);
}

#[test]
fn headers_precede_kernels_in_the_emitted_text() {
    let text = sample_solution().to_text();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with("# geometry="));
    assert!(lines[1].starts_with("# hypas="));
    assert!(lines[2].starts_with("# median_ms="));
    assert!(lines[3].starts_with("# gflops="));
    assert!(text.contains("miog_main:\n"));
    assert!(text.ends_with("---\n"));
}

#[test]
fn missing_headers_or_terminators_are_rejected() {
    assert!(Solution::from_text("").is_err());
    let solution = sample_solution();
    let text = solution.to_text();
    let without_geometry = text
        .lines()
        .filter(|l| !l.starts_with("# geometry="))
        .collect::<Vec<_>>()
        .join("\n");
    assert!(Solution::from_text(&without_geometry).is_err());
    let truncated = text.trim_end_matches("---\n");
    assert!(Solution::from_text(truncated).is_err());
}

#[test]
fn worksize_params_scale_with_the_problem() {
    let solution = sample_solution();
    // Macro tile is 64x64 under MAC 256 / SKW 10 / MIC 4.
    let params = solution.main_worksize_params(128, 256).unwrap();
    assert_eq!(params["n_work_groups"], 2 * 4);
    assert_eq!(params["local_work_size"], 256);
    assert_eq!(params["global_work_size"], 8 * 256);
    assert!(solution.main_worksize_params(32, 32).is_err());
}
