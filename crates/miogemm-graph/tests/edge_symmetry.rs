use miogemm_core::{Constraints, DevInfo, Geometry, GraphRole};
use miogemm_graph::SearchGraph;

fn default_graph() -> SearchGraph {
    let gg = Geometry::default_packed(256, 256, 256).unwrap();
    SearchGraph::new(gg, DevInfo::default_test_device(), &Constraints::empty()).unwrap()
}

#[test]
fn edges_are_symmetric_and_stay_in_range() {
    let graph = default_graph();
    for role in GraphRole::ALL {
        let sub = graph.at(role);
        for knob in 0..role.n_knobs() {
            for &value in &sub.range[knob] {
                for &neighbor in sub.neighbors_of(knob, value) {
                    assert!(
                        sub.contains(knob, neighbor),
                        "edge target {neighbor} outside range ({}/{})",
                        role.tag(),
                        role.knob_tags()[knob]
                    );
                    assert!(
                        sub.neighbors_of(knob, neighbor).contains(&value),
                        "asymmetric edge {value} -> {neighbor} ({}/{})",
                        role.tag(),
                        role.knob_tags()[knob]
                    );
                    assert_ne!(value, neighbor, "self edge at {value}");
                }
            }
        }
    }
}

#[test]
fn start_ranges_are_subsets_of_ranges() {
    let graph = default_graph();
    for role in GraphRole::ALL {
        let sub = graph.at(role);
        for knob in 0..role.n_knobs() {
            assert!(!sub.start_range[knob].is_empty());
            for &value in &sub.start_range[knob] {
                assert!(sub.contains(knob, value));
            }
        }
    }
}

#[test]
fn ranges_are_strictly_ascending() {
    let graph = default_graph();
    for role in GraphRole::ALL {
        let sub = graph.at(role);
        for knob in 0..role.n_knobs() {
            for pair in sub.range[knob].windows(2) {
                assert!(pair[0] < pair[1]);
            }
        }
    }
}

#[test]
fn workspace_flag_collapses_without_workspace() {
    // ws = 0, so staging can never derive; the range anticipates that.
    let graph = default_graph();
    assert_eq!(graph.at(GraphRole::A).range[5], vec![0]);
    assert_eq!(graph.at(GraphRole::B).range[5], vec![0]);

    let gg = Geometry::from_string(
        "tC0_tA0_tB0_colMaj1_m256_n256_k256_lda256_ldb256_ldc256_ws1048576_f32",
    )
    .unwrap();
    let graph =
        SearchGraph::new(gg, DevInfo::default_test_device(), &Constraints::empty()).unwrap();
    assert_eq!(graph.at(GraphRole::A).range[5], vec![0, 1, 2]);
}

#[test]
fn coupled_pairs_mirror_a_and_b() {
    let graph = default_graph();
    for pair in graph.coupled_pairs() {
        let (role_i, knob_i, val_i) = pair.first;
        let (role_j, knob_j, val_j) = pair.second;
        assert_eq!(role_i, GraphRole::A);
        assert_eq!(role_j, GraphRole::B);
        assert_eq!(knob_i, knob_j);
        assert_eq!(val_i, val_j);
        assert!(graph.contains_value(role_i, knob_i, val_i));
        assert!(graph.contains_value(role_j, knob_j, val_j));
    }
    // Every shared MIC value appears as a coupled entry.
    assert!(graph.coupled_pairs().len() >= 7);
}
