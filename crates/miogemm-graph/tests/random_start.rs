use miogemm_core::{derive, Chi, Constraints, DevInfo, Geometry, GraphRole, MiogError, RngHandle};
use miogemm_graph::SearchGraph;

fn device() -> DevInfo {
    DevInfo::default_test_device()
}

#[test]
fn random_starts_are_reproducible_under_a_seed() {
    let gg = Geometry::default_packed(256, 256, 256).unwrap();
    let graph = SearchGraph::new(gg, device(), &Constraints::empty()).unwrap();

    let mut rng_a = RngHandle::from_seed(11);
    let mut rng_b = RngHandle::from_seed(11);
    for _ in 0..20 {
        assert_eq!(graph.random_start(&mut rng_a), graph.random_start(&mut rng_b));
    }
}

#[test]
fn random_valid_start_derives() {
    let gg = Geometry::default_packed(256, 256, 256).unwrap();
    let graph = SearchGraph::new(gg.clone(), device(), &Constraints::empty()).unwrap();
    let mut rng = RngHandle::from_seed(5);
    let hp = graph.random_valid_start(&mut rng).unwrap();
    assert!(graph.contains(&hp));
    assert!(derive(&gg, &device(), &hp).is_ok());
}

#[test]
fn random_valid_start_works_on_small_problems() {
    let gg = Geometry::default_packed(16, 16, 16).unwrap();
    let graph = SearchGraph::new(gg.clone(), device(), &Constraints::empty()).unwrap();
    let mut rng = RngHandle::from_seed(5);
    let hp = graph.random_valid_start(&mut rng).unwrap();
    assert!(derive(&gg, &device(), &hp).is_ok());
}

#[test]
fn start_values_come_from_the_start_range() {
    let gg = Geometry::default_packed(256, 256, 256).unwrap();
    let graph = SearchGraph::new(gg, device(), &Constraints::empty()).unwrap();
    let mut rng = RngHandle::from_seed(17);
    for _ in 0..50 {
        let hp = graph.random_start(&mut rng);
        for role in GraphRole::ALL {
            for knob in 0..role.n_knobs() {
                assert!(graph.at(role).start_range[knob].contains(&hp.at(role).get(knob)));
            }
        }
        // Seeds never stage through the workspace or split k.
        assert_eq!(hp.chi(GraphRole::A, Chi::Wos), 0);
        assert_eq!(hp.non_chi(miogemm_core::NonChi::Ice), 1);
    }
}

#[test]
fn constrained_starts_respect_fixed_knobs() {
    let gg = Geometry::default_packed(256, 256, 256).unwrap();
    let constraints = Constraints::from_string("A_MIC2:B_MIC2:C_MAC64").unwrap();
    let graph = SearchGraph::new(gg, device(), &constraints).unwrap();
    let mut rng = RngHandle::from_seed(23);
    for _ in 0..20 {
        let hp = graph.random_start(&mut rng);
        assert_eq!(hp.chi(GraphRole::A, Chi::Mic), 2);
        assert_eq!(hp.chi(GraphRole::B, Chi::Mic), 2);
        assert_eq!(hp.non_chi(miogemm_core::NonChi::Mac), 64);
    }
}

#[test]
fn impossible_constraints_yield_graph_empty() {
    let gg = Geometry::default_packed(256, 256, 256).unwrap();
    // 7 is not an admissible micro tile value.
    let constraints = Constraints::from_string("A_MIC7").unwrap();
    let err = SearchGraph::new(gg, device(), &constraints).unwrap_err();
    assert!(matches!(err, MiogError::GraphEmpty(_)));
}

#[test]
fn workspace_constraint_without_workspace_yields_graph_empty() {
    let gg = Geometry::default_packed(256, 256, 256).unwrap();
    let constraints = Constraints::from_string("A_WOS1").unwrap();
    let err = SearchGraph::new(gg, device(), &constraints).unwrap_err();
    assert!(matches!(err, MiogError::GraphEmpty(_)));
}
