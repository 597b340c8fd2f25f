use miogemm_core::{Constraints, DevInfo, Geometry, HyPas, RngHandle};
use miogemm_graph::SearchGraph;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn random_walks_stay_inside_the_graph(seed in any::<u64>(), steps in 1usize..6) {
        let gg = Geometry::default_packed(128, 128, 128).unwrap();
        let graph = SearchGraph::new(gg, DevInfo::default_test_device(), &Constraints::empty())
            .unwrap();
        let mut rng = RngHandle::from_seed(seed);
        let mut current = graph.random_start(&mut rng);
        prop_assert!(graph.contains(&current));

        for _ in 0..steps {
            let neighbors = graph.get_neighbors(&current);
            prop_assert!(!neighbors.is_empty());
            for neighbor in &neighbors {
                prop_assert!(graph.contains(neighbor));
                prop_assert!(neighbor != &current);
            }
            let pick = rng.sample_index(neighbors.len());
            current = neighbors[pick].clone();
        }
    }

    #[test]
    fn sampled_assignments_round_trip_their_strings(seed in any::<u64>()) {
        let gg = Geometry::default_packed(64, 64, 64).unwrap();
        let graph = SearchGraph::new(gg, DevInfo::default_test_device(), &Constraints::empty())
            .unwrap();
        let mut rng = RngHandle::from_seed(seed);
        let hp = graph.random_start(&mut rng);
        let parsed = HyPas::from_string(&hp.canonical_string()).unwrap();
        prop_assert_eq!(parsed, hp);
    }
}
