use criterion::{criterion_group, criterion_main, Criterion};

use miogemm_core::{Constraints, DevInfo, Geometry, HyPas, RngHandle};
use miogemm_graph::SearchGraph;

fn default_graph() -> SearchGraph {
    let gg = Geometry::default_packed(1024, 1024, 1024).unwrap();
    SearchGraph::new(gg, DevInfo::default_test_device(), &Constraints::empty()).unwrap()
}

fn bench_neighbors(c: &mut Criterion) {
    let graph = default_graph();
    let hp = HyPas::from_string(
        "A_MIC4_PAD1_PLU0_LIW0_MIW0_WOS0__B_MIC4_PAD1_PLU0_LIW0_MIW0_WOS0__C_UNR16_GAL1_PUN0_ICE1_NAW64_UFO0_MAC256_SKW10",
    )
    .unwrap();
    c.bench_function("get_neighbors", |b| {
        b.iter(|| graph.get_neighbors(&hp).len())
    });
}

fn bench_valid_start(c: &mut Criterion) {
    let graph = default_graph();
    c.bench_function("random_valid_start", |b| {
        let mut rng = RngHandle::from_seed(1);
        b.iter(|| graph.random_valid_start(&mut rng).unwrap())
    });
}

criterion_group!(benches, bench_neighbors, bench_valid_start);
criterion_main!(benches);
