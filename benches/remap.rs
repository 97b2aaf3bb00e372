//! Benchmarks the swept-edge remap in isolation, at a few mesh sizes.

use sghydro::init::{seed_state, seed_subcells};
use sghydro::mesh_gen::{BlockMesh, BoundarySpec};
use sghydro::profiling::Profiling;
use sghydro::remap::remap;

fn main() {
    divan::main();
}

#[divan::bench(args = [8, 16, 24])]
fn swept_edge(bencher: divan::Bencher, n: u32) {
    let mesh = BlockMesh::generate(n, n, n, 1.0, 1.0, 1.0, BoundarySpec::all_reflect(), |_| {
        (1.0, 1.0)
    })
    .unwrap();
    let topo = mesh.topology();
    let positions = mesh.node_positions().to_vec();
    let profiling = Profiling::default();

    bencher
        .with_inputs(|| {
            let mut state = seed_state(topo, &mesh, 1.4).unwrap();
            seed_subcells(topo, &mut state, &positions);
            state
        })
        .bench_local_values(|mut state| {
            remap(topo, &mut state, &positions, &positions, &profiling).unwrap();
        });
}
