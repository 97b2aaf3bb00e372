//! Benchmarks the predictor/corrector step in isolation, at a few mesh sizes.

use sghydro::init::seed_state;
use sghydro::lagrangian::step;
use sghydro::mesh_gen::{BlockMesh, BoundarySpec};

fn main() {
    divan::main();
}

#[divan::bench(args = [8, 16, 24])]
fn predictor_corrector(bencher: divan::Bencher, n: u32) {
    let mesh = BlockMesh::generate(n, n, n, 1.0, 1.0, 1.0, BoundarySpec::all_reflect(), |_| {
        (1.0, 1.0)
    })
    .unwrap();
    let topo = mesh.topology();

    bencher
        .with_inputs(|| seed_state(topo, &mesh, 1.4).unwrap())
        .bench_local_values(|mut state| {
            step(topo, &mut state, 1.4, 0.4, 1e-12, f64::MAX, 0.5, 1.0, true).unwrap();
        });
}
