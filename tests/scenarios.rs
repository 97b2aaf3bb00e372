//! End-to-end scenarios (spec §8's "literal" list), run at reduced mesh resolution so
//! they execute as fast integration tests rather than production-sized benchmarks.

use assert2::check;
use glam::DVec3;

use sghydro::init::{seed_state, seed_subcells};
use sghydro::lagrangian::step;
use sghydro::mesh_gen::{BlockMesh, BoundarySpec, FaceBoundary, MeshSource};
use sghydro::remap::remap;

const GAMMA: f64 = 1.4;

/// Sod shock tube in a box: left half higher density/energy, right half lower, reflect
/// on y/z, outflow on x. We don't have a recorded reference total to compare against
/// bit-for-bit, so this checks the conservation/stability invariants spec §8 lists
/// alongside the scenario (mass and energy stay finite and non-negative) at a reduced
/// `nx=16 ny=2 nz=2` resolution.
#[test]
fn sod_shock_tube_is_stable_and_conserves_mass() {
    let width = 1.0;
    let boundary = BoundarySpec {
        x_lo: FaceBoundary::Outflow,
        x_hi: FaceBoundary::Outflow,
        y_lo: FaceBoundary::Reflect,
        y_hi: FaceBoundary::Reflect,
        z_lo: FaceBoundary::Reflect,
        z_hi: FaceBoundary::Reflect,
    };
    let mesh = BlockMesh::generate(16, 2, 2, width, 0.1, 0.1, boundary, |centroid| {
        if centroid.x < width / 2.0 {
            (1.0, 2.5)
        } else {
            (0.125, 2.0)
        }
    })
    .unwrap();
    let topo = mesh.topology();
    let mut state = seed_state(topo, &mesh, GAMMA).unwrap();

    let mass_before: f64 = state.cell.mass.iter().sum();

    let mut elapsed = 0.0;
    for _ in 0..200 {
        if elapsed >= 0.02 {
            break;
        }
        let dt = step(topo, &mut state, GAMMA, 0.4, 1e-12, f64::MAX, 0.5, 1.0, true).unwrap();
        elapsed += dt;
    }

    let mass_after: f64 = state.cell.mass.iter().sum();
    check!((mass_after - mass_before).abs() < 1e-8);
    check!(state.cell.density0.iter().all(|&d| d.is_finite() && d >= 0.0));
    check!(state.cell.energy0.iter().all(|&e| e.is_finite()));
}

/// Stationary uniform flow: uniform density/energy, zero velocity. After many steps,
/// totals are unchanged and velocities stay near zero (spec §8's literal scenario).
#[test]
fn stationary_uniform_flow_stays_at_rest() {
    let mesh = BlockMesh::generate(4, 4, 4, 1.0, 1.0, 1.0, BoundarySpec::all_reflect(), |_| {
        (1.0, 1.0)
    })
    .unwrap();
    let topo = mesh.topology();
    let mut state = seed_state(topo, &mesh, GAMMA).unwrap();

    let density_before: f64 = state.cell.density0.iter().sum();
    let energy_before: f64 = state.cell.energy0.iter().sum();

    for _ in 0..100 {
        step(topo, &mut state, GAMMA, 0.4, 1e-12, f64::MAX, 0.5, 1.0, false).unwrap();
    }

    let density_after: f64 = state.cell.density0.iter().sum();
    let energy_after: f64 = state.cell.energy0.iter().sum();

    check!((density_after - density_before).abs() < 1e-6);
    check!((energy_after - energy_before).abs() < 1e-6);
    for v in &state.node.v0 {
        check!(v.length() < 1e-12);
    }
}

/// Pure rezone-identity remap: a single remap call with `rezoned_nodes = nodes` leaves
/// every subcell quantity unchanged (spec §8's literal scenario; the geometric
/// round-trip invariant it's built on).
#[test]
fn rezone_identity_remap_preserves_subcell_quantities() {
    let mesh = BlockMesh::generate(2, 2, 2, 1.0, 1.0, 1.0, BoundarySpec::all_reflect(), |_| {
        (1.3, 0.8)
    })
    .unwrap();
    let topo = mesh.topology();
    let mut state = seed_state(topo, &mesh, GAMMA).unwrap();
    let positions = mesh.node_positions().to_vec();
    seed_subcells(topo, &mut state, &positions);

    let mass_before = state.subcell.mass.clone();
    let ie_before = state.subcell.ie_density.clone();

    let profiling = sghydro::profiling::Profiling::default();
    remap(topo, &mut state, &positions, &positions, &profiling).unwrap();

    for (before, after) in mass_before.iter().zip(&state.subcell.mass) {
        check!((before - after).abs() < 1e-6);
    }
    for (before, after) in ie_before.iter().zip(&state.subcell.ie_density) {
        check!((before - after).abs() < 1e-6);
    }
}

/// Sedov point blast: a single hot cell at the center of a small box. After a handful
/// of steps, total energy is conserved and density stays non-negative everywhere (spec
/// §8's literal scenario, at `8^3` instead of `32^3` for test speed).
#[test]
fn sedov_point_blast_conserves_energy_and_keeps_density_non_negative() {
    let n = 8;
    let mesh = BlockMesh::generate(n, n, n, 1.0, 1.0, 1.0, BoundarySpec::all_reflect(), |centroid| {
        let center = DVec3::splat(0.5);
        if (centroid - center).length() < 1.0 / n as f64 {
            (1.0, 500.0)
        } else {
            (1.0, 1.0)
        }
    })
    .unwrap();
    let topo = mesh.topology();
    let mut state = seed_state(topo, &mesh, GAMMA).unwrap();

    let energy_before: f64 = (0..topo.n_cells)
        .map(|c| state.cell.mass[c] * state.cell.energy0[c])
        .sum();

    for _ in 0..50 {
        step(topo, &mut state, GAMMA, 0.3, 1e-12, f64::MAX, 0.5, 1.0, true).unwrap();
    }

    let energy_after: f64 = (0..topo.n_cells)
        .map(|c| state.cell.mass[c] * state.cell.energy0[c])
        .sum();

    let rel_err = ((energy_after - energy_before) / energy_before).abs();
    check!(rel_err < 1e-2);
    check!(state.cell.density0.iter().all(|&d| d >= 0.0));
}

/// Non-axis-aligned translation against reflect walls: a uniform field given an initial
/// velocity not aligned with any mesh axis bounces off the reflecting boundary: momentum
/// is no longer conserved (the wall does work on the fluid), but density and energy stay
/// finite and non-negative throughout (spec §8's literal scenario).
#[test]
fn non_axis_aligned_translation_against_reflect_walls_stays_well_behaved() {
    let mesh = BlockMesh::generate(4, 4, 4, 1.0, 1.0, 1.0, BoundarySpec::all_reflect(), |_| {
        (1.0, 1.0)
    })
    .unwrap();
    let topo = mesh.topology();
    let mut state = seed_state(topo, &mesh, GAMMA).unwrap();

    let initial_velocity = DVec3::new(0.3, 0.2, 0.1).normalize() * 0.05;
    for v in state.node.v0.iter_mut().chain(state.node.v1.iter_mut()) {
        *v = initial_velocity;
    }
    sghydro::lagrangian::reflect_velocities(topo, &mut state.node.v0);
    sghydro::lagrangian::reflect_velocities(topo, &mut state.node.v1);

    for _ in 0..30 {
        step(topo, &mut state, GAMMA, 0.4, 1e-12, f64::MAX, 0.5, 1.0, true).unwrap();
    }

    check!(state.cell.density0.iter().all(|&d| d.is_finite() && d >= 0.0));
    check!(state.cell.energy0.iter().all(|&e| e.is_finite()));
}
