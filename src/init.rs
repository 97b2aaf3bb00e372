//! Seeding the initial Lagrangian state from a [`MeshSource`] (spec §4.1's "initialize
//! cell volume and mass" and the ideal-gas equation of state).

use glam::DVec3;

use crate::error::HydroError;
use crate::geometry::sub_tet_contribution;
use crate::mesh_gen::MeshSource;
use crate::state::HydroState;
use crate::topology::Topology;

/// `p = (gamma - 1) * e * rho` (spec §4.1 EOS).
pub fn pressure(gamma: f64, energy: f64, density: f64) -> f64 {
    (gamma - 1.0) * energy * density
}

/// Sums a cell's sub-tetrahedron volumes. Each of a cell's `n` corners contributes a
/// sub-tet `(centroid, face_centroid, half_edge, node)` per incident face; the reference
/// mini-app counts each twice (once per half-edge direction around the face) and halves
/// the total, which this mirrors by summing both half-edges explicitly (spec §4.1's
/// "factor-of-two multiplicity").
fn cell_volume(
    topology: &Topology,
    positions: &[DVec3],
    cell: usize,
    centroid: DVec3,
) -> f64 {
    let mut volume = 0.0;

    for &face in topology.cells_to_faces.row(cell) {
        let face_nodes = topology.faces_to_nodes.row(face as usize);
        let face_positions: Vec<DVec3> =
            face_nodes.iter().map(|&n| positions[n as usize]).collect();
        let face_centroid = crate::geometry::face_centroid(&face_positions);

        let ring_len = face_nodes.len();
        for i in 0..ring_len {
            let a = face_positions[i];
            let b = face_positions[(i + 1) % ring_len];
            let half_edge = crate::geometry::half_edge(a, b);

            let (_, v_a) = sub_tet_contribution(centroid, face_centroid, half_edge, a);
            let (_, v_b) = sub_tet_contribution(centroid, face_centroid, half_edge, b);
            volume += v_a + v_b;
        }
    }

    volume
}

/// Builds the initial `HydroState` for a mesh: node positions copied in at both time
/// levels, per-cell density/energy/pressure from the mesh source, cell volumes and the
/// mass that stays fixed for the run (spec §4 Invariants), and zeroed accumulators.
pub fn seed_state(
    topology: &Topology,
    mesh: &dyn MeshSource,
    gamma: f64,
) -> Result<HydroState, HydroError> {
    let n_nodes = topology.n_nodes;
    let n_cells = topology.n_cells;
    let n_subcells = topology.n_subcells;

    let mut state = HydroState::zeroed(n_nodes, n_cells, n_subcells);
    let positions = mesh.node_positions();

    state.node.x0.copy_from_slice(positions);
    state.node.x1.copy_from_slice(positions);
    state.node.x_rezoned.copy_from_slice(positions);

    for c in 0..n_cells {
        let corners: Vec<DVec3> = topology
            .cells_to_nodes
            .row(c)
            .iter()
            .map(|&n| positions[n as usize])
            .collect();
        let centroid = corners.iter().copied().sum::<DVec3>() / corners.len() as f64;

        let density = mesh.cell_density0()[c];
        let energy = mesh.cell_energy0()[c];
        let volume = cell_volume(topology, positions, c, centroid);

        if volume <= 0.0 {
            return Err(HydroError::MeshInvalid(format!(
                "cell {c} has non-positive volume ({volume:e})"
            )));
        }

        state.cell.centroid[c] = centroid;
        state.cell.density0[c] = density;
        state.cell.density1[c] = density;
        state.cell.energy0[c] = energy;
        state.cell.energy1[c] = energy;
        state.cell.pressure0[c] = pressure(gamma, energy, density);
        state.cell.pressure1[c] = state.cell.pressure0[c];
        state.cell.mass[c] = density * volume;
    }

    Ok(state)
}

/// Splits each cell's mass, internal-energy density, and (zero) momentum down onto its
/// subcells by volume fraction, so the remap has something conservative to redistribute
/// on the first call (spec §3's "Subcell quantities are reconstructed each step prior
/// to remap").
pub fn seed_subcells(topology: &Topology, state: &mut HydroState, positions: &[DVec3]) {
    let centroids = crate::lagrangian::cell_centroids(topology, positions);
    let (volume, integral, centroid) = crate::remap::subcell_geometry(topology, positions, &centroids);

    for c in 0..topology.n_cells {
        let cell_volume: f64 = topology
            .cells_to_nodes
            .row(c)
            .iter()
            .enumerate()
            .map(|(local, _)| volume[topology.subcell_index(c, local)])
            .sum();

        for (local, _) in topology.cells_to_nodes.row(c).iter().enumerate() {
            let s = topology.subcell_index(c, local);
            let frac = if cell_volume > 0.0 {
                volume[s] / cell_volume
            } else {
                0.0
            };
            state.subcell.mass[s] = state.cell.mass[c] * frac;
            state.subcell.ie_density[s] = state.cell.energy0[c] * state.cell.density0[c];
            state.subcell.momentum[s] = DVec3::ZERO;
        }
    }

    state.subcell.volume = volume;
    state.subcell.integral = integral;
    state.subcell.centroid = centroid;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh_gen::{BlockMesh, BoundarySpec};
    use assert2::check;

    #[test]
    fn seeds_uniform_block_with_expected_mass() {
        let mesh = BlockMesh::generate(2, 2, 2, 1.0, 1.0, 1.0, BoundarySpec::all_reflect(), |_| {
            (2.0, 1.5)
        })
        .unwrap();

        let state = seed_state(mesh.topology(), &mesh, 1.4).unwrap();

        let cell_volume = 1.0 / 8.0;
        for &mass in &state.cell.mass {
            check!((mass - 2.0 * cell_volume).abs() < 1e-9);
        }
        for &p in &state.cell.pressure0 {
            check!((p - (1.4 - 1.0) * 1.5 * 2.0).abs() < 1e-9);
        }
    }
}
