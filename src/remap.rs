//! The swept-edge ALE remap (spec §4.7): conservative redistribution of subcell mass,
//! internal-energy density, and momentum from the Lagrangian mesh onto a rezoned mesh
//! via piecewise-linear least-squares reconstruction and prism swept-volume integrals.

use glam::DVec3;
use rayon::prelude::*;

use crate::error::HydroError;
use crate::geometry::{invert_3x3, mat3_vec};
use crate::lagrangian::cell_centroids;
use crate::profiling::Profiling;
use crate::state::HydroState;
use crate::topology::Topology;

/// Signed volume and first moment of a tetrahedron `(p0, p1, p2, p3)`, oriented so the
/// volume is never negative (spec §4.7 invariant: "the remap never produces negative
/// mass").
fn tetra_volume_and_moment(p0: DVec3, p1: DVec3, p2: DVec3, p3: DVec3) -> (f64, DVec3) {
    let volume = (p1 - p0).dot((p2 - p0).cross(p3 - p0)) / 6.0;
    let centroid = (p0 + p1 + p2 + p3) / 4.0;
    (volume.abs(), volume.abs() * centroid)
}

/// Reference layout of the swept prism's six quadrilateral faces (spec §4.7 step 4's
/// fixed `prism_faces->nodes` table), each triangulated through the prism's own
/// centroid to get an exact tetrahedral decomposition of volume and first moment.
const PRISM_FACES: [[usize; 4]; 6] = [
    [0, 1, 2, 3],
    [0, 1, 5, 4],
    [0, 3, 7, 4],
    [1, 2, 6, 5],
    [4, 5, 6, 7],
    [3, 2, 6, 7],
];

/// Weighted volume integrals `(V, integral)` of an 8-node prism via a tetrahedral fan
/// from its own centroid over each reference face (spec §4.7 step 4's "divergence
/// theorem surface integration").
fn prism_integrals(nodes: [DVec3; 8]) -> (f64, DVec3) {
    let apex = nodes.iter().copied().sum::<DVec3>() / 8.0;
    let mut volume = 0.0;
    let mut integral = DVec3::ZERO;

    for face in PRISM_FACES {
        let [a, b, c, d] = face.map(|i| nodes[i]);
        let (v1, m1) = tetra_volume_and_moment(apex, a, b, c);
        let (v2, m2) = tetra_volume_and_moment(apex, a, c, d);
        volume += v1 + v2;
        integral += m1 + m2;
    }

    (volume, integral)
}

/// The flat index of the cell owning subcell `s`, found via the `cells_to_nodes`
/// offsets (each cell's subcells occupy a contiguous range).
fn cell_of_subcell(topology: &Topology, s: usize) -> usize {
    topology.cells_to_nodes.offsets().partition_point(|&o| o as usize <= s) - 1
}

/// Faces of `cell` whose node ring contains both `node_a` and `node_b` — the (up to
/// two) faces meeting at that cube edge, used to build the internal swept quad for a
/// same-cell subcell pair (spec §4.7's face/neighbour-face pairing, generalized away
/// from a fixed corner-ring table).
fn connecting_faces(topology: &Topology, cell: usize, node_a: u32, node_b: u32) -> Vec<u32> {
    topology
        .cells_to_faces
        .row(cell)
        .iter()
        .copied()
        .filter(|&f| {
            let ring = topology.faces_to_nodes.row(f as usize);
            ring.contains(&node_a) && ring.contains(&node_b)
        })
        .collect()
}

/// Per-subcell own geometry: volume, raw moment integral, and centroid, computed by
/// restricting the cell-volume sub-tetrahedron sum (spec §4.1) to the faces of the
/// cell incident to the subcell's node. This is the subcell-level counterpart of
/// `lagrangian::cell_volumes` and is what the gradient stencil's `i_j`/`V_j` terms
/// (spec §4.7 step 5) are built from.
pub(crate) fn subcell_geometry(
    topology: &Topology,
    positions: &[DVec3],
    cell_centroids: &[DVec3],
) -> (Vec<f64>, Vec<DVec3>, Vec<DVec3>) {
    let n = topology.n_subcells;
    let mut volume = vec![0.0; n];
    let mut integral = vec![DVec3::ZERO; n];

    for c in 0..topology.n_cells {
        let centroid = cell_centroids[c];
        let cell_nodes = topology.cells_to_nodes.row(c);

        for &face in topology.cells_to_faces.row(c) {
            let ring = topology.faces_to_nodes.row(face as usize);
            let face_positions: Vec<DVec3> =
                ring.iter().map(|&n| positions[n as usize]).collect();
            let fc = crate::geometry::face_centroid(&face_positions);
            let len = ring.len();

            for i in 0..len {
                let node = ring[i];
                let a = face_positions[i];
                let b = face_positions[(i + 1) % len];
                let h = crate::geometry::half_edge(a, b);

                let Some(local) = cell_nodes.iter().position(|&n| n == node) else {
                    continue;
                };
                let s = topology.subcell_index(c, local);

                let (v, m) = tetra_volume_and_moment(centroid, fc, h, positions[node as usize]);
                volume[s] += v;
                integral[s] += m;
            }
        }
    }

    let centroid: Vec<DVec3> = volume
        .iter()
        .zip(integral.iter())
        .map(|(&v, &i)| if v > 0.0 { i / v } else { DVec3::ZERO })
        .collect();

    (volume, integral, centroid)
}

/// Barth-Jespersen limiter: the largest `alpha in [0,1]` such that reconstructing `q`
/// at every stencil evaluation point stays within `[min, max]` of the stencil values
/// (spec §4.7 step 5).
fn limit_gradient(
    q_self: f64,
    grad: DVec3,
    self_centroid: DVec3,
    stencil: &[(f64, DVec3)],
) -> DVec3 {
    let mut lo = q_self;
    let mut hi = q_self;
    for &(q, _) in stencil {
        lo = lo.min(q);
        hi = hi.max(q);
    }

    let mut alpha = 1.0f64;
    for &(_, centroid) in stencil {
        let delta = grad.dot(centroid - self_centroid);
        if delta > 0.0 {
            alpha = alpha.min(((hi - q_self) / delta).clamp(0.0, 1.0));
        } else if delta < 0.0 {
            alpha = alpha.min(((lo - q_self) / delta).clamp(0.0, 1.0));
        }
    }

    grad * alpha
}

/// Per-subcell reconstruction state: the hoisted stencil inverse (spec §9's "remap
/// least-squares cost" note — one 3x3 inverse reused by every remapped field) and the
/// subcell's own geometry.
struct Reconstruction {
    inv: Option<[[f64; 3]; 3]>,
    volume: f64,
    integral: DVec3,
    centroid: DVec3,
}

fn build_reconstructions(
    topology: &Topology,
    volume: &[f64],
    integral: &[DVec3],
    centroid: &[DVec3],
    profiling: &Profiling,
) -> Vec<Reconstruction> {
    (0..topology.n_subcells)
        .into_par_iter()
        .map(|s| {
            let mut m = [[0.0; 3]; 3];
            for &j in topology.subcells_to_subcells.row(s) {
                let j = j as usize;
                if volume[j] <= 0.0 {
                    continue;
                }
                let i = integral[j];
                let scale = 2.0 / (volume[j] * volume[j]);
                let rows = [i.x, i.y, i.z];
                for (r, &ir) in rows.iter().enumerate() {
                    for (c, &ic) in rows.iter().enumerate() {
                        m[r][c] += scale * ir * ic;
                    }
                }
            }

            let inv = match invert_3x3(m, 1e-18) {
                Ok(inv) => Some(inv),
                Err(_) => {
                    profiling.record_singular_gradient();
                    None
                }
            };

            Reconstruction {
                inv,
                volume: volume[s],
                integral: integral[s],
                centroid: centroid[s],
            }
        })
        .collect()
}

fn reconstruct_field(
    topology: &Topology,
    recon: &[Reconstruction],
    q: &[f64],
) -> Vec<DVec3> {
    (0..topology.n_subcells)
        .into_par_iter()
        .map(|s| {
            let Some(inv) = recon[s].inv else {
                return DVec3::ZERO;
            };

            let mut rhs = DVec3::ZERO;
            let mut stencil = Vec::new();
            for &j in topology.subcells_to_subcells.row(s) {
                let j = j as usize;
                if recon[j].volume <= 0.0 {
                    continue;
                }
                let delta = q[j] - q[s];
                rhs += (2.0 / recon[j].volume) * delta * recon[j].integral;
                stencil.push((q[j], recon[j].centroid));
            }

            let grad = mat3_vec(inv, rhs);
            limit_gradient(q[s], grad, recon[s].centroid, &stencil)
        })
        .collect()
}

/// One field's flux across a swept prism, using the donor subcell's own
/// reconstruction (spec §4.7 step 6): `q_self * V_prism + grad . (I_prism - V_prism *
/// c_subcell)`.
fn prism_flux(q_self: f64, grad: DVec3, v_prism: f64, i_prism: DVec3, c_subcell: DVec3) -> f64 {
    q_self * v_prism + grad.dot(i_prism - v_prism * c_subcell)
}

/// Runs the swept-edge remap for every field (spec §4.7). `positions` is the
/// Lagrangian mesh at the end of the step just completed; `rezoned` is the target mesh
/// (the identity rezoner per spec.md's Non-goals, or any future rezoner's output).
pub fn remap(
    topology: &Topology,
    state: &mut HydroState,
    positions: &[DVec3],
    rezoned: &[DVec3],
    profiling: &Profiling,
) -> Result<(), HydroError> {
    let total_mass: f64 = state.subcell.mass.iter().sum();
    tracing::debug!(total_mass, "remap: entering swept-edge sweep");

    let lag_centroids = cell_centroids(topology, positions);
    let rezoned_centroids = cell_centroids(topology, rezoned);

    let (volume, integral, centroid) = subcell_geometry(topology, positions, &lag_centroids);

    // Guard against a degenerate (zero-volume) subcell before building the stencil.
    for (s, &v) in volume.iter().enumerate() {
        if v <= 0.0 {
            return Err(HydroError::MeshInvalid(format!(
                "subcell {s} has non-positive volume during remap ({v:e})"
            )));
        }
    }

    let recon = build_reconstructions(topology, &volume, &integral, &centroid, profiling);

    let density_mass: Vec<f64> = state
        .subcell
        .mass
        .iter()
        .zip(&volume)
        .map(|(&m, &v)| m / v)
        .collect();
    let density_mom_x: Vec<f64> = state
        .subcell
        .momentum
        .iter()
        .zip(&volume)
        .map(|(m, &v)| m.x / v)
        .collect();
    let density_mom_y: Vec<f64> = state
        .subcell
        .momentum
        .iter()
        .zip(&volume)
        .map(|(m, &v)| m.y / v)
        .collect();
    let density_mom_z: Vec<f64> = state
        .subcell
        .momentum
        .iter()
        .zip(&volume)
        .map(|(m, &v)| m.z / v)
        .collect();

    let grad_mass = reconstruct_field(topology, &recon, &density_mass);
    let grad_ie = reconstruct_field(topology, &recon, &state.subcell.ie_density);
    let grad_mom_x = reconstruct_field(topology, &recon, &density_mom_x);
    let grad_mom_y = reconstruct_field(topology, &recon, &density_mom_y);
    let grad_mom_z = reconstruct_field(topology, &recon, &density_mom_z);

    let ie_snapshot = state.subcell.ie_density.clone();
    let mut mom_x: Vec<f64> = state.subcell.momentum.iter().map(|m| m.x).collect();
    let mut mom_y: Vec<f64> = state.subcell.momentum.iter().map(|m| m.y).collect();
    let mut mom_z: Vec<f64> = state.subcell.momentum.iter().map(|m| m.z).collect();

    // Each unordered subcell pair is processed exactly once, from its lower-indexed
    // side, and the flux is applied with opposite sign to both — resolving spec.md's
    // open question about avoiding double-counting between the internal and external
    // swept regions (see DESIGN.md).
    for s in 0..topology.n_subcells {
        let cell = cell_of_subcell(topology, s);
        let local = s - topology.cells_to_nodes.offsets()[cell] as usize;
        let node_s = topology.cells_to_nodes.row(cell)[local];

        for &r in topology.subcells_to_subcells.row(s) {
            let r = r as usize;
            if r <= s {
                continue;
            }

            let other_cell = cell_of_subcell(topology, r);
            let other_local = r - topology.cells_to_nodes.offsets()[other_cell] as usize;
            let node_r = topology.cells_to_nodes.row(other_cell)[other_local];

            let prism = if cell == other_cell {
                let faces = connecting_faces(topology, cell, node_s, node_r);
                if faces.len() < 2 {
                    continue;
                }
                build_internal_prism(
                    topology,
                    positions,
                    rezoned,
                    lag_centroids[cell],
                    rezoned_centroids[cell],
                    node_s,
                    faces[0],
                    faces[1],
                )
            } else {
                let Some(shared) = topology
                    .cells_to_faces
                    .row(cell)
                    .iter()
                    .copied()
                    .find(|&f| topology.cells_to_faces.row(other_cell).contains(&f))
                else {
                    continue;
                };
                build_external_prism(topology, positions, rezoned, shared)
            };

            let (v_prism, i_prism) = prism_integrals(prism);

            let displacement = prism[4..8].iter().sum::<DVec3>() / 4.0
                - prism[0..4].iter().sum::<DVec3>() / 4.0;
            let outward = (prism[1] - prism[0]).cross(prism[2] - prism[0]);
            let outward = if outward.dot(centroid[s] - prism[0]) > 0.0 {
                -outward
            } else {
                outward
            };
            let sign = if displacement.dot(outward) >= 0.0 { 1.0 } else { -1.0 };

            let apply = |field: &mut [f64], dens: &[f64], grad: &[DVec3]| {
                let flux = sign
                    * prism_flux(dens[s], grad[s], v_prism, i_prism, recon[s].centroid);
                field[s] -= flux;
                field[r] += flux;
            };

            apply(&mut state.subcell.mass, &density_mass, &grad_mass);
            apply(&mut state.subcell.ie_density, &ie_snapshot, &grad_ie);
            apply(&mut mom_x, &density_mom_x, &grad_mom_x);
            apply(&mut mom_y, &density_mom_y, &grad_mom_y);
            apply(&mut mom_z, &density_mom_z, &grad_mom_z);
        }
    }

    for i in 0..topology.n_subcells {
        state.subcell.momentum[i] = DVec3::new(mom_x[i], mom_y[i], mom_z[i]);
    }

    state.subcell.volume = volume;
    state.subcell.integral = integral;
    state.subcell.centroid = centroid;

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn build_internal_prism(
    topology: &Topology,
    positions: &[DVec3],
    rezoned: &[DVec3],
    cell_centroid: DVec3,
    rezoned_cell_centroid: DVec3,
    node: u32,
    face: u32,
    face2: u32,
) -> [DVec3; 8] {
    let quad = |pts: &[DVec3], cell_c: DVec3| -> [DVec3; 4] {
        let ring = topology.faces_to_nodes.row(face as usize);
        let len = ring.len();
        let local = ring.iter().position(|&n| n == node).unwrap_or(0);
        let prev = pts[ring[(local + len - 1) % len] as usize];
        let next = pts[ring[(local + 1) % len] as usize];
        let left = crate::geometry::half_edge(pts[node as usize], prev);
        let right = crate::geometry::half_edge(pts[node as usize], next);

        let ring2 = topology.faces_to_nodes.row(face2 as usize);
        let face2_positions: Vec<DVec3> = ring2.iter().map(|&n| pts[n as usize]).collect();
        let fc2 = crate::geometry::face_centroid(&face2_positions);

        [right, fc2, cell_c, left]
    };

    let lag = quad(positions, cell_centroid);
    let rez = quad(rezoned, rezoned_cell_centroid);

    [
        lag[0], lag[1], lag[2], lag[3], rez[0], rez[1], rez[2], rez[3],
    ]
}

fn build_external_prism(
    topology: &Topology,
    positions: &[DVec3],
    rezoned: &[DVec3],
    face: u32,
) -> [DVec3; 8] {
    let ring = topology.faces_to_nodes.row(face as usize);
    let mut out = [DVec3::ZERO; 8];
    for (i, &n) in ring.iter().take(4).enumerate() {
        out[i] = positions[n as usize];
        out[i + 4] = rezoned[n as usize];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::{seed_state, seed_subcells};
    use crate::mesh_gen::{BlockMesh, BoundarySpec};
    use assert2::check;

    #[test]
    fn identity_remap_conserves_subcell_mass() {
        let mesh = BlockMesh::generate(2, 2, 2, 1.0, 1.0, 1.0, BoundarySpec::all_reflect(), |_| {
            (1.0, 1.0)
        })
        .unwrap();
        let topo = mesh.topology();
        let mut state = seed_state(topo, &mesh, 1.4).unwrap();
        seed_subcells(topo, &mut state, mesh.node_positions());

        let mass_before: f64 = state.subcell.mass.iter().sum();
        let profiling = Profiling::default();
        remap(
            topo,
            &mut state,
            mesh.node_positions(),
            mesh.node_positions(),
            &profiling,
        )
        .unwrap();
        let mass_after: f64 = state.subcell.mass.iter().sum();

        check!((mass_after - mass_before).abs() < 1e-6);
    }
}
