//! The staggered-grid Lagrangian predictor/corrector step (spec §4.2-§4.6): nodal
//! accumulation, the two-stage pressure-force integrator, CFL time-step selection, and
//! tensor-edge artificial viscosity.

use glam::DVec3;
use rayon::prelude::*;

use crate::error::HydroError;
use crate::geometry::{face_centroid, half_edge, sub_tet_contribution};
use crate::init::pressure;
use crate::state::HydroState;
use crate::topology::{BoundaryKind, Topology};

/// Nodal accumulation sweep (spec §4.2): outer loop over nodes so every node's write is
/// to a disjoint array slot, safe to parallelize with `par_iter` without a scatter.
/// `accumulate_mass` is true in the predictor sweep only (spec §4.3 step 3 vs step 14:
/// "do not recompute nodal_mass" in the corrector).
fn nodal_sweep(
    topology: &Topology,
    positions: &[DVec3],
    cell_centroids: &[DVec3],
    cell_density: &[f64],
    cell_energy: &[f64],
    cell_pressure: &[f64],
    gamma: f64,
    accumulate_mass: bool,
) -> (Vec<f64>, Vec<f64>, Vec<f64>, Vec<DVec3>) {
    let n_nodes = topology.n_nodes;

    let results: Vec<(f64, f64, f64, DVec3)> = (0..n_nodes)
        .into_par_iter()
        .map(|n| {
            let mut mass = 0.0;
            let mut volume = 0.0;
            let mut soundspeed = 0.0;
            let mut force = DVec3::ZERO;

            for &f in topology.nodes_to_faces.row(n) {
                let face = f as usize;
                let ring = topology.faces_to_nodes.row(face);
                let ring_len = ring.len();
                let local = match ring.iter().position(|&r| r as usize == n) {
                    Some(i) => i,
                    None => continue,
                };

                let prev = ring[(local + ring_len - 1) % ring_len] as usize;
                let next = ring[(local + 1) % ring_len] as usize;
                let face_positions: Vec<DVec3> =
                    ring.iter().map(|&r| positions[r as usize]).collect();
                let fc = face_centroid(&face_positions);

                for &cell in &topology.faces_to_cells[face] {
                    if cell < 0 {
                        continue;
                    }
                    let c = cell as usize;
                    let centroid = cell_centroids[c];
                    let density = cell_density[c];
                    let energy = cell_energy[c];
                    let p = cell_pressure[c];

                    for &other in &[prev, next] {
                        let h = half_edge(positions[n], positions[other]);
                        let (s, v) = sub_tet_contribution(centroid, fc, h, positions[n]);

                        if accumulate_mass {
                            mass += density * v;
                        }
                        volume += v;
                        soundspeed += (gamma * (gamma - 1.0) * energy).max(0.0).sqrt() * v;
                        force += p * s;
                    }
                }
            }

            if volume > 0.0 {
                soundspeed /= volume;
            }

            (mass, volume, soundspeed, force)
        })
        .collect();

    let mut mass = Vec::with_capacity(n_nodes);
    let mut volume = Vec::with_capacity(n_nodes);
    let mut soundspeed = Vec::with_capacity(n_nodes);
    let mut force = Vec::with_capacity(n_nodes);
    for (m, v, cs, f) in results {
        mass.push(m);
        volume.push(v);
        soundspeed.push(cs);
        force.push(f);
    }
    (mass, volume, soundspeed, force)
}

/// CFL-bounded time step (spec §4.4): per-cell candidate from the shortest face-ring
/// edge and the cell's sound speed, scaled by a fixed conservative `cfl` factor.
pub fn cfl_timestep(
    topology: &Topology,
    positions: &[DVec3],
    cell_energy: &[f64],
    gamma: f64,
    cfl: f64,
    dt_floor: f64,
) -> Result<f64, HydroError> {
    let dt = (0..topology.n_cells)
        .into_par_iter()
        .map(|c| {
            let mut min_edge = f64::MAX;
            for &f in topology.cells_to_faces.row(c) {
                let ring = topology.faces_to_nodes.row(f as usize);
                let n = ring.len();
                for i in 0..n {
                    let a = positions[ring[i] as usize];
                    let b = positions[ring[(i + 1) % n] as usize];
                    min_edge = min_edge.min((a - b).length());
                }
            }
            let cs = (gamma * (gamma - 1.0) * cell_energy[c]).max(0.0).sqrt();
            if cs > 0.0 {
                min_edge / cs
            } else {
                f64::MAX
            }
        })
        .reduce(|| f64::MAX, f64::min);

    let dt = cfl * dt;

    if !dt.is_finite() || dt < dt_floor {
        return Err(HydroError::TimestepCollapse { dt, floor: dt_floor });
    }

    Ok(dt)
}

/// Nodal density `mass/volume`, 0 for a node with no accumulated volume.
fn nodal_density(nodal_mass: &[f64], nodal_volume: &[f64], n: usize) -> f64 {
    if nodal_volume[n] > 0.0 {
        nodal_mass[n] / nodal_volume[n]
    } else {
        0.0
    }
}

/// Harmonic mean of the densities at `n`, `r`, and the (up to two) other nodes that
/// close out the quad faces sharing the `n`-`r` edge (spec §4.5: "harmonic mean of the
/// four surrounding nodal densities"). An edge on the outer mesh boundary only has one
/// such face and so averages over three nodes instead of four.
fn edge_density(topology: &Topology, nodal_mass: &[f64], nodal_volume: &[f64], n: usize, r: usize) -> f64 {
    let mut nodes = [n, r, usize::MAX, usize::MAX];
    let mut count = 2;

    for &f in topology.nodes_to_faces.row(n) {
        let ring = topology.faces_to_nodes.row(f as usize);
        if !ring.iter().any(|&x| x as usize == r) {
            continue;
        }
        for &x in ring {
            let x = x as usize;
            if x != n && x != r && !nodes[..count].contains(&x) && count < 4 {
                nodes[count] = x;
                count += 1;
            }
        }
    }

    let mut reciprocal_sum = 0.0;
    let mut present = 0usize;
    for &i in &nodes[..count] {
        let d = nodal_density(nodal_mass, nodal_volume, i);
        if d > 0.0 {
            reciprocal_sum += 1.0 / d;
            present += 1;
        }
    }

    if reciprocal_sum > 0.0 {
        present as f64 / reciprocal_sum
    } else {
        0.0
    }
}

/// Tensor-edge artificial viscosity (spec §4.5). Walks `topology.node_adjacency`,
/// visiting each physical edge exactly once (only when `r > n`, since the adjacency is
/// stored symmetrically) and applying the resulting force to both endpoints with
/// opposite sign in the same step — computing it from each endpoint separately would
/// double the accumulated force, since the formula is antisymmetric under swapping `n`
/// and `r` (`Δv`, `S`, and the resulting contribution all flip sign, but the pair of
/// updates pushed to `force` would be identical to the first computation's).
///
/// The edge area vector `S` used here is a face-area estimate built from the two
/// endpoints' accumulated nodal volumes and their separation (`(vol_n + vol_r) /
/// |x_r - x_n|`, oriented along the edge) rather than a literal dual-mesh face lookup,
/// since the CSR topology this crate builds does not carry a per-edge face identity.
pub fn artificial_viscosity(
    topology: &Topology,
    positions: &[DVec3],
    velocity: &[DVec3],
    nodal_mass: &[f64],
    nodal_volume: &[f64],
    nodal_soundspeed: &[f64],
    visc_coeff1: f64,
    visc_coeff2: f64,
    gamma: f64,
    force: &mut [DVec3],
) {
    let t = (gamma + 1.0) / 4.0;

    let increments: Vec<(usize, DVec3)> = (0..topology.n_nodes)
        .into_par_iter()
        .flat_map_iter(|n| {
            let mut local = Vec::new();
            for &r in topology.node_adjacency.row(n) {
                let r = r as usize;
                if r <= n {
                    continue;
                }

                let dv = velocity[r] - velocity[n];

                let edge_vec = positions[r] - positions[n];
                let edge_len = edge_vec.length();
                if edge_len < 1e-300 {
                    continue;
                }
                let unit = edge_vec / edge_len;
                let area = (nodal_volume[n] + nodal_volume[r]) / edge_len;
                let s = area * unit;

                let expansion = dv.dot(s);
                if expansion > 0.0 {
                    continue;
                }

                let rho_edge = edge_density(topology, nodal_mass, nodal_volume, n, r);
                let cs = nodal_soundspeed[n].min(nodal_soundspeed[r]);

                let f = |k: f64, unit_k: f64, s_k: f64| -> f64 {
                    let mag = rho_edge
                        * (visc_coeff2 * t * k.abs()
                            + (visc_coeff2 * visc_coeff2 * t * t * k * k
                                + visc_coeff1 * visc_coeff1 * cs * cs)
                                .sqrt());
                    mag * (k * s_k) * unit_k
                };

                let contribution = DVec3::new(
                    f(dv.x, unit.x, s.x),
                    f(dv.y, unit.y, s.y),
                    f(dv.z, unit.z, s.z),
                );

                local.push((n, contribution));
                local.push((r, -contribution));
            }
            local
        })
        .collect();

    for (n, f) in increments {
        force[n] += f;
    }
}

/// Reflects boundary-node velocities against their stored normal, or pins them to a
/// fixed value (spec §4.6).
pub fn reflect_velocities(topology: &Topology, velocity: &mut [DVec3]) {
    for n in 0..topology.n_nodes {
        match topology.boundary[n] {
            BoundaryKind::Interior | BoundaryKind::Outflow => {}
            BoundaryKind::Reflect { normal } => {
                let v = velocity[n];
                velocity[n] = v - v.dot(normal) * normal;
            }
            BoundaryKind::Fixed { velocity: fixed } => {
                velocity[n] = fixed;
            }
        }
    }
}

/// Sums the oriented sub-tetrahedron volumes of every cell from the given node
/// positions (spec §4.1's factor-of-two multiplicity, shared by init and the
/// predictor/corrector's volume recomputation, spec §4.3 steps 10 and 19).
pub fn cell_volumes(topology: &Topology, positions: &[DVec3]) -> Vec<f64> {
    (0..topology.n_cells)
        .into_par_iter()
        .map(|c| {
            let corners: Vec<DVec3> = topology
                .cells_to_nodes
                .row(c)
                .iter()
                .map(|&n| positions[n as usize])
                .collect();
            let centroid = corners.iter().copied().sum::<DVec3>() / corners.len() as f64;

            let mut volume = 0.0;
            for &face in topology.cells_to_faces.row(c) {
                let ring = topology.faces_to_nodes.row(face as usize);
                let face_positions: Vec<DVec3> =
                    ring.iter().map(|&n| positions[n as usize]).collect();
                let fc = face_centroid(&face_positions);
                let n = ring.len();
                for i in 0..n {
                    let a = face_positions[i];
                    let b = face_positions[(i + 1) % n];
                    let h = half_edge(a, b);
                    let (_, v_a) = sub_tet_contribution(centroid, fc, h, a);
                    let (_, v_b) = sub_tet_contribution(centroid, fc, h, b);
                    volume += v_a + v_b;
                }
            }
            volume
        })
        .collect()
}

pub fn cell_centroids(topology: &Topology, positions: &[DVec3]) -> Vec<DVec3> {
    (0..topology.n_cells)
        .into_par_iter()
        .map(|c| {
            let corners = topology.cells_to_nodes.row(c);
            corners.iter().map(|&n| positions[n as usize]).sum::<DVec3>() / corners.len() as f64
        })
        .collect()
}

/// Per-cell pressure work done against the predicted/corrected node velocities (spec
/// §4.3 step 9): `W = sum over face-corners of (v_node . p_cell) * S`, `S` the
/// orientation-corrected sub-triangle area vector.
fn pressure_work(
    topology: &Topology,
    positions: &[DVec3],
    velocity: &[DVec3],
    cell_centroids: &[DVec3],
    cell_pressure: &[f64],
) -> Vec<f64> {
    (0..topology.n_cells)
        .into_par_iter()
        .map(|c| {
            let centroid = cell_centroids[c];
            let p = cell_pressure[c];
            let mut w = 0.0;

            for &face in topology.cells_to_faces.row(c) {
                let ring = topology.faces_to_nodes.row(face as usize);
                let face_positions: Vec<DVec3> =
                    ring.iter().map(|&n| positions[n as usize]).collect();
                let fc = face_centroid(&face_positions);
                let n = ring.len();

                for i in 0..n {
                    let node = ring[i] as usize;
                    let a = face_positions[i];
                    let b = face_positions[(i + 1) % n];
                    let h = half_edge(a, b);
                    let (s, _) = sub_tet_contribution(centroid, fc, h, positions[node]);
                    w += velocity[node].dot(s) * p;
                }
            }
            w
        })
        .collect()
}

/// Runs one full predictor/corrector integration step (spec §4.3, all 19 steps),
/// mutating `state` in place and returning the time step actually used. The viscous
/// contribution is folded directly into `state.node.force_pressure` once computed
/// (spec §4.5 adds to `node_force` in place); `force_visc` is left zeroed for callers
/// that want to inspect the pressure-only accumulation between steps.
///
/// `max_dt` (the run's configured timestep cap) is clamped in at every point this step
/// derives a `dt` from the CFL condition, not just on the returned value — otherwise the
/// cap would bound only a caller's bookkeeping while the integration itself still moved
/// nodes by the uncapped CFL estimate.
#[allow(clippy::too_many_arguments)]
pub fn step(
    topology: &Topology,
    state: &mut HydroState,
    gamma: f64,
    cfl: f64,
    dt_floor: f64,
    max_dt: f64,
    visc_coeff1: f64,
    visc_coeff2: f64,
    enable_viscosity: bool,
) -> Result<f64, HydroError> {
    // 1: cell pressures from the equation of state (step 2 in spec numbering).
    for c in 0..topology.n_cells {
        state.cell.pressure0[c] = pressure(gamma, state.cell.energy0[c], state.cell.density0[c]);
    }
    state.cell.centroid = cell_centroids(topology, &state.node.x0);

    // 3: predictor nodal sweep, mass included.
    let (mass, volume, soundspeed, mut force) = nodal_sweep(
        topology,
        &state.node.x0,
        &state.cell.centroid,
        &state.cell.density0,
        &state.cell.energy0,
        &state.cell.pressure0,
        gamma,
        true,
    );
    state.node.mass = mass;
    state.node.volume = volume;
    state.node.soundspeed = soundspeed;
    state.node.force_pressure = force.clone();

    // 4: optional artificial viscosity.
    if enable_viscosity {
        artificial_viscosity(
            topology,
            &state.node.x0,
            &state.node.v0,
            &state.node.mass,
            &state.node.volume,
            &state.node.soundspeed,
            visc_coeff1,
            visc_coeff2,
            gamma,
            &mut force,
        );
    }

    // 5: velocity predict + time-center. Steps 5-7 need a dt estimate before step 8's
    // CFL recompute exists; we use the CFL candidate from the pre-step state, matching
    // spec §4.3's step 8 ("recompute dt ... using the predicted positions") as a
    // refinement of this initial estimate rather than a replacement for it.
    let dt = cfl_timestep(topology, &state.node.x0, &state.cell.energy0, gamma, cfl, dt_floor)?
        .min(max_dt);

    for n in 0..topology.n_nodes {
        let accel = if state.node.mass[n] > 0.0 {
            force[n] / state.node.mass[n]
        } else {
            DVec3::ZERO
        };
        let predicted = state.node.v0[n] + dt * accel;
        state.node.v1[n] = 0.5 * (state.node.v0[n] + predicted);
    }

    // 6: reflect boundary velocities.
    reflect_velocities(topology, &mut state.node.v1);

    // 7: position predict.
    for n in 0..topology.n_nodes {
        state.node.x1[n] = state.node.x0[n] + dt * state.node.v1[n];
    }

    // 8: recompute dt under CFL using predicted positions and energy0.
    let dt = cfl_timestep(topology, &state.node.x1, &state.cell.energy0, gamma, cfl, dt_floor)?
        .min(max_dt);

    // 9: predicted cell energy from pressure work.
    let centroids1 = cell_centroids(topology, &state.node.x1);
    let w = pressure_work(
        topology,
        &state.node.x1,
        &state.node.v1,
        &centroids1,
        &state.cell.pressure0,
    );
    for c in 0..topology.n_cells {
        state.cell.energy1[c] = state.cell.energy0[c] - dt * w[c] / state.cell.mass[c];
    }

    // 10: predicted cell density from recomputed volume.
    let volumes1 = cell_volumes(topology, &state.node.x1);
    for c in 0..topology.n_cells {
        state.cell.density1[c] = state.cell.mass[c] / volumes1[c];
    }

    // 11: time-center pressure.
    for c in 0..topology.n_cells {
        let p1 = pressure(gamma, state.cell.energy1[c], state.cell.density1[c]);
        state.cell.pressure1[c] = 0.5 * (state.cell.pressure0[c] + p1);
    }

    // 12: time-center positions, reset accumulators.
    for n in 0..topology.n_nodes {
        state.node.x1[n] = 0.5 * (state.node.x0[n] + state.node.x1[n]);
    }
    state.node.volume.iter_mut().for_each(|v| *v = 0.0);
    state.node.soundspeed.iter_mut().for_each(|v| *v = 0.0);
    state.node.force_pressure.iter_mut().for_each(|f| *f = DVec3::ZERO);
    state.node.force_visc.iter_mut().for_each(|f| *f = DVec3::ZERO);

    // 13: corrector cell centroids.
    state.cell.centroid = cell_centroids(topology, &state.node.x1);

    // 14: corrector nodal sweep, mass held fixed.
    let (_, volume, soundspeed, mut force) = nodal_sweep(
        topology,
        &state.node.x1,
        &state.cell.centroid,
        &state.cell.density1,
        &state.cell.energy1,
        &state.cell.pressure1,
        gamma,
        false,
    );
    state.node.volume = volume;
    state.node.soundspeed = soundspeed;
    state.node.force_pressure = force.clone();

    // 15: optional artificial viscosity, using v1.
    if enable_viscosity {
        artificial_viscosity(
            topology,
            &state.node.x1,
            &state.node.v1,
            &state.node.mass,
            &state.node.volume,
            &state.node.soundspeed,
            visc_coeff1,
            visc_coeff2,
            gamma,
            &mut force,
        );
    }

    // 16: velocity correct.
    for n in 0..topology.n_nodes {
        let accel = if state.node.mass[n] > 0.0 {
            force[n] / state.node.mass[n]
        } else {
            DVec3::ZERO
        };
        state.node.v1[n] += dt * accel;
        state.node.v0[n] = 0.5 * (state.node.v0[n] + state.node.v1[n]);
    }

    // 17: reflect.
    reflect_velocities(topology, &mut state.node.v0);

    // 18: position correct.
    for n in 0..topology.n_nodes {
        state.node.x0[n] += dt * state.node.v0[n];
    }

    // 19: recompute centroids, dt, energy, density over the corrected mesh.
    state.cell.centroid = cell_centroids(topology, &state.node.x0);
    let dt_final =
        cfl_timestep(topology, &state.node.x0, &state.cell.energy1, gamma, cfl, dt_floor)?
            .min(max_dt);

    let w_final = pressure_work(
        topology,
        &state.node.x0,
        &state.node.v0,
        &state.cell.centroid,
        &state.cell.pressure1,
    );
    for c in 0..topology.n_cells {
        state.cell.energy0[c] = state.cell.energy1[c] - dt * w_final[c] / state.cell.mass[c];
    }
    let volumes_final = cell_volumes(topology, &state.node.x0);
    for c in 0..topology.n_cells {
        state.cell.density0[c] = state.cell.mass[c] / volumes_final[c];
    }

    Ok(dt_final)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::init::seed_state;
    use crate::mesh_gen::{BlockMesh, BoundarySpec};
    use assert2::check;

    #[test]
    fn stationary_uniform_flow_keeps_mass_and_energy() {
        let mesh = BlockMesh::generate(4, 4, 4, 1.0, 1.0, 1.0, BoundarySpec::all_reflect(), |_| {
            (1.0, 1.0)
        })
        .unwrap();
        let topo = mesh.topology();
        let mut state = seed_state(topo, &mesh, 1.4).unwrap();

        let mass_before: f64 = state.cell.mass.iter().sum();

        for _ in 0..20 {
            step(topo, &mut state, 1.4, 0.4, 1e-12, f64::MAX, 0.5, 1.0, false).unwrap();
        }

        let mass_after: f64 = state.cell.mass.iter().sum();
        check!((mass_after - mass_before).abs() < 1e-6);

        for v in &state.node.v0 {
            check!(v.length() < 1e-6);
        }
    }

    #[test]
    fn cfl_timestep_is_positive_for_uniform_field() {
        let mesh = BlockMesh::generate(2, 2, 2, 1.0, 1.0, 1.0, BoundarySpec::all_reflect(), |_| {
            (1.0, 1.0)
        })
        .unwrap();
        let topo = mesh.topology();
        let dt = cfl_timestep(topo, mesh.node_positions(), mesh.cell_energy0(), 1.4, 0.5, 1e-12)
            .unwrap();
        check!(dt > 0.0);
    }
}
