//! A minimal structured-block mesh generator.
//!
//! Reading a real mesh file is explicitly out of scope (spec §1/§6): the core only needs
//! *some* concrete topology to run against, built from the `nx,ny,nz,width,height,depth`
//! parameters the same way `examples/original_source/main.c` drives
//! `initialise_mesh_3d`/`convert_mesh_to_umesh_3d`. [`BlockMesh`] is that stand-in,
//! expressed behind the [`MeshSource`] trait so a real reader can be substituted later
//! without touching the core.

use glam::DVec3;
use itertools::Itertools;

use crate::topology::{BoundaryKind, Csr, Topology};

/// What a mesh source owes the core (spec §6's "Mesh collaborator contract"): the
/// immutable topology, initial node positions, per-cell initial density/energy, and the
/// number of bytes it allocated (for the startup report).
pub trait MeshSource {
    fn topology(&self) -> &Topology;
    fn node_positions(&self) -> &[DVec3];
    fn cell_density0(&self) -> &[f64];
    fn cell_energy0(&self) -> &[f64];
    fn bytes_allocated(&self) -> usize;
}

/// One of the six faces of the generated box, used to describe a boundary condition per
/// side (spec §4.6's reflect/fixed/outflow tagging, applied face-wise here since the
/// structured generator doesn't have per-node boundary metadata of its own).
#[derive(Copy, Clone, Debug)]
pub enum FaceBoundary {
    Reflect,
    Fixed(DVec3),
    Outflow,
}

#[derive(Copy, Clone, Debug)]
pub struct BoundarySpec {
    pub x_lo: FaceBoundary,
    pub x_hi: FaceBoundary,
    pub y_lo: FaceBoundary,
    pub y_hi: FaceBoundary,
    pub z_lo: FaceBoundary,
    pub z_hi: FaceBoundary,
}

impl BoundarySpec {
    pub fn all_reflect() -> Self {
        Self {
            x_lo: FaceBoundary::Reflect,
            x_hi: FaceBoundary::Reflect,
            y_lo: FaceBoundary::Reflect,
            y_hi: FaceBoundary::Reflect,
            z_lo: FaceBoundary::Reflect,
            z_hi: FaceBoundary::Reflect,
        }
    }
}

// Local corner layout of a hexahedral cell: bottom ring 0-1-2-3 (CCW looking down +z),
// top ring 4-5-6-7 directly above. Local face slots within a cell, in the order used by
// `cells_to_faces`: [x-, x+, y-, y+, z-, z+].
const CORNER_OFFSETS: [(i64, i64, i64); 8] = [
    (0, 0, 0),
    (1, 0, 0),
    (1, 1, 0),
    (0, 1, 0),
    (0, 0, 1),
    (1, 0, 1),
    (1, 1, 1),
    (0, 1, 1),
];

// For each corner, the local face slots (into the 6-entry per-cell face list above) that
// meet at it, in ring order around that corner.
const CORNER_FACES: [[usize; 3]; 8] = [
    [0, 2, 4], // 0: x-, y-, z-
    [1, 2, 4], // 1: x+, y-, z-
    [1, 3, 4], // 2: x+, y+, z-
    [0, 3, 4], // 3: x-, y+, z-
    [0, 2, 5], // 4: x-, y-, z+
    [1, 2, 5], // 5: x+, y-, z+
    [1, 3, 5], // 6: x+, y+, z+
    [0, 3, 5], // 7: x-, y+, z+
];

pub struct BlockMesh {
    topology: Topology,
    positions: Vec<DVec3>,
    density0: Vec<f64>,
    energy0: Vec<f64>,
    bytes_allocated: usize,
}

impl BlockMesh {
    /// Builds an `nx * ny * nz` structured hexahedral block of the given physical
    /// dimensions. `field` assigns initial `(density, energy)` from a cell's centroid,
    /// matching the "per-cell initial density and energy" half of the mesh contract.
    pub fn generate(
        nx: u32,
        ny: u32,
        nz: u32,
        width: f64,
        height: f64,
        depth: f64,
        boundary_spec: BoundarySpec,
        field: impl Fn(DVec3) -> (f64, f64),
    ) -> Result<Self, crate::error::HydroError> {
        let (nx, ny, nz) = (nx as usize, ny as usize, nz as usize);
        let n_nodes = (nx + 1) * (ny + 1) * (nz + 1);
        let n_cells = nx * ny * nz;

        let node_id = |i: usize, j: usize, k: usize| -> u32 {
            (i + j * (nx + 1) + k * (nx + 1) * (ny + 1)) as u32
        };
        let cell_id = |i: usize, j: usize, k: usize| -> usize { i + j * nx + k * nx * ny };

        let mut positions = vec![DVec3::ZERO; n_nodes];
        for k in 0..=nz {
            for j in 0..=ny {
                for i in 0..=nx {
                    let p = DVec3::new(
                        width * i as f64 / nx as f64,
                        height * j as f64 / ny as f64,
                        depth * k as f64 / nz as f64,
                    );
                    positions[node_id(i, j, k) as usize] = p;
                }
            }
        }

        // x-faces: (nx+1) planes, each ny*nz quads.
        let n_xfaces = (nx + 1) * ny * nz;
        let n_yfaces = (ny + 1) * nx * nz;
        let n_zfaces = (nz + 1) * nx * ny;

        let xface_id = |i: usize, j: usize, k: usize| -> u32 { (i + j * (nx + 1) + k * (nx + 1) * ny) as u32 };
        let yface_id =
            |i: usize, j: usize, k: usize| -> u32 { (n_xfaces + i + j * nx + k * nx * (ny + 1)) as u32 };
        let zface_id =
            |i: usize, j: usize, k: usize| -> u32 { (n_xfaces + n_yfaces + i + j * nx + k * nx * ny) as u32 };

        let n_faces = n_xfaces + n_yfaces + n_zfaces;
        let mut faces_to_nodes = vec![Vec::new(); n_faces];
        let mut faces_to_cells = vec![[-1i32; 2]; n_faces];

        for k in 0..nz {
            for j in 0..ny {
                for i in 0..=nx {
                    let f = xface_id(i, j, k) as usize;
                    faces_to_nodes[f] = vec![
                        node_id(i, j, k),
                        node_id(i, j + 1, k),
                        node_id(i, j + 1, k + 1),
                        node_id(i, j, k + 1),
                    ];
                    faces_to_cells[f] = [
                        if i > 0 { cell_id(i - 1, j, k) as i32 } else { -1 },
                        if i < nx { cell_id(i, j, k) as i32 } else { -1 },
                    ];
                }
            }
        }
        for k in 0..nz {
            for i in 0..nx {
                for j in 0..=ny {
                    let f = yface_id(i, j, k) as usize;
                    faces_to_nodes[f] = vec![
                        node_id(i, j, k),
                        node_id(i + 1, j, k),
                        node_id(i + 1, j, k + 1),
                        node_id(i, j, k + 1),
                    ];
                    faces_to_cells[f] = [
                        if j > 0 { cell_id(i, j - 1, k) as i32 } else { -1 },
                        if j < ny { cell_id(i, j, k) as i32 } else { -1 },
                    ];
                }
            }
        }
        for j in 0..ny {
            for i in 0..nx {
                for k in 0..=nz {
                    let f = zface_id(i, j, k) as usize;
                    faces_to_nodes[f] = vec![
                        node_id(i, j, k),
                        node_id(i + 1, j, k),
                        node_id(i + 1, j + 1, k),
                        node_id(i, j + 1, k),
                    ];
                    faces_to_cells[f] = [
                        if k > 0 { cell_id(i, j, k - 1) as i32 } else { -1 },
                        if k < nz { cell_id(i, j, k) as i32 } else { -1 },
                    ];
                }
            }
        }

        let mut cells_to_nodes = vec![Vec::with_capacity(8); n_cells];
        let mut cells_to_faces = vec![Vec::with_capacity(6); n_cells];

        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let c = cell_id(i, j, k);
                    cells_to_nodes[c] = CORNER_OFFSETS
                        .iter()
                        .map(|&(dx, dy, dz)| {
                            node_id(
                                i + dx as usize,
                                j + dy as usize,
                                k + dz as usize,
                            )
                        })
                        .collect();
                    cells_to_faces[c] = vec![
                        xface_id(i, j, k),
                        xface_id(i + 1, j, k),
                        yface_id(i, j, k),
                        yface_id(i, j + 1, k),
                        zface_id(i, j, k),
                        zface_id(i, j, k + 1),
                    ];
                }
            }
        }

        let cells_to_nodes = Csr::from_rows(cells_to_nodes);
        let cells_to_faces = Csr::from_rows(cells_to_faces);
        let faces_to_nodes = Csr::from_rows(faces_to_nodes);

        // Subcell topology: one subcell per (cell, local corner).
        let mut subcells_to_faces = vec![Vec::with_capacity(3); cells_to_nodes.flat().len()];
        let mut subcells_to_subcells = vec![Vec::with_capacity(6); cells_to_nodes.flat().len()];

        for c in 0..n_cells {
            let cell_faces = cells_to_faces.row(c);
            let cell_nodes = cells_to_nodes.row(c);

            for (corner, &ring) in CORNER_FACES.iter().enumerate() {
                let s = cells_to_nodes.offsets()[c] as usize + corner;
                subcells_to_faces[s] = ring.iter().map(|&slot| cell_faces[slot]).collect();

                let mut neighbours = Vec::with_capacity(6);

                // Same-cell siblings: corners one bit away in the (x,y,z) corner code.
                let (bx, by, bz) = CORNER_OFFSETS[corner];
                for (other, &(ox, oy, oz)) in CORNER_OFFSETS.iter().enumerate() {
                    let flips = (ox != bx) as u32 + (oy != by) as u32 + (oz != bz) as u32;
                    if flips == 1 {
                        neighbours.push((cells_to_nodes.offsets()[c] as usize + other) as u32);
                    }
                }

                // Cross-face siblings: the same global node in the cell across each
                // incident face, if that face isn't on the domain boundary.
                for &slot in &ring {
                    let f = cell_faces[slot] as usize;
                    let [c0, c1] = faces_to_cells[f];
                    let other_cell = if c0 == c as i32 {
                        c1
                    } else {
                        c0
                    };
                    if other_cell >= 0 {
                        let other_cell = other_cell as usize;
                        let this_node = cell_nodes[corner];
                        if let Some(local) = cells_to_nodes
                            .row(other_cell)
                            .iter()
                            .position(|&n| n == this_node)
                        {
                            neighbours.push(
                                (cells_to_nodes.offsets()[other_cell] as usize + local) as u32,
                            );
                        }
                    }
                }

                subcells_to_subcells[s] = neighbours;
            }
        }

        let subcells_to_faces = Csr::from_rows(subcells_to_faces);
        let subcells_to_subcells = Csr::from_rows(subcells_to_subcells);

        // Node-to-node adjacency: each cell's 12 cube edges (corner pairs one bit apart
        // in the CORNER_OFFSETS code), deduplicated across the cells that share an edge.
        let mut node_edges: Vec<std::collections::BTreeSet<u32>> = vec![Default::default(); n_nodes];
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let c = cell_id(i, j, k);
                    let cell_nodes = cells_to_nodes.row(c);
                    for ((a, &(ax, ay, az)), (b, &(bx, by, bz))) in
                        CORNER_OFFSETS.iter().enumerate().tuple_combinations()
                    {
                        let flips = (ax != bx) as u32 + (ay != by) as u32 + (az != bz) as u32;
                        if flips != 1 {
                            continue;
                        }
                        let (na, nb) = (cell_nodes[a], cell_nodes[b]);
                        node_edges[na as usize].insert(nb);
                        node_edges[nb as usize].insert(na);
                    }
                }
            }
        }
        let node_adjacency = Csr::from_rows(
            node_edges
                .into_iter()
                .map(|set| set.into_iter().collect::<Vec<_>>()),
        );

        let mut boundary = vec![BoundaryKind::Interior; n_nodes];
        for k in 0..=nz {
            for j in 0..=ny {
                for i in 0..=nx {
                    let sides: [(bool, DVec3, FaceBoundary); 6] = [
                        (i == 0, DVec3::new(-1.0, 0.0, 0.0), boundary_spec.x_lo),
                        (i == nx, DVec3::new(1.0, 0.0, 0.0), boundary_spec.x_hi),
                        (j == 0, DVec3::new(0.0, -1.0, 0.0), boundary_spec.y_lo),
                        (j == ny, DVec3::new(0.0, 1.0, 0.0), boundary_spec.y_hi),
                        (k == 0, DVec3::new(0.0, 0.0, -1.0), boundary_spec.z_lo),
                        (k == nz, DVec3::new(0.0, 0.0, 1.0), boundary_spec.z_hi),
                    ];

                    let mut reflect_normal = DVec3::ZERO;
                    let mut fixed_velocity = None;
                    let mut outflow = false;

                    for (on_face, axis_normal, kind) in sides {
                        if !on_face {
                            continue;
                        }
                        match kind {
                            FaceBoundary::Reflect => reflect_normal += axis_normal,
                            FaceBoundary::Fixed(v) => fixed_velocity = Some(v),
                            FaceBoundary::Outflow => outflow = true,
                        }
                    }

                    let kind = if outflow {
                        BoundaryKind::Outflow
                    } else if let Some(v) = fixed_velocity {
                        BoundaryKind::Fixed { velocity: v }
                    } else if reflect_normal != DVec3::ZERO {
                        BoundaryKind::Reflect {
                            normal: reflect_normal.normalize(),
                        }
                    } else {
                        BoundaryKind::Interior
                    };

                    boundary[node_id(i, j, k) as usize] = kind;
                }
            }
        }

        let topology = Topology::build(
            n_nodes,
            cells_to_nodes,
            cells_to_faces,
            faces_to_nodes,
            faces_to_cells,
            subcells_to_faces,
            subcells_to_subcells,
            node_adjacency,
            boundary,
        )?;

        let mut density0 = vec![0.0; n_cells];
        let mut energy0 = vec![0.0; n_cells];

        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let c = cell_id(i, j, k);
                    let corners = topology
                        .cells_to_nodes
                        .row(c)
                        .iter()
                        .map(|&n| positions[n as usize])
                        .collect::<Vec<_>>();
                    let centroid: DVec3 = corners.iter().copied().sum::<DVec3>() / corners.len() as f64;
                    let (rho, e) = field(centroid);
                    density0[c] = rho;
                    energy0[c] = e;
                }
            }
        }

        let bytes_allocated = positions.len() * std::mem::size_of::<DVec3>()
            + density0.len() * std::mem::size_of::<f64>() * 2
            + topology.cells_to_nodes.flat().len() * std::mem::size_of::<u32>() * 2
            + topology.faces_to_nodes.flat().len() * std::mem::size_of::<u32>()
            + topology.subcells_to_subcells.flat().len() * std::mem::size_of::<u32>() * 2
            + topology.node_adjacency.flat().len() * std::mem::size_of::<u32>();

        Ok(Self {
            topology,
            positions,
            density0,
            energy0,
            bytes_allocated,
        })
    }
}

impl MeshSource for BlockMesh {
    fn topology(&self) -> &Topology {
        &self.topology
    }

    fn node_positions(&self) -> &[DVec3] {
        &self.positions
    }

    fn cell_density0(&self) -> &[f64] {
        &self.density0
    }

    fn cell_energy0(&self) -> &[f64] {
        &self.energy0
    }

    fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;

    #[test]
    fn single_cell_block_has_expected_counts() {
        let mesh = BlockMesh::generate(1, 1, 1, 1.0, 1.0, 1.0, BoundarySpec::all_reflect(), |_| {
            (1.0, 1.0)
        })
        .unwrap();

        check!(mesh.topology().n_cells == 1);
        check!(mesh.topology().n_nodes == 8);
        check!(mesh.topology().n_faces == 6);
        check!(mesh.topology().n_subcells == 8);
        // A single cell has no neighbouring cells, so every subcell has exactly its
        // three same-cell siblings and no cross-face neighbours.
        for s in 0..8 {
            check!(mesh.topology().subcells_to_subcells.row(s).len() == 3);
        }
    }

    #[test]
    fn interior_faces_of_a_two_cell_block_are_shared() {
        let mesh = BlockMesh::generate(2, 1, 1, 2.0, 1.0, 1.0, BoundarySpec::all_reflect(), |_| {
            (1.0, 1.0)
        })
        .unwrap();

        let topo = mesh.topology();
        let interior_faces = topo
            .faces_to_cells
            .iter()
            .filter(|pair| pair[0] >= 0 && pair[1] >= 0)
            .count();
        check!(interior_faces == 1);
        check!(topo.n_cells == 2);
    }

    #[test]
    fn boundary_nodes_get_reflect_normals() {
        let mesh = BlockMesh::generate(1, 1, 1, 1.0, 1.0, 1.0, BoundarySpec::all_reflect(), |_| {
            (1.0, 1.0)
        })
        .unwrap();

        for kind in &mesh.topology().boundary {
            check!(matches!(kind, BoundaryKind::Reflect { .. }));
        }
    }
}
