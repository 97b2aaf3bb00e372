//! The connectivity arrays relating cells, faces, nodes, and subcells (spec §3, §9).
//!
//! Every variable-length relation is stored as a `Csr`: a reusable compressed-sparse
//! offset+list pair whose iteration is safe to parallelize by the outer index, because
//! each row borrows a disjoint slice of the flat array.

use glam::DVec3;

use crate::error::HydroError;

/// A compressed-sparse-row adjacency: `offsets.len() == n_rows + 1`, and row `i` is
/// `flat[offsets[i]..offsets[i + 1]]`.
#[derive(Clone, Debug, Default)]
pub struct Csr {
    offsets: Vec<u32>,
    flat: Vec<u32>,
}

impl Csr {
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = Vec<u32>>,
    {
        let mut offsets = vec![0u32];
        let mut flat = Vec::new();

        for row in rows {
            flat.extend_from_slice(&row);
            offsets.push(flat.len() as u32);
        }

        Self { offsets, flat }
    }

    pub fn len(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn row(&self, i: usize) -> &[u32] {
        let lo = self.offsets[i] as usize;
        let hi = self.offsets[i + 1] as usize;
        &self.flat[lo..hi]
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    pub fn flat(&self) -> &[u32] {
        &self.flat
    }

    /// Inverts a `src -> dst` relation into the `dst -> src` relation, given the number
    /// of distinct destinations. This is how `nodes_to_faces`, `nodes_to_cells`, and
    /// similar reverse maps get built from their forward counterparts (spec §3's
    /// "symmetric node/subcell/face adjacencies").
    pub fn invert(&self, n_dst: usize) -> Csr {
        let mut counts = vec![0u32; n_dst];
        for &d in &self.flat {
            counts[d as usize] += 1;
        }

        let mut offsets = vec![0u32; n_dst + 1];
        for i in 0..n_dst {
            offsets[i + 1] = offsets[i] + counts[i];
        }

        let mut flat = vec![0u32; self.flat.len()];
        let mut cursor = offsets.clone();
        for (src, row_end) in self.offsets.iter().skip(1).enumerate() {
            let row_start = self.offsets[src] as usize;
            for &dst in &self.flat[row_start..*row_end as usize] {
                let pos = &mut cursor[dst as usize];
                flat[*pos as usize] = src as u32;
                *pos += 1;
            }
        }

        Csr { offsets, flat }
    }
}

/// Reflect / fixed-velocity / outflow tagging for boundary nodes (spec §9 design note:
/// "replace the integer `boundary_type` with a tagged variant").
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum BoundaryKind {
    Interior,
    Reflect { normal: DVec3 },
    Fixed { velocity: DVec3 },
    Outflow,
}

impl Default for BoundaryKind {
    fn default() -> Self {
        BoundaryKind::Interior
    }
}

/// A subcell is the unique `(cell, node)` pair (spec §3 Glossary). `cell` and `local_node`
/// (the node's position within the cell's node list) together identify it; `node` is the
/// global node index.
#[derive(Copy, Clone, Debug)]
pub struct SubcellId {
    pub cell: u32,
    pub node: u32,
}

/// The immutable topology of one run, built once from the input mesh (spec §3
/// Lifecycle: "Topology is built once ... and is immutable for the run").
pub struct Topology {
    pub n_cells: usize,
    pub n_faces: usize,
    pub n_nodes: usize,
    pub n_subcells: usize,

    pub cells_to_nodes: Csr,
    pub cells_to_faces: Csr,
    pub faces_to_nodes: Csr,
    pub faces_to_cells: Vec<[i32; 2]>,
    pub nodes_to_faces: Csr,
    pub nodes_to_cells: Csr,

    /// Subcell index `s` corresponds to `(cells_to_nodes` entry `s)`; `subcell_of(cell,
    /// local_node)` recovers it.
    pub subcells_to_faces: Csr,
    pub subcells_to_subcells: Csr,

    /// Node-to-node adjacency across a subcell edge (spec §4.5's "neighbouring node
    /// reached across a subcell edge"), resolved to the true opposite node of the edge
    /// in the median-mesh sense rather than the reference's `node_r_index = 0`
    /// placeholder (spec §9 open question).
    pub node_adjacency: Csr,

    pub boundary: Vec<BoundaryKind>,

    /// A proper coloring of `node_adjacency` (no two adjacent nodes share a color),
    /// available for any kernel that wants to partition node-adjacency work into
    /// scatter-free parallel passes.
    pub av_edge_colors: Vec<u8>,
}

impl Topology {
    /// Assembles and validates a topology from the raw relations a mesh source supplies.
    /// `cells_to_nodes` gives each cell's node ring (in the same order its subcells are
    /// indexed); `cells_to_faces`/`faces_to_nodes`/`faces_to_cells` are as in spec §3.
    pub fn build(
        n_nodes: usize,
        cells_to_nodes: Csr,
        cells_to_faces: Csr,
        faces_to_nodes: Csr,
        faces_to_cells: Vec<[i32; 2]>,
        subcells_to_faces: Csr,
        subcells_to_subcells: Csr,
        node_adjacency: Csr,
        boundary: Vec<BoundaryKind>,
    ) -> Result<Self, HydroError> {
        let n_cells = cells_to_nodes.len();
        let n_faces = faces_to_nodes.len();
        let n_subcells = cells_to_nodes.flat().len();

        if faces_to_cells.len() != n_faces {
            return Err(HydroError::MeshInvalid(format!(
                "faces_to_cells has {} entries, expected {n_faces}",
                faces_to_cells.len()
            )));
        }
        if boundary.len() != n_nodes {
            return Err(HydroError::MeshInvalid(format!(
                "boundary table has {} entries, expected {n_nodes} nodes",
                boundary.len()
            )));
        }

        for (f, pair) in faces_to_cells.iter().enumerate() {
            if pair[0] == pair[1] {
                return Err(HydroError::MeshInvalid(format!(
                    "face {f} lists the same cell on both sides ({})",
                    pair[0]
                )));
            }
        }

        for c in 0..n_cells {
            for &f in cells_to_faces.row(c) {
                let [c0, c1] = faces_to_cells[f as usize];
                if c0 != c as i32 && c1 != c as i32 {
                    return Err(HydroError::MeshInvalid(format!(
                        "cell {c} claims face {f} but face {f}'s cells are {c0}/{c1}"
                    )));
                }
            }
        }

        let nodes_to_faces = faces_to_nodes.invert(n_nodes);
        let nodes_to_cells = cells_to_nodes.invert(n_nodes);

        let av_edge_colors = color_edges(&node_adjacency);

        Ok(Self {
            n_cells,
            n_faces,
            n_nodes,
            n_subcells,
            cells_to_nodes,
            cells_to_faces,
            faces_to_nodes,
            faces_to_cells,
            nodes_to_faces,
            nodes_to_cells,
            subcells_to_faces,
            subcells_to_subcells,
            node_adjacency,
            boundary,
            av_edge_colors,
        })
    }

    /// Flat subcell index of `(cell, local_node)`.
    pub fn subcell_index(&self, cell: usize, local_node: usize) -> usize {
        self.cells_to_nodes.offsets()[cell] as usize + local_node
    }
}

/// Greedy sequential coloring of the undirected graph described by `adjacency` (each row
/// lists its node's neighbours): each node takes the smallest color not already used by
/// an already-colored neighbour. Unlike a plain two-coloring BFS, this always produces a
/// valid coloring — it escalates to a third (or later) color whenever the graph has an
/// odd cycle and two colors aren't enough — so same-colored nodes never share an edge.
fn color_edges(adjacency: &Csr) -> Vec<u8> {
    let n = adjacency.len();
    let mut color: Vec<Option<u8>> = vec![None; n];

    for u in 0..n {
        let mut used = std::collections::BTreeSet::new();
        for &v in adjacency.row(u) {
            if let Some(c) = color[v as usize] {
                used.insert(c);
            }
        }

        let mut candidate = 0u8;
        while used.contains(&candidate) {
            candidate += 1;
        }
        color[u] = Some(candidate);
    }

    color.into_iter().map(|c| c.unwrap_or(0)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;

    #[test]
    fn csr_round_trips_rows() {
        let csr = Csr::from_rows(vec![vec![0, 1], vec![2], vec![1, 2, 3]]);
        check!(csr.len() == 3);
        check!(csr.row(0) == [0, 1]);
        check!(csr.row(1) == [2]);
        check!(csr.row(2) == [1, 2, 3]);
    }

    #[test]
    fn csr_invert_is_consistent() {
        // cells -> nodes
        let c2n = Csr::from_rows(vec![vec![0, 1, 2], vec![1, 2, 3]]);
        let n2c = c2n.invert(4);
        check!(n2c.row(0) == [0]);
        check!(n2c.row(1) == [0, 1]);
        check!(n2c.row(2) == [0, 1]);
        check!(n2c.row(3) == [1]);
    }

    #[test]
    fn coloring_has_no_monochrome_edges_on_an_even_cycle() {
        // A 4-cycle: 0-1-2-3-0.
        let adj = Csr::from_rows(vec![vec![1, 3], vec![0, 2], vec![1, 3], vec![0, 2]]);
        let colors = color_edges(&adj);
        for u in 0..4 {
            for &v in adj.row(u) {
                check!(colors[u] != colors[v as usize]);
            }
        }
    }

    #[test]
    fn coloring_escalates_past_two_colors_on_an_odd_cycle() {
        // A 3-cycle (triangle): 0-1-2-0, not 2-colorable.
        let adj = Csr::from_rows(vec![vec![1, 2], vec![0, 2], vec![0, 1]]);
        let colors = color_edges(&adj);
        for u in 0..3 {
            for &v in adj.row(u) {
                check!(colors[u] != colors[v as usize]);
            }
        }
        check!(colors.iter().copied().max().unwrap() >= 2);
    }
}
