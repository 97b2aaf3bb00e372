//! Per-run mutable state (spec §3 Data Model): node, cell, and subcell arrays, all
//! indexed in parallel with `Topology`'s corresponding counts. `HydroState` owns no
//! topology of its own; every kernel that touches it is handed a `&Topology` alongside.

use glam::DVec3;

/// Node-centered quantities (spec §4.2/§4.3: positions at two time levels plus the
/// rezoned position the remap target uses, velocity at two time levels, and the nodal
/// mass/volume/soundspeed and force accumulators the predictor/corrector sweep fills).
pub struct NodeState {
    pub x0: Vec<DVec3>,
    pub x1: Vec<DVec3>,
    pub x_rezoned: Vec<DVec3>,
    pub v0: Vec<DVec3>,
    pub v1: Vec<DVec3>,
    pub mass: Vec<f64>,
    pub volume: Vec<f64>,
    pub soundspeed: Vec<f64>,
    pub force_pressure: Vec<DVec3>,
    pub force_visc: Vec<DVec3>,
}

/// Cell-centered quantities at the two time levels the predictor/corrector needs
/// (spec §4.3), plus the centroid cached once per sweep and a mass that never changes
/// after initialization (spec §4 Invariants: "cell mass is set once at init and never
/// recomputed").
pub struct CellState {
    pub centroid: Vec<DVec3>,
    pub density0: Vec<f64>,
    pub density1: Vec<f64>,
    pub energy0: Vec<f64>,
    pub energy1: Vec<f64>,
    pub pressure0: Vec<f64>,
    pub pressure1: Vec<f64>,
    pub mass: Vec<f64>,
}

/// Subcell-centered quantities (spec §3 Glossary, §4.7): the volume/mass/internal-energy
/// density/momentum a subcell carries, its centroid, and the raw `(integral x, integral
/// y, integral z)` moment the remap's divergence-theorem integration produces before it's
/// divided down into a centroid.
pub struct SubcellState {
    pub volume: Vec<f64>,
    pub mass: Vec<f64>,
    pub ie_density: Vec<f64>,
    pub momentum: Vec<DVec3>,
    pub centroid: Vec<DVec3>,
    pub integral: Vec<DVec3>,
}

pub struct HydroState {
    pub node: NodeState,
    pub cell: CellState,
    pub subcell: SubcellState,
}

impl HydroState {
    pub fn zeroed(n_nodes: usize, n_cells: usize, n_subcells: usize) -> Self {
        Self {
            node: NodeState {
                x0: vec![DVec3::ZERO; n_nodes],
                x1: vec![DVec3::ZERO; n_nodes],
                x_rezoned: vec![DVec3::ZERO; n_nodes],
                v0: vec![DVec3::ZERO; n_nodes],
                v1: vec![DVec3::ZERO; n_nodes],
                mass: vec![0.0; n_nodes],
                volume: vec![0.0; n_nodes],
                soundspeed: vec![0.0; n_nodes],
                force_pressure: vec![DVec3::ZERO; n_nodes],
                force_visc: vec![DVec3::ZERO; n_nodes],
            },
            cell: CellState {
                centroid: vec![DVec3::ZERO; n_cells],
                density0: vec![0.0; n_cells],
                density1: vec![0.0; n_cells],
                energy0: vec![0.0; n_cells],
                energy1: vec![0.0; n_cells],
                pressure0: vec![0.0; n_cells],
                pressure1: vec![0.0; n_cells],
                mass: vec![0.0; n_cells],
            },
            subcell: SubcellState {
                volume: vec![0.0; n_subcells],
                mass: vec![0.0; n_subcells],
                ie_density: vec![0.0; n_subcells],
                momentum: vec![DVec3::ZERO; n_subcells],
                centroid: vec![DVec3::ZERO; n_subcells],
                integral: vec![DVec3::ZERO; n_subcells],
            },
        }
    }

    /// Total bytes the state's own arrays occupy (spec §4's startup report: "total bytes
    /// allocated by mesh and state").
    pub fn bytes_allocated(&self) -> usize {
        let n = self.node.x0.len();
        let c = self.cell.centroid.len();
        let s = self.subcell.volume.len();

        let vec3 = std::mem::size_of::<DVec3>();
        let f64_sz = std::mem::size_of::<f64>();

        n * vec3 * 5 + n * f64_sz * 3
            + c * vec3 + c * f64_sz * 7
            + s * (vec3 * 2 + f64_sz * 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::check;

    #[test]
    fn zeroed_state_has_requested_lengths() {
        let st = HydroState::zeroed(8, 1, 8);
        check!(st.node.x0.len() == 8);
        check!(st.cell.mass.len() == 1);
        check!(st.subcell.volume.len() == 8);
    }

    #[test]
    fn bytes_allocated_is_positive_for_nonempty_state() {
        let st = HydroState::zeroed(8, 1, 8);
        check!(st.bytes_allocated() > 0);
    }
}
