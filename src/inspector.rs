//! Inspector — read-only adjunct over the [`Topology`] (never the packed
//! network): given a neuron's coordinates, reports the effective weight
//! contributed by every source that feeds it.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::builder::presets::CENTER_SENTINEL;
use crate::error::EngineResult;
use crate::topology::{coord_key, Topology};

/// Effective weight map for one neuron: `cells[row][col]` holds the clamped
/// sum of `synapse_weight * dendrite_weight` over every synapse whose
/// source sits at `(col, row)`, or `None` if nothing connects there. The
/// inspected cell itself is marked with [`CENTER_SENTINEL`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionReport {
    pub x: usize,
    pub y: usize,
    #[serde(rename = "total_dendritas")]
    pub total_dendrites: usize,
    #[serde(rename = "total_sinapsis")]
    pub total_synapses: usize,
    pub weight_grid: Vec<Vec<Option<f32>>>,
}

/// Computes the effective weight map for the neuron at `(x, y)` in a
/// `width x height` grid.
pub fn inspect(topo: &Topology, x: usize, y: usize, width: usize, height: usize) -> EngineResult<ConnectionReport> {
    let neuron = topo.get_neuron_by_coord(x, y)?;

    let mut weights_by_source: std::collections::HashMap<usize, f32> = std::collections::HashMap::new();
    let mut total_synapses = 0usize;

    for dendrite in &neuron.dendrites {
        for synapse in &dendrite.synapses {
            total_synapses += 1;
            let effective = synapse.weight * dendrite.weight;
            *weights_by_source.entry(synapse.source.0).or_insert(0.0) += effective;
        }
    }
    for w in weights_by_source.values_mut() {
        *w = w.clamp(-1.0, 1.0);
    }

    let mut weight_grid = vec![vec![None; width]; height];
    for row in 0..height {
        for col in 0..width {
            if col == x && row == y {
                weight_grid[row][col] = Some(CENTER_SENTINEL);
                continue;
            }
            if let Ok(source_id) = topo.id_of(&coord_key(col, row)) {
                if let Some(w) = weights_by_source.get(&source_id.0) {
                    weight_grid[row][col] = Some(*w);
                }
            }
        }
    }

    Ok(ConnectionReport {
        x,
        y,
        total_dendrites: neuron.dendrites.len(),
        total_synapses,
        weight_grid,
    })
}

/// Row-major `ndarray` export of a report's weight grid.
pub fn weight_grid_as_array(report: &ConnectionReport) -> Array2<Option<f32>> {
    let height = report.weight_grid.len();
    let width = report.weight_grid.first().map(|r| r.len()).unwrap_or(0);
    let mut arr = Array2::from_elem((height, width), None);
    for (r, row) in report.weight_grid.iter().enumerate() {
        for (c, v) in row.iter().enumerate() {
            arr[[r, c]] = *v;
        }
    }
    arr
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder;

    #[test]
    fn inspected_cell_carries_sentinel() {
        let mut topo = builder::build_grid(3, 3, &[], &[], 0.0);
        let mask = vec![crate::builder::masks::DendriteTemplate::new(1.0, crate::builder::masks::moore(1))];
        builder::apply_mask(&mut topo, 3, 3, &mask, false, 1).unwrap();
        let report = inspect(&topo, 1, 1, 3, 3).unwrap();
        assert_eq!(report.weight_grid[1][1], Some(CENTER_SENTINEL));
    }

    #[test]
    fn shared_source_across_dendrites_sums_before_clamping() {
        let mut topo = Topology::new();
        let src = topo.add_neuron("x0y0", 0.0);
        let target = topo.add_neuron("x1y0", 0.0);
        topo.region_mut("internal").push(src);
        topo.region_mut("internal").push(target);
        topo.add_dendrite(target, 0.8, vec![crate::topology::Synapse { source: src, weight: 1.0 }]).unwrap();
        topo.add_dendrite(target, 0.8, vec![crate::topology::Synapse { source: src, weight: 1.0 }]).unwrap();
        let report = inspect(&topo, 1, 0, 2, 1).unwrap();
        // 0.8 + 0.8 = 1.6, clamped to 1.0
        assert_eq!(report.weight_grid[0][0], Some(1.0));
        assert_eq!(report.total_dendrites, 2);
        assert_eq!(report.total_synapses, 2);
    }

    #[test]
    fn unconnected_cell_reports_none() {
        let topo = builder::build_grid(3, 1, &[], &[], 0.0);
        let report = inspect(&topo, 0, 0, 3, 1).unwrap();
        assert_eq!(report.weight_grid[0][2], None);
    }
}
