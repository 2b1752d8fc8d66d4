//! Preview grid and wiring-statistics computation for preset descriptors
//! (the catalogue entry shape described in spec §6). These are read-only
//! projections of a [`Mask`]; they never touch a live [`Topology`].

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::masks::Mask;

/// Sentinel value marking the inspected/centre cell, matching the
/// convention used by the Inspector's effective weight map.
pub const CENTER_SENTINEL: f32 = 999.0;

/// A square preview of a mask's connectivity, sized `(2R+1) x (2R+1)`
/// where `R` is the mask's maximum Chebyshev radius. `None` marks a cell
/// with no template covering it; the centre cell always holds
/// [`CENTER_SENTINEL`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewGrid {
    pub radius: i32,
    pub cells: Vec<Vec<Option<f32>>>,
}

impl PreviewGrid {
    pub fn size(&self) -> usize {
        (2 * self.radius + 1) as usize
    }

    pub fn center(&self) -> usize {
        self.radius as usize
    }
}

/// Builds the preview grid for a mask: at each offset covered by more than
/// one template, the template with the larger `|weight|` wins.
pub fn compute_preview_grid(mask: &Mask) -> PreviewGrid {
    let radius = mask
        .iter()
        .flat_map(|t| t.offsets.iter())
        .map(|(dx, dy)| dx.abs().max(dy.abs()))
        .max()
        .unwrap_or(0);

    let size = (2 * radius + 1) as usize;
    let center = radius as usize;
    let mut cells = vec![vec![None; size]; size];
    cells[center][center] = Some(CENTER_SENTINEL);

    for template in mask {
        for &(dx, dy) in &template.offsets {
            let col = (center as i32 + dx) as usize;
            let row = (center as i32 + dy) as usize;
            if row < size && col < size {
                let slot = &mut cells[row][col];
                match slot {
                    Some(existing) if existing.abs() >= template.dendrite_weight.abs() => {}
                    _ => *slot = Some(template.dendrite_weight),
                }
            }
        }
    }

    PreviewGrid { radius, cells }
}

/// Static wiring statistics for a mask: per-neuron synapse counts and
/// effective radii, computed by Chebyshev distance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MaskStats {
    pub excitatory_synapses: usize,
    pub inhibitory_synapses: usize,
    pub ratio_exc_inh: f32,
    pub excitation_radius: i32,
    pub inhibition_radius: i32,
}

pub fn compute_mask_stats(mask: &Mask) -> MaskStats {
    let mut exc_synapses = 0usize;
    let mut inh_synapses = 0usize;
    let mut max_exc_radius = 0i32;
    let mut max_inh_radius = 0i32;

    for template in mask {
        let n = template.offsets.len();
        let max_r = template
            .offsets
            .iter()
            .map(|(dx, dy)| dx.abs().max(dy.abs()))
            .max()
            .unwrap_or(0);
        if template.dendrite_weight > 0.0 {
            exc_synapses += n;
            max_exc_radius = max_exc_radius.max(max_r);
        } else {
            inh_synapses += n;
            max_inh_radius = max_inh_radius.max(max_r);
        }
    }

    let ratio = exc_synapses as f32 / inh_synapses.max(1) as f32;
    MaskStats {
        excitatory_synapses: exc_synapses,
        inhibitory_synapses: inh_synapses,
        ratio_exc_inh: (ratio * 1000.0).round() / 1000.0,
        excitation_radius: max_exc_radius,
        inhibition_radius: max_inh_radius,
    }
}

/// Full descriptor for one catalogue entry, the shape served by the (out
/// of scope) HTTP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub center: String,
    pub corona: String,
    pub dendrites_inh: usize,
    pub random_weights: bool,
    pub mask_type: String,
    pub preview_grid: PreviewGrid,
    pub mask_stats: MaskStats,
}

pub fn describe(preset: &super::masks::MaskPreset) -> PresetDescriptor {
    PresetDescriptor {
        id: preset.id.to_string(),
        name: preset.name.to_string(),
        description: preset.description.to_string(),
        center: preset.center.to_string(),
        corona: preset.corona.to_string(),
        dendrites_inh: preset.dendrites_inh,
        random_weights: preset.random_weights,
        mask_type: preset.mask_type.to_string(),
        preview_grid: compute_preview_grid(&preset.mask),
        mask_stats: compute_mask_stats(&preset.mask),
    }
}

/// Grid-shaped (row-major) export of a preview grid, for callers that want
/// a dense matrix instead of nested `Vec`s (e.g. tests comparing via
/// `ndarray`).
pub fn preview_grid_as_array(grid: &PreviewGrid) -> Array2<Option<f32>> {
    let size = grid.size();
    let mut arr = Array2::from_elem((size, size), None);
    for (r, row) in grid.cells.iter().enumerate() {
        for (c, v) in row.iter().enumerate() {
            arr[[r, c]] = *v;
        }
    }
    arr
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::masks::{get_preset, preset_catalogue};

    #[test]
    fn preview_grid_centre_is_sentinel() {
        let simple = get_preset("simple").unwrap();
        let grid = compute_preview_grid(&simple.mask);
        let c = grid.center();
        assert_eq!(grid.cells[c][c], Some(CENTER_SENTINEL));
    }

    #[test]
    fn preview_grid_radius_matches_max_chebyshev_offset() {
        for preset in preset_catalogue() {
            let grid = compute_preview_grid(&preset.mask);
            let expected_radius = preset
                .mask
                .iter()
                .flat_map(|t| t.offsets.iter())
                .map(|(dx, dy)| dx.abs().max(dy.abs()))
                .max()
                .unwrap_or(0);
            assert_eq!(grid.radius, expected_radius, "preset {}", preset.id);
        }
    }

    #[test]
    fn mask_stats_ratio_uses_floored_divisor() {
        let all_exc = get_preset("all_exc").unwrap();
        let stats = compute_mask_stats(&all_exc.mask);
        assert_eq!(stats.inhibitory_synapses, 0);
        assert_eq!(stats.ratio_exc_inh, stats.excitatory_synapses as f32);
    }
}
