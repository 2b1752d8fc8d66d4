//! Builder — factory that turns grid dimensions plus a mask or Wolfram rule
//! into a [`Topology`] with toroidal connectivity and optional balance
//! transforms applied.

pub mod masks;
pub mod presets;

use rand_chacha::ChaCha8Rng as StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::topology::{coord_key, NeuronId, Synapse, Topology};
use masks::Mask;

/// Which regime a built topology belongs to. Session reconnection does a
/// full restart when this changes (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaskKind {
    Kohonen,
    Wolfram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceMode {
    None,
    Weight,
    SynapseCount,
}

impl Default for BalanceMode {
    fn default() -> Self {
        BalanceMode::None
    }
}

/// Resolves a grid offset toroidally: opposite edges are identified.
pub fn wrap_coord(x: i64, y: i64, width: usize, height: usize) -> (usize, usize) {
    let w = width as i64;
    let h = height as i64;
    (x.rem_euclid(w) as usize, y.rem_euclid(h) as usize)
}

/// Creates `width*height` neurons in row-major order. Cells in `input_rows`
/// are input-locked; cells in `output_rows` are regular neurons tagged into
/// the "output" region (only for book-keeping, the engine treats them like
/// any other regular neuron); everything else is "internal".
pub fn build_grid(
    width: usize,
    height: usize,
    input_rows: &[usize],
    output_rows: &[usize],
    threshold: f32,
) -> Topology {
    let mut topo = Topology::new();
    for y in 0..height {
        for x in 0..width {
            let id = coord_key(x, y);
            let neuron_id = if input_rows.contains(&y) {
                topo.add_input_neuron(id)
            } else {
                topo.add_neuron(id, threshold)
            };
            let region_name = if input_rows.contains(&y) {
                "input"
            } else if output_rows.contains(&y) {
                "output"
            } else {
                "internal"
            };
            topo.region_mut(region_name).push(neuron_id);
        }
    }
    topo
}

/// Applies a mask to every cell of a `width x height` toroidal grid,
/// wiring one dendrite per template per cell. A template whose offsets all
/// fail to produce a synapse (never happens under toroidal wrap, but kept
/// for the ghost-synapse path described in spec §3/§9) contributes no
/// dendrite.
pub fn apply_mask(
    topo: &mut Topology,
    width: usize,
    height: usize,
    mask: &Mask,
    random_weights: bool,
    seed: u64,
) -> EngineResult<()> {
    let mut rng = StdRng::seed_from_u64(seed);
    for y in 0..height {
        for x in 0..width {
            let target = topo.id_of(&coord_key(x, y))?;
            for template in mask {
                let synapses = build_synapses(topo, x, y, width, height, template, random_weights, &mut rng)?;
                if !synapses.is_empty() {
                    topo.add_dendrite(target, template.dendrite_weight, synapses)?;
                }
            }
        }
    }
    Ok(())
}

fn build_synapses(
    topo: &Topology,
    x: usize,
    y: usize,
    width: usize,
    height: usize,
    template: &masks::DendriteTemplate,
    random_weights: bool,
    rng: &mut StdRng,
) -> EngineResult<Vec<Synapse>> {
    let mut synapses = Vec::with_capacity(template.offsets.len());
    for (i, &(dx, dy)) in template.offsets.iter().enumerate() {
        let (sx, sy) = wrap_coord(x as i64 + dx as i64, y as i64 + dy as i64, width, height);
        let source: NeuronId = topo.id_of(&coord_key(sx, sy))?;
        let weight = if let Some(explicit) = &template.explicit_synapse_weights {
            explicit.get(i).copied().unwrap_or(0.0)
        } else if random_weights {
            rng.gen_range(0.2..=1.0)
        } else {
            1.0
        };
        synapses.push(Synapse { source, weight });
    }
    Ok(synapses)
}

/// Decomposes an 8-bit Wolfram rule into dendrites on `target_row`, one per
/// matching 3-bit pattern, each with three synapses reading the row below
/// through toroidal wrap. Dendrite weight is always +1; callers are
/// expected to set the row's threshold high (0.99) so a dendrite only
/// fires on an exact match.
pub fn apply_wolfram_rule(
    topo: &mut Topology,
    rule: u8,
    target_row: usize,
    width: usize,
    height: usize,
) -> EngineResult<()> {
    const MASK: [(i32, i32); 3] = [(-1, 1), (0, 1), (1, 1)];
    for x in 0..width {
        let target = topo.id_of(&coord_key(x, target_row))?;
        for pattern in 0u8..8 {
            if rule & (1 << pattern) == 0 {
                continue;
            }
            let left = ((pattern >> 2) & 1) as f32;
            let center = ((pattern >> 1) & 1) as f32;
            let right = (pattern & 1) as f32;
            let weights = [left, center, right];

            let mut synapses = Vec::with_capacity(3);
            for (i, &(dx, dy)) in MASK.iter().enumerate() {
                let (sx, sy) = wrap_coord(x as i64 + dx as i64, target_row as i64 + dy as i64, width, height);
                let source = topo.id_of(&coord_key(sx, sy))?;
                synapses.push(Synapse { source, weight: weights[i] });
            }
            topo.add_dendrite(target, 1.0, synapses)?;
        }
    }
    Ok(())
}

/// Shifts excitation/inhibition balance by scaling synapse weights,
/// without changing connectivity shape.
///
/// `target == 0` is a no-op. `target > 0` multiplies every synapse weight
/// in every inhibitory dendrite (weight < 0) by `max(0.01, 1 - target)`.
/// `target < 0` multiplies every synapse weight in every excitatory
/// dendrite (weight > 0) by `max(0.01, 1 + target)`. Results stay clamped
/// to `[0, 1]`.
pub fn balance_by_weight(topo: &mut Topology, target: f32) {
    if target == 0.0 {
        return;
    }
    let (select_inhibitory, factor) = if target > 0.0 {
        (true, (1.0 - target).max(0.01))
    } else {
        (false, (1.0 + target).max(0.01))
    };

    for neuron in topo.neurons_mut() {
        for dendrite in &mut neuron.dendrites {
            let is_inhibitory = dendrite.weight < 0.0;
            if is_inhibitory != select_inhibitory {
                continue;
            }
            for synapse in &mut dendrite.synapses {
                synapse.weight = (synapse.weight * factor).clamp(0.0, 1.0);
            }
        }
    }
}

/// Shifts balance by removing synapses instead of scaling weights.
///
/// `target > 0`: from every inhibitory dendrite with >= 2 synapses, removes
/// `floor(n * |target|)` synapses uniformly at random, never leaving fewer
/// than 1. `target < 0` mirrors this on excitatory dendrites. `target == 0`
/// is a no-op.
pub fn balance_by_synapse_count(topo: &mut Topology, target: f32, seed: u64) {
    if target == 0.0 {
        return;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let select_inhibitory = target > 0.0;
    let fraction = target.abs();

    for neuron in topo.neurons_mut() {
        for dendrite in &mut neuron.dendrites {
            let is_inhibitory = dendrite.weight < 0.0;
            if is_inhibitory != select_inhibitory || dendrite.synapses.len() < 2 {
                continue;
            }
            let n = dendrite.synapses.len();
            let to_remove = ((n as f32) * fraction).floor() as usize;
            let to_remove = to_remove.min(n - 1);
            for _ in 0..to_remove {
                let idx = rng.gen_range(0..dendrite.synapses.len());
                dendrite.synapses.remove(idx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_grid_marks_input_rows() {
        let topo = build_grid(3, 2, &[0], &[], 0.5);
        assert_eq!(topo.get_neuron_by_coord(0, 0).unwrap().kind, crate::topology::NeuronKind::InputLocked);
        assert_eq!(topo.get_neuron_by_coord(0, 1).unwrap().kind, crate::topology::NeuronKind::Regular);
        assert_eq!(topo.region("input").unwrap().len(), 3);
        assert_eq!(topo.region("internal").unwrap().len(), 3);
    }

    #[test]
    fn wrap_coord_identifies_opposite_edges() {
        assert_eq!(wrap_coord(-1, 0, 5, 5), (4, 0));
        assert_eq!(wrap_coord(5, 0, 5, 5), (0, 0));
        assert_eq!(wrap_coord(0, -1, 5, 5), (0, 4));
    }

    #[test]
    fn apply_mask_wires_every_cell() {
        let mut topo = build_grid(4, 4, &[], &[], 0.0);
        let mask = vec![masks::DendriteTemplate::new(1.0, masks::moore(1))];
        apply_mask(&mut topo, 4, 4, &mask, false, 1).unwrap();
        for n in topo.neurons() {
            assert_eq!(n.dendrites.len(), 1);
            assert_eq!(n.dendrites[0].synapses.len(), 8);
        }
    }

    #[test]
    fn apply_mask_toroidal_corner_matches_centre_connection_count() {
        let mut topo = build_grid(30, 30, &[], &[], 0.0);
        let preset = masks::get_preset("wide_hat").unwrap();
        apply_mask(&mut topo, 30, 30, &preset.mask, preset.random_weights, 7).unwrap();
        let corner = topo.get_neuron_by_coord(0, 0).unwrap();
        let centre = topo.get_neuron_by_coord(15, 15).unwrap();
        let corner_syn: usize = corner.dendrites.iter().map(|d| d.synapses.len()).sum();
        let centre_syn: usize = centre.dendrites.iter().map(|d| d.synapses.len()).sum();
        assert_eq!(corner_syn, centre_syn);
    }

    #[test]
    fn wolfram_rule_110_decodes_expected_dendrite_count() {
        let mut topo = build_grid(5, 2, &[], &[], 0.99);
        apply_wolfram_rule(&mut topo, 110, 0, 5, 2).unwrap();
        // rule 110 = 0b01101110 -> bits set at patterns 1,2,3,5,6 => 5 dendrites per cell
        let n = topo.get_neuron_by_coord(0, 0).unwrap();
        assert_eq!(n.dendrites.len(), (110u8).count_ones() as usize);
    }

    #[test]
    fn balance_by_weight_zero_target_is_noop() {
        let mut topo = build_grid(2, 2, &[], &[], 0.0);
        let mask = vec![
            masks::DendriteTemplate::new(1.0, masks::moore(1)),
            masks::DendriteTemplate::new(-1.0, masks::moore(1)),
        ];
        apply_mask(&mut topo, 2, 2, &mask, false, 1).unwrap();
        let before: Vec<f32> = topo
            .neurons()
            .iter()
            .flat_map(|n| n.dendrites.iter().flat_map(|d| d.synapses.iter().map(|s| s.weight)))
            .collect();
        balance_by_weight(&mut topo, 0.0);
        let after: Vec<f32> = topo
            .neurons()
            .iter()
            .flat_map(|n| n.dendrites.iter().flat_map(|d| d.synapses.iter().map(|s| s.weight)))
            .collect();
        assert_eq!(before, after);
    }

    #[test]
    fn balance_by_weight_plus_one_scales_inhibitory_by_0_01() {
        let mut topo = build_grid(2, 2, &[], &[], 0.0);
        let mask = vec![
            masks::DendriteTemplate::new(1.0, masks::moore(1)),
            masks::DendriteTemplate::new(-1.0, masks::moore(1)),
        ];
        apply_mask(&mut topo, 2, 2, &mask, false, 1).unwrap();
        balance_by_weight(&mut topo, 1.0);
        for n in topo.neurons() {
            for d in &n.dendrites {
                if d.weight < 0.0 {
                    for s in &d.synapses {
                        assert!(s.weight < 0.02);
                    }
                }
            }
        }
    }

    #[test]
    fn balance_by_synapse_count_never_empties_a_dendrite() {
        let mut topo = build_grid(3, 3, &[], &[], 0.0);
        let mask = vec![masks::DendriteTemplate::new(-1.0, masks::moore(1))];
        apply_mask(&mut topo, 3, 3, &mask, false, 1).unwrap();
        balance_by_synapse_count(&mut topo, 1.0, 9);
        for n in topo.neurons() {
            for d in &n.dendrites {
                assert!(!d.synapses.is_empty());
            }
        }
    }
}
