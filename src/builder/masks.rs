//! Mask helpers and the static mask preset catalogue.
//!
//! A mask is a declarative description of one neuron's dendritic tree,
//! expressed as offsets from the target cell, applied at every cell via
//! toroidal wrap. Ported from `masks.py`'s neighbourhood helpers and
//! preset table (`MASK_PRESETS`).

use rand_chacha::ChaCha8Rng as StdRng;
use rand::{Rng, SeedableRng};

/// One dendrite template: its weight, the offsets of its synapses, and an
/// optional explicit per-synapse weight list (used by Wolfram-rule
/// synthesis; presets in the static catalogue leave this `None` and rely
/// on the Builder's random draw).
#[derive(Debug, Clone)]
pub struct DendriteTemplate {
    pub dendrite_weight: f32,
    pub offsets: Vec<(i32, i32)>,
    pub explicit_synapse_weights: Option<Vec<f32>>,
}

impl DendriteTemplate {
    pub fn new(dendrite_weight: f32, offsets: Vec<(i32, i32)>) -> Self {
        Self {
            dendrite_weight,
            offsets,
            explicit_synapse_weights: None,
        }
    }
}

pub type Mask = Vec<DendriteTemplate>;

/// Moore neighbourhood: Chebyshev distance <= radius, centre excluded.
pub fn moore(radius: i32) -> Vec<(i32, i32)> {
    let mut out = Vec::new();
    for dx in -radius..=radius {
        for dy in -radius..=radius {
            if dx != 0 || dy != 0 {
                out.push((dx, dy));
            }
        }
    }
    out
}

/// Von Neumann neighbourhood: Manhattan distance <= radius, centre excluded.
pub fn von_neumann(radius: i32) -> Vec<(i32, i32)> {
    let mut out = Vec::new();
    for dx in -radius..=radius {
        for dy in -radius..=radius {
            let dist = dx.abs() + dy.abs();
            if dist > 0 && dist <= radius {
                out.push((dx, dy));
            }
        }
    }
    out
}

/// Annular ring: Chebyshev distance in `[r_in, r_out]`.
pub fn ring(r_in: i32, r_out: i32) -> Vec<(i32, i32)> {
    let mut out = Vec::new();
    for dx in -r_out..=r_out {
        for dy in -r_out..=r_out {
            let d = dx.abs().max(dy.abs());
            if d >= r_in && d <= r_out {
                out.push((dx, dy));
            }
        }
    }
    out
}

/// Ring filtered to `(dx + dy) % step == 0`, for a checkerboard-like density.
pub fn sparse_ring(r_in: i32, r_out: i32, step: i32) -> Vec<(i32, i32)> {
    ring(r_in, r_out)
        .into_iter()
        .filter(|(dx, dy)| (dx + dy).rem_euclid(step) == 0)
        .collect()
}

/// Assigns an offset to one of `n_sectors` directional sectors, clockwise
/// from +x (East).
pub fn sector_of(dx: i32, dy: i32, n_sectors: usize) -> usize {
    let angle = (-dy as f64).atan2(dx as f64);
    let width = 2.0 * std::f64::consts::PI / n_sectors as f64;
    let two_pi = 2.0 * std::f64::consts::PI;
    (((angle + width / 2.0).rem_euclid(two_pi)) / width) as usize % n_sectors
}

/// Partitions offsets into up to `n_sectors` directional groups, dropping
/// any sector that ends up empty.
pub fn partition(offsets: &[(i32, i32)], n_sectors: usize) -> Vec<Vec<(i32, i32)>> {
    let mut sectors: Vec<Vec<(i32, i32)>> = vec![Vec::new(); n_sectors];
    for &(dx, dy) in offsets {
        sectors[sector_of(dx, dy, n_sectors)].push((dx, dy));
    }
    sectors.into_iter().filter(|s| !s.is_empty()).collect()
}

/// Builds `n_sectors` inhibitory (or any-weight) dendrite templates from a
/// flat offset set, one per non-empty sector. With `n_sectors <= 1` this
/// collapses to a single dendrite over all offsets.
pub fn make_inhibitory(offsets: &[(i32, i32)], weight: f32, n_sectors: usize) -> Mask {
    if n_sectors <= 1 {
        return vec![DendriteTemplate::new(weight, offsets.to_vec())];
    }
    partition(offsets, n_sectors)
        .into_iter()
        .map(|sector| DendriteTemplate::new(weight, sector))
        .collect()
}

/// Shifts every offset by a fixed vector.
pub fn translate(offsets: &[(i32, i32)], shift: (i32, i32)) -> Vec<(i32, i32)> {
    offsets.iter().map(|(dx, dy)| (dx + shift.0, dy + shift.1)).collect()
}

/// Keeps each offset with probability `density`, using a PRNG seeded
/// explicitly so the result is reproducible for a given seed.
pub fn random_sparse(offsets: &[(i32, i32)], density: f64, seed: u64) -> Vec<(i32, i32)> {
    let mut rng = StdRng::seed_from_u64(seed);
    offsets
        .iter()
        .copied()
        .filter(|_| rng.gen_bool(density.clamp(0.0, 1.0)))
        .collect()
}

/// Metadata + connectivity for one entry in the static preset catalogue.
#[derive(Debug, Clone)]
pub struct MaskPreset {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub center: &'static str,
    pub corona: &'static str,
    pub dendrites_inh: usize,
    pub random_weights: bool,
    pub mask_type: &'static str,
    pub mask: Mask,
}

fn preset(
    id: &'static str,
    name: &'static str,
    description: &'static str,
    center: &'static str,
    corona: &'static str,
    dendrites_inh: usize,
    mask: Mask,
) -> MaskPreset {
    MaskPreset {
        id,
        name,
        description,
        center,
        corona,
        dendrites_inh,
        random_weights: true,
        mask_type: "kohonen",
        mask,
    }
}

fn simple_mask() -> Mask {
    // Exact port of the original KOHONEN_SIMPLE_MASK: one excitatory
    // 8-neighbour dendrite plus eight 3x3 inhibitory blocks at the
    // diagonal/cardinal corners of a radius 2-4 corona.
    vec![
        DendriteTemplate::new(
            1.0,
            vec![
                (-1, -1), (-1, 0), (-1, 1),
                (0, -1), (0, 1),
                (1, -1), (1, 0), (1, 1),
            ],
        ),
        DendriteTemplate::new(-1.0, vec![(2, -4), (2, -3), (2, -2), (3, -4), (3, -3), (3, -2), (4, -4), (4, -3), (4, -2)]),
        DendriteTemplate::new(-1.0, vec![(2, -1), (2, 0), (2, 1), (3, -1), (3, 0), (3, 1), (4, -1), (4, 0), (4, 1)]),
        DendriteTemplate::new(-1.0, vec![(2, 2), (2, 3), (2, 4), (3, 2), (3, 3), (3, 4), (4, 2), (4, 3), (4, 4)]),
        DendriteTemplate::new(-1.0, vec![(-1, 2), (-1, 3), (-1, 4), (0, 2), (0, 3), (0, 4), (1, 2), (1, 3), (1, 4)]),
        DendriteTemplate::new(-1.0, vec![(-4, 2), (-4, 3), (-4, 4), (-3, 2), (-3, 3), (-3, 4), (-2, 2), (-2, 3), (-2, 4)]),
        DendriteTemplate::new(-1.0, vec![(-4, -1), (-4, 0), (-4, 1), (-3, -1), (-3, 0), (-3, 1), (-2, -1), (-2, 0), (-2, 1)]),
        DendriteTemplate::new(-1.0, vec![(-4, -4), (-4, -3), (-4, -2), (-3, -4), (-3, -3), (-3, -2), (-2, -4), (-2, -3), (-2, -2)]),
        DendriteTemplate::new(-1.0, vec![(-1, -4), (-1, -3), (-1, -2), (0, -4), (0, -3), (0, -2), (1, -4), (1, -3), (1, -2)]),
    ]
}

/// The 15-entry mask preset catalogue (2 diagnostic + 13 Mexican-hat
/// shapes), built once and cached.
pub fn preset_catalogue() -> &'static [MaskPreset] {
    static CATALOGUE: std::sync::OnceLock<Vec<MaskPreset>> = std::sync::OnceLock::new();
    CATALOGUE.get_or_init(|| {
        vec![
            preset(
                "all_exc", "Todo Exc", "1 excitatory dendrite r=1 (8 neighbours).",
                "Moore r=1 (8 neighbours)", "no inhibition", 0,
                vec![DendriteTemplate::new(1.0, moore(1))],
            ),
            preset(
                "all_inh", "Todo Inh", "1 inhibitory dendrite r=1 (8 neighbours).",
                "Moore r=1 (8 neighbours)", "no excitation", 1,
                vec![DendriteTemplate::new(-1.0, moore(1))],
            ),
            preset(
                "simple", "Kohonen Simple", "Moore r=1, corona r=2-4, 8 inhibitory dendrites.",
                "Moore r=1 (8 neighbours)", "r=2-4, 8 3x3 blocks", 8,
                simple_mask(),
            ),
            preset(
                "wide_hat", "Sombrero Ancho", "Moore r=1, corona r=2-7, 8 inhibitory dendrites.",
                "Moore r=1 (8 neighbours)", "r=2-7, wide corona", 8,
                {
                    let mut m = vec![DendriteTemplate::new(1.0, moore(1))];
                    m.extend(make_inhibitory(&ring(2, 7), -1.0, 8));
                    m
                },
            ),
            preset(
                "narrow_hat", "Sombrero Estrecho", "Moore r=1, corona r=2-3, 8 inhibitory dendrites.",
                "Moore r=1 (8 neighbours)", "r=2-3, close corona", 8,
                {
                    let mut m = vec![DendriteTemplate::new(1.0, moore(1))];
                    m.extend(make_inhibitory(&ring(2, 3), -1.0, 8));
                    m
                },
            ),
            preset(
                "big_center", "Centro Grande", "Moore r=2 (24 neighbours), corona r=4-7, 8 inhibitory dendrites.",
                "Moore r=2 (24 neighbours)", "r=4-7, far corona", 8,
                {
                    let mut m = vec![DendriteTemplate::new(1.0, moore(2))];
                    m.extend(make_inhibitory(&ring(4, 7), -1.0, 8));
                    m
                },
            ),
            preset(
                "cross_center", "Cruz Central", "Von Neumann r=1 (4 neighbours), corona r=2-4, 4 inhibitory dendrites.",
                "Von Neumann r=1 (4 neighbours)", "r=2-4, 4 cardinal blocks", 4,
                {
                    let mut m = vec![DendriteTemplate::new(1.0, von_neumann(1))];
                    m.extend(make_inhibitory(&ring(2, 4), -1.0, 4));
                    m
                },
            ),
            preset(
                "one_dendrite", "Una Dendrita", "Moore r=1, corona r=2-4 in a single inhibitory dendrite.",
                "Moore r=1 (8 neighbours)", "r=2-4, all in 1 dendrite", 1,
                {
                    let mut m = vec![DendriteTemplate::new(1.0, moore(1))];
                    m.push(DendriteTemplate::new(-1.0, ring(2, 4)));
                    m
                },
            ),
            preset(
                "fine_grain", "Grano Fino", "Moore r=1, corona r=2-4, 16 inhibitory sectors.",
                "Moore r=1 (8 neighbours)", "r=2-4, 16 sectors", 16,
                {
                    let mut m = vec![DendriteTemplate::new(1.0, moore(1))];
                    m.extend(make_inhibitory(&ring(2, 4), -1.0, 16));
                    m
                },
            ),
            preset(
                "double_ring", "Doble Anillo", "Moore r=1, ring r=2-3 (-1) + ring r=5-7 (-0.5).",
                "Moore r=1 (8 neighbours)", "r=2-3 (-1) + r=5-7 (-0.5)", 16,
                {
                    let mut m = vec![DendriteTemplate::new(1.0, moore(1))];
                    m.extend(make_inhibitory(&ring(2, 3), -1.0, 8));
                    m.extend(make_inhibitory(&ring(5, 7), -0.5, 8));
                    m
                },
            ),
            preset(
                "soft_inhibit", "Inhibicion Suave", "Moore r=1, corona r=2-4, weight -0.5.",
                "Moore r=1 (8 neighbours)", "r=2-4, weight -0.5", 8,
                {
                    let mut m = vec![DendriteTemplate::new(1.0, moore(1))];
                    m.extend(make_inhibitory(&ring(2, 4), -0.5, 8));
                    m
                },
            ),
            preset(
                "strong_center", "Centro Fuerte", "Moore r=1 x2 excitatory dendrites, corona r=2-4.",
                "Moore r=1 (2 excitatory dendrites)", "r=2-4, weight -1", 8,
                {
                    let mut m = vec![
                        DendriteTemplate::new(1.0, moore(1)),
                        DendriteTemplate::new(1.0, moore(1)),
                    ];
                    m.extend(make_inhibitory(&ring(2, 4), -1.0, 8));
                    m
                },
            ),
            preset(
                "gradual_center", "Centro Gradual",
                "Gradual exc. r=1(1.0) r=2(0.6) r=3(0.3), 2px gap, sparse inh. r=6-11.",
                "Gradual r=1->1.0, r=2->0.6, r=3->0.3", "r=6-11, checkerboard sparse", 8,
                {
                    let mut m = vec![
                        DendriteTemplate::new(1.0, ring(1, 1)),
                        DendriteTemplate::new(0.6, ring(2, 2)),
                        DendriteTemplate::new(0.3, ring(3, 3)),
                    ];
                    m.extend(make_inhibitory(&sparse_ring(6, 11, 2), -1.0, 8));
                    m
                },
            ),
            preset(
                "gradual_big_inh", "Centro Gradual Big Inh",
                "Gradual exc. r=1-3, 4px gap, sparse inh. r=8-19.",
                "Gradual r=1->1.0, r=2->0.6, r=3->0.3", "r=8-19, sparse step=3", 8,
                {
                    let mut m = vec![
                        DendriteTemplate::new(1.0, ring(1, 1)),
                        DendriteTemplate::new(0.6, ring(2, 2)),
                        DendriteTemplate::new(0.3, ring(3, 3)),
                    ];
                    m.extend(make_inhibitory(&sparse_ring(8, 19, 3), -1.0, 8));
                    m
                },
            ),
            preset(
                "gradual_xxl_inh", "Centro Gradual XXL Inh",
                "Gradual exc. r=1-3, 4px gap, sparse inh. r=8-30.",
                "Gradual r=1->1.0, r=2->0.6, r=3->0.3", "r=8-30, sparse step=4", 8,
                {
                    let mut m = vec![
                        DendriteTemplate::new(1.0, ring(1, 1)),
                        DendriteTemplate::new(0.6, ring(2, 2)),
                        DendriteTemplate::new(0.3, ring(3, 3)),
                    ];
                    m.extend(make_inhibitory(&sparse_ring(8, 30, 4), -1.0, 8));
                    m
                },
            ),
        ]
    })
}

pub fn get_preset(id: &str) -> crate::error::EngineResult<&'static MaskPreset> {
    preset_catalogue()
        .iter()
        .find(|p| p.id == id)
        .ok_or_else(|| crate::error::EngineError::UnknownPreset(id.to_string()))
}
