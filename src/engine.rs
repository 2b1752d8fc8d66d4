//! Step Engine — the vectorised per-tick update over a [`PackedNetwork`].
//!
//! Gather -> fuzzy match -> per-dendrite segment mean -> dendrite weight
//! multiply -> competitive fuzzy-OR -> threshold -> input-locked values
//! restored. One call to [`StepEngine::step`] advances every neuron in the
//! network simultaneously; there is no notion of rows or regions here.

use ndarray::Array2;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::compiler::PackedNetwork;
use crate::error::{EngineError, EngineResult};
use crate::topology::Topology;

#[derive(Debug, Clone)]
pub struct StepEngine {
    network: PackedNetwork,
}

impl StepEngine {
    pub fn compile(topology: &Topology) -> Self {
        Self {
            network: PackedNetwork::compile(topology),
        }
    }

    pub fn from_packed(network: PackedNetwork) -> Self {
        Self { network }
    }

    pub fn packed(&self) -> &PackedNetwork {
        &self.network
    }

    pub fn len(&self) -> usize {
        self.network.n_real
    }

    pub fn is_empty(&self) -> bool {
        self.network.n_real == 0
    }

    pub fn value(&self, idx: usize) -> EngineResult<f32> {
        self.network
            .values
            .get(idx)
            .copied()
            .ok_or_else(|| EngineError::UnknownId(format!("neuron index {idx}")))
    }

    /// Overwrites a neuron's current value, clamped to `[0, 1]`. Used for
    /// click/paint external activation; works on input-locked and regular
    /// neurons alike (the step function is what respects locking, not this
    /// setter).
    pub fn set(&mut self, idx: usize, value: f32) -> EngineResult<()> {
        if idx >= self.network.n_real {
            return Err(EngineError::UnknownId(format!("neuron index {idx}")));
        }
        self.network.values[idx] = value.clamp(0.0, 1.0);
        Ok(())
    }

    /// Advances every neuron by one tick.
    #[tracing::instrument(skip(self), fields(n = self.network.n_real))]
    pub fn step(&mut self) {
        let tension = self.compute_tension();
        let net = &mut self.network;
        for i in 0..net.n_real {
            if net.input_locked[i] {
                continue;
            }
            net.values[i] = if tension[i] > net.thresholds[i] { 1.0 } else { 0.0 };
        }
    }

    /// `n` steps without yielding between them.
    pub fn step_n(&mut self, n: usize) {
        for _ in 0..n {
            self.step();
        }
    }

    /// Pre-threshold surface tension per neuron, recomputed fresh from the
    /// current values. A read-only diagnostic: never written back.
    pub fn tension_snapshot(&self) -> Vec<f32> {
        self.compute_tension()
    }

    fn compute_tension(&self) -> Vec<f32> {
        let net = &self.network;

        let compute_row = |i: usize| -> f32 {
            let mut dend_sum = vec![0.0f32; net.max_dendrites];
            let mut dend_count = vec![0.0f32; net.max_dendrites];

            for j in 0..net.max_syn {
                if !net.syn_valid[[i, j]] {
                    continue;
                }
                let source = net.syn_source[[i, j]];
                let input = net.values[source];
                let synapse_match = 1.0 - (net.syn_weight[[i, j]] - input).abs();
                let d = net.syn_dend_id_safe[[i, j]];
                if d < net.max_dendrites {
                    dend_sum[d] += synapse_match;
                    dend_count[d] += 1.0;
                }
            }

            let mut max_val = 0.0f32;
            let mut min_val = 0.0f32;
            for d in 0..net.max_dendrites {
                if !net.dend_valid[[i, d]] {
                    continue;
                }
                let avg = dend_sum[d] / dend_count[d].max(1.0);
                let dend_value = avg * net.dend_weight[[i, d]];
                max_val = max_val.max(dend_value);
                min_val = min_val.min(dend_value);
            }
            (max_val + min_val).clamp(-1.0, 1.0)
        };

        #[cfg(feature = "rayon")]
        {
            (0..net.n_real).into_par_iter().map(compute_row).collect()
        }
        #[cfg(not(feature = "rayon"))]
        {
            (0..net.n_real).map(compute_row).collect()
        }
    }

    /// Row-major `height x width` snapshot of current neuron values.
    pub fn snapshot(&self, width: usize, height: usize) -> Array2<f32> {
        let mut grid = Array2::zeros((height, width));
        for y in 0..height {
            for x in 0..width {
                let idx = y * width + x;
                if idx < self.network.n_real {
                    grid[[y, x]] = self.network.values[idx];
                }
            }
        }
        grid
    }

    /// Row-major `height x width` snapshot of pre-threshold tension.
    pub fn tension_grid(&self, width: usize, height: usize) -> Array2<f32> {
        let tension = self.tension_snapshot();
        let mut grid = Array2::zeros((height, width));
        for y in 0..height {
            for x in 0..width {
                let idx = y * width + x;
                if idx < tension.len() {
                    grid[[y, x]] = tension[idx];
                }
            }
        }
        grid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder;
    use crate::topology::{NeuronKind, Synapse};
    use approx::assert_abs_diff_eq;
    use tracing_subscriber::fmt::format::FmtSpan;

    /// Installs a subscriber so `step`'s `#[tracing::instrument]` span shows
    /// up under `cargo test -- --nocapture`. Safe to call from every test:
    /// `try_init` no-ops once a global subscriber is set.
    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_span_events(FmtSpan::CLOSE)
            .with_test_writer()
            .try_init();
    }

    #[test]
    fn empty_dendrite_holds_neuron_at_zero() {
        init_tracing();
        let mut topo = Topology::new();
        topo.add_neuron("x0y0", 0.0);
        let mut engine = StepEngine::compile(&topo);
        engine.step();
        assert_eq!(engine.value(0).unwrap(), 0.0);
    }

    #[test]
    fn input_locked_neuron_never_overwritten_by_step() {
        let mut topo = Topology::new();
        let input = topo.add_input_neuron("x0y0");
        let regular = topo.add_neuron("x1y0", 0.0);
        topo.add_dendrite(regular, 1.0, vec![Synapse { source: input, weight: 1.0 }]).unwrap();
        let mut engine = StepEngine::compile(&topo);
        engine.set(0, 0.73).unwrap();
        engine.step();
        assert_abs_diff_eq!(engine.value(0).unwrap(), 0.73, epsilon = 1e-6);
    }

    #[test]
    fn exact_match_excitatory_synapse_activates() {
        let mut topo = Topology::new();
        let input = topo.add_input_neuron("in");
        let target = topo.add_neuron("target", 0.5);
        topo.add_dendrite(target, 1.0, vec![Synapse { source: input, weight: 1.0 }]).unwrap();
        let mut engine = StepEngine::compile(&topo);
        engine.set(0, 1.0).unwrap();
        engine.step();
        // fuzzy match = 1 - |1.0 - 1.0| = 1.0 > 0.5 threshold
        assert_eq!(engine.value(1).unwrap(), 1.0);
    }

    #[test]
    fn fully_mismatched_synapse_does_not_activate() {
        let mut topo = Topology::new();
        let input = topo.add_input_neuron("in");
        let target = topo.add_neuron("target", 0.5);
        topo.add_dendrite(target, 1.0, vec![Synapse { source: input, weight: 1.0 }]).unwrap();
        let mut engine = StepEngine::compile(&topo);
        engine.set(0, 0.0).unwrap();
        engine.step();
        // fuzzy match = 1 - |1.0 - 0.0| = 0.0, not > 0.5
        assert_eq!(engine.value(1).unwrap(), 0.0);
    }

    #[test]
    fn competitive_fuzzy_or_cancels_when_excitation_equals_inhibition() {
        let mut topo = Topology::new();
        let input = topo.add_input_neuron("in");
        let target = topo.add_neuron("target", 0.0);
        topo.add_dendrite(target, 1.0, vec![Synapse { source: input, weight: 1.0 }]).unwrap();
        topo.add_dendrite(target, -1.0, vec![Synapse { source: input, weight: 1.0 }]).unwrap();
        let mut engine = StepEngine::compile(&topo);
        engine.set(0, 1.0).unwrap();
        let tension = engine.tension_snapshot();
        assert_abs_diff_eq!(tension[1], 0.0, epsilon = 1e-6);
    }

    #[test]
    fn toroidal_wolfram_rule_110_matches_known_triplet() {
        // 2-row strip: bottom row (y=1) input-locked, rule 110 wired on the
        // top row (y=0), reading the row below through toroidal wrap.
        let mut topo = builder::build_grid(5, 2, &[1], &[], 0.99);
        builder::apply_wolfram_rule(&mut topo, 110, 0, 5, 2).unwrap();
        let mut engine = StepEngine::compile(&topo);
        // input row: 0 0 1 0 0
        for (x, v) in [(0, 0.0), (1, 0.0), (2, 1.0), (3, 0.0), (4, 0.0)] {
            engine.set(5 + x, v).unwrap();
        }
        engine.step();
        let top = engine.snapshot(5, 2);
        // x0: wrap(x4,x0,x1)=(0,0,0) -> pattern 0 -> rule110 bit0 = 0
        // x1: (x0,x1,x2)=(0,0,1)     -> pattern 1 -> rule110 bit1 = 1
        // x2: (x1,x2,x3)=(0,1,0)     -> pattern 2 -> rule110 bit2 = 1
        // x3: (x2,x3,x4)=(1,0,0)     -> pattern 4 -> rule110 bit4 = 0
        // x4: wrap(x3,x4,x0)=(0,0,0) -> pattern 0 -> rule110 bit0 = 0
        assert_eq!([top[[0, 0]], top[[0, 1]], top[[0, 2]], top[[0, 3]], top[[0, 4]]], [0.0, 1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn snapshot_matches_manual_grid_for_regular_cells() {
        let topo = builder::build_grid(3, 2, &[], &[], 0.0);
        let engine = StepEngine::compile(&topo);
        let grid = engine.snapshot(3, 2);
        assert_eq!(grid.shape(), &[2, 3]);
    }

    #[test]
    fn step_preserves_neuron_kind_contract() {
        let mut topo = Topology::new();
        let id = topo.add_input_neuron("a");
        assert_eq!(topo.get_neuron(id).unwrap().kind, NeuronKind::InputLocked);
    }
}
