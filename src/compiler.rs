//! Compiler — linearises a [`Topology`] into a dense [`PackedNetwork`] the
//! Step Engine runs on. A setup-time, O(N*S) pass; never re-run mid-session
//! except on a full reconnect.

use ndarray::{Array1, Array2};

use crate::topology::{NeuronId, Topology};

/// Dense, padded representation of a compiled [`Topology`]. Ragged
/// per-neuron synapse/dendrite lists are padded to `max_syn`/`max_dendrites`
/// with an explicit validity mask, so the Step Engine can run one gather and
/// one segment-reduction over the whole network instead of looping.
#[derive(Debug, Clone)]
pub struct PackedNetwork {
    /// Neurons actually present in the topology.
    pub n_real: usize,
    /// `n_real`, or `n_real + 1` if a ghost zero-neuron was appended for an
    /// out-of-network synapse source.
    pub n_total: usize,
    pub max_syn: usize,
    pub max_dendrites: usize,

    /// Current neuron values, length `n_total`.
    pub values: Array1<f32>,
    /// Per-neuron activation threshold, length `n_real`.
    pub thresholds: Array1<f32>,
    /// True where the neuron is input-locked, length `n_real`.
    pub input_locked: Array1<bool>,

    /// `[n_real, max_syn]` synapse weight (expected input in `[0, 1]`).
    pub syn_weight: Array2<f32>,
    /// `[n_real, max_syn]` source neuron index into `values`.
    pub syn_source: Array2<usize>,
    /// `[n_real, max_syn]` the owning dendrite's weight, broadcast per synapse.
    pub syn_dend_weight: Array2<f32>,
    /// `[n_real, max_syn]` whether this synapse slot is populated.
    pub syn_valid: Array2<bool>,
    /// `[n_real, max_syn]` owning dendrite index, invalid slots pointing at
    /// the trash column (`max_dendrites`) so reductions never leak into a
    /// real dendrite's accumulator.
    pub syn_dend_id_safe: Array2<usize>,

    /// `[n_real, max_dendrites]` dendrite weight, precomputed once.
    pub dend_weight: Array2<f32>,
    /// `[n_real, max_dendrites]` whether the dendrite has >= 1 valid synapse.
    pub dend_valid: Array2<bool>,
}

impl PackedNetwork {
    /// Compiles `topology`. Referentially transparent: compiling the same
    /// topology twice yields identical arrays.
    pub fn compile(topology: &Topology) -> PackedNetwork {
        let n_real = topology.len();

        let mut max_syn = 0usize;
        let mut max_dend = 0usize;
        for neuron in topology.neurons() {
            let total_syn: usize = neuron.dendrites.iter().map(|d| d.synapses.len()).sum();
            max_syn = max_syn.max(total_syn);
            max_dend = max_dend.max(neuron.dendrites.len());
        }
        if max_syn == 0 {
            max_syn = 1;
        }
        if max_dend == 0 {
            max_dend = 1;
        }

        let mut values = Array1::<f32>::zeros(n_real);
        let mut thresholds = Array1::<f32>::zeros(n_real);
        let mut input_locked = Array1::<bool>::from_elem(n_real, false);

        let mut syn_weight = Array2::<f32>::zeros((n_real, max_syn));
        let mut syn_source = Array2::<usize>::zeros((n_real, max_syn));
        let mut syn_dend_weight = Array2::<f32>::zeros((n_real, max_syn));
        let mut syn_valid = Array2::<bool>::from_elem((n_real, max_syn), false);
        let mut syn_dend_id = Array2::<usize>::zeros((n_real, max_syn));

        for (i, neuron) in topology.neurons().iter().enumerate() {
            values[i] = neuron.value;
            thresholds[i] = neuron.threshold;
            input_locked[i] = neuron.is_input_locked();

            let mut syn_idx = 0usize;
            for (d_idx, dendrite) in neuron.dendrites.iter().enumerate() {
                for synapse in &dendrite.synapses {
                    syn_weight[[i, syn_idx]] = synapse.weight;
                    syn_dend_weight[[i, syn_idx]] = dendrite.weight;
                    syn_valid[[i, syn_idx]] = true;
                    syn_dend_id[[i, syn_idx]] = d_idx;
                    syn_source[[i, syn_idx]] = resolve_source(synapse.source, n_real);
                    syn_idx += 1;
                }
            }
        }

        let has_border = syn_source.iter().any(|&s| s == n_real);
        let n_total = if has_border {
            n_real + 1
        } else {
            // Clamp any stray out-of-range index as a safety net; a
            // well-formed topology never produces one.
            for s in syn_source.iter_mut() {
                if *s >= n_real {
                    *s = n_real.saturating_sub(1);
                }
            }
            n_real
        };

        let mut full_values = Array1::<f32>::zeros(n_total);
        full_values.slice_mut(ndarray::s![..n_real]).assign(&values);

        // Trash column at index max_dend catches synapses from invalid
        // (padding) slots so they never corrupt a real dendrite's reduction.
        let trash = max_dend;
        let mut syn_dend_id_safe = syn_dend_id.clone();
        for i in 0..n_real {
            for j in 0..max_syn {
                if !syn_valid[[i, j]] {
                    syn_dend_id_safe[[i, j]] = trash;
                }
            }
        }

        let expanded = max_dend + 1;
        let mut dend_weight_full = Array2::<f32>::zeros((n_real, expanded));
        let mut dend_count_full = Array2::<f32>::zeros((n_real, expanded));
        for i in 0..n_real {
            for j in 0..max_syn {
                let d = syn_dend_id_safe[[i, j]];
                if syn_valid[[i, j]] {
                    dend_weight_full[[i, d]] = syn_dend_weight[[i, j]];
                    dend_count_full[[i, d]] += 1.0;
                }
            }
        }
        let dend_weight = dend_weight_full.slice(ndarray::s![.., ..max_dend]).to_owned();
        let dend_valid = dend_count_full
            .slice(ndarray::s![.., ..max_dend])
            .mapv(|c| c > 0.0);

        PackedNetwork {
            n_real,
            n_total,
            max_syn,
            max_dendrites: max_dend,
            values: full_values,
            thresholds,
            input_locked,
            syn_weight,
            syn_source,
            syn_dend_weight,
            syn_valid,
            syn_dend_id_safe,
            dend_weight,
            dend_valid,
        }
    }
}

/// A [`NeuronId`] is always a valid index into its own topology; the only
/// way to reach the ghost path is a sentinel id equal to the topology's
/// length, which a non-toroidal Builder variant could construct for a
/// synapse that falls outside the grid. The current toroidal Builder never
/// produces one.
fn resolve_source(source: NeuronId, n_real: usize) -> usize {
    if source.0 >= n_real {
        n_real
    } else {
        source.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Synapse;

    fn small_topology() -> Topology {
        let mut topo = Topology::new();
        let a = topo.add_neuron("a", 0.5);
        let b = topo.add_neuron("b", 0.5);
        topo.add_dendrite(a, 1.0, vec![Synapse { source: b, weight: 0.5 }]).unwrap();
        topo
    }

    #[test]
    fn compile_is_referentially_transparent() {
        let topo = small_topology();
        let p1 = PackedNetwork::compile(&topo);
        let p2 = PackedNetwork::compile(&topo);
        assert_eq!(p1.syn_weight, p2.syn_weight);
        assert_eq!(p1.syn_source, p2.syn_source);
        assert_eq!(p1.dend_weight, p2.dend_weight);
    }

    #[test]
    fn no_border_no_ghost_neuron() {
        let topo = small_topology();
        let packed = PackedNetwork::compile(&topo);
        assert_eq!(packed.n_total, packed.n_real);
    }

    #[test]
    fn ghost_neuron_appended_for_out_of_network_source() {
        let mut topo = Topology::new();
        let a = topo.add_neuron("a", 0.5);
        let ghost = NeuronId(topo.len()); // sentinel: one past the last real neuron
        topo.add_dendrite(a, 1.0, vec![Synapse { source: ghost, weight: 0.5 }]).unwrap();
        let packed = PackedNetwork::compile(&topo);
        assert_eq!(packed.n_total, packed.n_real + 1);
        assert_eq!(packed.values[packed.n_real], 0.0);
        assert_eq!(packed.syn_source[[0, 0]], packed.n_real);
    }

    #[test]
    fn dendrite_mask_marks_empty_padding_invalid() {
        let mut topo = Topology::new();
        let a = topo.add_neuron("a", 0.5);
        let b = topo.add_neuron("b", 0.5);
        topo.add_dendrite(a, 1.0, vec![Synapse { source: b, weight: 0.5 }]).unwrap();
        // b has no dendrites at all -> its row is all padding.
        let packed = PackedNetwork::compile(&topo);
        let b_idx = b.0;
        assert!(packed.dend_valid.row(b_idx).iter().all(|&v| !v));
    }
}
