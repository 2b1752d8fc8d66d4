//! Topology Model — the in-memory neuron/dendrite/synapse graph.
//!
//! Pure data plus per-entity construction invariants. No evaluation logic
//! lives here; the Compiler linearises this graph into the packed network
//! the Step Engine actually runs on.

use std::collections::HashMap;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Index of a neuron within a [`Topology`]. Stable once assigned: neurons
/// are never removed or reordered after construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NeuronId(pub usize);

/// Builds the `"x{col}y{row}"` id used for lookup, inspection, and region
/// membership.
pub fn coord_key(x: usize, y: usize) -> String {
    format!("x{x}y{y}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NeuronKind {
    /// Regular neuron: evaluated every tick, thresholded against `threshold`.
    Regular,
    /// Input-locked neuron: never overwritten by the step engine; its value
    /// changes only through external injection (`set`, click, paint).
    InputLocked,
}

/// A weighted connection from a source neuron to a dendrite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Synapse {
    pub source: NeuronId,
    /// The input this synapse expects to see, in `[0, 1]`.
    pub weight: f32,
}

/// An input branch of one neuron: a weighted aggregate of synapses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dendrite {
    /// Excitatory if positive, inhibitory if negative, in `[-1, 1]`.
    pub weight: f32,
    pub synapses: Vec<Synapse>,
}

/// One cell of the grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Neuron {
    pub id: String,
    pub kind: NeuronKind,
    pub threshold: f32,
    pub dendrites: Vec<Dendrite>,
    pub value: f32,
}

impl Neuron {
    pub fn is_input_locked(&self) -> bool {
        matches!(self.kind, NeuronKind::InputLocked)
    }
}

/// Named group of neuron references, maintained for construction and
/// book-keeping only — the Step Engine never reads regions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Region {
    pub name: String,
    pub members: Vec<NeuronId>,
}

impl Region {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    pub fn push(&mut self, id: NeuronId) {
        self.members.push(id);
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// The graph of neurons, dendrites, synapses and named regions. Pure data:
/// evaluation lives in [`crate::engine::StepEngine`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topology {
    neurons: Vec<Neuron>,
    id_index: HashMap<String, NeuronId>,
    pub regions: HashMap<String, Region>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.neurons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neurons.is_empty()
    }

    pub fn neurons(&self) -> &[Neuron] {
        &self.neurons
    }

    /// Mutable access to every neuron, for in-place balance transforms.
    pub fn neurons_mut(&mut self) -> &mut [Neuron] {
        &mut self.neurons
    }

    /// Append a regular neuron with the given threshold. Returns its id.
    pub fn add_neuron(&mut self, id: impl Into<String>, threshold: f32) -> NeuronId {
        let id = id.into();
        let neuron_id = NeuronId(self.neurons.len());
        self.neurons.push(Neuron {
            id: id.clone(),
            kind: NeuronKind::Regular,
            threshold,
            dendrites: Vec::new(),
            value: 0.0,
        });
        self.id_index.insert(id, neuron_id);
        neuron_id
    }

    /// Append an input-locked neuron (no dendrites, threshold is ignored).
    pub fn add_input_neuron(&mut self, id: impl Into<String>) -> NeuronId {
        let id = id.into();
        let neuron_id = NeuronId(self.neurons.len());
        self.neurons.push(Neuron {
            id: id.clone(),
            kind: NeuronKind::InputLocked,
            threshold: 0.0,
            dendrites: Vec::new(),
            value: 0.0,
        });
        self.id_index.insert(id, neuron_id);
        neuron_id
    }

    /// Append a dendrite with its synapses to a neuron, validating both the
    /// dendrite weight range and the non-empty synapse requirement. Each
    /// synapse's weight is validated too. Returns the dendrite's index
    /// within that neuron's dendrite list.
    pub fn add_dendrite(
        &mut self,
        neuron: NeuronId,
        weight: f32,
        synapses: Vec<Synapse>,
    ) -> EngineResult<usize> {
        if !(-1.0..=1.0).contains(&weight) {
            return Err(EngineError::InvalidDendriteWeight { weight });
        }
        if synapses.is_empty() {
            return Err(EngineError::EmptyDendrite);
        }
        for syn in &synapses {
            if !(0.0..=1.0).contains(&syn.weight) {
                return Err(EngineError::InvalidSynapseWeight { weight: syn.weight });
            }
        }
        let neuron_mut = self.neuron_mut(neuron)?;
        let dend_idx = neuron_mut.dendrites.len();
        neuron_mut.dendrites.push(Dendrite { weight, synapses });
        Ok(dend_idx)
    }

    pub fn get_neuron(&self, id: NeuronId) -> EngineResult<&Neuron> {
        self.neurons
            .get(id.0)
            .ok_or_else(|| EngineError::UnknownId(format!("{id:?}")))
    }

    fn neuron_mut(&mut self, id: NeuronId) -> EngineResult<&mut Neuron> {
        self.neurons
            .get_mut(id.0)
            .ok_or_else(|| EngineError::UnknownId(format!("{id:?}")))
    }

    pub fn get_neuron_by_id(&self, id: &str) -> EngineResult<&Neuron> {
        let idx = self
            .id_index
            .get(id)
            .ok_or_else(|| EngineError::UnknownId(id.to_string()))?;
        self.get_neuron(*idx)
    }

    pub fn id_of(&self, id: &str) -> EngineResult<NeuronId> {
        self.id_index
            .get(id)
            .copied()
            .ok_or_else(|| EngineError::UnknownId(id.to_string()))
    }

    pub fn get_neuron_by_coord(&self, x: usize, y: usize) -> EngineResult<&Neuron> {
        self.get_neuron_by_id(&coord_key(x, y))
    }

    /// Return a fresh `height x width` copy of neuron values. Neurons
    /// missing from the grid (shouldn't happen for a well-formed topology)
    /// read as 0.0.
    pub fn snapshot_grid(&self, width: usize, height: usize) -> Array2<f32> {
        let mut grid = Array2::zeros((height, width));
        for y in 0..height {
            for x in 0..width {
                if let Ok(n) = self.get_neuron_by_coord(x, y) {
                    grid[[y, x]] = n.value;
                }
            }
        }
        grid
    }

    pub fn region(&self, name: &str) -> Option<&Region> {
        self.regions.get(name)
    }

    pub fn region_mut(&mut self, name: &str) -> &mut Region {
        self.regions
            .entry(name.to_string())
            .or_insert_with(|| Region::new(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_neuron_assigns_stable_sequential_ids() {
        let mut topo = Topology::new();
        let a = topo.add_neuron("x0y0", 0.5);
        let b = topo.add_neuron("x1y0", 0.5);
        assert_eq!(a, NeuronId(0));
        assert_eq!(b, NeuronId(1));
        assert_eq!(topo.len(), 2);
    }

    #[test]
    fn dendrite_weight_out_of_range_rejected() {
        let mut topo = Topology::new();
        let a = topo.add_neuron("x0y0", 0.5);
        let b = topo.add_neuron("x1y0", 0.5);
        let err = topo
            .add_dendrite(a, 1.5, vec![Synapse { source: b, weight: 0.5 }])
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidDendriteWeight { .. }));
    }

    #[test]
    fn synapse_weight_out_of_range_rejected() {
        let mut topo = Topology::new();
        let a = topo.add_neuron("x0y0", 0.5);
        let b = topo.add_neuron("x1y0", 0.5);
        let err = topo
            .add_dendrite(a, 1.0, vec![Synapse { source: b, weight: 1.5 }])
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidSynapseWeight { .. }));
    }

    #[test]
    fn empty_dendrite_rejected() {
        let mut topo = Topology::new();
        let a = topo.add_neuron("x0y0", 0.5);
        let err = topo.add_dendrite(a, 1.0, vec![]).unwrap_err();
        assert!(matches!(err, EngineError::EmptyDendrite));
    }

    #[test]
    fn unknown_id_lookup_fails() {
        let topo = Topology::new();
        let err = topo.get_neuron_by_id("x9y9").unwrap_err();
        assert!(matches!(err, EngineError::UnknownId(_)));
    }

    #[test]
    fn snapshot_grid_reads_values_in_row_major_order() {
        let mut topo = Topology::new();
        topo.add_neuron("x0y0", 0.5);
        topo.add_neuron("x1y0", 0.5);
        let grid = topo.snapshot_grid(2, 1);
        assert_eq!(grid.shape(), &[1, 2]);
    }
}
