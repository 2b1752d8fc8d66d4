//! Experiment descriptor registry: the static, process-wide catalogue of
//! available experiments (id, name, description, default config, and for
//! preset-driven experiments the mask preset catalogue + balance modes), the
//! shape served by the (out of scope) `/api/experiments` endpoint.

use serde::{Deserialize, Serialize};

use crate::builder::presets::{self, PresetDescriptor};
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BalanceModeDescriptor {
    pub id: &'static str,
}

/// The three balance modes spec §6 lists for every preset-driven
/// experiment descriptor.
pub const BALANCE_MODES: [BalanceModeDescriptor; 3] = [
    BalanceModeDescriptor { id: "none" },
    BalanceModeDescriptor { id: "weight" },
    BalanceModeDescriptor { id: "synapse_count" },
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentDescriptor {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    /// Wolfram rule numbers offered by the UI for this experiment, if any.
    pub rules: &'static [u8],
    pub default_config: DefaultConfig,
    /// The mask preset catalogue, present only for preset-driven (Kohonen)
    /// experiments; `None` for Wolfram-rule experiments, which have no mask.
    pub masks: Option<Vec<PresetDescriptor>>,
    /// Present alongside `masks`: the balance modes a preset-driven
    /// experiment can reconnect with.
    pub balance_modes: Option<&'static [BalanceModeDescriptor]>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DefaultConfig {
    pub width: usize,
    pub height: usize,
    pub rule: Option<u8>,
}

fn describe_all_presets() -> Vec<PresetDescriptor> {
    crate::builder::masks::preset_catalogue()
        .iter()
        .map(presets::describe)
        .collect()
}

/// The static experiment catalogue, built once and cached.
pub fn experiment_catalog() -> &'static [ExperimentDescriptor] {
    static CATALOG: std::sync::OnceLock<Vec<ExperimentDescriptor>> = std::sync::OnceLock::new();
    CATALOG.get_or_init(|| {
        vec![
            ExperimentDescriptor {
                id: "von_neumann",
                name: "Elementary Automaton (Von Neumann)",
                description: "1D elementary cellular automaton (Wolfram rules) implemented with synapses, dendrites, and neurons. Each row is one generation of the automaton, propagating bottom to top.",
                rules: &[111, 30, 90, 110],
                default_config: DefaultConfig { width: 50, height: 50, rule: Some(111) },
                masks: None,
                balance_modes: None,
            },
            ExperimentDescriptor {
                id: "kohonen",
                name: "Kohonen (2D Lateral Competition)",
                description: "Self-organising Kohonen map with local excitation and lateral inhibition. 'Mexican hat' profile: neurons excite their close neighbours and inhibit distant ones, forming clusters that compete.",
                rules: &[],
                default_config: DefaultConfig { width: 30, height: 30, rule: None },
                masks: Some(describe_all_presets()),
                balance_modes: Some(&BALANCE_MODES),
            },
        ]
    })
}

pub fn get_experiment(id: &str) -> EngineResult<&'static ExperimentDescriptor> {
    experiment_catalog()
        .iter()
        .find(|e| e.id == id)
        .ok_or_else(|| EngineError::UnknownExperiment(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_lists_von_neumann_and_kohonen() {
        let ids: Vec<&str> = experiment_catalog().iter().map(|e| e.id).collect();
        assert!(ids.contains(&"von_neumann"));
        assert!(ids.contains(&"kohonen"));
    }

    #[test]
    fn unknown_experiment_id_errors() {
        assert!(get_experiment("does_not_exist").is_err());
    }

    #[test]
    fn kohonen_carries_full_preset_catalogue_and_balance_modes() {
        let kohonen = get_experiment("kohonen").unwrap();
        let masks = kohonen.masks.as_ref().unwrap();
        assert_eq!(masks.len(), crate::builder::masks::preset_catalogue().len());
        assert_eq!(kohonen.balance_modes.unwrap().len(), 3);
    }

    #[test]
    fn von_neumann_has_no_mask_catalogue() {
        let von_neumann = get_experiment("von_neumann").unwrap();
        assert!(von_neumann.masks.is_none());
        assert!(von_neumann.balance_modes.is_none());
    }

    #[test]
    fn known_experiment_lookup_never_errors() {
        for e in experiment_catalog() {
            assert!(get_experiment(e.id).is_ok());
        }
    }
}
