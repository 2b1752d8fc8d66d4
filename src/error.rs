use thiserror::Error;

/// Errors raised anywhere in the topology/builder/compiler/engine/session
/// pipeline. Variants line up with the error taxonomy the session boundary
/// translates into `{type: "error"}` messages.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("unknown neuron id: {0}")]
    UnknownId(String),

    #[error("invalid dendrite weight {weight}: must be in [-1, 1]")]
    InvalidDendriteWeight { weight: f32 },

    #[error("invalid synapse weight {weight}: must be in [0, 1]")]
    InvalidSynapseWeight { weight: f32 },

    #[error("dendrite must have at least one synapse")]
    EmptyDendrite,

    #[error("unknown mask preset id: {0}")]
    UnknownPreset(String),

    #[error("unknown experiment id: {0}")]
    UnknownExperiment(String),

    #[error("action requires an active session: {0}")]
    State(String),

    #[error("malformed action message: {0}")]
    Transport(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

pub type EngineResult<T> = Result<T, EngineError>;
