//! Vectorised fuzzy-connectionist cellular automaton engine.
//!
//! Five components, leaves first: [`topology`] (the neuron/dendrite/synapse
//! graph), [`builder`] (grid + mask/Wolfram-rule factory), [`compiler`]
//! (linearises a topology into a dense [`compiler::PackedNetwork`]),
//! [`engine`] (the per-tick vectorised evaluator), and [`session`] (the
//! per-client action dispatcher, autoplay loop, and metrics). [`inspector`]
//! is a read-only adjunct over topology + engine; [`catalog`] is the static
//! experiment descriptor table.
//!
//! The HTTP listener, wire transport, CORS policy, and frontend rendering
//! that would sit in front of [`session::SessionController`] are out of
//! scope for this crate; only their message shapes are modelled, in
//! [`session::protocol`].

pub mod builder;
pub mod catalog;
pub mod compiler;
pub mod engine;
pub mod error;
pub mod inspector;
pub mod session;
pub mod topology;

pub use compiler::PackedNetwork;
pub use engine::StepEngine;
pub use error::{EngineError, EngineResult};
pub use topology::Topology;
