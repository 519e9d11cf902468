//! VQP Engine: The query pipeline, response modes, and reference
//! collaborators.

pub mod adapters;
pub mod error;
pub mod modes;
pub mod service;

pub use error::EngineError;
pub use modes::{Evaluated, ModeEngine, ModeOutcome};
pub use service::{wrap_internal, VqpService, VqpServiceBuilder};
