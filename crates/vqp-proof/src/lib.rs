//! VQP Proof: Canonical response payloads and the orchestration of
//! signature, zero-knowledge and multi-signature proofs.

pub mod canonical;
pub mod circuit;
pub mod error;
pub mod orchestrator;
pub mod scheme;

pub use canonical::{build_canonical_payload, canonical_json, PayloadFields};
pub use circuit::{select_circuit, CircuitPlan};
pub use error::ProofError;
pub use orchestrator::ProofOrchestrator;
pub use scheme::ProofScheme;
