//! Reference collaborators for the engine ports.

pub mod audit;
pub mod consent;
pub mod mutual;
pub mod obfuscation;
pub mod vault;

pub use audit::{AuditEntry, AuditOutcome, MemoryAuditLog, TracingAuditLog, DEFAULT_AUDIT_CAPACITY};
pub use consent::ConsentPolicy;
pub use mutual::{TrustedClaimsVerifier, VerificationCheck, VerificationResult, SUBJECT_CLAIM};
pub use obfuscation::StandardObfuscator;
pub use vault::{AccessPolicy, AccessRule, FileVault, MemoryVault};
