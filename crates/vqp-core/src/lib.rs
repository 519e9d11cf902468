//! VQP Core: Wire types, error taxonomy, collaborator ports, and query
//! validation for the Verifiable Query Protocol.

pub mod config;
pub mod error;
pub mod mode;
pub mod ports;
pub mod proof;
pub mod types;
pub mod validator;

pub use config::EngineConfig;
pub use error::{ErrorKind, VqpError};
pub use mode::{
    ConsensualConfig, ObfuscationConfig, ObfuscationMethod, OfferedProof, ReciprocalConfig,
    ResponseMode, ResponseModeKind,
};
pub use ports::{
    AuditContext, AuditPort, ConsentDecision, ConsentPort, ConsentRequest, CryptographicPort,
    DataAccessPort, MutualVerification, MutualVerificationPort, Obfuscated, ObfuscationPort,
    VocabularyPort,
};
pub use proof::{MultiSignatureProof, Proof, SignatureProof, ZkMetadata, ZkProof};
pub use types::{
    now_rfc3339, ConsentProof, Did, FieldDefinition, MutualProof, ObfuscationApplied, Query,
    QueryBody, Response, VocabularySchema, PROTOCOL_VERSION, QUERY_LANG, SUPPORTED_VERSIONS,
};
pub use validator::QueryValidator;
