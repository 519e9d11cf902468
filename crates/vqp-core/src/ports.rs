//! Collaborator contracts consumed by the protocol engine.
//!
//! Every call is async so backends may do I/O (filesystem reads, network
//! vocabulary fetches, slow proving). Implementations own any shared state
//! they keep and are responsible for its synchronization.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::VqpError;
use crate::mode::{ObfuscationConfig, OfferedProof};
use crate::proof::{SignatureProof, ZkProof};
use crate::types::{ObfuscationApplied, Query, Response, VocabularySchema};

/// Read access to the holder's vault.
#[async_trait]
pub trait DataAccessPort: Send + Sync {
    /// Fetch the value stored at `path`, or `None` when absent.
    async fn get_data(&self, path: &[String]) -> Result<Option<serde_json::Value>, VqpError>;

    /// Whether `requester` may read `path`.
    async fn validate_data_access(&self, path: &[String], requester: &str) -> bool;
}

/// Signing and zero-knowledge proving backend.
#[async_trait]
pub trait CryptographicPort: Send + Sync {
    /// Sign `payload` with the named key, or the default key.
    async fn sign(&self, payload: &[u8], key_id: Option<&str>) -> Result<SignatureProof, VqpError>;

    /// Verify a signature over `payload` against a hex-encoded public key.
    async fn verify(&self, proof: &SignatureProof, payload: &[u8], public_key: &str) -> bool;

    /// Whether this backend holds the secret key for a hex public key.
    async fn holds_key(&self, _public_key: &str) -> bool {
        false
    }

    /// Produce a circuit-backed proof.
    async fn generate_zk_proof(
        &self,
        circuit_id: &str,
        _private_inputs: &serde_json::Value,
        _public_inputs: &BTreeMap<String, serde_json::Value>,
    ) -> Result<ZkProof, VqpError> {
        Err(VqpError::evaluation(format!(
            "zero-knowledge circuit '{}' not supported by this backend",
            circuit_id
        ))
        .with_details(serde_json::json!({ "backend": "zk", "circuit": circuit_id })))
    }

    /// Verify a circuit-backed proof against its public inputs.
    async fn verify_zk_proof(
        &self,
        _proof: &ZkProof,
        _public_inputs: &BTreeMap<String, serde_json::Value>,
        _circuit_id: Option<&str>,
    ) -> bool {
        false
    }
}

/// Vocabulary schema resolution and allow-listing.
#[async_trait]
pub trait VocabularyPort: Send + Sync {
    async fn resolve_vocabulary(&self, uri: &str) -> Result<VocabularySchema, VqpError>;

    async fn is_vocabulary_allowed(&self, uri: &str) -> bool;

    /// Whether every field referenced by `expr` is declared by `schema`.
    async fn validate_against_vocabulary(
        &self,
        expr: &serde_json::Value,
        schema: &VocabularySchema,
    ) -> bool;
}

/// Where in the pipeline an audited error happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester: Option<String>,
    pub stage: String,
}

impl AuditContext {
    pub fn for_query(query: &Query, stage: impl Into<String>) -> Self {
        Self {
            query_id: Some(query.id.clone()),
            requester: Some(query.requester.clone()),
            stage: stage.into(),
        }
    }

    pub fn anonymous(stage: impl Into<String>) -> Self {
        Self {
            query_id: None,
            requester: None,
            stage: stage.into(),
        }
    }
}

/// Append-only record of processed queries and failures.
#[async_trait]
pub trait AuditPort: Send + Sync {
    async fn log_query(&self, query: &Query, response: &Response);

    async fn log_error(&self, error: &VqpError, context: &AuditContext);
}

/// What the holder is asked to consent to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRequest {
    pub query_id: String,
    pub requester: String,
    /// Protocol field names whose values would be disclosed.
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsentDecision {
    pub granted: bool,
    pub decided_at: DateTime<Utc>,
    pub reason: Option<String>,
}

/// Asks the data holder whether a value may be disclosed.
#[async_trait]
pub trait ConsentPort: Send + Sync {
    async fn request_consent(&self, request: &ConsentRequest) -> Result<ConsentDecision, VqpError>;
}

/// Outcome of verifying a requester's offered proof.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutualVerification {
    pub verified: bool,
    pub verified_claims: Vec<String>,
    pub reason: Option<String>,
}

/// Verifies the claims a requester offers in reciprocal mode.
#[async_trait]
pub trait MutualVerificationPort: Send + Sync {
    async fn verify_requester(
        &self,
        requester: &str,
        offered: &OfferedProof,
        required_claims: &[String],
    ) -> Result<MutualVerification, VqpError>;
}

/// Result of an obfuscation transform.
#[derive(Debug, Clone, PartialEq)]
pub struct Obfuscated {
    /// Structured disclosure (e.g. `{"min": 20, "max": 30}` for ranges).
    pub value: serde_json::Value,
    /// Scalar form usable as a response `result`.
    pub scalar: serde_json::Value,
    pub applied: ObfuscationApplied,
}

/// Numeric disclosure transforms.
#[async_trait]
pub trait ObfuscationPort: Send + Sync {
    async fn obfuscate(
        &self,
        value: &serde_json::Value,
        config: &ObfuscationConfig,
    ) -> Result<Obfuscated, VqpError>;
}
