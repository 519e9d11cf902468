use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::VqpError;
use crate::mode::{ResponseMode, ResponseModeKind};
use crate::proof::Proof;

/// The only supported expression language tag.
pub const QUERY_LANG: &str = "jsonlogic@1.0.0";

/// Protocol version emitted by this implementation.
pub const PROTOCOL_VERSION: &str = "1.1.0";

/// Protocol versions accepted by default.
pub const SUPPORTED_VERSIONS: &[&str] = &["1.0.0", "1.1.0"];

/// Current time as an RFC 3339 string with millisecond precision.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Decentralized Identifier.
/// Format: `did:<method>:<identifier>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Did(pub String);

impl Did {
    /// Parse and validate a DID string.
    pub fn new(uri: impl Into<String>) -> Result<Self, VqpError> {
        let uri = uri.into();
        let mut parts = uri.splitn(3, ':');
        let scheme = parts.next().unwrap_or_default();
        let method = parts.next().unwrap_or_default();
        let identifier = parts.next().unwrap_or_default();
        if scheme != "did" || method.is_empty() || identifier.is_empty() {
            return Err(VqpError::invalid_query(format!(
                "DID must have format 'did:<method>:<identifier>', got: {}",
                uri
            )));
        }
        Ok(Self(uri))
    }

    /// Create a DID from method and identifier components.
    pub fn from_parts(method: &str, identifier: &str) -> Self {
        Self(format!("did:{}:{}", method, identifier))
    }

    pub fn uri(&self) -> &str {
        &self.0
    }

    /// Extract the method (key, web, peer, ...).
    pub fn method(&self) -> Option<&str> {
        self.0.split(':').nth(1)
    }

    /// Extract the method-specific identifier.
    pub fn identifier(&self) -> Option<&str> {
        self.0.splitn(3, ':').nth(2)
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The evaluable part of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryBody {
    /// Expression language tag, always [`QUERY_LANG`].
    pub lang: String,
    /// Vocabulary URI the expression's field names belong to.
    pub vocab: String,
    /// Untrusted expression supplied by the requester.
    pub expr: serde_json::Value,
}

/// An inbound verifiable query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    /// UUIDv4 query identifier.
    pub id: String,
    pub version: String,
    /// ISO-8601 creation time.
    pub timestamp: String,
    /// Requester DID.
    pub requester: String,
    /// Responder DID the query is addressed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Disclosure policy; strict when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_mode: Option<ResponseMode>,
    pub query: QueryBody,
}

impl Query {
    /// Build a fresh query with a random id and the current timestamp.
    pub fn new(
        requester: impl Into<String>,
        vocab: impl Into<String>,
        expr: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            version: PROTOCOL_VERSION.to_string(),
            timestamp: now_rfc3339(),
            requester: requester.into(),
            target: None,
            response_mode: None,
            query: QueryBody {
                lang: QUERY_LANG.to_string(),
                vocab: vocab.into(),
                expr,
            },
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_response_mode(mut self, mode: ResponseMode) -> Self {
        self.response_mode = Some(mode);
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    /// The effective response mode (strict when absent).
    pub fn mode(&self) -> ResponseMode {
        self.response_mode.clone().unwrap_or_default()
    }
}

/// Record of a consent decision attached to a consensual response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentProof {
    pub granted: bool,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
}

/// Record of a successful requester verification in reciprocal mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutualProof {
    pub requester: String,
    pub verified_claims: Vec<String>,
    pub timestamp: String,
}

/// Parameters of the obfuscation transform that was applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObfuscationApplied {
    pub method: crate::mode::ObfuscationMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy_budget: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_spent: Option<f64>,
}

/// A proved answer to a [`Query`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub query_id: String,
    pub version: String,
    pub timestamp: String,
    /// Responder DID.
    pub responder: String,
    #[serde(default)]
    pub mode: ResponseModeKind,
    /// Disclosure-safe answer; always a scalar or null.
    pub result: serde_json::Value,
    /// Underlying value, only for modes that permit disclosure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    pub proof: Proof,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consent_proof: Option<ConsentProof>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutual_proof: Option<MutualProof>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obfuscation_applied: Option<ObfuscationApplied>,
}

/// Declaration of a queryable field within a vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub name: String,
    /// Expected value type (e.g., "integer", "number", "string", "boolean").
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            description: None,
        }
    }
}

/// A named schema of queryable fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VocabularySchema {
    pub uri: String,
    pub name: String,
    pub version: String,
    pub fields: Vec<FieldDefinition>,
}

impl VocabularySchema {
    /// Whether `field` is declared, either verbatim or through its first
    /// dotted segment.
    pub fn declares(&self, field: &str) -> bool {
        let root = field.split('.').next().unwrap_or(field);
        self.fields.iter().any(|f| f.name == field || f.name == root)
    }
}
