use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed taxonomy of protocol error kinds.
///
/// Serialized in `SCREAMING_SNAKE_CASE` so the wire form matches what
/// other VQP implementations emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidQuery,
    EvaluationError,
    SignatureFailed,
    VocabularyNotFound,
    Unauthorized,
    RateLimited,
    NetworkError,
    CryptoError,
    ConfigurationError,
    ConsentDenied,
    ReciprocalVerificationFailed,
    ObfuscationError,
    UnsupportedResponseMode,
}

impl ErrorKind {
    /// Wire code for this kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidQuery => "INVALID_QUERY",
            Self::EvaluationError => "EVALUATION_ERROR",
            Self::SignatureFailed => "SIGNATURE_FAILED",
            Self::VocabularyNotFound => "VOCABULARY_NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::RateLimited => "RATE_LIMITED",
            Self::NetworkError => "NETWORK_ERROR",
            Self::CryptoError => "CRYPTO_ERROR",
            Self::ConfigurationError => "CONFIGURATION_ERROR",
            Self::ConsentDenied => "CONSENT_DENIED",
            Self::ReciprocalVerificationFailed => "RECIPROCAL_VERIFICATION_FAILED",
            Self::ObfuscationError => "OBFUSCATION_ERROR",
            Self::UnsupportedResponseMode => "UNSUPPORTED_RESPONSE_MODE",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A protocol error: a kind from the closed taxonomy, a human-readable
/// message, and optional structured details (e.g. the offending field).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct VqpError {
    pub code: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl VqpError {
    pub fn new(code: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attach structured details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.code
    }

    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidQuery, message)
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EvaluationError, message)
    }

    pub fn signature_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SignatureFailed, message)
    }

    pub fn vocabulary_not_found(uri: &str) -> Self {
        Self::new(
            ErrorKind::VocabularyNotFound,
            format!("vocabulary not found: {}", uri),
        )
        .with_details(serde_json::json!({ "vocabulary": uri }))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    pub fn crypto(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CryptoError, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConfigurationError, message)
    }

    pub fn reciprocal_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ReciprocalVerificationFailed, message)
    }

    pub fn obfuscation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ObfuscationError, message)
    }

    pub fn unsupported_mode(mode: &str) -> Self {
        Self::new(
            ErrorKind::UnsupportedResponseMode,
            format!("unsupported response mode: {}", mode),
        )
        .with_details(serde_json::json!({ "mode": mode }))
    }

    /// Validation failure naming the offending field.
    ///
    /// Structural validation surfaces as `EVALUATION_ERROR` for wire
    /// compatibility with existing VQP peers, even though `INVALID_QUERY`
    /// would describe it better.
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EvaluationError, message)
            .with_details(serde_json::json!({ "field": field }))
    }
}
