use serde::{Deserialize, Serialize};
use std::fmt;

use crate::proof::SignatureProof;

/// Mode tags accepted on the wire.
pub const KNOWN_MODE_TAGS: &[&str] = &["strict", "consensual", "reciprocal", "obfuscated"];

/// Disclosure policy requested by a query.
///
/// Wire form: `{"type": "<tag>", "config": {...}}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "config", rename_all = "lowercase")]
pub enum ResponseMode {
    /// Only the raw result is returned.
    #[default]
    Strict,
    /// The value is disclosed only after the holder consents.
    Consensual(ConsensualConfig),
    /// The value is disclosed only after the requester proves its own claims.
    Reciprocal(ReciprocalConfig),
    /// The value is disclosed after a precision-reducing transform.
    Obfuscated(ObfuscationConfig),
}

impl ResponseMode {
    pub fn kind(&self) -> ResponseModeKind {
        match self {
            Self::Strict => ResponseModeKind::Strict,
            Self::Consensual(_) => ResponseModeKind::Consensual,
            Self::Reciprocal(_) => ResponseModeKind::Reciprocal,
            Self::Obfuscated(_) => ResponseModeKind::Obfuscated,
        }
    }
}

/// Bare mode tag, recorded on responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseModeKind {
    #[default]
    Strict,
    Consensual,
    Reciprocal,
    Obfuscated,
}

impl fmt::Display for ResponseModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Consensual => write!(f, "consensual"),
            Self::Reciprocal => write!(f, "reciprocal"),
            Self::Obfuscated => write!(f, "obfuscated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConsensualConfig {
    /// Why the requester needs the underlying value; shown to the holder.
    pub justification: Option<String>,
    /// How long the holder has to decide, in seconds.
    pub consent_timeout: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReciprocalConfig {
    /// Claims the requester must prove before anything is disclosed.
    pub required_claims: Vec<String>,
    /// The requester's offered proof of its own claims.
    pub requester_proof: Option<OfferedProof>,
}

/// Claims a requester offers about itself, signed by an issuer.
///
/// The signature covers the canonical (sorted-key, compact) JSON
/// encoding of `claims`, which name the requester's DID under `subject`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfferedProof {
    /// DID of the claims issuer.
    pub issuer: String,
    pub claims: serde_json::Map<String, serde_json::Value>,
    pub signature: SignatureProof,
}

/// Supported obfuscation transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObfuscationMethod {
    /// Report the bucket of width `precision` containing the value.
    Range,
    /// Add bounded random noise of magnitude up to `noiseLevel`.
    Noise,
    /// Keep `precision` significant digits.
    Rounding,
}

impl fmt::Display for ObfuscationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Range => write!(f, "range"),
            Self::Noise => write!(f, "noise"),
            Self::Rounding => write!(f, "rounding"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObfuscationConfig {
    pub method: ObfuscationMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise_level: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy_budget: Option<f64>,
}

impl ObfuscationConfig {
    pub fn new(method: ObfuscationMethod) -> Self {
        Self {
            method,
            precision: None,
            noise_level: None,
            privacy_budget: None,
        }
    }

    pub fn with_precision(mut self, precision: f64) -> Self {
        self.precision = Some(precision);
        self
    }

    pub fn with_noise_level(mut self, noise_level: f64) -> Self {
        self.noise_level = Some(noise_level);
        self
    }

    pub fn with_privacy_budget(mut self, budget: f64) -> Self {
        self.privacy_budget = Some(budget);
        self
    }
}
