use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ProofError;

/// How responses are proved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ProofScheme {
    /// One signature from the named key, or the backend's default key.
    #[serde(rename_all = "camelCase")]
    Signature {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        key_id: Option<String>,
    },
    /// A circuit-backed proof of the expression's answer.
    ZeroKnowledge,
    /// Signatures from `threshold` of the listed keys.
    #[serde(rename_all = "camelCase")]
    MultiSignature { threshold: usize, key_ids: Vec<String> },
}

impl Default for ProofScheme {
    fn default() -> Self {
        Self::Signature { key_id: None }
    }
}

impl fmt::Display for ProofScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signature { .. } => write!(f, "signature"),
            Self::ZeroKnowledge => write!(f, "zero-knowledge"),
            Self::MultiSignature { threshold, key_ids } => {
                write!(f, "multi-signature({}/{})", threshold, key_ids.len())
            }
        }
    }
}

impl ProofScheme {
    pub fn signature() -> Self {
        Self::default()
    }

    pub fn signature_with_key(key_id: impl Into<String>) -> Self {
        Self::Signature {
            key_id: Some(key_id.into()),
        }
    }

    pub fn multi_signature<I, S>(threshold: usize, key_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::MultiSignature {
            threshold,
            key_ids: key_ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Reject schemes that can never produce a proof.
    pub fn validate(&self) -> Result<(), ProofError> {
        if let Self::MultiSignature { threshold, key_ids } = self {
            if *threshold == 0 {
                return Err(ProofError::InvalidScheme(
                    "multi-signature threshold must be at least 1".into(),
                ));
            }
            if *threshold > key_ids.len() {
                return Err(ProofError::InvalidScheme(format!(
                    "threshold {} exceeds the {} configured signers",
                    threshold,
                    key_ids.len()
                )));
            }
        }
        Ok(())
    }
}
