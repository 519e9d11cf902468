use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Cryptographic evidence attached to a response.
///
/// A proof is a snapshot: once built it references no external state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Proof {
    #[serde(rename = "signature")]
    Signature(SignatureProof),
    #[serde(rename = "zk-snark")]
    ZkProof(ZkProof),
    #[serde(rename = "multisig")]
    MultiSignature(MultiSignatureProof),
}

impl Proof {
    /// Wire tag of this proof variant.
    pub fn proof_type(&self) -> &'static str {
        match self {
            Self::Signature(_) => "signature",
            Self::ZkProof(_) => "zk-snark",
            Self::MultiSignature(_) => "multisig",
        }
    }
}

impl fmt::Display for Proof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.proof_type())
    }
}

/// A single signature over the canonical payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureProof {
    /// Signature algorithm (e.g., "ed25519").
    pub algorithm: String,
    /// Hex-encoded public key of the signer.
    pub public_key: String,
    /// Hex-encoded signature bytes.
    pub signature: String,
}

/// Zero-knowledge proof produced by a circuit backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkProof {
    /// Circuit identifier (e.g., "range_threshold").
    pub circuit: String,
    /// Hex-encoded backend proof bytes.
    pub proof: String,
    /// Inputs an independent verifier needs; never the private witness.
    pub public_inputs: BTreeMap<String, serde_json::Value>,
    pub metadata: ZkMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkMetadata {
    /// Proving backend (e.g., "blake3-sigma").
    pub backend: String,
    pub generated_at: String,
}

/// Threshold aggregate of independent signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiSignatureProof {
    pub threshold: usize,
    pub signatures: Vec<SignatureProof>,
}
