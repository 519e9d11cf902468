use ed25519_dalek::{Signer, Verifier};
use vqp_core::SignatureProof;

use crate::error::CryptoError;
use crate::keys::{KeyPair, PublicKey};

/// Algorithm tag written into signature proofs.
pub const ED25519: &str = "ed25519";

/// Ed25519 signature (64 bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    inner: ed25519_dalek::Signature,
}

impl Signature {
    pub fn to_bytes(&self) -> [u8; 64] {
        self.inner.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes_arr: [u8; 64] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidInput(format!("signature must be 64 bytes, got {}", bytes.len()))
        })?;
        Ok(Self {
            inner: ed25519_dalek::Signature::from_bytes(&bytes_arr),
        })
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn from_hex(hex_str: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(hex_str)
            .map_err(|e| CryptoError::InvalidInput(format!("invalid signature hex: {}", e)))?;
        Self::from_bytes(&bytes)
    }
}

/// Sign a message using Ed25519.
pub fn sign(message: &[u8], keypair: &KeyPair) -> Signature {
    Signature {
        inner: keypair.signing_key().sign(message),
    }
}

/// Verify an Ed25519 signature.
pub fn verify(message: &[u8], signature: &Signature, pubkey: &PublicKey) -> Result<(), CryptoError> {
    pubkey
        .verifying_key()
        .verify(message, &signature.inner)
        .map_err(|_| CryptoError::SignatureVerificationFailed)
}

/// Sign a payload and package the result as a wire signature proof.
pub fn sign_proof(payload: &[u8], keypair: &KeyPair) -> SignatureProof {
    SignatureProof {
        algorithm: ED25519.to_string(),
        public_key: keypair.public_key().to_hex(),
        signature: sign(payload, keypair).to_hex(),
    }
}

/// Verify a wire signature proof over `payload` using the key it embeds.
pub fn verify_proof(proof: &SignatureProof, payload: &[u8]) -> Result<(), CryptoError> {
    if !proof.algorithm.eq_ignore_ascii_case(ED25519) {
        return Err(CryptoError::InvalidInput(format!(
            "unsupported signature algorithm: {}",
            proof.algorithm
        )));
    }
    let pubkey = PublicKey::from_hex(&proof.public_key)?;
    let signature = Signature::from_hex(&proof.signature)?;
    verify(payload, &signature, &pubkey)
}
