use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::BTreeMap;

use vqp_core::{CryptographicPort, SignatureProof, VqpError, ZkProof};

use crate::circuits;
use crate::error::CryptoError;
use crate::keys::{KeyPair, PublicKey};
use crate::signing;

/// In-process signing backend holding named Ed25519 keys.
///
/// Also proves the commitment circuits in [`crate::circuits`].
pub struct KeyringCrypto {
    keys: DashMap<String, KeyPair>,
    default_key: String,
}

impl KeyringCrypto {
    /// Create a keyring whose default key is `keypair`.
    pub fn new(default_key: impl Into<String>, keypair: KeyPair) -> Self {
        let default_key = default_key.into();
        let keys = DashMap::new();
        keys.insert(default_key.clone(), keypair);
        Self { keys, default_key }
    }

    /// Create a keyring with a freshly generated default key.
    pub fn generate(default_key: impl Into<String>) -> Self {
        Self::new(default_key, KeyPair::generate())
    }

    pub fn add_key(&self, id: impl Into<String>, keypair: KeyPair) {
        let id = id.into();
        tracing::debug!(key_id = %id, public_key = %keypair.public_key().to_hex(), "key added");
        self.keys.insert(id, keypair);
    }

    pub fn public_key(&self, id: &str) -> Option<PublicKey> {
        self.keys.get(id).map(|kp| kp.public_key())
    }

    pub fn default_key_id(&self) -> &str {
        &self.default_key
    }

    pub fn default_public_key(&self) -> Option<PublicKey> {
        self.public_key(&self.default_key)
    }

    pub fn key_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.keys.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    fn sign_with(&self, payload: &[u8], key_id: &str) -> Result<SignatureProof, CryptoError> {
        let keypair = self
            .keys
            .get(key_id)
            .ok_or_else(|| CryptoError::UnknownKey(key_id.to_string()))?;
        Ok(signing::sign_proof(payload, &keypair))
    }
}

#[async_trait]
impl CryptographicPort for KeyringCrypto {
    async fn sign(&self, payload: &[u8], key_id: Option<&str>) -> Result<SignatureProof, VqpError> {
        let key_id = key_id.unwrap_or(self.default_key.as_str());
        self.sign_with(payload, key_id).map_err(|e| {
            tracing::warn!(key_id, error = %e, "signing failed");
            VqpError::signature_failed(e.to_string())
        })
    }

    async fn verify(&self, proof: &SignatureProof, payload: &[u8], public_key: &str) -> bool {
        if !proof.public_key.eq_ignore_ascii_case(public_key) {
            return false;
        }
        signing::verify_proof(proof, payload).is_ok()
    }

    async fn holds_key(&self, public_key: &str) -> bool {
        self.keys
            .iter()
            .any(|entry| entry.value().public_key().to_hex().eq_ignore_ascii_case(public_key))
    }

    async fn generate_zk_proof(
        &self,
        circuit_id: &str,
        private_inputs: &serde_json::Value,
        public_inputs: &BTreeMap<String, serde_json::Value>,
    ) -> Result<ZkProof, VqpError> {
        circuits::prove(circuit_id, private_inputs, public_inputs).map_err(|e| {
            VqpError::evaluation(format!("zero-knowledge proving failed: {}", e))
                .with_details(serde_json::json!({ "backend": "zk", "circuit": circuit_id }))
        })
    }

    async fn verify_zk_proof(
        &self,
        proof: &ZkProof,
        public_inputs: &BTreeMap<String, serde_json::Value>,
        circuit_id: Option<&str>,
    ) -> bool {
        if circuit_id.is_some_and(|id| id != proof.circuit) {
            return false;
        }
        circuits::verify(proof, public_inputs)
    }
}
