use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use vqp_core::{
    CryptographicPort, ErrorKind, MultiSignatureProof, Proof, Response, SignatureProof, VqpError,
    ZkProof,
};
use vqp_crypto::circuits::PAYLOAD_HASH_INPUT;
use vqp_crypto::hash_hex;

use crate::canonical::{build_canonical_payload, PayloadFields};
use crate::circuit::select_circuit;
use crate::error::ProofError;
use crate::scheme::ProofScheme;

/// Builds and checks response proofs through a [`CryptographicPort`].
pub struct ProofOrchestrator {
    crypto: Arc<dyn CryptographicPort>,
    scheme: ProofScheme,
    trusted_signers: HashSet<String>,
}

impl ProofOrchestrator {
    pub fn new(crypto: Arc<dyn CryptographicPort>, scheme: ProofScheme) -> Result<Self, VqpError> {
        scheme.validate()?;
        Ok(Self {
            crypto,
            scheme,
            trusted_signers: HashSet::new(),
        })
    }

    /// Only accept signatures from these hex public keys. Without a list,
    /// only keys held by the cryptographic backend are trusted.
    pub fn with_trusted_signers<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.trusted_signers = keys
            .into_iter()
            .map(|k| k.as_ref().to_ascii_lowercase())
            .collect();
        self
    }

    pub fn scheme(&self) -> &ProofScheme {
        &self.scheme
    }

    /// Prove `fields`. `expr` and `context` are only read by the
    /// zero-knowledge scheme, which needs the witness.
    pub async fn prove(
        &self,
        fields: &PayloadFields,
        expr: &Value,
        context: &Value,
    ) -> Result<Proof, VqpError> {
        let payload = build_canonical_payload(fields)?;
        let proof = match &self.scheme {
            ProofScheme::Signature { key_id } => {
                Proof::Signature(self.sign(&payload, key_id.as_deref()).await?)
            }
            ProofScheme::ZeroKnowledge => {
                Proof::ZkProof(self.prove_zk(&payload, fields, expr, context).await?)
            }
            ProofScheme::MultiSignature { threshold, key_ids } => {
                Proof::MultiSignature(self.multi_sign(&payload, *threshold, key_ids).await?)
            }
        };
        tracing::debug!(query_id = %fields.query_id, proof = %proof, "proof attached");
        Ok(proof)
    }

    async fn sign(&self, payload: &[u8], key_id: Option<&str>) -> Result<SignatureProof, VqpError> {
        self.crypto.sign(payload, key_id).await.map_err(|e| {
            if e.kind() == ErrorKind::SignatureFailed {
                e
            } else {
                VqpError::signature_failed(e.message)
            }
        })
    }

    async fn prove_zk(
        &self,
        payload: &[u8],
        fields: &PayloadFields,
        expr: &Value,
        context: &Value,
    ) -> Result<ZkProof, VqpError> {
        let mut plan = select_circuit(expr, &fields.result, context)?;
        plan.public_inputs
            .insert(PAYLOAD_HASH_INPUT.to_string(), Value::String(hash_hex(payload)));
        self.crypto
            .generate_zk_proof(plan.circuit, &plan.private_inputs, &plan.public_inputs)
            .await
            .map_err(|e| {
                let details = serde_json::json!({
                    "backend": "zk",
                    "circuit": plan.circuit,
                    "cause": e.code.code(),
                });
                VqpError::evaluation(e.message).with_details(details)
            })
    }

    async fn multi_sign(
        &self,
        payload: &[u8],
        threshold: usize,
        key_ids: &[String],
    ) -> Result<MultiSignatureProof, VqpError> {
        let mut signatures = Vec::with_capacity(threshold);
        for key_id in key_ids {
            if signatures.len() >= threshold {
                break;
            }
            match self.crypto.sign(payload, Some(key_id.as_str())).await {
                Ok(sig) => signatures.push(sig),
                Err(e) => tracing::warn!(key_id = %key_id, error = %e, "signer unavailable"),
            }
        }
        if signatures.len() < threshold {
            return Err(ProofError::BelowThreshold {
                threshold,
                collected: signatures.len(),
            }
            .into());
        }
        Ok(MultiSignatureProof {
            threshold,
            signatures,
        })
    }

    async fn signer_trusted(&self, public_key: &str) -> bool {
        if self.trusted_signers.is_empty() {
            self.crypto.holds_key(public_key).await
        } else {
            self.trusted_signers
                .contains(&public_key.to_ascii_lowercase())
        }
    }

    async fn verify_signature(&self, sig: &SignatureProof, payload: &[u8]) -> bool {
        if !self.signer_trusted(&sig.public_key).await {
            tracing::debug!(public_key = %sig.public_key, "signer not trusted");
            return false;
        }
        self.crypto.verify(sig, payload, &sig.public_key).await
    }

    /// Check `proof` against `payload`. Never errors.
    pub async fn verify(&self, proof: &Proof, payload: &[u8]) -> bool {
        match proof {
            Proof::Signature(sig) => self.verify_signature(sig, payload).await,
            Proof::MultiSignature(multi) => {
                if multi.threshold == 0 {
                    return false;
                }
                let mut valid = HashSet::new();
                for sig in &multi.signatures {
                    let key = sig.public_key.to_ascii_lowercase();
                    if !valid.contains(&key) && self.verify_signature(sig, payload).await {
                        valid.insert(key);
                    }
                }
                valid.len() >= multi.threshold
            }
            Proof::ZkProof(zk) => {
                let bound = zk
                    .public_inputs
                    .get(PAYLOAD_HASH_INPUT)
                    .and_then(Value::as_str)
                    .is_some_and(|h| h == hash_hex(payload));
                bound
                    && self
                        .crypto
                        .verify_zk_proof(zk, &zk.public_inputs, Some(zk.circuit.as_str()))
                        .await
            }
        }
    }

    /// Recompute the payload of `response` and check its proof.
    pub async fn verify_response(&self, response: &Response) -> bool {
        let Ok(payload) = build_canonical_payload(&PayloadFields::from_response(response)) else {
            return false;
        };
        if let Proof::ZkProof(zk) = &response.proof {
            if zk.public_inputs.get("result") != Some(&response.result) {
                return false;
            }
        }
        self.verify(&response.proof, &payload).await
    }
}
