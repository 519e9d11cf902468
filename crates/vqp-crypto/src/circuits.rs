//! Circuits the commitment backend can prove.
//!
//! `range_threshold` covers single comparisons against an integer
//! threshold, for both true and false answers. `set_membership` covers
//! positive membership in a public literal set.

use std::collections::BTreeMap;

use serde_json::Value;
use vqp_core::{now_rfc3339, ZkMetadata, ZkProof};

use crate::error::CryptoError;
use crate::hashing;
use crate::zkp::{Blake3ProofGenerator, RangeProof, SetMembershipProof};

pub const RANGE_THRESHOLD: &str = "range_threshold";
pub const SET_MEMBERSHIP: &str = "set_membership";
pub const BACKEND: &str = "blake3-sigma";

/// Public input binding the proof to a response payload.
pub const PAYLOAD_HASH_INPUT: &str = "payloadHash";

type PublicInputs = BTreeMap<String, Value>;

/// The interval a value must lie in for `value <cmp> threshold` to equal
/// `result`.
pub fn threshold_interval(
    comparator: &str,
    threshold: i64,
    result: bool,
) -> Result<(i64, i64), CryptoError> {
    let unsatisfiable = || {
        CryptoError::ZkpError(format!(
            "no integer satisfies ({} {}) == {}",
            comparator, threshold, result
        ))
    };
    let interval = match (comparator, result) {
        (">=", true) | ("<", false) => (threshold, i64::MAX),
        (">=", false) | ("<", true) => (i64::MIN, threshold.checked_sub(1).ok_or_else(unsatisfiable)?),
        (">", true) | ("<=", false) => (threshold.checked_add(1).ok_or_else(unsatisfiable)?, i64::MAX),
        (">", false) | ("<=", true) => (i64::MIN, threshold),
        _ => {
            return Err(CryptoError::ZkpError(format!(
                "unsupported comparator: {}",
                comparator
            )))
        }
    };
    Ok(interval)
}

fn binding(public: &PublicInputs) -> Vec<u8> {
    public
        .get(PAYLOAD_HASH_INPUT)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .as_bytes()
        .to_vec()
}

fn require<'a>(public: &'a PublicInputs, name: &str) -> Result<&'a Value, CryptoError> {
    public
        .get(name)
        .ok_or_else(|| CryptoError::ZkpError(format!("missing public input: {}", name)))
}

fn range_params(public: &PublicInputs) -> Result<(i64, i64), CryptoError> {
    let comparator = require(public, "comparator")?
        .as_str()
        .ok_or_else(|| CryptoError::ZkpError("comparator must be a string".into()))?;
    let threshold = require(public, "threshold")?
        .as_i64()
        .ok_or_else(|| CryptoError::ZkpError("threshold must be an integer".into()))?;
    let result = require(public, "result")?
        .as_bool()
        .ok_or_else(|| CryptoError::ZkpError("result must be a boolean".into()))?;
    threshold_interval(comparator, threshold, result)
}

fn set_members(public: &PublicInputs) -> Result<Vec<Vec<u8>>, CryptoError> {
    require(public, "set")?
        .as_array()
        .ok_or_else(|| CryptoError::ZkpError("set must be an array".into()))?
        .iter()
        .map(encode_member)
        .collect()
}

fn encode_member(value: &Value) -> Result<Vec<u8>, CryptoError> {
    serde_json::to_vec(value).map_err(|e| CryptoError::ZkpError(e.to_string()))
}

fn encode_proof<T: serde::Serialize>(proof: &T) -> Result<String, CryptoError> {
    serde_json::to_vec(proof)
        .map(hex::encode)
        .map_err(|e| CryptoError::ZkpError(format!("proof encoding failed: {}", e)))
}

fn decode_proof<T: serde::de::DeserializeOwned>(encoded: &str) -> Option<T> {
    let bytes = hex::decode(encoded).ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Prove a circuit for the given witness and public inputs.
pub fn prove(
    circuit_id: &str,
    private_inputs: &Value,
    public_inputs: &PublicInputs,
) -> Result<ZkProof, CryptoError> {
    let bind = binding(public_inputs);
    let proof = match circuit_id {
        RANGE_THRESHOLD => {
            let value = private_inputs
                .get("value")
                .and_then(Value::as_i64)
                .ok_or_else(|| CryptoError::ZkpError("witness must be an integer".into()))?;
            let (min, max) = range_params(public_inputs)?;
            let (proof, _nonce) = Blake3ProofGenerator::prove_range(value, min, max, &bind)?;
            encode_proof(&proof)?
        }
        SET_MEMBERSHIP => {
            if require(public_inputs, "result")?.as_bool() != Some(true) {
                return Err(CryptoError::ZkpError(
                    "set non-membership cannot be proven".into(),
                ));
            }
            let value = private_inputs
                .get("value")
                .ok_or_else(|| CryptoError::ZkpError("missing witness".into()))?;
            let set = set_members(public_inputs)?;
            let (proof, _nonce) =
                Blake3ProofGenerator::prove_set_membership(&encode_member(value)?, &set, &bind)?;
            encode_proof(&proof)?
        }
        other => {
            return Err(CryptoError::ZkpError(format!("unknown circuit: {}", other)));
        }
    };

    Ok(ZkProof {
        circuit: circuit_id.to_string(),
        proof,
        public_inputs: public_inputs.clone(),
        metadata: ZkMetadata {
            backend: BACKEND.to_string(),
            generated_at: now_rfc3339(),
        },
    })
}

/// Check a circuit proof against public inputs. Never errors.
pub fn verify(proof: &ZkProof, public_inputs: &PublicInputs) -> bool {
    let bind = binding(public_inputs);
    match proof.circuit.as_str() {
        RANGE_THRESHOLD => {
            let Ok((min, max)) = range_params(public_inputs) else {
                return false;
            };
            let Some(range) = decode_proof::<RangeProof>(&proof.proof) else {
                return false;
            };
            range.min == min
                && range.max == max
                && Blake3ProofGenerator::verify_range(&range, &bind).unwrap_or(false)
        }
        SET_MEMBERSHIP => {
            if public_inputs.get("result").and_then(Value::as_bool) != Some(true) {
                return false;
            }
            let Ok(set) = set_members(public_inputs) else {
                return false;
            };
            let Some(membership) = decode_proof::<SetMembershipProof>(&proof.proof) else {
                return false;
            };
            let leaves: Vec<hashing::Hash> = set.iter().map(|m| hashing::hash(m)).collect();
            let root = hashing::merkle_root(&leaves);
            Blake3ProofGenerator::verify_set_membership(&membership, &root, set.len(), &bind)
                .unwrap_or(false)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inputs(pairs: &[(&str, Value)]) -> PublicInputs {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_threshold_intervals() {
        assert_eq!(threshold_interval(">=", 18, true).unwrap(), (18, i64::MAX));
        assert_eq!(threshold_interval(">=", 18, false).unwrap(), (i64::MIN, 17));
        assert_eq!(threshold_interval(">", 18, true).unwrap(), (19, i64::MAX));
        assert_eq!(threshold_interval("<", 18, true).unwrap(), (i64::MIN, 17));
        assert_eq!(threshold_interval("<=", 18, false).unwrap(), (19, i64::MAX));
        assert!(threshold_interval(">=", i64::MIN, false).is_err());
        assert!(threshold_interval("==", 1, true).is_err());
    }

    #[test]
    fn test_range_threshold_true_and_false() {
        for (age, result) in [(28, true), (15, false)] {
            let public = inputs(&[
                ("comparator", json!(">=")),
                ("threshold", json!(18)),
                ("result", json!(result)),
                (PAYLOAD_HASH_INPUT, json!("abc")),
            ]);
            let proof = prove(RANGE_THRESHOLD, &json!({"value": age}), &public).unwrap();
            assert_eq!(proof.metadata.backend, BACKEND);
            assert!(verify(&proof, &public));
        }
    }

    #[test]
    fn test_range_threshold_lying_result_fails() {
        let public = inputs(&[
            ("comparator", json!(">=")),
            ("threshold", json!(18)),
            ("result", json!(true)),
        ]);
        assert!(prove(RANGE_THRESHOLD, &json!({"value": 15}), &public).is_err());
    }

    #[test]
    fn test_range_threshold_flipped_result_rejected() {
        let mut public = inputs(&[
            ("comparator", json!(">=")),
            ("threshold", json!(18)),
            ("result", json!(true)),
        ]);
        let proof = prove(RANGE_THRESHOLD, &json!({"value": 40}), &public).unwrap();
        public.insert("result".into(), json!(false));
        assert!(!verify(&proof, &public));
    }

    #[test]
    fn test_set_membership_circuit() {
        let public = inputs(&[
            ("set", json!(["US", "CA", "MX"])),
            ("result", json!(true)),
            (PAYLOAD_HASH_INPUT, json!("h")),
        ]);
        let proof = prove(SET_MEMBERSHIP, &json!({"value": "CA"}), &public).unwrap();
        assert!(verify(&proof, &public));
        assert!(!proof.proof.contains("CA"));
    }

    #[test]
    fn test_set_non_membership_unsupported() {
        let public = inputs(&[("set", json!(["US"])), ("result", json!(false))]);
        assert!(prove(SET_MEMBERSHIP, &json!({"value": "DE"}), &public).is_err());
    }

    #[test]
    fn test_unknown_circuit() {
        assert!(prove("sha_preimage", &json!({}), &PublicInputs::new()).is_err());
        let public = inputs(&[("result", json!(true))]);
        let proof = prove(
            SET_MEMBERSHIP,
            &json!({"value": 1}),
            &inputs(&[("set", json!([1, 2])), ("result", json!(true))]),
        )
        .unwrap();
        let mut renamed = proof.clone();
        renamed.circuit = "other".into();
        assert!(!verify(&renamed, &public));
    }

    #[test]
    fn test_garbage_proof_bytes() {
        let public = inputs(&[
            ("comparator", json!(">=")),
            ("threshold", json!(18)),
            ("result", json!(true)),
        ]);
        let mut proof = prove(RANGE_THRESHOLD, &json!({"value": 20}), &public).unwrap();
        proof.proof = "zz".into();
        assert!(!verify(&proof, &public));
    }
}
