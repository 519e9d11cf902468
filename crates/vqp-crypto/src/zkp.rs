//! Commitment-based proofs over BLAKE3.
//!
//! A range proof shows a committed integer lies in `[min, max]`; a set
//! membership proof shows a committed value belongs to a public set. Both
//! use a Fiat-Shamir challenge that also absorbs a caller-supplied binding
//! (the response payload hash), so a proof cannot be replayed for another
//! response.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::CryptoError;
use crate::hashing::{self, Hash};

/// A BLAKE3 commitment H(value || nonce).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    pub hash: Hash,
}

impl Commitment {
    /// Commit with a fresh random nonce; the nonce stays with the prover.
    pub fn commit(value: &[u8]) -> (Self, [u8; 32]) {
        let nonce = random_nonce();
        (Self::commit_with_nonce(value, &nonce), nonce)
    }

    pub fn commit_with_nonce(value: &[u8], nonce: &[u8; 32]) -> Self {
        Self {
            hash: hashing::create_commitment(value, nonce),
        }
    }

    pub fn verify(&self, value: &[u8], nonce: &[u8; 32]) -> bool {
        hashing::verify_commitment(value, nonce, &self.hash)
    }
}

fn random_nonce() -> [u8; 32] {
    let mut nonce = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// Proof that a committed integer lies within `[min, max]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeProof {
    pub commitment: Commitment,
    pub challenge: Hash,
    /// H(value || nonce || challenge).
    pub response: Hash,
    pub min: i64,
    pub max: i64,
    /// Commitments to `value - min` and `max - value`.
    pub boundary_commitments: Vec<Hash>,
}

/// Proof that a committed value is a member of a public set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetMembershipProof {
    pub commitment: Commitment,
    pub set_root: Hash,
    /// Sibling hashes from leaf to root.
    pub merkle_path: Vec<Hash>,
    /// true when the sibling is on the right.
    pub path_directions: Vec<bool>,
    pub challenge: Hash,
    pub response: Hash,
}

/// Generator for BLAKE3 commitment proofs.
pub struct Blake3ProofGenerator;

impl Blake3ProofGenerator {
    /// Prove `min <= value <= max`, bound to `binding`.
    pub fn prove_range(
        value: i64,
        min: i64,
        max: i64,
        binding: &[u8],
    ) -> Result<(RangeProof, [u8; 32]), CryptoError> {
        if min > max {
            return Err(CryptoError::ZkpError(format!(
                "invalid range [{}, {}]",
                min, max
            )));
        }
        if value < min || value > max {
            return Err(CryptoError::ZkpError(format!(
                "value is not in range [{}, {}]",
                min, max
            )));
        }

        let value_bytes = value.to_le_bytes();
        let (commitment, nonce) = Commitment::commit(&value_bytes);

        // Differences fit in u64 for any in-range value.
        let lower_diff = (value as i128 - min as i128) as u64;
        let upper_diff = (max as i128 - value as i128) as u64;
        let lower_commitment =
            hashing::create_commitment(&lower_diff.to_le_bytes(), &random_nonce());
        let upper_commitment =
            hashing::create_commitment(&upper_diff.to_le_bytes(), &random_nonce());

        let challenge = range_challenge(
            &commitment.hash,
            &lower_commitment,
            &upper_commitment,
            min,
            max,
            binding,
        );
        let response = respond(&value_bytes, &nonce, &challenge);

        let proof = RangeProof {
            commitment,
            challenge,
            response,
            min,
            max,
            boundary_commitments: vec![lower_commitment, upper_commitment],
        };
        Ok((proof, nonce))
    }

    /// Verify a range proof's structure and its binding.
    pub fn verify_range(proof: &RangeProof, binding: &[u8]) -> Result<bool, CryptoError> {
        if proof.min > proof.max {
            return Err(CryptoError::ZkpError("invalid range: min > max".into()));
        }
        if proof.boundary_commitments.len() != 2 {
            return Err(CryptoError::ZkpError(
                "range proof must have exactly 2 boundary commitments".into(),
            ));
        }
        let expected = range_challenge(
            &proof.commitment.hash,
            &proof.boundary_commitments[0],
            &proof.boundary_commitments[1],
            proof.min,
            proof.max,
            binding,
        );
        Ok(proof.challenge == expected)
    }

    /// Prove `value` is one of `set`, bound to `binding`.
    pub fn prove_set_membership(
        value: &[u8],
        set: &[Vec<u8>],
        binding: &[u8],
    ) -> Result<(SetMembershipProof, [u8; 32]), CryptoError> {
        let index = set
            .iter()
            .position(|item| item.as_slice() == value)
            .ok_or_else(|| CryptoError::ZkpError("value not in set".into()))?;

        let leaves: Vec<Hash> = set.iter().map(|item| hashing::hash(item)).collect();
        let (merkle_path, path_directions) = build_merkle_proof(&leaves, index);
        let set_root = hashing::merkle_root(&leaves);

        let (commitment, nonce) = Commitment::commit(value);
        let challenge = membership_challenge(&commitment.hash, &set_root, binding);
        let response = respond(value, &nonce, &challenge);

        let proof = SetMembershipProof {
            commitment,
            set_root,
            merkle_path,
            path_directions,
            challenge,
            response,
        };
        Ok((proof, nonce))
    }

    /// Verify a set membership proof against the expected set root.
    pub fn verify_set_membership(
        proof: &SetMembershipProof,
        expected_root: &Hash,
        set_size: usize,
        binding: &[u8],
    ) -> Result<bool, CryptoError> {
        if proof.merkle_path.len() != proof.path_directions.len() {
            return Err(CryptoError::ZkpError(
                "merkle path and directions differ in length".into(),
            ));
        }
        if proof.set_root != *expected_root {
            return Ok(false);
        }
        if proof.merkle_path.len() != hashing::merkle_depth(set_size) {
            return Ok(false);
        }
        let expected = membership_challenge(&proof.commitment.hash, &proof.set_root, binding);
        Ok(proof.challenge == expected)
    }
}

fn range_challenge(
    commitment: &Hash,
    lower: &Hash,
    upper: &Hash,
    min: i64,
    max: i64,
    binding: &[u8],
) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(commitment);
    hasher.update(lower);
    hasher.update(upper);
    hasher.update(&min.to_le_bytes());
    hasher.update(&max.to_le_bytes());
    hasher.update(binding);
    *hasher.finalize().as_bytes()
}

fn membership_challenge(commitment: &Hash, root: &Hash, binding: &[u8]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(commitment);
    hasher.update(root);
    hasher.update(binding);
    *hasher.finalize().as_bytes()
}

fn respond(value: &[u8], nonce: &[u8; 32], challenge: &Hash) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(value);
    hasher.update(nonce);
    hasher.update(challenge);
    *hasher.finalize().as_bytes()
}

/// Inclusion path for the leaf at `index`.
fn build_merkle_proof(leaves: &[Hash], index: usize) -> (Vec<Hash>, Vec<bool>) {
    let mut path = Vec::new();
    let mut directions = Vec::new();
    let mut level = leaves.to_vec();
    let mut current = index;

    while level.len() > 1 {
        let sibling = current ^ 1;
        path.push(*level.get(sibling).unwrap_or(&level[current]));
        directions.push(current % 2 == 0);

        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let mut combined = Vec::with_capacity(64);
            combined.extend_from_slice(&pair[0]);
            combined.extend_from_slice(pair.get(1).unwrap_or(&pair[0]));
            next.push(hashing::hash(&combined));
        }
        level = next;
        current /= 2;
    }

    (path, directions)
}
