//! VQP Crypto: Ed25519 signing, BLAKE3 commitments, and the commitment
//! circuits backing zero-knowledge responses.

pub mod circuits;
pub mod error;
pub mod hashing;
pub mod keyring;
pub mod keys;
pub mod signing;
pub mod zkp;

pub use error::CryptoError;
pub use hashing::{hash, hash_hex, merkle_root};
pub use keyring::KeyringCrypto;
pub use keys::{KeyPair, PublicKey};
pub use signing::{sign, sign_proof, verify, verify_proof, Signature};
pub use zkp::{Blake3ProofGenerator, Commitment, RangeProof, SetMembershipProof};
