/// BLAKE3 hash (32 bytes).
pub type Hash = [u8; 32];

/// Hash arbitrary data using BLAKE3.
pub fn hash(data: &[u8]) -> Hash {
    *blake3::hash(data).as_bytes()
}

/// Hex-encoded BLAKE3 hash.
pub fn hash_hex(data: &[u8]) -> String {
    hex::encode(hash(data))
}

/// Commitment H(value || nonce).
pub fn create_commitment(value: &[u8], nonce: &[u8; 32]) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(value);
    hasher.update(nonce);
    *hasher.finalize().as_bytes()
}

pub fn verify_commitment(value: &[u8], nonce: &[u8; 32], commitment: &Hash) -> bool {
    create_commitment(value, nonce) == *commitment
}

fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}

/// Merkle root of a list of leaf hashes.
/// Empty input yields the zero hash; an odd node is paired with itself.
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return [0u8; 32];
    }
    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| hash_pair(&pair[0], pair.get(1).unwrap_or(&pair[0])))
            .collect();
    }
    level[0]
}

/// Number of sibling hashes in an inclusion path for `leaf_count` leaves.
pub fn merkle_depth(leaf_count: usize) -> usize {
    let mut depth = 0;
    let mut width = leaf_count;
    while width > 1 {
        width = width.div_ceil(2);
        depth += 1;
    }
    depth
}
