use alloy_primitives::{U256, keccak256};

/// Domain string whose hash fills unoccupied leaf positions.
const ZERO_LEAF_DOMAIN: &[u8] = b"interep.group.zero";

/// Two-to-one node combine: `keccak256(left || right)` over big-endian words.
pub fn hash_pair(left: &U256, right: &U256) -> U256 {
    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(&left.to_be_bytes::<32>());
    preimage[32..].copy_from_slice(&right.to_be_bytes::<32>());
    U256::from_be_bytes(keccak256(preimage).0)
}

/// Sentinel value of an empty leaf position.
pub fn zero_leaf() -> U256 {
    U256::from_be_bytes(keccak256(ZERO_LEAF_DOMAIN).0)
}

/// Roots of empty subtrees for every level `0..=depth`.
///
/// `zeros[0]` is the empty leaf and `zeros[depth]` the root of an empty tree.
pub fn zero_hashes(depth: usize) -> Vec<U256> {
    let mut zeros = Vec::with_capacity(depth + 1);
    let mut current = zero_leaf();
    zeros.push(current);
    for _ in 0..depth {
        current = hash_pair(&current, &current);
        zeros.push(current);
    }
    zeros
}
