//! SHA-254 hashing for the proving tree.
//!
//! Every internal node is `SHA-256(left ∥ right)` with the two most
//! significant bits of the final byte cleared, so each digest is a valid
//! BLS12-381 scalar representative. The same truncation applies to the
//! nul-padding tower and to `pad_commp` folding.

use sha2::{Digest, Sha256};

/// Mask clearing the top two bits of the final digest byte.
pub const TRUNC_MASK: u8 = 0x3F;

/// SHA-256 of `data`, truncated to 254 bits.
#[must_use]
pub fn sha254(data: &[u8]) -> [u8; 32] {
    let mut out: [u8; 32] = Sha256::digest(data).into();
    out[31] &= TRUNC_MASK;
    out
}

/// Combine two child nodes: `SHA-254(left ∥ right)`.
#[must_use]
pub fn node_hash(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    let mut out: [u8; 32] = hasher.finalize().into();
    out[31] &= TRUNC_MASK;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_byte_truncated() {
        for seed in 0u8..=16 {
            let out = node_hash(&[seed; 32], &[seed.wrapping_add(1); 32]);
            assert_eq!(out[31] & 0xC0, 0, "top two bits must be clear");
        }
    }

    #[test]
    fn node_hash_matches_concatenated_sha254() {
        let left = [3u8; 32];
        let right = [7u8; 32];
        let mut joined = [0u8; 64];
        joined[..32].copy_from_slice(&left);
        joined[32..].copy_from_slice(&right);
        assert_eq!(node_hash(&left, &right), sha254(&joined));
    }
}
