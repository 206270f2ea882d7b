//! Deterministic challenge derivation.
//!
//! Everything is a function of the audit seed and the sorted piece
//! sizes: SHA-256 over little-endian encodings, first eight digest
//! bytes read little-endian, reduced modulo the relevant bound. Piece
//! selection reduces modulo the *challenge count*; auditors targeting
//! the legacy ratio formulation must rework `piece_challenge` and
//! regenerate their bundles.

use carproof_core::{Error, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Pieces challenged per audit round for a dataset of `piece_count`
/// pieces.
#[must_use]
pub fn car_challenge_count(piece_count: u64) -> u64 {
    if piece_count < 1000 {
        1
    } else {
        piece_count / 1000 + 1
    }
}

/// Leaves challenged within one piece of `archive_size` bytes.
#[must_use]
pub fn leaf_challenge_count(archive_size: u64) -> u32 {
    if archive_size >= 1 << 35 {
        172
    } else {
        2
    }
}

/// First eight bytes of the running SHA-256 state, read little-endian.
fn digest_le_u64(hasher: Sha256) -> u64 {
    let digest = hasher.finalize();
    let mut first = [0u8; 8];
    first.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(first)
}

/// Piece index for challenge round `i`.
fn piece_challenge(seed: u64, i: u64, challenge_count: u64) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(i.to_le_bytes());
    digest_le_u64(hasher) % challenge_count
}

/// Byte index challenged within a piece. `j` travels as a 32-bit value.
fn leaf_challenge(seed: u64, piece_idx: u64, j: u32, archive_size: u64) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(piece_idx.to_le_bytes());
    hasher.update(j.to_le_bytes());
    digest_le_u64(hasher) % archive_size
}

/// Derive the full challenge set for a dataset.
///
/// `archive_sizes` is indexed by sorted piece order. Returns
/// `piece index → challenged byte indices`, ordered by piece index.
pub fn gen_challenges(seed: u64, archive_sizes: &[u64]) -> Result<BTreeMap<u64, Vec<u64>>> {
    if archive_sizes.is_empty() {
        return Err(Error::invalid("cannot challenge an empty piece registry"));
    }
    if let Some(idx) = archive_sizes.iter().position(|&s| s == 0) {
        return Err(Error::invalid(format!("piece {idx} has a zero archive size")));
    }

    let challenge_count = car_challenge_count(archive_sizes.len() as u64);
    let mut challenges: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
    for i in 0..challenge_count {
        let piece_idx = piece_challenge(seed, i, challenge_count);
        let size = archive_sizes[piece_idx as usize];
        for j in 0..leaf_challenge_count(size) {
            challenges
                .entry(piece_idx)
                .or_default()
                .push(leaf_challenge(seed, piece_idx, j, size));
        }
    }
    Ok(challenges)
}
