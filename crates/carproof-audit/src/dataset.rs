//! Dataset-level commitment: one Merkle root over all piece digests.
//!
//! Piece digests are sorted lexicographically and combined with the
//! SHA-254 node hash. A single piece is its own root; odd nodes are
//! promoted unchanged (left-balanced tree), so a two-piece dataset
//! commits to `H(A ∥ B)`. No nul-padding is involved; the leaf count
//! is bounded by the dataset size, not the tree geometry.
//!
//! The persisted proof is regenerated from the registry whenever it
//! changes; it is not incremental.

use carproof_core::{io, Error, Result};
use carproof_piece::registry;
use carproof_piece::tree::MerkleProof;
use carproof_piece::node_hash;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Dataset proof file name inside a cache directory.
pub const DATASET_PROOF_FILE: &str = "dataset.proof";

/// Persisted dataset proof: the root plus the exact leaves it was built
/// from, digests as `0x`-prefixed hex.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatasetProof {
    /// Merkle root over `leaf_hashes`.
    pub root: String,
    /// Sorted piece digests.
    pub leaf_hashes: Vec<String>,
    /// Archive byte size per leaf, in the same order.
    pub leaf_sizes: Vec<u64>,
}

/// Outcome of re-checking a persisted dataset proof.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DatasetCheck {
    /// The stored root matches the recomputed root.
    Valid,
    /// The roots diverge; an inclusion proof for the leaf at
    /// `randomness % n` pinpoints the recomputed tree's view.
    Mismatch {
        /// The challenged leaf.
        leaf: [u8; 32],
        /// Its path in the recomputed tree.
        proof: MerkleProof,
    },
}

/// Left-balanced Merkle root over already-sorted leaves.
fn dataset_root(leaves: &[[u8; 32]]) -> Result<[u8; 32]> {
    if leaves.is_empty() {
        return Err(Error::invalid("cannot build a dataset tree over zero pieces"));
    }
    let mut level: Vec<[u8; 32]> = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            if let [left, right] = pair {
                next.push(node_hash(left, right));
            } else {
                // Odd node is promoted unchanged.
                next.push(pair[0]);
            }
        }
        level = next;
    }
    Ok(level[0])
}

/// Inclusion proof for `index` in the left-balanced tree over `leaves`.
fn dataset_proof_at(leaves: &[[u8; 32]], index: usize) -> Result<MerkleProof> {
    if index >= leaves.len() {
        return Err(Error::invalid(format!(
            "leaf index {index} out of range for {} pieces",
            leaves.len()
        )));
    }
    let mut siblings = Vec::new();
    let mut path = 0u64;
    let mut idx = index;
    let mut level: Vec<[u8; 32]> = leaves.to_vec();
    while level.len() > 1 {
        let sibling_idx = idx ^ 1;
        if sibling_idx < level.len() {
            siblings.push(level[sibling_idx]);
            path |= ((idx & 1) as u64) << (siblings.len() - 1);
        }
        // Promoted odd nodes contribute no fold at this level.
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            if let [left, right] = pair {
                next.push(node_hash(left, right));
            } else {
                next.push(pair[0]);
            }
        }
        idx /= 2;
        level = next;
    }
    Ok(MerkleProof { siblings, path })
}

/// Build and persist the dataset proof for everything in the registry.
pub fn gen_dataset_proof(cache_dir: &Path) -> Result<DatasetProof> {
    let records = registry::load_sorted(cache_dir)?;
    if records.is_empty() {
        return Err(Error::invalid("cannot build a dataset proof over an empty registry"));
    }

    let leaves: Vec<[u8; 32]> = records.iter().map(|r| r.digest).collect();
    let root = dataset_root(&leaves)?;

    let proof = DatasetProof {
        root: io::to_hex_prefix(&root),
        leaf_hashes: leaves.iter().map(|l| io::to_hex_prefix(l)).collect(),
        leaf_sizes: records.iter().map(|r| r.archive_size).collect(),
    };
    io::write_json_tab(&cache_dir.join(DATASET_PROOF_FILE), &proof)?;
    info!(pieces = leaves.len(), root = %proof.root, "dataset proof written");
    Ok(proof)
}

/// Re-check the persisted dataset proof.
///
/// Rebuilds the root from the stored leaves; on mismatch, returns an
/// inclusion proof for the leaf at `randomness % n` so the caller can
/// pinpoint the divergence.
pub fn verify_dataset_proof(cache_dir: &Path, randomness: u64) -> Result<DatasetCheck> {
    let stored: DatasetProof = io::read_json(&cache_dir.join(DATASET_PROOF_FILE))?;

    let leaves: Vec<[u8; 32]> = stored
        .leaf_hashes
        .iter()
        .map(|h| io::parse_digest_hex(h))
        .collect::<Result<_>>()?;
    if leaves.is_empty() {
        return Err(Error::invalid("dataset proof has no leaves"));
    }
    let stored_root = io::parse_digest_hex(&stored.root)?;
    let rebuilt = dataset_root(&leaves)?;

    if rebuilt == stored_root {
        Ok(DatasetCheck::Valid)
    } else {
        let index = (randomness % leaves.len() as u64) as usize;
        Ok(DatasetCheck::Mismatch {
            leaf: leaves[index],
            proof: dataset_proof_at(&leaves, index)?,
        })
    }
}
