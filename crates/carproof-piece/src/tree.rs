//! Balanced SHA-254 Merkle tree with nul-padding.
//!
//! Leaves are raw 32-byte slabs; leaf hashing is disabled. Levels are
//! built bottom-up; an unpaired node at depth `d` is combined with
//! `nul_pad(d)`, which implicitly rounds the leaf span up to the next
//! power of two with zero subtrees. Requesting a larger target padded
//! size extends the tree upward, one nul-pad fold per extra level.
//!
//! Level hashing is embarrassingly parallel and switches to rayon above
//! a small width threshold.

use crate::hash::node_hash;
use crate::nulpad::nul_pad;
use carproof_core::{Error, Result, MAX_LAYERS, MAX_PIECE_SIZE, NODE_SIZE};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Widths below this are hashed sequentially.
const PAR_THRESHOLD: usize = 1024;

/// Authentication path from a node to a tree root.
///
/// Bit `i` of `path` is 1 when the depth-`i` sibling sits on the left,
/// so for a full tree the path equals the leaf index inside the padded
/// span. Paths compose: an in-memory window proof appended to a cached
/// band proof forms one path to the piece digest.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct MerkleProof {
    /// Sibling hashes, leaf level first.
    pub siblings: Vec<[u8; 32]>,
    /// Left/right orientation bits, bit `i` for depth `i`.
    pub path: u64,
}

impl MerkleProof {
    /// Number of levels this path climbs.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.siblings.len()
    }

    /// Fold `leaf` up the path and return the resulting root.
    #[must_use]
    pub fn compute_root(&self, leaf: &[u8; 32]) -> [u8; 32] {
        let mut cur = *leaf;
        for (i, sibling) in self.siblings.iter().enumerate() {
            cur = if self.path >> i & 1 == 1 {
                node_hash(sibling, &cur)
            } else {
                node_hash(&cur, sibling)
            };
        }
        cur
    }

    /// Check that `leaf` folds to `root`.
    pub fn verify(&self, leaf: &[u8; 32], root: &[u8; 32]) -> Result<()> {
        if self.compute_root(leaf) == *root {
            Ok(())
        } else {
            Err(Error::ProofInvalid)
        }
    }

    /// Concatenate with a path that continues from this path's root.
    #[must_use]
    pub fn append(mut self, upper: &Self) -> Self {
        let depth = self.depth();
        self.siblings.extend_from_slice(&upper.siblings);
        self.path |= upper.path << depth;
        self
    }
}

/// A fully materialized piece tree: every level from leaves to root.
#[derive(Clone, Debug)]
pub struct PieceTree {
    levels: Vec<Vec<[u8; 32]>>,
}

impl PieceTree {
    /// Build the natural tree over `leaves`.
    pub fn build(leaves: Vec<[u8; 32]>) -> Result<Self> {
        if leaves.is_empty() {
            return Err(Error::invalid("cannot build a tree over zero leaves"));
        }
        let mut levels = Vec::with_capacity(leaves.len().next_power_of_two().trailing_zeros() as usize + 1);
        levels.push(leaves);
        let mut depth = 0usize;
        while levels[depth].len() > 1 {
            let next = hash_level(&levels[depth], depth);
            levels.push(next);
            depth += 1;
        }
        Ok(Self { levels })
    }

    /// Build the natural tree, then extend it to `target_padded_size`.
    ///
    /// `source_padded_size` is the natural padded byte size of the
    /// leaves; both sizes are validated against the piece size contract.
    pub fn build_padded(
        leaves: Vec<[u8; 32]>,
        source_padded_size: u64,
        target_padded_size: u64,
    ) -> Result<Self> {
        validate_padded_sizes(source_padded_size, target_padded_size)?;
        let mut tree = Self::build(leaves)?;
        if source_padded_size == target_padded_size {
            return Ok(tree);
        }

        let target_depth = (target_padded_size.trailing_zeros() as usize) - 5;
        tree.extend_to_depth(target_depth)?;
        Ok(tree)
    }

    /// Fold nul-pad roots on top of the tree until it reaches
    /// `target_depth` hashing levels. A tree already at or above the
    /// target is left untouched.
    pub fn extend_to_depth(&mut self, target_depth: usize) -> Result<()> {
        if target_depth > MAX_LAYERS {
            return Err(Error::invalid(format!(
                "target depth {target_depth} exceeds the {MAX_LAYERS}-layer tree maximum"
            )));
        }
        for d in self.depth()..target_depth {
            let root = self.root();
            self.levels.push(vec![node_hash(&root, nul_pad(d))]);
        }
        Ok(())
    }

    /// The tree root (piece digest for a sealed piece).
    #[must_use]
    pub fn root(&self) -> [u8; 32] {
        self.levels[self.levels.len() - 1][0]
    }

    /// Number of hashing levels above the leaves.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    /// Leaves at the base of the tree (before nul-padding).
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.levels[0].len()
    }

    /// Nodes stored at depth `d` (0 = leaves).
    #[must_use]
    pub fn level(&self, d: usize) -> Option<&[[u8; 32]]> {
        self.levels.get(d).map(Vec::as_slice)
    }

    /// Authentication path for the leaf at `leaf_index`.
    pub fn proof(&self, leaf_index: usize) -> Result<MerkleProof> {
        if leaf_index >= self.leaf_count() {
            return Err(Error::invalid(format!(
                "leaf index {leaf_index} out of range for {} leaves",
                self.leaf_count()
            )));
        }
        let mut siblings = Vec::with_capacity(self.depth());
        let mut path = 0u64;
        let mut idx = leaf_index;
        for d in 0..self.depth() {
            let level = &self.levels[d];
            let sibling = level.get(idx ^ 1).copied().unwrap_or(*nul_pad(d));
            siblings.push(sibling);
            path |= ((idx & 1) as u64) << d;
            idx >>= 1;
        }
        Ok(MerkleProof { siblings, path })
    }
}

/// Hash one level into the next, pairing an unpaired tail node with the
/// depth-appropriate nul pad.
fn hash_level(level: &[[u8; 32]], depth: usize) -> Vec<[u8; 32]> {
    let pairs = level.len().div_ceil(2);
    let pair_hash = |i: usize| {
        let left = &level[2 * i];
        let right = level.get(2 * i + 1).unwrap_or_else(|| nul_pad(depth));
        node_hash(left, right)
    };
    if pairs >= PAR_THRESHOLD {
        (0..pairs).into_par_iter().map(pair_hash).collect()
    } else {
        (0..pairs).map(pair_hash).collect()
    }
}

/// Shared validation for target padding and `pad_commp`.
pub(crate) fn validate_padded_sizes(source: u64, target: u64) -> Result<()> {
    if !source.is_power_of_two() {
        return Err(Error::invalid(format!(
            "source padded size {source} is not a power of 2"
        )));
    }
    if !target.is_power_of_two() {
        return Err(Error::invalid(format!(
            "target padded size {target} is not a power of 2"
        )));
    }
    if source > target {
        return Err(Error::invalid(format!(
            "source padded size {source} larger than target padded size {target}"
        )));
    }
    if source < 128 {
        return Err(Error::invalid(format!(
            "source padded size {source} smaller than the minimum of 128 bytes"
        )));
    }
    if target > MAX_PIECE_SIZE {
        return Err(Error::invalid(format!(
            "target padded size {target} larger than Filecoin maximum of {MAX_PIECE_SIZE} bytes"
        )));
    }
    Ok(())
}

/// Interpret a contiguous byte span as 32-byte leaves.
pub fn leaves_from_slabs(slabs: &[u8]) -> Result<Vec<[u8; 32]>> {
    if slabs.len() % NODE_SIZE != 0 {
        return Err(Error::invalid(format!(
            "slab span length {} is not a multiple of the {NODE_SIZE}-byte node size",
            slabs.len()
        )));
    }
    Ok(slabs
        .chunks_exact(NODE_SIZE)
        .map(|c| {
            let mut leaf = [0u8; 32];
            leaf.copy_from_slice(c);
            leaf
        })
        .collect())
}
