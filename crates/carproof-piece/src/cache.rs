//! Level caches: persisted horizontal tree slices.
//!
//! A level cache stores every node at depths
//! `[start_depth, start_depth + depth_count)` of one piece tree, in
//! left-to-right order. Given a node at the band's base depth, the
//! authentication path to the piece digest is reconstructed entirely
//! from the band. The band is created at sealing time precisely so
//! audits never rebuild the full tree.
//!
//! On disk the band is CBOR (binary, self-describing), keyed by the
//! piece digest.

use crate::nulpad::nul_pad;
use crate::tree::{MerkleProof, PieceTree};
use carproof_core::{io, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File suffix for persisted caches (digest- and cid-keyed alike).
pub const CACHE_SUFFIX: &str = ".cache";

/// Band start depth for pieces below 2 MiB.
pub const SMALL_PIECE_START_DEPTH: usize = 4;

/// Band start depth for pieces of 2 MiB and above.
pub const LARGE_PIECE_START_DEPTH: usize = 16;

/// Piece byte size at which the band start switches.
pub const START_DEPTH_THRESHOLD: u64 = 2 << 20;

/// A serialized subtree slice sufficient to continue proofs upward.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct LevelCache {
    start_depth: u32,
    depth_count: u32,
    levels: Vec<Vec<[u8; 32]>>,
}

impl LevelCache {
    /// Capture the band `[start_depth, start_depth + depth_count)` from
    /// a built tree. `depth_count == 0` extends the band to the root.
    pub fn from_tree(tree: &PieceTree, start_depth: usize, depth_count: usize) -> Result<Self> {
        let levels_len = tree.depth() + 1;
        if start_depth >= levels_len {
            return Err(Error::invalid(format!(
                "cache start depth {start_depth} exceeds tree depth {}",
                tree.depth()
            )));
        }
        let count = if depth_count == 0 {
            levels_len - start_depth
        } else {
            depth_count
        };
        if start_depth + count > levels_len {
            return Err(Error::invalid(format!(
                "cache band [{start_depth}, {}) exceeds tree depth {}",
                start_depth + count,
                tree.depth()
            )));
        }
        let levels = (start_depth..start_depth + count)
            .map(|d| tree.level(d).expect("band depth checked above").to_vec())
            .collect();
        Ok(Self {
            start_depth: start_depth as u32,
            depth_count: count as u32,
            levels,
        })
    }

    /// Depth of the band's base level.
    #[must_use]
    pub fn start_depth(&self) -> usize {
        self.start_depth as usize
    }

    /// Number of levels stored in the band.
    #[must_use]
    pub fn depth_count(&self) -> usize {
        self.depth_count as usize
    }

    /// Top node of the band (the piece digest when the band reaches the
    /// root).
    #[must_use]
    pub fn top(&self) -> [u8; 32] {
        let last = &self.levels[self.levels.len() - 1];
        last[0]
    }

    /// Authentication path for `node`, which must be one of the band's
    /// base-level nodes.
    ///
    /// The node is located by value; a node that is not in the base
    /// level means the cache belongs to a different piece or band and
    /// the operation fails with [`Error::StaleCache`].
    pub fn prove(&self, node: &[u8; 32]) -> Result<MerkleProof> {
        let base = &self.levels[0];
        let mut idx = base
            .iter()
            .position(|candidate| candidate == node)
            .ok_or(Error::StaleCache)?;

        let mut siblings = Vec::with_capacity(self.levels.len() - 1);
        let mut path = 0u64;
        for (i, level) in self.levels[..self.levels.len() - 1].iter().enumerate() {
            let depth = self.start_depth as usize + i;
            let sibling = level.get(idx ^ 1).copied().unwrap_or(*nul_pad(depth));
            siblings.push(sibling);
            path |= ((idx & 1) as u64) << i;
            idx >>= 1;
        }
        Ok(MerkleProof { siblings, path })
    }

    /// Persist the band as CBOR.
    pub fn store(&self, path: &Path) -> Result<()> {
        io::write_cbor(path, self)
    }

    /// Load a band persisted by [`store`](Self::store).
    pub fn load(path: &Path) -> Result<Self> {
        let cache: Self = io::read_cbor(path)?;
        if cache.levels.len() != cache.depth_count as usize || cache.levels.is_empty() {
            return Err(Error::codec(format!(
                "level cache at {} declares {} levels but stores {}",
                path.display(),
                cache.depth_count,
                cache.levels.len()
            )));
        }
        Ok(cache)
    }
}

/// Band start depth for a piece of the given padded byte size, clamped
/// so tiny pieces still get a well-formed band.
#[must_use]
pub fn start_depth_for(padded_size: u64, tree_depth: usize) -> usize {
    let wanted = if padded_size < START_DEPTH_THRESHOLD {
        SMALL_PIECE_START_DEPTH
    } else {
        LARGE_PIECE_START_DEPTH
    };
    wanted.min(tree_depth)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree(leaf_count: u8) -> PieceTree {
        let leaves: Vec<[u8; 32]> = (0..leaf_count).map(|i| [i; 32]).collect();
        PieceTree::build(leaves).unwrap()
    }

    #[test]
    fn band_prove_continues_a_window_proof() {
        let tree = sample_tree(16);
        let cache = LevelCache::from_tree(&tree, 2, 0).unwrap();
        assert_eq!(cache.start_depth(), 2);
        assert_eq!(cache.depth_count(), 3);
        assert_eq!(cache.top(), tree.root());

        // Every depth-2 node must prove up to the root.
        for node in tree.level(2).unwrap() {
            let proof = cache.prove(node).unwrap();
            assert_eq!(proof.depth(), 2);
            proof.verify(node, &tree.root()).unwrap();
        }
    }

    #[test]
    fn foreign_node_is_stale() {
        let tree = sample_tree(16);
        let cache = LevelCache::from_tree(&tree, 2, 0).unwrap();
        let foreign = [0xEEu8; 32];
        assert!(matches!(cache.prove(&foreign), Err(Error::StaleCache)));
    }

    #[test]
    fn store_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("piece.cache");

        let tree = sample_tree(8);
        let cache = LevelCache::from_tree(&tree, 1, 0).unwrap();
        cache.store(&path).unwrap();

        let loaded = LevelCache::load(&path).unwrap();
        assert_eq!(loaded, cache);
    }

    #[test]
    fn band_bounds_are_checked() {
        let tree = sample_tree(8);
        assert!(LevelCache::from_tree(&tree, 9, 0).is_err());
        assert!(LevelCache::from_tree(&tree, 1, 9).is_err());
    }

    #[test]
    fn start_depth_table() {
        assert_eq!(start_depth_for(128, 2), 2);
        assert_eq!(start_depth_for(1 << 20, 15), 4);
        assert_eq!(start_depth_for(2 << 20, 16), 16);
        assert_eq!(start_depth_for(1 << 30, 25), 16);
    }
}
