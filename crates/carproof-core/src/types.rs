//! Canonical data types shared across the carproof workspace.
//!
//! The geometry constants pin down the Fr32 commitment layout: a 127-byte
//! source chunk expands to a 128-byte slab holding four 32-byte tree
//! leaves. `MAX_PIECE_SIZE` bounds the proving tree at 2^36 bytes
//! (`MAX_LAYERS` hashing layers above the 32-byte leaves).

use crate::error::{Error, Result};
use cid::Cid;
use serde::{Deserialize, Serialize};

/// Bytes consumed from the source stream per Fr32 expansion step.
pub const SOURCE_CHUNK_SIZE: usize = 127;

/// Bytes produced per Fr32 expansion step.
pub const SLAB_SIZE: usize = 128;

/// Size of one Merkle tree node / leaf in bytes.
pub const NODE_SIZE: usize = 32;

/// Tree leaves contained in one padded slab.
pub const NODES_PER_SLAB: usize = 4;

/// Maximum height of the proving tree above the 32-byte leaves.
pub const MAX_LAYERS: usize = 31;

/// Maximum supported padded piece size in bytes (2^36).
pub const MAX_PIECE_SIZE: u64 = 1 << (MAX_LAYERS + 5);

/// Kind of DAG block recorded in the mapping index.
///
/// Mirrors the UnixFS data types the DAG oracle reports; `Raw` covers
/// raw-leaf blocks that carry source bytes without protobuf framing.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    /// Raw leaf block (payload is source bytes verbatim).
    Raw,
    /// UnixFS file node.
    File,
    /// UnixFS directory node.
    Directory,
    /// UnixFS HAMT shard node.
    Hamt,
    /// UnixFS metadata node.
    Metadata,
    /// UnixFS symlink node.
    Symlink,
}

/// One block's mapping record: where its bytes came from and where its
/// framed form landed inside the archive.
///
/// `src_path`/`src_offset`/`src_size` are populated only for blocks
/// derived directly from source bytes; intermediate nodes carry `None`
/// and are rebuilt from `links`. `dst_offset` starts out `None` and is
/// back-filled once the archive writer reports the block's write.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockMapping {
    /// Content id of the block.
    #[serde(with = "crate::io::cid_string")]
    pub cid: Cid,
    /// Ordered child cids.
    #[serde(with = "crate::io::cid_string_vec", default)]
    pub links: Vec<Cid>,
    /// UnixFS kind of the block.
    pub node_kind: NodeKind,
    /// Source path relative to the configured source root, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_path: Option<String>,
    /// Offset of the block's payload inside the source file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_offset: Option<u64>,
    /// Bytes read from the source file for this block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_size: Option<u64>,
    /// Logical UnixFS byte count of the block.
    pub block_size: u64,
    /// Framed length inside the archive: varint header + cid + payload.
    pub chunk_size: u64,
    /// Offset of the framed block inside the archive, once written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_offset: Option<u64>,
}

impl BlockMapping {
    /// Archive byte range `[start, end)` covered by this block's frame.
    ///
    /// Returns `None` while `dst_offset` has not been back-filled.
    #[must_use]
    pub fn archive_range(&self) -> Option<(u64, u64)> {
        self.dst_offset.map(|off| (off, off + self.chunk_size))
    }
}

/// Size of a piece payload before Fr32 expansion, in bytes.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct UnpaddedPieceSize(pub u64);

/// Size of a piece after Fr32 expansion, in bytes. Always a power of two.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct PaddedPieceSize(pub u64);

impl UnpaddedPieceSize {
    /// Fr32 expansion: one extra byte per 127 source bytes.
    #[must_use]
    pub const fn padded(self) -> PaddedPieceSize {
        PaddedPieceSize(self.0 + self.0 / 127)
    }

    /// Check the 127·2^n shape contract.
    pub fn validate(self) -> Result<()> {
        if self.0 < 127 {
            return Err(Error::invalid("minimum piece size is 127 bytes"));
        }
        if self.0 >> self.0.trailing_zeros() != 127 {
            return Err(Error::invalid(
                "unpadded piece size must be a power of 2 multiple of 127",
            ));
        }
        Ok(())
    }
}

impl PaddedPieceSize {
    /// Inverse of [`UnpaddedPieceSize::padded`].
    #[must_use]
    pub const fn unpadded(self) -> UnpaddedPieceSize {
        UnpaddedPieceSize(self.0 - self.0 / 128)
    }

    /// Check the power-of-two shape contract.
    pub fn validate(self) -> Result<()> {
        if self.0 < 128 {
            return Err(Error::invalid("minimum padded piece size is 128 bytes"));
        }
        if !self.0.is_power_of_two() {
            return Err(Error::invalid("padded piece size must be a power of 2"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn padded_unpadded_roundtrip() {
        for exp in 0..10u32 {
            let unpadded = UnpaddedPieceSize(127 << exp);
            unpadded.validate().unwrap();
            let padded = unpadded.padded();
            padded.validate().unwrap();
            assert_eq!(padded.0, 128 << exp);
            assert_eq!(padded.unpadded(), unpadded);
        }
    }

    #[test]
    fn unpadded_shape_rejected() {
        assert!(UnpaddedPieceSize(126).validate().is_err());
        assert!(UnpaddedPieceSize(254 + 127).validate().is_err());
        assert!(UnpaddedPieceSize(128).validate().is_err());
    }

    #[test]
    fn padded_shape_rejected() {
        assert!(PaddedPieceSize(64).validate().is_err());
        assert!(PaddedPieceSize(129).validate().is_err());
        assert!(PaddedPieceSize(256).validate().is_ok());
    }

    #[test]
    fn max_piece_size_matches_max_layers() {
        assert_eq!(MAX_PIECE_SIZE, 1 << 36);
        assert_eq!(MAX_PIECE_SIZE / NODE_SIZE as u64, 1 << MAX_LAYERS);
    }
}
