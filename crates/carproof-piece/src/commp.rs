//! The CommP service: archive payload bytes → piece commitment.
//!
//! Sealing drains the payload, zero-pads it to a 127-byte boundary,
//! Fr32-expands it into 32-byte leaves, builds the nul-padded SHA-254
//! tree (optionally extended to a caller-chosen target size), persists a
//! level cache keyed by the digest, and reports the digest plus padded
//! size. `pad_commp` reproduces the target extension from a digest
//! alone.

use crate::cache::{self, LevelCache, CACHE_SUFFIX};
use crate::fr32;
use crate::hash::node_hash;
use crate::nulpad::nul_pad;
use crate::registry;
use crate::tree::{leaves_from_slabs, validate_padded_sizes, PieceTree};
use carproof_core::{piece_cid, CancelToken, Error, Result, SOURCE_CHUNK_SIZE};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Result of sealing one archive payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SealedPiece {
    /// 32-byte piece digest (Merkle root of the padded payload).
    pub digest: [u8; 32],
    /// Padded piece size in bytes (power of two).
    pub padded_size: u64,
}

impl SealedPiece {
    /// The digest in its commitment CID form.
    pub fn cid(&self) -> Result<cid::Cid> {
        piece_cid(&self.digest)
    }
}

/// Level cache path for a digest: `<cache_dir>/<hex(digest)>.cache`.
#[must_use]
pub fn digest_cache_path(cache_dir: &Path, digest: &[u8; 32]) -> PathBuf {
    cache_dir.join(format!("{}{CACHE_SUFFIX}", hex::encode(digest)))
}

/// Turn a payload into tree leaves.
///
/// Returns the leaves and the natural padded size (bytes of expanded
/// slabs, before any power-of-two rounding).
pub fn payload_leaves(mut payload: Vec<u8>) -> Result<(Vec<[u8; 32]>, u64)> {
    let rem = payload.len() % SOURCE_CHUNK_SIZE;
    if rem != 0 {
        payload.resize(payload.len() + SOURCE_CHUNK_SIZE - rem, 0);
    }
    if payload.is_empty() {
        payload.resize(SOURCE_CHUNK_SIZE, 0);
    }
    let slabs = fr32::expand(&payload)?;
    let source_padded = slabs.len() as u64;
    Ok((leaves_from_slabs(&slabs)?, source_padded))
}

/// Compute the piece commitment of `payload` and persist its level cache
/// under `cache_dir`.
///
/// `target_padded_size == 0` means the natural size; any other value
/// must be a power of two in `[128, MAX_PIECE_SIZE]` and at least the
/// natural padded size.
pub fn commp(
    mut payload: impl Read,
    cache_dir: &Path,
    target_padded_size: u64,
    cancel: &CancelToken,
) -> Result<SealedPiece> {
    let mut buf = Vec::new();
    payload.read_to_end(&mut buf)?;
    commp_bytes(buf, cache_dir, target_padded_size, cancel)
}

/// [`commp`] over an already-drained payload.
pub fn commp_bytes(
    payload: Vec<u8>,
    cache_dir: &Path,
    target_padded_size: u64,
    cancel: &CancelToken,
) -> Result<SealedPiece> {
    cancel.check()?;
    let (leaves, source_padded) = payload_leaves(payload)?;
    debug!(leaves = leaves.len(), source_padded, "expanded payload");

    cancel.check()?;
    let tree = if target_padded_size == 0 {
        PieceTree::build(leaves)?
    } else {
        PieceTree::build_padded(leaves, source_padded, target_padded_size)?
    };
    let padded_size = if target_padded_size == 0 {
        source_padded.next_power_of_two()
    } else {
        target_padded_size
    };

    let digest = tree.root();
    cancel.check()?;

    let start = cache::start_depth_for(padded_size, tree.depth());
    let band = LevelCache::from_tree(&tree, start, 0)?;
    let path = digest_cache_path(cache_dir, &digest);
    if let Err(e) = band.store(&path) {
        let _ = fs::remove_file(&path);
        return Err(e);
    }
    if cancel.is_cancelled() {
        let _ = fs::remove_file(&path);
        return Err(Error::Cancelled);
    }
    info!(
        digest = %hex::encode(digest),
        padded_size,
        start_depth = start,
        "sealed piece"
    );

    Ok(SealedPiece {
        digest,
        padded_size,
    })
}

/// Seal a payload and register it: compute the commitment, append the
/// registry entry under the advisory lock, and copy the level cache to
/// its CID-keyed name for the audit path.
///
/// The registry never reflects a piece whose cache failed to persist.
pub fn seal(
    payload: Vec<u8>,
    cache_dir: &Path,
    target_padded_size: u64,
    cancel: &CancelToken,
) -> Result<SealedPiece> {
    let archive_size = payload.len() as u64;
    let sealed = commp_bytes(payload, cache_dir, target_padded_size, cancel)?;

    let digest_path = digest_cache_path(cache_dir, &sealed.digest);
    let cid_path = cache_dir.join(format!("{}{CACHE_SUFFIX}", sealed.cid()?));
    fs::copy(&digest_path, &cid_path)?;

    if let Err(e) = registry::append(cache_dir, &sealed.digest, archive_size, cancel) {
        let _ = fs::remove_file(&cid_path);
        return Err(e);
    }
    Ok(sealed)
}

/// Extend a piece digest from `source_padded_size` to
/// `target_padded_size` by folding in nul-pad roots, without touching
/// the payload.
pub fn pad_commp(
    source_commp: &[u8; 32],
    source_padded_size: u64,
    target_padded_size: u64,
) -> Result<[u8; 32]> {
    validate_padded_sizes(source_padded_size, target_padded_size)?;

    let mut out = *source_commp;
    let s = source_padded_size.trailing_zeros() as usize;
    let t = target_padded_size.trailing_zeros() as usize;
    for d in s..t {
        // The tower is offset by five: leaves are 32-byte chunks.
        out = node_hash(&out, nul_pad(d - 5));
    }
    Ok(out)
}
