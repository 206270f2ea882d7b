//! The two-tier proof engine.
//!
//! For each challenged byte index the engine rebuilds the enclosing
//! aligned archive window, grows an in-memory tree over it up to the
//! piece's level-cache band, and splices the cached band path on top:
//! one authentication path from a 32-byte leaf to the piece digest,
//! without ever rebuilding the full piece tree. Window geometry follows
//! the cache band: 2_080_768 source bytes (65 536 leaves, depth 16) for
//! pieces of 2 MiB and above, 508 source bytes (16 leaves, depth 4)
//! below that.

use crate::challenge;
use carproof_core::{io, piece_cid, CancelToken, Error, Result};
use carproof_mapping::{mapping_file_path, ChunkRebuilder, NodeCodec};
use carproof_piece::cache::{self, LevelCache, CACHE_SUFFIX};
use carproof_piece::commp::payload_leaves;
use carproof_piece::registry;
use carproof_piece::tree::{MerkleProof, PieceTree};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Challenge bundle file name inside a cache directory.
pub const CHALLENGE_PROOFS_FILE: &str = "challenges.proofs";

/// Source-byte window for pieces of 2 MiB and above (16 384 chunks).
pub const LARGE_WINDOW_BYTES: u64 = 127 * 16_384;

/// Source-byte window for smaller pieces (4 chunks).
pub const SMALL_WINDOW_BYTES: u64 = 127 * 4;

/// Padded piece size at which the window switches.
const LARGE_PIECE_PADDED: u64 = 2 << 20;

/// The persisted outcome of one audit round: per challenge, the leaf
/// bytes and the spliced authentication path to its piece digest.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChallengeBundle {
    /// Seed the challenges were derived from.
    pub random_seed: u64,
    /// Challenged leaf values, in derivation order.
    pub leaves: Vec<[u8; 32]>,
    /// Sibling lists, one per leaf.
    pub siblings: Vec<Vec<[u8; 32]>>,
    /// Orientation bits, one per leaf.
    pub paths: Vec<u64>,
}

impl ChallengeBundle {
    fn new(random_seed: u64) -> Self {
        Self {
            random_seed,
            ..Self::default()
        }
    }

    fn push(&mut self, leaf: [u8; 32], proof: MerkleProof) {
        self.leaves.push(leaf);
        self.siblings.push(proof.siblings);
        self.paths.push(proof.path);
    }

    /// Number of challenge proofs in the bundle.
    #[must_use]
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// Whether the bundle holds no proofs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Persist to `<cache_dir>/challenges.proofs` (CBOR).
    pub fn store(&self, cache_dir: &Path) -> Result<()> {
        io::write_cbor(&cache_dir.join(CHALLENGE_PROOFS_FILE), self)
    }

    /// Load the last persisted bundle.
    pub fn load(cache_dir: &Path) -> Result<Self> {
        io::read_cbor(&cache_dir.join(CHALLENGE_PROOFS_FILE))
    }
}

/// Window geometry derived from a piece's archive size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct PieceGeometry {
    padded_size: u64,
    band_start: usize,
    window_bytes: u64,
    window_leaves: u64,
}

/// Padded piece size for an archive of `archive_size` bytes.
fn padded_size_for_archive(archive_size: u64) -> u64 {
    let chunks = archive_size.div_ceil(127).max(1);
    (chunks * 128).next_power_of_two()
}

fn geometry(archive_size: u64) -> PieceGeometry {
    let padded_size = padded_size_for_archive(archive_size);
    let tree_depth = padded_size.trailing_zeros() as usize - 5;
    let band_start = cache::start_depth_for(padded_size, tree_depth);
    let window_bytes = if padded_size >= LARGE_PIECE_PADDED {
        LARGE_WINDOW_BYTES
    } else {
        SMALL_WINDOW_BYTES
    };
    PieceGeometry {
        padded_size,
        band_start,
        window_bytes,
        window_leaves: 1 << band_start,
    }
}

/// Generate and persist the challenge proof bundle for an audit seed.
///
/// `mapping_dir` holds the piece-cid-keyed mapping files written at seal
/// time; `source_root` is the original source tree the archives were cut
/// from.
pub fn gen_challenge_proof<C: NodeCodec>(
    random_seed: u64,
    cache_dir: &Path,
    mapping_dir: &Path,
    source_root: &Path,
    codec: C,
    cancel: &CancelToken,
) -> Result<ChallengeBundle> {
    let records = registry::load_sorted(cache_dir)?;
    let sizes: Vec<u64> = records.iter().map(|r| r.archive_size).collect();
    let challenges = challenge::gen_challenges(random_seed, &sizes)?;

    let rebuilder = ChunkRebuilder::new(codec, source_root);
    let mut bundle = ChallengeBundle::new(random_seed);

    for (&piece_idx, leaf_idxs) in &challenges {
        let record = &records[piece_idx as usize];
        let cid = piece_cid(&record.digest)?;
        let geo = geometry(record.archive_size);
        let cache = LevelCache::load(&cache_dir.join(format!("{cid}{CACHE_SUFFIX}")))?;
        let mapping_path = mapping_file_path(mapping_dir, &cid);
        debug!(
            piece = piece_idx,
            %cid,
            padded_size = geo.padded_size,
            band_start = geo.band_start,
            challenges = leaf_idxs.len(),
            "proving piece challenges"
        );

        for &leaf_idx in leaf_idxs {
            cancel.check()?;
            let window_start = leaf_idx / geo.window_bytes * geo.window_bytes;
            // The trailing window of an archive is almost always shorter
            // than the window stride. Only the bytes the mapping covers
            // are requested; anything missing below that surfaces as a
            // short read from the reconstructor.
            let window_len = geo.window_bytes.min(record.archive_size - window_start);
            let buf =
                rebuilder.challenge_window(&mapping_path, window_start, window_len, cancel)?;

            // Zero-extend a truncated trailing window to the fixed
            // per-window leaf count. The piece tree nul-pads the same
            // region, so the window root is unchanged and every
            // derivable challenge index resolves to the exact leaf the
            // derivation designates.
            let (mut leaves, _) = payload_leaves(buf)?;
            leaves.resize(geo.window_leaves as usize, [0u8; 32]);
            let tree = PieceTree::build(leaves)?;

            let inner_index = (leaf_idx % geo.window_leaves) as usize;
            let leaf = tree.level(0).expect("leaf level always present")[inner_index];
            let inner = tree.proof(inner_index)?;
            let local_root = tree.root();

            let upper = cache.prove(&local_root)?;
            let full = inner.append(&upper);

            // A bundle that would not verify is worthless; reject early.
            full.verify(&leaf, &record.digest)?;
            bundle.push(leaf, full);
        }
    }

    bundle.store(cache_dir)?;
    info!(proofs = bundle.len(), seed = random_seed, "challenge bundle written");
    Ok(bundle)
}

/// Verify the last persisted challenge bundle against the registry.
///
/// The challenge set is re-derived from the bundle's seed; each stored
/// path must fold its leaf to the digest of the piece that challenge
/// targets.
pub fn verify_challenge_proof(cache_dir: &Path) -> Result<()> {
    let bundle = ChallengeBundle::load(cache_dir)?;
    let records = registry::load_sorted(cache_dir)?;
    let sizes: Vec<u64> = records.iter().map(|r| r.archive_size).collect();
    let challenges = challenge::gen_challenges(bundle.random_seed, &sizes)?;

    let expected: Vec<u64> = challenges
        .iter()
        .flat_map(|(&piece_idx, leaf_idxs)| leaf_idxs.iter().map(move |_| piece_idx))
        .collect();
    if expected.len() != bundle.len()
        || bundle.siblings.len() != bundle.len()
        || bundle.paths.len() != bundle.len()
    {
        return Err(Error::ProofInvalid);
    }

    for (k, &piece_idx) in expected.iter().enumerate() {
        let proof = MerkleProof {
            siblings: bundle.siblings[k].clone(),
            path: bundle.paths[k],
        };
        proof.verify(&bundle.leaves[k], &records[piece_idx as usize].digest)?;
    }
    debug!(proofs = bundle.len(), "challenge bundle verified");
    Ok(())
}
