//! carproof-piece — piece commitments over Fr32-padded archive bytes.
//!
//! The sealing pipeline lives here:
//! payload bytes → [`fr32`] expansion → 32-byte leaves → [`tree`]
//! (SHA-254, nul-padded) → piece digest, with a [`cache`] band persisted
//! so later proofs can climb from an intermediate depth without
//! rebuilding the whole tree. [`commp`] composes the pipeline and
//! [`registry`] records each sealed piece under an advisory file lock.

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![deny(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::doc_markdown
)]

/// Persisted horizontal tree slices (level caches).
pub mod cache;
/// The CommP sealing service and `pad_commp`.
pub mod commp;
/// Fr32 127→128 byte expansion.
pub mod fr32;
/// SHA-254 node hashing.
pub mod hash;
/// The precomputed zero-subtree hash tower.
pub mod nulpad;
/// Per-dataset registry of sealed pieces.
pub mod registry;
/// Balanced SHA-254 Merkle tree with nul-padding and proofs.
pub mod tree;

pub use cache::LevelCache;
pub use commp::{commp, pad_commp, seal, SealedPiece};
pub use hash::{node_hash, sha254};
pub use nulpad::nul_pad;
pub use tree::{MerkleProof, PieceTree};
