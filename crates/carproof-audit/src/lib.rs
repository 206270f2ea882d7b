//! carproof-audit — the challenge / proof / verify protocol.
//!
//! Two proof tiers live here. The inner tier authenticates single
//! leaves of one piece: the [`challenge`] generator derives leaf indices
//! from a seed, the [`engine`] rebuilds the enclosing archive window,
//! proves the leaf up to the level-cache band, and splices the cached
//! path to the piece digest. The outer tier, [`dataset`], commits the
//! sorted set of piece digests under a single root.

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

/// Deterministic challenge derivation from a random seed.
pub mod challenge;
/// Dataset-level Merkle commitment over piece digests.
pub mod dataset;
/// The two-tier proof engine and bundle persistence.
pub mod engine;

pub use challenge::{car_challenge_count, gen_challenges, leaf_challenge_count};
pub use dataset::{gen_dataset_proof, verify_dataset_proof, DatasetCheck, DatasetProof};
pub use engine::{gen_challenge_proof, verify_challenge_proof, ChallengeBundle};
