//! carproof-core — canonical types, errors, and I/O shared across carproof.
//!
//! This crate defines the **stable boundary** used by the other carproof
//! crates:
//! - the commitment geometry constants (source chunk, slab, node sizes,
//!   piece size limits),
//! - canonical data types (`BlockMapping`, `NodeKind`, piece-size newtypes),
//! - commitment digest ↔ piece CID conversion,
//! - the engine-wide [`Error`] enum,
//! - JSON/CBOR file helpers (tab-indented JSON for human-readable
//!   artifacts, CBOR for binary caches),
//! - the scoped advisory [`lock::FileLock`] guard, and
//! - the [`cancel::CancelToken`] threaded through long operations.

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

/// Cooperative cancellation flag for long-running operations.
pub mod cancel;
/// Piece commitment digest ↔ CID conversion and multicodec constants.
pub mod commitment;
/// Engine-wide error enum and `Result` alias.
pub mod error;
/// JSON/CBOR file helpers and hex encoding conventions.
pub mod io;
/// Scoped advisory file lock guard.
pub mod lock;
/// Canonical data types shared across the workspace.
pub mod types;

pub use cancel::CancelToken;
pub use commitment::{piece_cid, piece_digest_from_cid};
pub use error::{Error, Result};
pub use types::{
    BlockMapping, NodeKind, PaddedPieceSize, UnpaddedPieceSize, MAX_LAYERS, MAX_PIECE_SIZE,
    NODES_PER_SLAB, NODE_SIZE, SLAB_SIZE, SOURCE_CHUNK_SIZE,
};
