//! Error kinds shared by every carproof component.
//!
//! Each variant corresponds to one failure class of the commitment and
//! proof engine. Components report upward; nothing is swallowed. Only
//! [`Error::LockBusy`] is eligible for a local retry loop; everything
//! else bubbles to the CLI boundary, which maps it to an exit code and a
//! single human-readable message.

use cid::Cid;
use thiserror::Error;

/// Convenience alias used across the workspace.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure classes of the commitment and proof engine.
#[derive(Debug, Error)]
pub enum Error {
    /// A size or parameter is outside its contract (non-power-of-two,
    /// out of `[128, MAX_PIECE_SIZE]`, …). The message carries the exact
    /// constraint that was violated.
    #[error("{0}")]
    InvalidArgument(String),

    /// A read returned fewer bytes than the caller required.
    #[error("short read: wanted {wanted} bytes, got {got}")]
    ShortRead {
        /// Bytes the caller asked for.
        wanted: u64,
        /// Bytes actually read.
        got: u64,
    },

    /// A write consumed fewer bytes than were supplied.
    #[error("short write: wanted {wanted} bytes, wrote {wrote}")]
    ShortWrite {
        /// Bytes the caller supplied.
        wanted: u64,
        /// Bytes actually written.
        wrote: u64,
    },

    /// The mapping index already holds a record for this cid.
    #[error("block {cid} already registered in the mapping index")]
    DuplicateBlock {
        /// The offending block cid.
        cid: Cid,
    },

    /// The writer observer or reconstructor referenced a cid that was
    /// never inserted.
    #[error("block {cid} is not registered in the mapping index")]
    UnknownBlock {
        /// The missing block cid.
        cid: Cid,
    },

    /// A selected mapping slice has a gap; the requested archive window
    /// cannot be reconstructed from it.
    #[error("chunk mappings are not contiguous at archive offset {offset}")]
    DiscontinuousChunk {
        /// First archive offset not covered by the slice.
        offset: u64,
    },

    /// A rebuilt block hashed to a different cid than the one recorded
    /// during ingestion.
    #[error("rebuilt block cid {got} does not match recorded cid {want}")]
    CidMismatch {
        /// Cid recorded in the mapping index.
        want: Cid,
        /// Cid of the freshly rebuilt block.
        got: Cid,
    },

    /// An authentication path did not fold to the expected root.
    #[error("proof does not fold to the expected piece digest")]
    ProofInvalid,

    /// A level cache band does not contain the node the prover supplied;
    /// the cache belongs to a different piece or a different band depth.
    #[error("level cache band does not contain the requested node")]
    StaleCache,

    /// The advisory lock is held elsewhere and a non-blocking acquisition
    /// was requested. The caller decides whether to retry.
    #[error("advisory lock is busy: {path}")]
    LockBusy {
        /// Path of the contended lock file.
        path: String,
    },

    /// The operation observed its cancellation token and stopped early.
    /// Partial outputs have been removed.
    #[error("operation cancelled")]
    Cancelled,

    /// Underlying I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure of a persisted artifact.
    #[error("codec error: {0}")]
    Codec(String),
}

impl Error {
    /// Shorthand for an [`Error::InvalidArgument`] with a formatted message.
    #[must_use]
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Shorthand for an [`Error::Codec`] with a formatted message.
    #[must_use]
    pub fn codec(msg: impl std::fmt::Display) -> Self {
        Self::Codec(msg.to_string())
    }
}
