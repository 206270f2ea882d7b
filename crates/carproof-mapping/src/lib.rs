//! carproof-mapping — block ↔ (source range, archive range) bookkeeping.
//!
//! During ingestion every DAG block is recorded in a [`index::MappingIndex`]:
//! once when the oracle emits it (source provenance) and once when the
//! archive writer lands it (archive offset). The frozen mapping file is
//! later enough to rebuild any aligned archive window from source bytes
//! alone (see [`rebuild::ChunkRebuilder`]), which is what keeps audit
//! I/O proportional to the challenged window rather than the archive.

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

/// CAR varint framing and header bytes.
pub mod car;
/// The cid-keyed mapping registry and mapping file I/O.
pub mod index;
/// Reference DAG oracle over a source directory.
pub mod oracle;
/// Archive window reconstruction from source data.
pub mod rebuild;
/// The DAG block oracle seam and the archive write observer.
pub mod stream;

pub use index::{mapping_file_path, MappingFile, MappingIndex, MAPPING_FILE_SUFFIX};
pub use oracle::FileOracle;
pub use rebuild::{ChildLink, ChunkRebuilder, NodeCodec, RawBlockCodec};
pub use stream::{build_archive, record_block, DagBlock, DagBlockStream, SourceRef, TrackingWriter};
