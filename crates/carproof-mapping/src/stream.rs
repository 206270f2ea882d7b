//! The DAG oracle seam and the archive write observer.
//!
//! The engine never builds UnixFS DAGs itself: a [`DagBlockStream`]
//! yields blocks in DAG-writer order, each with its source provenance
//! when it was cut directly from source bytes. [`record_block`] turns a
//! block into its mapping record; [`TrackingWriter`] wraps the archive
//! writer and back-fills each record's archive offset the moment the
//! block's cid crosses the stream.

use crate::car;
use crate::index::MappingIndex;
use carproof_core::{BlockMapping, NodeKind, Result};
use cid::Cid;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::warn;

/// Source provenance of a leaf block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceRef {
    /// Path relative to the configured source root.
    pub path: String,
    /// Offset of the block's payload inside that file.
    pub offset: u64,
    /// Bytes read from the file for this block.
    pub size: u64,
}

/// One block emitted by the DAG oracle.
#[derive(Clone, Debug)]
pub struct DagBlock {
    /// Content id of the block.
    pub cid: Cid,
    /// Serialized block payload.
    pub bytes: Vec<u8>,
    /// UnixFS kind.
    pub kind: NodeKind,
    /// Ordered child cids.
    pub links: Vec<Cid>,
    /// Source provenance, for blocks cut directly from source bytes.
    pub source: Option<SourceRef>,
    /// Logical UnixFS byte count.
    pub block_size: u64,
}

/// Deterministic stream of DAG blocks in writer order.
pub trait DagBlockStream {
    /// Next block, or `None` once the DAG is exhausted.
    fn next_block(&mut self) -> Result<Option<DagBlock>>;
}

/// Record one oracle block into the mapping index.
pub fn record_block(index: &MappingIndex, block: &DagBlock) -> Result<()> {
    let mapping = BlockMapping {
        cid: block.cid,
        links: block.links.clone(),
        node_kind: block.kind,
        src_path: block.source.as_ref().map(|s| s.path.clone()),
        src_offset: block.source.as_ref().map(|s| s.offset),
        src_size: block.source.as_ref().map(|s| s.size),
        block_size: block.block_size,
        chunk_size: car::framed_len(&block.cid, block.bytes.len() as u64),
        dst_offset: None,
    };
    index.insert(mapping, block.bytes.len() as u64)
}

/// Archive writer wrapper that observes every write.
///
/// Whenever a written buffer parses as exactly one cid known to the
/// index, the frame containing it is assumed to start one uvarint
/// earlier and the record's `dst_offset` is back-filled. Unknown cids
/// are logged and skipped: the oracle contract says every frame is
/// cid-prefixed, so an unknown cid is a foreign write, not an error.
#[derive(Debug)]
pub struct TrackingWriter<W: Write> {
    inner: W,
    offset: u64,
    index: Arc<MappingIndex>,
}

impl<W: Write> TrackingWriter<W> {
    /// Wrap `inner`, reporting offsets from `start_offset` onward.
    pub fn new(inner: W, index: Arc<MappingIndex>, start_offset: u64) -> Self {
        Self {
            inner,
            offset: start_offset,
            index,
        }
    }

    /// Current absolute offset on the archive stream.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Unwrap the inner writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for TrackingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        if let Ok(cid) = Cid::try_from(buf) {
            if cid.to_bytes().len() == buf.len() {
                if let Err(e) = self.index.set_archive_offset(&cid, self.offset) {
                    warn!(%cid, offset = self.offset, error = %e, "unmatched cid on archive stream");
                }
            }
        }
        self.offset += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Drain a DAG oracle into an archive writer, recording every block.
///
/// Writes the CAR header for `data_root`, then each block as
/// varint ∥ cid ∥ payload in three writes so the tracking writer can
/// observe the cid. Returns the total archive size in bytes.
pub fn build_archive<W: Write>(
    stream: &mut dyn DagBlockStream,
    index: &Arc<MappingIndex>,
    out: W,
    data_root: Cid,
) -> Result<u64> {
    index.set_data_root(data_root);

    let mut writer = TrackingWriter::new(out, Arc::clone(index), 0);
    writer.write_all(&car::header_bytes(&data_root)?)?;

    while let Some(block) = stream.next_block()? {
        record_block(index, &block)?;

        let cid_bytes = block.cid.to_bytes();
        let body_len = (cid_bytes.len() + block.bytes.len()) as u64;
        writer.write_all(&car::uvarint(body_len))?;
        writer.write_all(&cid_bytes)?;
        writer.write_all(&block.bytes)?;
    }
    writer.flush()?;
    Ok(writer.offset())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    fn raw_block(payload: &[u8]) -> DagBlock {
        let digest: [u8; 32] = Sha256::digest(payload).into();
        let mh = cid::multihash::Multihash::<64>::wrap(0x12, &digest).unwrap();
        DagBlock {
            cid: Cid::new_v1(0x55, mh),
            bytes: payload.to_vec(),
            kind: NodeKind::Raw,
            links: Vec::new(),
            source: Some(SourceRef {
                path: "input/a.bin".into(),
                offset: 0,
                size: payload.len() as u64,
            }),
            block_size: payload.len() as u64,
        }
    }

    struct VecStream(Vec<DagBlock>);

    impl DagBlockStream for VecStream {
        fn next_block(&mut self) -> Result<Option<DagBlock>> {
            if self.0.is_empty() {
                Ok(None)
            } else {
                Ok(Some(self.0.remove(0)))
            }
        }
    }

    #[test]
    fn build_archive_backfills_contiguous_offsets() {
        let blocks = vec![raw_block(b"first payload"), raw_block(b"second")];
        let root = blocks[1].cid;
        let index = Arc::new(MappingIndex::new());

        let mut archive = Vec::new();
        let total =
            build_archive(&mut VecStream(blocks.clone()), &index, &mut archive, root).unwrap();
        assert_eq!(total as usize, archive.len());

        let all = index.all().unwrap();
        assert_eq!(all.len(), 2);

        // Frames tile the payload from the end of the header to EOF.
        let header_len = car::header_len(&root).unwrap();
        assert_eq!(all[0].dst_offset, Some(header_len));
        assert_eq!(
            all[0].dst_offset.unwrap() + all[0].chunk_size,
            all[1].dst_offset.unwrap()
        );
        assert_eq!(
            all[1].dst_offset.unwrap() + all[1].chunk_size,
            total
        );

        // The recorded frame really sits at the recorded offset.
        let frame = car::frame_block(&blocks[0].cid, &blocks[0].bytes);
        let start = header_len as usize;
        assert_eq!(&archive[start..start + frame.len()], &frame[..]);
    }
}
