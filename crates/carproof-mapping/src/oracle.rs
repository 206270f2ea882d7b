//! A reference DAG oracle over a source directory.
//!
//! Walks the source tree in sorted order, cuts each file into
//! fixed-size raw leaves, adds one file node per file and a single
//! directory root, all encoded through a [`NodeCodec`]. Deterministic
//! for a given source tree, so archives built from it are reproducible,
//! which is the property the whole mapping/reconstruction pipeline
//! depends on.
//!
//! Production deployments plug in a real UnixFS builder behind
//! [`DagBlockStream`]; this oracle is what the CLI demo flow and the
//! test suites use.

use crate::rebuild::{ChildLink, NodeCodec, RawBlockCodec};
use crate::stream::{DagBlock, DagBlockStream, SourceRef};
use carproof_core::{Error, NodeKind, Result};
use cid::Cid;
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};

/// Default leaf chunk size: 1 MiB, the usual UnixFS chunker default.
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 20;

/// Deterministic block stream over a source directory tree.
#[derive(Debug)]
pub struct FileOracle {
    blocks: VecDeque<DagBlock>,
    data_root: Cid,
}

impl FileOracle {
    /// Chunk every file under `source_root` into `chunk_size`-byte raw
    /// leaves and assemble the file/directory nodes above them.
    pub fn build(source_root: &Path, chunk_size: usize) -> Result<Self> {
        Self::build_with(source_root, chunk_size, &RawBlockCodec)
    }

    /// [`build`](Self::build) with a caller-supplied codec.
    pub fn build_with<C: NodeCodec>(
        source_root: &Path,
        chunk_size: usize,
        codec: &C,
    ) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::invalid("oracle chunk size must be non-zero"));
        }
        let mut files = Vec::new();
        collect_files(source_root, source_root, &mut files)?;
        files.sort();
        if files.is_empty() {
            return Err(Error::invalid(format!(
                "no source files under {}",
                source_root.display()
            )));
        }

        let mut blocks = VecDeque::new();
        let mut dir_links = Vec::new();
        for rel in &files {
            let data = fs::read(source_root.join(rel))?;
            let rel_str = rel.to_string_lossy().into_owned();

            let mut file_links = Vec::new();
            let mut offset = 0u64;
            for chunk in data.chunks(chunk_size.max(1)) {
                let (cid, payload) = codec.encode_leaf(NodeKind::Raw, chunk)?;
                blocks.push_back(DagBlock {
                    cid,
                    bytes: payload,
                    kind: NodeKind::Raw,
                    links: Vec::new(),
                    source: Some(SourceRef {
                        path: rel_str.clone(),
                        offset,
                        size: chunk.len() as u64,
                    }),
                    block_size: chunk.len() as u64,
                });
                file_links.push(ChildLink {
                    cid,
                    size: chunk.len() as u64,
                });
                offset += chunk.len() as u64;
            }

            let (file_cid, file_payload) = codec.encode_internal(NodeKind::File, &file_links)?;
            let file_size = data.len() as u64;
            blocks.push_back(DagBlock {
                cid: file_cid,
                bytes: file_payload,
                kind: NodeKind::File,
                links: file_links.iter().map(|l| l.cid).collect(),
                source: None,
                block_size: file_size,
            });
            dir_links.push(ChildLink {
                cid: file_cid,
                size: file_size,
            });
        }

        let (root_cid, root_payload) = codec.encode_internal(NodeKind::Directory, &dir_links)?;
        let dir_size = dir_links.iter().map(|l| l.size).sum();
        blocks.push_back(DagBlock {
            cid: root_cid,
            bytes: root_payload,
            kind: NodeKind::Directory,
            links: dir_links.iter().map(|l| l.cid).collect(),
            source: None,
            block_size: dir_size,
        });

        Ok(Self {
            blocks,
            data_root: root_cid,
        })
    }

    /// Root cid of the assembled DAG.
    #[must_use]
    pub fn data_root(&self) -> Cid {
        self.data_root
    }
}

impl DagBlockStream for FileOracle {
    fn next_block(&mut self) -> Result<Option<DagBlock>> {
        Ok(self.blocks.pop_front())
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out)?;
        } else {
            let rel = path
                .strip_prefix(root)
                .map_err(|e| Error::invalid(format!("source path escapes root: {e}")))?;
            out.push(rel.to_owned());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oracle_is_deterministic_and_leaf_first() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.bin"), vec![2u8; 300]).unwrap();
        fs::write(dir.path().join("a.bin"), vec![1u8; 100]).unwrap();

        let mut first = FileOracle::build(dir.path(), 128).unwrap();
        let second = FileOracle::build(dir.path(), 128).unwrap();
        assert_eq!(first.data_root(), second.data_root());

        // a.bin: 1 leaf + file node; b.bin: 3 leaves + file node; 1 root.
        let mut kinds = Vec::new();
        while let Some(block) = first.next_block().unwrap() {
            kinds.push(block.kind);
        }
        assert_eq!(
            kinds,
            vec![
                NodeKind::Raw,
                NodeKind::File,
                NodeKind::Raw,
                NodeKind::Raw,
                NodeKind::Raw,
                NodeKind::File,
                NodeKind::Directory,
            ]
        );
    }
}
