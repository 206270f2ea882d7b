//! The mapping index: every DAG block's source and archive coordinates.
//!
//! Two writers feed the index during ingestion (the DAG oracle thread
//! inserting fresh records, the archive writer thread back-filling
//! `dst_offset`), so one mutex guards both the record table and the
//! raw-size table, and readers take it too. Records form a contiguous
//! partition of the archive payload; every query re-checks continuity
//! before handing out a slice.

use crate::car;
use carproof_core::{io, BlockMapping, Error, Result};
use cid::Cid;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Mapping files are JSON.
pub const MAPPING_FILE_SUFFIX: &str = ".json";

/// Persisted form of a sealed archive's mapping.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MappingFile {
    /// Root cid of the archive's DAG.
    #[serde(with = "carproof_core::io::cid_string")]
    pub data_root: Cid,
    /// All block mappings, sorted by `dst_offset`.
    pub mappings: Vec<BlockMapping>,
}

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<Cid, BlockMapping>,
    raw_sizes: HashMap<Cid, u64>,
    data_root: Option<Cid>,
}

/// Process-local registry keyed by block cid.
#[derive(Debug, Default)]
pub struct MappingIndex {
    inner: Mutex<Inner>,
}

impl MappingIndex {
    /// An empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the DAG root of the archive under construction.
    pub fn set_data_root(&self, root: Cid) {
        self.lock().data_root = Some(root);
    }

    /// The archive's DAG root, once known.
    #[must_use]
    pub fn data_root(&self) -> Option<Cid> {
        self.lock().data_root
    }

    /// Register a freshly emitted block.
    ///
    /// `raw_size` is the serialized block payload length; it is needed
    /// later to convert the writer's reported offset into the frame
    /// offset. Inserting a cid twice is a [`Error::DuplicateBlock`].
    pub fn insert(&self, mapping: BlockMapping, raw_size: u64) -> Result<()> {
        let mut inner = self.lock();
        if inner.records.contains_key(&mapping.cid) {
            return Err(Error::DuplicateBlock { cid: mapping.cid });
        }
        inner.raw_sizes.insert(mapping.cid, raw_size);
        inner.records.insert(mapping.cid, mapping);
        Ok(())
    }

    /// Back-fill the archive offset of a block after the writer reported
    /// a write of its cid at `cid_offset`.
    ///
    /// The frame starts one uvarint earlier: the varint encodes
    /// `raw_size + |cid|` and precedes the cid on the stream.
    pub fn set_archive_offset(&self, cid: &Cid, cid_offset: u64) -> Result<()> {
        let mut inner = self.lock();
        let raw_size = inner.raw_sizes.get(cid).copied();
        let record = inner
            .records
            .get_mut(cid)
            .ok_or(Error::UnknownBlock { cid: *cid })?;
        let mut offset = cid_offset;
        if let Some(raw) = raw_size {
            let body_len = raw + cid.to_bytes().len() as u64;
            offset -= car::uvarint_len(body_len) as u64;
        }
        record.dst_offset = Some(offset);
        Ok(())
    }

    /// Look up one record by cid.
    #[must_use]
    pub fn get(&self, cid: &Cid) -> Option<BlockMapping> {
        self.lock().records.get(cid).cloned()
    }

    /// Records overlapping the archive window `[offset, offset + size)`,
    /// sorted by `dst_offset` and checked for continuity.
    pub fn mappings_in(&self, offset: u64, size: u64) -> Result<Vec<BlockMapping>> {
        let window_end = offset.saturating_add(size);
        let selected = self.sorted_records(|rec| {
            rec.archive_range()
                .is_some_and(|(start, end)| start < window_end && end > offset)
        });
        Self::check_continuity(&selected)?;
        Ok(selected)
    }

    /// All written records, sorted and continuity-checked.
    pub fn all(&self) -> Result<Vec<BlockMapping>> {
        let selected = self.sorted_records(|rec| rec.dst_offset.is_some());
        Self::check_continuity(&selected)?;
        Ok(selected)
    }

    /// Freeze the mapping to `<dir>/<name>` as tab-indented JSON.
    pub fn save(&self, dir: &Path, name: &str) -> Result<()> {
        let data_root = self
            .data_root()
            .ok_or_else(|| Error::invalid("mapping index has no data root set"))?;
        let mappings = self.sorted_records(|rec| rec.dst_offset.is_some());
        let file = MappingFile {
            data_root,
            mappings,
        };
        let path = dir.join(name);
        io::write_json_tab(&path, &file)?;
        debug!(path = %path.display(), blocks = file.mappings.len(), "saved mapping file");
        Ok(())
    }

    /// Restore an index from a frozen mapping file.
    pub fn load(path: &Path) -> Result<Self> {
        let file: MappingFile = io::read_json(path)?;
        let index = Self::new();
        {
            let mut inner = index.lock();
            inner.data_root = Some(file.data_root);
            for mapping in file.mappings {
                inner.records.insert(mapping.cid, mapping);
            }
        }
        Ok(index)
    }

    fn sorted_records(&self, keep: impl Fn(&BlockMapping) -> bool) -> Vec<BlockMapping> {
        let inner = self.lock();
        let mut selected: Vec<BlockMapping> =
            inner.records.values().filter(|r| keep(r)).cloned().collect();
        selected.sort_by_key(|r| r.dst_offset);
        selected
    }

    fn check_continuity(records: &[BlockMapping]) -> Result<()> {
        let mut next_start = None;
        for rec in records {
            let (start, end) = rec
                .archive_range()
                .ok_or_else(|| Error::invalid("record has no archive offset"))?;
            if let Some(expected) = next_start {
                if start != expected {
                    return Err(Error::DiscontinuousChunk { offset: expected });
                }
            }
            next_start = Some(end);
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Canonical mapping file path for a cid-keyed name.
#[must_use]
pub fn mapping_file_path(mapping_dir: &Path, cid: &Cid) -> PathBuf {
    mapping_dir.join(format!("{cid}{MAPPING_FILE_SUFFIX}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use carproof_core::NodeKind;
    use sha2::{Digest, Sha256};

    fn cid_for(tag: u8) -> Cid {
        let digest: [u8; 32] = Sha256::digest([tag]).into();
        let mh = cid::multihash::Multihash::<64>::wrap(0x12, &digest).unwrap();
        Cid::new_v1(0x55, mh)
    }

    fn mapping(tag: u8, dst_offset: Option<u64>, chunk_size: u64) -> BlockMapping {
        BlockMapping {
            cid: cid_for(tag),
            links: Vec::new(),
            node_kind: NodeKind::Raw,
            src_path: Some(format!("input/file{tag}.bin")),
            src_offset: Some(0),
            src_size: Some(chunk_size.saturating_sub(40)),
            block_size: chunk_size.saturating_sub(40),
            chunk_size,
            dst_offset,
        }
    }

    #[test]
    fn duplicate_insert_rejected() {
        let index = MappingIndex::new();
        index.insert(mapping(1, None, 139), 100).unwrap();
        assert!(matches!(
            index.insert(mapping(1, None, 139), 100),
            Err(Error::DuplicateBlock { .. })
        ));
    }

    #[test]
    fn offset_backfill_subtracts_the_varint_prefix() {
        // raw size 93 + 36 cid bytes = 129 → two varint bytes, so a cid
        // written at offset 123 means the frame starts at 121.
        let index = MappingIndex::new();
        let m = mapping(1, None, 139);
        let cid = m.cid;
        assert_eq!(cid.to_bytes().len(), 36);
        index.insert(m, 93).unwrap();

        index.set_archive_offset(&cid, 123).unwrap();
        assert_eq!(index.get(&cid).unwrap().dst_offset, Some(121));
    }

    #[test]
    fn backfill_unknown_cid_rejected() {
        let index = MappingIndex::new();
        assert!(matches!(
            index.set_archive_offset(&cid_for(9), 50),
            Err(Error::UnknownBlock { .. })
        ));
    }

    #[test]
    fn window_query_selects_and_sorts() {
        let index = MappingIndex::new();
        index.insert(mapping(1, Some(100), 50), 10).unwrap();
        index.insert(mapping(2, Some(150), 50), 10).unwrap();
        index.insert(mapping(3, Some(200), 50), 10).unwrap();

        let hit = index.mappings_in(160, 10).unwrap();
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].dst_offset, Some(150));

        let spanning = index.mappings_in(140, 70).unwrap();
        assert_eq!(spanning.len(), 3);
        assert!(spanning.windows(2).all(|w| w[0].dst_offset < w[1].dst_offset));
    }

    #[test]
    fn gap_in_selection_is_discontinuous() {
        let index = MappingIndex::new();
        index.insert(mapping(1, Some(100), 50), 10).unwrap();
        index.insert(mapping(2, Some(160), 50), 10).unwrap(); // 10-byte hole

        match index.mappings_in(100, 200) {
            Err(Error::DiscontinuousChunk { offset }) => assert_eq!(offset, 150),
            other => panic!("expected DiscontinuousChunk, got {other:?}"),
        }
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let index = MappingIndex::new();
        index.set_data_root(cid_for(0));
        index.insert(mapping(2, Some(90), 60), 10).unwrap();
        index.insert(mapping(1, Some(30), 60), 10).unwrap();
        index.save(dir.path(), "archive.json").unwrap();

        let loaded = MappingIndex::load(&dir.path().join("archive.json")).unwrap();
        assert_eq!(loaded.data_root(), Some(cid_for(0)));
        let all = loaded.all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].dst_offset, Some(30));
        assert_eq!(all[1].dst_offset, Some(90));
    }
}
