//! Per-dataset registry of sealed pieces.
//!
//! One CBOR file per cache directory maps each piece digest to the byte
//! size of its archive. Appends are read-modify-write under an exclusive
//! advisory lock on a sibling lock file; entries are deduplicated by
//! digest and never mutated. The whole dataset proof layer is derived
//! from this registry.

use carproof_core::{io, lock::FileLock, CancelToken, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Registry file name inside a cache directory.
pub const REGISTRY_FILE: &str = "rawCommP.cache";

/// Advisory lock file name; created once, never deleted.
pub const REGISTRY_LOCK_FILE: &str = "rawCommP.cache.lock";

/// One sealed piece.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PieceRecord {
    /// 32-byte piece digest.
    pub digest: [u8; 32],
    /// Byte size of the archive the piece commits to.
    pub archive_size: u64,
}

fn registry_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(REGISTRY_FILE)
}

fn lock_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join(REGISTRY_LOCK_FILE)
}

/// Append one record under the advisory lock.
///
/// A digest already present is left untouched; the registry is
/// append-only and deduplicated. The on-disk file is replaced through a
/// temp-file rename so readers never observe a torn write.
pub fn append(
    cache_dir: &Path,
    digest: &[u8; 32],
    archive_size: u64,
    cancel: &CancelToken,
) -> Result<()> {
    fs::create_dir_all(cache_dir)?;
    let _guard = FileLock::acquire(&lock_path(cache_dir))?;
    cancel.check()?;

    let mut records = load_unlocked(cache_dir)?;
    if records.iter().any(|r| &r.digest == digest) {
        debug!(digest = %hex_digest(digest), "piece already registered");
        return Ok(());
    }
    records.push(PieceRecord {
        digest: *digest,
        archive_size,
    });

    let path = registry_path(cache_dir);
    let tmp = path.with_extension("cache.tmp");
    io::write_cbor(&tmp, &records)?;
    fs::rename(&tmp, &path)?;
    debug!(digest = %hex_digest(digest), archive_size, "registered piece");
    Ok(())
}

/// Load the registry in insertion order. A missing file is an empty
/// registry.
pub fn load(cache_dir: &Path) -> Result<Vec<PieceRecord>> {
    let _guard = FileLock::acquire(&lock_path(cache_dir))?;
    load_unlocked(cache_dir)
}

/// Load and sort lexicographically by digest, dropping duplicates.
///
/// This is the canonical piece ordering the challenge generator and the
/// dataset proof both rely on.
pub fn load_sorted(cache_dir: &Path) -> Result<Vec<PieceRecord>> {
    let mut records = load(cache_dir)?;
    records.sort_by(|a, b| a.digest.cmp(&b.digest));
    records.dedup_by(|a, b| a.digest == b.digest);
    Ok(records)
}

fn load_unlocked(cache_dir: &Path) -> Result<Vec<PieceRecord>> {
    let path = registry_path(cache_dir);
    if !path.exists() {
        return Ok(Vec::new());
    }
    io::read_cbor(&path)
}

fn hex_digest(digest: &[u8; 32]) -> String {
    hex::encode(digest)
}

/// Non-blocking variant of [`append`] for callers that prefer to retry
/// on a busy lock themselves.
pub fn try_append(cache_dir: &Path, digest: &[u8; 32], archive_size: u64) -> Result<()> {
    fs::create_dir_all(cache_dir)?;
    let _guard = FileLock::try_acquire(&lock_path(cache_dir))?;

    let mut records = load_unlocked(cache_dir)?;
    if records.iter().any(|r| &r.digest == digest) {
        return Ok(());
    }
    records.push(PieceRecord {
        digest: *digest,
        archive_size,
    });

    let path = registry_path(cache_dir);
    let tmp = path.with_extension("cache.tmp");
    io::write_cbor(&tmp, &records)?;
    fs::rename(&tmp, &path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use carproof_core::Error;

    #[test]
    fn append_load_sorted_dedup() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancelToken::new();

        let b = [0xBBu8; 32];
        let a = [0xAAu8; 32];
        append(dir.path(), &b, 2048, &cancel).unwrap();
        append(dir.path(), &a, 1024, &cancel).unwrap();
        append(dir.path(), &a, 9999, &cancel).unwrap(); // duplicate ignored

        let sorted = load_sorted(dir.path()).unwrap();
        assert_eq!(sorted.len(), 2);
        assert_eq!(sorted[0].digest, a);
        assert_eq!(sorted[0].archive_size, 1024);
        assert_eq!(sorted[1].digest, b);
        assert_eq!(sorted[1].archive_size, 2048);

        assert!(dir.path().join(REGISTRY_LOCK_FILE).exists());
    }

    #[test]
    fn empty_registry_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn try_append_reports_a_busy_lock() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path()).unwrap();
        let guard = FileLock::acquire(&lock_path(dir.path())).unwrap();
        assert!(matches!(
            try_append(dir.path(), &[7u8; 32], 512),
            Err(Error::LockBusy { .. })
        ));
        drop(guard);
        try_append(dir.path(), &[7u8; 32], 512).unwrap();
        assert_eq!(load_sorted(dir.path()).unwrap().len(), 1);
    }

    #[test]
    fn cancelled_append_registers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(
            append(dir.path(), &[1u8; 32], 100, &cancel),
            Err(Error::Cancelled)
        ));
        assert!(load(dir.path()).unwrap().is_empty());
    }
}
