//! Scoped advisory file lock.
//!
//! Registry appends are serialized across processes with an exclusive
//! `flock`-style lock on a dedicated lock file. The guard releases the
//! lock when dropped, on every exit path; the lock file itself is
//! created once and never deleted.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// Exclusive advisory lock held for the lifetime of the guard.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Acquire the lock at `path`, blocking until it is available.
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = Self::open(path)?;
        file.lock_exclusive()?;
        Ok(Self {
            file,
            path: path.to_owned(),
        })
    }

    /// Try to acquire the lock without blocking.
    ///
    /// Returns [`Error::LockBusy`] when another holder has it; the caller
    /// decides whether to retry.
    pub fn try_acquire(path: &Path) -> Result<Self> {
        let file = Self::open(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                file,
                path: path.to_owned(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(Error::LockBusy {
                path: path.display().to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(path: &Path) -> Result<File> {
        crate::io::ensure_parent_dir(path)?;
        Ok(OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?)
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_excludes_second_holder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.lock");

        let guard = FileLock::acquire(&path).unwrap();
        match FileLock::try_acquire(&path) {
            Err(Error::LockBusy { .. }) => {}
            other => panic!("expected LockBusy, got {other:?}"),
        }

        drop(guard);
        FileLock::try_acquire(&path).unwrap();
        assert!(path.exists(), "lock file must not be deleted");
    }
}
