// src/registry/lock.rs

//! Advisory lock around registry mutations
//!
//! Held with `flock(LOCK_EX)` for one load-mutate-save cycle so that
//! separate `art` processes sharing a home do not lose each other's writes.

use crate::error::{Error, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive lock on `<home>/registry.lock`, released on drop
pub struct RegistryLock {
    file: File,
    path: PathBuf,
}

impl RegistryLock {
    /// Block until the lock is acquired
    pub fn acquire(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?;
        file.lock_exclusive().map_err(|e| {
            Error::IoError(format!("cannot lock {}: {}", path.display(), e))
        })?;

        debug!("Acquired registry lock {}", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
    }
}
