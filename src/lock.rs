//! Advisory run locks.
//!
//! Two scanner runs over the same volume would race on deletion detection,
//! so each run takes an exclusive lock on `<lock_dir>/<key>.lock` first.
//! The key for a volume is a SHA-256 prefix of its path; the hash pass uses
//! the fixed key `hash-pass`.
//!
//! Locks are `flock`/`LockFileEx` based (via `fs2`) and are released when the
//! guard drops or the process dies.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use sha2::{Digest, Sha256};

/// Lock name used by the hash pass.
pub const HASH_PASS_LOCK: &str = "hash-pass";

/// Errors from lock operations.
#[derive(thiserror::Error, Debug)]
pub enum LockError {
    /// Another run holds the lock.
    #[error("Another run holds the lock: {0}")]
    Locked(PathBuf),

    /// The lock file could not be created or locked.
    #[error("Failed to lock {path}: {source}")]
    Io {
        /// Lock file path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

/// Exclusive lock held for the duration of a run.
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl std::fmt::Debug for RunLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLock").field("path", &self.path).finish()
    }
}

impl RunLock {
    /// Try to lock the scan of `volume`, without blocking.
    ///
    /// # Errors
    ///
    /// [`LockError::Locked`] if another process holds it.
    pub fn for_volume(lock_dir: &Path, volume: &Path) -> Result<Self, LockError> {
        Self::acquire(lock_dir, &volume_key(volume))
    }

    /// Try to lock the hash pass, without blocking.
    ///
    /// # Errors
    ///
    /// [`LockError::Locked`] if another process holds it.
    pub fn for_hash_pass(lock_dir: &Path) -> Result<Self, LockError> {
        Self::acquire(lock_dir, HASH_PASS_LOCK)
    }

    /// Try to take the named lock, without blocking.
    ///
    /// # Errors
    ///
    /// [`LockError::Locked`] if another process holds it, [`LockError::Io`]
    /// if the lock file can't be created.
    pub fn acquire(lock_dir: &Path, name: &str) -> Result<Self, LockError> {
        let path = lock_dir.join(format!("{name}.lock"));
        let io_err = |source| LockError::Io {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(lock_dir).map_err(io_err)?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(io_err)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                log::debug!("Acquired run lock {}", path.display());
                Ok(Self { file, path })
            }
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => {
                Err(LockError::Locked(path))
            }
            Err(e) => Err(io_err(e)),
        }
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            log::debug!("Failed to release {}: {}", self.path.display(), e);
        } else {
            log::debug!("Released run lock {}", self.path.display());
        }
    }
}

/// Stable lock name for a volume root.
#[must_use]
pub fn volume_key(volume: &Path) -> String {
    let digest = Sha256::digest(volume.as_os_str().as_encoded_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("volume-{}", &hex[..16])
}
