//! BLAKE3 file hasher with streaming support.
//!
//! # Overview
//! This module provides the `Hasher` struct for computing BLAKE3 digests
//! of file contents using memory-efficient streaming. The digest is the
//! inventory's content hash; it is computed only by the hash pass, never
//! on the watcher's event path.
//!
//! # Example
//!
//! ```no_run
//! use voltrack::scanner::{hash_to_hex, Hasher};
//! use std::path::Path;
//!
//! let hasher = Hasher::new();
//! let digest = hasher.full_hash(Path::new("/volume1/data/y.txt")).unwrap();
//! println!("{}", hash_to_hex(&digest));
//! ```

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::HashError;

/// 32-byte BLAKE3 digest.
pub type Hash = [u8; 32];

/// Read buffer size for streaming (64 KiB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Streaming BLAKE3 file hasher.
#[derive(Debug, Clone, Default)]
pub struct Hasher {
    /// Optional shutdown flag; hashing of a large file stops early when set
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Hasher {
    /// Create a new hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Compute the BLAKE3 digest of a file's entire content.
    ///
    /// # Errors
    ///
    /// Returns [`HashError::NotFound`], [`HashError::PermissionDenied`] or
    /// [`HashError::Io`] when the file can't be read, and
    /// [`HashError::Interrupted`] when shutdown is requested mid-file.
    pub fn full_hash(&self, path: &Path) -> Result<Hash, HashError> {
        let mut file = File::open(path).map_err(|e| map_io_error(path, e))?;
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; BUFFER_SIZE];

        loop {
            if self.is_shutdown_requested() {
                return Err(HashError::Interrupted(path.to_path_buf()));
            }
            let read = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(map_io_error(path, e)),
            };
            hasher.update(&buffer[..read]);
        }

        Ok(*hasher.finalize().as_bytes())
    }

    /// Compute the digest of a file and return it as lowercase hex.
    ///
    /// # Errors
    ///
    /// See [`Hasher::full_hash`].
    pub fn full_hash_hex(&self, path: &Path) -> Result<String, HashError> {
        self.full_hash(path).map(|hash| hash_to_hex(&hash))
    }
}

fn map_io_error(path: &Path, error: std::io::Error) -> HashError {
    match error.kind() {
        ErrorKind::NotFound => HashError::NotFound(path.to_path_buf()),
        ErrorKind::PermissionDenied => HashError::PermissionDenied(path.to_path_buf()),
        _ => HashError::Io {
            path: path.to_path_buf(),
            source: error,
        },
    }
}

/// Encode a digest as lowercase hex (64 characters).
#[must_use]
pub fn hash_to_hex(hash: &Hash) -> String {
    blake3::Hash::from(*hash).to_hex().to_string()
}
