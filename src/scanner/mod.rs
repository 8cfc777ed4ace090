//! Scanner module: directory traversal, reconciliation and deferred hashing.
//!
//! This module provides functionality for:
//! - Depth-first volume walking with deny-list pruning
//! - Reconciling walk results against the inventory store
//! - The hash pass that computes digests for records flagged for rehash
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Directory traversal and entry discovery
//! - [`identity`]: `(device, inode)` identity for move correlation
//! - [`hasher`]: BLAKE3 file hashing (streaming)
//! - [`reconcile`]: Full-mode scan against the store
//! - [`hash_pass`]: Hash-only mode
//!
//! # Example
//!
//! ```no_run
//! use voltrack::filter::PathFilter;
//! use voltrack::scanner::Walker;
//! use std::path::{Path, PathBuf};
//!
//! let filter = PathFilter::new(vec![PathBuf::from("/volume1")], vec![], vec![]);
//! let walker = Walker::new(Path::new("/volume1"), &filter);
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(entry) => println!("{} {}: {} bytes", entry.kind, entry.path.display(), entry.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

pub mod hash_pass;
pub mod hasher;
pub mod identity;
pub mod reconcile;
pub mod walker;

use std::fs::Metadata;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::store::{truncate_to_micros, EntryKind};

// Re-export main types
pub use hash_pass::{HashPass, HashPassStats};
pub use hasher::{hash_to_hex, Hash, Hasher};
pub use identity::FileIdentity;
pub use reconcile::{ScanMode, ScanSummary, Scanner};
pub use walker::Walker;

/// Lightweight metadata for an entry observed on disk.
///
/// Everything the store needs to reconcile, nothing that requires reading
/// file contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Absolute path
    pub path: PathBuf,
    /// File or directory
    pub kind: EntryKind,
    /// Size in bytes
    pub size: u64,
    /// Last modification time, truncated to microseconds
    pub modified: DateTime<Utc>,
    /// Filesystem identity, if available
    pub identity: Option<FileIdentity>,
}

impl FileEntry {
    /// Create a new FileEntry.
    #[must_use]
    pub fn new(path: PathBuf, kind: EntryKind, size: u64, modified: SystemTime) -> Self {
        Self {
            path,
            kind,
            size,
            modified: truncate_to_micros(DateTime::<Utc>::from(modified)),
            identity: None,
        }
    }

    /// Attach a filesystem identity.
    #[must_use]
    pub fn with_identity(mut self, identity: Option<FileIdentity>) -> Self {
        self.identity = identity;
        self
    }

    /// Build an entry from `symlink_metadata`.
    ///
    /// Returns `None` for symlinks, sockets, fifos and devices: only regular
    /// files and directories are inventoried. Directories report size 0.
    #[must_use]
    pub fn from_metadata(path: PathBuf, metadata: &Metadata) -> Option<Self> {
        let file_type = metadata.file_type();
        let kind = if file_type.is_file() {
            EntryKind::File
        } else if file_type.is_dir() {
            EntryKind::Directory
        } else {
            return None;
        };
        let size = if kind.is_file() { metadata.len() } else { 0 };
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);

        Some(Self::new(path, kind, size, modified).with_identity(FileIdentity::from_metadata(metadata)))
    }

    /// Stat `path` without following symlinks.
    ///
    /// `Ok(None)` means the path no longer exists or is not a regular file
    /// or directory.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] for permission and other I/O failures.
    pub fn stat(path: &Path) -> Result<Option<Self>, ScanError> {
        match std::fs::symlink_metadata(path) {
            Ok(metadata) => Ok(Self::from_metadata(path.to_path_buf(), &metadata)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ScanError::from_io(path, e)),
        }
    }

    /// Whether size or mtime differ from another observation.
    #[must_use]
    pub fn metadata_differs(&self, size: u64, modified: DateTime<Utc>) -> bool {
        self.size != size || self.modified != modified
    }
}

/// Errors that can occur for a single entry during scanning.
///
/// These never abort a run; the entry is logged and skipped.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The specified path was not found.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// The specified path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The path can't be stored as text.
    #[error("Path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    /// Classify an I/O error for `path`.
    #[must_use]
    pub fn from_io(path: &Path, error: std::io::Error) -> Self {
        match error.kind() {
            ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// Hashing stopped because shutdown was requested.
    #[error("Hashing interrupted: {0}")]
    Interrupted(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}
