//! Path-independent file identity used to correlate moves and renames.
//!
//! # Platform Support
//!
//! - **Unix**: `(device_id, inode)` from file metadata
//! - **Other**: no identity; move detection degrades to delete + create
//!
//! Identity is only as stable as the filesystem makes it. Some network
//! mounts synthesize inode numbers per session, in which case two events
//! for the same file may carry different identities.

use std::fmt;
use std::fs::Metadata;

use serde::{Deserialize, Serialize};

/// `(device, inode)` pair identifying a file independent of its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileIdentity {
    /// Device the entry lives on
    pub device: u64,
    /// Inode number within that device
    pub inode: u64,
}

impl FileIdentity {
    /// Create an identity from raw parts.
    #[must_use]
    pub const fn new(device: u64, inode: u64) -> Self {
        Self { device, inode }
    }

    /// Read the identity from file metadata.
    ///
    /// Returns `None` on platforms without inode numbers.
    #[cfg(unix)]
    #[must_use]
    pub fn from_metadata(metadata: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;
        Some(Self {
            device: metadata.dev(),
            inode: metadata.ino(),
        })
    }

    #[cfg(not(unix))]
    #[must_use]
    pub fn from_metadata(_metadata: &Metadata) -> Option<Self> {
        None
    }

    /// Check if identity tracking is supported on this platform.
    #[must_use]
    pub const fn is_supported() -> bool {
        cfg!(unix)
    }
}

impl fmt::Display for FileIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device, self.inode)
    }
}
