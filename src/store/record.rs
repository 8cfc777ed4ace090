//! Inventory record definitions.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::scanner::FileIdentity;

/// Kind of filesystem entry a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Directory,
}

impl EntryKind {
    /// Column representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
        }
    }

    /// Whether this is a regular file.
    #[must_use]
    pub fn is_file(self) -> bool {
        self == Self::File
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for EntryKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for EntryKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "file" => Ok(Self::File),
            "directory" => Ok(Self::Directory),
            other => Err(FromSqlError::Other(
                format!("unknown entry kind '{other}'").into(),
            )),
        }
    }
}

/// One inventory row: a file or directory as last observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// Surrogate row id; a path can own several historical (deleted) rows
    pub id: i64,
    /// Volume root the entry lives under
    pub volume: PathBuf,
    /// Absolute path
    pub path: PathBuf,
    /// Parent directory
    pub parent: Option<PathBuf>,
    /// Filesystem identity, when the platform provides one
    pub identity: Option<FileIdentity>,
    /// File or directory
    pub kind: EntryKind,
    /// Size in bytes at last observation
    pub size: u64,
    /// Modification time at last observation
    pub modified: DateTime<Utc>,
    /// Hex content digest; `None` until computed. Stale while `rehash_needed`.
    pub hash: Option<String>,
    /// Content changed since `hash` was computed
    pub rehash_needed: bool,
    /// Backing entry no longer exists on disk
    pub deleted: bool,
    /// When the record was marked deleted
    pub deleted_at: Option<DateTime<Utc>>,
    /// Last scan or event that confirmed the entry exists
    pub last_seen: DateTime<Utc>,
}

impl FileRecord {
    /// The hash, if it describes the current content.
    ///
    /// A record flagged for rehash keeps its old digest for diagnostics, but
    /// that digest must not be trusted.
    #[must_use]
    pub fn authoritative_hash(&self) -> Option<&str> {
        if self.rehash_needed {
            None
        } else {
            self.hash.as_deref()
        }
    }

    /// Whether this record describes a regular file.
    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind.is_file()
    }
}

/// Result of reconciling an observed entry with the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No active record existed; one was created
    Inserted,
    /// Size, mtime or identity differed; metadata updated
    Changed,
    /// Metadata matched; only `last_seen` moved
    Unchanged,
}

/// Files sharing an authoritative digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateGroup {
    /// Shared digest
    pub hash: String,
    /// Size of each file
    pub size: u64,
    /// Paths of the duplicates
    pub paths: Vec<PathBuf>,
}

impl DuplicateGroup {
    /// Bytes that could be reclaimed by keeping one copy.
    #[must_use]
    pub fn wasted_bytes(&self) -> u64 {
        self.size
            .saturating_mul(self.paths.len().saturating_sub(1) as u64)
    }
}

/// Inventory-wide counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InventoryStats {
    /// Active file records
    pub files: u64,
    /// Active directory records
    pub directories: u64,
    /// Active files waiting for a digest
    pub pending_hash: u64,
    /// Soft-deleted records retained for history
    pub deleted: u64,
    /// Total bytes of active files
    pub total_bytes: u64,
}

/// Convert a timestamp to the microsecond integer stored in the database.
#[must_use]
pub fn to_micros(time: DateTime<Utc>) -> i64 {
    time.timestamp_micros()
}

/// Convert a stored microsecond integer back to a timestamp.
#[must_use]
pub fn from_micros(micros: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_micros(micros).unwrap_or(DateTime::UNIX_EPOCH)
}

/// Drop sub-microsecond precision so values survive a store round trip.
#[must_use]
pub fn truncate_to_micros(time: DateTime<Utc>) -> DateTime<Utc> {
    from_micros(to_micros(time))
}
