//! Report output for the `duplicates` and `status` commands.
//!
//! Both reports print as human-readable text by default, or as JSON for
//! scripting.
//!
//! # Duplicates schema
//!
//! ```json
//! {
//!   "duplicates": [
//!     { "hash": "af13...", "size": 1024, "files": ["/volume1/a", "/volume1/b"] }
//!   ],
//!   "summary": { "groups": 1, "duplicate_files": 1, "reclaimable_space": 1024 }
//! }
//! ```

use std::io::Write;

use bytesize::ByteSize;
use serde::Serialize;

use crate::store::{DuplicateGroup, InventoryStats};

/// Errors that can occur while writing a report.
#[derive(thiserror::Error, Debug)]
pub enum ReportError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error writing report: {0}")]
    Io(#[from] std::io::Error),
}

/// A duplicate group as printed.
#[derive(Debug, Clone, Serialize)]
pub struct JsonDuplicateGroup {
    /// Content digest
    pub hash: String,
    /// File size in bytes
    pub size: u64,
    /// Paths of every copy
    pub files: Vec<String>,
}

impl From<&DuplicateGroup> for JsonDuplicateGroup {
    fn from(group: &DuplicateGroup) -> Self {
        Self {
            hash: group.hash.clone(),
            size: group.size,
            files: group
                .paths
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
        }
    }
}

/// Totals over all groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DuplicatesSummary {
    /// Number of groups
    pub groups: usize,
    /// Copies beyond the first in each group
    pub duplicate_files: usize,
    /// Bytes freed by keeping one copy per group
    pub reclaimable_space: u64,
}

/// The `duplicates` report.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicatesReport {
    /// Groups, largest files first
    pub duplicates: Vec<JsonDuplicateGroup>,
    /// Totals
    pub summary: DuplicatesSummary,
}

impl DuplicatesReport {
    /// Build from store groups.
    #[must_use]
    pub fn new(groups: &[DuplicateGroup]) -> Self {
        let summary = DuplicatesSummary {
            groups: groups.len(),
            duplicate_files: groups.iter().map(|g| g.paths.len().saturating_sub(1)).sum(),
            reclaimable_space: groups.iter().map(DuplicateGroup::wasted_bytes).sum(),
        };
        Self {
            duplicates: groups.iter().map(JsonDuplicateGroup::from).collect(),
            summary,
        }
    }

    /// Write pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_json<W: Write>(&self, writer: &mut W) -> Result<(), ReportError> {
        serde_json::to_writer_pretty(&mut *writer, self)?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    /// Write one block per group followed by a summary line.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_text<W: Write>(&self, writer: &mut W) -> Result<(), ReportError> {
        for group in &self.duplicates {
            let short = group.hash.get(..16).unwrap_or(&group.hash);
            writeln!(
                writer,
                "{} ({} x {})",
                short,
                group.files.len(),
                ByteSize(group.size)
            )?;
            for file in &group.files {
                writeln!(writer, "  {file}")?;
            }
        }
        if self.duplicates.is_empty() {
            writeln!(writer, "No duplicates found")?;
        } else {
            writeln!(
                writer,
                "{} groups, {} duplicate files, {} reclaimable",
                self.summary.groups,
                self.summary.duplicate_files,
                ByteSize(self.summary.reclaimable_space)
            )?;
        }
        Ok(())
    }
}

/// The `status` report.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Database file
    pub database: String,
    /// Counts
    #[serde(flatten)]
    pub stats: InventoryStats,
}

impl StatusReport {
    /// Build from store counts.
    #[must_use]
    pub fn new(database: &std::path::Path, stats: InventoryStats) -> Self {
        Self {
            database: database.to_string_lossy().into_owned(),
            stats,
        }
    }

    /// Write pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_json<W: Write>(&self, writer: &mut W) -> Result<(), ReportError> {
        serde_json::to_writer_pretty(&mut *writer, self)?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    /// Write aligned `label: value` lines.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_text<W: Write>(&self, writer: &mut W) -> Result<(), ReportError> {
        let s = &self.stats;
        writeln!(writer, "Database:      {}", self.database)?;
        writeln!(writer, "Files:         {}", s.files)?;
        writeln!(writer, "Directories:   {}", s.directories)?;
        writeln!(writer, "Total size:    {}", ByteSize(s.total_bytes))?;
        writeln!(writer, "Pending hash:  {}", s.pending_hash)?;
        writeln!(writer, "Deleted:       {}", s.deleted)?;
        Ok(())
    }
}
