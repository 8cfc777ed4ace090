//! Command-line interface definitions for voltrack.
//!
//! Global options (verbosity, config file, error format) apply to every
//! subcommand. Volume, deny-list and database flags override the
//! configuration layers below them.
//!
//! # Example
//!
//! ```bash
//! # Nightly: walk all volumes, then hash what changed
//! voltrack scan
//!
//! # Hourly: only hash what the watcher flagged
//! voltrack scan --no-find
//!
//! # Keep the store current between scans
//! voltrack -v watch --volume /volume1 --deny '#recycle'
//!
//! # Report
//! voltrack duplicates --min-size 10MB --json
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::ConfigOverrides;

/// Persistent file inventory for storage volumes.
///
/// Records every file and directory under the configured volumes with its
/// size, mtime and content digest, kept current by periodic scans and a
/// filesystem watcher.
#[derive(Debug, Parser)]
#[command(name = "voltrack")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (default: config.toml in the platform config directory)
    #[arg(long, value_name = "PATH", global = true, env = "VOLTRACK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Walk the volumes, record changes and deletions, then hash pending files
    Scan(ScanArgs),
    /// Follow filesystem events until interrupted
    Watch(WatchArgs),
    /// List groups of files with identical content
    Duplicates(DuplicatesArgs),
    /// Permanently remove records deleted long ago
    Purge(PurgeArgs),
    /// Show inventory counts
    Status(StatusArgs),
}

/// Overrides shared by commands that touch the filesystem.
#[derive(Debug, Args, Default)]
pub struct VolumeArgs {
    /// Volume root to inventory (repeatable; replaces configured volumes)
    #[arg(long = "volume", value_name = "PATH")]
    pub volumes: Vec<PathBuf>,

    /// Top-level name prefix to exclude (repeatable; replaces configured list)
    #[arg(long = "deny", value_name = "PREFIX")]
    pub deny: Vec<String>,

    /// Inventory database file
    #[arg(long, value_name = "PATH")]
    pub database: Option<PathBuf>,
}

impl VolumeArgs {
    /// As configuration overrides.
    #[must_use]
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            volumes: self.volumes.clone(),
            deny_list: self.deny.clone(),
            database: self.database.clone(),
        }
    }
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    /// Skip the walk; only hash files flagged as changed
    #[arg(long)]
    pub no_find: bool,

    #[command(flatten)]
    pub volumes: VolumeArgs,
}

/// Arguments for the watch subcommand.
#[derive(Debug, Args)]
pub struct WatchArgs {
    #[command(flatten)]
    pub volumes: VolumeArgs,
}

/// Arguments for the duplicates subcommand.
#[derive(Debug, Args)]
pub struct DuplicatesArgs {
    /// Ignore files smaller than this (e.g., 1KB, 10MB, 1GiB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size, default_value = "1")]
    pub min_size: u64,

    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Inventory database file
    #[arg(long, value_name = "PATH")]
    pub database: Option<PathBuf>,
}

/// Arguments for the purge subcommand.
#[derive(Debug, Args)]
pub struct PurgeArgs {
    /// Remove records deleted more than this many days ago
    #[arg(long, value_name = "DAYS")]
    pub older_than: u32,

    /// Inventory database file
    #[arg(long, value_name = "PATH")]
    pub database: Option<PathBuf>,
}

/// Arguments for the status subcommand.
#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Print JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Inventory database file
    #[arg(long, value_name = "PATH")]
    pub database: Option<PathBuf>,
}

/// Parse a human-readable size string into bytes.
///
/// Supports formats like "1024", "1KB", "1KiB", "1.5MB", "10 GiB".
/// Decimal suffixes (KB, MB, GB, TB) use powers of 1000; binary suffixes
/// (KiB, MiB, GiB, TiB) use powers of 1024.
///
/// # Errors
///
/// Returns a message suitable for clap when the input can't be parsed.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1_099_511_627_776,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}
