//! voltrack - Persistent file inventory for storage volumes
//!
//! Records every file and directory under a set of volume roots in a SQLite
//! store: path, size, mtime, filesystem identity and a BLAKE3 content digest.
//! Periodic scans walk the volumes and detect deletions, a filesystem
//! watcher keeps the store current in between, and a hash pass computes
//! digests for whatever either of them flagged as changed.

pub mod cli;
pub mod config;
pub mod error;
pub mod filter;
pub mod lock;
pub mod logging;
pub mod progress;
pub mod report;
pub mod scanner;
pub mod signal;
pub mod store;
pub mod watcher;

use std::io::{self, IsTerminal};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;

use cli::{Cli, Commands, DuplicatesArgs, PurgeArgs, ScanArgs, StatusArgs, VolumeArgs, WatchArgs};
use config::{Config, ConfigOverrides};
use error::{ExitCode, InventoryError};
use progress::Progress;
use report::{DuplicatesReport, StatusReport};
use scanner::{ScanMode, Scanner};
use signal::ShutdownHandler;
use store::InventoryStore;
use watcher::Watcher;

/// Run one command.
///
/// Returns the exit code for a completed command; anything that ends the
/// command early is returned as an error carrying an [`InventoryError`].
///
/// # Errors
///
/// Configuration, store, lock, subscription and interruption errors.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    let shutdown = signal::install_handler().context("Failed to install signal handler")?;
    let config_file = cli.config.as_deref();

    match cli.command {
        Commands::Scan(args) => run_scan(config_file, &args, &shutdown, cli.quiet),
        Commands::Watch(args) => run_watch(config_file, &args, &shutdown),
        Commands::Duplicates(args) => run_duplicates(config_file, &args),
        Commands::Purge(args) => run_purge(config_file, &args),
        Commands::Status(args) => run_status(config_file, &args),
    }
}

fn load_config(
    config_file: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<Config, InventoryError> {
    let mut config = Config::load(config_file)?;
    config.apply_overrides(overrides);
    Ok(config)
}

/// Configuration for commands that walk or watch volumes.
fn load_volume_config(config_file: Option<&Path>, args: &VolumeArgs) -> anyhow::Result<Config> {
    let config = load_config(config_file, &args.overrides()).context("Loading configuration")?;
    config.validate().context("Loading configuration")?;
    Ok(config)
}

/// Configuration for commands that only read the store.
fn load_store_config(
    config_file: Option<&Path>,
    database: Option<&Path>,
) -> anyhow::Result<Config> {
    let overrides = ConfigOverrides {
        database: database.map(Path::to_path_buf),
        ..ConfigOverrides::default()
    };
    load_config(config_file, &overrides).context("Loading configuration")
}

fn open_store(config: &Config) -> anyhow::Result<InventoryStore> {
    InventoryStore::from_config(&config.database)
        .map_err(InventoryError::from)
        .with_context(|| format!("Opening {}", config.database.path.display()))
}

fn run_scan(
    config_file: Option<&Path>,
    args: &ScanArgs,
    shutdown: &ShutdownHandler,
    quiet: bool,
) -> anyhow::Result<ExitCode> {
    let config = load_volume_config(config_file, &args.volumes)?;
    let store = open_store(&config)?;

    let mode = if args.no_find {
        ScanMode::HashOnly
    } else {
        ScanMode::Full
    };
    let mut scanner = Scanner::new(&config, &store).with_shutdown_flag(shutdown.get_flag());
    if !quiet && io::stderr().is_terminal() {
        scanner = scanner.with_progress(Arc::new(Progress::new()));
    }

    let summary = scanner.scan(mode)?;
    if summary.interrupted {
        return Err(InventoryError::Interrupted.into());
    }
    Ok(ExitCode::Success)
}

fn run_watch(
    config_file: Option<&Path>,
    args: &WatchArgs,
    shutdown: &ShutdownHandler,
) -> anyhow::Result<ExitCode> {
    let config = load_volume_config(config_file, &args.volumes)?;
    Watcher::new(&config, shutdown.get_flag())
        .run()
        .map_err(InventoryError::from)?;
    Ok(ExitCode::Success)
}

fn run_duplicates(config_file: Option<&Path>, args: &DuplicatesArgs) -> anyhow::Result<ExitCode> {
    let config = load_store_config(config_file, args.database.as_deref())?;
    let store = open_store(&config)?;
    let groups = store
        .duplicate_groups(args.min_size)
        .map_err(InventoryError::from)?;

    let report = DuplicatesReport::new(&groups);
    let mut out = io::stdout().lock();
    if args.json {
        report.write_json(&mut out)?;
    } else {
        report.write_text(&mut out)?;
    }
    Ok(ExitCode::Success)
}

fn run_purge(config_file: Option<&Path>, args: &PurgeArgs) -> anyhow::Result<ExitCode> {
    let config = load_store_config(config_file, args.database.as_deref())?;
    let store = open_store(&config)?;
    let cutoff = Utc::now() - chrono::Duration::days(i64::from(args.older_than));
    let purged = store.purge_deleted(cutoff).map_err(InventoryError::from)?;
    log::info!(
        "Purged {} record(s) deleted before {}",
        purged,
        cutoff.format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(ExitCode::Success)
}

fn run_status(config_file: Option<&Path>, args: &StatusArgs) -> anyhow::Result<ExitCode> {
    let config = load_store_config(config_file, args.database.as_deref())?;
    let store = open_store(&config)?;
    let stats = store.stats().map_err(InventoryError::from)?;

    let report = StatusReport::new(&config.database.path, stats);
    let mut out = io::stdout().lock();
    if args.json {
        report.write_json(&mut out)?;
    } else {
        report.write_text(&mut out)?;
    }
    Ok(ExitCode::Success)
}
