//! Full-mode scan: walk each volume and reconcile it with the store.
//!
//! Per volume the scanner takes the run lock, walks the tree, upserts every
//! observed entry with `last_seen = scan_start` and finally soft-deletes the
//! records the walk did not confirm. Deletion detection only runs after a
//! complete walk of a present volume root; subtrees that could not be read
//! are excluded from it.
//!
//! The hash pass follows unless the scan runs in [`ScanMode::HashOnly`],
//! which skips the walk entirely.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytesize::ByteSize;
use chrono::Utc;
use serde::Serialize;

use super::{HashPass, HashPassStats, ScanError, Walker};
use crate::config::Config;
use crate::error::InventoryError;
use crate::filter::PathFilter;
use crate::lock::RunLock;
use crate::progress::{ProgressCallback, PHASE_WALKING};
use crate::store::{InventoryStore, UpsertOutcome};

/// What a scanner run does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Walk every volume, detect deletions, then run the hash pass
    Full,
    /// Run only the hash pass (`--no-find`)
    HashOnly,
}

/// Counters from one scanner run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    /// Volumes walked to completion
    pub volumes_scanned: usize,
    /// Volumes skipped because the root was missing or unreadable
    pub volumes_skipped: usize,
    /// Entries observed by the walk
    pub entries_seen: usize,
    /// New records
    pub inserted: usize,
    /// Records whose metadata changed
    pub changed: usize,
    /// Records confirmed unchanged
    pub unchanged: usize,
    /// Records soft-deleted because the walk no longer found them
    pub marked_deleted: usize,
    /// Entries that could not be read
    pub entry_errors: usize,
    /// Hash pass counters
    pub hash: HashPassStats,
    /// Shutdown was requested before the run finished
    pub interrupted: bool,
    /// Wall time
    pub duration: Duration,
}

impl ScanSummary {
    fn log(&self) {
        log::info!(
            "Scan finished in {:.1?}: {} volumes, {} entries ({} new, {} changed, {} unchanged), \
             {} deleted, {} errors",
            self.duration,
            self.volumes_scanned,
            self.entries_seen,
            self.inserted,
            self.changed,
            self.unchanged,
            self.marked_deleted,
            self.entry_errors,
        );
        log::info!(
            "Hash pass: {} hashed ({}), {} failed, {} vanished, {} changed while reading",
            self.hash.hashed,
            ByteSize(self.hash.bytes_hashed),
            self.hash.failures,
            self.hash.vanished,
            self.hash.stale,
        );
        if self.volumes_skipped > 0 {
            log::warn!("{} volume(s) skipped", self.volumes_skipped);
        }
        if self.interrupted {
            log::warn!("Scan interrupted; deletion detection skipped where incomplete");
        }
    }
}

/// Scanner over the configured volumes.
pub struct Scanner<'a> {
    config: &'a Config,
    store: &'a InventoryStore,
    filter: PathFilter,
    shutdown_flag: Arc<AtomicBool>,
    progress: Option<Arc<dyn ProgressCallback>>,
}

impl<'a> Scanner<'a> {
    /// Create a scanner; volumes and deny list come from `config`.
    #[must_use]
    pub fn new(config: &'a Config, store: &'a InventoryStore) -> Self {
        Self {
            config,
            store,
            filter: config.path_filter(),
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            progress: None,
        }
    }

    /// Share the process shutdown flag.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = flag;
        self
    }

    /// Report walk and hash progress.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(progress);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag.load(Ordering::SeqCst)
    }

    /// Run the scanner.
    ///
    /// # Errors
    ///
    /// [`InventoryError::RunInProgress`] if another run holds a lock this
    /// one needs, [`InventoryError::Storage`] if the store fails. Entry
    /// errors are counted, not returned.
    pub fn scan(&self, mode: ScanMode) -> Result<ScanSummary, InventoryError> {
        let started = Instant::now();
        let mut summary = ScanSummary::default();

        if mode == ScanMode::Full {
            for volume in &self.config.volumes {
                if self.is_shutdown_requested() {
                    break;
                }
                self.scan_volume(volume, &mut summary)?;
            }
        }

        if !self.is_shutdown_requested() {
            let _lock = RunLock::for_hash_pass(&self.config.scan.lock_dir)?;
            let mut pass = HashPass::new(self.store, self.config.scan.hash_batch_size)
                .with_shutdown_flag(Arc::clone(&self.shutdown_flag));
            if let Some(progress) = &self.progress {
                pass = pass.with_progress(Arc::clone(progress));
            }
            summary.hash = pass.run()?;
        }

        summary.interrupted = self.is_shutdown_requested();
        summary.duration = started.elapsed();
        summary.log();
        Ok(summary)
    }

    fn scan_volume(&self, volume: &Path, summary: &mut ScanSummary) -> Result<(), InventoryError> {
        let _lock = RunLock::for_volume(&self.config.scan.lock_dir, volume)?;

        let walker =
            Walker::new(volume, &self.filter).with_shutdown_flag(Arc::clone(&self.shutdown_flag));
        if let Err(e) = walker.check_root() {
            log::error!("Skipping volume {}: {}", volume.display(), e);
            summary.volumes_skipped += 1;
            return Ok(());
        }

        log::info!("Scanning {}", volume.display());
        let scan_start = Utc::now();
        let mut unreadable: Vec<PathBuf> = Vec::new();
        let mut seen = 0usize;

        if let Some(progress) = &self.progress {
            progress.on_phase_start(PHASE_WALKING, 0);
        }

        for result in walker.walk() {
            match result {
                Ok(entry) => {
                    seen += 1;
                    match self.store.upsert(volume, &entry, scan_start)? {
                        UpsertOutcome::Inserted => summary.inserted += 1,
                        UpsertOutcome::Changed => summary.changed += 1,
                        UpsertOutcome::Unchanged => summary.unchanged += 1,
                    }
                    if let Some(progress) = &self.progress {
                        progress.on_progress(seen, &entry.path.to_string_lossy());
                    }
                }
                Err(e) => {
                    summary.entry_errors += 1;
                    if let Some(path) = unconfirmed_subtree(&e) {
                        unreadable.push(path);
                    }
                }
            }
        }
        summary.entries_seen += seen;

        if let Some(progress) = &self.progress {
            progress.on_phase_end(PHASE_WALKING);
        }

        if self.is_shutdown_requested() {
            log::warn!(
                "Walk of {} interrupted; skipping deletion detection",
                volume.display()
            );
            return Ok(());
        }

        let mut deleted = 0;
        for record in self.store.list_not_seen_since(volume, scan_start)? {
            if unreadable.iter().any(|p| record.path.starts_with(p)) {
                log::debug!("Not confirming deletion under unreadable {}", record.path.display());
                continue;
            }
            deleted += self.store.mark_deleted(&record.path)?;
        }
        if deleted > 0 {
            log::info!("{} records under {} marked deleted", deleted, volume.display());
        }
        summary.marked_deleted += deleted;
        summary.volumes_scanned += 1;
        Ok(())
    }
}

/// The subtree an error left unconfirmed, if its records must be kept.
///
/// A vanished entry really is gone and a non-UTF-8 path was never stored,
/// so only permission and I/O failures protect their subtree.
fn unconfirmed_subtree(error: &ScanError) -> Option<PathBuf> {
    match error {
        ScanError::PermissionDenied(path) | ScanError::Io { path, .. } => Some(path.clone()),
        ScanError::NotFound(_) | ScanError::NotADirectory(_) | ScanError::NonUtf8Path(_) => None,
    }
}
