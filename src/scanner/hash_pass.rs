//! Hash pass: compute digests for records flagged `rehash_needed`.
//!
//! The watcher and the walk only ever flag records; this pass is the one
//! place content is read. Each record is re-stated first so the digest is
//! computed for what is on disk now, and stored with a compare-and-set so a
//! change that lands while the file is being read keeps the flag set.
//!
//! A record that can't be hashed (unreadable, changed mid-read) is skipped
//! for the rest of the run and stays pending for the next one.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use super::{FileEntry, HashError, Hasher};
use crate::progress::{ProgressCallback, PHASE_HASHING};
use crate::store::{FileRecord, InventoryStore, StoreResult};

/// Counters from one hash pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HashPassStats {
    /// Digests stored
    pub hashed: usize,
    /// Files that couldn't be read
    pub failures: usize,
    /// Records whose file no longer existed; marked deleted
    pub vanished: usize,
    /// Records whose metadata was refreshed before hashing
    pub refreshed: usize,
    /// Digests discarded because the file changed while being read
    pub stale: usize,
    /// Bytes read for stored digests
    pub bytes_hashed: u64,
}

/// One run over the pending-hash queue.
pub struct HashPass<'a> {
    store: &'a InventoryStore,
    batch_size: usize,
    hasher: Hasher,
    shutdown_flag: Option<Arc<AtomicBool>>,
    progress: Option<Arc<dyn ProgressCallback>>,
}

impl<'a> HashPass<'a> {
    /// Create a pass fetching `batch_size` records at a time.
    #[must_use]
    pub fn new(store: &'a InventoryStore, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
            hasher: Hasher::new(),
            shutdown_flag: None,
            progress: None,
        }
    }

    /// Stop between files (and mid-file) when the flag is set.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.hasher = Hasher::new().with_shutdown_flag(Arc::clone(&flag));
        self.shutdown_flag = Some(flag);
        self
    }

    /// Report per-file progress.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(progress);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Drain the queue.
    ///
    /// Returns once nothing is pending except records skipped during this
    /// run, or when shutdown is requested.
    ///
    /// # Errors
    ///
    /// Stops at the first [`StoreError`](crate::store::StoreError). Digests
    /// already stored stay stored.
    pub fn run(&self) -> StoreResult<HashPassStats> {
        let mut stats = HashPassStats::default();
        let mut skipped: HashSet<i64> = HashSet::new();
        let mut processed = 0usize;

        if let Some(progress) = &self.progress {
            let total = self.store.stats()?.pending_hash;
            progress.on_phase_start(PHASE_HASHING, total as usize);
        }

        'batches: loop {
            if self.is_shutdown_requested() {
                break;
            }

            let batch: Vec<FileRecord> = self
                .store
                .list_pending_hash(self.batch_size + skipped.len())?
                .into_iter()
                .filter(|record| !skipped.contains(&record.id))
                .take(self.batch_size)
                .collect();
            if batch.is_empty() {
                break;
            }
            log::debug!("Hash pass: {} records in batch", batch.len());

            for record in batch {
                if self.is_shutdown_requested() {
                    break 'batches;
                }
                processed += 1;
                if let Some(progress) = &self.progress {
                    progress.on_progress(processed, &record.path.to_string_lossy());
                }
                if !self.process(&record, &mut stats)? {
                    skipped.insert(record.id);
                }
            }
        }

        if let Some(progress) = &self.progress {
            progress.on_phase_end(PHASE_HASHING);
        }
        if self.is_shutdown_requested() {
            log::info!("Hash pass interrupted after {} files", stats.hashed);
        }
        Ok(stats)
    }

    /// Handle one record. Returns `false` if it should be skipped for the
    /// rest of the run.
    fn process(&self, record: &FileRecord, stats: &mut HashPassStats) -> StoreResult<bool> {
        let current = match FileEntry::stat(&record.path) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                log::debug!("Vanished before hashing: {}", record.path.display());
                self.store.mark_deleted(&record.path)?;
                stats.vanished += 1;
                return Ok(true);
            }
            Err(e) => {
                log::warn!("Cannot stat {}: {}", record.path.display(), e);
                stats.failures += 1;
                return Ok(false);
            }
        };

        let record = if current.kind != record.kind
            || current.metadata_differs(record.size, record.modified)
        {
            // Refresh first so the digest is stored against current metadata
            self.store.upsert(&record.volume, &current, Utc::now())?;
            stats.refreshed += 1;
            match self.store.find_by_path(&record.path)? {
                Some(fresh) if fresh.is_file() => fresh,
                _ => return Ok(true),
            }
        } else {
            record.clone()
        };

        let digest = match self.hasher.full_hash_hex(&record.path) {
            Ok(digest) => digest,
            Err(HashError::Interrupted(_)) => return Ok(false),
            Err(HashError::NotFound(_)) => {
                self.store.mark_deleted(&record.path)?;
                stats.vanished += 1;
                return Ok(true);
            }
            Err(e) => {
                log::warn!("Cannot hash {}: {}", record.path.display(), e);
                stats.failures += 1;
                return Ok(false);
            }
        };

        // A write during the read leaves a digest of neither version
        let unchanged = matches!(
            FileEntry::stat(&record.path),
            Ok(Some(after)) if !after.metadata_differs(record.size, record.modified)
        );
        if !unchanged || !self.store.record_hash(&record, &digest)? {
            log::debug!("Changed while hashing: {}", record.path.display());
            stats.stale += 1;
            return Ok(false);
        }

        log::trace!("Hashed {} = {}", record.path.display(), digest);
        stats.hashed += 1;
        stats.bytes_hashed += record.size;
        if let Some(progress) = &self.progress {
            progress.on_item_completed(record.size);
        }
        Ok(true)
    }
}
