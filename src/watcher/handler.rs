//! Applying watch events to the store.
//!
//! Every event is re-checked against the filesystem before it is applied,
//! since by the time it is handled the entry may have changed again.
//! Handling is idempotent: replaying an event leaves path, identity, hash,
//! rehash flag and deletion state as they were; at most `last_seen` moves.
//!
//! The handler never reads file contents. Anything that may have changed
//! content is flagged for the hash pass instead.

use std::path::Path;

use chrono::{DateTime, Utc};

use super::events::WatchEvent;
use crate::filter::PathFilter;
use crate::scanner::{FileEntry, Walker};
use crate::store::{EntryKind, FileRecord, InventoryStore, StoreResult};

/// What applying an event did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Nothing to do (entry vanished, outside every volume, unreadable)
    Ignored,
    /// Already recorded as observed; `last_seen` refreshed
    Touched,
    /// New record(s)
    Inserted,
    /// Existing record updated
    Updated,
    /// Records moved to a new path
    Moved(usize),
    /// A deleted record brought back at a new path
    Revived,
    /// Records marked deleted
    Deleted(usize),
}

/// Applies [`WatchEvent`]s to one store connection.
pub struct EventHandler<'a> {
    store: &'a InventoryStore,
    filter: &'a PathFilter,
    move_window: chrono::Duration,
}

impl<'a> EventHandler<'a> {
    /// Create a handler; deleted records stay eligible for move
    /// correlation for `move_window_secs`.
    #[must_use]
    pub fn new(store: &'a InventoryStore, filter: &'a PathFilter, move_window_secs: u64) -> Self {
        Self {
            store,
            filter,
            move_window: chrono::Duration::seconds(
                i64::try_from(move_window_secs)
                    .unwrap_or(i64::MAX)
                    .min(i64::MAX / 1000),
            ),
        }
    }

    /// Apply one event.
    ///
    /// # Errors
    ///
    /// Returns the store error; the caller drops the event.
    pub fn apply(&self, event: &WatchEvent) -> StoreResult<Applied> {
        let now = Utc::now();
        match event {
            WatchEvent::Created(path) | WatchEvent::MovedTo(path) => self.created(path, now),
            WatchEvent::Modified(path) => self.modified(path, now),
            WatchEvent::Removed(path) | WatchEvent::MovedFrom(path) => {
                Ok(Applied::Deleted(self.store.mark_deleted(path)?))
            }
            WatchEvent::Moved { from, to } => self.moved(from, to, now),
            WatchEvent::Overflow => Ok(Applied::Ignored),
        }
    }

    fn observe(&self, path: &Path) -> Option<(&'a Path, FileEntry)> {
        let volume = self.filter.volume_for(path)?;
        match FileEntry::stat(path) {
            Ok(Some(entry)) => Some((volume, entry)),
            Ok(None) => {
                log::trace!("Gone before handling: {}", path.display());
                None
            }
            Err(e) => {
                log::warn!("{e}");
                None
            }
        }
    }

    fn created(&self, path: &Path, now: DateTime<Utc>) -> StoreResult<Applied> {
        let Some((volume, entry)) = self.observe(path) else {
            return Ok(Applied::Ignored);
        };
        let applied = self.record_created(volume, &entry, now)?;
        if entry.kind == EntryKind::Directory {
            self.record_subtree(volume, &entry.path, now)?;
        }
        Ok(applied)
    }

    /// Record the contents of a directory that appeared in one piece
    /// (mkdir -p, moved in from outside, extracted archive).
    fn record_subtree(&self, volume: &Path, dir: &Path, now: DateTime<Utc>) -> StoreResult<()> {
        let mut count = 0usize;
        for result in Walker::new(dir, self.filter).walk() {
            match result {
                Ok(child) => {
                    self.record_created(volume, &child, now)?;
                    count += 1;
                }
                Err(e) => log::debug!("Subtree walk of {}: {}", dir.display(), e),
            }
        }
        if count > 0 {
            log::debug!("Recorded {} entries under {}", count, dir.display());
        }
        Ok(())
    }

    fn record_created(
        &self,
        volume: &Path,
        entry: &FileEntry,
        now: DateTime<Utc>,
    ) -> StoreResult<Applied> {
        if let Some(existing) = self.store.find_by_path(&entry.path)? {
            if is_same_observation(&existing, entry) {
                self.store.touch(&entry.path, now)?;
                return Ok(Applied::Touched);
            }
            self.store.upsert_created(volume, entry, now)?;
            return Ok(Applied::Updated);
        }

        if let Some(source) = self.move_source(entry, now)? {
            if source.deleted {
                log::debug!(
                    "Correlated {} with deleted {}",
                    entry.path.display(),
                    source.path.display()
                );
                self.store.revive(source.id, volume, entry, now)?;
                return Ok(Applied::Revived);
            }
            log::debug!(
                "Correlated {} with vanished {}",
                entry.path.display(),
                source.path.display()
            );
            let moved = self.store.relocate(&source.path, &entry.path, volume, now)?;
            return Ok(Applied::Moved(moved));
        }

        self.store.upsert_created(volume, entry, now)?;
        Ok(Applied::Inserted)
    }

    /// A record this new entry is really a move of, if identity says so.
    ///
    /// Inode numbers are reused, so a match also needs the same kind, the
    /// same size and mtime for files, and either a recent deletion or an
    /// old path that no longer exists.
    fn move_source(&self, entry: &FileEntry, now: DateTime<Utc>) -> StoreResult<Option<FileRecord>> {
        let Some(identity) = entry.identity else {
            return Ok(None);
        };
        let Some(record) = self.store.find_by_identity(identity)? else {
            return Ok(None);
        };

        if record.kind != entry.kind || record.path == entry.path {
            return Ok(None);
        }
        if record.is_file() && entry.metadata_differs(record.size, record.modified) {
            log::trace!(
                "Identity {} reused by {}: metadata differs",
                identity,
                entry.path.display()
            );
            return Ok(None);
        }

        let eligible = if record.deleted {
            record
                .deleted_at
                .is_some_and(|at| now.signed_duration_since(at) <= self.move_window)
        } else {
            std::fs::symlink_metadata(&record.path).is_err()
        };
        Ok(eligible.then_some(record))
    }

    fn modified(&self, path: &Path, now: DateTime<Utc>) -> StoreResult<Applied> {
        let Some((volume, entry)) = self.observe(path) else {
            // A removal event follows
            return Ok(Applied::Ignored);
        };

        match self.store.find_by_path(path)? {
            Some(record) if record.kind == entry.kind => {
                self.store.upsert(volume, &entry, now)?;
                if entry.kind.is_file() {
                    self.store.mark_rehash(path)?;
                }
                Ok(Applied::Updated)
            }
            _ => self.created(path, now),
        }
    }

    fn moved(&self, from: &Path, to: &Path, now: DateTime<Utc>) -> StoreResult<Applied> {
        if self.store.find_by_path(from)?.is_some() {
            let Some(volume) = self.filter.volume_for(to) else {
                return Ok(Applied::Deleted(self.store.mark_deleted(from)?));
            };
            let moved = self.store.relocate(from, to, volume, now)?;
            return Ok(Applied::Moved(moved));
        }

        // Replayed: the record is already at the destination
        if let (Some(record), Some((_, entry))) = (self.store.find_by_path(to)?, self.observe(to)) {
            if is_same_observation(&record, &entry) {
                self.store.touch(to, now)?;
                return Ok(Applied::Touched);
            }
        }

        self.created(to, now)
    }
}

/// The record already describes this entry exactly.
fn is_same_observation(record: &FileRecord, entry: &FileEntry) -> bool {
    let identity_matches = match (record.identity, entry.identity) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    };
    record.kind == entry.kind
        && identity_matches
        && !entry.metadata_differs(record.size, record.modified)
}
