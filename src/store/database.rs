//! SQLite-backed inventory store.
//!
//! One table, `entries`, holds every file and directory record. A partial
//! unique index keeps `path` unique among non-deleted rows while letting
//! soft-deleted history accumulate.
//!
//! Every public operation runs in its own immediate transaction and is
//! retried on `SQLITE_BUSY`/`SQLITE_LOCKED`, so a single call has
//! at-least-once semantics. Operations are written to be idempotent, which
//! makes the retry safe.

use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{
    params, Connection, ErrorCode, OptionalExtension, Row, Transaction, TransactionBehavior,
};

use super::record::{
    from_micros, to_micros, DuplicateGroup, EntryKind, FileRecord, InventoryStats, UpsertOutcome,
};
use crate::config::DatabaseConfig;
use crate::scanner::{FileEntry, FileIdentity};

/// Current schema version, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS entries (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    volume        TEXT    NOT NULL,
    path          TEXT    NOT NULL,
    parent        TEXT,
    device        INTEGER,
    inode         INTEGER,
    kind          TEXT    NOT NULL CHECK (kind IN ('file', 'directory')),
    size          INTEGER NOT NULL,
    modified      INTEGER NOT NULL,
    hash          TEXT,
    rehash_needed INTEGER NOT NULL DEFAULT 0,
    deleted       INTEGER NOT NULL DEFAULT 0,
    deleted_at    INTEGER,
    last_seen     INTEGER NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS entries_active_path ON entries (path) WHERE deleted = 0;
CREATE INDEX IF NOT EXISTS entries_identity ON entries (device, inode);
CREATE INDEX IF NOT EXISTS entries_pending ON entries (last_seen) WHERE rehash_needed = 1 AND deleted = 0;
CREATE INDEX IF NOT EXISTS entries_volume_seen ON entries (volume, last_seen) WHERE deleted = 0;
CREATE INDEX IF NOT EXISTS entries_hash ON entries (hash) WHERE hash IS NOT NULL;
CREATE INDEX IF NOT EXISTS entries_parent ON entries (parent);
";

const COLUMNS: &str = "id, volume, path, parent, device, inode, kind, size, modified, hash, \
                       rehash_needed, deleted, deleted_at, last_seen";

/// Errors from the inventory store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The database stayed busy or locked through every retry.
    #[error("Database temporarily unavailable: {0}")]
    Transient(#[source] rusqlite::Error),

    /// Any other SQLite failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The database directory could not be created.
    #[error("Failed to create database directory {path}: {source}")]
    Io {
        /// Directory that could not be created
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Paths are stored as text; this one isn't valid UTF-8.
    #[error("Path is not valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),

    /// The database was written by a newer version.
    #[error("Unsupported schema version {found} (expected {expected})")]
    SchemaVersion {
        /// Version found in the database
        found: i64,
        /// Version this build understands
        expected: i64,
    },
}

impl StoreError {
    /// Whether the next scheduled run can be expected to succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// How often a single store call is retried on busy/locked errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Delay before the second attempt; grows linearly
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(200),
        }
    }
}

/// Persistent inventory of file and directory records.
///
/// Not `Sync`: each thread (watcher worker, scanner) opens its own store on
/// the same database file.
pub struct InventoryStore {
    conn: Connection,
    retry: RetryPolicy,
}

impl std::fmt::Debug for InventoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InventoryStore")
            .field("path", &self.conn.path())
            .field("retry", &self.retry)
            .finish()
    }
}

impl InventoryStore {
    /// Opens or creates the inventory at `path` with default settings.
    ///
    /// # Errors
    ///
    /// Fails if the file can't be opened or the schema can't be created.
    pub fn open(path: &Path) -> StoreResult<Self> {
        Self::open_with(path, Duration::from_secs(5), RetryPolicy::default())
    }

    /// Opens the inventory described by the database configuration.
    ///
    /// # Errors
    ///
    /// Fails if the file can't be opened or the schema can't be created.
    pub fn from_config(config: &DatabaseConfig) -> StoreResult<Self> {
        Self::open_with(
            &config.path,
            Duration::from_millis(config.busy_timeout_ms),
            RetryPolicy {
                attempts: config.retry_attempts.max(1),
                delay: Duration::from_millis(config.retry_delay_ms),
            },
        )
    }

    /// Opens or creates the inventory with explicit timeouts.
    ///
    /// # Errors
    ///
    /// Fails if the file can't be opened or the schema can't be created.
    pub fn open_with(path: &Path, busy_timeout: Duration, retry: RetryPolicy) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        // journal_mode returns the resulting mode as a row
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;

        let store = Self { conn, retry };
        store.init_schema()?;
        log::debug!("Opened inventory store at {}", path.display());
        Ok(store)
    }

    /// Opens a private in-memory inventory (tests, dry runs).
    ///
    /// # Errors
    ///
    /// Fails if the schema can't be created.
    pub fn open_in_memory() -> StoreResult<Self> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            retry: RetryPolicy::default(),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version > SCHEMA_VERSION {
            return Err(StoreError::SchemaVersion {
                found: version,
                expected: SCHEMA_VERSION,
            });
        }
        self.conn.execute_batch(SCHEMA)?;
        if version < SCHEMA_VERSION {
            self.conn
                .execute_batch(&format!("PRAGMA user_version = {SCHEMA_VERSION};"))?;
        }
        Ok(())
    }

    /// Run `op`, retrying while SQLite reports busy or locked.
    fn with_retry<T>(
        &self,
        op_name: &str,
        mut op: impl FnMut(&Connection) -> rusqlite::Result<T>,
    ) -> StoreResult<T> {
        let mut attempt = 1;
        loop {
            match op(&self.conn) {
                Ok(value) => return Ok(value),
                Err(e) if is_busy(&e) => {
                    if attempt >= self.retry.attempts {
                        log::error!("{op_name}: database still busy after {attempt} attempts");
                        return Err(StoreError::Transient(e));
                    }
                    log::warn!(
                        "{op_name}: database busy, retrying ({}/{})",
                        attempt,
                        self.retry.attempts
                    );
                    std::thread::sleep(self.retry.delay * attempt);
                    attempt += 1;
                }
                Err(e) => return Err(StoreError::Database(e)),
            }
        }
    }

    /// The non-deleted record at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn find_by_path(&self, path: &Path) -> StoreResult<Option<FileRecord>> {
        let path = path_str(path)?;
        self.with_retry("find_by_path", |conn| query_active(conn, path))
    }

    /// The record carrying `identity`.
    ///
    /// Prefers the non-deleted record; otherwise the most recently deleted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn find_by_identity(&self, identity: FileIdentity) -> StoreResult<Option<FileRecord>> {
        let (device, inode) = identity_columns(Some(identity));
        self.with_retry("find_by_identity", |conn| {
            conn.query_row(
                &format!(
                    "SELECT {COLUMNS} FROM entries WHERE device = ?1 AND inode = ?2 \
                     ORDER BY deleted ASC, COALESCE(deleted_at, 0) DESC, id DESC LIMIT 1"
                ),
                params![device, inode],
                row_to_record,
            )
            .optional()
        })
    }

    /// Reconcile an observed entry: insert if absent, else refresh metadata.
    ///
    /// A changed file (size, mtime or identity) gets `rehash_needed = true`
    /// and keeps its old digest as a stale value. An unchanged entry only has
    /// `last_seen` updated.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure or a non-UTF-8 path.
    pub fn upsert(
        &self,
        volume: &Path,
        entry: &FileEntry,
        seen_at: DateTime<Utc>,
    ) -> StoreResult<UpsertOutcome> {
        self.upsert_entry("upsert", volume, entry, seen_at, false)
    }

    /// Like [`upsert`](Self::upsert), for an entry reported as newly created.
    ///
    /// A changed file additionally has its stale digest cleared, since the
    /// content at this path is a different file now.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure or a non-UTF-8 path.
    pub fn upsert_created(
        &self,
        volume: &Path,
        entry: &FileEntry,
        seen_at: DateTime<Utc>,
    ) -> StoreResult<UpsertOutcome> {
        self.upsert_entry("upsert_created", volume, entry, seen_at, true)
    }

    fn upsert_entry(
        &self,
        op_name: &str,
        volume: &Path,
        entry: &FileEntry,
        seen_at: DateTime<Utc>,
        clear_stale_hash: bool,
    ) -> StoreResult<UpsertOutcome> {
        let volume = path_str(volume)?;
        let path = path_str(&entry.path)?;
        let parent = parent_str(&entry.path);
        let (device, inode) = identity_columns(entry.identity);
        let size = entry.size as i64;
        let modified = to_micros(entry.modified);
        let seen = to_micros(seen_at);
        let is_file = entry.kind.is_file();

        self.with_retry(op_name, |conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

            let existing = query_active(&tx, path)?;
            let outcome = match existing {
                Some(record) if record.kind == entry.kind => {
                    let identity_changed = matches!(
                        (record.identity, entry.identity),
                        (Some(old), Some(new)) if old != new
                    );
                    if !entry.metadata_differs(record.size, record.modified) && !identity_changed {
                        tx.execute(
                            "UPDATE entries SET last_seen = ?1, volume = ?2 WHERE id = ?3",
                            params![seen, volume, record.id],
                        )?;
                        UpsertOutcome::Unchanged
                    } else {
                        tx.execute(
                            "UPDATE entries SET size = ?1, modified = ?2, device = ?3, inode = ?4, \
                             parent = ?5, volume = ?6, last_seen = ?7, \
                             rehash_needed = ?8, \
                             hash = CASE WHEN ?9 THEN NULL ELSE hash END \
                             WHERE id = ?10",
                            params![
                                size,
                                modified,
                                device,
                                inode,
                                parent,
                                volume,
                                seen,
                                is_file,
                                clear_stale_hash || !is_file,
                                record.id
                            ],
                        )?;
                        UpsertOutcome::Changed
                    }
                }
                existing => {
                    if let Some(replaced) = existing {
                        // A file became a directory (or vice versa): retire the old row.
                        tx.execute(
                            "UPDATE entries SET deleted = 1, deleted_at = ?1 WHERE id = ?2",
                            params![seen, replaced.id],
                        )?;
                    }
                    tx.execute(
                        "INSERT INTO entries (volume, path, parent, device, inode, kind, size, \
                         modified, hash, rehash_needed, deleted, last_seen) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9, 0, ?10)",
                        params![
                            volume, path, parent, device, inode, entry.kind, size, modified,
                            is_file, seen
                        ],
                    )?;
                    UpsertOutcome::Inserted
                }
            };

            tx.commit()?;
            Ok(outcome)
        })
    }

    /// Update `last_seen` of the record at `path`.
    ///
    /// Returns whether a record was found.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn touch(&self, path: &Path, seen_at: DateTime<Utc>) -> StoreResult<bool> {
        let path = path_str(path)?;
        let seen = to_micros(seen_at);
        self.with_retry("touch", |conn| {
            conn.execute(
                "UPDATE entries SET last_seen = ?1 WHERE deleted = 0 AND path = ?2",
                params![seen, path],
            )
            .map(|n| n > 0)
        })
    }

    /// Flag the file at `path` for rehash. The stored digest is kept.
    ///
    /// Returns whether a file record was flagged.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn mark_rehash(&self, path: &Path) -> StoreResult<bool> {
        let path = path_str(path)?;
        self.with_retry("mark_rehash", |conn| {
            conn.execute(
                "UPDATE entries SET rehash_needed = 1 \
                 WHERE deleted = 0 AND kind = 'file' AND path = ?1",
                params![path],
            )
            .map(|n| n > 0)
        })
    }

    /// Soft-delete the record at `path` and everything beneath it.
    ///
    /// `last_seen` is left untouched. Returns the number of records marked.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn mark_deleted(&self, path: &Path) -> StoreResult<usize> {
        let path = path_str(path)?;
        let prefix = descendant_prefix(path);
        let now = to_micros(Utc::now());
        self.with_retry("mark_deleted", |conn| {
            conn.execute(
                "UPDATE entries SET deleted = 1, deleted_at = ?3 \
                 WHERE deleted = 0 AND (path = ?1 OR substr(path, 1, length(?2)) = ?2)",
                params![path, prefix, now],
            )
        })
    }

    /// Move the record at `from` (and, for a directory, its descendants) to `to`.
    ///
    /// `hash` and `rehash_needed` are preserved; a move is not a content
    /// change. Any active record already at `to` is soft-deleted first
    /// (the rename overwrote it). Returns the number of records moved; 0
    /// when nothing is recorded at `from`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure or a non-UTF-8 path.
    pub fn relocate(
        &self,
        from: &Path,
        to: &Path,
        volume: &Path,
        seen_at: DateTime<Utc>,
    ) -> StoreResult<usize> {
        let from = path_str(from)?;
        let to_path = to;
        let to = path_str(to)?;
        let volume = path_str(volume)?;
        let parent = parent_str(to_path);
        let from_prefix = descendant_prefix(from);
        let to_prefix = descendant_prefix(to);
        let seen = to_micros(seen_at);

        self.with_retry("relocate", |conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
            let Some(record) = query_active(&tx, from)? else {
                return Ok(0);
            };

            if from == to {
                tx.execute(
                    "UPDATE entries SET last_seen = ?1 WHERE id = ?2",
                    params![seen, record.id],
                )?;
                tx.commit()?;
                return Ok(1);
            }

            tx.execute(
                "UPDATE entries SET deleted = 1, deleted_at = ?3 \
                 WHERE deleted = 0 AND (path = ?1 OR substr(path, 1, length(?2)) = ?2)",
                params![to, to_prefix, seen],
            )?;
            tx.execute(
                "UPDATE entries SET path = ?1, parent = ?2, volume = ?3, last_seen = ?4 WHERE id = ?5",
                params![to, parent, volume, seen, record.id],
            )?;

            let mut moved = 1;
            if record.kind == EntryKind::Directory {
                moved += tx.execute(
                    "UPDATE entries SET \
                     path = ?1 || substr(path, length(?2) + 1), \
                     parent = ?3 || substr(parent, length(?4) + 1), \
                     volume = ?5, last_seen = ?6 \
                     WHERE deleted = 0 AND substr(path, 1, length(?2)) = ?2",
                    params![to_prefix, from_prefix, to, from, volume, seen],
                )?;
            }

            tx.commit()?;
            Ok(moved)
        })
    }

    /// Bring record `id` back at the entry's path: a move whose two halves
    /// arrived as separate delete and create events.
    ///
    /// Metadata is refreshed; `hash` and `rehash_needed` are preserved.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure or a non-UTF-8 path.
    pub fn revive(
        &self,
        id: i64,
        volume: &Path,
        entry: &FileEntry,
        seen_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let volume = path_str(volume)?;
        let path = path_str(&entry.path)?;
        let parent = parent_str(&entry.path);
        let (device, inode) = identity_columns(entry.identity);
        let size = entry.size as i64;
        let modified = to_micros(entry.modified);
        let seen = to_micros(seen_at);

        self.with_retry("revive", |conn| {
            let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
            tx.execute(
                "UPDATE entries SET deleted = 1, deleted_at = ?3 \
                 WHERE deleted = 0 AND path = ?1 AND id != ?2",
                params![path, id, seen],
            )?;
            tx.execute(
                "UPDATE entries SET path = ?1, parent = ?2, volume = ?3, device = ?4, inode = ?5, \
                 size = ?6, modified = ?7, last_seen = ?8, deleted = 0, deleted_at = NULL \
                 WHERE id = ?9",
                params![path, parent, volume, device, inode, size, modified, seen, id],
            )?;
            tx.commit()
        })
    }

    /// Files waiting for a digest, oldest `last_seen` first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn list_pending_hash(&self, limit: usize) -> StoreResult<Vec<FileRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_retry("list_pending_hash", |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {COLUMNS} FROM entries \
                 WHERE rehash_needed = 1 AND deleted = 0 AND kind = 'file' \
                 ORDER BY last_seen ASC, id ASC LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit], row_to_record)?;
            rows.collect()
        })
    }

    /// Active records of `volume` not confirmed since `cutoff`.
    ///
    /// After a complete walk these are the entries that vanished from disk.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn list_not_seen_since(
        &self,
        volume: &Path,
        cutoff: DateTime<Utc>,
    ) -> StoreResult<Vec<FileRecord>> {
        let volume = path_str(volume)?;
        let cutoff = to_micros(cutoff);
        self.with_retry("list_not_seen_since", |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {COLUMNS} FROM entries \
                 WHERE deleted = 0 AND volume = ?1 AND last_seen < ?2 ORDER BY path"
            ))?;
            let rows = stmt.query_map(params![volume, cutoff], row_to_record)?;
            rows.collect()
        })
    }

    /// Store a digest computed for `record` and clear its rehash flag.
    ///
    /// Compare-and-set: the write only happens if the record still has the
    /// path, size and mtime the digest was computed for. Returns `false`
    /// when a concurrent change got there first; the flag then stays set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn record_hash(&self, record: &FileRecord, hash: &str) -> StoreResult<bool> {
        let path = path_str(&record.path)?;
        let size = record.size as i64;
        let modified = to_micros(record.modified);
        self.with_retry("record_hash", |conn| {
            conn.execute(
                "UPDATE entries SET hash = ?1, rehash_needed = 0 \
                 WHERE id = ?2 AND deleted = 0 AND kind = 'file' \
                 AND path = ?3 AND size = ?4 AND modified = ?5",
                params![hash, record.id, path, size, modified],
            )
            .map(|n| n > 0)
        })
    }

    /// Groups of active files sharing an authoritative digest.
    ///
    /// Largest files first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn duplicate_groups(&self, min_size: u64) -> StoreResult<Vec<DuplicateGroup>> {
        let min_size = i64::try_from(min_size).unwrap_or(i64::MAX);
        let rows: Vec<(String, i64, String)> = self.with_retry("duplicate_groups", |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT hash, size, path FROM entries \
                 WHERE deleted = 0 AND kind = 'file' AND rehash_needed = 0 \
                 AND hash IS NOT NULL AND size >= ?1 \
                 AND hash IN ( \
                     SELECT hash FROM entries \
                     WHERE deleted = 0 AND kind = 'file' AND rehash_needed = 0 AND hash IS NOT NULL \
                     GROUP BY hash HAVING COUNT(*) > 1) \
                 ORDER BY size DESC, hash, path",
            )?;
            let rows = stmt.query_map(params![min_size], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;
            rows.collect()
        })?;

        let mut groups: Vec<DuplicateGroup> = Vec::new();
        for (hash, size, path) in rows {
            match groups.last_mut() {
                Some(group) if group.hash == hash => group.paths.push(PathBuf::from(path)),
                _ => groups.push(DuplicateGroup {
                    hash,
                    size: size as u64,
                    paths: vec![PathBuf::from(path)],
                }),
            }
        }
        // Equal digests with a single qualifying path (others under min_size) aren't groups.
        groups.retain(|group| group.paths.len() > 1);
        Ok(groups)
    }

    /// Hard-delete records soft-deleted before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn purge_deleted(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let cutoff = to_micros(cutoff);
        self.with_retry("purge_deleted", |conn| {
            conn.execute(
                "DELETE FROM entries WHERE deleted = 1 AND deleted_at < ?1",
                params![cutoff],
            )
        })
    }

    /// Inventory-wide counts.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on database failure.
    pub fn stats(&self) -> StoreResult<InventoryStats> {
        self.with_retry("stats", |conn| {
            conn.query_row(
                "SELECT \
                 COALESCE(SUM(deleted = 0 AND kind = 'file'), 0), \
                 COALESCE(SUM(deleted = 0 AND kind = 'directory'), 0), \
                 COALESCE(SUM(deleted = 0 AND kind = 'file' AND rehash_needed = 1), 0), \
                 COALESCE(SUM(deleted = 1), 0), \
                 COALESCE(SUM(CASE WHEN deleted = 0 AND kind = 'file' THEN size ELSE 0 END), 0) \
                 FROM entries",
                [],
                |row| {
                    Ok(InventoryStats {
                        files: row.get::<_, i64>(0)? as u64,
                        directories: row.get::<_, i64>(1)? as u64,
                        pending_hash: row.get::<_, i64>(2)? as u64,
                        deleted: row.get::<_, i64>(3)? as u64,
                        total_bytes: row.get::<_, i64>(4)? as u64,
                    })
                },
            )
        })
    }
}

fn is_busy(error: &rusqlite::Error) -> bool {
    matches!(
        error,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn path_str(path: &Path) -> StoreResult<&str> {
    path.to_str()
        .ok_or_else(|| StoreError::NonUtf8Path(path.to_path_buf()))
}

fn parent_str(path: &Path) -> Option<String> {
    path.parent().and_then(Path::to_str).map(str::to_owned)
}

/// `path` plus a trailing separator: the prefix every descendant shares.
fn descendant_prefix(path: &str) -> String {
    format!("{path}{MAIN_SEPARATOR}")
}

fn identity_columns(identity: Option<FileIdentity>) -> (Option<i64>, Option<i64>) {
    // u64 -> i64 reinterprets the bits; SQLite integers are signed.
    match identity {
        Some(id) => (Some(id.device as i64), Some(id.inode as i64)),
        None => (None, None),
    }
}

fn query_active(conn: &Connection, path: &str) -> rusqlite::Result<Option<FileRecord>> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM entries WHERE deleted = 0 AND path = ?1"),
        params![path],
        row_to_record,
    )
    .optional()
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<FileRecord> {
    let device: Option<i64> = row.get("device")?;
    let inode: Option<i64> = row.get("inode")?;
    let identity = match (device, inode) {
        (Some(device), Some(inode)) => Some(FileIdentity::new(device as u64, inode as u64)),
        _ => None,
    };

    Ok(FileRecord {
        id: row.get("id")?,
        volume: PathBuf::from(row.get::<_, String>("volume")?),
        path: PathBuf::from(row.get::<_, String>("path")?),
        parent: row.get::<_, Option<String>>("parent")?.map(PathBuf::from),
        identity,
        kind: row.get("kind")?,
        size: row.get::<_, i64>("size")? as u64,
        modified: from_micros(row.get("modified")?),
        hash: row.get("hash")?,
        rehash_needed: row.get("rehash_needed")?,
        deleted: row.get("deleted")?,
        deleted_at: row.get::<_, Option<i64>>("deleted_at")?.map(from_micros),
        last_seen: from_micros(row.get("last_seen")?),
    })
}
