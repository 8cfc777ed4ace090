//! Persistent inventory store.
//!
//! This module keeps the durable record of every file and directory seen on
//! the configured volumes, shared by the scanner and the watcher.
//!
//! # Architecture
//!
//! * [`database`]: SQLite persistence, schema management and the mutation API.
//! * [`record`]: The record model and the timestamp conversions used in columns.
//!
//! # Record lifecycle
//!
//! A record is identified by path among non-deleted rows. It becomes stale
//! when size, mtime or filesystem identity change (`rehash_needed` is set
//! and the old digest is kept but no longer trusted), and is soft-deleted
//! when its entry disappears. Moves keep the record and its digest.

pub mod database;
pub mod record;

pub use database::{InventoryStore, RetryPolicy, StoreError, StoreResult, SCHEMA_VERSION};
pub use record::{
    from_micros, to_micros, truncate_to_micros, DuplicateGroup, EntryKind, FileRecord,
    InventoryStats, UpsertOutcome,
};
