use std::path::PathBuf;
use std::thread;

use chrono::{Duration, Utc};
use voltrack::scanner::FileEntry;
use voltrack::store::{InventoryStore, StoreError, SCHEMA_VERSION};

use super::support::Env;

#[test]
fn test_records_persist_across_reopen() {
    let env = Env::new();
    let path = env.write("a.txt", b"alpha");
    {
        let store = env.store();
        let entry = FileEntry::stat(&path).unwrap().unwrap();
        store.upsert(env.volume.path(), &entry, Utc::now()).unwrap();
    }

    let reopened = env.store();
    let record = reopened.find_by_path(&path).unwrap().unwrap();
    assert_eq!(record.size, 5);
    assert!(record.rehash_needed);
}

#[test]
fn test_open_creates_parent_directories() {
    let env = Env::new();
    let nested = env.state.path().join("a/b/c/inventory.db");
    InventoryStore::open(&nested).unwrap();
    assert!(nested.is_file());
}

#[test]
fn test_schema_version_is_recorded() {
    let env = Env::new();
    drop(env.store());

    let conn = rusqlite::Connection::open(&env.config.database.path).unwrap();
    let version: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap();
    assert_eq!(version, SCHEMA_VERSION);
}

#[test]
fn test_newer_schema_is_refused() {
    let env = Env::new();
    drop(env.store());
    {
        let conn = rusqlite::Connection::open(&env.config.database.path).unwrap();
        conn.execute_batch(&format!("PRAGMA user_version = {};", SCHEMA_VERSION + 1))
            .unwrap();
    }

    let err = InventoryStore::from_config(&env.config.database).unwrap_err();
    assert!(matches!(err, StoreError::SchemaVersion { .. }));
}

#[test]
fn test_concurrent_writers_on_one_file() {
    let env = Env::new();
    drop(env.store());

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let database = env.config.database.clone();
            let volume = env.volume.path().to_path_buf();
            let paths: Vec<PathBuf> = (0..10)
                .map(|i| env.write(&format!("w{worker}/f{i}.txt"), b"x"))
                .collect();
            thread::spawn(move || {
                let store = InventoryStore::from_config(&database).unwrap();
                for path in paths {
                    let entry = FileEntry::stat(&path).unwrap().unwrap();
                    store.upsert(&volume, &entry, Utc::now()).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(env.store().stats().unwrap().files, 40);
}

#[test]
fn test_purge_only_removes_old_deletions() {
    let env = Env::new();
    let store = env.store();
    let a = env.write("a.txt", b"a");
    let b = env.write("b.txt", b"b");
    for path in [&a, &b] {
        let entry = FileEntry::stat(path).unwrap().unwrap();
        store.upsert(env.volume.path(), &entry, Utc::now()).unwrap();
    }
    store.mark_deleted(&a).unwrap();

    // Nothing was deleted before yesterday
    assert_eq!(store.purge_deleted(Utc::now() - Duration::days(1)).unwrap(), 0);
    assert_eq!(store.purge_deleted(Utc::now() + Duration::seconds(1)).unwrap(), 1);

    let stats = store.stats().unwrap();
    assert_eq!(stats.deleted, 0);
    assert_eq!(stats.files, 1);
}

#[test]
fn test_duplicate_groups_across_volumes() {
    let env = Env::new();
    let other = tempfile::TempDir::new().unwrap();
    let store = env.store();

    let a = env.write("a.bin", b"same content");
    let b = other.path().join("b.bin");
    std::fs::write(&b, b"same content").unwrap();
    let c = env.write("c.bin", b"different");

    for (volume, path) in [
        (env.volume.path(), &a),
        (other.path(), &b),
        (env.volume.path(), &c),
    ] {
        let entry = FileEntry::stat(path).unwrap().unwrap();
        store.upsert(volume, &entry, Utc::now()).unwrap();
    }
    voltrack::scanner::HashPass::new(&store, 10).run().unwrap();

    let groups = store.duplicate_groups(1).unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].size, 12);
    assert_eq!(groups[0].paths.len(), 2);
    assert!(groups[0].paths.contains(&a));
    assert!(groups[0].paths.contains(&b));

    assert!(store.duplicate_groups(100).unwrap().is_empty());
}
