use std::fs;

use chrono::Utc;
use filetime::{set_file_mtime, FileTime};
use voltrack::scanner::{FileEntry, HashPass};

use super::support::{blake3_hex, Env};

#[test]
fn test_stale_digest_does_not_clear_flag() {
    let env = Env::new();
    let path = env.write("a.txt", b"version one");
    let store = env.store();
    let entry = FileEntry::stat(&path).unwrap().unwrap();
    store.upsert(env.volume.path(), &entry, Utc::now()).unwrap();

    // Digest computed for the record as fetched...
    let fetched = store.list_pending_hash(1).unwrap().remove(0);
    let digest = blake3_hex(b"version one");

    // ...while the watcher records a newer version
    fs::write(&path, b"version two, longer").unwrap();
    let newer = FileEntry::stat(&path).unwrap().unwrap();
    store.upsert(env.volume.path(), &newer, Utc::now()).unwrap();
    store.mark_rehash(&path).unwrap();

    assert!(!store.record_hash(&fetched, &digest).unwrap());
    let record = store.find_by_path(&path).unwrap().unwrap();
    assert!(record.rehash_needed);
    assert!(record.authoritative_hash().is_none());

    let stats = HashPass::new(&store, 10).run().unwrap();
    assert_eq!(stats.hashed, 1);
    let record = store.find_by_path(&path).unwrap().unwrap();
    assert_eq!(
        record.authoritative_hash(),
        Some(blake3_hex(b"version two, longer").as_str())
    );
}

#[test]
fn test_mtime_only_change_is_rehashed() {
    let env = Env::new();
    let path = env.write("a.txt", b"same bytes");
    set_file_mtime(&path, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

    let store = env.store();
    let entry = FileEntry::stat(&path).unwrap().unwrap();
    store.upsert(env.volume.path(), &entry, Utc::now()).unwrap();
    HashPass::new(&store, 10).run().unwrap();

    set_file_mtime(&path, FileTime::from_unix_time(1_600_000_100, 0)).unwrap();
    let touched = FileEntry::stat(&path).unwrap().unwrap();
    store.upsert(env.volume.path(), &touched, Utc::now()).unwrap();

    let pending = store.list_pending_hash(10).unwrap();
    assert_eq!(pending.len(), 1);
    // The previous digest is kept but no longer authoritative
    assert_eq!(pending[0].hash.as_deref(), Some(blake3_hex(b"same bytes").as_str()));

    let stats = HashPass::new(&store, 10).run().unwrap();
    assert_eq!(stats.hashed, 1);
    assert!(store.list_pending_hash(10).unwrap().is_empty());
}

#[test]
fn test_pass_drains_more_than_one_batch() {
    let env = Env::new();
    let store = env.store();
    for i in 0..25 {
        let path = env.write(&format!("f{i:02}.txt"), format!("file {i}").as_bytes());
        let entry = FileEntry::stat(&path).unwrap().unwrap();
        store.upsert(env.volume.path(), &entry, Utc::now()).unwrap();
    }

    let stats = HashPass::new(&store, 4).run().unwrap();
    assert_eq!(stats.hashed, 25);
    assert_eq!(store.stats().unwrap().pending_hash, 0);
}

#[test]
fn test_vanished_files_are_marked_deleted() {
    let env = Env::new();
    let store = env.store();
    let keep = env.write("keep.txt", b"keep");
    let gone = env.write("gone.txt", b"gone");
    for path in [&keep, &gone] {
        let entry = FileEntry::stat(path).unwrap().unwrap();
        store.upsert(env.volume.path(), &entry, Utc::now()).unwrap();
    }
    fs::remove_file(&gone).unwrap();

    let stats = HashPass::new(&store, 10).run().unwrap();
    assert_eq!(stats.hashed, 1);
    assert_eq!(stats.vanished, 1);
    assert!(store.find_by_path(&gone).unwrap().is_none());
    assert_eq!(store.stats().unwrap().deleted, 1);
}
