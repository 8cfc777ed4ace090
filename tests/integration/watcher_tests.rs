use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use voltrack::scanner::{HashPass, ScanMode, Scanner};
use voltrack::store::{FileRecord, InventoryStore};
use voltrack::watcher::{EventHandler, WatchEvent, Watcher};

use super::support::{blake3_hex, Env};

/// Poll until `check` finds what it's waiting for.
fn wait_for<T>(timeout: Duration, mut check: impl FnMut() -> Option<T>) -> Option<T> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(value) = check() {
            return Some(value);
        }
        thread::sleep(Duration::from_millis(50));
    }
    None
}

fn active(store: &InventoryStore, path: &Path) -> Option<FileRecord> {
    store.find_by_path(path).unwrap()
}

#[test]
fn test_watcher_follows_create_and_rename() {
    let env = Env::new();
    let shutdown = Arc::new(AtomicBool::new(false));

    let config = env.config.clone();
    let flag = Arc::clone(&shutdown);
    let handle = thread::spawn(move || Watcher::new(&config, flag).run());
    // Give the subscription time to be installed
    thread::sleep(Duration::from_millis(750));

    let store = env.store();
    let a = env.write("a.txt", b"watched");
    let created = wait_for(Duration::from_secs(10), || active(&store, &a))
        .expect("watcher never recorded a.txt");
    assert!(created.rehash_needed);
    assert!(created.hash.is_none(), "the watcher never hashes");

    let b = env.path("b.txt");
    fs::rename(&a, &b).unwrap();
    let moved = wait_for(Duration::from_secs(10), || {
        active(&store, &b).filter(|_| active(&store, &a).is_none())
    })
    .expect("watcher never recorded the rename");
    assert_eq!(moved.kind, created.kind);

    shutdown.store(true, Ordering::SeqCst);
    let stats = handle.join().unwrap().unwrap();
    assert!(stats.notifications > 0);
    assert_eq!(stats.workers.dropped, 0);

    HashPass::new(&store, 10).run().unwrap();
    assert_eq!(
        active(&store, &b).unwrap().authoritative_hash(),
        Some(blake3_hex(b"watched").as_str())
    );
}

#[test]
fn test_watcher_ignores_denied_top_level() {
    let mut env = Env::new();
    env.config.deny_list = vec!["#recycle".to_string()];
    env.mkdir("#recycle");
    let shutdown = Arc::new(AtomicBool::new(false));

    let config = env.config.clone();
    let flag = Arc::clone(&shutdown);
    let handle = thread::spawn(move || Watcher::new(&config, flag).run());
    thread::sleep(Duration::from_millis(750));

    let store = env.store();
    let denied = env.write("#recycle/trash.txt", b"trash");
    let marker = env.write("marker.txt", b"m");
    wait_for(Duration::from_secs(10), || active(&store, &marker))
        .expect("watcher never recorded marker.txt");

    shutdown.store(true, Ordering::SeqCst);
    let stats = handle.join().unwrap().unwrap();
    assert!(stats.filtered > 0);
    assert!(active(&store, &denied).is_none());
}

#[test]
fn test_move_after_scan_preserves_hash() {
    let env = Env::new();
    env.write("album/one.jpg", b"one");
    env.write("album/two.jpg", b"two");

    let store = env.store();
    Scanner::new(&env.config, &store).scan(ScanMode::Full).unwrap();
    let before = active(&store, &env.path("album/one.jpg")).unwrap();

    fs::rename(env.path("album"), env.path("renamed")).unwrap();
    let filter = env.config.path_filter();
    let handler = EventHandler::new(&store, &filter, 5);
    handler
        .apply(&WatchEvent::Moved {
            from: env.path("album"),
            to: env.path("renamed"),
        })
        .unwrap();

    let after = active(&store, &env.path("renamed/one.jpg")).unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.authoritative_hash(), before.authoritative_hash());
    assert_eq!(after.parent.as_deref(), Some(env.path("renamed").as_path()));

    // The next scan agrees with what the watcher did
    let summary = Scanner::new(&env.config, &store).scan(ScanMode::Full).unwrap();
    assert_eq!(summary.inserted, 0);
    assert_eq!(summary.marked_deleted, 0);
    assert_eq!(summary.hash.hashed, 0);
}

#[test]
fn test_modified_then_scan_hashes_new_content() {
    let env = Env::new();
    let path = env.write("doc.txt", b"draft");

    let store = env.store();
    Scanner::new(&env.config, &store).scan(ScanMode::Full).unwrap();

    fs::write(&path, b"final version").unwrap();
    let filter = env.config.path_filter();
    EventHandler::new(&store, &filter, 5)
        .apply(&WatchEvent::Modified(path.clone()))
        .unwrap();
    let flagged = active(&store, &path).unwrap();
    assert!(flagged.rehash_needed);
    assert_eq!(flagged.hash.as_deref(), Some(blake3_hex(b"draft").as_str()));

    let summary = Scanner::new(&env.config, &store)
        .scan(ScanMode::HashOnly)
        .unwrap();
    assert_eq!(summary.hash.hashed, 1);
    assert_eq!(
        active(&store, &path).unwrap().authoritative_hash(),
        Some(blake3_hex(b"final version").as_str())
    );
}

#[test]
fn test_created_then_modified_then_hash_pass() {
    let env = Env::new();
    let store = env.store();
    let filter = env.config.path_filter();
    let handler = EventHandler::new(&store, &filter, 5);

    let path = env.write("a.bin", b"first");
    handler.apply(&WatchEvent::Created(path.clone())).unwrap();
    let created = active(&store, &path).unwrap();
    assert!(created.rehash_needed);
    assert!(created.hash.is_none());

    fs::write(&path, b"first and more").unwrap();
    handler.apply(&WatchEvent::Modified(path.clone())).unwrap();
    let modified = active(&store, &path).unwrap();
    assert!(modified.rehash_needed);
    assert_eq!(modified.size, 14);

    let stats = HashPass::new(&store, 10).run().unwrap();
    assert_eq!(stats.hashed, 1);

    let hashed = active(&store, &path).unwrap();
    assert_eq!(hashed.id, created.id);
    assert!(!hashed.rehash_needed);
    assert_eq!(
        hashed.hash.as_deref(),
        Some(blake3_hex(b"first and more").as_str())
    );
}
