use std::fs;

use filetime::{set_file_mtime, FileTime};
use voltrack::scanner::{ScanMode, Scanner};
use voltrack::store::EntryKind;

use super::support::{blake3_hex, Env};

#[test]
fn test_scan_records_tree_and_hashes_files() {
    let env = Env::new();
    env.write("photos/2024/a.jpg", b"jpeg bytes");
    env.write("notes.txt", b"hello");
    env.mkdir("empty");

    let store = env.store();
    let summary = Scanner::new(&env.config, &store).scan(ScanMode::Full).unwrap();
    assert_eq!(summary.inserted, 5);
    assert_eq!(summary.hash.hashed, 2);

    let dir = env.record("photos/2024").unwrap();
    assert_eq!(dir.kind, EntryKind::Directory);
    assert!(dir.hash.is_none());
    assert!(!dir.rehash_needed);
    assert_eq!(dir.parent.as_deref(), Some(env.path("photos").as_path()));

    let file = env.record("photos/2024/a.jpg").unwrap();
    assert_eq!(file.size, 10);
    assert_eq!(file.volume, env.volume.path());
    assert_eq!(
        file.authoritative_hash(),
        Some(blake3_hex(b"jpeg bytes").as_str())
    );
}

#[test]
fn test_deny_list_applies_to_top_level_only() {
    let mut env = Env::new();
    env.config.deny_list = vec!["#recycle".to_string(), "tmp".to_string()];
    env.write("#recycle/old.txt", b"old");
    env.write("tmpfiles/x.txt", b"x");
    env.write("docs/tmp/kept.txt", b"kept");
    env.write("docs/@eaDir/thumb.jpg", b"thumb");

    let store = env.store();
    Scanner::new(&env.config, &store).scan(ScanMode::Full).unwrap();

    assert!(env.record("#recycle").is_none());
    assert!(env.record("#recycle/old.txt").is_none());
    assert!(env.record("tmpfiles/x.txt").is_none());
    assert!(env.record("docs/tmp/kept.txt").is_some());
    assert!(env.record("docs/@eaDir").is_none());
    assert!(env.record("docs/@eaDir/thumb.jpg").is_none());
}

#[test]
fn test_rescan_detects_change_and_keeps_unchanged_hash() {
    let env = Env::new();
    let a = env.write("a.txt", b"alpha");
    env.write("b.txt", b"beta");
    set_file_mtime(&a, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();

    let store = env.store();
    let scanner = Scanner::new(&env.config, &store);
    scanner.scan(ScanMode::Full).unwrap();
    let before = env.record("b.txt").unwrap();

    fs::write(&a, b"alpha, edited").unwrap();
    set_file_mtime(&a, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();

    let summary = scanner.scan(ScanMode::Full).unwrap();
    assert_eq!(summary.changed, 1);
    assert_eq!(summary.hash.hashed, 1);

    let edited = env.record("a.txt").unwrap();
    assert_eq!(edited.modified.timestamp(), 1_700_000_000);
    assert_eq!(
        edited.authoritative_hash(),
        Some(blake3_hex(b"alpha, edited").as_str())
    );

    let after = env.record("b.txt").unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.hash, before.hash);
    assert!(after.last_seen >= before.last_seen);
}

#[test]
fn test_rescan_soft_deletes_removed_subtree() {
    let env = Env::new();
    env.write("old/a.txt", b"a");
    env.write("old/deep/b.txt", b"b");
    env.write("keep.txt", b"k");

    let store = env.store();
    let scanner = Scanner::new(&env.config, &store);
    scanner.scan(ScanMode::Full).unwrap();

    fs::remove_dir_all(env.path("old")).unwrap();
    let summary = scanner.scan(ScanMode::Full).unwrap();
    assert_eq!(summary.marked_deleted, 4);

    let stats = store.stats().unwrap();
    assert_eq!(stats.files, 1);
    assert_eq!(stats.directories, 0);
    assert_eq!(stats.deleted, 4);
    assert!(env.record("keep.txt").is_some());
}

#[test]
fn test_recreated_path_gets_fresh_record() {
    let env = Env::new();
    let a = env.write("a.txt", b"first");

    let store = env.store();
    let scanner = Scanner::new(&env.config, &store);
    scanner.scan(ScanMode::Full).unwrap();
    let first = env.record("a.txt").unwrap();

    fs::remove_file(&a).unwrap();
    scanner.scan(ScanMode::Full).unwrap();
    assert!(env.record("a.txt").is_none());

    env.write("a.txt", b"second!");
    scanner.scan(ScanMode::Full).unwrap();
    let second = env.record("a.txt").unwrap();
    assert_ne!(second.id, first.id);
    assert_eq!(
        second.authoritative_hash(),
        Some(blake3_hex(b"second!").as_str())
    );
    assert_eq!(store.stats().unwrap().deleted, 1);
}

#[test]
#[cfg(unix)]
fn test_symlinks_are_ignored() {
    let env = Env::new();
    let target = env.write("target.txt", b"t");
    std::os::unix::fs::symlink(&target, env.path("link.txt")).unwrap();

    let store = env.store();
    Scanner::new(&env.config, &store).scan(ScanMode::Full).unwrap();
    assert!(env.record("target.txt").is_some());
    assert!(env.record("link.txt").is_none());
}

#[test]
#[cfg(unix)]
fn test_unreadable_subtree_is_not_marked_deleted() {
    use std::os::unix::fs::PermissionsExt;

    let env = Env::new();
    env.write("private/secret.txt", b"s");
    env.write("public.txt", b"p");

    let store = env.store();
    let scanner = Scanner::new(&env.config, &store);
    scanner.scan(ScanMode::Full).unwrap();

    let private = env.path("private");
    fs::set_permissions(&private, fs::Permissions::from_mode(0o000)).unwrap();
    // Root can read anything; nothing to test then
    if fs::read_dir(&private).is_ok() {
        fs::set_permissions(&private, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let summary = scanner.scan(ScanMode::Full).unwrap();
    fs::set_permissions(&private, fs::Permissions::from_mode(0o755)).unwrap();

    assert!(summary.entry_errors >= 1);
    assert_eq!(summary.marked_deleted, 0);
    assert!(env.record("private/secret.txt").is_some());
}

#[test]
fn test_hash_only_run_hashes_pending_without_walking() {
    let env = Env::new();
    let a = env.write("a.txt", b"alpha");

    let store = env.store();
    let entry = voltrack::scanner::FileEntry::stat(&a).unwrap().unwrap();
    store
        .upsert(env.volume.path(), &entry, chrono::Utc::now())
        .unwrap();
    // Not on disk, never recorded: a hash-only run must not notice it
    env.write("b.txt", b"beta");

    let summary = Scanner::new(&env.config, &store)
        .scan(ScanMode::HashOnly)
        .unwrap();
    assert_eq!(summary.entries_seen, 0);
    assert_eq!(summary.hash.hashed, 1);
    assert!(env.record("b.txt").is_none());
    assert_eq!(
        env.record("a.txt").unwrap().authoritative_hash(),
        Some(blake3_hex(b"alpha").as_str())
    );
}

#[test]
fn test_multiple_volumes() {
    let env = Env::new();
    let second = tempfile::TempDir::new().unwrap();
    fs::write(second.path().join("other.txt"), b"other").unwrap();
    env.write("mine.txt", b"mine");

    let mut config = env.config.clone();
    config.volumes.push(second.path().to_path_buf());

    let store = env.store();
    let summary = Scanner::new(&config, &store).scan(ScanMode::Full).unwrap();
    assert_eq!(summary.volumes_scanned, 2);

    let other = store
        .find_by_path(&second.path().join("other.txt"))
        .unwrap()
        .unwrap();
    assert_eq!(other.volume, second.path());
}
