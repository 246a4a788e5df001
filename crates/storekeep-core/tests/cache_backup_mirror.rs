mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::{MemoryRemote, test_db_path};
use sha2::{Digest, Sha256};
use storekeep_core::backup::{
    CacheBackup, CacheMirror, PersistOutcome, RestoreOutcome, SkipReason, backup_path,
};
use storekeep_core::models::{CoreErrorKind, NewStore, StoreCredentials, SyncScope};
use storekeep_core::persistence::StoreRegistry;
use storekeep_core::sqlite::{SqliteStore, probe_database};

fn seeded_database(test_name: &str, store_name: &str) -> std::path::PathBuf {
    let path = test_db_path(test_name);
    let store = SqliteStore::new(&path);
    store.migrate_to_latest().unwrap();
    store
        .add_store(&NewStore {
            name: store_name.to_string(),
            credentials: StoreCredentials {
                issuer_id: "issuer".to_string(),
                key_id: "key".to_string(),
                private_key: "pem".to_string(),
            },
        })
        .unwrap();
    path
}

fn checksum(path: &Path) -> Vec<u8> {
    Sha256::digest(fs::read(path).unwrap()).to_vec()
}

fn cleanup(path: &Path) {
    let _ = fs::remove_file(path);
    let _ = fs::remove_file(backup_path(path));
}

#[test]
fn corrupt_remote_copy_is_reverted_to_the_local_file() {
    let local = seeded_database("restore-corrupt", "Local");
    let before = checksum(&local);
    let remote = Arc::new(MemoryRemote::holding(b"definitely not a sqlite database, just text"));
    let mirror = CacheMirror::new(&local, remote, 1024);

    let outcome = mirror.restore();

    assert!(matches!(outcome, RestoreOutcome::RevertedToBackup { .. }));
    assert_eq!(checksum(&local), before);
    probe_database(&local).unwrap();
    cleanup(&local);
}

#[test]
fn empty_remote_copy_is_never_applied() {
    let local = seeded_database("restore-empty", "Local");
    let before = checksum(&local);
    let mirror = CacheMirror::new(&local, Arc::new(MemoryRemote::holding(b"")), 1024);

    assert_eq!(mirror.restore(), RestoreOutcome::RejectedEmptyBlob);
    assert_eq!(checksum(&local), before);
    cleanup(&local);
}

#[test]
fn corrupt_remote_copy_without_local_file_is_discarded() {
    let local = test_db_path("restore-discard");
    let mirror = CacheMirror::new(&local, Arc::new(MemoryRemote::holding(b"garbage")), 1024);

    let outcome = mirror.restore();

    assert!(matches!(outcome, RestoreOutcome::DiscardedCorrupt { .. }));
    assert!(!local.exists());
    cleanup(&local);
}

#[test]
fn valid_remote_copy_replaces_the_local_file() {
    let source = seeded_database("restore-source", "Remote");
    let content = fs::read(&source).unwrap();
    let local = seeded_database("restore-valid", "Local");
    let mirror = CacheMirror::new(&local, Arc::new(MemoryRemote::holding(&content)), 1024);

    let outcome = mirror.restore();

    assert_eq!(
        outcome,
        RestoreOutcome::Restored {
            bytes: content.len() as u64
        }
    );
    let stores = SqliteStore::new(&local).list_stores().unwrap();
    assert_eq!(stores.len(), 1);
    assert_eq!(stores[0].name, "Remote");
    assert!(backup_path(&local).exists());
    cleanup(&local);
    cleanup(&source);
}

#[test]
fn missing_or_unreachable_remote_leaves_the_local_file() {
    let local = seeded_database("restore-missing", "Local");
    let before = checksum(&local);

    let mirror = CacheMirror::new(&local, Arc::new(MemoryRemote::default()), 1024);
    assert_eq!(mirror.restore(), RestoreOutcome::NoRemoteCopy);

    let mirror = CacheMirror::new(&local, Arc::new(MemoryRemote::unreachable()), 1024);
    let RestoreOutcome::Unavailable(error) = mirror.restore() else {
        panic!("expected the remote to be unavailable");
    };
    assert_eq!(error.kind, CoreErrorKind::BackupSync);
    assert_eq!(error.scope, Some(SyncScope::Backup));

    assert_eq!(checksum(&local), before);
    cleanup(&local);
}

#[test]
fn persist_skips_files_that_are_missing_or_damaged() {
    let missing = test_db_path("persist-missing");
    let remote = Arc::new(MemoryRemote::default());
    let mirror = CacheMirror::new(&missing, remote.clone(), 1024);
    assert_eq!(mirror.persist(), PersistOutcome::Skipped(SkipReason::Missing));

    let damaged = test_db_path("persist-damaged");
    fs::write(&damaged, vec![b'x'; 4096]).unwrap();
    let mirror = CacheMirror::new(&damaged, remote.clone(), 1024);
    assert!(matches!(
        mirror.persist(),
        PersistOutcome::Skipped(SkipReason::IntegrityCheckFailed { .. })
    ));

    assert!(remote.puts.lock().unwrap().is_empty());
    cleanup(&damaged);
}

#[test]
fn persist_skips_suspiciously_small_files() {
    let local = seeded_database("persist-small", "Local");
    let remote = Arc::new(MemoryRemote::default());
    let mirror = CacheMirror::new(&local, remote.clone(), 10 * 1024 * 1024);

    let outcome = mirror.persist();

    assert!(matches!(
        outcome,
        PersistOutcome::Skipped(SkipReason::TooSmall { minimum, .. }) if minimum == 10 * 1024 * 1024
    ));
    assert!(remote.content().is_none());
    cleanup(&local);
}

#[test]
fn persist_creates_then_updates_the_remote_object() {
    let local = seeded_database("persist-upload", "Local");
    let remote = Arc::new(MemoryRemote::default());
    let mirror = CacheMirror::new(&local, remote.clone(), 1024);

    let first = mirror.persist();
    let second = mirror.persist();

    let size = fs::metadata(&local).unwrap().len();
    assert_eq!(
        first,
        PersistOutcome::Uploaded {
            bytes: size,
            created: true
        }
    );
    assert_eq!(
        second,
        PersistOutcome::Uploaded {
            bytes: size,
            created: false
        }
    );
    assert_eq!(
        *remote.puts.lock().unwrap(),
        vec![None, Some("sha-1".to_string())]
    );
    assert_eq!(remote.content().unwrap(), fs::read(&local).unwrap());
    cleanup(&local);
}

#[test]
fn persist_failure_is_reported_not_raised() {
    let local = seeded_database("persist-unreachable", "Local");
    let mirror = CacheMirror::new(&local, Arc::new(MemoryRemote::unreachable()), 1024);

    let PersistOutcome::Failed(error) = mirror.persist() else {
        panic!("expected the upload to fail");
    };
    assert_eq!(error.kind, CoreErrorKind::BackupSync);
    assert_eq!(error.scope, Some(SyncScope::Backup));
    cleanup(&local);
}

#[test]
fn stale_backup_from_an_earlier_run_is_never_reinstated() {
    let local = test_db_path("restore-stale-backup");
    fs::write(backup_path(&local), b"leftover from an earlier restore").unwrap();
    let mirror = CacheMirror::new(&local, Arc::new(MemoryRemote::holding(b"garbage")), 1024);

    let outcome = mirror.restore();

    assert!(matches!(outcome, RestoreOutcome::DiscardedCorrupt { .. }));
    assert!(!local.exists());
    assert!(!backup_path(&local).exists());
    cleanup(&local);
}

#[test]
fn damaged_local_backup_is_not_reinstated() {
    let local = test_db_path("restore-damaged-local");
    fs::write(&local, b"local file that was never a database").unwrap();
    let mirror = CacheMirror::new(&local, Arc::new(MemoryRemote::holding(b"garbage")), 1024);

    let outcome = mirror.restore();

    assert!(matches!(outcome, RestoreOutcome::DiscardedCorrupt { .. }));
    assert!(!local.exists());
    cleanup(&local);
}

#[test]
fn truncated_remote_copy_fails_the_integrity_check() {
    let source = seeded_database("restore-truncated-source", "Remote");
    let content = fs::read(&source).unwrap();
    assert!(content.len() > 8192);
    let truncated = content[..content.len() / 2].to_vec();
    let local = seeded_database("restore-truncated", "Local");
    let before = checksum(&local);
    let mirror = CacheMirror::new(&local, Arc::new(MemoryRemote::holding(&truncated)), 1024);

    let outcome = mirror.restore();

    assert!(matches!(outcome, RestoreOutcome::RevertedToBackup { .. }));
    assert_eq!(checksum(&local), before);
    cleanup(&local);
    cleanup(&source);
}
