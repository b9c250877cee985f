use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use super::*;
use crate::config::Config;
use crate::test_util::random_records;

const DIMENSION: usize = 128;

fn temp_root(prefix: &str) -> PathBuf {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock must be monotonic")
        .as_nanos();
    std::env::temp_dir().join(format!("lodestone_db_{prefix}_{timestamp}"))
}

fn cleanup(root: &Path) {
    if root.exists() {
        fs::remove_dir_all(root).expect("temp directory should be removable");
    }
}

fn built_collection(len: usize) -> Collection {
    Collection::from_records(Config::create_default(), random_records(DIMENSION, len))
        .expect("bulk build must succeed")
}

#[test]
fn save_get_delete_lifecycle() {
    let root = temp_root("lifecycle");
    let database = Database::open(&root).expect("open must succeed");
    assert!(database.is_empty());
    assert_eq!(database.path(), root.as_path());

    let collection = built_collection(100);
    database
        .save_collection("vectors", &collection)
        .expect("save must succeed");
    assert_eq!(database.len(), 1);

    let handle = database
        .get_collection("vectors")
        .expect("get must succeed");
    assert_eq!(handle.read().expect("lock must be healthy").len(), 100);

    let small = built_collection(2);
    database
        .save_collection("test", &small)
        .expect("save must succeed");
    assert_eq!(database.len(), 2);
    assert_eq!(
        database.list_collections(),
        vec!["test".to_string(), "vectors".to_string()]
    );

    database
        .delete_collection("vectors")
        .expect("delete must succeed");
    assert_eq!(database.len(), 1);
    assert!(!database.is_empty());
    assert!(matches!(
        database.get_collection("vectors"),
        Err(Error::CollectionNotFound(_))
    ));
    assert!(matches!(
        database.delete_collection("vectors"),
        Err(Error::CollectionNotFound(_))
    ));

    database
        .delete_collection("test")
        .expect("delete must succeed");
    assert!(database.is_empty());

    drop(database);
    cleanup(&root);
}

#[test]
fn reopen_loads_collections_from_disk() {
    let root = temp_root("reopen");
    {
        let database = Database::open(&root).expect("open must succeed");
        database
            .save_collection("vectors", &built_collection(40))
            .expect("save must succeed");
    }

    let database = Database::open(&root).expect("reopen must succeed");
    assert_eq!(database.len(), 1);
    let handle = database
        .get_collection("vectors")
        .expect("get must succeed");
    let collection = handle.read().expect("lock must be healthy");
    assert_eq!(collection.len(), 40);
    assert_eq!(collection.dimension(), DIMENSION);

    let probe = random_records(DIMENSION, 1).remove(0);
    let found = collection
        .query(&probe.vector, 5)
        .expect("query must succeed");
    assert_eq!(found.len(), 5);

    drop(collection);
    drop(database);
    cleanup(&root);
}

#[test]
fn resaving_replaces_the_previous_copy() {
    let root = temp_root("resave");
    let database = Database::open(&root).expect("open must succeed");

    database
        .save_collection("vectors", &built_collection(10))
        .expect("save must succeed");
    database
        .save_collection("vectors", &built_collection(25))
        .expect("resave must succeed");

    assert_eq!(database.len(), 1);
    let handle = database
        .get_collection("vectors")
        .expect("get must succeed");
    assert_eq!(handle.read().expect("lock must be healthy").len(), 25);

    drop(handle);
    drop(database);
    cleanup(&root);
}

#[test]
fn second_open_on_a_live_path_is_refused() {
    let root = temp_root("locked");
    let first = Database::open(&root).expect("open must succeed");

    let error = Database::open(&root).expect_err("must fail");
    assert!(matches!(error, Error::Locked(_)));

    // The lock dies with the owning handle.
    drop(first);
    let reopened = Database::open(&root).expect("reopen must succeed");
    drop(reopened);
    cleanup(&root);
}

#[test]
fn failed_open_releases_the_lock() {
    let root = temp_root("failed_open");
    fs::create_dir_all(&root).expect("temp directory must be creatable");
    fs::write(root.join("manifest.json"), "not json at all").expect("write must succeed");

    let first = Database::open(&root).expect_err("must fail");
    assert!(matches!(first, Error::Corrupt(_)), "got: {first}");

    // A failed open must not leave the path locked: the next attempt sees
    // the real error again, not `Locked`.
    let second = Database::open(&root).expect_err("must fail");
    assert!(matches!(second, Error::Corrupt(_)), "got: {second}");
    assert!(!root.join(".lock").exists());

    cleanup(&root);
}

#[test]
fn failed_manifest_write_rolls_back_bookkeeping() {
    let root = temp_root("manifest_rollback");
    let database = Database::open(&root).expect("open must succeed");

    // A directory squatting on the temp path makes the manifest write fail.
    let blocker = root.join("manifest.tmp");
    fs::create_dir(&blocker).expect("blocker must be creatable");

    let error = database
        .save_collection("vectors", &built_collection(3))
        .expect_err("must fail");
    assert!(matches!(error, Error::Io(_)), "got: {error}");
    assert!(database.is_empty());
    assert!(database.list_collections().is_empty());

    fs::remove_dir(&blocker).expect("blocker must be removable");
    database
        .save_collection("vectors", &built_collection(3))
        .expect("save must succeed");
    assert_eq!(database.len(), 1);

    fs::create_dir(&blocker).expect("blocker must be creatable");
    let error = database
        .delete_collection("vectors")
        .expect_err("must fail");
    assert!(matches!(error, Error::Io(_)), "got: {error}");
    assert_eq!(database.len(), 1);
    database
        .get_collection("vectors")
        .expect("collection must still be registered");

    drop(database);
    cleanup(&root);
}

#[test]
fn hostile_collection_names_are_rejected() {
    let root = temp_root("names");
    let database = Database::open(&root).expect("open must succeed");
    let collection = built_collection(1);

    for name in ["", ".", "..", ".hidden", "a/b", "a\\b", "manifest.json"] {
        let error = database
            .save_collection(name, &collection)
            .expect_err("must fail");
        assert!(matches!(error, Error::InvalidName(_)), "accepted {name:?}");
    }
    assert!(database.is_empty());

    drop(database);
    cleanup(&root);
}

#[test]
fn stale_temp_files_are_swept_on_open() {
    let root = temp_root("sweep");
    {
        let database = Database::open(&root).expect("open must succeed");
        database
            .save_collection("vectors", &built_collection(5))
            .expect("save must succeed");
    }
    let stray = root.join("vectors").join("collection.tmp");
    fs::write(&stray, b"half a write").expect("write must succeed");

    let database = Database::open(&root).expect("reopen must succeed");
    assert!(!stray.exists(), "stray temp file must be removed");
    let handle = database
        .get_collection("vectors")
        .expect("get must succeed");
    assert_eq!(handle.read().expect("lock must be healthy").len(), 5);

    drop(handle);
    drop(database);
    cleanup(&root);
}

#[test]
fn concurrent_access_from_many_threads() {
    let root = temp_root("threads");
    let database = Arc::new(Database::open(&root).expect("open must succeed"));
    database
        .save_collection("shared", &built_collection(60))
        .expect("save must succeed");

    let mut workers = Vec::new();
    for worker in 0..8u64 {
        let database = Arc::clone(&database);
        workers.push(thread::spawn(move || {
            let name = format!("worker_{worker}");
            let records = random_records(DIMENSION, 10);
            let own = Collection::from_records(Config::create_default(), records.clone())
                .expect("bulk build must succeed");
            database
                .save_collection(&name, &own)
                .expect("save must succeed");

            let shared = database
                .get_collection("shared")
                .expect("get must succeed");
            let found = shared
                .read()
                .expect("lock must be healthy")
                .query(&records[0].vector, 3)
                .expect("query must succeed");
            assert_eq!(found.len(), 3);

            let own = database.get_collection(&name).expect("get must succeed");
            assert_eq!(own.read().expect("lock must be healthy").len(), 10);
        }));
    }
    for worker in workers {
        worker.join().expect("worker must not panic");
    }

    assert_eq!(database.len(), 9);
    drop(database);
    cleanup(&root);
}
