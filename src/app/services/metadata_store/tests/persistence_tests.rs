//! Tests for metadata persistence and reload

use super::*;
use crate::app::models::DataFileCursor;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_empty_when_nothing_cached() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(temp_dir.path());

    assert!(!store.is_cached());
    assert!(store.get().is_empty());
    assert!(!store.path().exists());
}

#[test]
fn test_set_persists_immediately() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(temp_dir.path());

    store.set("name", json!("Alpha")).unwrap();
    assert!(store.path().ends_with("test-provider/STATION1/metadata.json"));

    let reopened = open_store(temp_dir.path());
    assert_eq!(reopened.get().name(), Some("Alpha"));
}

#[test]
fn test_set_replaces_whole_field() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(temp_dir.path());
    store
        .set("properties", json!({"owner": "a", "height": 3}))
        .unwrap();

    let snapshot = store.set("properties", json!({"owner": "b"})).unwrap();
    assert_eq!(snapshot.get("properties"), Some(&json!({"owner": "b"})));
}

#[test]
fn test_committed_record_carries_schema_version() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(temp_dir.path());
    store.merge(&sample_metadata()).unwrap();

    let raw: Value = serde_json::from_slice(&fs::read(store.path()).unwrap()).unwrap();
    assert_eq!(
        raw["schema_version"],
        json!(crate::constants::CACHE_SCHEMA_VERSION)
    );
    assert_eq!(raw["payload"]["name"], json!("Alpha Ridge"));
}

#[test]
fn test_snapshots_are_independent_of_later_mutation() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(temp_dir.path());
    store.set("name", json!("Before")).unwrap();

    let snapshot = store.get();
    store.set("name", json!("After")).unwrap();

    assert_eq!(snapshot.name(), Some("Before"));
    assert_eq!(store.get().name(), Some("After"));
}

#[test]
fn test_failed_commit_leaves_snapshot_unchanged() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(temp_dir.path());
    store.set("name", json!("Kept")).unwrap();

    // A directory where the record should be makes the atomic replace fail
    fs::remove_file(store.path()).unwrap();
    fs::create_dir_all(store.path().join("blocker")).unwrap();

    assert!(store.set("name", json!("Lost")).is_err());
    assert_eq!(store.get().name(), Some("Kept"));
}

#[test]
fn test_upsert_data_file_replaces_by_url() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(temp_dir.path());
    store.merge(&sample_metadata()).unwrap();

    let mut cursor = DataFileCursor::new("http://source/alpha.csv", "alpha.csv");
    cursor.last_byte_length = Some(2048);
    store.upsert_data_file(cursor).unwrap();
    store
        .upsert_data_file(DataFileCursor::new("http://source/beta.csv", "beta.csv"))
        .unwrap();

    let cursors = open_store(temp_dir.path()).get().data_files().unwrap();
    assert_eq!(cursors.len(), 2);
    assert_eq!(cursors[0].last_byte_length, Some(2048));
    assert_eq!(cursors[1].filename, "beta.csv");
}

#[test]
fn test_corrupt_record_fails_to_open() {
    let temp_dir = TempDir::new().unwrap();
    let path = test_key()
        .station_dir(temp_dir.path())
        .join(crate::constants::METADATA_FILE_NAME);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "{ truncated").unwrap();

    assert!(MetadataStore::open(temp_dir.path(), &test_key()).is_err());
}
