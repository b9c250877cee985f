use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use super::*;
use crate::record::{Metadata, MetadataValue};
use crate::test_util::random_records;

const DIMENSION: usize = 16;

fn temp_root(prefix: &str) -> PathBuf {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock must be monotonic")
        .as_nanos();
    let root = std::env::temp_dir().join(format!("lodestone_{prefix}_{timestamp}"));
    fs::create_dir_all(&root).expect("temp directory must be creatable");
    root
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
fn round_trip_preserves_search_behavior() {
    let collection = built_collection(80);
    let bytes = encode_collection(&collection).expect("encode must succeed");
    let restored = decode_collection(&bytes).expect("decode must succeed");

    assert_eq!(restored.len(), collection.len());
    assert_eq!(restored.dimension(), collection.dimension());
    assert_eq!(restored.config(), collection.config());

    for probe in random_records(DIMENSION, 10) {
        let before = collection
            .query(&probe.vector, 5)
            .expect("query must succeed");
        let after = restored
            .query(&probe.vector, 5)
            .expect("query must succeed");
        assert_eq!(before, after, "restored index must be search-identical");
    }
}

#[test]
fn round_trip_is_byte_stable() {
    let collection = built_collection(20);
    let first = encode_collection(&collection).expect("encode must succeed");
    let second = encode_collection(&decode_collection(&first).expect("decode must succeed"))
        .expect("encode must succeed");
    assert_eq!(first, second);
}

#[test]
fn tombstones_survive_round_trip() {
    let mut collection = built_collection(30);
    collection.delete(12).expect("delete must succeed");
    collection.delete(25).expect("delete must succeed");

    let bytes = encode_collection(&collection).expect("encode must succeed");
    let restored = decode_collection(&bytes).expect("decode must succeed");

    assert_eq!(restored.len(), 28);
    assert!(!restored.contains(12));
    assert!(!restored.contains(25));
    let probe = vec![0.0; DIMENSION];
    let found = restored.query(&probe, 30).expect("query must succeed");
    assert!(found.iter().all(|result| result.id != 12 && result.id != 25));
}

#[test]
fn metadata_and_relevancy_survive_round_trip() {
    let mut metadata = Metadata::new();
    metadata.insert("label".to_string(), MetadataValue::from("anchor"));
    metadata.insert("rank".to_string(), MetadataValue::from(3_i64));
    metadata.insert("weight".to_string(), MetadataValue::from(0.5_f64));
    metadata.insert("flagged".to_string(), MetadataValue::from(true));

    let mut collection = Collection::new(Config::create_default()).expect("valid config");
    let id = collection
        .insert(Record::with_metadata(vec![1.0, 2.0], metadata.clone()))
        .expect("insert must succeed");
    collection.set_relevancy(Some(2.0));

    let bytes = encode_collection(&collection).expect("encode must succeed");
    let restored = decode_collection(&bytes).expect("decode must succeed");

    let record = restored.get(id).expect("record must be present");
    assert_eq!(record.metadata, metadata);
    assert_eq!(restored.relevancy(), Some(2.0));
}

#[test]
fn empty_collection_round_trips() {
    let collection = Collection::new(Config::create_default()).expect("valid config");
    let bytes = encode_collection(&collection).expect("encode must succeed");
    let restored = decode_collection(&bytes).expect("decode must succeed");
    assert!(restored.is_empty());
}

#[test]
fn flipped_payload_byte_is_detected() {
    let collection = built_collection(10);
    let mut bytes = encode_collection(&collection).expect("encode must succeed");
    let victim = bytes.len() - 1;
    bytes[victim] ^= 0xFF;

    let error = decode_collection(&bytes).expect_err("must fail");
    assert!(matches!(error, Error::Corrupt(_)), "got: {error}");
}

#[test]
fn bad_magic_is_detected() {
    let collection = built_collection(5);
    let mut bytes = encode_collection(&collection).expect("encode must succeed");
    bytes[0] = 0x00;

    let error = decode_collection(&bytes).expect_err("must fail");
    assert!(matches!(error, Error::Corrupt(_)));
}

#[test]
fn future_format_version_is_rejected() {
    let collection = built_collection(5);
    let mut bytes = encode_collection(&collection).expect("encode must succeed");
    let future = (FORMAT_VERSION + 1).to_le_bytes();
    bytes[4..6].copy_from_slice(&future);

    let error = decode_collection(&bytes).expect_err("must fail");
    assert!(matches!(
        error,
        Error::UnsupportedFormatVersion {
            found,
            supported: FORMAT_VERSION
        } if found == FORMAT_VERSION + 1
    ));
}

#[test]
fn truncated_file_is_detected() {
    let collection = built_collection(5);
    let bytes = encode_collection(&collection).expect("encode must succeed");

    let header_only = &bytes[..20];
    assert!(matches!(
        decode_collection(header_only),
        Err(Error::Corrupt(_))
    ));

    let half = &bytes[..bytes.len() / 2];
    assert!(matches!(decode_collection(half), Err(Error::Corrupt(_))));
}

#[test]
fn manifest_round_trips_atomically() {
    let root = temp_root("manifest");
    let path = root.join("manifest.json");

    let mut manifest = Manifest::new();
    manifest.collections.insert("vectors".to_string());
    write_manifest(&path, &manifest).expect("write must succeed");

    manifest.collections.insert("test".to_string());
    write_manifest(&path, &manifest).expect("overwrite must succeed");
    assert!(!path.with_extension("tmp").exists());

    let loaded = read_manifest(&path).expect("read must succeed");
    assert_eq!(loaded.collections, manifest.collections);
    cleanup(&root);
}

#[test]
fn manifest_version_mismatch_is_rejected() {
    let root = temp_root("manifest_version");
    let path = root.join("manifest.json");
    fs::write(&path, r#"{"version": 99, "collections": []}"#).expect("write must succeed");

    let error = read_manifest(&path).expect_err("must fail");
    assert!(matches!(error, Error::UnsupportedFormatVersion { .. }));
    cleanup(&root);
}

#[test]
fn garbled_manifest_is_corrupt() {
    let root = temp_root("manifest_garbled");
    let path = root.join("manifest.json");
    fs::write(&path, "not json at all").expect("write must succeed");

    let error = read_manifest(&path).expect_err("must fail");
    assert!(matches!(error, Error::Corrupt(_)));
    cleanup(&root);
}
