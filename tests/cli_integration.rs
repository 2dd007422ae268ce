//! CLI Integration Tests
//!
//! These tests build a store through the library, then check what the
//! `vleaf` binary reports about it.
//!
//! Run with:
//! ```bash
//! cargo test --test cli_integration
//! ```

mod common;

use common::hash_of;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;
use vleaf::{LongKey, StoreConfig, VirtualLeafStore};

/// Run vleaf and return (stdout, stderr, success)
fn run_vleaf(args: &[&str]) -> (String, String, bool) {
    let output = Command::new(env!("CARGO_BIN_EXE_vleaf"))
        .args(["-f", "json"])
        .args(args)
        .output()
        .expect("Failed to execute vleaf");

    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

fn populate(dir: &Path) {
    let config = StoreConfig::new(dir, 8, 8).with_chunks(1024, 1024, 16);
    let store: VirtualLeafStore<LongKey, LongKey> = VirtualLeafStore::create(config).unwrap();
    for round in 0..2u64 {
        let tx = store.start_transaction().unwrap();
        for i in 0..10u64 {
            let path = round * 10 + i;
            store
                .add_leaf(path, &LongKey(path), &LongKey(path * 2), &hash_of(path))
                .unwrap();
        }
        store.commit_transaction(&tx).unwrap();
    }
    store.close().unwrap();
}

#[test]
fn test_cli_inspect_reports_files_and_metadata() {
    let dir = tempdir().unwrap();
    populate(dir.path());

    let (stdout, stderr, success) = run_vleaf(&["inspect", dir.path().to_str().unwrap()]);
    assert!(success, "inspect should succeed: {}", stderr);

    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["metadata"]["file_count"], 2);
    assert_eq!(report["metadata"]["total_records"], 20);
    assert_eq!(report["metadata"]["valid_key_range"][1], 19);

    let files = report["files"].as_array().unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0]["record_count"], 10);
    assert_eq!(files[1]["finished"], true);
}

#[test]
fn test_cli_inspect_empty_directory() {
    let dir = tempdir().unwrap();
    let (stdout, _stderr, success) = run_vleaf(&["inspect", dir.path().to_str().unwrap()]);
    assert!(success);
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(report["metadata"].is_null());
    assert_eq!(report["files"].as_array().unwrap().len(), 0);
}

#[test]
fn test_cli_dump_slot() {
    let dir = tempdir().unwrap();
    populate(dir.path());
    let file = dir.path().join("leaves_00000001.vld");

    let (stdout, stderr, success) = run_vleaf(&[
        "dump",
        file.to_str().unwrap(),
        "--slot",
        "3",
        "--count",
        "2",
    ]);
    assert!(success, "dump should succeed: {}", stderr);

    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let records = report["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["slot"], 3);
    assert_eq!(records[0]["path"], 13);
    assert_eq!(records[1]["path"], 14);

    // [keyVersion=1][key=13] in big-endian, then the hash
    let bytes = records[0]["bytes"].as_str().unwrap();
    assert!(bytes.starts_with("00000001000000000000000d"));
    assert!(bytes[24..].starts_with(&hash_of(13).to_hex()));
}

#[test]
fn test_cli_dump_rejects_non_data_file() {
    let dir = tempdir().unwrap();
    let bogus = dir.path().join("bogus.vld");
    std::fs::write(&bogus, b"not a data file at all, just some text").unwrap();

    let (_stdout, stderr, success) = run_vleaf(&["dump", bogus.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("Invalid"), "stderr: {}", stderr);
}

#[test]
fn test_cli_init_config() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.json");

    let (stdout, _stderr, success) = run_vleaf(&[
        "init-config",
        path.to_str().unwrap(),
        "--dir",
        "/data/leaves",
    ]);
    assert!(success);
    assert!(stdout.contains("ok"));

    let config = StoreConfig::from_json_file(&path).unwrap();
    assert_eq!(config.storage_dir, Path::new("/data/leaves"));
}
