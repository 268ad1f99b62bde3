//! Integration tests for `init`, `import`, `add-index`, `build-all`,
//! `indices` and `remove-index`.

mod common;

use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

use common::{seed_with_index, seed_workspace, workspace_cmd};

#[test]
fn test_init_creates_store_and_index_dir() {
    let temp = TempDir::new().expect("create temp dir");
    let dir = temp.path();

    workspace_cmd(dir)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("[ok] Initialized"))
        .stdout(predicate::str::contains("resonance.db"));

    assert!(dir.join("resonance.db").exists());
    assert!(dir.join("annoy_indices").is_dir());
}

#[test]
fn test_init_respects_database_flag() {
    let temp = TempDir::new().expect("create temp dir");
    let dir = temp.path();

    workspace_cmd(dir)
        .args(["--database", "data/features.db", "--index-dir", "idx", "init"])
        .assert()
        .success();

    assert!(dir.join("data").join("features.db").exists());
    assert!(dir.join("idx").is_dir());
}

#[test]
fn test_import_reports_counts() {
    let temp = TempDir::new().expect("create temp dir");
    let dir = temp.path();
    workspace_cmd(dir).arg("init").assert().success();
    fs::write(dir.join("features.jsonl"), common::FEATURES).expect("write features");

    workspace_cmd(dir)
        .args(["import", "features.jsonl", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"submissions\": 4"))
        .stdout(predicate::str::contains("\"vectors\": 7"));
}

#[test]
fn test_import_rejects_bad_line() {
    let temp = TempDir::new().expect("create temp dir");
    let dir = temp.path();
    workspace_cmd(dir).arg("init").assert().success();
    fs::write(dir.join("bad.jsonl"), "{\"gid\": \"not-a-uuid\"}\n").expect("write file");

    workspace_cmd(dir)
        .args(["import", "bad.jsonl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("[err]"))
        .stderr(predicate::str::contains("Line 1"));
}

#[test]
fn test_add_index_fills_gaps() {
    let temp = TempDir::new().expect("create temp dir");
    let dir = temp.path();
    seed_workspace(dir);

    workspace_cmd(dir)
        .args(["add-index", "mfccs", "-b", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[ok] Built index mfccs_angular_10"))
        .stdout(predicate::str::contains("Items: 5"))
        .stdout(predicate::str::contains("Recordings: 3"))
        .stdout(predicate::str::contains("Placeholders: 2"))
        .stdout(predicate::str::contains("Dimension: 3"));

    assert!(dir.join("annoy_indices").join("mfccs_angular_10.idx").exists());
}

#[test]
fn test_add_index_with_distance_and_forest_size() {
    let temp = TempDir::new().expect("create temp dir");
    let dir = temp.path();
    seed_workspace(dir);

    workspace_cmd(dir)
        .args([
            "add-index",
            "bpm",
            "--distance",
            "manhattan",
            "--forest-size",
            "20",
            "--json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"placeholders\": 1"))
        .stdout(predicate::str::contains("bpm_manhattan_20.idx"));
}

#[test]
fn test_add_index_unknown_metric_fails() {
    let temp = TempDir::new().expect("create temp dir");
    let dir = temp.path();
    seed_workspace(dir);

    workspace_cmd(dir)
        .args(["add-index", "loudness"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist: `loudness`"));
}

#[test]
fn test_build_all_reports_failures() {
    let temp = TempDir::new().expect("create temp dir");
    let dir = temp.path();
    seed_workspace(dir);

    workspace_cmd(dir)
        .arg("build-all")
        .assert()
        .success()
        .stdout(predicate::str::contains("+ mfccs_angular_10"))
        .stdout(predicate::str::contains("+ bpm_manhattan_10"))
        .stdout(predicate::str::contains("- gfccs_angular_10"))
        .stdout(predicate::str::contains("[ok] Built 4 indices"))
        .stdout(predicate::str::contains("[warn] 20 indices failed"));
}

#[test]
fn test_indices_and_remove_index() {
    let temp = TempDir::new().expect("create temp dir");
    let dir = temp.path();
    seed_with_index(dir, "mfccs");

    workspace_cmd(dir)
        .arg("indices")
        .assert()
        .success()
        .stdout(predicate::str::contains("INDEX"))
        .stdout(predicate::str::contains("mfccs_angular_10"));

    workspace_cmd(dir)
        .args(["remove-index", "mfccs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[ok] Removed index mfccs_angular_10"));

    workspace_cmd(dir)
        .args(["remove-index", "mfccs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[skip]"));

    workspace_cmd(dir)
        .arg("indices")
        .assert()
        .success()
        .stdout(predicate::str::contains("No indices"));
}

#[test]
fn test_commands_require_feature_store() {
    let temp = TempDir::new().expect("create temp dir");

    workspace_cmd(temp.path())
        .arg("indices")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Feature store not found"))
        .stderr(predicate::str::contains("resonance init"));
}

#[test]
fn test_invalid_config_fails() {
    let temp = TempDir::new().expect("create temp dir");
    let dir = temp.path();
    fs::write(dir.join("config.yaml"), "batchSize: [not, a, number]\n").expect("write config");

    workspace_cmd(dir)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[test]
fn test_help_shows_examples() {
    common::resonance_cmd()
        .args(["similar", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("EXAMPLES:"));
}
