//! Integration tests for `similar`, `similar-many` and `between`.

mod common;

use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use tempfile::TempDir;

use common::{seed_with_index, seed_workspace, workspace_cmd, GID_A, GID_B, GID_C, GID_UNKNOWN};

fn stdout_json(output: std::process::Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be JSON")
}

#[test]
fn test_similar_ids_include_placeholders_by_default() {
    let temp = TempDir::new().expect("create temp dir");
    let dir = temp.path();
    seed_with_index(dir, "mfccs");

    let output = workspace_cmd(dir)
        .args(["similar", "mfccs", GID_A, "-n", "3", "--ids", "--json"])
        .output()
        .expect("run similar");
    assert!(output.status.success());
    assert_eq!(stdout_json(output), serde_json::json!([4, 0, 2]));
}

#[test]
fn test_similar_excludes_placeholders_when_configured() {
    let temp = TempDir::new().expect("create temp dir");
    let dir = temp.path();
    seed_with_index(dir, "mfccs");
    fs::write(dir.join("config.yaml"), "placeholderPolicy: exclude\n").expect("write config");

    let output = workspace_cmd(dir)
        .args(["similar", "mfccs", GID_A, "-n", "5", "--ids", "--json"])
        .output()
        .expect("run similar");
    assert!(output.status.success());
    assert_eq!(stdout_json(output), serde_json::json!([4, 2]));
}

#[test]
fn test_similar_lists_recordings() {
    let temp = TempDir::new().expect("create temp dir");
    let dir = temp.path();
    seed_with_index(dir, "mfccs");

    workspace_cmd(dir)
        .args(["similar", "mfccs", &GID_A.to_uppercase(), "-n", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("RANK"))
        .stdout(predicate::str::contains(format!("{}:0", GID_C)))
        .stdout(predicate::str::contains(format!("{}:1", GID_A)));
}

#[test]
fn test_similar_invalid_neighbours_fall_back_to_default() {
    let temp = TempDir::new().expect("create temp dir");
    let dir = temp.path();
    seed_with_index(dir, "mfccs");

    let output = workspace_cmd(dir)
        .args(["similar", "mfccs", GID_A, "-n", "-4", "--ids", "--json"])
        .output()
        .expect("run similar");
    assert!(output.status.success());
    assert_eq!(stdout_json(output), serde_json::json!([4, 0, 2, 3]));
}

#[test]
fn test_similar_unknown_submission() {
    let temp = TempDir::new().expect("create temp dir");
    let dir = temp.path();
    seed_with_index(dir, "mfccs");

    workspace_cmd(dir)
        .args(["similar", "mfccs", &format!("{}:7", GID_A)])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No submission exists"));
}

#[test]
fn test_similar_invalid_recording_id() {
    let temp = TempDir::new().expect("create temp dir");
    let dir = temp.path();
    seed_with_index(dir, "mfccs");

    workspace_cmd(dir)
        .args(["similar", "mfccs", "not-a-uuid"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid recording identifier"));
}

#[test]
fn test_similar_unknown_metric() {
    let temp = TempDir::new().expect("create temp dir");
    let dir = temp.path();
    seed_workspace(dir);

    workspace_cmd(dir)
        .args(["similar", "loudness", GID_A])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist: `loudness`"))
        .stderr(predicate::str::contains("Known metrics"));
}

#[test]
fn test_similar_missing_index_hints_build() {
    let temp = TempDir::new().expect("create temp dir");
    let dir = temp.path();
    seed_workspace(dir);

    workspace_cmd(dir)
        .args(["similar", "bpm", GID_A, "--distance", "manhattan"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("bpm_manhattan_10"))
        .stderr(predicate::str::contains("resonance add-index bpm"));
}

#[test]
fn test_similar_many_drops_unknown_recordings() {
    let temp = TempDir::new().expect("create temp dir");
    let dir = temp.path();
    seed_with_index(dir, "mfccs");

    let ids = format!("{};{}:1;{}", GID_A, GID_A, GID_UNKNOWN);
    let output = workspace_cmd(dir)
        .args(["similar-many", "mfccs", "--recording-ids", &ids, "-n", "2", "--json"])
        .output()
        .expect("run similar-many");
    assert!(output.status.success());

    let result = stdout_json(output);
    let offsets = result[GID_A].as_object().expect("gid entry");
    assert_eq!(offsets.len(), 2);
    assert!(offsets.contains_key("0"));
    assert!(offsets.contains_key("1"));
    assert!(result.get(GID_UNKNOWN).is_none());
}

#[test]
fn test_similar_many_rejects_more_than_25() {
    let temp = TempDir::new().expect("create temp dir");
    let dir = temp.path();
    seed_with_index(dir, "mfccs");

    let ids = vec![GID_A; 26].join(";");
    workspace_cmd(dir)
        .args(["similar-many", "mfccs", "--recording-ids", &ids])
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "More than 25 recordings not allowed per request",
        ));
}

#[test]
fn test_between_reports_distance() {
    let temp = TempDir::new().expect("create temp dir");
    let dir = temp.path();
    seed_with_index(dir, "mfccs");

    let ids = format!("{};{}", GID_A, GID_C);
    let output = workspace_cmd(dir)
        .args(["between", "mfccs", "--recording-ids", &ids, "--json"])
        .output()
        .expect("run between");
    assert!(output.status.success());

    let distance = stdout_json(output)["mfccs"].as_f64().expect("mfccs distance");
    let expected = (2.0 - 2.0_f64.sqrt()).sqrt();
    assert!((distance - expected).abs() < 1e-4);
}

#[test]
fn test_between_manhattan_bpm() {
    let temp = TempDir::new().expect("create temp dir");
    let dir = temp.path();
    seed_workspace(dir);
    workspace_cmd(dir)
        .args(["add-index", "bpm", "--distance", "manhattan"])
        .assert()
        .success();

    workspace_cmd(dir)
        .args([
            "between",
            "bpm",
            "--distance",
            "manhattan",
            "--recording-ids",
            &format!("{};{}", GID_A, GID_B),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("bpm: 30.0000"));
}

#[test]
fn test_between_with_unknown_recording_is_empty() {
    let temp = TempDir::new().expect("create temp dir");
    let dir = temp.path();
    seed_workspace(dir);

    // Returns before the (missing) index is opened
    workspace_cmd(dir)
        .args([
            "between",
            "mfccs",
            "--recording-ids",
            &format!("{};{}", GID_A, GID_UNKNOWN),
            "--json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("{}"));
}

#[test]
fn test_between_requires_two_recordings() {
    let temp = TempDir::new().expect("create temp dir");
    let dir = temp.path();
    seed_with_index(dir, "mfccs");

    workspace_cmd(dir)
        .args(["between", "mfccs", "--recording-ids", GID_A])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Does not contain 2 recordings"));
}
