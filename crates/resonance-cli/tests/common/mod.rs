//! Shared test utilities for resonance-cli integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::Path;

use assert_cmd::Command;

pub const GID_A: &str = "0dad432b-16cc-4bf0-8961-fd31d124b01b";
pub const GID_B: &str = "c5f4909e-1d7b-4f15-a6f6-1af376bc01c9";
pub const GID_C: &str = "7f27d7a9-27f0-4663-9d20-2c9c40200e6d";

/// A valid UUID with no submission.
pub const GID_UNKNOWN: &str = "11111111-2222-4333-8444-555555555555";

/// Four submissions: A:0, A:1 and C:0 carry mfccs, B:0 only bpm.
///
/// Internal ids follow insertion order (1..=4), so the mfccs index holds
/// placeholders for ids 0 and 3.
pub const FEATURES: &str = r#"{"gid": "0dad432b-16cc-4bf0-8961-fd31d124b01b", "offset": 0, "features": {"mfccs": [1.0, 0.0, 0.0], "bpm": [120.0]}}
{"gid": "0dad432b-16cc-4bf0-8961-fd31d124b01b", "offset": 1, "features": {"mfccs": [0.0, 1.0, 0.0], "bpm": [128.0]}}
{"gid": "c5f4909e-1d7b-4f15-a6f6-1af376bc01c9", "offset": 0, "features": {"bpm": [90.0]}}
{"gid": "7f27d7a9-27f0-4663-9d20-2c9c40200e6d", "offset": 0, "features": {"mfccs": [1.0, 1.0, 0.0], "bpm": [100.0]}}
"#;

/// Get a Command for the resonance binary.
///
/// # Panics
///
/// Panics if the resonance binary cannot be found.
#[allow(deprecated)]
pub fn resonance_cmd() -> Command {
    Command::cargo_bin("resonance").expect("resonance binary should exist")
}

/// A command running in `dir`, isolated from the user's global config.
pub fn workspace_cmd(dir: &Path) -> Command {
    let mut cmd = resonance_cmd();
    cmd.current_dir(dir)
        .env("RESONANCE_CONFIG", dir.join("config.yaml"))
        .env_remove("RESONANCE_DATABASE")
        .env_remove("RESONANCE_INDEX_DIR")
        .env("NO_COLOR", "1");
    cmd
}

/// Run `init` and import [`FEATURES`] into `dir`.
pub fn seed_workspace(dir: &Path) {
    workspace_cmd(dir).arg("init").assert().success();

    let features = dir.join("features.jsonl");
    fs::write(&features, FEATURES).expect("write features");
    workspace_cmd(dir)
        .args(["import", "features.jsonl"])
        .assert()
        .success();
}

/// Seed `dir` and build the `metric` index with default parameters.
pub fn seed_with_index(dir: &Path, metric: &str) {
    seed_workspace(dir);
    workspace_cmd(dir)
        .args(["add-index", metric])
        .assert()
        .success();
}
