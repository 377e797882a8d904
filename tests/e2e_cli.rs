//! CLI end-to-end tests
//!
//! These exercise argument handling and early failures; none of them needs
//! ffmpeg to be installed.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the transcode-bench binary
#[allow(deprecated)]
fn bench_cmd() -> Command {
    Command::cargo_bin("transcode-bench").unwrap()
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = bench_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = bench_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("transcode-bench"))
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_flag() {
    let mut cmd = bench_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("transcode-bench"));
}

#[test]
fn test_cli_run_help() {
    let mut cmd = bench_cmd();
    cmd.args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("batch-size sweep"))
        .stdout(predicate::str::contains("--batch-sizes"))
        .stdout(predicate::str::contains("--gpu"));
}

#[test]
fn test_cli_check_tools_command() {
    let mut cmd = bench_cmd();
    cmd.arg("check-tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("ffmpeg"))
        .stdout(predicate::str::contains("ffprobe"));
}

#[test]
fn test_cli_run_missing_input_fails() {
    let dir = tempdir().unwrap();
    let mut cmd = bench_cmd();
    cmd.current_dir(dir.path())
        .args(["run", "--input", "does_not_exist.mp4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Input file does not exist"));
    assert!(!dir.path().join("output").exists());
}

#[test]
fn test_cli_probe_missing_file_fails() {
    let mut cmd = bench_cmd();
    cmd.args(["probe", "/nonexistent/clip.mp4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_cli_plan_missing_file_fails() {
    let mut cmd = bench_cmd();
    cmd.args(["plan", "/nonexistent/clip.mp4"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_cli_rejects_zero_batch_size() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input.mp4");
    fs::write(&input, b"not really a video").unwrap();

    let mut cmd = bench_cmd();
    cmd.current_dir(dir.path())
        .args(["run", "--batch-sizes", "2,0,5"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("batch_sizes contains 0"));
}

#[test]
fn test_cli_invalid_config_fails() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.json");
    fs::write(&config, "{ not json").unwrap();

    let mut cmd = bench_cmd();
    cmd.arg("--config")
        .arg(&config)
        .arg("check-tools")
        .assert()
        .failure();
}

#[test]
fn test_cli_config_limits_are_validated() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.json");
    fs::write(&config, r#"{"limits": {"dimension_limit": 0}}"#).unwrap();
    let input = dir.path().join("input.mp4");
    fs::write(&input, b"x").unwrap();

    let mut cmd = bench_cmd();
    cmd.current_dir(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("dimension_limit"));
}
