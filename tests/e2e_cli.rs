//! CLI end-to-end tests
//!
//! Tests for the camrelay command-line interface.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the camrelay binary
#[allow(deprecated)]
fn camrelay_cmd() -> Command {
    Command::cargo_bin("camrelay").unwrap()
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = camrelay_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = camrelay_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("camrelay"))
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_flag() {
    let mut cmd = camrelay_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("camrelay"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = camrelay_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_check_tools_command() {
    let temp = tempdir().unwrap();
    let mut cmd = camrelay_cmd();
    cmd.current_dir(temp.path())
        .arg("check-tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("ffmpeg"));
}

#[test]
fn test_cli_play_help() {
    let mut cmd = camrelay_cmd();
    cmd.args(["play", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--front"))
        .stdout(predicate::str::contains("--rear"));
}

#[test]
fn test_cli_play_requires_front() {
    let mut cmd = camrelay_cmd();
    cmd.arg("play")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--front"));
}

#[test]
fn test_cli_play_rejects_unknown_camera() {
    let mut cmd = camrelay_cmd();
    cmd.args(["play", "--front", "rtsp://cam1/live", "--camera", "side"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("side"));
}

#[test]
fn test_cli_validate_config() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("config.toml");

    fs::write(
        &config_file,
        r#"
[server]
host = "127.0.0.1"
port = 8090

[conversion]
switch_policy = "always_restart"
"#,
    )
    .unwrap();

    let mut cmd = camrelay_cmd();
    cmd.args(["validate", config_file.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid"))
        .stdout(predicate::str::contains("127.0.0.1:8090"))
        .stdout(predicate::str::contains("AlwaysRestart"));
}

#[test]
fn test_cli_validate_without_config_uses_defaults() {
    let mut cmd = camrelay_cmd();
    cmd.arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("using defaults"));
}

#[test]
fn test_cli_invalid_config() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("invalid.toml");

    fs::write(&config_file, "this is not valid toml {{{{").unwrap();

    let mut cmd = camrelay_cmd();
    cmd.args(["validate", config_file.to_str().unwrap()])
        .assert()
        .failure();
}

#[test]
fn test_cli_zero_port_config_is_rejected() {
    let temp = tempdir().unwrap();
    let config_file = temp.path().join("config.toml");

    fs::write(&config_file, "[server]\nport = 0\n").unwrap();

    let mut cmd = camrelay_cmd();
    cmd.args(["--config", config_file.to_str().unwrap(), "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("port"));
}
