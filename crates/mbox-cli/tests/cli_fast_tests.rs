//! Fast CLI tests using assert_cmd.
//! These test the binary directly without needing a container runtime.

#![allow(deprecated)] // assert_cmd::Command::cargo_bin is deprecated but works fine

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_help_flag() {
    Command::cargo_bin("mbox")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Minecraft server instance manager"));
}

#[test]
fn test_version_flag() {
    Command::cargo_bin("mbox")
        .unwrap()
        .arg("--version")
        .assert()
        .success();
}

#[test]
fn test_subcommand_help() {
    for subcmd in &[
        "create", "list", "status", "start", "stop", "rm", "exec", "players", "properties",
        "config",
    ] {
        Command::cargo_bin("mbox")
            .unwrap()
            .args([subcmd, "--help"])
            .assert()
            .success()
            .stdout(predicate::str::is_empty().not());
    }
}

#[test]
fn test_unknown_subcommand_fails() {
    Command::cargo_bin("mbox")
        .unwrap()
        .arg("nonexistent-subcommand")
        .assert()
        .failure();
}

#[test]
fn test_create_requires_version() {
    Command::cargo_bin("mbox")
        .unwrap()
        .args(["create", "alpha"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--version"));
}

#[test]
fn test_exec_requires_command() {
    Command::cargo_bin("mbox")
        .unwrap()
        .args(["exec", "alpha"])
        .assert()
        .failure();
}

#[test]
fn test_config_shows_defaults() {
    let tmp = tempfile::tempdir().unwrap();
    Command::cargo_bin("mbox")
        .unwrap()
        .arg("config")
        .env("MBOX_CONFIG", tmp.path().join("config.toml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("port_start = 25565"))
        .stdout(predicate::str::contains("not created yet"));
}

#[test]
fn test_config_shows_existing_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.toml");
    std::fs::write(&path, "[instances]\nport_start = 30000\nport_end = 30010\n").unwrap();
    Command::cargo_bin("mbox")
        .unwrap()
        .arg("config")
        .env("MBOX_CONFIG", &path)
        .assert()
        .success()
        .stdout(predicate::str::contains("port_start = 30000"));
}

#[test]
fn test_invalid_config_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("config.toml");
    std::fs::write(&path, "[instances]\nport_start = 30010\nport_end = 30000\n").unwrap();
    Command::cargo_bin("mbox")
        .unwrap()
        .arg("list")
        .env("MBOX_CONFIG", &path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("port range"));
}
