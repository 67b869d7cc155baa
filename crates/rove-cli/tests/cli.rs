//! Binary-level tests for the `rove` executable.

use assert_cmd::Command;
use predicates::prelude::*;
use serial_test::serial;
use std::fs;
use tempfile::TempDir;

fn rove() -> Command {
    Command::cargo_bin("rove").unwrap()
}

#[test]
fn test_help_lists_serve() {
    rove()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"));
}

#[test]
fn test_serve_help_lists_options() {
    rove()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--proxy-config"))
        .stdout(predicate::str::contains("--live-reload"))
        .stdout(predicate::str::contains("--ssl-key"));
}

#[test]
fn test_version() {
    rove()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("rove"));
}

#[test]
#[serial]
fn test_ssl_without_key_fails() {
    let temp = TempDir::new().unwrap();

    rove()
        .current_dir(temp.path())
        .args(["serve", "--ssl", "--port", "0"])
        .env_remove("PORT")
        .assert()
        .failure()
        .stderr(predicate::str::contains("TLS"));
}

#[test]
#[serial]
fn test_invalid_proxy_config_fails() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("proxy.json"), "{ not json").unwrap();

    rove()
        .current_dir(temp.path())
        .args(["serve", "--proxy-config", "proxy.json", "--port", "0"])
        .env_remove("PORT")
        .assert()
        .failure()
        .stderr(predicate::str::contains("proxy"));
}

#[test]
fn test_verbose_and_quiet_conflict() {
    rove()
        .args(["--verbose", "--quiet", "serve"])
        .assert()
        .failure();
}
