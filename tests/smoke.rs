//! Smoke tests -- verify the binary runs and subcommands are wired.

use assert_cmd::Command;
use predicates::prelude::*;

fn linkwatch() -> Command {
    let mut cmd = Command::cargo_bin("linkwatch").unwrap();
    cmd.env_remove("LINKWATCH_CONFIG");
    cmd
}

#[test]
fn test_cli_help() {
    linkwatch()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Home-network health monitor"));
}

#[test]
fn test_cli_version() {
    linkwatch()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("linkwatch"));
}

#[test]
fn test_subcommands_exist() {
    for sub in ["serve", "ping", "speed-test", "check-config"] {
        linkwatch().args([sub, "--help"]).assert().success();
    }
}

#[test]
fn test_check_config_prints_effective_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("linkwatch.toml");
    std::fs::write(
        &path,
        "[monitor]\nping_interval_secs = 30\n\n[debug_server]\nenabled = true\n",
    )
    .unwrap();

    linkwatch()
        .args(["check-config", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("ping_interval_secs = 30"))
        .stdout(predicate::str::contains("network_interval_minutes = 1"));
}

#[test]
fn test_check_config_rejects_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("linkwatch.toml");
    std::fs::write(&path, "[metrics]\nengine = \"influx\"\n").unwrap();

    linkwatch()
        .args(["check-config", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("influx"));
}

#[test]
fn test_missing_config_file_fails() {
    linkwatch()
        .args(["check-config", "--config", "/nonexistent/linkwatch.toml"])
        .assert()
        .failure();
}
