//! CLI end-to-end tests
//!
//! Tests for the recforge command-line interface against a throwaway
//! database and artifact directory.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::{tempdir, TempDir};

/// Get a command for the recforge binary
#[allow(deprecated)]
fn recforge_cmd() -> Command {
    Command::cargo_bin("recforge").unwrap()
}

/// Write a config that keeps all state under `dir`.
fn write_config(dir: &Path) -> PathBuf {
    let config = serde_json::json!({
        "database": { "path": dir.join("recforge.db") },
        "storage": { "root": dir.join("artifacts") },
    });
    let path = dir.join("config.json");
    fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
    path
}

/// Import a small fake recording and return the new job's ID.
fn import_recording(dir: &TempDir, config: &Path) -> String {
    let recording = dir.path().join("standup.webm");
    fs::write(&recording, b"not really webm").unwrap();

    let output = recforge_cmd()
        .arg("--config")
        .arg(config)
        .arg("import")
        .arg(&recording)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).unwrap();
    stdout
        .lines()
        .find_map(|line| line.strip_prefix("Queued job "))
        .and_then(|rest| rest.split_whitespace().next())
        .map(str::to_string)
        .unwrap_or_else(|| panic!("no job ID in output: {stdout}"))
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = recforge_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_flag() {
    let mut cmd = recforge_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("recforge"));
}

#[test]
fn test_cli_check_tools_command() {
    let mut cmd = recforge_cmd();
    cmd.arg("check-tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("ffmpeg"));
}

#[test]
fn test_cli_validate_reports_settings() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());

    recforge_cmd()
        .arg("validate")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Retry: 3 attempts"));
}

#[test]
fn test_cli_validate_rejects_malformed_config() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("broken.json");
    fs::write(&config, "{ not json").unwrap();

    recforge_cmd()
        .arg("validate")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("config parse error"));
}

#[test]
fn test_cli_import_then_status() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());
    let job_id = import_recording(&dir, &config);

    // The upload landed in the artifact store.
    let uploads = dir.path().join("artifacts/uploads");
    assert!(uploads.is_dir());

    let output = recforge_cmd()
        .arg("--config")
        .arg(&config)
        .args(["status", &job_id, "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["id"], job_id.as_str());
    assert_eq!(summary["status"], "pending");
    assert_eq!(summary["current_stage"], "convert");

    recforge_cmd()
        .arg("--config")
        .arg(&config)
        .args(["status", "--status", "pending"])
        .assert()
        .success()
        .stdout(predicate::str::contains(job_id.as_str()));

    recforge_cmd()
        .arg("--config")
        .arg(&config)
        .args(["steps", &job_id, "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn test_cli_retry_rejects_live_job() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());
    let job_id = import_recording(&dir, &config);

    recforge_cmd()
        .arg("--config")
        .arg(&config)
        .args(["retry", &job_id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("only failed jobs can be retried"));
}

#[test]
fn test_cli_status_unknown_job() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());

    recforge_cmd()
        .arg("--config")
        .arg(&config)
        .args(["status", "00000000-0000-0000-0000-000000000000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_cli_submit_rejects_escaping_key() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());

    recforge_cmd()
        .arg("--config")
        .arg(&config)
        .args(["submit", "../etc/passwd"])
        .assert()
        .failure();
}
