//! E2E tests for the refwatch CLI

#![allow(deprecated)] // cargo_bin deprecation - will update when assert_cmd stabilizes replacement

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn refwatch() -> Command {
    let mut cmd = Command::cargo_bin("refwatch").unwrap();
    cmd.env_remove("GITHUB_TOKEN").env_remove("RUST_LOG");
    cmd
}

fn write_sources(dir: &Path) {
    fs::create_dir_all(dir.join("src")).unwrap();
    fs::write(
        dir.join("src/main.rs"),
        "// Workaround for https://github.com/octo/widgets/issues/7\nfn main() {}\n",
    )
    .unwrap();
}

#[test]
fn test_help() {
    refwatch()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("scan"))
        .stdout(predicate::str::contains("init"));
}

#[test]
fn test_version() {
    refwatch()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("refwatch"));
}

#[test]
fn test_check_help() {
    refwatch()
        .args(["check", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--dry-run"))
        .stdout(predicate::str::contains("--github-token"));
}

#[test]
fn test_missing_config() {
    let dir = tempdir().unwrap();
    refwatch()
        .current_dir(dir.path())
        .arg("scan")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("No config file"));
}

#[test]
fn test_init_refuses_overwrite() {
    let dir = tempdir().unwrap();

    refwatch()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("refwatch.yaml"));
    assert!(dir.path().join("refwatch.yaml").exists());

    refwatch()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stdout(predicate::str::contains("file_exists"));
}

#[test]
fn test_scan_exit_codes() {
    let dir = tempdir().unwrap();
    write_sources(dir.path());
    fs::write(dir.path().join("refwatch.yaml"), "sources: [\"src/**/*.rs\"]\n").unwrap();

    refwatch()
        .current_dir(dir.path())
        .arg("scan")
        .assert()
        .code(3)
        .stdout(predicate::str::contains("\"source_changed\":true"));

    let status = fs::read_to_string(dir.path().join("refwatch.status.yaml")).unwrap();
    assert!(status.contains("repo: octo/widgets"));

    refwatch()
        .current_dir(dir.path())
        .arg("scan")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"source_changed\":false"));
}

#[test]
fn test_scan_dry_run_leaves_status_alone() {
    let dir = tempdir().unwrap();
    write_sources(dir.path());
    let config = dir.path().join("custom.yaml");
    fs::write(&config, "sources: [\"src/**/*.rs\"]\nstatus_file: state.yaml\n").unwrap();

    refwatch()
        .args(["scan", "--dry-run", "--config"])
        .arg(&config)
        .assert()
        .code(3);
    assert!(!dir.path().join("state.yaml").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_check_against_mock_api() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/repos/octo/widgets/issues/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "number": 7,
            "updated_at": "2024-06-01T08:00:00Z"
        })))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    write_sources(dir.path());
    fs::write(
        dir.path().join("refwatch.yaml"),
        format!(
            "sources: [\"src/**/*.rs\"]\ngithub:\n  api_url: {}\nstackexchange:\n  enabled: false\n",
            server.uri()
        ),
    )
    .unwrap();

    refwatch()
        .current_dir(dir.path())
        .arg("check")
        .assert()
        .code(3)
        .stdout(predicate::str::contains("\"items_changed\":true"));

    let status = fs::read_to_string(dir.path().join("refwatch.status.yaml")).unwrap();
    assert!(status.contains("2024-06-01T08:00:00Z"));

    refwatch()
        .current_dir(dir.path())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"items_changed\":false"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_check_remote_failure_exits_with_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let dir = tempdir().unwrap();
    write_sources(dir.path());
    fs::write(
        dir.path().join("refwatch.yaml"),
        format!("sources: [\"src/**/*.rs\"]\ngithub:\n  api_url: {}\n", server.uri()),
    )
    .unwrap();

    refwatch()
        .current_dir(dir.path())
        .arg("check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("500"));
    assert!(!dir.path().join("refwatch.status.yaml").exists());
}
