//! CLI test cases.
//!
//! Anything that talks to AWS is `#[ignore]`d. To run those, set up AWS
//! credentials, fill in `tests/fixtures/config.toml` with a real bucket, work
//! team and role, and run `cargo test -- --ignored`.

use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;

/// Create a new `Command` with our binary.
fn cmd() -> Command {
    Command::cargo_bin("form-review").unwrap()
}

#[test]
fn test_help() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("resume"));
}

#[test]
fn test_version() {
    cmd().arg("--version").assert().success();
}

#[test]
fn test_template() {
    cmd()
        .arg("template")
        .assert()
        .success()
        .stdout(predicate::str::contains("crowd-form"))
        .stdout(predicate::str::contains("grant_read_access"));
}

#[test]
fn test_template_to_file() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("task.liquid.html");
    cmd().arg("template").arg("-o").arg(&path).assert().success();
    let template = std::fs::read_to_string(&path).unwrap();
    assert!(template.contains("crowd-form"));
}

#[test]
fn test_schemas() {
    for schema_type in [
        "Config",
        "DocumentAnalysisResult",
        "ReviewTask",
        "PersistedRecord",
    ] {
        cmd()
            .arg("schema")
            .arg(schema_type)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"properties\""));
    }
}

#[test]
fn test_unknown_schema_rejected() {
    cmd().arg("schema").arg("Nope").assert().failure();
}

#[test]
fn test_run_with_missing_config_fails() {
    let tmp = tempfile::tempdir().unwrap();
    cmd()
        .arg("run")
        .arg("tests/fixtures/form.png")
        .arg("--config")
        .arg(tmp.path().join("missing.toml"))
        .arg("--run-dir")
        .arg(tmp.path().join("run"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.toml"));
}

#[test]
fn test_invalid_config_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let config = tmp.path().join("config.toml");
    std::fs::write(
        &config,
        "[storage]\nbucket = \"\"\n\n[review]\nworkforce_arn = \"a\"\nrole_arn = \"b\"\n",
    )
    .unwrap();
    cmd()
        .arg("setup")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("storage.bucket"));
}

#[test]
fn test_resume_without_run_dir_fails() {
    let tmp = tempfile::tempdir().unwrap();
    cmd()
        .arg("resume")
        .arg("--config")
        .arg("tests/fixtures/config.toml")
        .arg("--run-dir")
        .arg(tmp.path().join("never-created"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
#[ignore = "Needs AWS credentials and a configured work team"]
fn test_setup_aws() {
    cmd()
        .arg("setup")
        .arg("--config")
        .arg("tests/fixtures/config.toml")
        .assert()
        .success()
        .stdout(predicate::str::contains("flow-definition"));
}

#[test]
#[ignore = "Needs AWS credentials"]
fn test_analyze_aws() {
    let tmp = tempfile::tempdir().unwrap();
    cmd()
        .arg("analyze")
        .arg("tests/fixtures/form.png")
        .arg("--config")
        .arg("tests/fixtures/config.toml")
        .arg("--run-dir")
        .arg(tmp.path())
        .assert()
        .success();
    assert!(tmp.path().join("header.csv").exists());
    assert!(tmp.path().join("line_items.csv").exists());
}
