//! Tests for the `respec` binary's agent contract: JSON on stdout, exit
//! code by error category.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

fn respec(project: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_respec"))
        .arg("--project")
        .arg(project)
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).unwrap()
}

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    let spec = dir.path().join("spec");
    fs::create_dir_all(&spec).unwrap();
    fs::write(spec.join("a_spec.rb"), "it { be_close(1.0, 0.1) }").unwrap();
    fs::write(
        spec.join("a_spec.rb.sexp"),
        "(block @0..25 (send @0..2 nil :it) (args) \
         (send @5..23 nil :be_close (float @14..17 1.0) (float @19..22 0.1)))",
    )
    .unwrap();
    dir
}

#[test]
fn convert_prints_response() {
    let dir = project();
    let output = respec(
        dir.path(),
        &["convert", "--dry-run", "--no-dynamic", "--ast-source", "dump-file"],
    );
    assert!(output.status.success());
    let response = json(&output);
    assert_eq!(response["status"], "ok");
    assert_eq!(response["dry_run"], true);
    assert_eq!(response["files"][0]["path"], "spec/a_spec.rb");
    assert_eq!(response["files"][0]["conversions"][0]["rule"], "be_close");
    assert_eq!(response["summary"]["changed"], 1);
    assert_eq!(
        fs::read_to_string(dir.path().join("spec/a_spec.rb")).unwrap(),
        "it { be_close(1.0, 0.1) }"
    );
}

#[test]
fn convert_writes_without_dry_run() {
    let dir = project();
    let output = respec(
        dir.path(),
        &["convert", "--no-dynamic", "--ast-source", "dump-file", "spec"],
    );
    assert!(output.status.success());
    assert_eq!(
        fs::read_to_string(dir.path().join("spec/a_spec.rb")).unwrap(),
        "it { be_within(0.1).of(1.0) }"
    );
}

#[test]
fn unknown_rule_exits_with_invalid_arguments() {
    let dir = project();
    let output = respec(
        dir.path(),
        &["convert", "--rules", "its", "--ast-source", "dump-file"],
    );
    assert_eq!(output.status.code(), Some(2));
    let response = json(&output);
    assert_eq!(response["status"], "error");
    assert_eq!(response["error"]["code"], 2);
}

#[test]
fn missing_path_exits_with_resolution_error() {
    let dir = project();
    let output = respec(
        dir.path(),
        &["convert", "--no-dynamic", "--ast-source", "dump-file", "spec/nope_spec.rb"],
    );
    assert_eq!(output.status.code(), Some(3));
    assert_eq!(json(&output)["error"]["code"], 3);
}

#[test]
fn bad_config_exits_with_invalid_arguments() {
    let dir = project();
    fs::create_dir_all(dir.path().join(".respec")).unwrap();
    fs::write(
        dir.path().join(".respec/config.toml"),
        "[analysis]\ntimeout_secs = 0\n",
    )
    .unwrap();
    let output = respec(dir.path(), &["convert", "--ast-source", "dump-file"]);
    assert_eq!(output.status.code(), Some(2));
}
