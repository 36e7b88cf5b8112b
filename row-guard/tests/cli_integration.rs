//! Runs the `row-guard` binary against files in a temporary directory.

use serde_json::Value;
use std::fs;
use std::process::{Command, Output};
use tempfile::TempDir;

const RULES: &str = r#"{
    "columns": {
        "email": {"type": "str", "required": true, "regex": "[^@]+@[^@]+"},
        "age": {"type": "int"}
    },
    "unique_constraints": ["email"],
    "unique_mode": "keep_first"
}"#;

fn run_cli(dir: &TempDir, input: &str, contents: &str, extra: &[&str]) -> Output {
    let input_path = dir.path().join(input);
    let rules_path = dir.path().join("rules.json");
    fs::write(&input_path, contents).unwrap();
    fs::write(&rules_path, RULES).unwrap();

    Command::new(env!("CARGO_BIN_EXE_row-guard"))
        .arg("--input")
        .arg(&input_path)
        .arg("--rules")
        .arg(&rules_path)
        .arg("--out")
        .arg(dir.path().join("out"))
        .args(extra)
        .env_remove("ROW_GUARD_CHUNK_SIZE")
        .env_remove("ROW_GUARD_WORKERS")
        .output()
        .unwrap()
}

fn artifacts(dir: &TempDir) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir.path().join("out"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[test]
fn clean_file_exits_zero_and_writes_artifacts() {
    let dir = TempDir::new().unwrap();
    let output = run_cli(
        &dir,
        "people.csv",
        "Email,Age\na@x.com,30\nb@x.com,41\n",
        &["--chunk-size", "1", "--workers", "2"],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let summary: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["status"], "completed");
    assert_eq!(summary["success_count"], 2);

    let names = artifacts(&dir);
    assert_eq!(names.len(), 2);
    assert!(names[0].ends_with("_PASS.json"));
    assert!(names[1].ends_with("_PASS.xlsx"));
}

#[test]
fn failing_rows_exit_one() {
    let dir = TempDir::new().unwrap();
    let output = run_cli(
        &dir,
        "people.csv",
        "Email,Age\na@x.com,30\na@x.com,old\nnot-an-email,5\n",
        &[],
    );
    assert_eq!(output.status.code(), Some(1));

    let summary: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["failure_count"], 2);
    let json_name = artifacts(&dir)
        .into_iter()
        .find(|name| name.ends_with("_FAIL.json"))
        .unwrap();
    let rows: Value = serde_json::from_slice(&fs::read(dir.path().join("out").join(json_name)).unwrap()).unwrap();
    assert_eq!(rows[1]["Remarks"], "age invalid int, Duplicate based on email");
    assert_eq!(rows[2]["Remarks"], "email does not match pattern");
}

#[test]
fn unsupported_input_exits_two() {
    let dir = TempDir::new().unwrap();
    let output = run_cli(&dir, "people.pdf", "%PDF-1.4", &[]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unsupported format"));
}

#[test]
fn zero_workers_is_rejected() {
    let dir = TempDir::new().unwrap();
    let output = run_cli(&dir, "people.csv", "Email\na@x.com\n", &["--workers", "0"]);
    assert_eq!(output.status.code(), Some(2));
}
