//! End-to-end CLI tests: drives the built `cache-sim` binary against
//! scratch trace/config files and checks exit codes and output shape.

use std::io::Write;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::NamedTempFile;

fn trace_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

fn config_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::with_suffix(".json").unwrap();
    write!(file, "{contents}").unwrap();
    file
}

#[test]
fn runs_sequential_trace_and_prints_summary() {
    let trace = trace_file("r 0x1000\nr 0x1040\nw 0x2000\n");
    let mut cmd = Command::cargo_bin("cache-sim").unwrap();
    cmd.arg(trace.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("accesses: 3"))
        .stdout(predicate::str::contains("L1:"));
}

#[test]
fn missing_trace_file_exits_with_io_error_code() {
    let mut cmd = Command::cargo_bin("cache-sim").unwrap();
    cmd.arg("/nonexistent/path/to/trace.txt").assert().failure().code(2);
}

#[test]
fn invalid_config_exits_with_configuration_error_code() {
    let trace = trace_file("r 0x1000\n");
    let config = config_file(r#"{ "l1": { "size": 100, "associativity": 1, "block_size": 64 } }"#);
    let mut cmd = Command::cargo_bin("cache-sim").unwrap();
    cmd.arg(trace.path())
        .arg("-c")
        .arg(config.path())
        .assert()
        .failure()
        .code(1);
}

#[test]
fn visualize_flag_prints_ascii_chart() {
    let trace = trace_file("r 0x1000\nr 0x1040\nr 0x1080\n");
    let mut cmd = Command::cargo_bin("cache-sim").unwrap();
    cmd.arg(trace.path())
        .arg("--visualize")
        .assert()
        .success()
        .stdout(predicate::str::contains("hit rate by level"));
}

#[test]
fn export_writes_csv_with_metric_value_header() {
    let trace = trace_file("r 0x1000\nr 0x1040\n");
    let export = NamedTempFile::new().unwrap();
    let mut cmd = Command::cargo_bin("cache-sim").unwrap();
    cmd.arg(trace.path())
        .arg("-e")
        .arg(export.path())
        .assert()
        .success();
    let contents = std::fs::read_to_string(export.path()).unwrap();
    assert!(contents.starts_with("metric,value"));
}

#[test]
fn parallel_flag_runs_to_completion() {
    let lines: String = (0..200).map(|i| format!("r {:#x}\n", i * 64)).collect();
    let trace = trace_file(&lines);
    let mut cmd = Command::cargo_bin("cache-sim").unwrap();
    cmd.arg(trace.path())
        .arg("-p")
        .arg("4")
        .assert()
        .success()
        .stdout(predicate::str::contains("accesses: 200"));
}
