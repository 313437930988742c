//! Integration tests for the `quill` binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn quill(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_quill"))
        .args(args)
        .args(["--color", "never"])
        .env_remove("QUILL_LOG")
        .output()
        .expect("failed to run quill")
}

fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ────────────────────────────────────────────────────────────────────────────
// run
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_run_prints_result() {
    let dir = tempfile::tempdir().unwrap();
    let script = write(dir.path(), "sum.qs", "int a = 1;\nint b = 2;\nreturn a + b;");
    let output = quill(&["run", script.to_str().unwrap()]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output).trim(), "3");
}

#[test]
fn test_run_with_params_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let script = write(dir.path(), "echo.qs", "List l = new ArrayList(); l.add(params.get('x')); return l;");
    let output = quill(&["run", script.to_str().unwrap(), "--params", r#"{"x": 7}"#, "--json"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let value: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(value, serde_json::json!([7]));
}

#[test]
fn test_run_reports_script_exception() {
    let dir = tempfile::tempdir().unwrap();
    let script = write(dir.path(), "fail.qs", "int zero = params.get('z');\nreturn 1 / zero;");
    let output = quill(&["run", script.to_str().unwrap(), "--params", r#"{"z": 0}"#]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("ArithmeticException"), "{}", stderr(&output));
}

#[test]
fn test_config_file_sets_loop_budget() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(dir.path(), "quill.toml", "max_loop_counter = 5\n");
    let script = write(dir.path(), "loop.qs", "int s = 0; for (int i = 0; i < 50; i++) { s += i; } return s;");
    let output = quill(&["run", script.to_str().unwrap(), "--config", config.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("TooManyOperationsError"), "{}", stderr(&output));

    let output = quill(&[
        "run",
        script.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
        "--max-loop-counter",
        "0",
    ]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output).trim(), "1225");
}

// ────────────────────────────────────────────────────────────────────────────
// check
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_check_accepts_valid_scripts() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(dir.path(), "a.qs", "return 1;");
    let b = write(dir.path(), "b.qs", "int f() { return 2; } return f();");
    let output = quill(&["check", a.to_str().unwrap(), b.to_str().unwrap()]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output).lines().filter(|l| l.starts_with("ok")).count(), 2);
}

#[test]
fn test_check_renders_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let script = write(dir.path(), "bad.qs", "int x = 1;\nreturn y;");
    let output = quill(&["check", script.to_str().unwrap()]);
    assert!(!output.status.success());
    let err = stderr(&output);
    assert!(err.contains("Q2001"), "{}", err);
    assert!(err.contains("bad.qs"), "{}", err);
}

#[test]
fn test_check_json_format() {
    let dir = tempfile::tempdir().unwrap();
    let script = write(dir.path(), "bad.qs", "int x = 1;\nreturn y;");
    let output = quill(&["check", script.to_str().unwrap(), "--format", "json"]);
    assert!(!output.status.success());
    let diagnostics: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let first = &diagnostics[0];
    assert_eq!(first["code"], "Q2001");
    assert_eq!(first["labels"][0]["start_line"], 2);
}

// ────────────────────────────────────────────────────────────────────────────
// ir
// ────────────────────────────────────────────────────────────────────────────

#[test]
fn test_ir_bytecode_listing() {
    let dir = tempfile::tempdir().unwrap();
    let script = write(dir.path(), "sum.qs", "int a = 1;\nreturn a + 2;");
    let output = quill(&["ir", script.to_str().unwrap(), "--bytecode"]);
    assert!(output.status.success(), "{}", stderr(&output));
    let listing = stdout(&output);
    assert!(listing.contains("fn #"), "{}", listing);
    assert!(listing.contains("TRANSLATE"), "{}", listing);
}

#[test]
fn test_emitted_unit_runs() {
    let dir = tempfile::tempdir().unwrap();
    let script = write(dir.path(), "sum.qs", "int a = 1;\nint b = 2;\nreturn a + b;");
    let unit = dir.path().join("sum.qbc");
    let output = quill(&["ir", script.to_str().unwrap(), "--bytecode", "--emit", unit.to_str().unwrap()]);
    assert!(output.status.success(), "{}", stderr(&output));

    let output = quill(&["run", unit.to_str().unwrap()]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output).trim(), "3");
}
