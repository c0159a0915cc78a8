//! End-to-end tests of the `qjs` binary using `assert_cmd`
#![cfg_attr(
    test,
    allow(
        dead_code,
        clippy::expect_used,
        clippy::unwrap_used,
        clippy::panic,
        clippy::missing_panics_doc,
        clippy::missing_errors_doc,
        clippy::print_stdout,
        clippy::print_stderr,
        clippy::tests_outside_test_module,
        reason = "Test allows"
    )
)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to get cargo binary or fail test
fn cargo_bin() -> Command {
    Command::cargo_bin("qjs").unwrap_or_else(|err| panic!("Binary not found: {err}"))
}

/// Helper to create temp dir or fail test
fn temp_dir() -> TempDir {
    TempDir::new().unwrap_or_else(|err| panic!("Failed to create temp dir: {err}"))
}

#[test]
fn test_cli_help() {
    cargo_bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage"))
        .stdout(predicate::str::contains("--eval"));
}

#[test]
fn test_eval_prints_result() {
    cargo_bin()
        .args(["-e", "1 + 1"])
        .assert()
        .success()
        .stdout("2\n");
}

#[test]
fn test_eval_undefined_prints_nothing() {
    cargo_bin()
        .args(["-e", "void 0"])
        .assert()
        .success()
        .stdout("");
}

#[test]
fn test_console_output() {
    cargo_bin()
        .args(["-e", "console.log('hello', 42, [1, 2]); console.error('oops')"])
        .assert()
        .success()
        .stdout("hello 42 [1, 2]\n")
        .stderr(predicate::str::contains("oops"));
}

#[test]
fn test_top_level_await_with_sleep() {
    cargo_bin()
        .args(["-e", "await sleep(10); 'done'"])
        .assert()
        .success()
        .stdout("done\n");
}

#[test]
fn test_script_error_fails() {
    cargo_bin()
        .args(["-e", "throw new Error('bad')"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error: bad"));
}

#[test]
fn test_run_script_file() {
    let temp = temp_dir();
    let script = temp.path().join("main.js");
    fs::write(&script, "const total = [1, 2, 3].reduce((a, b) => a + b);\nconsole.log(`total=${total}`);\n")
        .expect("Failed to write script");

    cargo_bin()
        .arg(&script)
        .assert()
        .success()
        .stdout("total=6\n");
}

#[test]
fn test_run_module_file() {
    let temp = temp_dir();
    let script = temp.path().join("main.mjs");
    fs::write(&script, "await sleep(1);\nconsole.log(typeof import.meta);\n")
        .expect("Failed to write script");

    cargo_bin()
        .arg("--module")
        .arg(&script)
        .assert()
        .success()
        .stdout("object\n");
}

#[test]
fn test_compile_then_run_bytecode() {
    let temp = temp_dir();
    let script = temp.path().join("answer.js");
    let bytecode = temp.path().join("answer.bin");
    fs::write(&script, "console.log(6 * 7);\n").expect("Failed to write script");

    cargo_bin()
        .arg(&script)
        .arg("--compile")
        .arg(&bytecode)
        .assert()
        .success()
        .stdout("");
    assert!(bytecode.exists(), "Bytecode file should be written");

    cargo_bin()
        .arg("--bytecode")
        .arg(&bytecode)
        .assert()
        .success()
        .stdout("42\n");
}

#[test]
fn test_compile_reports_syntax_error() {
    let temp = temp_dir();
    let bytecode = temp.path().join("broken.bin");

    cargo_bin()
        .args(["-e", "let = ;", "--compile"])
        .arg(&bytecode)
        .assert()
        .failure()
        .stderr(predicate::str::contains("SyntaxError"));
    assert!(!bytecode.exists());
}

#[test]
fn test_memory_usage_report() {
    cargo_bin()
        .args(["-e", "void 0", "--memory-usage"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"malloc_count\""));
}

#[test]
fn test_repl_session() {
    cargo_bin()
        .write_stdin("var x = 20\nx + 22\nthrow new TypeError('nope')\n'still ' + 'here'\n.exit\nx\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("42"))
        .stdout(predicate::str::contains("still here"))
        .stderr(predicate::str::contains("TypeError: nope"));
}

#[test]
fn test_invalid_config_fails() {
    let temp = temp_dir();
    let config = temp.path().join("qjs.toml");
    fs::write(&config, "memory_limit = 0\n").expect("Failed to write config");

    cargo_bin()
        .args(["-e", "1"])
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("memory_limit must be greater than zero"));
}

#[test]
fn test_memory_limit_enforced() {
    cargo_bin()
        .args(["--memory-limit", "1048576", "-e", "new Array(1e7).fill(0).length"])
        .assert()
        .failure();
}
