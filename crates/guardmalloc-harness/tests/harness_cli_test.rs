//! Integration tests: harness CLI end to end.
//!
//! Validates:
//! 1. `list` names every scenario.
//! 2. `run` of a clean scenario exits 0; a corrupting one dies from SIGABRT.
//! 3. `verify` passes the whole catalog in both modes and writes a valid JSONL log.
//! 4. Unknown scenarios and modes fail, naming the bad value.

use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

use guardmalloc_harness::SCENARIOS;
use guardmalloc_harness::structured_log::validate_log_line;

fn harness() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_harness"));
    cmd.env_remove("GUARDMALLOC_MODE").env_remove("GUARDMALLOC_TRACE");
    cmd
}

fn unique_tmp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time should be after UNIX_EPOCH")
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{}-{nanos}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    dir
}

#[test]
fn list_names_every_scenario() {
    let out = harness().arg("list").output().expect("run harness list");
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    for s in SCENARIOS {
        assert!(stdout.contains(s.name), "missing {} in:\n{stdout}", s.name);
    }
}

#[test]
fn list_json_is_parseable() {
    let out = harness().args(["list", "--json"]).output().expect("run harness list");
    assert!(out.status.success());
    let rows: serde_json::Value = serde_json::from_slice(&out.stdout).expect("valid JSON");
    let rows = rows.as_array().expect("array");
    assert_eq!(rows.len(), SCENARIOS.len());
    let overrun = rows.iter().find(|r| r["name"] == "overrun_free").expect("overrun_free row");
    assert_eq!(overrun["guarded"], "abort");
    assert!(overrun["passthrough"].is_null());
}

#[test]
fn run_clean_scenario_exits_zero() {
    let out = harness()
        .args(["run", "--scenario", "realloc_grow", "--mode", "guarded"])
        .output()
        .expect("run scenario");
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
}

#[cfg(unix)]
#[test]
fn run_overrun_scenario_aborts() {
    use std::os::unix::process::ExitStatusExt;

    let out = harness()
        .args(["run", "--scenario", "overrun_free"])
        .output()
        .expect("run scenario");
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert_eq!(out.status.signal(), Some(libc::SIGABRT), "{stderr}");
    assert!(stderr.contains("guardmalloc: Heap memory overrun before 'free' call"), "{stderr}");
    assert!(stderr.contains("allocated in overrun.c:fill@42 by malloc"), "{stderr}");
}

#[cfg(unix)]
#[test]
fn verify_both_modes_passes_and_logs() {
    let dir = unique_tmp_dir("guardmalloc-verify");
    let log = dir.join("verify.jsonl");
    let out = harness()
        .args(["verify", "--mode", "both", "--run-id", "ci", "--log"])
        .arg(&log)
        .output()
        .expect("run verify");
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(
        out.status.success(),
        "stdout:\n{stdout}\nstderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    assert!(stdout.contains("0 failed"), "{stdout}");

    let content = std::fs::read_to_string(&log).expect("read log");
    let entries: Vec<_> = content
        .lines()
        .enumerate()
        .map(|(i, line)| {
            validate_log_line(line, i + 1).unwrap_or_else(|errs| {
                panic!("invalid log line {}: {:?}", i + 1, errs)
            })
        })
        .collect();

    // start + one per scenario and mode + end
    assert_eq!(entries.len(), 2 + 2 * SCENARIOS.len());
    assert_eq!(entries[0].event, "verify_start");
    assert_eq!(entries[0].trace_id, "verify::ci::001");
    assert_eq!(entries.last().map(|e| e.event.as_str()), Some("verify_end"));

    let overrun_guarded = entries
        .iter()
        .find(|e| e.scenario.as_deref() == Some("overrun_free") && e.mode.as_deref() == Some("guarded"))
        .expect("overrun_free guarded entry");
    assert_eq!(overrun_guarded.signal, Some(libc::SIGABRT));
    assert_eq!(overrun_guarded.expected.as_deref(), Some("abort"));

    let _ = std::fs::remove_dir_all(dir);
}

#[cfg(unix)]
#[test]
fn verify_single_scenario_json() {
    let out = harness()
        .args(["verify", "--mode", "guarded", "--scenario", "header_smash_free", "--json"])
        .output()
        .expect("run verify");
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let results: serde_json::Value = serde_json::from_slice(&out.stdout).expect("valid JSON");
    assert_eq!(results[0]["scenario"], "header_smash_free");
    assert_eq!(results[0]["outcome"], "pass");
}

#[test]
fn unknown_scenario_fails() {
    let out = harness()
        .args(["run", "--scenario", "does_not_exist"])
        .output()
        .expect("run harness");
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("UnknownScenario(\"does_not_exist\")"));
}

#[test]
fn unknown_mode_fails() {
    let out = harness()
        .args(["verify", "--mode", "hardened"])
        .output()
        .expect("run harness");
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("UnknownMode(\"hardened\")"));
}
