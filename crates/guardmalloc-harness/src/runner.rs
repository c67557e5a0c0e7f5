//! Child-process execution of a single scenario.
//!
//! The mode is process-immutable (cached from the environment), and the
//! interesting scenarios kill their process, so every run gets a fresh child:
//! the harness binary re-invoked with `run --scenario <name> --mode <mode>`.

use std::path::Path;
use std::process::Command;
use std::time::Instant;

use guardmalloc_core::GuardMode;
use guardmalloc_core::config::{MODE_ENV, TRACE_ENV};

use crate::error::HarnessError;

/// How a child process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observed {
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Re-run `exe` as `exe run --scenario <name> --mode <mode>`.
pub fn run_scenario_subprocess(
    exe: &Path,
    scenario: &str,
    mode: GuardMode,
) -> Result<Observed, HarnessError> {
    let started = Instant::now();
    let output = Command::new(exe)
        .arg("run")
        .arg("--scenario")
        .arg(scenario)
        .arg("--mode")
        .arg(mode.as_str())
        .env(MODE_ENV, mode.as_str())
        .env_remove(TRACE_ENV)
        .output()?;

    Ok(Observed {
        exit_code: output.status.code(),
        signal: exit_signal(&output.status),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    })
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}
