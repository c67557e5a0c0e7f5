//! Judging child runs against scenario expectations.

use guardmalloc_core::GuardMode;
use guardmalloc_core::diag::LINE_PREFIX;
use serde::Serialize;

use crate::error::HarnessError;
use crate::scenario::Expectation;
use crate::runner::Observed;
use crate::structured_log::Outcome;

/// Result of one scenario in one mode.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub scenario: String,
    pub mode: String,
    pub outcome: Outcome,
    pub reason: String,
}

impl VerificationResult {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.outcome != Outcome::Fail
    }
}

/// Parse `guarded`, `off` or `both` into the modes to verify.
pub fn parse_modes(s: &str) -> Result<Vec<GuardMode>, HarnessError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "guarded" => Ok(vec![GuardMode::Guarded]),
        "off" | "passthrough" => Ok(vec![GuardMode::Passthrough]),
        "both" => Ok(vec![GuardMode::Guarded, GuardMode::Passthrough]),
        _ => Err(HarnessError::UnknownMode(s.to_string())),
    }
}

/// Short label for logs.
#[must_use]
pub fn expectation_label(expectation: Expectation) -> &'static str {
    match expectation {
        Expectation::Clean => "clean",
        Expectation::Abort { .. } => "abort",
    }
}

/// Compare what the child did with what it should have done.
#[must_use]
pub fn evaluate(expectation: Expectation, observed: &Observed) -> (Outcome, String) {
    match expectation {
        Expectation::Clean => {
            if observed.exit_code != Some(0) {
                return (
                    Outcome::Fail,
                    format!(
                        "expected clean exit, got exit_code={:?} signal={:?}: {}",
                        observed.exit_code,
                        observed.signal,
                        observed.stderr.trim()
                    ),
                );
            }
            if observed.stderr.contains(LINE_PREFIX) {
                return (
                    Outcome::Fail,
                    format!("unexpected allocator diagnostic: {}", observed.stderr.trim()),
                );
            }
            (Outcome::Pass, "clean exit".to_string())
        }
        Expectation::Abort { stderr_contains } => {
            if observed.signal != Some(libc::SIGABRT) {
                return (
                    Outcome::Fail,
                    format!(
                        "expected SIGABRT, got exit_code={:?} signal={:?}",
                        observed.exit_code, observed.signal
                    ),
                );
            }
            let missing: Vec<&str> = stderr_contains
                .iter()
                .copied()
                .filter(|needle| !observed.stderr.contains(needle))
                .collect();
            if missing.is_empty() {
                (Outcome::Pass, "aborted with expected diagnostic".to_string())
            } else {
                (
                    Outcome::Fail,
                    format!("diagnostic lacks {missing:?}: {}", observed.stderr.trim()),
                )
            }
        }
    }
}
