//! Crash-expected scenario harness for the guarded heap.
//!
//! This crate provides:
//! - A scenario catalog: short heap programs, each with the behavior a correct
//!   allocator must show in guarded and passthrough mode.
//! - A subprocess runner: every scenario runs in its own child process, since
//!   the interesting ones end in `abort()`.
//! - Verification: exit status and stderr judged against the expectation.
//! - JSONL structured logs of each run.

pub mod error;
pub mod runner;
pub mod scenario;
pub mod structured_log;
pub mod verify;

pub use error::HarnessError;
pub use scenario::{Expectation, SCENARIOS, Scenario};
pub use verify::VerificationResult;
