//! CLI entrypoint for the guardmalloc scenario harness.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use guardmalloc_core::{GuardMode, guard_mode};
use guardmalloc_harness::error::HarnessError;
use guardmalloc_harness::runner::run_scenario_subprocess;
use guardmalloc_harness::scenario::{self, SCENARIOS};
use guardmalloc_harness::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome, now_utc};
use guardmalloc_harness::verify::{
    VerificationResult, evaluate, expectation_label, parse_modes,
};

/// Scenario tooling for the guarded heap.
#[derive(Debug, Parser)]
#[command(name = "guardmalloc-harness")]
#[command(about = "Crash-expected scenario harness for guardmalloc")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List every scenario with its expectations.
    List {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Run one scenario in this process (may abort).
    Run {
        /// Scenario name (see `list`).
        #[arg(long)]
        scenario: String,
        /// `guarded` or `off`; defaults to GUARDMALLOC_MODE.
        #[arg(long)]
        mode: Option<String>,
    },
    /// Run scenarios in child processes and check each outcome.
    Verify {
        /// `guarded`, `off` or `both`.
        #[arg(long, default_value = "both")]
        mode: String,
        /// Only this scenario.
        #[arg(long)]
        scenario: Option<String>,
        /// JSONL log output path.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Run identifier used in trace ids.
        #[arg(long)]
        run_id: Option<String>,
        /// Print the results as JSON on stdout.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::List { json } => {
            if json {
                let rows: Vec<_> = SCENARIOS
                    .iter()
                    .map(|s| {
                        serde_json::json!({
                            "name": s.name,
                            "description": s.description,
                            "guarded": expectation_label(s.guarded),
                            "passthrough": s.passthrough.map(expectation_label),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for s in SCENARIOS {
                    println!(
                        "{:<20} guarded={:<6} off={:<6} {}",
                        s.name,
                        expectation_label(s.guarded),
                        s.passthrough.map_or("skip", expectation_label),
                        s.description
                    );
                }
            }
        }
        Command::Run { scenario, mode } => {
            let scenario = scenario::find(&scenario)?;
            let mode = match mode {
                Some(m) => single_mode(&m)?,
                None => guard_mode(),
            };
            scenario.execute(mode)?;
        }
        Command::Verify {
            mode,
            scenario,
            log,
            run_id,
            json,
        } => {
            let modes = parse_modes(&mode)?;
            let selected: Vec<_> = match scenario {
                Some(name) => vec![scenario::find(&name)?],
                None => SCENARIOS.iter().collect(),
            };
            let run_id = run_id.unwrap_or_else(|| format!("run-{}", std::process::id()));
            let mut emitter = match &log {
                Some(path) => LogEmitter::to_file(path, "verify", &run_id)?,
                None => LogEmitter::to_sink("verify", &run_id),
            };
            let exe = std::env::current_exe()?;

            emitter.emit_entry(
                LogEntry::new("", LogLevel::Info, "verify_start").with_details(serde_json::json!({
                    "started_utc": now_utc(),
                    "scenarios": selected.len(),
                    "modes": modes.iter().map(|m| m.as_str()).collect::<Vec<_>>(),
                })),
            )?;

            let mut results = Vec::new();
            for s in &selected {
                for &mode in &modes {
                    let base = LogEntry::new("", LogLevel::Info, "scenario_result")
                        .with_mode(mode.as_str())
                        .with_scenario(s.name);

                    let Some(expectation) = s.expectation(mode) else {
                        emitter.emit_entry(base.with_outcome(Outcome::Skip))?;
                        results.push(VerificationResult {
                            scenario: s.name.to_string(),
                            mode: mode.as_str().to_string(),
                            outcome: Outcome::Skip,
                            reason: "not meaningful without guards".to_string(),
                        });
                        continue;
                    };

                    let observed = run_scenario_subprocess(&exe, s.name, mode)?;
                    let (outcome, reason) = evaluate(expectation, &observed);
                    let level = if outcome == Outcome::Fail {
                        LogLevel::Error
                    } else {
                        LogLevel::Info
                    };
                    let mut entry = base
                        .with_expected(expectation_label(expectation))
                        .with_outcome(outcome)
                        .with_exit(observed.exit_code, observed.signal)
                        .with_duration_ms(observed.duration_ms)
                        .with_details(serde_json::json!({ "reason": reason }));
                    entry.level = level;
                    emitter.emit_entry(entry)?;

                    results.push(VerificationResult {
                        scenario: s.name.to_string(),
                        mode: mode.as_str().to_string(),
                        outcome,
                        reason,
                    });
                }
            }

            let failed = results.iter().filter(|r| !r.passed()).count();
            let total = results.len();
            emitter.emit_entry(
                LogEntry::new("", LogLevel::Info, "verify_end")
                    .with_outcome(if failed == 0 { Outcome::Pass } else { Outcome::Fail })
                    .with_details(serde_json::json!({ "failed": failed, "total": total })),
            )?;
            emitter.flush()?;

            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                for r in &results {
                    let tag = match r.outcome {
                        Outcome::Pass => "PASS",
                        Outcome::Fail => "FAIL",
                        Outcome::Skip => "SKIP",
                    };
                    println!("[{tag}] {:<20} mode={:<7} {}", r.scenario, r.mode, r.reason);
                }
                let skipped = results.iter().filter(|r| r.outcome == Outcome::Skip).count();
                println!("{} passed, {skipped} skipped, {failed} failed", total - failed - skipped);
            }

            if failed > 0 {
                return Err(HarnessError::ScenarioFailures { failed, total }.into());
            }
        }
    }

    Ok(())
}

fn single_mode(s: &str) -> Result<GuardMode, HarnessError> {
    match parse_modes(s)?.as_slice() {
        [mode] => Ok(*mode),
        _ => Err(HarnessError::UnknownMode(s.to_string())),
    }
}
