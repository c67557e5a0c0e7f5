//! Structured JSONL logs for harness runs.
//!
//! Provides:
//! - [`LogEntry`]: one JSONL record with required and optional fields.
//! - [`LogEmitter`]: writes records to a file, or drops them.
//! - [`validate_log_line`]: schema check for a single line.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

// ---------------------------------------------------------------------------
// Log entry
// ---------------------------------------------------------------------------

/// Severity level for log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Scenario verification outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    Skip,
}

/// Canonical structured log entry.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    // Required
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    // Optional
    /// `guarded` or `off`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scenario: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Terminating signal of the child, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    /// Create a new log entry with required fields only.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: trace_id.into(),
            level,
            event: event.into(),
            mode: None,
            scenario: None,
            expected: None,
            outcome: None,
            exit_code: None,
            signal: None,
            duration_ms: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: impl Into<String>) -> Self {
        self.mode = Some(mode.into());
        self
    }

    #[must_use]
    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        self.scenario = Some(scenario.into());
        self
    }

    /// Set the expected child behavior (`clean` or `abort`).
    #[must_use]
    pub fn with_expected(mut self, expected: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self
    }

    #[must_use]
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    #[must_use]
    pub fn with_exit(mut self, exit_code: Option<i32>, signal: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self.signal = signal;
        self
    }

    #[must_use]
    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

    /// Set free-form details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Serialize to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Log emitter
// ---------------------------------------------------------------------------

/// Writes structured JSONL log entries.
pub struct LogEmitter {
    writer: Box<dyn Write>,
    seq: u64,
    suite: String,
    run_id: String,
}

impl LogEmitter {
    /// Create an emitter that writes to a file.
    pub fn to_file(path: &Path, suite: &str, run_id: &str) -> std::io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::File::create(path)?;
        Ok(Self {
            writer: Box::new(std::io::BufWriter::new(file)),
            seq: 0,
            suite: suite.to_string(),
            run_id: run_id.to_string(),
        })
    }

    /// Create an emitter that discards output (no `--log` given).
    #[must_use]
    pub fn to_sink(suite: &str, run_id: &str) -> Self {
        Self {
            writer: Box::new(std::io::sink()),
            seq: 0,
            suite: suite.to_string(),
            run_id: run_id.to_string(),
        }
    }

    /// Generate the next trace ID: `<suite>::<run_id>::<seq>`.
    fn next_trace_id(&mut self) -> String {
        self.seq += 1;
        format!("{}::{}::{:03}", self.suite, self.run_id, self.seq)
    }

    /// Emit a log entry with an auto-generated trace_id.
    pub fn emit(&mut self, level: LogLevel, event: &str) -> std::io::Result<LogEntry> {
        let trace_id = self.next_trace_id();
        let entry = LogEntry::new(trace_id, level, event);
        let line = serde_json::to_string(&entry).map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")?;
        Ok(entry)
    }

    /// Emit a fully-populated log entry, filling in an empty trace_id.
    pub fn emit_entry(&mut self, mut entry: LogEntry) -> std::io::Result<()> {
        if entry.trace_id.is_empty() {
            entry.trace_id = self.next_trace_id();
        }
        let line = serde_json::to_string(&entry).map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validation error for a log line.
#[derive(Debug)]
pub struct LogValidationError {
    pub line_number: usize,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for LogValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}: {}", self.line_number, self.field, self.message)
    }
}

/// Validate a single JSONL line against the log schema.
pub fn validate_log_line(line: &str, line_number: usize) -> Result<LogEntry, Vec<LogValidationError>> {
    let err = |field: &str, message: String| LogValidationError {
        line_number,
        field: field.to_string(),
        message,
    };

    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => return Err(vec![err("<json>", format!("invalid JSON: {e}"))]),
    };
    let Some(obj) = value.as_object() else {
        return Err(vec![err("<root>", "expected a JSON object".to_string())]);
    };

    let mut errors = Vec::new();
    for field in ["timestamp", "trace_id", "level", "event"] {
        if !obj.get(field).is_some_and(serde_json::Value::is_string) {
            errors.push(err(field, "required string field missing".to_string()));
        }
    }

    if let Some(mode) = obj.get("mode").and_then(|v| v.as_str())
        && !["guarded", "off"].contains(&mode)
    {
        errors.push(err("mode", format!("invalid mode: '{mode}'")));
    }

    if let Some(trace_id) = obj.get("trace_id").and_then(|v| v.as_str())
        && trace_id.split("::").count() != 3
    {
        errors.push(err(
            "trace_id",
            format!("trace_id should follow <suite>::<run_id>::<seq>, got: '{trace_id}'"),
        ));
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    serde_json::from_value::<LogEntry>(value)
        .map_err(|e| vec![err("<deserialization>", format!("failed to deserialize: {e}"))])
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Current UTC time as `YYYY-MM-DDTHH:MM:SS.mmmZ`.
pub fn now_utc() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = duration.as_secs();
    let (year, month, day) = civil_from_days((secs / 86_400) as i64);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{:03}Z",
        (secs % 86_400) / 3600,
        (secs % 3600) / 60,
        secs % 60,
        duration.subsec_millis(),
    )
}

/// Days since 1970-01-01 to a proleptic Gregorian date.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_entry_serializes_required_fields() {
        let entry = LogEntry::new("verify::run-1::001", LogLevel::Info, "scenario_result");
        let json = entry.to_jsonl().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(parsed["timestamp"].is_string());
        assert_eq!(parsed["trace_id"], "verify::run-1::001");
        assert_eq!(parsed["level"], "info");
        assert_eq!(parsed["event"], "scenario_result");
        assert!(parsed.get("mode").is_none());
        assert!(parsed.get("signal").is_none());
    }

    #[test]
    fn log_entry_with_optional_fields() {
        let entry = LogEntry::new("verify::run-1::002", LogLevel::Error, "scenario_result")
            .with_mode("guarded")
            .with_scenario("overrun_free")
            .with_expected("abort")
            .with_outcome(Outcome::Fail)
            .with_exit(None, Some(6))
            .with_duration_ms(3)
            .with_details(serde_json::json!({"reason": "missing needle"}));

        let parsed: serde_json::Value = serde_json::from_str(&entry.to_jsonl().unwrap()).unwrap();
        assert_eq!(parsed["mode"], "guarded");
        assert_eq!(parsed["scenario"], "overrun_free");
        assert_eq!(parsed["expected"], "abort");
        assert_eq!(parsed["outcome"], "fail");
        assert_eq!(parsed["signal"], 6);
        assert!(parsed.get("exit_code").is_none());
        assert_eq!(parsed["duration_ms"], 3);
        assert!(parsed["details"].is_object());
    }

    #[test]
    fn emitter_numbers_trace_ids() {
        let mut emitter = LogEmitter::to_sink("verify", "r1");
        let a = emitter.emit(LogLevel::Info, "start").unwrap();
        let b = emitter.emit(LogLevel::Info, "end").unwrap();
        assert_eq!(a.trace_id, "verify::r1::001");
        assert_eq!(b.trace_id, "verify::r1::002");
    }

    #[test]
    fn validate_accepts_own_output() {
        let line = LogEntry::new("verify::r1::001", LogLevel::Info, "run_start")
            .with_mode("off")
            .to_jsonl()
            .unwrap();
        assert!(validate_log_line(&line, 1).is_ok());
    }

    #[test]
    fn validate_rejects_bad_fields() {
        let errs = validate_log_line(r#"{"trace_id":"x","level":"info","mode":"strict"}"#, 4)
            .unwrap_err();
        let fields: Vec<_> = errs.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"timestamp"));
        assert!(fields.contains(&"event"));
        assert!(fields.contains(&"mode"));
        assert!(fields.contains(&"trace_id"));
        assert!(errs.iter().all(|e| e.line_number == 4));
        assert!(validate_log_line("not json", 1).is_err());
    }

    #[test]
    fn timestamp_shape() {
        let ts = now_utc();
        assert_eq!(ts.len(), 24, "{ts}");
        assert!(ts.ends_with('Z'));
        assert_eq!(&ts[4..5], "-");
        assert_eq!(&ts[10..11], "T");
    }

    #[test]
    fn civil_dates() {
        assert_eq!(civil_from_days(0), (1970, 1, 1));
        assert_eq!(civil_from_days(11_016), (2000, 2, 29));
        assert_eq!(civil_from_days(19_723), (2024, 1, 1));
    }
}
