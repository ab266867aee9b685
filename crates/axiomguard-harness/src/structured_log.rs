//! Structured logging contract for harness runs.
//!
//! Provides:
//! - [`LogEntry`]: one JSONL record with required and optional fields.
//! - [`LogEmitter`]: writes JSONL lines to a file, stdout, or a buffer.
//! - [`validate_log_line`]: validates a single JSONL line against the schema.
//! - [`validate_log_file`]: validates an entire JSONL file.

use std::io::Write;
use std::path::Path;

use axiomguard_kernel::{Severity, SystemStatus};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Log entry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<axiomguard_kernel::LogLevel> for LogLevel {
    fn from(level: axiomguard_kernel::LogLevel) -> Self {
        match level {
            axiomguard_kernel::LogLevel::Warn => Self::Warn,
            axiomguard_kernel::LogLevel::Error => Self::Error,
        }
    }
}

/// Result of a scenario or a statistical check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
}

impl Outcome {
    #[must_use]
    pub const fn from_bool(ok: bool) -> Self {
        if ok { Self::Pass } else { Self::Fail }
    }
}

/// A single structured log record.
///
/// Required: `timestamp`, `trace_id`, `level`, `event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Simulation time the record refers to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SystemStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// Rendered `ORIGIN:DOMAIN` of a violation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    #[must_use]
    pub fn new(trace_id: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: trace_id.into(),
            level,
            event: event.into(),
            run_id: None,
            t_ms: None,
            score: None,
            status: None,
            severity: None,
            source: None,
            outcome: None,
            duration_ms: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    #[must_use]
    pub fn at(mut self, t_ms: u64) -> Self {
        self.t_ms = Some(t_ms);
        self
    }

    /// Set score and the status derived from it.
    #[must_use]
    pub fn with_stability(mut self, score: f64, status: SystemStatus) -> Self {
        self.score = Some(score);
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn with_violation(mut self, severity: Severity, source: impl Into<String>) -> Self {
        self.severity = Some(severity);
        self.source = Some(source.into());
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    #[must_use]
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    #[must_use]
    pub fn with_duration_ms(mut self, ms: u64) -> Self {
        self.duration_ms = Some(ms);
        self
    }

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
    run_id: String,
    written: Vec<LogEntry>,
    keep: bool,
}

impl LogEmitter {
    pub fn to_file(path: &Path, run_id: &str) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::with_writer(
            Box::new(std::io::BufWriter::new(file)),
            run_id,
            false,
        ))
    }

    #[must_use]
    pub fn to_stdout(run_id: &str) -> Self {
        Self::with_writer(Box::new(std::io::stdout()), run_id, false)
    }

    /// Discards output but keeps every emitted entry in memory (for tests).
    #[must_use]
    pub fn to_buffer(run_id: &str) -> Self {
        Self::with_writer(Box::new(std::io::sink()), run_id, true)
    }

    fn with_writer(writer: Box<dyn Write>, run_id: &str, keep: bool) -> Self {
        Self {
            writer,
            seq: 0,
            run_id: run_id.to_string(),
            written: Vec::new(),
            keep,
        }
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Entries captured by a buffer emitter.
    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.written
    }

    fn next_trace_id(&mut self) -> String {
        self.seq += 1;
        format!("axiomguard::{}::{:03}", self.run_id, self.seq)
    }

    /// Start an entry with the next trace id and this run's id.
    pub fn entry(&mut self, level: LogLevel, event: &str) -> LogEntry {
        let trace_id = self.next_trace_id();
        LogEntry::new(trace_id, level, event).with_run(self.run_id.clone())
    }

    pub fn emit(&mut self, level: LogLevel, event: &str) -> std::io::Result<LogEntry> {
        let entry = self.entry(level, event);
        self.emit_entry(entry.clone())?;
        Ok(entry)
    }

    pub fn emit_entry(&mut self, mut entry: LogEntry) -> std::io::Result<()> {
        if entry.trace_id.is_empty() {
            entry.trace_id = self.next_trace_id();
        }
        if entry.run_id.is_none() {
            entry.run_id = Some(self.run_id.clone());
        }
        let line = entry.to_jsonl().map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")?;
        if self.keep {
            self.written.push(entry);
        }
        Ok(())
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct LogValidationError {
    pub line_number: usize,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for LogValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "line {}: field '{}': {}",
            self.line_number, self.field, self.message
        )
    }
}

fn check_enum(
    obj: &serde_json::Map<String, serde_json::Value>,
    field: &str,
    allowed: &[&str],
    line_number: usize,
    errors: &mut Vec<LogValidationError>,
) {
    if let Some(value) = obj.get(field).and_then(|v| v.as_str())
        && !allowed.contains(&value)
    {
        errors.push(LogValidationError {
            line_number,
            field: field.to_string(),
            message: format!("invalid {field}: '{value}'"),
        });
    }
}

/// Validate a single JSONL line against the schema.
pub fn validate_log_line(
    line: &str,
    line_number: usize,
) -> Result<LogEntry, Vec<LogValidationError>> {
    let mut errors = Vec::new();

    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            errors.push(LogValidationError {
                line_number,
                field: "<json>".to_string(),
                message: format!("invalid JSON: {e}"),
            });
            return Err(errors);
        }
    };

    let Some(obj) = value.as_object() else {
        errors.push(LogValidationError {
            line_number,
            field: "<root>".to_string(),
            message: "expected JSON object".to_string(),
        });
        return Err(errors);
    };

    for field in ["timestamp", "trace_id", "level", "event"] {
        if !obj.contains_key(field) {
            errors.push(LogValidationError {
                line_number,
                field: field.to_string(),
                message: "required field missing".to_string(),
            });
        }
    }

    check_enum(obj, "level", &["trace", "debug", "info", "warn", "error"], line_number, &mut errors);
    check_enum(obj, "status", &["STABLE", "UNSTABLE", "CRITICAL"], line_number, &mut errors);
    check_enum(obj, "severity", &["LOW", "MEDIUM", "HIGH", "CRITICAL"], line_number, &mut errors);
    check_enum(obj, "outcome", &["pass", "fail"], line_number, &mut errors);

    if let Some(score) = obj.get("score") {
        match score.as_f64() {
            Some(s) if (0.0..=100.0).contains(&s) => {}
            _ => errors.push(LogValidationError {
                line_number,
                field: "score".to_string(),
                message: format!("score must be a number in [0, 100], got: {score}"),
            }),
        }
    }

    // A status is derived from a score, so it never appears alone.
    if obj.contains_key("status") && !obj.contains_key("score") {
        errors.push(LogValidationError {
            line_number,
            field: "score".to_string(),
            message: "status present without score".to_string(),
        });
    }

    if let Some(source) = obj.get("source").and_then(|v| v.as_str())
        && !source.contains(':')
    {
        errors.push(LogValidationError {
            line_number,
            field: "source".to_string(),
            message: format!("source should follow <ORIGIN>:<DOMAIN>, got: '{source}'"),
        });
    }

    if let Some(trace_id) = obj.get("trace_id").and_then(|v| v.as_str())
        && !trace_id.contains("::")
    {
        errors.push(LogValidationError {
            line_number,
            field: "trace_id".to_string(),
            message: format!(
                "trace_id should follow axiomguard::<run_id>::<seq> format, got: '{trace_id}'"
            ),
        });
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    match serde_json::from_value::<LogEntry>(value) {
        Ok(entry) => Ok(entry),
        Err(e) => {
            errors.push(LogValidationError {
                line_number,
                field: "<deserialization>".to_string(),
                message: format!("failed to deserialize: {e}"),
            });
            Err(errors)
        }
    }
}

/// Validate an entire JSONL file.
///
/// Returns the non-empty line count and any validation errors found.
pub fn validate_log_file(path: &Path) -> Result<(usize, Vec<LogValidationError>), std::io::Error> {
    let content = std::fs::read_to_string(path)?;
    Ok(validate_log_text(&content))
}

/// Same as [`validate_log_file`] over in-memory text.
#[must_use]
pub fn validate_log_text(content: &str) -> (usize, Vec<LogValidationError>) {
    let mut all_errors = Vec::new();
    let mut line_count = 0;
    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        line_count += 1;
        if let Err(errs) = validate_log_line(line, i + 1) {
            all_errors.extend(errs);
        }
    }
    (line_count, all_errors)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now_utc() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format_utc(duration.as_secs(), duration.subsec_millis())
}

/// RFC 3339 UTC timestamp from seconds since the epoch.
fn format_utc(secs: u64, millis: u32) -> String {
    let days = secs / 86_400;
    let rem = secs % 86_400;
    let (year, month, day) = civil_from_days(days as i64);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{millis:03}Z",
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60,
    )
}

// Howard Hinnant's days-to-civil conversion.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
