//! Structured logging contract for allocator runs.
//!
//! Provides:
//! - [`LogEntry`]: canonical JSONL log record with required + optional fields.
//! - [`LogEntry::from_record`]: lifts an engine lifecycle record into a line.
//! - [`LogEmitter`]: writes JSONL lines to a file or an in-memory buffer.
//! - [`validate_log_line`] / [`validate_log_file`]: schema checks.

use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use segalloc_core::{AllocatorLogLevel, AllocatorLogRecord, HeapStats};

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

impl From<AllocatorLogLevel> for LogLevel {
    fn from(level: AllocatorLogLevel) -> Self {
        match level {
            AllocatorLogLevel::Trace => Self::Trace,
            AllocatorLogLevel::Debug => Self::Debug,
            AllocatorLogLevel::Info => Self::Info,
            AllocatorLogLevel::Warn => Self::Warn,
            AllocatorLogLevel::Error => Self::Error,
        }
    }
}

/// Outcome labels the engine and the driver emit.
pub const KNOWN_OUTCOMES: &[&str] = &[
    "success",
    "oom",
    "invalid_size",
    "invalid_pointer",
    "double_free",
    "not_initialized",
    "unaligned_arena",
    "denied",
    "pass",
    "fail",
];

/// Outcomes recorded for calls the engine refused.
const REJECTION_OUTCOMES: &[&str] = &["invalid_pointer", "double_free", "not_initialized"];

/// Canonical structured log entry.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    // Required
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    // Optional
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision_id: Option<u64>,
    /// C-level symbol (`malloc`, `free`, `realloc`, `calloc`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// Search policy of the heap that produced the record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ptr: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arena_bytes: Option<usize>,
    /// Trace line that triggered the record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_line: Option<usize>,
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
            run_id: None,
            decision_id: None,
            symbol: None,
            policy: None,
            ptr: None,
            size: None,
            class: None,
            outcome: None,
            arena_bytes: None,
            trace_line: None,
            details: None,
        }
    }

    /// Lift an engine lifecycle record, keeping its trace id.
    #[must_use]
    pub fn from_record(record: &AllocatorLogRecord) -> Self {
        let mut entry = Self::new(record.trace_id.clone(), record.level.into(), record.event);
        entry.decision_id = Some(record.decision_id);
        entry.symbol = Some(record.symbol.to_string());
        entry.ptr = record.ptr;
        entry.size = record.size;
        entry.class = record.class;
        entry.outcome = Some(record.outcome.to_string());
        entry.arena_bytes = Some(record.arena_bytes);
        entry.details = Some(serde_json::json!({
            "message": record.details,
            "stats": stats_json(&record.stats),
        }));
        entry
    }

    #[must_use]
    pub fn with_run(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = Some(policy.into());
        self
    }

    #[must_use]
    pub fn with_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = Some(outcome.into());
        self
    }

    #[must_use]
    pub fn with_trace_line(mut self, line: usize) -> Self {
        self.trace_line = Some(line);
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

/// JSON view of a counter snapshot.
#[must_use]
pub fn stats_json(stats: &HeapStats) -> serde_json::Value {
    serde_json::json!({
        "allocations": stats.allocations,
        "releases": stats.releases,
        "growths": stats.growths,
        "splits": stats.splits,
        "coalesces": stats.coalesces,
        "exact_hits": stats.exact_hits,
        "range_hits": stats.range_hits,
        "rejected": stats.rejected,
        "live_blocks": stats.live_blocks,
        "live_bytes": stats.live_bytes,
    })
}

/// Writes structured JSONL log entries.
pub struct LogEmitter {
    writer: Box<dyn Write>,
    seq: u64,
    run_id: String,
    lines: usize,
}

impl LogEmitter {
    /// Create an emitter that writes to a file.
    pub fn to_file(path: &Path, run_id: &str) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::to_writer(
            Box::new(std::io::BufWriter::new(file)),
            run_id,
        ))
    }

    /// Create an emitter over any writer.
    #[must_use]
    pub fn to_writer(writer: Box<dyn Write>, run_id: &str) -> Self {
        Self {
            writer,
            seq: 0,
            run_id: run_id.to_string(),
            lines: 0,
        }
    }

    fn next_trace_id(&mut self) -> String {
        self.seq += 1;
        format!("harness::{}::{:03}", self.run_id, self.seq)
    }

    /// Emit a driver-level entry with an auto-generated trace id.
    pub fn emit(&mut self, level: LogLevel, event: &str) -> std::io::Result<LogEntry> {
        let trace_id = self.next_trace_id();
        let entry = LogEntry::new(trace_id, level, event).with_run(self.run_id.clone());
        self.write_line(&entry)?;
        Ok(entry)
    }

    /// Emit a fully-populated entry. Fills in a missing trace id and run id.
    pub fn emit_entry(&mut self, mut entry: LogEntry) -> std::io::Result<()> {
        if entry.trace_id.is_empty() {
            entry.trace_id = self.next_trace_id();
        }
        if entry.run_id.is_none() {
            entry.run_id = Some(self.run_id.clone());
        }
        self.write_line(&entry)
    }

    fn write_line(&mut self, entry: &LogEntry) -> std::io::Result<()> {
        let line = serde_json::to_string(entry).map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")?;
        self.lines += 1;
        Ok(())
    }

    /// Lines written so far.
    pub fn lines(&self) -> usize {
        self.lines
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

/// Validation error for a log line.
#[derive(Debug, Clone, PartialEq, Eq)]
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

/// Validate a single JSONL line against the schema.
pub fn validate_log_line(
    line: &str,
    line_number: usize,
) -> Result<LogEntry, Vec<LogValidationError>> {
    let error = |field: &str, message: String| LogValidationError {
        line_number,
        field: field.to_string(),
        message,
    };

    let value: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => return Err(vec![error("<json>", format!("invalid JSON: {e}"))]),
    };
    let Some(obj) = value.as_object() else {
        return Err(vec![error("<root>", "expected JSON object".to_string())]);
    };

    let mut errors = Vec::new();
    for field in ["timestamp", "trace_id", "level", "event"] {
        if !obj.contains_key(field) {
            errors.push(error(field, "required field missing".to_string()));
        }
    }

    if let Some(level) = obj.get("level").and_then(|v| v.as_str())
        && !["trace", "debug", "info", "warn", "error"].contains(&level)
    {
        errors.push(error("level", format!("invalid level: '{level}'")));
    }

    if let Some(outcome) = obj.get("outcome").and_then(|v| v.as_str())
        && !KNOWN_OUTCOMES.contains(&outcome)
    {
        errors.push(error("outcome", format!("invalid outcome: '{outcome}'")));
    }

    if let Some(policy) = obj.get("policy").and_then(|v| v.as_str())
        && !["skip-sparse", "sequential"].contains(&policy)
    {
        errors.push(error("policy", format!("invalid policy: '{policy}'")));
    }

    // Accepted payload offsets are 16-byte aligned. Rejections echo
    // whatever the caller passed.
    let rejected = obj
        .get("outcome")
        .and_then(|v| v.as_str())
        .is_some_and(|outcome| REJECTION_OUTCOMES.contains(&outcome));
    if let Some(ptr) = obj.get("ptr").and_then(|v| v.as_u64())
        && !rejected
        && ptr % 16 != 0
    {
        errors.push(error("ptr", format!("misaligned payload offset {ptr}")));
    }

    if let Some(trace_id) = obj.get("trace_id").and_then(|v| v.as_str())
        && !trace_id.contains("::")
    {
        errors.push(error(
            "trace_id",
            format!("trace_id should be '::'-separated, got: '{trace_id}'"),
        ));
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    serde_json::from_value::<LogEntry>(value)
        .map_err(|e| vec![error("<deserialization>", format!("failed to deserialize: {e}"))])
}

/// Validate an entire JSONL file.
///
/// Returns the non-empty line count and every validation error found.
pub fn validate_log_file(path: &Path) -> Result<(usize, Vec<LogValidationError>), std::io::Error> {
    let content = std::fs::read_to_string(path)?;
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

    Ok((line_count, all_errors))
}

/// RFC 3339 UTC timestamp with millisecond precision.
fn now_utc() -> String {
    let duration = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format_utc(duration.as_secs(), duration.subsec_millis())
}

fn format_utc(secs: u64, millis: u32) -> String {
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;

    // Civil-from-days over 400-year eras.
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);

    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{millis:03}Z",
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60,
    )
}
