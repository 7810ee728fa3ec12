//! JSON-lines log reader
//!
//! Captured runs are stored one JSON object per line, as written by the
//! log collector. Core fields (`time`, `level`, `pod`, `container`, `msg`)
//! are typed; every other key is kept as a string attribute.

use crate::{Error, LogLine, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, warn};

/// Counters collected while reading a log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadSummary {
    /// Lines turned into `LogLine`s
    pub lines: usize,

    /// Lines that could not be decoded
    pub malformed: usize,
}

/// Read a JSON-lines log file
pub fn read_log_file(path: impl AsRef<Path>) -> Result<(Vec<LogLine>, ReadSummary)> {
    let path = path.as_ref();
    let file = File::open(path)?;
    debug!(path = %path.display(), "Reading log file");
    read_log_lines(BufReader::new(file))
}

/// Read JSON-lines log records from any buffered reader
///
/// Blank lines are skipped. Lines that are not JSON objects are counted
/// as malformed and dropped; only IO failures abort the read.
pub fn read_log_lines<R: BufRead>(reader: R) -> Result<(Vec<LogLine>, ReadSummary)> {
    let mut lines = Vec::new();
    let mut summary = ReadSummary::default();

    for (index, raw) in reader.lines().enumerate() {
        let raw = raw?;
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }

        match parse_json_line(raw) {
            Ok(line) => {
                lines.push(line);
                summary.lines += 1;
            }
            Err(e) => {
                summary.malformed += 1;
                warn!(line = index + 1, error = %e, "Skipping malformed log line");
            }
        }
    }

    Ok((lines, summary))
}

/// Decode one JSON object into a log line
pub fn parse_json_line(raw: &str) -> Result<LogLine> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(object) => from_json_object(object),
        other => Err(Error::parse(format!(
            "expected JSON object, found {}",
            json_kind(&other)
        ))),
    }
}

fn from_json_object(object: Map<String, Value>) -> Result<LogLine> {
    let mut line = LogLine::new(String::new());

    for (key, value) in object {
        match key.as_str() {
            "time" => {
                line.time = match value {
                    Value::String(s) => Some(parse_time(&s)?),
                    Value::Null => None,
                    other => {
                        return Err(Error::parse(format!(
                            "time must be a string, found {}",
                            json_kind(&other)
                        )))
                    }
                }
            }
            "msg" => line.msg = value_to_string(value).unwrap_or_default(),
            "level" => line.level = value_to_string(value),
            "pod" => line.pod = value_to_string(value),
            "container" => line.container = value_to_string(value),
            _ => {
                if let Some(value) = value_to_string(value) {
                    line.attrs.insert(key, value);
                }
            }
        }
    }

    Ok(line)
}

/// Parse an ISO-8601 timestamp; naive timestamps are taken as UTC
pub fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(Utc.from_utc_datetime(&naive));
        }
    }

    Err(Error::parse(format!("invalid timestamp '{}'", s)))
}

fn value_to_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
