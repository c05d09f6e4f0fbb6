//! Structured line logger.
//!
//! [`StructuredLogger`] writes one line per call in either logfmt or JSON.
//! Fields appear in a fixed order: standard fields bound with
//! [`Logger::with_fields`], then the call's own fields, then `level`, then
//! `timestamp` (RFC 3339, UTC).
//!
//! ```text
//! foo=bar msg="uh oh" level=error timestamp=2024-05-01T10:00:00.000Z
//! {"key":4,"level":"info","msg":"something","timestamp":"2024-05-01T10:00:00.000Z"}
//! ```
//!
//! JSON objects are written with sorted keys; a later field with the same
//! key replaces an earlier one.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use aegis_core::{FieldValue, Fields, Logger, SharedLogger};
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

/// Output encoding of a [`StructuredLogger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// `key=value` pairs separated by spaces.
    #[default]
    Logfmt,
    /// One JSON object per line.
    Json,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "logfmt" => Ok(Self::Logfmt),
            "json" => Ok(Self::Json),
            other => Err(TelemetryError::InvalidConfig(format!(
                "unknown log format '{other}', expected 'logfmt' or 'json'"
            ))),
        }
    }
}

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// Informational.
    Info,
    /// Error.
    Error,
}

impl Level {
    /// Returns the rendered level name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Error => "error",
        }
    }
}

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// A logfmt or JSON line logger.
///
/// Clones and loggers derived with [`Logger::with_fields`] share the
/// underlying writer. Each line is written with a single `write_all` while
/// holding the writer lock, so lines from concurrent requests never
/// interleave.
#[derive(Clone)]
pub struct StructuredLogger {
    writer: SharedWriter,
    format: LogFormat,
    standard: Fields,
    hide_timestamp: bool,
}

impl StructuredLogger {
    /// Creates a logger writing to `writer` in `format`.
    pub fn new(writer: impl Write + Send + 'static, format: LogFormat) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
            format,
            standard: Fields::new(),
            hide_timestamp: false,
        }
    }

    /// Creates a logfmt logger writing to `writer`.
    pub fn logfmt_to(writer: impl Write + Send + 'static) -> Self {
        Self::new(writer, LogFormat::Logfmt)
    }

    /// Creates a JSON logger writing to `writer`.
    pub fn json_to(writer: impl Write + Send + 'static) -> Self {
        Self::new(writer, LogFormat::Json)
    }

    /// Creates a logger writing to standard output.
    #[must_use]
    pub fn stdout(format: LogFormat) -> Self {
        Self::new(std::io::stdout(), format)
    }

    /// Creates a logger writing to standard error.
    #[must_use]
    pub fn stderr(format: LogFormat) -> Self {
        Self::new(std::io::stderr(), format)
    }

    /// Creates a logger appending to the file at `path`, creating it if
    /// needed.
    pub fn file(path: impl AsRef<Path>, format: LogFormat) -> TelemetryResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self::new(file, format))
    }

    /// Omits the `timestamp` field when `hide` is true.
    #[must_use]
    pub fn hide_timestamp(mut self, hide: bool) -> Self {
        self.hide_timestamp = hide;
        self
    }

    /// Returns the output format.
    #[must_use]
    pub fn format(&self) -> LogFormat {
        self.format
    }

    /// Returns the standard fields prepended to every line.
    #[must_use]
    pub fn standard_fields(&self) -> &Fields {
        &self.standard
    }

    fn render(&self, level: Level, fields: &Fields) -> String {
        let mut line = Fields::new();
        line.extend(self.standard.clone());
        line.extend(fields.clone());
        line.push("level", level.as_str());
        if !self.hide_timestamp {
            line.push(
                "timestamp",
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            );
        }

        let mut out = match self.format {
            LogFormat::Logfmt => render_logfmt(&line),
            LogFormat::Json => render_json(&line),
        };
        out.push('\n');
        out
    }

    fn write_line(&self, level: Level, fields: &Fields) {
        let line = self.render(level, fields);
        let mut writer = self.writer.lock();
        // A logger has nowhere to report its own write failures.
        let _ = writer.write_all(line.as_bytes());
        let _ = writer.flush();
    }
}

impl std::fmt::Debug for StructuredLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuredLogger")
            .field("format", &self.format)
            .field("standard", &self.standard)
            .field("hide_timestamp", &self.hide_timestamp)
            .finish_non_exhaustive()
    }
}

impl Logger for StructuredLogger {
    fn log_info(&self, fields: Fields) {
        self.write_line(Level::Info, &fields);
    }

    fn log_error(&self, fields: Fields) {
        self.write_line(Level::Error, &fields);
    }

    fn with_fields(&self, fields: Fields) -> SharedLogger {
        Arc::new(Self {
            writer: Arc::clone(&self.writer),
            format: self.format,
            standard: self.standard.merged(&fields),
            hide_timestamp: self.hide_timestamp,
        })
    }
}

/// Renders fields as space-separated logfmt pairs, without a newline.
#[must_use]
pub fn render_logfmt(fields: &Fields) -> String {
    let mut out = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        write_key(&mut out, &field.key);
        out.push('=');
        write_value(&mut out, &field.value.render());
    }
    out
}

fn render_json(fields: &Fields) -> String {
    let object: BTreeMap<&str, &FieldValue> = fields
        .iter()
        .map(|field| (field.key.as_str(), &field.value))
        .collect();
    serde_json::to_string(&object).unwrap_or_else(|e| {
        format!(
            r#"{{"level":"error","msg":"unencodable log line: {}"}}"#,
            e.to_string().replace('"', "'")
        )
    })
}

fn needs_quoting(c: char) -> bool {
    c <= ' ' || c == '=' || c == '"' || c.is_control()
}

fn write_key(out: &mut String, key: &str) {
    if key.is_empty() {
        out.push('_');
        return;
    }
    out.extend(key.chars().map(|c| if needs_quoting(c) { '_' } else { c }));
}

fn write_value(out: &mut String, value: &str) {
    if !value.chars().any(needs_quoting) {
        out.push_str(value);
        return;
    }

    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", u32::from(c));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}
