//! Adapter turning stdlib-style log lines into structured error lines.
//!
//! Libraries that only know how to write text to an `io::Write` can be
//! pointed at a [`LogLineWriter`]. Lines of the form
//! `YYYY/MM/DD HH:MM:SS file.rs:42: message` are split into a `timestamp`
//! and a `msg`, and forwarded to the wrapped logger at error level.

use aegis_core::{Fields, SharedLogger, MSG_KEY};
use chrono::{NaiveDateTime, SecondsFormat};
use regex::Regex;
use std::io::{self, Write};
use std::sync::OnceLock;

const LINE_PATTERN: &str = concat!(
    r"(?s)^(?P<date>[0-9]{4}/[0-9]{2}/[0-9]{2})?[ ]?",
    r"(?P<time>[0-9]{2}:[0-9]{2}:[0-9]{2}(\.[0-9]+)?)?[ ]?",
    r"(?P<file>.+?:[0-9]+)?",
    r"(: )?(?P<msg>.*)",
);

fn line_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(LINE_PATTERN).ok()).as_ref()
}

/// An `io::Write` that forwards each written line to a [`Logger`](aegis_core::Logger).
pub struct LogLineWriter {
    logger: SharedLogger,
}

impl LogLineWriter {
    /// Wraps `logger`.
    pub fn new(logger: SharedLogger) -> Self {
        Self { logger }
    }
}

impl std::fmt::Debug for LogLineWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogLineWriter").finish_non_exhaustive()
    }
}

impl Write for LogLineWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        let line = text.trim_end_matches(['\r', '\n']);
        self.logger.log_error(parse_line(line));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Splits a stdlib-style log line into `timestamp` and `msg` fields.
#[must_use]
pub fn parse_line(line: &str) -> Fields {
    let mut fields = Fields::new();

    let Some(captures) = line_pattern().and_then(|re| re.captures(line)) else {
        fields.push(MSG_KEY, line);
        return fields;
    };

    let part = |name: &str| {
        captures
            .name(name)
            .map(|m| m.as_str())
            .filter(|s| !s.is_empty())
    };

    let timestamp = match (part("date"), part("time")) {
        (Some(date), Some(time)) => Some(format!("{date} {time}")),
        (Some(date), None) => Some(date.to_string()),
        (None, Some(time)) => Some(time.to_string()),
        (None, None) => None,
    };

    if let Some(raw) = timestamp {
        let value = NaiveDateTime::parse_from_str(&raw, "%Y/%m/%d %H:%M:%S%.f").map_or(raw, |t| {
            t.and_utc().to_rfc3339_opts(SecondsFormat::AutoSi, true)
        });
        fields.push("timestamp", value);
    }

    fields.push(MSG_KEY, part("msg").unwrap_or_default());
    fields
}
