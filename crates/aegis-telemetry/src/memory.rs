//! In-memory sinks that record everything they receive.
//!
//! These are used by the pipeline's own tests and are handy in application
//! tests that assert on logging, metrics or crash reports.
//!
//! ```
//! use aegis_core::{fields, Logger, MetricsRecorder};
//! use aegis_telemetry::memory::{MemoryLogger, MemoryRecorder};
//!
//! let logger = MemoryLogger::new();
//! logger.with_fields(fields!("requestID", "abc")).log_info(fields!("hello"));
//! assert_eq!(logger.lines()[0].get_str("requestID"), Some("abc"));
//!
//! let metrics = MemoryRecorder::new();
//! metrics.increment_count("unauthorized");
//! assert_eq!(metrics.count("unauthorized"), 1);
//! ```

use crate::logger::Level;
use aegis_core::{
    EventSink, FieldValue, Fields, Logger, MetricsRecorder, Monitor, SharedLogger, SharedMetrics,
};
use parking_lot::Mutex;
use std::error::Error;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::Notify;

/// A cloneable byte buffer implementing `std::io::Write`.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the buffered bytes as text.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    /// Returns the buffered text and clears the buffer.
    pub fn take(&self) -> String {
        let bytes = std::mem::take(&mut *self.0.lock());
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Returns the buffered text split into lines.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// One line captured by [`MemoryLogger`].
#[derive(Debug, Clone, PartialEq)]
pub struct LogLine {
    /// Line severity.
    pub level: Level,
    /// Standard fields followed by call fields.
    pub fields: Fields,
}

impl LogLine {
    /// Returns the value of `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// Returns the value of `key` if it is text.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(FieldValue::as_str)
    }

    /// Returns the `msg` field.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.get_str(aegis_core::MSG_KEY)
    }
}

/// A logger that records lines in memory.
///
/// Derived loggers share the same store.
#[derive(Debug, Clone, Default)]
pub struct MemoryLogger {
    lines: Arc<Mutex<Vec<LogLine>>>,
    standard: Fields,
}

impl MemoryLogger {
    /// Creates an empty logger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the logger as a shared handle.
    #[must_use]
    pub fn shared(&self) -> SharedLogger {
        Arc::new(self.clone())
    }

    /// Returns every recorded line.
    #[must_use]
    pub fn lines(&self) -> Vec<LogLine> {
        self.lines.lock().clone()
    }

    /// Returns recorded lines whose `msg` equals `message`.
    #[must_use]
    pub fn lines_with_message(&self, message: &str) -> Vec<LogLine> {
        self.lines
            .lock()
            .iter()
            .filter(|line| line.message() == Some(message))
            .cloned()
            .collect()
    }

    fn record(&self, level: Level, fields: Fields) {
        let line = LogLine {
            level,
            fields: self.standard.merged(&fields),
        };
        self.lines.lock().push(line);
    }
}

impl Logger for MemoryLogger {
    fn log_info(&self, fields: Fields) {
        self.record(Level::Info, fields);
    }

    fn log_error(&self, fields: Fields) {
        self.record(Level::Error, fields);
    }

    fn with_fields(&self, fields: Fields) -> SharedLogger {
        Arc::new(Self {
            lines: Arc::clone(&self.lines),
            standard: self.standard.merged(&fields),
        })
    }
}

/// Kind of a recorded metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Counter increment.
    Count,
    /// Timing in milliseconds.
    Timing,
    /// Gauge value.
    Gauge,
}

/// One metric captured by [`MemoryRecorder`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedMetric {
    /// Metric kind.
    pub kind: MetricKind,
    /// Metric name.
    pub name: String,
    /// Increment, duration or gauge value.
    pub value: f64,
    /// `key:value` tags in the order they were added.
    pub tags: Vec<String>,
}

/// A metrics recorder that records everything in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecorder {
    metrics: Arc<Mutex<Vec<RecordedMetric>>>,
    tags: Vec<String>,
}

impl MemoryRecorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorder as a shared handle.
    #[must_use]
    pub fn shared(&self) -> SharedMetrics {
        Arc::new(self.clone())
    }

    /// Returns every recorded metric.
    #[must_use]
    pub fn metrics(&self) -> Vec<RecordedMetric> {
        self.metrics.lock().clone()
    }

    /// Returns the tags this recorder adds.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Returns the summed increments of the counter `name`.
    #[must_use]
    pub fn count(&self, name: &str) -> i64 {
        self.metrics
            .lock()
            .iter()
            .filter(|m| m.kind == MetricKind::Count && m.name == name)
            .map(|m| m.value as i64)
            .sum()
    }

    /// Returns all timings recorded under `name`.
    #[must_use]
    pub fn timings(&self, name: &str) -> Vec<RecordedMetric> {
        self.metrics
            .lock()
            .iter()
            .filter(|m| m.kind == MetricKind::Timing && m.name == name)
            .cloned()
            .collect()
    }

    fn record(&self, kind: MetricKind, name: &str, value: f64) {
        self.metrics.lock().push(RecordedMetric {
            kind,
            name: name.to_string(),
            value,
            tags: self.tags.clone(),
        });
    }
}

impl MetricsRecorder for MemoryRecorder {
    fn increment_count_by(&self, name: &str, amount: i64) {
        self.record(MetricKind::Count, name, amount as f64);
    }

    fn measure_duration_ms(&self, name: &str, duration_ms: f64) {
        self.record(MetricKind::Timing, name, duration_ms);
    }

    fn set_gauge(&self, name: &str, value: f64) {
        self.record(MetricKind::Gauge, name, value);
    }

    fn with_tag(&self, key: &str, value: &str) -> SharedMetrics {
        let mut tags = self.tags.clone();
        tags.push(format!("{key}:{value}"));
        Arc::new(Self {
            metrics: Arc::clone(&self.metrics),
            tags,
        })
    }
}

/// One report captured by [`MemoryMonitor`].
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedException {
    /// The error's `Display` output.
    pub message: String,
    /// Tags passed with the report.
    pub tags: Fields,
}

/// A monitor that records reports in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryMonitor {
    captured: Arc<Mutex<Vec<CapturedException>>>,
}

impl MemoryMonitor {
    /// Creates an empty monitor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the monitor as a shared handle.
    #[must_use]
    pub fn shared(&self) -> aegis_core::SharedMonitor {
        Arc::new(self.clone())
    }

    /// Returns every captured report.
    #[must_use]
    pub fn captured(&self) -> Vec<CapturedException> {
        self.captured.lock().clone()
    }
}

impl Monitor for MemoryMonitor {
    fn capture_exception_with_tags(&self, err: &(dyn Error + 'static), tags: Fields) {
        self.captured.lock().push(CapturedException {
            message: err.to_string(),
            tags,
        });
    }
}

/// One event captured by [`MemoryEventSink`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedEvent {
    /// Event name.
    pub name: String,
    /// Event fields.
    pub fields: Fields,
}

/// An event sink that records events in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventSink {
    events: Arc<Mutex<Vec<RecordedEvent>>>,
    notify: Arc<Notify>,
}

impl MemoryEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every received event.
    #[must_use]
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    /// Waits until at least `count` events have arrived and returns them.
    pub async fn wait_for(&self, count: usize) -> Vec<RecordedEvent> {
        loop {
            let notified = self.notify.notified();
            {
                let events = self.events.lock();
                if events.len() >= count {
                    return events.clone();
                }
            }
            notified.await;
        }
    }
}

impl EventSink for MemoryEventSink {
    fn send_event(&self, name: &str, fields: Fields) {
        self.events.lock().push(RecordedEvent {
            name: name.to_string(),
            fields,
        });
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::fields;

    #[test]
    fn test_memory_logger_shares_store_across_derivations() {
        let logger = MemoryLogger::new();
        let derived = logger.with_fields(fields!("requestID", "abc"));
        derived.log_error_message("boom", Fields::new());
        logger.log_info(fields!("plain"));

        let lines = logger.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].level, Level::Error);
        assert_eq!(lines[0].get_str("requestID"), Some("abc"));
        assert_eq!(lines[0].message(), Some("boom"));
        assert!(lines[1].get("requestID").is_none());
    }

    #[test]
    fn test_memory_recorder_counts_and_tags() {
        let recorder = MemoryRecorder::new();
        let tagged = recorder.with_tag("url", "/ping");
        tagged.increment_count("hits");
        recorder.increment_count_by("hits", 2);

        assert_eq!(recorder.count("hits"), 3);
        let metrics = recorder.metrics();
        assert_eq!(metrics[0].tags, vec!["url:/ping".to_string()]);
        assert!(metrics[1].tags.is_empty());
        assert!(recorder.tags().is_empty());
    }

    #[test]
    fn test_memory_monitor_records() {
        let monitor = MemoryMonitor::new();
        let err = std::io::Error::new(std::io::ErrorKind::Other, "Bar");
        monitor.capture_exception(&err);
        assert_eq!(monitor.captured()[0].message, "Bar");
    }

    #[tokio::test]
    async fn test_memory_event_sink_wait_for() {
        let sink = MemoryEventSink::new();
        let producer = sink.clone();
        tokio::spawn(async move {
            producer.send_event("started", fields!("foo", "bar"));
        });

        let events = sink.wait_for(1).await;
        assert_eq!(events[0].name, "started");
    }
}
