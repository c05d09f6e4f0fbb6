//! Concrete [`Monitor`] implementations.
//!
//! - [`LogMonitor`] writes each report as an error log line.
//! - [`DsnMonitor`] posts reports to a Sentry-compatible store endpoint
//!   described by a DSN such as `https://key@sentry.example.com/42`.

use aegis_core::{fields, Fields, Monitor, SharedLogger};
use chrono::{SecondsFormat, Utc};
use reqwest::Url;
use serde::Serialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;

/// Reports exceptions as error log lines.
#[derive(Clone)]
pub struct LogMonitor {
    logger: SharedLogger,
}

impl LogMonitor {
    /// Wraps `logger`.
    pub fn new(logger: SharedLogger) -> Self {
        Self { logger }
    }
}

impl fmt::Debug for LogMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogMonitor").finish_non_exhaustive()
    }
}

impl Monitor for LogMonitor {
    fn capture_exception_with_tags(&self, err: &(dyn Error + 'static), tags: Fields) {
        let line = tags.with("error", err.to_string());
        self.logger.log_error_message("exception captured", line);
    }
}

/// Parsed `scheme://public_key@host[:port]/project` DSN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    /// `http` or `https`.
    pub scheme: String,
    /// Public key used for authentication.
    pub public_key: String,
    /// Host name.
    pub host: String,
    /// Explicit port, if any.
    pub port: Option<u16>,
    /// Project identifier.
    pub project_id: String,
}

impl Dsn {
    /// Parses a DSN, returning `None` when it is malformed.
    #[must_use]
    pub fn parse(dsn: &str) -> Option<Self> {
        let url = Url::parse(dsn).ok()?;
        if !matches!(url.scheme(), "http" | "https") || url.username().is_empty() {
            return None;
        }
        let project_id = url
            .path_segments()?
            .filter(|segment| !segment.is_empty())
            .last()?
            .to_string();

        Some(Self {
            scheme: url.scheme().to_string(),
            public_key: url.username().to_string(),
            host: url.host_str()?.to_string(),
            port: url.port(),
            project_id,
        })
    }

    /// Returns the event store endpoint.
    #[must_use]
    pub fn store_url(&self) -> String {
        let port = self.port.map(|p| format!(":{p}")).unwrap_or_default();
        format!(
            "{}://{}{}/api/{}/store/",
            self.scheme, self.host, port, self.project_id
        )
    }

    /// Returns the `X-Sentry-Auth` header value.
    #[must_use]
    pub fn auth_header(&self) -> String {
        format!(
            "Sentry sentry_version=7, sentry_client=aegis/{}, sentry_key={}",
            env!("CARGO_PKG_VERSION"),
            self.public_key
        )
    }
}

#[derive(Debug, Serialize)]
struct ExceptionValue {
    #[serde(rename = "type")]
    kind: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct ExceptionList {
    values: Vec<ExceptionValue>,
}

/// The JSON document posted for one report.
#[derive(Debug, Serialize)]
struct StoreEvent {
    event_id: String,
    timestamp: String,
    level: &'static str,
    platform: &'static str,
    message: String,
    exception: ExceptionList,
    tags: BTreeMap<String, String>,
}

impl StoreEvent {
    fn new(err: &(dyn Error + 'static), tags: &Fields) -> Self {
        let message = err.to_string();
        let mut chain = vec![ExceptionValue {
            kind: "Error".to_string(),
            value: message.clone(),
        }];
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(ExceptionValue {
                kind: "Cause".to_string(),
                value: cause.to_string(),
            });
            source = cause.source();
        }

        Self {
            event_id: uuid::Uuid::new_v4().simple().to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            level: "error",
            platform: "other",
            message,
            exception: ExceptionList { values: chain },
            tags: tags
                .iter()
                .map(|field| (field.key.clone(), field.value.render()))
                .collect(),
        }
    }
}

/// Posts reports to a Sentry-compatible store endpoint.
///
/// Each report is sent on its own tokio task; the caller never waits on the
/// network. Reports made outside a tokio runtime are dropped with a
/// diagnostic.
#[derive(Debug, Clone)]
pub struct DsnMonitor {
    dsn: Dsn,
    client: reqwest::Client,
}

impl DsnMonitor {
    /// Creates a monitor for `dsn`, or `None` if the DSN is malformed.
    #[must_use]
    pub fn new(dsn: &str) -> Option<Self> {
        Some(Self {
            dsn: Dsn::parse(dsn)?,
            client: reqwest::Client::new(),
        })
    }

    /// Returns the parsed DSN.
    #[must_use]
    pub fn dsn(&self) -> &Dsn {
        &self.dsn
    }
}

impl Monitor for DsnMonitor {
    fn capture_exception_with_tags(&self, err: &(dyn Error + 'static), tags: Fields) {
        let event = StoreEvent::new(err, &tags);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(error = %event.message, "dropping exception report outside a runtime");
            return;
        };

        let request = self
            .client
            .post(self.dsn.store_url())
            .header("X-Sentry-Auth", self.dsn.auth_header())
            .json(&event);

        runtime.spawn(async move {
            match request.send().await {
                Ok(response) if !response.status().is_success() => {
                    tracing::warn!(status = %response.status(), "exception report rejected");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "failed to send exception report"),
            }
        });
    }
}

/// Builds the standard tag list for a request-scoped report.
#[must_use]
pub fn request_tags(request_id: &str, endpoint: &str) -> Fields {
    fields!("requestID", request_id, "endpoint", endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryLogger;

    #[test]
    fn test_malformed_dsn_gives_none() {
        assert!(DsnMonitor::new("abc123daef").is_none());
        assert!(DsnMonitor::new("https://sentry.example.com/42").is_none());
        assert!(DsnMonitor::new("https://key@sentry.example.com/").is_none());
        assert!(DsnMonitor::new("ftp://key@sentry.example.com/42").is_none());
    }

    #[test]
    fn test_dsn_parse() {
        let dsn = Dsn::parse("https://public@sentry.example.com:9000/42").unwrap();
        assert_eq!(dsn.public_key, "public");
        assert_eq!(dsn.host, "sentry.example.com");
        assert_eq!(dsn.port, Some(9000));
        assert_eq!(dsn.project_id, "42");
        assert_eq!(
            dsn.store_url(),
            "https://sentry.example.com:9000/api/42/store/"
        );
        assert!(dsn.auth_header().contains("sentry_key=public"));
    }

    #[test]
    fn test_store_event_carries_tags_and_chain() {
        let inner = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        let outer = aegis_core::HandlerError::internal_with_source("save failed", inner);
        let event = StoreEvent::new(&outer, &request_tags("abc", "/save"));

        assert_eq!(event.message, "save failed");
        assert_eq!(event.exception.values.len(), 2);
        assert_eq!(event.tags["requestID"], "abc");
        assert_eq!(event.tags["endpoint"], "/save");
        assert_eq!(event.event_id.len(), 32);
    }

    #[test]
    fn test_capture_outside_runtime_is_dropped() {
        let monitor = DsnMonitor::new("http://key@127.0.0.1:9/1").unwrap();
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        monitor.capture_exception(&err);
    }

    #[test]
    fn test_log_monitor_logs_error_with_tags() {
        let logger = MemoryLogger::new();
        let monitor = LogMonitor::new(logger.shared());
        let err = std::io::Error::new(std::io::ErrorKind::Other, "Bar");
        monitor.capture_exception_with_tags(&err, request_tags("abc", "/ping"));

        let lines = logger.lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].get_str("requestID"), Some("abc"));
        assert_eq!(lines[0].get_str("error"), Some("Bar"));
        assert_eq!(lines[0].message(), Some("exception captured"));
    }
}
