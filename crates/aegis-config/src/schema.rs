//! Configuration sections.
//!
//! Every field has a default, so any section or field may be omitted. Unknown
//! fields are rejected.

use aegis_telemetry::{LogConfig, LogFormat};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Listen address and shutdown behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Host or IP to bind.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds to wait for open connections on shutdown.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// Where application log lines go.
///
/// Serialized as `"stdout"`, `"stderr"` or a file path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LogTarget {
    /// Standard output.
    #[default]
    Stdout,
    /// Standard error.
    Stderr,
    /// Append to a file.
    File(PathBuf),
}

impl From<String> for LogTarget {
    fn from(value: String) -> Self {
        match value.as_str() {
            "stdout" | "" => Self::Stdout,
            "stderr" => Self::Stderr,
            _ => Self::File(PathBuf::from(value)),
        }
    }
}

impl From<LogTarget> for String {
    fn from(target: LogTarget) -> Self {
        target.to_string()
    }
}

impl fmt::Display for LogTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Application logging and framework diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Destination of application log lines.
    #[serde(default)]
    pub target: LogTarget,

    /// `logfmt` or `json`.
    #[serde(default)]
    pub format: LogFormat,

    /// Omit the `timestamp` field. Ignored by the endpoint shape, whose
    /// logger always stamps its lines.
    #[serde(default)]
    pub hide_timestamp: bool,

    /// Log `request started` and `request_ended` for every request.
    #[serde(default)]
    pub request_log: bool,

    /// Filter directive for framework diagnostics.
    #[serde(default = "default_diagnostics_level")]
    pub diagnostics_level: String,

    /// Emit framework diagnostics as JSON.
    #[serde(default = "default_true")]
    pub diagnostics_json: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            target: LogTarget::default(),
            format: LogFormat::default(),
            hide_timestamp: false,
            request_log: false,
            diagnostics_level: default_diagnostics_level(),
            diagnostics_json: true,
        }
    }
}

impl LoggingSection {
    /// Returns the `tracing` subscriber settings for framework diagnostics.
    #[must_use]
    pub fn diagnostics(&self) -> LogConfig {
        LogConfig {
            level: self.diagnostics_level.clone(),
            json_format: self.diagnostics_json,
            ..LogConfig::default()
        }
    }
}

fn default_diagnostics_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

/// Optional basic authentication.
///
/// Either both fields are set or neither is.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct AuthSection {
    /// Expected user.
    #[serde(default)]
    pub user: Option<String>,

    /// Expected password.
    #[serde(default)]
    pub password: Option<String>,
}

impl AuthSection {
    /// Returns the credentials when both are configured.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.user, &self.password) {
            (Some(user), Some(password)) => Some((user, password)),
            _ => None,
        }
    }
}

impl fmt::Debug for AuthSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSection")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Metrics sinks.
///
/// With no endpoint and Prometheus disabled, metrics are discarded.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    /// Statsd endpoints as `host:port`.
    #[serde(default)]
    pub endpoints: Vec<String>,

    /// Namespace prepended to every metric name.
    #[serde(default)]
    pub namespace: String,

    /// Prefix placed between the namespace and the metric name.
    #[serde(default)]
    pub prefix: Option<String>,

    /// Send dogstatsd tags. Only applies to a single endpoint.
    #[serde(default)]
    pub dogstatsd: bool,

    /// Also record into the Prometheus exporter.
    #[serde(default)]
    pub prometheus: bool,
}

/// Crash reporting.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MonitorSection {
    /// Sentry-style DSN `scheme://key@host[:port]/project`.
    #[serde(default)]
    pub dsn: Option<String>,

    /// Report exceptions as error log lines when no DSN is set.
    #[serde(default)]
    pub log: bool,
}

/// Event delivery.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EventsSection {
    /// POST events as JSON to this URL.
    #[serde(default)]
    pub url: Option<String>,

    /// Log events at info level when no URL is set.
    #[serde(default)]
    pub log: bool,
}
