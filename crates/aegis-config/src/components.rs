//! Sinks built from configuration.
//!
//! Anything left unconfigured becomes a no-op:
//!
//! | Section   | Configured                                   | Absent         |
//! |-----------|----------------------------------------------|----------------|
//! | `logging` | `StructuredLogger` on stdout, stderr or file | (always built) |
//! | `metrics` | statsd, dogstatsd, multi-statsd, prometheus  | `NoopRecorder` |
//! | `monitor` | `DsnMonitor`, or `LogMonitor` with `log`     | `NoopMonitor`  |
//! | `events`  | `HttpEventSink`, or `LogEventSink` with `log`| `NoopEventSink`|

use crate::schema::{EventsSection, LogTarget, LoggingSection, MetricsSection, MonitorSection};
use crate::{AegisConfig, ConfigError};
use aegis_core::{
    Dependencies, NoopEventSink, NoopMonitor, NoopRecorder, SharedEventSink, SharedLogger,
    SharedMetrics, SharedMonitor,
};
use aegis_telemetry::{
    init_prometheus, DsnMonitor, HttpEventSink, LogEventSink, LogMonitor, MultiStatsdRecorder,
    PrometheusRecorder, StatsdRecorder, StructuredLogger, TeedRecorder,
};
use std::fmt;
use std::sync::Arc;

/// The sinks a service runs with.
#[derive(Clone)]
pub struct Components {
    /// Application logger.
    pub logger: SharedLogger,
    /// Metrics recorder.
    pub metrics: SharedMetrics,
    /// Crash monitor.
    pub monitor: SharedMonitor,
    /// Event sink.
    pub events: SharedEventSink,
}

impl Components {
    /// Builds every sink described by `config`.
    ///
    /// Fails only when a configured sink cannot be created, for example an
    /// unwritable log file or an unresolvable statsd host.
    pub fn from_config(config: &AegisConfig) -> Result<Self, ConfigError> {
        let logger = build_logger(&config.logging)?;
        let metrics = build_metrics(&config.metrics)?;
        let monitor = build_monitor(&config.monitor, &logger);
        let events = build_events(&config.events, &logger);
        Ok(Self {
            logger,
            metrics,
            monitor,
            events,
        })
    }

    /// Returns the sinks as request-context dependencies.
    #[must_use]
    pub fn dependencies(&self) -> Dependencies {
        Dependencies::new(
            Arc::clone(&self.logger),
            Arc::clone(&self.metrics),
            Arc::clone(&self.monitor),
        )
        .with_events(Arc::clone(&self.events))
    }
}

impl fmt::Debug for Components {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Components").finish_non_exhaustive()
    }
}

fn build_logger(section: &LoggingSection) -> Result<SharedLogger, ConfigError> {
    let logger = match &section.target {
        LogTarget::Stdout => StructuredLogger::stdout(section.format),
        LogTarget::Stderr => StructuredLogger::stderr(section.format),
        LogTarget::File(path) => StructuredLogger::file(path, section.format)
            .map_err(|e| ConfigError::component("logger", e))?,
    };
    Ok(Arc::new(logger.hide_timestamp(section.hide_timestamp)))
}

fn build_metrics(section: &MetricsSection) -> Result<SharedMetrics, ConfigError> {
    let mut recorders: Vec<SharedMetrics> = Vec::new();

    match section.endpoints.as_slice() {
        [] => {}
        [endpoint] => {
            let recorder = if section.dogstatsd {
                StatsdRecorder::dogstatsd(endpoint, &section.namespace)
            } else {
                StatsdRecorder::new(endpoint, &section.namespace)
            }
            .map_err(|e| ConfigError::component("metrics", e))?;
            recorders.push(Arc::new(match &section.prefix {
                Some(prefix) => recorder.with_prefix(prefix),
                None => recorder,
            }));
        }
        endpoints => {
            let recorder = MultiStatsdRecorder::new(endpoints, &section.namespace)
                .map_err(|e| ConfigError::component("metrics", e))?;
            recorders.push(Arc::new(match &section.prefix {
                Some(prefix) => recorder.with_prefix(prefix),
                None => recorder,
            }));
        }
    }

    if section.prometheus {
        init_prometheus().map_err(|e| ConfigError::component("metrics", e))?;
        let recorder = PrometheusRecorder::new();
        recorders.push(Arc::new(match &section.prefix {
            Some(prefix) => recorder.with_prefix(prefix),
            None => recorder,
        }));
    }

    Ok(match recorders.len() {
        0 => NoopRecorder::shared(),
        1 => recorders.remove(0),
        _ => Arc::new(TeedRecorder::new(recorders)),
    })
}

fn build_monitor(section: &MonitorSection, logger: &SharedLogger) -> SharedMonitor {
    if let Some(monitor) = section.dsn.as_deref().and_then(DsnMonitor::new) {
        return Arc::new(monitor);
    }
    if section.log {
        return Arc::new(LogMonitor::new(Arc::clone(logger)));
    }
    NoopMonitor::shared()
}

fn build_events(section: &EventsSection, logger: &SharedLogger) -> SharedEventSink {
    if let Some(url) = &section.url {
        return Arc::new(HttpEventSink::new(url.clone()));
    }
    if section.log {
        return Arc::new(LogEventSink::new(Arc::clone(logger)));
    }
    Arc::new(NoopEventSink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::{fields, EventSink, Logger, MetricsRecorder, Monitor};

    #[test]
    fn test_everything_absent_is_noop() {
        let components = Components::from_config(&AegisConfig::default()).unwrap();
        components.metrics.increment_count("anything");
        components.monitor.capture_exception(&std::fmt::Error);
        components.events.send_event("nothing", fields!());
        let _ = components.dependencies();
    }

    #[test]
    fn test_file_logger_writes_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let mut config = AegisConfig::default();
        config.logging.target = LogTarget::File(path.clone());
        config.logging.hide_timestamp = true;

        let components = Components::from_config(&config).unwrap();
        components.logger.log_info(fields!("foo", "bar", "hello"));

        let written = std::fs::read_to_string(path).unwrap();
        assert_eq!(written.trim_end(), "foo=bar msg=hello level=info");
    }

    #[test]
    fn test_unwritable_log_file_fails() {
        let mut config = AegisConfig::default();
        config.logging.target = LogTarget::File("/nonexistent-dir/aegis/app.log".into());
        let err = Components::from_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::Component { component: "logger", .. }));
    }

    #[test]
    fn test_statsd_and_monitor_are_built() {
        let mut config = AegisConfig::default();
        config.metrics.endpoints = vec!["127.0.0.1:8125".to_string()];
        config.metrics.namespace = "svc".to_string();
        config.monitor.dsn = Some("https://key@sentry.example.com/7".to_string());

        let components = Components::from_config(&config).unwrap();
        components.metrics.increment_count("boot");
    }

    #[test]
    fn test_multiple_endpoints() {
        let mut config = AegisConfig::default();
        config.metrics.endpoints = vec!["127.0.0.1:8125".to_string(), "127.0.0.1:8126".to_string()];
        assert!(Components::from_config(&config).is_ok());
    }
}
