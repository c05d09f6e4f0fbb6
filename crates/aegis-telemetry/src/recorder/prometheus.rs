//! Prometheus metrics via the `metrics` facade.
//!
//! [`PrometheusRecorder`] forwards to the `metrics` crate macros, turning
//! tags into labels. Nothing is exported until [`init_prometheus`] installs
//! the global `metrics-exporter-prometheus` recorder; before that every call
//! is a no-op.
//!
//! Counters map to Prometheus counters, timings to histograms (in
//! milliseconds) and gauges to gauges.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use aegis_core::{MetricsRecorder, SharedMetrics};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::{Arc, OnceLock};

/// Global metrics handle for rendering.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the Prometheus recorder as the global `metrics` recorder.
///
/// Calling this more than once is harmless; later calls keep the first
/// handle.
pub fn init_prometheus() -> TelemetryResult<()> {
    if PROMETHEUS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let _ = PROMETHEUS_HANDLE.set(handle);
    Ok(())
}

/// Renders metrics in Prometheus text format.
///
/// Returns `None` if [`init_prometheus`] has not run.
#[must_use]
pub fn render_prometheus() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(PrometheusHandle::render)
}

/// Forwards metrics to the global `metrics` recorder.
#[derive(Debug, Clone, Default)]
pub struct PrometheusRecorder {
    prefix: Option<String>,
    labels: Vec<(String, String)>,
}

impl PrometheusRecorder {
    /// Creates a recorder without prefix or labels.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a prefix joined to every metric name with `_`.
    #[must_use]
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = (!prefix.is_empty()).then(|| prefix.to_string());
        self
    }

    /// Returns the labels attached to every metric.
    #[must_use]
    pub fn labels(&self) -> &[(String, String)] {
        &self.labels
    }

    /// Converts a dotted statsd-style name into a Prometheus metric name.
    ///
    /// Characters outside `[a-zA-Z0-9_:]` become `_`.
    #[must_use]
    pub fn metric_name(&self, name: &str) -> String {
        let joined = match &self.prefix {
            Some(prefix) => format!("{prefix}_{name}"),
            None => name.to_string(),
        };
        let mut sanitized: String = joined
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == ':' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if sanitized.starts_with(|c: char| c.is_ascii_digit()) {
            sanitized.insert(0, '_');
        }
        sanitized
    }
}

impl MetricsRecorder for PrometheusRecorder {
    fn increment_count_by(&self, name: &str, amount: i64) {
        let amount = u64::try_from(amount).unwrap_or(0);
        counter!(self.metric_name(name), &self.labels).increment(amount);
    }

    fn measure_duration_ms(&self, name: &str, duration_ms: f64) {
        histogram!(self.metric_name(name), &self.labels).record(duration_ms);
    }

    fn set_gauge(&self, name: &str, value: f64) {
        gauge!(self.metric_name(name), &self.labels).set(value);
    }

    fn with_tag(&self, key: &str, value: &str) -> SharedMetrics {
        let mut labels = self.labels.clone();
        labels.push((key.to_string(), value.to_string()));
        Arc::new(Self {
            prefix: self.prefix.clone(),
            labels,
        })
    }
}
