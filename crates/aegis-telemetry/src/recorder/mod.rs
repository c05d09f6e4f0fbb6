//! Concrete [`MetricsRecorder`](aegis_core::MetricsRecorder) implementations.
//!
//! | Recorder | Backend |
//! |----------|---------|
//! | [`StatsdRecorder`] | statsd or dogstatsd over UDP |
//! | [`MultiStatsdRecorder`] | several statsd endpoints |
//! | [`TeedRecorder`] | fan-out to any recorders |
//! | [`PrometheusRecorder`] | the `metrics` facade and Prometheus exporter |

mod prometheus;
mod statsd;
mod teed;

pub use prometheus::{init_prometheus, render_prometheus, PrometheusRecorder};
pub use statsd::{MultiStatsdRecorder, StatsdRecorder};
pub use teed::TeedRecorder;
