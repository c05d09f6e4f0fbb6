//! The metrics capability.

use std::sync::Arc;
use std::time::Instant;

/// Shared, thread-safe recorder handle.
pub type SharedMetrics = Arc<dyn MetricsRecorder>;

/// Records counters, timings and gauges.
///
/// [`with_tag`](MetricsRecorder::with_tag) is non-mutating: it returns a new
/// recorder carrying the extra tag, and the receiver keeps emitting without
/// it.
pub trait MetricsRecorder: Send + Sync + 'static {
    /// Increments the named counter by one.
    fn increment_count(&self, name: &str) {
        self.increment_count_by(name, 1);
    }

    /// Increments the named counter by `amount`.
    fn increment_count_by(&self, name: &str, amount: i64);

    /// Records the milliseconds elapsed since `since` as a timing.
    fn measure_since(&self, name: &str, since: Instant) {
        self.measure_duration_ms(name, since.elapsed().as_secs_f64() * 1000.0);
    }

    /// Records a timing expressed in milliseconds.
    fn measure_duration_ms(&self, name: &str, duration_ms: f64);

    /// Sets the named gauge.
    fn set_gauge(&self, name: &str, value: f64);

    /// Returns a new recorder that adds `key:value` to every metric.
    fn with_tag(&self, key: &str, value: &str) -> SharedMetrics;
}

/// A recorder that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRecorder;

impl NoopRecorder {
    /// Returns a shared no-op recorder.
    #[must_use]
    pub fn shared() -> SharedMetrics {
        Arc::new(Self)
    }
}

impl MetricsRecorder for NoopRecorder {
    fn increment_count_by(&self, _name: &str, _amount: i64) {}

    fn measure_duration_ms(&self, _name: &str, _duration_ms: f64) {}

    fn set_gauge(&self, _name: &str, _value: f64) {}

    fn with_tag(&self, _key: &str, _value: &str) -> SharedMetrics {
        Arc::new(Self)
    }
}
