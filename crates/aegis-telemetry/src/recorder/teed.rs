//! Fan-out recorder.

use aegis_core::{MetricsRecorder, SharedMetrics};
use std::sync::Arc;

/// Forwards every metric to each of its child recorders.
///
/// `with_tag` tags every child and returns a new tee over the tagged
/// children.
#[derive(Clone, Default)]
pub struct TeedRecorder {
    recorders: Vec<SharedMetrics>,
}

impl TeedRecorder {
    /// Creates a tee over `recorders`.
    pub fn new(recorders: Vec<SharedMetrics>) -> Self {
        Self { recorders }
    }

    /// Returns the child recorders.
    #[must_use]
    pub fn recorders(&self) -> &[SharedMetrics] {
        &self.recorders
    }
}

impl std::fmt::Debug for TeedRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TeedRecorder")
            .field("recorders", &self.recorders.len())
            .finish()
    }
}

impl MetricsRecorder for TeedRecorder {
    fn increment_count_by(&self, name: &str, amount: i64) {
        for recorder in &self.recorders {
            recorder.increment_count_by(name, amount);
        }
    }

    fn measure_duration_ms(&self, name: &str, duration_ms: f64) {
        for recorder in &self.recorders {
            recorder.measure_duration_ms(name, duration_ms);
        }
    }

    fn set_gauge(&self, name: &str, value: f64) {
        for recorder in &self.recorders {
            recorder.set_gauge(name, value);
        }
    }

    fn with_tag(&self, key: &str, value: &str) -> SharedMetrics {
        Arc::new(Self {
            recorders: self
                .recorders
                .iter()
                .map(|recorder| recorder.with_tag(key, value))
                .collect(),
        })
    }
}
