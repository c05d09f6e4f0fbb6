//! Opt-in process-wide default sinks.
//!
//! Muxes and chains always take their logger, recorder and monitor
//! explicitly. Code that would rather configure sinks once at startup can
//! install them here and build from [`default_template`]:
//!
//! ```
//! use aegis_core::defaults;
//! use aegis_core::{Logger, NoopLogger};
//!
//! defaults::set_default_logger(NoopLogger::shared());
//! let deps = defaults::default_template();
//! deps.logger.log_info(aegis_core::fields!("started"));
//! ```
//!
//! Nothing in the pipeline reads these values implicitly.

use crate::events::{NoopEventSink, SharedEventSink};
use crate::logger::{NoopLogger, SharedLogger};
use crate::metrics::{NoopRecorder, SharedMetrics};
use crate::monitor::{NoopMonitor, SharedMonitor};
use parking_lot::RwLock;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// The set of sinks a request context is built from.
#[derive(Clone)]
pub struct Dependencies {
    /// Structured logger.
    pub logger: SharedLogger,
    /// Metrics recorder.
    pub metrics: SharedMetrics,
    /// Crash reporter.
    pub monitor: SharedMonitor,
    /// Event sink.
    pub events: SharedEventSink,
}

impl Dependencies {
    /// Creates a set of sinks from explicit values.
    pub fn new(logger: SharedLogger, metrics: SharedMetrics, monitor: SharedMonitor) -> Self {
        Self {
            logger,
            metrics,
            monitor,
            events: Arc::new(NoopEventSink),
        }
    }

    /// Creates a set of sinks that discard everything.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(
            NoopLogger::shared(),
            NoopRecorder::shared(),
            NoopMonitor::shared(),
        )
    }

    /// Replaces the event sink.
    pub fn with_events(mut self, events: SharedEventSink) -> Self {
        self.events = events;
        self
    }
}

impl Default for Dependencies {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependencies").finish_non_exhaustive()
    }
}

fn slot() -> &'static RwLock<Dependencies> {
    static DEFAULTS: OnceLock<RwLock<Dependencies>> = OnceLock::new();
    DEFAULTS.get_or_init(|| RwLock::new(Dependencies::noop()))
}

/// Installs the process-wide default logger.
pub fn set_default_logger(logger: SharedLogger) {
    slot().write().logger = logger;
}

/// Installs the process-wide default metrics recorder.
pub fn set_default_metrics(metrics: SharedMetrics) {
    slot().write().metrics = metrics;
}

/// Installs the process-wide default monitor.
pub fn set_default_monitor(monitor: SharedMonitor) {
    slot().write().monitor = monitor;
}

/// Installs the process-wide default event sink.
pub fn set_default_events(events: SharedEventSink) {
    slot().write().events = events;
}

/// Returns a snapshot of the process-wide defaults.
///
/// Later calls to the setters do not affect an already returned snapshot.
#[must_use]
pub fn default_template() -> Dependencies {
    slot().read().clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::Fields;
    use crate::events::EventSink;
    use crate::logger::Logger;
    use crate::metrics::MetricsRecorder;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(Arc<AtomicUsize>);

    impl Logger for Counting {
        fn log_info(&self, _fields: Fields) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn log_error(&self, _fields: Fields) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn with_fields(&self, _fields: Fields) -> SharedLogger {
            Arc::new(Counting(Arc::clone(&self.0)))
        }
    }

    #[test]
    fn test_defaults_are_snapshots() {
        let before = default_template();

        let count = Arc::new(AtomicUsize::new(0));
        set_default_logger(Arc::new(Counting(Arc::clone(&count))));

        before.logger.log_info(Fields::new());
        assert_eq!(count.load(Ordering::SeqCst), 0);

        default_template().logger.log_info(Fields::new());
        assert_eq!(count.load(Ordering::SeqCst), 1);

        set_default_logger(NoopLogger::shared());
    }

    #[test]
    fn test_noop_dependencies() {
        let deps = Dependencies::default();
        deps.metrics.increment_count("requests");
        deps.events.send_event("started", Fields::new());
        assert!(format!("{deps:?}").starts_with("Dependencies"));
    }
}
