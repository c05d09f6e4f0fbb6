//! The logging capability.
//!
//! Pipeline code never talks to a concrete log backend. It holds an
//! `Arc<dyn Logger>` and derives per-endpoint and per-request loggers with
//! [`Logger::with_fields`], which always returns a new logger and leaves the
//! receiver untouched.

use crate::fields::{Fields, MSG_KEY};
use std::sync::Arc;

/// Shared, thread-safe logger handle.
pub type SharedLogger = Arc<dyn Logger>;

/// A structured key/value logger.
///
/// Implementations must be safe for concurrent use; a single logger is
/// shared by every request hitting an endpoint.
pub trait Logger: Send + Sync + 'static {
    /// Emits `fields` at info level.
    fn log_info(&self, fields: Fields);

    /// Emits `fields` at error level.
    fn log_error(&self, fields: Fields);

    /// Returns a new logger that prepends `fields` to every line.
    fn with_fields(&self, fields: Fields) -> SharedLogger;

    /// Emits `fields` followed by `msg` at info level.
    fn log_info_message(&self, message: &str, fields: Fields) {
        self.log_info(fields.with(MSG_KEY, message));
    }

    /// Emits `fields` followed by `msg` at error level.
    fn log_error_message(&self, message: &str, fields: Fields) {
        self.log_error(fields.with(MSG_KEY, message));
    }
}

/// A logger that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl NoopLogger {
    /// Returns a shared no-op logger.
    #[must_use]
    pub fn shared() -> SharedLogger {
        Arc::new(Self)
    }
}

impl Logger for NoopLogger {
    fn log_info(&self, _fields: Fields) {}

    fn log_error(&self, _fields: Fields) {}

    fn with_fields(&self, _fields: Fields) -> SharedLogger {
        Arc::new(Self)
    }
}
