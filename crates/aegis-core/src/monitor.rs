//! The crash-reporting capability.

use crate::fields::Fields;
use std::error::Error;
use std::sync::Arc;

/// Shared, thread-safe monitor handle.
pub type SharedMonitor = Arc<dyn Monitor>;

/// Reports errors to an external crash-reporting service.
pub trait Monitor: Send + Sync + 'static {
    /// Reports `err` without tags.
    fn capture_exception(&self, err: &(dyn Error + 'static)) {
        self.capture_exception_with_tags(err, Fields::new());
    }

    /// Reports `err` with structured tags such as `requestID` and `endpoint`.
    fn capture_exception_with_tags(&self, err: &(dyn Error + 'static), tags: Fields);
}

/// A monitor that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl NoopMonitor {
    /// Returns a shared no-op monitor.
    #[must_use]
    pub fn shared() -> SharedMonitor {
        Arc::new(Self)
    }
}

impl Monitor for NoopMonitor {
    fn capture_exception_with_tags(&self, _err: &(dyn Error + 'static), _tags: Fields) {}
}
