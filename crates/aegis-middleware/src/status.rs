//! First-write-wins response status.

use http::StatusCode;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

/// Records the first status code written for a request.
///
/// Clones share the same cell. The value is `0` until something records a
/// status; later records are ignored, so an outer stage that replaces the
/// response cannot overwrite what the handler produced.
#[derive(Debug, Clone, Default)]
pub struct StatusCapture {
    status: Arc<AtomicU16>,
}

impl StatusCapture {
    /// Creates an empty capture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `status` if nothing was recorded before.
    ///
    /// Returns true if this call stored the value.
    pub fn record(&self, status: StatusCode) -> bool {
        self.status
            .compare_exchange(0, status.as_u16(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Returns the captured status, `0` when unknown.
    #[must_use]
    pub fn get(&self) -> u16 {
        self.status.load(Ordering::SeqCst)
    }

    /// Returns the captured status as a [`StatusCode`].
    #[must_use]
    pub fn status_code(&self) -> Option<StatusCode> {
        StatusCode::from_u16(self.get()).ok()
    }

    /// Returns true once a status has been recorded.
    #[must_use]
    pub fn is_recorded(&self) -> bool {
        self.get() != 0
    }
}
