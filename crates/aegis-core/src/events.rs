//! The event-notification capability.

use crate::fields::Fields;
use std::sync::Arc;

/// Shared, thread-safe event sink handle.
pub type SharedEventSink = Arc<dyn EventSink>;

/// Accepts a named set of fields.
///
/// Delivery is fire-and-forget: there is no acknowledgement, no retry and no
/// ordering guarantee across sinks.
pub trait EventSink: Send + Sync + 'static {
    /// Delivers one event.
    fn send_event(&self, name: &str, fields: Fields);
}

/// A sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn send_event(&self, _name: &str, _fields: Fields) {}
}
