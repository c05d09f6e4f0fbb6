//! A [`Logger`] that forwards into `tracing`.
//!
//! Useful when a service already routes everything through a
//! `tracing-subscriber` pipeline and wants application lines there too.
//! The `msg` field becomes the event message; the remaining fields are
//! rendered as a logfmt string in the `fields` attribute.

use crate::logger::render_logfmt;
use aegis_core::{Fields, Logger, SharedLogger, MSG_KEY};
use std::sync::Arc;

/// Forwards log lines as `tracing` events with target `aegis::app`.
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    standard: Fields,
}

impl TracingLogger {
    /// Creates a logger without standard fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn split(&self, fields: Fields) -> (String, String) {
        let mut message = String::new();
        let mut rest = Fields::new();
        for field in self.standard.merged(&fields) {
            if field.key == MSG_KEY && message.is_empty() {
                message = field.value.render();
            } else {
                rest.push(field.key, field.value);
            }
        }
        (message, render_logfmt(&rest))
    }
}

impl Logger for TracingLogger {
    fn log_info(&self, fields: Fields) {
        let (message, rendered) = self.split(fields);
        tracing::info!(target: "aegis::app", fields = %rendered, "{message}");
    }

    fn log_error(&self, fields: Fields) {
        let (message, rendered) = self.split(fields);
        tracing::error!(target: "aegis::app", fields = %rendered, "{message}");
    }

    fn with_fields(&self, fields: Fields) -> SharedLogger {
        Arc::new(Self {
            standard: self.standard.merged(&fields),
        })
    }
}
