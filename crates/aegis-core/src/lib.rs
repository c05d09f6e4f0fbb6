//! # Aegis Core
//!
//! Core types and capability traits for the Aegis request pipeline.
//!
//! This crate provides the foundational types used throughout Aegis:
//!
//! - [`RequestId`] - UUID v7 request identifier
//! - [`Fields`] / [`FieldValue`] - Ordered structured key/value data
//! - [`Logger`], [`MetricsRecorder`], [`Monitor`], [`EventSink`] - Narrow
//!   capability traits every sink implements, each with a no-op default
//! - [`HandlerError`] - Handler error taxonomy and status mapping
//! - [`json_response`] / [`json_error_response`] - The JSON response helpers
//! - [`defaults`] - Opt-in process-wide default sinks

#![doc(html_root_url = "https://docs.rs/aegis-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod defaults;
mod error;
mod events;
mod fields;
mod logger;
mod metrics;
mod monitor;
mod request_id;
mod response;

pub use defaults::Dependencies;
pub use error::{
    ErrorCategory, HandlerError, HandlerResult, SerializationError, AUTHENTICATION_ERROR_MESSAGE,
};
pub use events::{EventSink, NoopEventSink, SharedEventSink};
pub use fields::{Field, FieldValue, Fields, MSG_KEY};
pub use logger::{Logger, NoopLogger, SharedLogger};
pub use metrics::{MetricsRecorder, NoopRecorder, SharedMetrics};
pub use monitor::{Monitor, NoopMonitor, SharedMonitor};
pub use request_id::RequestId;
pub use response::{
    empty_response, json_error_response, json_response, try_json_response, ErrorBody, Request,
    Response, APPLICATION_JSON, MARSHAL_ERROR_MESSAGE,
};
