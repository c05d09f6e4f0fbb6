//! Concrete observability sinks for Aegis.
//!
//! The pipeline only talks to the capability traits in `aegis-core`. This
//! crate provides the implementations services plug in:
//!
//! - **Logging**: [`StructuredLogger`] (logfmt or JSON lines),
//!   [`TracingLogger`] (forwards into `tracing`), and [`LogLineWriter`]
//!   (adapts stdlib-style text logs)
//! - **Metrics**: statsd, dogstatsd, multi-endpoint, teed and Prometheus
//!   recorders in [`recorder`]
//! - **Monitoring**: [`LogMonitor`] and the Sentry-compatible [`DsnMonitor`]
//! - **Events**: [`Event`] fan-out with [`LogEventSink`] and [`HttpEventSink`]
//! - **Testing**: recording sinks in [`memory`]
//!
//! Framework diagnostics use `tracing`; [`init_logging`] installs the
//! subscriber.
//!
//! # Example
//!
//! ```rust,ignore
//! use aegis_telemetry::{LogFormat, StructuredLogger, recorder::StatsdRecorder};
//!
//! let logger = StructuredLogger::stderr(LogFormat::Logfmt);
//! let metrics = StatsdRecorder::dogstatsd("127.0.0.1:8125", "myservice")?;
//! ```

#![warn(missing_docs)]

pub mod adapter;
pub mod error;
pub mod events;
pub mod logger;
pub mod logging;
pub mod memory;
pub mod monitor;
pub mod recorder;
pub mod tracing_logger;

pub use adapter::LogLineWriter;
pub use error::TelemetryError;
pub use events::{Event, HttpEventSink, LogEventSink};
pub use logger::{Level, LogFormat, StructuredLogger};
pub use logging::{init_logging, LogConfig};
pub use monitor::{Dsn, DsnMonitor, LogMonitor};
pub use recorder::{
    init_prometheus, render_prometheus, MultiStatsdRecorder, PrometheusRecorder, StatsdRecorder,
    TeedRecorder,
};
pub use tracing_logger::TracingLogger;

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
