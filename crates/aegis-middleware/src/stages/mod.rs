//! Built-in middleware stages.
//!
//! The default chain, outermost first:
//!
//! 1. [`status_capture`] - record the response status
//! 2. [`request_id`] - publish the request id
//! 3. [`logger`] - bind the logger with `requestID` and `path`
//! 4. [`metrics`] - bind the recorder and time the request
//! 5. [`monitor`] - bind the crash monitor
//! 6. [`recovery`] - turn panics into 500 responses
//!
//! [`basic_auth`] and [`request_log`] are opt-in.

pub mod basic_auth;
pub mod logger;
pub mod metrics;
pub mod monitor;
pub mod recovery;
pub mod request_id;
pub mod request_log;
pub mod status_capture;

pub use basic_auth::BasicAuthMiddleware;
pub use logger::LoggerMiddleware;
pub use metrics::MetricsMiddleware;
pub use monitor::MonitorMiddleware;
pub use recovery::RecoveryMiddleware;
pub use request_id::RequestIdMiddleware;
pub use request_log::RequestLogMiddleware;
pub use status_capture::StatusCaptureMiddleware;
