//! # Aegis
//!
//! A per-request execution pipeline for HTTP services. Every request gets a
//! request id, a logger pre-bound with it, metrics, a status capture and a
//! cancellation signal. A handler failure, panic included, never crashes the
//! process and always yields a well-formed JSON error.
//!
//! ## Crates
//!
//! | Module | Crate | Contents |
//! |--------|-------|----------|
//! | [`core`] | `aegis-core` | request id, fields, capability traits, errors, JSON helpers |
//! | [`telemetry`] | `aegis-telemetry` | structured logger, statsd and Prometheus recorders, monitors, events |
//! | [`middleware`] | `aegis-middleware` | context, chain, handler, stages |
//! | [`server`] | `aegis-server` | muxes, dispatch, hyper server, shutdown |
//! | [`config`] | `aegis-config` | layered configuration and sink construction |
//!
//! ## Example
//!
//! ```rust,ignore
//! use aegis::prelude::*;
//!
//! async fn hello(ctx: ScopedContext, _req: Request) -> HandlerResult {
//!     ctx.logger().log_info(fields!("greeting", "hello"));
//!     Ok(json_response(StatusCode::OK, "hello"))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), aegis::ServiceError> {
//!     let mut service = Service::load(Shape::Chain)?;
//!     service.init_diagnostics()?;
//!     service.handle("/hello", hello);
//!     service.serve().await
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/aegis/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod service;

pub use aegis_config as config;
pub use aegis_core as core;
pub use aegis_middleware as middleware;
pub use aegis_server as server;
pub use aegis_telemetry as telemetry;

pub use service::{
    Service, ServiceError, Shape, DEFAULT_CONFIG_FILE, ENV_PREFIX, METRICS_PATH,
};

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use aegis::prelude::*;
/// ```
pub mod prelude {
    pub use aegis_core::{
        empty_response, fields, json_error_response, json_response, Dependencies, EventSink,
        Fields, HandlerError, HandlerResult, Logger, MetricsRecorder, Monitor, Request, RequestId,
        Response,
    };

    pub use aegis_middleware::stages::{BasicAuthMiddleware, RecoveryMiddleware};
    pub use aegis_middleware::{
        BoxFuture, CancellationSignal, Handler, Middleware, MiddlewareChain, Next, ScopedContext,
    };

    pub use aegis_server::{Dispatch, MiddlewareMux, ServeMux, Server, ServerConfig};

    pub use aegis_config::{AegisConfig, ConfigLoader};

    pub use http::{Method, StatusCode};

    pub use crate::{Service, Shape};
}
