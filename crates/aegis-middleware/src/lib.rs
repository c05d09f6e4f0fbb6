//! # Aegis Middleware
//!
//! The per-request context and the middleware chain for Aegis.
//!
//! Every request gets a [`ScopedContext`]: a fresh [`RequestId`], a logger
//! already bound with `requestID`, the metrics recorder, the crash monitor,
//! a [`CancellationSignal`] and a first-write-wins [`StatusCapture`]. The
//! context then flows through a [`MiddlewareChain`], an immutable list of
//! [`Middleware`] stages wrapped around a [`Handler`].
//!
//! ## Default chain
//!
//! ```text
//! Request → StatusCapture → RequestId → Logger → Metrics → Monitor → Recovery → Handler
//! ```
//!
//! The recovery stage turns a panic into a 500 JSON error, logs and
//! reports it, and fires the request's cancellation signal. A handler that
//! returns `Err` gets the JSON error envelope for the error's status.
//!
//! ## Example
//!
//! ```
//! use aegis_middleware::chain::DefaultStage;
//!
//! let stages = DefaultStage::all();
//! assert_eq!(stages[0].name(), "status_capture");
//! assert_eq!(stages[5].name(), "recovery");
//! ```
//!
//! [`RequestId`]: aegis_core::RequestId

#![doc(html_root_url = "https://docs.rs/aegis-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cancel;
pub mod chain;
pub mod context;
pub mod handler;
pub mod middleware;
pub mod stages;
pub mod status;
pub mod types;

pub use cancel::{CancellationSignal, FireOnDrop};
pub use chain::{BoxedMiddleware, DefaultStage, MiddlewareChain, MiddlewareChainBuilder};
pub use context::{ContextTemplate, ScopedContext, REQUEST_ID_FIELD};
pub use handler::{finish_response, Handler, SharedHandler};
pub use middleware::{BoxFuture, FnMiddleware, Middleware, Next};
pub use stages::request_id::REQUEST_ID_HEADER;
pub use status::StatusCapture;
pub use types::{Request, RequestExt, Response};
