//! # Aegis Server
//!
//! Path dispatch, endpoint bindings and the HTTP server for Aegis.
//!
//! - [`ServeMux`] binds each pattern to an [`EndpointBinding`] and runs the
//!   binding's [`ContextHandler`] after any extra stages.
//! - [`MiddlewareMux`] runs a generic [`MiddlewareChain`] around plain
//!   handlers.
//! - [`Server`] serves any [`Dispatch`] over HTTP/1.1 with graceful
//!   shutdown.
//!
//! Patterns follow serve-mux rules: `/x` matches exactly, `/x/` matches the
//! subtree, and the longest match wins. Unmatched paths get a 404 JSON
//! error.
//!
//! [`MiddlewareChain`]: aegis_middleware::MiddlewareChain

#![doc(html_root_url = "https://docs.rs/aegis-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod binding;
pub mod config;
pub mod dispatch;
pub mod mux;
pub mod router;
pub mod server;
pub mod shutdown;

pub use binding::{ContextHandler, EndpointBinding, URL_TAG};
pub use config::{ServerConfig, ServerConfigBuilder};
pub use dispatch::{Dispatch, NOT_FOUND_MESSAGE};
pub use mux::{MiddlewareMux, ServeMux};
pub use router::{PathMatch, PathRouter};
pub use server::{Server, ServerError, BODY_READ_ERROR_MESSAGE};
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownSignal};
