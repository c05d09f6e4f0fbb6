//! HTTP server.
//!
//! [`Server`] accepts connections with tokio and speaks HTTP/1.1 through
//! hyper. Every request is handed to a [`Dispatch`] implementation with the
//! connection's cancellation signal as its upstream.
//!
//! ```rust,ignore
//! use aegis_server::{Server, ServeMux};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), aegis_server::ServerError> {
//!     let mux = ServeMux::new(logger, metrics, monitor);
//!     Server::new(mux).serve("0.0.0.0", 8080).await
//! }
//! ```

use crate::config::ServerConfig;
use crate::dispatch::Dispatch;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};
use aegis_core::{json_error_response, Response};
use aegis_middleware::CancellationSignal;
use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

/// Message of the 400 returned when a request body cannot be read.
pub const BODY_READ_ERROR_MESSAGE: &str = "Failed to read request body";

/// Errors returned by [`Server`].
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Other I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Serves a [`Dispatch`] over HTTP/1.1.
pub struct Server<D> {
    dispatch: Arc<D>,
    config: ServerConfig,
}

impl<D: Dispatch> Server<D> {
    /// Creates a server with the default configuration.
    pub fn new(dispatch: D) -> Self {
        Self {
            dispatch: Arc::new(dispatch),
            config: ServerConfig::default(),
        }
    }

    /// Replaces the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<D> {
        &self.dispatch
    }

    /// Serves on `host:port` until SIGTERM or SIGINT.
    ///
    /// A bind failure is returned immediately and never retried.
    pub async fn serve(self, host: &str, port: u16) -> Result<(), ServerError> {
        self.serve_with_shutdown(host, port, ShutdownSignal::with_os_signals())
            .await
    }

    /// Serves on `host:port` until `shutdown` is triggered.
    pub async fn serve_with_shutdown(
        self,
        host: &str,
        port: u16,
        shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let addr = format!("{host}:{port}");
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        self.serve_listener(listener, shutdown).await
    }

    /// Serves connections from an already bound listener.
    pub async fn serve_listener(
        self,
        listener: TcpListener,
        shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let local = listener.local_addr()?;
        tracing::info!(addr = %local, "server listening");

        let tracker = ConnectionTracker::new();
        let keep_alive = self.config.keep_alive();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote)) => {
                        let dispatch = Arc::clone(&self.dispatch);
                        let signal = shutdown.connection_signal();
                        let token = tracker.acquire();
                        tokio::spawn(async move {
                            serve_connection(dispatch, stream, remote, signal, keep_alive).await;
                            drop(token);
                        });
                    }
                    Err(e) => tracing::error!(error = %e, "failed to accept connection"),
                },
                () = shutdown.recv() => {
                    tracing::info!("shutdown requested, no longer accepting connections");
                    break;
                }
            }
        }

        let timeout = self.config.shutdown_timeout();
        tracing::info!(
            active = tracker.active_connections(),
            timeout = ?timeout,
            "waiting for open connections"
        );
        if tokio::time::timeout(timeout, tracker.wait_idle()).await.is_err() {
            tracing::warn!(
                active = tracker.active_connections(),
                "shutdown timeout reached with connections still open"
            );
        }

        tracing::info!("server stopped");
        Ok(())
    }
}

impl<D> std::fmt::Debug for Server<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Serves one connection; `signal` fires when the connection ends.
async fn serve_connection<D: Dispatch>(
    dispatch: Arc<D>,
    stream: TcpStream,
    remote: SocketAddr,
    signal: CancellationSignal,
    keep_alive: bool,
) {
    let upstream = signal.clone();
    let service = service_fn(move |request: http::Request<Incoming>| {
        let dispatch = Arc::clone(&dispatch);
        let upstream = upstream.clone();
        async move { Ok::<_, Infallible>(handle_request(dispatch.as_ref(), request, upstream).await) }
    });

    let connection = http1::Builder::new()
        .keep_alive(keep_alive)
        .serve_connection(TokioIo::new(stream), service);
    tokio::pin!(connection);

    let result = tokio::select! {
        result = connection.as_mut() => result,
        () = signal.fired() => {
            tracing::debug!(%remote, "draining connection for shutdown");
            connection.as_mut().graceful_shutdown();
            connection.as_mut().await
        }
    };
    if let Err(e) = result {
        tracing::debug!(%remote, error = %e, "connection closed with error");
    }
    signal.fire();
}

async fn handle_request<D: Dispatch>(
    dispatch: &D,
    request: http::Request<Incoming>,
    upstream: CancellationSignal,
) -> Response {
    let (parts, body) = request.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read request body");
            return json_error_response(StatusCode::BAD_REQUEST, &BODY_READ_ERROR_MESSAGE);
        }
    };

    let request = http::Request::from_parts(parts, Full::<Bytes>::new(body));
    dispatch.dispatch(request, Some(upstream)).await
}
