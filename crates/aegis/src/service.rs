//! A service assembled from configuration.

use aegis_config::{AegisConfig, Components, ConfigError, ConfigLoader};
use aegis_core::{Dependencies, HandlerResult, Request, Response};
use aegis_middleware::stages::{BasicAuthMiddleware, RequestLogMiddleware};
use aegis_middleware::{BoxFuture, CancellationSignal, Handler, Middleware, ScopedContext};
use aegis_server::{Dispatch, MiddlewareMux, ServeMux, Server, ServerConfig, ServerError};
use aegis_telemetry::{init_logging, render_prometheus, TelemetryError};
use bytes::Bytes;
use http::{header, HeaderValue, StatusCode};
use http_body_util::Full;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration file read by [`Service::load`] when present.
pub const DEFAULT_CONFIG_FILE: &str = "aegis.toml";

/// Environment prefix read by [`Service::load`].
pub const ENV_PREFIX: &str = "AEGIS";

/// Path of the Prometheus scrape endpoint.
pub const METRICS_PATH: &str = "/metrics";

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Errors raised while assembling or running a [`Service`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Configuration could not be loaded, validated or turned into sinks.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Framework diagnostics could not be installed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// The server failed to bind or accept.
    #[error(transparent)]
    Server(#[from] ServerError),
}

/// How requests reach handlers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Shape {
    /// Each handler is wrapped in its own endpoint binding with a built-in
    /// recovery boundary. Only user stages run in front of it.
    #[default]
    Endpoint,
    /// Every request runs through the default middleware chain.
    Chain,
}

enum Mux {
    Endpoint(ServeMux),
    Chain(MiddlewareMux),
}

/// A dispatcher built from an [`AegisConfig`].
///
/// Sinks come from [`Components::from_config`]. When the configuration
/// carries credentials a basic auth stage guards every route, and when
/// Prometheus is enabled its exposition is served at [`METRICS_PATH`].
///
/// ```no_run
/// use aegis::prelude::*;
/// use aegis::{Service, Shape};
///
/// async fn hello(_ctx: ScopedContext, _req: Request) -> HandlerResult {
///     Ok(json_response(StatusCode::OK, "hello"))
/// }
///
/// # async fn run() -> Result<(), aegis::ServiceError> {
/// let mut service = Service::load(Shape::Endpoint)?;
/// service.init_diagnostics()?;
/// service.handle("/hello", hello);
/// service.serve().await?;
/// # Ok(())
/// # }
/// ```
pub struct Service {
    config: AegisConfig,
    components: Components,
    shape: Shape,
    mux: Mux,
}

impl Service {
    /// Loads `.env`, [`DEFAULT_CONFIG_FILE`] if present and `AEGIS__*`
    /// overrides, then builds the service.
    pub fn load(shape: Shape) -> Result<Self, ServiceError> {
        let config = ConfigLoader::new()
            .with_dotenv()
            .with_optional_file(DEFAULT_CONFIG_FILE)?
            .with_env_prefix(ENV_PREFIX)
            .load()?;
        Self::from_config(config, shape)
    }

    /// Loads `path` and `AEGIS__*` overrides, then builds the service.
    pub fn load_file(path: impl AsRef<Path>, shape: Shape) -> Result<Self, ServiceError> {
        let config = ConfigLoader::new()
            .with_file(path)?
            .with_env_prefix(ENV_PREFIX)
            .load()?;
        Self::from_config(config, shape)
    }

    /// Builds the service from an already loaded configuration.
    ///
    /// The endpoint shape always stamps log lines, whatever
    /// `logging.hide_timestamp` says.
    pub fn from_config(config: AegisConfig, shape: Shape) -> Result<Self, ServiceError> {
        config.validate()?;
        let components = match shape {
            Shape::Endpoint if config.logging.hide_timestamp => {
                let mut stamped = config.clone();
                stamped.logging.hide_timestamp = false;
                Components::from_config(&stamped)?
            }
            _ => Components::from_config(&config)?,
        };
        let dependencies = components.dependencies();

        let mut service = Self {
            mux: Mux::new(shape, dependencies),
            config,
            components,
            shape,
        };

        if service.config.logging.request_log {
            service.use_outer_stage(RequestLogMiddleware::new());
        }
        let auth = service
            .config
            .auth
            .credentials()
            .map(|(user, password)| BasicAuthMiddleware::new(user, password));
        if let Some(stage) = auth {
            service.use_stage(stage);
        }
        if service.config.metrics.prometheus {
            service.handle(METRICS_PATH, prometheus_exposition);
        }

        tracing::debug!(
            shape = ?service.shape,
            patterns = ?service.patterns(),
            "service assembled"
        );
        Ok(service)
    }

    /// Installs the `tracing` subscriber for framework diagnostics.
    pub fn init_diagnostics(&self) -> Result<(), ServiceError> {
        init_logging(&self.config.logging.diagnostics())?;
        Ok(())
    }

    /// Registers `handler` for `pattern`, replacing any earlier registration.
    pub fn handle<H: Handler>(&mut self, pattern: &str, handler: H) -> &mut Self {
        match &mut self.mux {
            Mux::Endpoint(mux) => {
                mux.handle(pattern, handler);
            }
            Mux::Chain(mux) => {
                mux.handle(pattern, handler);
            }
        }
        self
    }

    /// Appends a stage after the ones already registered.
    pub fn use_stage<M: Middleware>(&mut self, stage: M) -> &mut Self {
        match &mut self.mux {
            Mux::Endpoint(mux) => {
                mux.use_stage(stage);
            }
            Mux::Chain(mux) => {
                mux.use_stage(stage);
            }
        }
        self
    }

    /// Adds a stage outside the recovery boundary, ahead of the stages
    /// registered so far in the endpoint shape.
    ///
    /// Such a stage sees the final status of every matched request, a
    /// recovered panic included.
    pub fn use_outer_stage<M: Middleware>(&mut self, stage: M) -> &mut Self {
        match &mut self.mux {
            Mux::Endpoint(mux) => {
                mux.use_outer_stage(stage);
            }
            Mux::Chain(mux) => {
                mux.use_outer_stage(stage);
            }
        }
        self
    }

    /// Returns every registered pattern.
    #[must_use]
    pub fn patterns(&self) -> Vec<&str> {
        match &self.mux {
            Mux::Endpoint(mux) => mux.patterns(),
            Mux::Chain(mux) => mux.patterns(),
        }
    }

    /// Returns the dispatch shape.
    #[must_use]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Returns the configuration the service was built from.
    #[must_use]
    pub fn config(&self) -> &AegisConfig {
        &self.config
    }

    /// Returns the sinks built from the configuration.
    #[must_use]
    pub fn components(&self) -> &Components {
        &self.components
    }

    /// Wraps the service in a [`Server`] using the configured shutdown
    /// timeout.
    pub fn into_server(self) -> Server<Self> {
        let timeout = Duration::from_secs(self.config.server.shutdown_timeout_secs);
        Server::new(self).with_config(ServerConfig::builder().shutdown_timeout(timeout).build())
    }

    /// Serves on the configured host and port until SIGTERM or SIGINT.
    pub async fn serve(self) -> Result<(), ServiceError> {
        let host = self.config.server.host.clone();
        let port = self.config.server.port;
        self.into_server().serve(&host, port).await?;
        Ok(())
    }
}

impl Mux {
    fn new(shape: Shape, dependencies: Dependencies) -> Self {
        match shape {
            Shape::Endpoint => Self::Endpoint(ServeMux::from_dependencies(dependencies)),
            Shape::Chain => Self::Chain(MiddlewareMux::with_default_stages(dependencies)),
        }
    }
}

impl Dispatch for Service {
    fn dispatch(
        &self,
        request: Request,
        upstream: Option<CancellationSignal>,
    ) -> BoxFuture<'_, Response> {
        match &self.mux {
            Mux::Endpoint(mux) => mux.dispatch(request, upstream),
            Mux::Chain(mux) => mux.dispatch(request, upstream),
        }
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("shape", &self.shape)
            .field("patterns", &self.patterns())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

async fn prometheus_exposition(_ctx: ScopedContext, _request: Request) -> HandlerResult {
    let body = render_prometheus().unwrap_or_default();
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(PROMETHEUS_CONTENT_TYPE),
    );
    Ok(response)
}
