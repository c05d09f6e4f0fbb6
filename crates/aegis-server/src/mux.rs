//! Request multiplexers.
//!
//! Two shapes share the same path table and the same [`Dispatch`] seam:
//!
//! - [`ServeMux`] binds each pattern to an [`EndpointBinding`] whose sinks
//!   are tagged with the pattern. Requests run the registered stages and
//!   then the binding's [`ContextHandler`], which carries its own recovery
//!   boundary and timing metric.
//! - [`MiddlewareMux`] runs a plain [`MiddlewareChain`] around the handler.
//!   [`MiddlewareMux::with_defaults`] installs the default chain.
//!
//! Both answer unmatched paths with a 404 JSON error, and both guard the
//! whole chain so that a panic in any stage still produces a 500.

use crate::binding::{ContextHandler, EndpointBinding};
use crate::dispatch::{not_found, Dispatch};
use crate::router::PathRouter;
use aegis_core::{
    Dependencies, NoopLogger, NoopMonitor, NoopRecorder, Request, Response, SharedLogger,
    SharedMetrics, SharedMonitor,
};
use aegis_middleware::chain::recovery_position;
use aegis_middleware::stages::recovery::{recover_panic, PanicError};
use aegis_middleware::{
    finish_response, BoxFuture, BoxedMiddleware, CancellationSignal, ContextTemplate, Handler,
    Middleware, MiddlewareChain, MiddlewareChainBuilder, ScopedContext, SharedHandler,
};
use futures_util::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Runs `chain` around `terminal`, converting any escaped panic into a 500.
///
/// The request's signal fires when this returns or when the future is dropped.
async fn run_guarded<H>(
    chain: &MiddlewareChain,
    ctx: ScopedContext,
    request: Request,
    terminal: H,
) -> Response
where
    H: FnOnce(&mut ScopedContext, Request) -> BoxFuture<'static, Response> + Send + 'static,
{
    let observer = ctx.clone();
    let _guard = observer.cancellation().fire_on_drop();
    let method = request.method().clone();
    let outcome = AssertUnwindSafe(chain.process(ctx, request, terminal))
        .catch_unwind()
        .await;

    let response = match outcome {
        Ok(response) => response,
        Err(payload) => {
            let panic = PanicError::from_payload(payload.as_ref());
            recover_panic(&observer, &method, &panic)
        }
    };
    observer.cancellation().fire();
    response
}

fn rebuild(stages: &[BoxedMiddleware]) -> MiddlewareChain {
    stages
        .iter()
        .fold(MiddlewareChain::builder(), |builder, stage| {
            builder.boxed_stage(Arc::clone(stage))
        })
        .build()
}

/// Dispatches to endpoint bindings.
///
/// ```rust
/// use aegis_core::{json_response, HandlerResult, NoopLogger, NoopMonitor, NoopRecorder, Request};
/// use aegis_middleware::ScopedContext;
/// use aegis_server::ServeMux;
/// use http::StatusCode;
///
/// async fn ping(_ctx: ScopedContext, _req: Request) -> HandlerResult {
///     Ok(json_response(StatusCode::OK, "pong"))
/// }
///
/// let mut mux = ServeMux::new(NoopLogger::shared(), NoopRecorder::shared(), NoopMonitor::shared());
/// mux.handle("/ping", ping);
/// assert_eq!(mux.patterns(), vec!["/ping"]);
/// ```
pub struct ServeMux {
    dependencies: Dependencies,
    router: PathRouter<Arc<EndpointBinding>>,
    stages: Vec<BoxedMiddleware>,
    chain: MiddlewareChain,
    fallback: ContextTemplate,
}

impl ServeMux {
    /// Creates a mux over explicit sinks.
    pub fn new(logger: SharedLogger, metrics: SharedMetrics, monitor: SharedMonitor) -> Self {
        Self::from_dependencies(Dependencies::new(logger, metrics, monitor))
    }

    /// Creates a mux over a full set of sinks, event sink included.
    pub fn from_dependencies(dependencies: Dependencies) -> Self {
        Self {
            fallback: ContextTemplate::new(dependencies.clone(), ""),
            dependencies,
            router: PathRouter::new(),
            stages: Vec::new(),
            chain: MiddlewareChain::default(),
        }
    }

    /// Registers `handler` for `pattern`, replacing any earlier registration.
    pub fn handle<H: Handler>(&mut self, pattern: &str, handler: H) -> &mut Self {
        self.handle_shared(pattern, Arc::new(handler))
    }

    /// Registers an already shared handler.
    pub fn handle_shared(&mut self, pattern: &str, handler: SharedHandler) -> &mut Self {
        let binding = Arc::new(self.endpoint_for(pattern, handler));
        if self.router.insert(pattern, binding).is_some() {
            tracing::warn!(pattern, "replacing existing handler");
        }
        self
    }

    /// Adds a stage that runs before every endpoint handler.
    ///
    /// Stages run in registration order.
    pub fn use_stage<M: Middleware>(&mut self, stage: M) -> &mut Self {
        self.stages.push(Arc::new(stage));
        self.chain = rebuild(&self.stages);
        self
    }

    /// Adds a stage that runs before every stage registered so far.
    ///
    /// Endpoint stages already sit outside the handler's recovery boundary.
    pub fn use_outer_stage<M: Middleware>(&mut self, stage: M) -> &mut Self {
        self.stages.insert(0, Arc::new(stage));
        self.chain = rebuild(&self.stages);
        self
    }

    /// Builds the binding `handle` would register, without registering it.
    #[must_use]
    pub fn endpoint_for(&self, pattern: &str, handler: SharedHandler) -> EndpointBinding {
        EndpointBinding::new(pattern, &self.dependencies, handler)
    }

    /// Returns the binding registered for exactly `pattern`.
    #[must_use]
    pub fn binding(&self, pattern: &str) -> Option<&Arc<EndpointBinding>> {
        self.router.get(pattern)
    }

    /// Returns every registered pattern.
    #[must_use]
    pub fn patterns(&self) -> Vec<&str> {
        let mut patterns: Vec<_> = self.router.patterns().collect();
        patterns.sort_unstable();
        patterns
    }

    /// Returns the sinks endpoints are bound to.
    #[must_use]
    pub fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    /// Returns the stages run before every handler.
    #[must_use]
    pub fn chain(&self) -> &MiddlewareChain {
        &self.chain
    }
}

impl Dispatch for ServeMux {
    fn dispatch(
        &self,
        request: Request,
        upstream: Option<CancellationSignal>,
    ) -> BoxFuture<'_, Response> {
        Box::pin(async move {
            let matched = self
                .router
                .lookup(request.uri().path())
                .map(|m| Arc::clone(m.value()));

            let Some(binding) = matched else {
                let ctx = ScopedContext::from_template(&self.fallback, upstream.as_ref());
                return not_found(&ctx);
            };

            let ctx = binding.context(upstream.as_ref());
            let terminal = ContextHandler::new(binding);
            run_guarded(&self.chain, ctx, request, move |ctx, request| {
                terminal.respond(ctx, request)
            })
            .await
        })
    }
}

impl fmt::Debug for ServeMux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServeMux")
            .field("patterns", &self.patterns())
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

struct Route {
    template: ContextTemplate,
    handler: SharedHandler,
}

/// Dispatches through a generic middleware chain.
///
/// ```rust
/// use aegis_server::MiddlewareMux;
///
/// let mux = MiddlewareMux::with_defaults(None, None, None);
/// assert_eq!(mux.chain().stage_count(), 6);
/// ```
pub struct MiddlewareMux {
    dependencies: Dependencies,
    stages: Vec<BoxedMiddleware>,
    chain: MiddlewareChain,
    router: PathRouter<Route>,
    fallback: ContextTemplate,
}

impl MiddlewareMux {
    /// Creates a mux with no stages.
    #[must_use]
    pub fn new() -> Self {
        Self::with_stages(Dependencies::noop(), Vec::new())
    }

    /// Creates a mux with the default chain.
    ///
    /// Any sink left as `None` discards what it receives.
    #[must_use]
    pub fn with_defaults(
        logger: Option<SharedLogger>,
        metrics: Option<SharedMetrics>,
        monitor: Option<SharedMonitor>,
    ) -> Self {
        Self::with_default_stages(Dependencies::new(
            logger.unwrap_or_else(NoopLogger::shared),
            metrics.unwrap_or_else(NoopRecorder::shared),
            monitor.unwrap_or_else(NoopMonitor::shared),
        ))
    }

    /// Creates a mux with the default chain over a full set of sinks.
    #[must_use]
    pub fn with_default_stages(dependencies: Dependencies) -> Self {
        let defaults = MiddlewareChainBuilder::defaults(
            Arc::clone(&dependencies.logger),
            Arc::clone(&dependencies.metrics),
            Arc::clone(&dependencies.monitor),
        )
        .build();
        let stages = defaults.stages().to_vec();
        Self::with_stages(dependencies, stages)
    }

    /// Creates a mux with no stages over a full set of sinks.
    #[must_use]
    pub fn from_dependencies(dependencies: Dependencies) -> Self {
        Self::with_stages(dependencies, Vec::new())
    }

    fn with_stages(dependencies: Dependencies, stages: Vec<BoxedMiddleware>) -> Self {
        Self {
            fallback: ContextTemplate::new(dependencies.clone(), ""),
            chain: rebuild(&stages),
            dependencies,
            stages,
            router: PathRouter::new(),
        }
    }

    /// Appends a stage after the ones already registered.
    ///
    /// With the default chain the stage runs inside the recovery boundary.
    pub fn use_stage<M: Middleware>(&mut self, stage: M) -> &mut Self {
        self.stages.push(Arc::new(stage));
        self.chain = rebuild(&self.stages);
        self
    }

    /// Inserts a stage just outside the recovery boundary, so it observes
    /// the 500 of a recovered panic. Appends when there is no recovery stage.
    pub fn use_outer_stage<M: Middleware>(&mut self, stage: M) -> &mut Self {
        let at = recovery_position(&self.stages).unwrap_or(self.stages.len());
        self.stages.insert(at, Arc::new(stage));
        self.chain = rebuild(&self.stages);
        self
    }

    /// Registers `handler` for `pattern`, replacing any earlier registration.
    pub fn handle<H: Handler>(&mut self, pattern: &str, handler: H) -> &mut Self {
        let route = Route {
            template: ContextTemplate::new(self.dependencies.clone(), pattern),
            handler: Arc::new(handler),
        };
        if self.router.insert(pattern, route).is_some() {
            tracing::warn!(pattern, "replacing existing handler");
        }
        self
    }

    /// Returns the frozen chain.
    #[must_use]
    pub fn chain(&self) -> &MiddlewareChain {
        &self.chain
    }

    /// Returns every registered pattern.
    #[must_use]
    pub fn patterns(&self) -> Vec<&str> {
        let mut patterns: Vec<_> = self.router.patterns().collect();
        patterns.sort_unstable();
        patterns
    }
}

impl Default for MiddlewareMux {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatch for MiddlewareMux {
    fn dispatch(
        &self,
        request: Request,
        upstream: Option<CancellationSignal>,
    ) -> BoxFuture<'_, Response> {
        Box::pin(async move {
            let Some(route) = self.router.lookup(request.uri().path()).map(|m| m.value()) else {
                let ctx = ScopedContext::from_template(&self.fallback, upstream.as_ref());
                return not_found(&ctx);
            };

            let ctx = ScopedContext::from_template(&route.template, upstream.as_ref());
            let handler = Arc::clone(&route.handler);
            run_guarded(&self.chain, ctx, request, move |ctx, request| {
                let ctx = ctx.clone();
                Box::pin(async move {
                    let method = request.method().clone();
                    let result = handler.call(ctx.clone(), request).await;
                    finish_response(&ctx, &method, result)
                })
            })
            .await
        })
    }
}

impl fmt::Debug for MiddlewareMux {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareMux")
            .field("patterns", &self.patterns())
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::{json_response, HandlerError, HandlerResult};
    use aegis_middleware::stages::BasicAuthMiddleware;
    use aegis_middleware::Next;
    use aegis_telemetry::memory::{MemoryLogger, MemoryMonitor, MemoryRecorder};
    use bytes::Bytes;
    use http::{header, StatusCode};
    use http_body_util::{BodyExt, Full};

    fn get(path: &str) -> Request {
        http::Request::builder()
            .uri(path)
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn which(ctx: ScopedContext, _req: Request) -> HandlerResult {
        Ok(json_response(StatusCode::OK, ctx.endpoint()))
    }

    fn noop_mux() -> ServeMux {
        ServeMux::new(NoopLogger::shared(), NoopRecorder::shared(), NoopMonitor::shared())
    }

    #[tokio::test]
    async fn test_serve_mux_routes_by_pattern() {
        let mut mux = noop_mux();
        mux.handle("/", which).handle("/api/", which).handle("/api/health", which);

        for (path, expected) in [
            ("/api/health", "/api/health"),
            ("/api/users/1", "/api/"),
            ("/other", "/"),
        ] {
            let response = mux.dispatch(get(path), None).await;
            assert_eq!(body_json(response).await, serde_json::json!(expected), "{path}");
        }
    }

    #[tokio::test]
    async fn test_unmatched_path_is_json_404() {
        let mut mux = noop_mux();
        mux.handle("/only", which);

        let response = mux.dispatch(get("/missing"), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            aegis_core::APPLICATION_JSON
        );
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"type": "error", "status": 404, "message": "Not Found"})
        );
    }

    #[test]
    fn test_duplicate_pattern_replaces() {
        let mut mux = noop_mux();
        mux.handle("/dup", which).handle("/dup", which);
        assert_eq!(mux.patterns(), vec!["/dup"]);
    }

    #[test]
    fn test_endpoint_for_exposes_tagged_metrics() {
        let metrics = MemoryRecorder::new();
        let mux = ServeMux::new(NoopLogger::shared(), metrics.shared(), NoopMonitor::shared());
        let binding = mux.endpoint_for("/jobs/", Arc::new(which));

        binding.metrics().increment_count("jobs.started");
        assert_eq!(metrics.metrics()[0].tags, vec!["url:/jobs/".to_string()]);
        assert!(mux.binding("/jobs/").is_none());
    }

    #[tokio::test]
    async fn test_serve_mux_runs_stages_before_handler() {
        let mut mux = noop_mux();
        mux.use_stage(BasicAuthMiddleware::new("user", "pass"))
            .handle("/secret", which);

        let response = mux.dispatch(get("/secret"), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    struct Exploding;

    impl Middleware for Exploding {
        fn name(&self) -> &'static str {
            "explode"
        }

        fn process<'a>(
            &'a self,
            _ctx: &'a mut ScopedContext,
            _request: Request,
            _next: Next<'a>,
        ) -> BoxFuture<'a, Response> {
            Box::pin(async { panic!("stage failure") })
        }
    }

    #[tokio::test]
    async fn test_panicking_stage_is_contained() {
        let monitor = MemoryMonitor::new();
        let mut mux = ServeMux::new(NoopLogger::shared(), NoopRecorder::shared(), monitor.shared());
        mux.use_stage(Exploding).handle("/x", which);

        let response = mux.dispatch(get("/x"), None).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["message"], "stage failure");
        assert_eq!(monitor.captured().len(), 1);
    }

    #[tokio::test]
    async fn test_upstream_cancellation_reaches_request() {
        let mut mux = noop_mux();
        let observed = Arc::new(parking_lot::Mutex::new(None));
        let slot = Arc::clone(&observed);
        mux.handle("/watch", move |ctx: ScopedContext, _req: Request| {
            *slot.lock() = Some(ctx.cancellation().clone());
            async { Ok::<_, HandlerError>(json_response(StatusCode::OK, "ok")) }
        });

        let upstream = CancellationSignal::new();
        mux.dispatch(get("/watch"), Some(upstream.clone())).await;

        let signal = observed.lock().take().unwrap();
        assert!(signal.is_fired());
        assert!(!upstream.is_fired());
    }

    fn slow_watcher(fired: &Arc<std::sync::atomic::AtomicUsize>) -> impl Handler {
        let fired = Arc::clone(fired);
        move |ctx: ScopedContext, _req: Request| {
            let fired = Arc::clone(&fired);
            async move {
                ctx.cancellation().on_fire(move || {
                    fired.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                });
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                Ok::<_, HandlerError>(json_response(StatusCode::OK, "late"))
            }
        }
    }

    #[tokio::test]
    async fn test_dropped_request_still_fires_cleanup_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::time::Duration;

        let fired = Arc::new(AtomicUsize::new(0));
        let mut serve = noop_mux();
        serve.handle("/slow", slow_watcher(&fired));
        let mut chain = MiddlewareMux::with_defaults(None, None, None);
        chain.handle("/slow", slow_watcher(&fired));

        for (round, dispatch) in [&serve as &dyn Dispatch, &chain].into_iter().enumerate() {
            let upstream = CancellationSignal::new();
            let timed_out = tokio::time::timeout(
                Duration::from_millis(50),
                dispatch.dispatch(get("/slow"), Some(upstream.clone())),
            )
            .await;
            assert!(timed_out.is_err());
            assert_eq!(fired.load(Ordering::SeqCst), round + 1);

            upstream.fire();
            assert_eq!(fired.load(Ordering::SeqCst), round + 1);
        }
    }

    #[tokio::test]
    async fn test_middleware_mux_with_defaults() {
        let logger = MemoryLogger::new();
        let metrics = MemoryRecorder::new();
        let monitor = MemoryMonitor::new();
        let mut mux = MiddlewareMux::with_defaults(
            Some(logger.shared()),
            Some(metrics.shared()),
            Some(monitor.shared()),
        );
        mux.handle("/boom", |_ctx: ScopedContext, _req: Request| async {
            if true {
                panic!("nope");
            }
            Ok::<_, HandlerError>(json_response(StatusCode::OK, "unreachable"))
        });

        let response = mux.dispatch(get("/boom"), None).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(monitor.captured().len(), 1);
        assert_eq!(logger.lines_with_message("Request Panicked").len(), 1);
        assert_eq!(metrics.timings("api./boom_GET").len(), 1);
    }

    #[test]
    fn test_middleware_mux_appends_after_defaults() {
        let mut mux = MiddlewareMux::with_defaults(None, None, None);
        mux.use_stage(BasicAuthMiddleware::new("u", "p"));
        let names = mux.chain().stage_names();
        assert_eq!(names.first(), Some(&"status_capture"));
        assert_eq!(names.last(), Some(&"basic_auth"));
        assert!(MiddlewareMux::new().chain().is_empty());
    }
}
