//! Per-pattern endpoint state.
//!
//! An [`EndpointBinding`] is created once per registered pattern. It owns
//! the handler and a [`ContextTemplate`] whose sinks are already tagged with
//! the pattern, so every request on the endpoint starts from the same
//! `url=<pattern>` logger and recorder.

use aegis_core::{
    Dependencies, Logger, MetricsRecorder, Request, Response, SharedLogger, SharedMetrics,
    SharedMonitor,
};
use aegis_middleware::stages::metrics::timing_metric_name;
use aegis_middleware::stages::recovery::{recover_panic, PanicError};
use aegis_middleware::{
    finish_response, BoxFuture, CancellationSignal, ContextTemplate, Handler, ScopedContext,
    SharedHandler,
};
use futures_util::FutureExt;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Tag key carrying the endpoint pattern.
pub const URL_TAG: &str = "url";

/// A handler bound to a pattern together with its tagged sinks.
pub struct EndpointBinding {
    pattern: Arc<str>,
    template: ContextTemplate,
    handler: SharedHandler,
}

impl EndpointBinding {
    /// Binds `handler` to `pattern`, tagging the sinks in `dependencies`.
    pub fn new(pattern: &str, dependencies: &Dependencies, handler: SharedHandler) -> Self {
        let tagged = Dependencies {
            logger: dependencies
                .logger
                .with_fields(aegis_core::fields!(URL_TAG, pattern)),
            metrics: dependencies.metrics.with_tag(URL_TAG, pattern),
            monitor: Arc::clone(&dependencies.monitor),
            events: Arc::clone(&dependencies.events),
        };
        let pattern: Arc<str> = Arc::from(pattern);
        Self {
            template: ContextTemplate::new(tagged, Arc::clone(&pattern)),
            pattern,
            handler,
        }
    }

    /// Returns the pattern.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Returns the logger tagged with the pattern.
    #[must_use]
    pub fn logger(&self) -> &SharedLogger {
        &self.template.dependencies().logger
    }

    /// Returns the recorder tagged with the pattern.
    #[must_use]
    pub fn metrics(&self) -> &SharedMetrics {
        &self.template.dependencies().metrics
    }

    /// Returns the monitor.
    #[must_use]
    pub fn monitor(&self) -> &SharedMonitor {
        &self.template.dependencies().monitor
    }

    /// Returns the template every request context is built from.
    #[must_use]
    pub fn template(&self) -> &ContextTemplate {
        &self.template
    }

    /// Returns the bound handler.
    #[must_use]
    pub fn handler(&self) -> &SharedHandler {
        &self.handler
    }

    /// Builds a fresh context for one request.
    #[must_use]
    pub fn context(&self, upstream: Option<&CancellationSignal>) -> ScopedContext {
        ScopedContext::from_template(&self.template, upstream)
    }
}

impl fmt::Debug for EndpointBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointBinding")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

/// The innermost step of a [`ServeMux`](crate::ServeMux) endpoint.
///
/// Runs the handler inside its own recovery boundary, finishes the result,
/// records `api.<pattern>_<method>` and fires the request's cancellation
/// signal. The signal also fires if the returned future is dropped early.
#[derive(Debug, Clone)]
pub struct ContextHandler {
    binding: Arc<EndpointBinding>,
}

impl ContextHandler {
    /// Wraps a binding.
    #[must_use]
    pub fn new(binding: Arc<EndpointBinding>) -> Self {
        Self { binding }
    }

    /// Returns the wrapped binding.
    #[must_use]
    pub fn binding(&self) -> &Arc<EndpointBinding> {
        &self.binding
    }

    /// Handles one request with `ctx`.
    pub fn respond(&self, ctx: &ScopedContext, request: Request) -> BoxFuture<'static, Response> {
        let ctx = ctx.clone();
        let handler = Arc::clone(&self.binding.handler);
        let timing = timing_metric_name(self.binding.pattern(), request.method());

        let guard = ctx.cancellation().fire_on_drop();

        Box::pin(async move {
            let _guard = guard;
            let method = request.method().clone();
            let outcome = AssertUnwindSafe(async { handler.call(ctx.clone(), request).await })
                .catch_unwind()
                .await;

            let response = match outcome {
                Ok(result) => finish_response(&ctx, &method, result),
                Err(payload) => {
                    let panic = PanicError::from_payload(payload.as_ref());
                    recover_panic(&ctx, &method, &panic)
                }
            };
            ctx.metrics().measure_since(&timing, ctx.started_at());
            ctx.cancellation().fire();
            response
        })
    }
}
