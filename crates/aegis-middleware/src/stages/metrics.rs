//! Metrics binding stage.

use crate::context::ScopedContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use aegis_core::SharedMetrics;
use http::Method;

/// Returns the name of the per-endpoint timing metric.
#[must_use]
pub fn timing_metric_name(endpoint: &str, method: &Method) -> String {
    format!("api.{endpoint}_{method}")
}

/// Installs the chain's recorder on the context and times the request.
///
/// The recorder is tagged with `url=<endpoint>`; the request duration is
/// recorded as `api.<endpoint>_<method>` once the rest of the chain returns.
#[derive(Clone)]
pub struct MetricsMiddleware {
    metrics: SharedMetrics,
}

impl MetricsMiddleware {
    /// Creates the stage around `metrics`.
    pub fn new(metrics: SharedMetrics) -> Self {
        Self { metrics }
    }
}

impl std::fmt::Debug for MetricsMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsMiddleware").finish_non_exhaustive()
    }
}

impl Middleware for MetricsMiddleware {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut ScopedContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let name = timing_metric_name(ctx.endpoint(), request.method());
            ctx.set_metrics(self.metrics.with_tag("url", ctx.endpoint()));

            let response = next.run(ctx, request).await;
            ctx.metrics().measure_since(&name, ctx.started_at());
            response
        })
    }
}
