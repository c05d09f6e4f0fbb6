//! Request start/end logging.

use crate::context::ScopedContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use aegis_core::fields;

/// Logs when a request starts and when it ends.
///
/// The end line carries the captured status, so it reports what the
/// handler produced even if an outer stage later replaces the response.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogMiddleware;

impl RequestLogMiddleware {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for RequestLogMiddleware {
    fn name(&self) -> &'static str {
        "request_log"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut ScopedContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            ctx.logger().log_info_message(
                "request started",
                fields!(
                    "method",
                    request.method().as_str(),
                    "path",
                    request.uri().path()
                ),
            );

            let response = next.run(ctx, request).await;
            ctx.status().record(response.status());

            ctx.logger().log_info_message(
                "request_ended",
                fields!(
                    "status",
                    ctx.status().get(),
                    "duration_ms",
                    ctx.elapsed().as_secs_f64() * 1000.0
                ),
            );
            response
        })
    }
}
