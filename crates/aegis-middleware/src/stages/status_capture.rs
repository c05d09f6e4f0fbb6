//! Status capture stage.

use crate::context::ScopedContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};

/// Records the status of the response leaving the chain.
///
/// Registered outermost. Inner stages and the handler record first, so
/// this only stores a value when nothing below produced one.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusCaptureMiddleware;

impl StatusCaptureMiddleware {
    /// Creates the stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for StatusCaptureMiddleware {
    fn name(&self) -> &'static str {
        "status_capture"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut ScopedContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let response = next.run(ctx, request).await;
            ctx.status().record(response.status());
            response
        })
    }
}
