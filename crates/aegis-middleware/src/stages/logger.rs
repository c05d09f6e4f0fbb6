//! Logger binding stage.

use crate::context::{ScopedContext, REQUEST_ID_FIELD};
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use aegis_core::{fields, SharedLogger};

/// Installs the chain's logger on the context.
///
/// The logger is bound with `requestID` and the request `path` before the
/// rest of the chain runs, so every later line carries both.
#[derive(Clone)]
pub struct LoggerMiddleware {
    logger: SharedLogger,
}

impl LoggerMiddleware {
    /// Creates the stage around `logger`.
    pub fn new(logger: SharedLogger) -> Self {
        Self { logger }
    }
}

impl std::fmt::Debug for LoggerMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerMiddleware").finish_non_exhaustive()
    }
}

impl Middleware for LoggerMiddleware {
    fn name(&self) -> &'static str {
        "logger"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut ScopedContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let bound = self.logger.with_fields(fields!(
                REQUEST_ID_FIELD,
                ctx.request_id(),
                "path",
                request.uri().path()
            ));
            ctx.set_logger(bound);
            next.run(ctx, request).await
        })
    }
}
