//! Monitor binding stage.

use crate::context::ScopedContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use aegis_core::SharedMonitor;

/// Installs the chain's monitor on the context.
#[derive(Clone)]
pub struct MonitorMiddleware {
    monitor: SharedMonitor,
}

impl MonitorMiddleware {
    /// Creates the stage around `monitor`.
    pub fn new(monitor: SharedMonitor) -> Self {
        Self { monitor }
    }
}

impl std::fmt::Debug for MonitorMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorMiddleware").finish_non_exhaustive()
    }
}

impl Middleware for MonitorMiddleware {
    fn name(&self) -> &'static str {
        "monitor"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut ScopedContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            ctx.set_monitor(std::sync::Arc::clone(&self.monitor));
            next.run(ctx, request).await
        })
    }
}
