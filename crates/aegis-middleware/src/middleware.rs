//! Core middleware trait and types.
//!
//! Every stage implements [`Middleware`]. A stage receives the mutable
//! [`ScopedContext`], the request and a [`Next`] continuation; it either
//! calls `next.run` exactly once or short-circuits with its own response.
//!
//! # Example
//!
//! ```ignore
//! use aegis_middleware::{BoxFuture, Middleware, Next, Request, Response, ScopedContext};
//!
//! struct Timing;
//!
//! impl Middleware for Timing {
//!     fn name(&self) -> &'static str {
//!         "timing"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut ScopedContext,
//!         request: Request,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, Response> {
//!         Box::pin(async move {
//!             let response = next.run(ctx, request).await;
//!             ctx.metrics().measure_since("timing", ctx.started_at());
//!             response
//!         })
//!     }
//! }
//! ```

use crate::context::ScopedContext;
use crate::types::{Request, Response};
use std::future::Future;
use std::pin::Pin;

/// A boxed future that returns a response.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The core middleware trait.
///
/// Stage configuration is captured when the stage is constructed and is
/// read-only afterwards. Per-request state lives in the context.
pub trait Middleware: Send + Sync + 'static {
    /// Returns the name of this stage, used in diagnostics.
    fn name(&self) -> &'static str;

    /// Processes the request.
    fn process<'a>(
        &'a self,
        ctx: &'a mut ScopedContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response>;
}

type Terminal<'a> =
    Box<dyn FnOnce(&mut ScopedContext, Request) -> BoxFuture<'static, Response> + Send + 'a>;

/// Continuation invoking the rest of the chain.
///
/// `run` consumes `self`, so the remainder of the chain runs at most once.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    Handler(Terminal<'a>),
}

impl<'a> Next<'a> {
    /// Creates a `Next` that invokes `middleware` and then `next`.
    pub(crate) fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Box::new(next),
            },
        }
    }

    /// Creates a terminal `Next` that invokes the handler.
    pub(crate) fn handler<F>(f: F) -> Self
    where
        F: FnOnce(&mut ScopedContext, Request) -> BoxFuture<'static, Response> + Send + 'a,
    {
        Self {
            inner: NextInner::Handler(Box::new(f)),
        }
    }

    /// Invokes the next stage or the handler.
    pub async fn run(self, ctx: &mut ScopedContext, request: Request) -> Response {
        match self.inner {
            NextInner::Chain { middleware, next } => {
                middleware.process(ctx, request, *next).await
            }
            NextInner::Handler(handler) => handler(ctx, request).await,
        }
    }
}

/// A stage built from a closure.
///
/// ```ignore
/// let stage = FnMiddleware::new("tag", |ctx, req, next| {
///     Box::pin(async move {
///         ctx.bind_logger(fields!("tenant", "acme"));
///         next.run(ctx, req).await
///     })
/// });
/// ```
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

impl<F> FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut ScopedContext, Request, Next<'a>) -> BoxFuture<'a, Response>
        + Send
        + Sync
        + 'static,
{
    /// Creates a stage named `name` that runs `func`.
    pub const fn new(name: &'static str, func: F) -> Self {
        Self { name, func }
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(&'a mut ScopedContext, Request, Next<'a>) -> BoxFuture<'a, Response>
        + Send
        + Sync
        + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut ScopedContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        (self.func)(ctx, request, next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::{empty_response, fields, Logger};
    use aegis_telemetry::memory::MemoryLogger;
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Full;

    struct Visit {
        name: &'static str,
    }

    impl Middleware for Visit {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut ScopedContext,
            request: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, Response> {
            Box::pin(async move {
                ctx.bind_logger(fields!("visited", self.name));
                next.run(ctx, request).await
            })
        }
    }

    fn request() -> Request {
        http::Request::builder()
            .uri("/test")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_next_handler() {
        let mut ctx = ScopedContext::new();
        let next = Next::handler(|_ctx, _req| {
            Box::pin(async { empty_response(StatusCode::NO_CONTENT) })
        });

        let response = next.run(&mut ctx, request()).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_stage_mutations_reach_handler() {
        let first = Visit { name: "first" };
        let logger = MemoryLogger::new();
        let mut ctx = ScopedContext::new();
        ctx.set_logger(logger.shared());

        let handler = Next::handler(|ctx: &mut ScopedContext, _req| {
            ctx.logger().log_info(fields!("handled"));
            Box::pin(async { empty_response(StatusCode::OK) })
        });
        let response = Next::new(&first, handler).run(&mut ctx, request()).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(logger.lines()[0].get_str("visited"), Some("first"));
    }

    #[tokio::test]
    async fn test_fn_middleware_short_circuits() {
        let stage = FnMiddleware::new("deny", |_ctx, _req, _next| {
            Box::pin(async { empty_response(StatusCode::FORBIDDEN) })
        });
        assert_eq!(stage.name(), "deny");

        let mut ctx = ScopedContext::new();
        let handler = Next::handler(|_ctx, _req| -> BoxFuture<'static, Response> {
            panic!("handler must not run")
        });
        let response = Next::new(&stage, handler).run(&mut ctx, request()).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
