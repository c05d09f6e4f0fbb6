//! Request handlers.
//!
//! A [`Handler`] receives its own clone of the [`ScopedContext`] and the
//! request, and returns a [`HandlerResult`]. Any `async fn` or closure with
//! the matching signature is a handler:
//!
//! ```
//! use aegis_core::{json_response, HandlerResult, Request};
//! use aegis_middleware::{Handler, ScopedContext};
//! use http::StatusCode;
//!
//! async fn ping(_ctx: ScopedContext, _req: Request) -> HandlerResult {
//!     Ok(json_response(StatusCode::OK, "pong"))
//! }
//!
//! fn assert_handler<H: Handler>(_: H) {}
//! assert_handler(ping);
//! ```

use crate::context::ScopedContext;
use crate::middleware::BoxFuture;
use crate::stages::recovery::report_failure;
use crate::types::{Request, Response};
use aegis_core::HandlerResult;
use http::Method;
use std::future::Future;
use std::sync::Arc;

/// A shareable handler.
pub type SharedHandler = Arc<dyn Handler>;

/// Produces the response for a request.
pub trait Handler: Send + Sync + 'static {
    /// Handles one request.
    fn call(&self, ctx: ScopedContext, request: Request) -> BoxFuture<'static, HandlerResult>;
}

impl<F, Fut> Handler for F
where
    F: Fn(ScopedContext, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, ctx: ScopedContext, request: Request) -> BoxFuture<'static, HandlerResult> {
        Box::pin(self(ctx, request))
    }
}

/// Turns a handler result into the response to send.
///
/// Errors become the JSON error envelope with the error's status. Server
/// errors are also logged, counted and reported like a panic; client errors
/// are not. The resulting status is recorded on the context.
pub fn finish_response(ctx: &ScopedContext, method: &Method, result: HandlerResult) -> Response {
    let response = match result {
        Ok(response) => response,
        Err(err) => {
            let status = err.status_code();
            if err.is_server_error() {
                report_failure(ctx, method, "Request Failed", status, &err);
            }
            err.into_response()
        }
    };
    ctx.status().record(response.status());
    response
}

/// Runs `handler` with a clone of `ctx` and finishes its result.
pub(crate) fn invoke(
    handler: SharedHandler,
    ctx: &ScopedContext,
    request: Request,
) -> BoxFuture<'static, Response> {
    let ctx = ctx.clone();
    Box::pin(async move {
        let method = request.method().clone();
        let result = handler.call(ctx.clone(), request).await;
        finish_response(&ctx, &method, result)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextTemplate;
    use aegis_core::{json_response, Dependencies, HandlerError};
    use aegis_telemetry::memory::{MemoryLogger, MemoryMonitor, MemoryRecorder};
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::{BodyExt, Full};

    async fn created(_ctx: ScopedContext, _req: Request) -> HandlerResult {
        Ok(json_response(StatusCode::CREATED, &serde_json::json!({"id": 1})))
    }

    fn request() -> Request {
        http::Request::builder()
            .method(Method::POST)
            .uri("/items")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_fn_handler_records_status() {
        let ctx = ScopedContext::new();
        let response = invoke(Arc::new(created), &ctx, request()).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(ctx.status().get(), 201);
    }

    #[test]
    fn test_client_error_is_not_reported() {
        let monitor = MemoryMonitor::new();
        let deps = Dependencies {
            monitor: monitor.shared(),
            ..Dependencies::noop()
        };
        let ctx = ScopedContext::from_template(&ContextTemplate::new(deps, "/items"), None);

        let response = finish_response(
            &ctx,
            &Method::POST,
            Err(HandlerError::validation("name is required")),
        );
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(monitor.captured().is_empty());
    }

    #[test]
    fn test_server_error_is_logged_counted_and_reported() {
        let logger = MemoryLogger::new();
        let metrics = MemoryRecorder::new();
        let monitor = MemoryMonitor::new();
        let deps = Dependencies::new(logger.shared(), metrics.shared(), monitor.shared());
        let ctx = ScopedContext::from_template(&ContextTemplate::new(deps, "/items"), None);

        let response = finish_response(
            &ctx,
            &Method::POST,
            Err(HandlerError::internal("database unavailable")),
        );

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ctx.status().get(), 500);
        assert_eq!(metrics.count("api./items_POST.error"), 1);
        assert_eq!(monitor.captured()[0].message, "database unavailable");
        assert_eq!(logger.lines_with_message("Request Failed").len(), 1);
    }

    #[tokio::test]
    async fn test_source_is_logged_but_not_rendered() {
        let logger = MemoryLogger::new();
        let deps = Dependencies {
            logger: logger.shared(),
            ..Dependencies::noop()
        };
        let ctx = ScopedContext::from_template(&ContextTemplate::new(deps, "/items"), None);
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");

        let response = finish_response(
            &ctx,
            &Method::POST,
            Err(HandlerError::internal_with_source("could not save", io)),
        );

        let line = &logger.lines_with_message("Request Failed")[0];
        assert_eq!(line.get_str("error"), Some("could not save"));
        assert_eq!(line.get_str("cause"), Some("disk on fire"));

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body = String::from_utf8(body.to_vec()).unwrap();
        assert!(body.contains("could not save"));
        assert!(!body.contains("disk on fire"));
    }

    #[test]
    fn test_external_failure_logs_service() {
        let logger = MemoryLogger::new();
        let deps = Dependencies {
            logger: logger.shared(),
            ..Dependencies::noop()
        };
        let ctx = ScopedContext::from_template(&ContextTemplate::new(deps, "/items"), None);

        let response = finish_response(
            &ctx,
            &Method::POST,
            Err(HandlerError::external("upstream down", Some("billing"))),
        );

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let line = &logger.lines_with_message("Request Failed")[0];
        assert_eq!(line.get_str("service"), Some("billing"));
        assert_eq!(line.get_str("cause"), None);
    }
}
