//! End-to-end chain tests.
//!
//! These run the default chain with in-memory sinks and check what each
//! stage leaves behind: log lines, metrics, monitor reports, the captured
//! status and the cancellation signal.

use aegis_core::{json_response, Dependencies, FieldValue, HandlerError, HandlerResult};
use aegis_middleware::stages::{BasicAuthMiddleware, RequestLogMiddleware, StatusCaptureMiddleware};
use aegis_middleware::{
    BoxFuture, ContextTemplate, Middleware, MiddlewareChain, MiddlewareChainBuilder, Next,
    Request, RequestExt, Response, ScopedContext, REQUEST_ID_HEADER,
};
use aegis_telemetry::memory::{MemoryLogger, MemoryMonitor, MemoryRecorder};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use http::{header, Method, StatusCode};
use http_body_util::{BodyExt, Full};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Sinks {
    logger: MemoryLogger,
    metrics: MemoryRecorder,
    monitor: MemoryMonitor,
}

impl Sinks {
    fn new() -> Self {
        Self {
            logger: MemoryLogger::new(),
            metrics: MemoryRecorder::new(),
            monitor: MemoryMonitor::new(),
        }
    }

    fn defaults(&self) -> MiddlewareChainBuilder {
        MiddlewareChainBuilder::defaults(
            self.logger.shared(),
            self.metrics.shared(),
            self.monitor.shared(),
        )
    }
}

fn context(endpoint: &str) -> ScopedContext {
    ScopedContext::from_template(&ContextTemplate::new(Dependencies::noop(), endpoint), None)
}

fn request(method: Method, path: &str) -> Request {
    http::Request::builder()
        .method(method)
        .uri(path)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn pong(_ctx: ScopedContext, _req: Request) -> HandlerResult {
    Ok(json_response(StatusCode::OK, "pong"))
}

async fn explode(_ctx: ScopedContext, _req: Request) -> HandlerResult {
    panic!("kaboom")
}

async fn echo_request_id(_ctx: ScopedContext, req: Request) -> HandlerResult {
    let id = req.request_id().map(|id| id.to_string());
    Ok(json_response(StatusCode::OK, &id))
}

#[tokio::test]
async fn test_happy_path_binds_every_sink() {
    let sinks = Sinks::new();
    let chain = sinks.defaults().build();

    let ctx = context("/ping");
    let id = ctx.request_id().to_string();
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    ctx.cancellation().on_fire(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let observer = ctx.clone();

    let response = chain
        .run(ctx, request(Method::GET, "/ping"), Arc::new(pong))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[REQUEST_ID_HEADER], id.as_str());
    assert_eq!(body_json(response).await, serde_json::json!("pong"));

    assert_eq!(observer.status().get(), 200);
    assert!(observer.cancellation().is_fired());
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    let timings = sinks.metrics.timings("api./ping_GET");
    assert_eq!(timings.len(), 1);
    assert_eq!(timings[0].tags, vec!["url:/ping".to_string()]);

    assert!(sinks.monitor.captured().is_empty());
    assert!(sinks.logger.lines().is_empty());
}

#[tokio::test]
async fn test_request_id_is_published_on_request() {
    let sinks = Sinks::new();
    let chain = sinks.defaults().build();
    let ctx = context("/id");
    let id = ctx.request_id().to_string();

    let response = chain
        .run(ctx, request(Method::GET, "/id"), Arc::new(echo_request_id))
        .await;
    assert_eq!(body_json(response).await, serde_json::json!(id));
}

#[tokio::test]
async fn test_panic_becomes_500_and_is_reported_once() {
    let sinks = Sinks::new();
    let chain = sinks.defaults().build();

    let ctx = context("/boom");
    let id = ctx.request_id().to_string();
    let observer = ctx.clone();

    let response = chain
        .run(ctx, request(Method::POST, "/boom"), Arc::new(explode))
        .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        aegis_core::APPLICATION_JSON
    );
    assert_eq!(
        body_json(response).await,
        serde_json::json!({"type": "error", "status": 500, "message": "kaboom"})
    );

    let captured = sinks.monitor.captured();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].message, "kaboom");
    assert_eq!(
        captured[0].tags.get("requestID").and_then(FieldValue::as_str),
        Some(id.as_str())
    );
    assert_eq!(
        captured[0].tags.get("endpoint").and_then(FieldValue::as_str),
        Some("/boom")
    );

    let panicked = sinks.logger.lines_with_message("Request Panicked");
    assert_eq!(panicked.len(), 1);
    assert_eq!(panicked[0].get_str("requestID"), Some(id.as_str()));
    assert_eq!(panicked[0].get("status"), Some(&FieldValue::UInt(500)));
    assert_eq!(panicked[0].get_str("error"), Some("kaboom"));
    assert_eq!(panicked[0].get_str("path"), Some("/boom"));

    assert_eq!(sinks.metrics.count("api./boom_POST.error"), 1);
    assert_eq!(observer.status().get(), 500);
    assert!(observer.cancellation().is_fired());
}

#[tokio::test]
async fn test_client_error_is_not_reported() {
    let sinks = Sinks::new();
    let chain = sinks.defaults().build();

    let missing = |_ctx: ScopedContext, _req: Request| async {
        Err::<Response, _>(HandlerError::not_found("no such widget"))
    };
    let response = chain
        .run(context("/widgets/"), request(Method::GET, "/widgets/9"), Arc::new(missing))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["message"], "no such widget");
    assert!(sinks.monitor.captured().is_empty());
    assert!(sinks.logger.lines().is_empty());
}

/// Replaces whatever response comes back with a teapot.
struct Teapot;

impl Middleware for Teapot {
    fn name(&self) -> &'static str {
        "teapot"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut ScopedContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let _ = next.run(ctx, request).await;
            aegis_core::empty_response(StatusCode::IM_A_TEAPOT)
        })
    }
}

#[tokio::test]
async fn test_outer_replacement_does_not_overwrite_captured_status() {
    let chain = MiddlewareChain::builder()
        .stage(StatusCaptureMiddleware::new())
        .stage(Teapot)
        .build();

    let ctx = context("/tea");
    let observer = ctx.clone();
    let implicit_ok = |_ctx: ScopedContext, _req: Request| async {
        Ok::<_, HandlerError>(Response::new(Full::new(Bytes::new())))
    };

    let response = chain
        .run(ctx, request(Method::GET, "/tea"), Arc::new(implicit_ok))
        .await;

    assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
    assert_eq!(observer.status().get(), 200);
}

fn basic(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
}

#[tokio::test]
async fn test_basic_auth_matrix() {
    let cases = [
        (Some(basic("user", "pass")), StatusCode::OK, 1),
        (Some(basic("user", "wrong")), StatusCode::FORBIDDEN, 0),
        (Some(basic("wrong", "pass")), StatusCode::FORBIDDEN, 0),
        (None, StatusCode::FORBIDDEN, 0),
    ];

    for (authorization, expected_status, expected_calls) in cases {
        let sinks = Sinks::new();
        let chain = sinks
            .defaults()
            .stage(BasicAuthMiddleware::new("user", "pass"))
            .build();

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handler = move |_ctx: ScopedContext, _req: Request| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, HandlerError>(json_response(StatusCode::OK, "secret")) }
        };

        let mut builder = http::Request::builder().uri("/secret");
        if let Some(value) = &authorization {
            builder = builder.header(header::AUTHORIZATION, value.as_str());
        }
        let req = builder.body(Full::new(Bytes::new())).unwrap();

        let response = chain.run(context("/secret"), req, Arc::new(handler)).await;
        assert_eq!(response.status(), expected_status);
        assert_eq!(calls.load(Ordering::SeqCst), expected_calls);

        if expected_status == StatusCode::FORBIDDEN {
            assert_eq!(
                body_json(response).await,
                serde_json::json!({"type": "error", "status": 403, "message": "Authentication Error"})
            );
            assert_eq!(sinks.metrics.count("unauthorized"), 1);
            assert!(sinks.logger.lines().is_empty());
        } else {
            assert_eq!(sinks.metrics.count("unauthorized"), 0);
        }
    }
}

#[tokio::test]
async fn test_request_log_reports_captured_status() {
    let sinks = Sinks::new();
    let chain = sinks.defaults().stage(RequestLogMiddleware::new()).build();

    let ctx = context("/items");
    let id = ctx.request_id().to_string();
    let created = |_ctx: ScopedContext, _req: Request| async {
        Ok::<_, HandlerError>(json_response(StatusCode::CREATED, "made"))
    };
    chain
        .run(ctx, request(Method::POST, "/items"), Arc::new(created))
        .await;

    let lines = sinks.logger.lines();
    let messages: Vec<_> = lines.iter().filter_map(|line| line.message()).collect();
    assert_eq!(messages, vec!["request started", "request_ended"]);
    assert!(lines
        .iter()
        .all(|line| line.get_str("requestID") == Some(id.as_str())));
    assert_eq!(lines[1].get("status"), Some(&FieldValue::UInt(201)));
}
