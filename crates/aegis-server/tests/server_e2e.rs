//! Serves real sockets and talks to them with reqwest.

use aegis_core::{json_response, HandlerError, HandlerResult, Request};
use aegis_middleware::stages::BasicAuthMiddleware;
use aegis_middleware::{ScopedContext, REQUEST_ID_HEADER};
use aegis_server::{Dispatch, MiddlewareMux, ServeMux, Server, ServerConfig, ShutdownSignal};
use aegis_telemetry::memory::{MemoryLogger, MemoryMonitor, MemoryRecorder};
use http::StatusCode;
use http_body_util::BodyExt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

struct Running {
    addr: SocketAddr,
    shutdown: ShutdownSignal,
    task: JoinHandle<Result<(), aegis_server::ServerError>>,
}

impl Running {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("server should stop")
            .unwrap()
            .unwrap();
    }
}

async fn start<D: Dispatch>(dispatch: D) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = ShutdownSignal::new();
    let server = Server::new(dispatch).with_config(
        ServerConfig::builder()
            .shutdown_timeout(Duration::from_millis(500))
            .build(),
    );
    let task = tokio::spawn(server.serve_listener(listener, shutdown.clone()));
    Running {
        addr,
        shutdown,
        task,
    }
}

async fn echo(ctx: ScopedContext, req: Request) -> HandlerResult {
    let body = req.into_body().collect().await.map_err(|e| HandlerError::validation(e.to_string()))?;
    let text = String::from_utf8_lossy(&body.to_bytes()).into_owned();
    Ok(json_response(
        StatusCode::OK,
        &serde_json::json!({"endpoint": ctx.endpoint(), "body": text}),
    ))
}

async fn explode(_ctx: ScopedContext, _req: Request) -> HandlerResult {
    panic!("socket boom")
}

#[tokio::test]
async fn test_serve_mux_over_http() {
    let metrics = MemoryRecorder::new();
    let monitor = MemoryMonitor::new();
    let mut mux = ServeMux::new(MemoryLogger::new().shared(), metrics.shared(), monitor.shared());
    mux.handle("/echo/", echo).handle("/boom", explode);
    let running = start(mux).await;
    let client = reqwest::Client::new();

    let response = client
        .post(running.url("/echo/abc"))
        .body("hello")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!({"endpoint": "/echo/", "body": "hello"}));

    let response = client.get(running.url("/boom")).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body,
        serde_json::json!({"type": "error", "status": 500, "message": "socket boom"})
    );

    let response = client.get(running.url("/nowhere")).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);

    // The server keeps serving after a panic.
    let response = client.post(running.url("/echo/")).send().await.unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    assert_eq!(monitor.captured().len(), 1);
    assert_eq!(metrics.timings("api./echo/_POST").len(), 2);
    assert_eq!(metrics.timings("api./boom_GET").len(), 1);

    running.stop().await;
}

#[tokio::test]
async fn test_middleware_mux_over_http() {
    let mut mux = MiddlewareMux::with_defaults(None, None, None);
    mux.use_stage(BasicAuthMiddleware::new("user", "pass"))
        .handle("/private", echo);
    let running = start(mux).await;
    let client = reqwest::Client::new();

    let denied = client.get(running.url("/private")).send().await.unwrap();
    assert_eq!(denied.status(), reqwest::StatusCode::FORBIDDEN);
    assert!(denied.headers().contains_key(REQUEST_ID_HEADER));

    let allowed = client
        .get(running.url("/private"))
        .basic_auth("user", Some("pass"))
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status(), reqwest::StatusCode::OK);

    let first = allowed.headers()[REQUEST_ID_HEADER].to_str().unwrap().to_string();
    let again = client
        .get(running.url("/private"))
        .basic_auth("user", Some("pass"))
        .send()
        .await
        .unwrap();
    assert_ne!(again.headers()[REQUEST_ID_HEADER].to_str().unwrap(), first);

    running.stop().await;
}

#[tokio::test]
async fn test_shutdown_cancels_in_flight_requests() {
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let tx = std::sync::Arc::new(parking_lot::Mutex::new(Some(tx)));

    let mut mux = MiddlewareMux::new();
    mux.handle("/wait", move |ctx: ScopedContext, _req: Request| {
        let tx = std::sync::Arc::clone(&tx);
        async move {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(());
            }
            ctx.cancellation().fired().await;
            Ok::<_, HandlerError>(json_response(StatusCode::OK, "cancelled"))
        }
    });
    let running = start(mux).await;

    let url = running.url("/wait");
    let request = tokio::spawn(async move { reqwest::get(url).await });
    rx.await.unwrap();

    running.stop().await;
    let response = request.await.unwrap().unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
}
