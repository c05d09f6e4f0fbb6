//! In-memory test client.

use crate::error::TestError;
use crate::request::TestRequestBuilder;
use crate::response::TestResponse;
use aegis_core::Request;
use aegis_middleware::CancellationSignal;
use aegis_server::Dispatch;
use bytes::Bytes;
use http::Method;
use serde::Serialize;
use std::sync::Arc;

/// Sends requests straight into a [`Dispatch`] without binding a socket.
///
/// The request goes through the same pipeline a served request does, so
/// middleware, panic recovery and 404 handling all apply.
///
/// ```
/// use aegis_core::{json_response, HandlerResult, Request};
/// use aegis_middleware::ScopedContext;
/// use aegis_server::MiddlewareMux;
/// use aegis_test::TestClient;
/// use http::StatusCode;
///
/// async fn hello(_ctx: ScopedContext, _req: Request) -> HandlerResult {
///     Ok(json_response(StatusCode::OK, "hello"))
/// }
///
/// # tokio_test_block_on(async {
/// let mut mux = MiddlewareMux::new();
/// mux.handle("/hello", hello);
///
/// let client = TestClient::new(mux);
/// let response = client.get("/hello").send().await;
/// assert_eq!(response.status(), StatusCode::OK);
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Runtime::new().unwrap().block_on(f)
/// # }
/// ```
#[must_use]
pub struct TestClient<D> {
    dispatch: Arc<D>,
    default_headers: Vec<(String, String)>,
}

impl<D: Dispatch> TestClient<D> {
    /// Wraps `dispatch`.
    pub fn new(dispatch: D) -> Self {
        Self::from_shared(Arc::new(dispatch))
    }

    /// Wraps an already shared dispatcher.
    pub fn from_shared(dispatch: Arc<D>) -> Self {
        Self {
            dispatch,
            default_headers: Vec::new(),
        }
    }

    /// Adds a header sent with every request.
    pub fn with_default_header(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Returns the wrapped dispatcher.
    pub fn dispatcher(&self) -> &Arc<D> {
        &self.dispatch
    }

    /// Starts a GET request.
    pub fn get(&self, uri: impl AsRef<str>) -> TestClientRequest<'_, D> {
        self.request(Method::GET, uri)
    }

    /// Starts a POST request.
    pub fn post(&self, uri: impl AsRef<str>) -> TestClientRequest<'_, D> {
        self.request(Method::POST, uri)
    }

    /// Starts a PUT request.
    pub fn put(&self, uri: impl AsRef<str>) -> TestClientRequest<'_, D> {
        self.request(Method::PUT, uri)
    }

    /// Starts a PATCH request.
    pub fn patch(&self, uri: impl AsRef<str>) -> TestClientRequest<'_, D> {
        self.request(Method::PATCH, uri)
    }

    /// Starts a DELETE request.
    pub fn delete(&self, uri: impl AsRef<str>) -> TestClientRequest<'_, D> {
        self.request(Method::DELETE, uri)
    }

    /// Starts a request with any method.
    pub fn request(&self, method: Method, uri: impl AsRef<str>) -> TestClientRequest<'_, D> {
        let builder = self
            .default_headers
            .iter()
            .fold(TestRequestBuilder::new(method, uri), |builder, (name, value)| {
                builder.header(name, value)
            });
        TestClientRequest {
            client: self,
            builder,
            upstream: None,
        }
    }

    /// Dispatches a fully built request.
    pub async fn dispatch(
        &self,
        request: Request,
        upstream: Option<CancellationSignal>,
    ) -> TestResponse {
        let response = self.dispatch.dispatch(request, upstream).await;
        TestResponse::from_response(response).await
    }
}

impl<D> Clone for TestClient<D> {
    fn clone(&self) -> Self {
        Self {
            dispatch: Arc::clone(&self.dispatch),
            default_headers: self.default_headers.clone(),
        }
    }
}

impl<D> std::fmt::Debug for TestClient<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestClient")
            .field("default_headers", &self.default_headers)
            .finish_non_exhaustive()
    }
}

/// A request bound to a [`TestClient`].
#[must_use]
pub struct TestClientRequest<'a, D> {
    client: &'a TestClient<D>,
    builder: TestRequestBuilder,
    upstream: Option<CancellationSignal>,
}

impl<D: Dispatch> TestClientRequest<'_, D> {
    /// Sets a header.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.builder = self.builder.header(name, value);
        self
    }

    /// Sets `Authorization: Basic`.
    pub fn basic_auth(mut self, user: impl AsRef<str>, password: impl AsRef<str>) -> Self {
        self.builder = self.builder.basic_auth(user, password);
        self
    }

    /// Sets the raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.builder = self.builder.body(body);
        self
    }

    /// Sets a JSON body.
    pub fn json<T: Serialize>(mut self, value: &T) -> Self {
        self.builder = self.builder.json(value);
        self
    }

    /// Links the request to a transport-level cancellation signal.
    pub fn upstream(mut self, signal: CancellationSignal) -> Self {
        self.upstream = Some(signal);
        self
    }

    /// Sends the request.
    ///
    /// # Panics
    ///
    /// Panics if the request could not be built.
    pub async fn send(self) -> TestResponse {
        match self.try_send().await {
            Ok(response) => response,
            Err(e) => panic!("failed to build test request: {e}"),
        }
    }

    /// Sends the request, returning build errors.
    pub async fn try_send(self) -> Result<TestResponse, TestError> {
        let request = self.builder.build()?;
        Ok(self.client.dispatch(request, self.upstream).await)
    }
}
