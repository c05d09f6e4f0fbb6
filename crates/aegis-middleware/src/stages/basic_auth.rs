//! HTTP Basic authentication boundary.
//!
//! The check is a plain boundary: the `Authorization` header must carry
//! `Basic base64(user:password)` matching the configured pair exactly.
//! Anything else is answered with 403 and the handler never runs.

use crate::context::ScopedContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use aegis_core::{json_error_response, AUTHENTICATION_ERROR_MESSAGE};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::{header, StatusCode};

/// Counter incremented for every rejected request.
pub const UNAUTHORIZED_METRIC: &str = "unauthorized";

/// Rejects requests without the configured basic credentials.
#[derive(Clone)]
pub struct BasicAuthMiddleware {
    user: String,
    password: String,
}

impl BasicAuthMiddleware {
    /// Creates the stage for one user/password pair.
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// Returns true if the request carries the expected credentials.
    #[must_use]
    pub fn is_authorized(&self, request: &Request) -> bool {
        credentials(request)
            .is_some_and(|(user, password)| user == self.user && password == self.password)
    }
}

impl std::fmt::Debug for BasicAuthMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuthMiddleware")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// Extracts `(user, password)` from a Basic `Authorization` header.
fn credentials(request: &Request) -> Option<(String, String)> {
    let value = request.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

impl Middleware for BasicAuthMiddleware {
    fn name(&self) -> &'static str {
        "basic_auth"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut ScopedContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            if self.is_authorized(&request) {
                return next.run(ctx, request).await;
            }

            ctx.metrics().increment_count(UNAUTHORIZED_METRIC);
            let status = StatusCode::FORBIDDEN;
            ctx.status().record(status);
            json_error_response(status, &AUTHENTICATION_ERROR_MESSAGE)
        })
    }
}
