//! The seam between the transport and the request pipeline.

use aegis_core::{json_error_response, Request, Response};
use aegis_middleware::{BoxFuture, CancellationSignal, ScopedContext};
use http::StatusCode;
use std::sync::Arc;

/// Message of the 404 returned for unmatched paths.
pub const NOT_FOUND_MESSAGE: &str = "Not Found";

/// Turns a request into a response.
///
/// Implementations never fail: every error, panic included, is converted
/// into a response before `dispatch` returns. `upstream` is the transport's
/// cancellation signal; the request's own signal is created as its child.
pub trait Dispatch: Send + Sync + 'static {
    /// Handles one request.
    fn dispatch(
        &self,
        request: Request,
        upstream: Option<CancellationSignal>,
    ) -> BoxFuture<'_, Response>;
}

impl<D: Dispatch + ?Sized> Dispatch for Arc<D> {
    fn dispatch(
        &self,
        request: Request,
        upstream: Option<CancellationSignal>,
    ) -> BoxFuture<'_, Response> {
        (**self).dispatch(request, upstream)
    }
}

/// Builds the 404 for an unmatched path and records it on `ctx`.
pub(crate) fn not_found(ctx: &ScopedContext) -> Response {
    let status = StatusCode::NOT_FOUND;
    ctx.status().record(status);
    ctx.cancellation().fire();
    json_error_response(status, &NOT_FOUND_MESSAGE)
}
