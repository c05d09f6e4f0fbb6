//! Panic recovery.
//!
//! [`RecoveryMiddleware`] is the boundary that keeps a handler failure from
//! taking down the connection task. A panic anywhere below it becomes a 500
//! JSON error; the panic is logged with the request id, counted as
//! `api.<endpoint>_<method>.error` and reported to the monitor tagged with
//! `requestID` and `endpoint`. The request's cancellation signal fires
//! whether the handler returned, panicked or was dropped before finishing.

use crate::context::ScopedContext;
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{Request, Response};
use aegis_core::{fields, json_error_response, HandlerError};
use futures_util::FutureExt;
use http::{Method, StatusCode};
use std::any::Any;
use std::error::Error;
use std::fmt;
use std::panic::AssertUnwindSafe;

/// Message logged when a panic is recovered.
pub const PANIC_LOG_MESSAGE: &str = "Request Panicked";

/// A recovered panic, reported through the monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicError {
    message: String,
}

macro_rules! display_payload {
    ($payload:expr, $($t:ty),+ $(,)?) => {
        $(
            if let Some(value) = $payload.downcast_ref::<$t>() {
                return Some(value.to_string());
            }
        )+
    };
}

fn payload_message(payload: &(dyn Any + Send)) -> Option<String> {
    display_payload!(
        payload,
        &str,
        String,
        HandlerError,
        Box<dyn Error + Send + Sync>,
        i8,
        i16,
        i32,
        i64,
        i128,
        isize,
        u8,
        u16,
        u32,
        u64,
        u128,
        usize,
        f32,
        f64,
        bool,
        char,
    );
    None
}

impl PanicError {
    /// Builds the error from a panic payload.
    ///
    /// Strings, handler errors, boxed errors and primitive values are
    /// rendered with `Display`; anything else becomes `"unknown panic"`.
    #[must_use]
    pub fn from_payload(payload: &(dyn Any + Send)) -> Self {
        Self {
            message: payload_message(payload).unwrap_or_else(|| "unknown panic".to_string()),
        }
    }

    /// Returns the panic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for PanicError {}

/// Returns the name of the per-endpoint error counter.
#[must_use]
pub fn error_metric_name(endpoint: &str, method: &Method) -> String {
    format!("api.{endpoint}_{method}.error")
}

/// Joins the sources of `err` with `": "`, outermost first.
#[must_use]
pub fn cause_chain(err: &(dyn Error + 'static)) -> Option<String> {
    let mut causes =
        std::iter::successors(err.source(), |e| (*e).source()).map(ToString::to_string);
    let first = causes.next()?;
    Some(causes.fold(first, |chain, cause| format!("{chain}: {cause}")))
}

/// Logs, counts and reports a failed request.
///
/// The context logger is already bound with `requestID`. The log line also
/// carries the error's source chain as `cause` and, for a downstream
/// failure, the `service` name. Neither reaches the response.
pub fn report_failure(
    ctx: &ScopedContext,
    method: &Method,
    log_message: &str,
    status: StatusCode,
    err: &(dyn Error + 'static),
) {
    let mut fields = fields!("status", status.as_u16(), "error", err.to_string());
    if let Some(cause) = cause_chain(err) {
        fields.push("cause", cause);
    }
    if let Some(service) = err
        .downcast_ref::<HandlerError>()
        .and_then(HandlerError::service)
    {
        fields.push("service", service);
    }
    ctx.logger().log_error_message(log_message, fields);
    ctx.metrics()
        .increment_count(&error_metric_name(ctx.endpoint(), method));
    ctx.monitor()
        .capture_exception_with_tags(err, ctx.report_tags());
}

/// Converts a recovered panic into the 500 response.
pub fn recover_panic(ctx: &ScopedContext, method: &Method, panic: &PanicError) -> Response {
    let status = StatusCode::INTERNAL_SERVER_ERROR;
    report_failure(ctx, method, PANIC_LOG_MESSAGE, status, panic);
    ctx.status().record(status);
    json_error_response(status, panic)
}

/// Catches panics from the rest of the chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecoveryMiddleware;

impl RecoveryMiddleware {
    /// Creates the recovery stage.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for RecoveryMiddleware {
    fn name(&self) -> &'static str {
        "recovery"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut ScopedContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, Response> {
        let guard = ctx.cancellation().fire_on_drop();
        Box::pin(async move {
            let _guard = guard;
            let method = request.method().clone();
            let outcome = AssertUnwindSafe(next.run(ctx, request))
                .catch_unwind()
                .await;

            let response = match outcome {
                Ok(response) => response,
                Err(payload) => {
                    let panic = PanicError::from_payload(payload.as_ref());
                    recover_panic(ctx, &method, &panic)
                }
            };
            ctx.cancellation().fire();
            response
        })
    }
}
