//! Request-scoped context.
//!
//! A [`ScopedContext`] is built once per request from a [`ContextTemplate`]
//! and carries the request's identity together with the sinks every stage
//! and the handler use. Stages receive it by `&mut` and may re-bind the
//! logger, recorder or monitor; the handler receives a clone.
//!
//! ```
//! use aegis_middleware::{CancellationSignal, ContextTemplate, ScopedContext};
//!
//! let template = ContextTemplate::noop("/ping");
//! let connection = CancellationSignal::new();
//! let ctx = ScopedContext::from_template(&template, Some(&connection));
//!
//! assert_eq!(ctx.endpoint(), "/ping");
//! connection.fire();
//! assert!(ctx.cancellation().is_fired());
//! ```

use crate::cancel::CancellationSignal;
use crate::status::StatusCapture;
use aegis_core::{
    fields, Dependencies, Fields, RequestId, SharedEventSink, SharedLogger, SharedMetrics,
    SharedMonitor,
};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Field name the request identity is logged under.
pub const REQUEST_ID_FIELD: &str = "requestID";

/// The sinks and endpoint a [`ScopedContext`] is built from.
///
/// Templates are created once per endpoint binding and shared read-only.
#[derive(Clone, Debug)]
pub struct ContextTemplate {
    dependencies: Dependencies,
    endpoint: Arc<str>,
}

impl ContextTemplate {
    /// Creates a template for `endpoint`.
    pub fn new(dependencies: Dependencies, endpoint: impl Into<Arc<str>>) -> Self {
        Self {
            dependencies,
            endpoint: endpoint.into(),
        }
    }

    /// Creates a template whose sinks discard everything.
    pub fn noop(endpoint: impl Into<Arc<str>>) -> Self {
        Self::new(Dependencies::noop(), endpoint)
    }

    /// Returns the endpoint pattern.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the template sinks.
    #[must_use]
    pub fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }
}

/// Per-request bag of identity and dependencies.
///
/// Cloning is cheap; every field is either `Copy` or reference counted.
/// The request id and endpoint are fixed at construction. The only state
/// transition afterwards is the cancellation signal firing.
#[derive(Clone)]
pub struct ScopedContext {
    request_id: RequestId,
    endpoint: Arc<str>,
    logger: SharedLogger,
    metrics: SharedMetrics,
    monitor: SharedMonitor,
    events: SharedEventSink,
    cancellation: CancellationSignal,
    status: StatusCapture,
    started_at: Instant,
    extensions: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ScopedContext {
    /// Creates a context with no-op sinks and no endpoint.
    #[must_use]
    pub fn new() -> Self {
        Self::from_template(&ContextTemplate::noop(""), None)
    }

    /// Creates the context for one request.
    ///
    /// A fresh [`RequestId`] is generated and bound on the logger as
    /// `requestID`. The cancellation signal is a child of `upstream` when
    /// one is given.
    #[must_use]
    pub fn from_template(
        template: &ContextTemplate,
        upstream: Option<&CancellationSignal>,
    ) -> Self {
        let request_id = RequestId::new();
        let deps = &template.dependencies;

        Self {
            request_id,
            endpoint: Arc::clone(&template.endpoint),
            logger: deps
                .logger
                .with_fields(fields!(REQUEST_ID_FIELD, request_id)),
            metrics: Arc::clone(&deps.metrics),
            monitor: Arc::clone(&deps.monitor),
            events: Arc::clone(&deps.events),
            cancellation: upstream.map_or_else(CancellationSignal::new, CancellationSignal::child),
            status: StatusCapture::new(),
            started_at: Instant::now(),
            extensions: HashMap::new(),
        }
    }

    /// Returns the request id.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the endpoint pattern this request matched.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the request logger.
    #[must_use]
    pub fn logger(&self) -> &SharedLogger {
        &self.logger
    }

    /// Replaces the request logger.
    pub fn set_logger(&mut self, logger: SharedLogger) {
        self.logger = logger;
    }

    /// Derives the logger with additional standard fields.
    pub fn bind_logger(&mut self, fields: Fields) {
        self.logger = self.logger.with_fields(fields);
    }

    /// Returns the metrics recorder.
    #[must_use]
    pub fn metrics(&self) -> &SharedMetrics {
        &self.metrics
    }

    /// Replaces the metrics recorder.
    pub fn set_metrics(&mut self, metrics: SharedMetrics) {
        self.metrics = metrics;
    }

    /// Returns the crash monitor.
    #[must_use]
    pub fn monitor(&self) -> &SharedMonitor {
        &self.monitor
    }

    /// Replaces the crash monitor.
    pub fn set_monitor(&mut self, monitor: SharedMonitor) {
        self.monitor = monitor;
    }

    /// Returns the event sink.
    #[must_use]
    pub fn events(&self) -> &SharedEventSink {
        &self.events
    }

    /// Returns the request's cancellation signal.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationSignal {
        &self.cancellation
    }

    /// Returns the shared status capture.
    #[must_use]
    pub fn status(&self) -> &StatusCapture {
        &self.status
    }

    /// Returns when the context was created.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Stores a typed extension value.
    ///
    /// ```
    /// use aegis_middleware::ScopedContext;
    ///
    /// #[derive(Debug, PartialEq)]
    /// struct Tenant(&'static str);
    ///
    /// let mut ctx = ScopedContext::new();
    /// ctx.set_extension(Tenant("acme"));
    /// assert_eq!(ctx.get_extension::<Tenant>(), Some(&Tenant("acme")));
    /// ```
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Arc::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref())
    }

    /// Checks if an extension of the given type exists.
    #[must_use]
    pub fn has_extension<T: Send + Sync + 'static>(&self) -> bool {
        self.extensions.contains_key(&TypeId::of::<T>())
    }

    /// Builds the tags attached to monitor reports for this request.
    #[must_use]
    pub fn report_tags(&self) -> Fields {
        fields!(REQUEST_ID_FIELD, self.request_id, "endpoint", self.endpoint())
    }
}

impl Default for ScopedContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ScopedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedContext")
            .field("request_id", &self.request_id)
            .field("endpoint", &self.endpoint)
            .field("status", &self.status.get())
            .field("cancelled", &self.cancellation.is_fired())
            .finish_non_exhaustive()
    }
}
