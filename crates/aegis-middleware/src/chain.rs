//! Ordered, immutable middleware chain.
//!
//! Stages run in registration order on the way in and in reverse order on
//! the way out: `[A, B, C]` around handler `H` runs `A B C H C B A`. Once
//! built, the stage list is frozen behind an `Arc` and shared by every
//! request.
//!
//! ## Default chain
//!
//! [`MiddlewareChain::with_defaults`] registers, outermost first:
//!
//! 1. **Status capture** - record the response status
//! 2. **Request ID** - publish the request id
//! 3. **Logger** - bind the logger
//! 4. **Metrics** - bind the recorder and time the request
//! 5. **Monitor** - bind the crash monitor
//! 6. **Recovery** - turn panics into 500 responses

use crate::context::ScopedContext;
use crate::handler::{invoke, SharedHandler};
use crate::middleware::{BoxFuture, Middleware, Next};
use crate::stages::{
    LoggerMiddleware, MetricsMiddleware, MonitorMiddleware, RecoveryMiddleware,
    RequestIdMiddleware, StatusCaptureMiddleware,
};
use crate::types::{Request, Response};
use aegis_core::{SharedLogger, SharedMetrics, SharedMonitor};
use std::sync::Arc;

/// A type-erased middleware that can be stored in a chain.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// An immutable list of stages.
///
/// ```
/// use aegis_middleware::chain::{DefaultStage, MiddlewareChain};
/// use aegis_core::{NoopLogger, NoopMonitor, NoopRecorder};
///
/// let chain = MiddlewareChain::with_defaults(
///     NoopLogger::shared(),
///     NoopRecorder::shared(),
///     NoopMonitor::shared(),
/// );
/// let expected: Vec<_> = DefaultStage::all().iter().map(|s| s.name()).collect();
/// assert_eq!(chain.stage_names(), expected);
/// ```
#[derive(Clone)]
pub struct MiddlewareChain {
    stages: Arc<[BoxedMiddleware]>,
}

impl MiddlewareChain {
    /// Creates a new chain builder.
    #[must_use]
    pub fn builder() -> MiddlewareChainBuilder {
        MiddlewareChainBuilder::new()
    }

    /// Creates the default chain around the given sinks.
    #[must_use]
    pub fn with_defaults(
        logger: SharedLogger,
        metrics: SharedMetrics,
        monitor: SharedMonitor,
    ) -> Self {
        MiddlewareChainBuilder::defaults(logger, metrics, monitor).build()
    }

    /// Runs the request through every stage and then `handler`.
    pub async fn process<H>(&self, mut ctx: ScopedContext, request: Request, handler: H) -> Response
    where
        H: FnOnce(&mut ScopedContext, Request) -> BoxFuture<'static, Response> + Send + 'static,
    {
        let next = self.build_chain(handler);
        next.run(&mut ctx, request).await
    }

    /// Runs the request through every stage and then a [`Handler`].
    ///
    /// The handler's result is finished with
    /// [`finish_response`](crate::handler::finish_response).
    ///
    /// [`Handler`]: crate::handler::Handler
    pub async fn run(&self, ctx: ScopedContext, request: Request, handler: SharedHandler) -> Response {
        self.process(ctx, request, move |ctx, request| invoke(handler, ctx, request))
            .await
    }

    fn build_chain<'a, H>(&'a self, handler: H) -> Next<'a>
    where
        H: FnOnce(&mut ScopedContext, Request) -> BoxFuture<'static, Response> + Send + 'a,
    {
        let mut next = Next::handler(handler);
        for middleware in self.stages.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }
        next
    }

    /// Returns the stages in order, outermost first.
    #[must_use]
    pub fn stages(&self) -> &[BoxedMiddleware] {
        &self.stages
    }

    /// Returns the names of all stages in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Returns the number of stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if the chain has no stages.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Default for MiddlewareChain {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewareChain")
            .field("stages", &self.stage_names())
            .finish()
    }
}

/// Builder for a [`MiddlewareChain`].
#[derive(Default)]
pub struct MiddlewareChainBuilder {
    stages: Vec<BoxedMiddleware>,
}

impl MiddlewareChainBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder preloaded with the default stages.
    ///
    /// Stages appended afterwards run inside the recovery boundary; use
    /// [`outside_recovery`](Self::outside_recovery) for stages that must see
    /// the final status.
    #[must_use]
    pub fn defaults(logger: SharedLogger, metrics: SharedMetrics, monitor: SharedMonitor) -> Self {
        Self::new()
            .stage(StatusCaptureMiddleware::new())
            .stage(RequestIdMiddleware::new())
            .stage(LoggerMiddleware::new(logger))
            .stage(MetricsMiddleware::new(metrics))
            .stage(MonitorMiddleware::new(monitor))
            .stage(RecoveryMiddleware::new())
    }

    /// Appends a stage; earlier stages wrap later ones.
    #[must_use]
    pub fn stage<M: Middleware>(self, middleware: M) -> Self {
        self.boxed_stage(Arc::new(middleware))
    }

    /// Appends an already shared stage.
    #[must_use]
    pub fn boxed_stage(mut self, middleware: BoxedMiddleware) -> Self {
        self.stages.push(middleware);
        self
    }

    /// Inserts a stage just outside the recovery boundary.
    ///
    /// The stage sees the 500 a recovered panic produces. Without a recovery
    /// stage it is appended.
    #[must_use]
    pub fn outside_recovery<M: Middleware>(mut self, middleware: M) -> Self {
        let at = recovery_position(&self.stages).unwrap_or(self.stages.len());
        self.stages.insert(at, Arc::new(middleware));
        self
    }

    /// Returns the number of stages added so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Returns true if no stage was added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Freezes the stage list.
    #[must_use]
    pub fn build(self) -> MiddlewareChain {
        MiddlewareChain {
            stages: self.stages.into(),
        }
    }
}

/// Returns the index of the recovery stage in `stages`.
#[must_use]
pub fn recovery_position(stages: &[BoxedMiddleware]) -> Option<usize> {
    stages
        .iter()
        .position(|stage| stage.name() == DefaultStage::Recovery.name())
}

/// Stages of the default chain, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum DefaultStage {
    /// Stage 1: status capture
    StatusCapture = 1,
    /// Stage 2: request id publication
    RequestId = 2,
    /// Stage 3: logger binding
    Logger = 3,
    /// Stage 4: metrics binding and timing
    Metrics = 4,
    /// Stage 5: monitor binding
    Monitor = 5,
    /// Stage 6: panic recovery
    Recovery = 6,
}

impl DefaultStage {
    /// Returns the stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::StatusCapture => "status_capture",
            Self::RequestId => "request_id",
            Self::Logger => "logger",
            Self::Metrics => "metrics",
            Self::Monitor => "monitor",
            Self::Recovery => "recovery",
        }
    }

    /// Returns all stages in order.
    #[must_use]
    pub const fn all() -> [DefaultStage; 6] {
        [
            Self::StatusCapture,
            Self::RequestId,
            Self::Logger,
            Self::Metrics,
            Self::Monitor,
            Self::Recovery,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::RequestLogMiddleware;
    use aegis_core::{empty_response, NoopLogger, NoopMonitor, NoopRecorder};
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Full;
    use parking_lot::Mutex;

    /// A test middleware that records its invocation order.
    struct OrderTrackingMiddleware {
        name: &'static str,
        order: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for OrderTrackingMiddleware {
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
                self.order.lock().push(format!("{}:in", self.name));
                let response = next.run(ctx, request).await;
                self.order.lock().push(format!("{}:out", self.name));
                response
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
    async fn test_chain_wraps_in_reverse_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let tracker = |name| OrderTrackingMiddleware {
            name,
            order: Arc::clone(&order),
        };

        let chain = MiddlewareChain::builder()
            .stage(tracker("first"))
            .stage(tracker("second"))
            .build();

        let handler_order = Arc::clone(&order);
        let response = chain
            .process(ScopedContext::new(), request(), move |_ctx, _req| {
                handler_order.lock().push("handler".to_string());
                Box::pin(async { empty_response(StatusCode::OK) })
            })
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            *order.lock(),
            vec!["first:in", "second:in", "handler", "second:out", "first:out"]
        );
    }

    #[tokio::test]
    async fn test_empty_chain() {
        let chain = MiddlewareChain::builder().build();
        assert!(chain.is_empty());

        let response = chain
            .process(ScopedContext::new(), request(), |_ctx, _req| {
                Box::pin(async { empty_response(StatusCode::ACCEPTED) })
            })
            .await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[test]
    fn test_default_stage_names() {
        let chain = MiddlewareChain::with_defaults(
            NoopLogger::shared(),
            NoopRecorder::shared(),
            NoopMonitor::shared(),
        );
        assert_eq!(chain.stage_count(), 6);
        assert_eq!(
            chain.stage_names(),
            vec!["status_capture", "request_id", "logger", "metrics", "monitor", "recovery"]
        );
    }

    #[test]
    fn test_outside_recovery_lands_before_recovery() {
        let chain = MiddlewareChainBuilder::defaults(
            NoopLogger::shared(),
            NoopRecorder::shared(),
            NoopMonitor::shared(),
        )
        .outside_recovery(RequestLogMiddleware::new())
        .build();
        let names = chain.stage_names();
        assert_eq!(&names[4..], ["monitor", "request_log", "recovery"]);

        let plain = MiddlewareChain::builder()
            .outside_recovery(RequestLogMiddleware::new())
            .build();
        assert_eq!(plain.stage_names(), vec!["request_log"]);
    }

    #[test]
    fn test_default_stage_ordering() {
        let stages = DefaultStage::all();
        assert!(stages.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(stages[0], DefaultStage::StatusCapture);
        assert_eq!(stages[5].name(), "recovery");
    }
}
