//! Common types used throughout the middleware chain.

pub use aegis_core::{Request, Response};

use aegis_core::RequestId;

/// Reads pipeline data published on the request.
pub trait RequestExt {
    /// Returns the request id published by the request id stage.
    fn request_id(&self) -> Option<RequestId>;
}

impl RequestExt for Request {
    fn request_id(&self) -> Option<RequestId> {
        self.extensions().get::<RequestId>().copied()
    }
}
