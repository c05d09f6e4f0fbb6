//! Error types for Aegis handlers.
//!
//! Handlers return `Result<Response, HandlerError>`. The pipeline turns an
//! `Err` into the standard JSON error body:
//!
//! ```json
//! {"type":"error","status":404,"message":"user 42 not found"}
//! ```
//!
//! The `message` is the error's `Display` output. Source errors attached to
//! [`HandlerError::Internal`] are logged server-side as `cause` but never
//! rendered into the response body. A rate limited error with a known reset
//! time also sets `Retry-After`.

use crate::response::{json_error_response, Response};
use http::{header, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type returned by handlers.
pub type HandlerResult = Result<Response, HandlerError>;

/// Message written by the authentication boundary check.
pub const AUTHENTICATION_ERROR_MESSAGE: &str = "Authentication Error";

/// Categories of errors for classification and handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Request validation errors (invalid input).
    Validation,
    /// Missing or mismatched credentials.
    Authentication,
    /// Permission denied.
    Authorization,
    /// Resource not found.
    NotFound,
    /// Conflict (e.g., concurrent modification).
    Conflict,
    /// Rate limiting.
    RateLimited,
    /// Request timeout.
    Timeout,
    /// Internal server errors.
    Internal,
    /// Downstream service failures.
    External,
}

impl ErrorCategory {
    /// Returns the default HTTP status code for this error category.
    ///
    /// Authentication failures map to 403, matching the boundary check.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::Validation => StatusCode::BAD_REQUEST,
            Self::Authentication | Self::Authorization => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            Self::External => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Error returned by a handler.
///
/// # Example
///
/// ```
/// use aegis_core::HandlerError;
/// use http::StatusCode;
///
/// let err = HandlerError::not_found("user 42 not found");
/// assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
/// assert_eq!(err.to_string(), "user 42 not found");
/// ```
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Request validation failed.
    #[error("{message}")]
    Validation {
        /// Human-readable error message.
        message: String,
    },

    /// Credentials were missing or wrong.
    #[error("{message}")]
    Authentication {
        /// Human-readable error message.
        message: String,
    },

    /// The caller may not perform this operation.
    #[error("{message}")]
    Authorization {
        /// Human-readable error message.
        message: String,
    },

    /// Resource not found.
    #[error("{message}")]
    NotFound {
        /// Human-readable error message.
        message: String,
    },

    /// Conflicting modification.
    #[error("{message}")]
    Conflict {
        /// Human-readable error message.
        message: String,
    },

    /// Rate limit exceeded.
    #[error("{message}")]
    RateLimited {
        /// Human-readable error message.
        message: String,
        /// Seconds until the rate limit resets.
        retry_after_seconds: Option<u64>,
    },

    /// Request timed out.
    #[error("{message}")]
    Timeout {
        /// Human-readable error message.
        message: String,
    },

    /// Internal server error.
    #[error("{message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// The underlying error (not exposed to clients).
        #[source]
        source: Option<anyhow::Error>,
    },

    /// A downstream service failed.
    #[error("{message}")]
    External {
        /// Human-readable error message.
        message: String,
        /// The name of the external service.
        service: Option<String>,
    },

    /// An explicit status with a message.
    #[error("{message}")]
    Status {
        /// Response status.
        status: StatusCode,
        /// Human-readable error message.
        message: String,
    },
}

impl HandlerError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an authentication error.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Creates an authorization error.
    #[must_use]
    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a conflict error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a rate limited error.
    #[must_use]
    pub fn rate_limited(message: impl Into<String>, retry_after_seconds: Option<u64>) -> Self {
        Self::RateLimited {
            message: message.into(),
            retry_after_seconds,
        }
    }

    /// Creates a timeout error.
    #[must_use]
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout {
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an internal error with a source error.
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Creates an external service error.
    #[must_use]
    pub fn external(message: impl Into<String>, service: Option<impl Into<String>>) -> Self {
        Self::External {
            message: message.into(),
            service: service.map(Into::into),
        }
    }

    /// Creates an error with an explicit status code.
    #[must_use]
    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Returns the error category.
    ///
    /// Explicit-status errors are classified by their status class.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::Authentication { .. } => ErrorCategory::Authentication,
            Self::Authorization { .. } => ErrorCategory::Authorization,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::RateLimited { .. } => ErrorCategory::RateLimited,
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::Internal { .. } => ErrorCategory::Internal,
            Self::External { .. } => ErrorCategory::External,
            Self::Status { status, .. } if status.is_server_error() => ErrorCategory::Internal,
            Self::Status { .. } => ErrorCategory::Validation,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Status { status, .. } => *status,
            other => other.category().default_status_code(),
        }
    }

    /// Returns true if the error represents a server-side failure that
    /// should be logged and reported.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }

    /// Returns the seconds until a rate limit resets, when known.
    #[must_use]
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited {
                retry_after_seconds,
                ..
            } => *retry_after_seconds,
            _ => None,
        }
    }

    /// Returns the name of the failing downstream service, when known.
    #[must_use]
    pub fn service(&self) -> Option<&str> {
        match self {
            Self::External { service, .. } => service.as_deref(),
            _ => None,
        }
    }

    /// Converts the error into the standard JSON error response.
    #[must_use]
    pub fn into_response(self) -> Response {
        let mut response = json_error_response(self.status_code(), &self);
        if let Some(seconds) = self.retry_after() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(seconds));
        }
        response
    }
}

/// Failure to encode a response body.
#[derive(Error, Debug)]
#[error("failed to encode response body: {0}")]
pub struct SerializationError(#[from] pub serde_json::Error);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_bare_message() {
        let error = HandlerError::authentication(AUTHENTICATION_ERROR_MESSAGE);
        assert_eq!(error.to_string(), "Authentication Error");
        assert_eq!(error.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_explicit_status() {
        let error = HandlerError::with_status(StatusCode::IM_A_TEAPOT, "short and stout");
        assert_eq!(error.status_code(), StatusCode::IM_A_TEAPOT);
        assert!(!error.is_server_error());

        let error = HandlerError::with_status(StatusCode::SERVICE_UNAVAILABLE, "draining");
        assert_eq!(error.category(), ErrorCategory::Internal);
        assert!(error.is_server_error());
    }

    #[test]
    fn test_internal_source_is_kept_out_of_message() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let error = HandlerError::internal_with_source("could not save", io);
        assert_eq!(error.to_string(), "could not save");
        assert!(std::error::Error::source(&error).is_some());
    }

    #[test]
    fn test_all_error_categories_have_error_status_codes() {
        let categories = [
            ErrorCategory::Validation,
            ErrorCategory::Authentication,
            ErrorCategory::Authorization,
            ErrorCategory::NotFound,
            ErrorCategory::Conflict,
            ErrorCategory::RateLimited,
            ErrorCategory::Timeout,
            ErrorCategory::Internal,
            ErrorCategory::External,
        ];

        for category in categories {
            let status = category.default_status_code();
            assert!(
                status.is_client_error() || status.is_server_error(),
                "Category {:?} should map to error status code, got {}",
                category,
                status
            );
        }
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = HandlerError::rate_limited("slow down", Some(30)).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "30");

        let response = HandlerError::rate_limited("slow down", None).into_response();
        assert!(!response.headers().contains_key(header::RETRY_AFTER));
    }

    #[test]
    fn test_external_service_name() {
        let error = HandlerError::external("upstream down", Some("billing"));
        assert_eq!(error.service(), Some("billing"));
        assert_eq!(error.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(HandlerError::external("down", None::<String>).service(), None);
    }

    #[test]
    fn test_into_response_uses_status() {
        let response = HandlerError::not_found("nope").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
