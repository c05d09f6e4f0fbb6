//! Request/response types and JSON response helpers.
//!
//! Every error that leaves the pipeline uses the same envelope:
//!
//! ```json
//! {"type":"error","status":500,"message":"boom"}
//! ```

use crate::error::SerializationError;
use bytes::Bytes;
use http::{header, HeaderValue, StatusCode};
use http_body_util::Full;
use serde::{Deserialize, Serialize};

/// The HTTP request type used in the pipeline.
///
/// This is a standard `http::Request` with a `Full<Bytes>` body.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type used in the pipeline.
///
/// This is a standard `http::Response` with a `Full<Bytes>` body.
pub type Response = http::Response<Full<Bytes>>;

/// Content type written by every JSON helper.
pub const APPLICATION_JSON: &str = "application/json";

/// Message used when a JSON body cannot be encoded.
pub const MARSHAL_ERROR_MESSAGE: &str = "Error marshalling JSON";

/// The JSON error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Always `"error"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Mirrors the HTTP status code.
    pub status: u16,
    /// Human-readable message.
    pub message: String,
}

impl ErrorBody {
    /// Creates an envelope for `status` with `message`.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            kind: "error".to_string(),
            status: status.as_u16(),
            message: message.into(),
        }
    }
}

/// Encodes `value` as a JSON response with the given status.
pub fn try_json_response<T: Serialize + ?Sized>(
    status: StatusCode,
    value: &T,
) -> Result<Response, SerializationError> {
    let body = serde_json::to_vec(value)?;
    Ok(raw_json_response(status, Bytes::from(body)))
}

/// Encodes `value` as a JSON response with the given status.
///
/// If encoding fails, returns a 500 error envelope with
/// `"Error marshalling JSON"` instead.
pub fn json_response<T: Serialize + ?Sized>(status: StatusCode, value: &T) -> Response {
    try_json_response(status, value).unwrap_or_else(|_| marshal_failure())
}

/// Builds the JSON error envelope for `status`, using `message`'s `Display`
/// output as the message.
pub fn json_error_response(status: StatusCode, message: &dyn std::fmt::Display) -> Response {
    json_response(status, &ErrorBody::new(status, message.to_string()))
}

/// Builds an empty response with the given status.
pub fn empty_response(status: StatusCode) -> Response {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

fn raw_json_response(status: StatusCode, body: Bytes) -> Response {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
    response
}

// The fallback body is a literal; encoding it again could only fail the same way.
fn marshal_failure() -> Response {
    let body = format!(
        r#"{{"type":"error","status":500,"message":"{}"}}"#,
        MARSHAL_ERROR_MESSAGE
    );
    raw_json_response(StatusCode::INTERNAL_SERVER_ERROR, Bytes::from(body))
}
