//! # Aegis Test
//!
//! In-memory testing for Aegis services. A [`TestClient`] drives any
//! [`Dispatch`](aegis_server::Dispatch) (a `ServeMux`, a `MiddlewareMux` or a
//! whole service) without binding a port, so requests take the same path
//! through middleware, recovery and routing that served requests do.
//!
//! ## Example
//!
//! ```ignore
//! use aegis_test::TestClient;
//!
//! #[tokio::test]
//! async fn test_create_user() {
//!     let client = TestClient::new(app());
//!
//!     let response = client
//!         .post("/users")
//!         .basic_auth("admin", "secret")
//!         .json(&serde_json::json!({"name": "Alice"}))
//!         .send()
//!         .await;
//!
//!     response.assert_status(http::StatusCode::CREATED);
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/aegis-test/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod request;
mod response;

pub use client::{TestClient, TestClientRequest};
pub use error::TestError;
pub use request::TestRequestBuilder;
pub use response::TestResponse;
