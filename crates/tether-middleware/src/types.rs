//! HTTP types used by the chain runtime.
//!
//! Requests reach the runtime fully buffered and are shared between every
//! middleware of a chain, so they travel behind an [`Arc`].

use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::Full;
use std::sync::Arc;

/// The HTTP request type handed to the runtime.
pub type Request = http::Request<Bytes>;

/// A request shared by every middleware of one invocation.
pub type SharedRequest = Arc<Request>;

/// The HTTP response type produced by [`crate::ChainRunner::handle`].
pub type Response = http::Response<Full<Bytes>>;

/// Builds the JSON body used for runtime-generated error responses.
pub fn error_body(code: &str, message: &str) -> serde_json::Value {
    serde_json::json!({
        "error": {
            "code": code,
            "message": message
        }
    })
}

/// Extension trait for building error responses.
pub trait ResponseExt {
    /// Creates a JSON error response.
    fn json_error(status: StatusCode, code: &str, message: &str) -> Response;
}

impl ResponseExt for Response {
    fn json_error(status: StatusCode, code: &str, message: &str) -> Response {
        let body = error_body(code, message).to_string();

        let mut response = Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() = status;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}
