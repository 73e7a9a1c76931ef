//! Test response wrapper.

use crate::error::TestError;
use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use std::fmt;
use tether_middleware::BufferedResponse;

/// A captured response with helper methods for assertions.
#[derive(Clone)]
pub struct TestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    ended: bool,
    end_calls: usize,
}

impl TestResponse {
    /// Captures the current state of an in-memory response.
    pub fn from_buffered(buffer: &BufferedResponse) -> Self {
        Self {
            status: buffer.status(),
            headers: buffer.headers(),
            body: buffer.body(),
            ended: buffer.is_ended(),
            end_calls: buffer.end_calls(),
        }
    }

    /// Collects an `http` response, such as one returned by
    /// [`ChainRunner::handle`](tether_middleware::ChainRunner::handle).
    pub async fn from_http<B>(response: http::Response<B>) -> Result<Self, TestError>
    where
        B: BodyExt,
        B::Error: fmt::Display,
    {
        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| TestError::BodyRead(e.to_string()))?
            .to_bytes();

        Ok(Self::new(parts.status, parts.headers, body))
    }

    /// Creates a test response from raw parts.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
            ended: true,
            end_calls: 1,
        }
    }

    /// Returns the status code.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns true once the response ended.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.ended
    }

    /// Returns how many times `end` reached the underlying sink.
    #[must_use]
    pub fn end_calls(&self) -> usize {
        self.end_calls
    }

    /// Returns a reference to the headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Gets a header value by name.
    #[must_use]
    pub fn header(&self, name: impl AsRef<str>) -> Option<&HeaderValue> {
        self.headers.get(name.as_ref())
    }

    /// Gets a header value as a string.
    #[must_use]
    pub fn header_str(&self, name: impl AsRef<str>) -> Option<&str> {
        self.header(name).and_then(|v| v.to_str().ok())
    }

    /// Returns the raw body bytes.
    #[must_use]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns the body as a string.
    pub fn text(&self) -> Result<String, TestError> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| TestError::BodyRead(format!("invalid UTF-8: {e}")))
    }

    /// Deserializes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TestError> {
        serde_json::from_slice(&self.body).map_err(TestError::Json)
    }

    // Assertion methods

    /// Asserts that the status code equals the expected value.
    ///
    /// # Panics
    ///
    /// Panics if the status code doesn't match.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status, expected,
            "Expected status {}, got {}",
            expected, self.status
        );
        self
    }

    /// Asserts that the response ended exactly once.
    ///
    /// # Panics
    ///
    /// Panics if the response never ended or ended more than once.
    pub fn assert_ended_once(&self) -> &Self {
        assert_eq!(self.end_calls, 1, "Expected exactly one end, got {}", self.end_calls);
        self
    }

    /// Asserts that a header exists with the expected value.
    ///
    /// # Panics
    ///
    /// Panics if the header doesn't exist or doesn't match.
    pub fn assert_header(&self, name: impl AsRef<str>, expected: impl AsRef<str>) -> &Self {
        let name = name.as_ref();
        let expected = expected.as_ref();
        let actual = self
            .header_str(name)
            .unwrap_or_else(|| panic!("Header '{name}' not found"));
        assert_eq!(
            actual, expected,
            "Header '{name}': expected '{expected}', got '{actual}'"
        );
        self
    }

    /// Asserts that the body equals the expected string.
    ///
    /// # Panics
    ///
    /// Panics if the body doesn't match.
    pub fn assert_body_eq(&self, expected: impl AsRef<str>) -> &Self {
        let body = self.text().expect("Body should be valid UTF-8");
        assert_eq!(body, expected.as_ref(), "Body mismatch");
        self
    }

    /// Asserts that the body is a JSON error envelope with `code`.
    ///
    /// # Panics
    ///
    /// Panics if the body is not JSON or carries another code.
    pub fn assert_error_code(&self, code: &str) -> &Self {
        let json: serde_json::Value = self.json().expect("Body should be valid JSON");
        assert_eq!(
            json.pointer("/error/code").and_then(serde_json::Value::as_str),
            Some(code),
            "Error code mismatch in: {json}"
        );
        self
    }

    /// Asserts that the content type is JSON.
    ///
    /// # Panics
    ///
    /// Panics if Content-Type is missing or not JSON.
    pub fn assert_json_content_type(&self) -> &Self {
        let actual = self
            .header_str(header::CONTENT_TYPE.as_str())
            .expect("Content-Type header not found");
        assert!(
            actual.starts_with("application/json"),
            "Content-Type: expected JSON, got '{actual}'"
        );
        self
    }
}

impl fmt::Debug for TestResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("end_calls", &self.end_calls)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::Full;

    fn create_response(status: u16, body: &str) -> TestResponse {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        TestResponse::new(
            StatusCode::from_u16(status).unwrap(),
            headers,
            Bytes::from(body.to_string()),
        )
    }

    #[test]
    fn test_status_and_header() {
        let response = create_response(405, "{}");
        response
            .assert_status(StatusCode::METHOD_NOT_ALLOWED)
            .assert_header("Content-Type", "application/json")
            .assert_json_content_type();
    }

    #[test]
    fn test_error_code() {
        let response = create_response(501, r#"{"error":{"code":"NOT_IMPLEMENTED"}}"#);
        response.assert_error_code("NOT_IMPLEMENTED");
    }

    #[test]
    #[should_panic(expected = "Expected status")]
    fn test_assert_status_panics_on_mismatch() {
        create_response(200, "{}").assert_status(StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_from_buffered_unsent() {
        let response = TestResponse::from_buffered(&BufferedResponse::new());
        assert!(!response.is_ended());
        assert_eq!(response.end_calls(), 0);
    }

    #[tokio::test]
    async fn test_from_http() {
        let http_response = http::Response::builder()
            .status(StatusCode::CREATED)
            .body(Full::new(Bytes::from_static(b"made")))
            .unwrap();

        let response = TestResponse::from_http(http_response).await.unwrap();
        response.assert_status(StatusCode::CREATED).assert_body_eq("made");
    }
}
