//! Response handling.
//!
//! The host provides a [`ResponseSink`]: the thing that actually writes
//! status, headers, and body. The runtime wraps it in a [`ResponseSentinel`]
//! that records the first end of the response and runs end hooks exactly
//! once, then hands middleware a clonable [`ResponseWriter`].
//!
//! The first end hook is always the runtime's own observer, installed
//! before any middleware runs. Later calls to `end()` still reach the sink
//! but run no hooks.

use crate::types::Response;
use bytes::{Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tether_core::ApiError;

/// The host-side response the runtime writes into.
pub trait ResponseSink: Send + 'static {
    /// Sets the status code.
    fn set_status(&mut self, status: StatusCode);

    /// Returns the status code.
    fn status(&self) -> StatusCode;

    /// Sets a header, replacing earlier values.
    fn insert_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Appends a chunk to the body.
    fn write(&mut self, chunk: Bytes);

    /// Finalises the response.
    fn end(&mut self);

    /// Returns true once the response was finalised.
    fn is_ended(&self) -> bool;
}

/// A callback run on the first end of the response, with its final status.
pub type EndHook = Box<dyn FnOnce(StatusCode) + Send>;

/// Wraps a sink and records whether the response was sent.
pub struct ResponseSentinel {
    sink: Box<dyn ResponseSink>,
    sent: bool,
    hooks: Vec<EndHook>,
}

impl ResponseSentinel {
    /// Wraps a sink.
    pub fn new(sink: impl ResponseSink) -> Self {
        Self {
            sink: Box::new(sink),
            sent: false,
            hooks: Vec::new(),
        }
    }

    /// Returns true once the response ended.
    pub const fn is_sent(&self) -> bool {
        self.sent
    }

    /// Ends the sink. Returns the hooks to run if this was the first end.
    fn end(&mut self) -> Vec<EndHook> {
        self.sink.end();
        if self.sent {
            return Vec::new();
        }
        self.sent = true;
        std::mem::take(&mut self.hooks)
    }
}

impl fmt::Debug for ResponseSentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseSentinel")
            .field("status", &self.sink.status())
            .field("sent", &self.sent)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

/// The response handle passed to middleware.
///
/// Clones write to the same response.
///
/// # Example
///
/// ```
/// use http::StatusCode;
/// use tether_middleware::{BufferedResponse, ResponseWriter};
///
/// let buffer = BufferedResponse::new();
/// let response = ResponseWriter::new(buffer.clone());
///
/// response.status(StatusCode::CREATED).send("created");
///
/// assert!(response.is_sent());
/// assert_eq!(buffer.status(), StatusCode::CREATED);
/// assert_eq!(buffer.body(), "created");
/// ```
#[derive(Clone)]
pub struct ResponseWriter {
    inner: Arc<Mutex<ResponseSentinel>>,
}

impl ResponseWriter {
    /// Wraps a host sink.
    pub fn new(sink: impl ResponseSink) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ResponseSentinel::new(sink))),
        }
    }

    /// Sets the status code.
    pub fn status(&self, status: StatusCode) -> &Self {
        self.inner.lock().sink.set_status(status);
        self
    }

    /// Returns the status code set so far.
    pub fn status_code(&self) -> StatusCode {
        self.inner.lock().sink.status()
    }

    /// Sets a header.
    pub fn header(&self, name: HeaderName, value: HeaderValue) -> &Self {
        self.inner.lock().sink.insert_header(name, value);
        self
    }

    /// Appends a chunk to the body without ending the response.
    pub fn write(&self, chunk: impl Into<Bytes>) -> &Self {
        self.inner.lock().sink.write(chunk.into());
        self
    }

    /// Ends the response.
    ///
    /// The first call runs the end hooks; later calls only reach the sink.
    pub fn end(&self) {
        let (status, hooks) = {
            let mut sentinel = self.inner.lock();
            let hooks = sentinel.end();
            (sentinel.sink.status(), hooks)
        };
        for hook in hooks {
            hook(status);
        }
    }

    /// Writes `body` and ends the response.
    pub fn send(&self, body: impl Into<Bytes>) {
        self.write(body);
        self.end();
    }

    /// Serialises `value` as JSON, sets the content type, and ends the
    /// response.
    pub fn json<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), ApiError> {
        let body = serde_json::to_vec(value)?;
        self.header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.send(body);
        Ok(())
    }

    /// Returns true once the response ended.
    pub fn is_sent(&self) -> bool {
        self.inner.lock().is_sent()
    }

    /// Registers a callback for the first end of the response.
    ///
    /// Runs right away if the response already ended.
    pub fn on_end(&self, hook: impl FnOnce(StatusCode) + Send + 'static) {
        let status = {
            let mut sentinel = self.inner.lock();
            if !sentinel.is_sent() {
                sentinel.hooks.push(Box::new(hook));
                return;
            }
            sentinel.sink.status()
        };
        hook(status);
    }
}

impl fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResponseWriter")
            .field(&*self.inner.lock())
            .finish()
    }
}

#[derive(Debug, Default)]
struct Buffer {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
    ended: bool,
    end_calls: usize,
}

/// An in-memory [`ResponseSink`].
///
/// Clones share the same buffer, so the host keeps one clone and gives the
/// other to the runner.
#[derive(Debug, Clone, Default)]
pub struct BufferedResponse {
    inner: Arc<Mutex<Buffer>>,
}

impl BufferedResponse {
    /// Creates an empty `200 OK` response.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the status code.
    pub fn status(&self) -> StatusCode {
        self.inner.lock().status
    }

    /// Returns a header value.
    pub fn header(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.inner.lock().headers.get(name).cloned()
    }

    /// Returns a copy of every header.
    pub fn headers(&self) -> HeaderMap {
        self.inner.lock().headers.clone()
    }

    /// Returns the body written so far.
    pub fn body(&self) -> Bytes {
        self.inner.lock().body.clone().freeze()
    }

    /// Returns true once the response ended.
    pub fn is_ended(&self) -> bool {
        self.inner.lock().ended
    }

    /// Returns how many times `end` reached this sink.
    pub fn end_calls(&self) -> usize {
        self.inner.lock().end_calls
    }

    /// Builds an `http` response from the buffer.
    pub fn to_response(&self) -> Response {
        let buffer = self.inner.lock();
        let mut response = Response::new(Full::new(buffer.body.clone().freeze()));
        *response.status_mut() = buffer.status;
        *response.headers_mut() = buffer.headers.clone();
        response
    }
}

impl ResponseSink for BufferedResponse {
    fn set_status(&mut self, status: StatusCode) {
        let mut buffer = self.inner.lock();
        if buffer.ended {
            tracing::warn!(%status, "ignoring status change after response ended");
            return;
        }
        buffer.status = status;
    }

    fn status(&self) -> StatusCode {
        self.inner.lock().status
    }

    fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        let mut buffer = self.inner.lock();
        if buffer.ended {
            tracing::warn!(header = %name, "ignoring header after response ended");
            return;
        }
        buffer.headers.insert(name, value);
    }

    fn write(&mut self, chunk: Bytes) {
        let mut buffer = self.inner.lock();
        if buffer.ended {
            tracing::warn!(bytes = chunk.len(), "ignoring write after response ended");
            return;
        }
        buffer.body.extend_from_slice(&chunk);
    }

    fn end(&mut self) {
        let mut buffer = self.inner.lock();
        buffer.ended = true;
        buffer.end_calls += 1;
    }

    fn is_ended(&self) -> bool {
        self.inner.lock().ended
    }
}
