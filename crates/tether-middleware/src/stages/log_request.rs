//! Request logging.
//!
//! The stage registers a response-end hook and lets the chain continue.
//! When the response ends, the hook builds a [`RequestLogEntry`], bumps the
//! `tether_requests_logged_total` counter, and hands the entry to a
//! [`RequestLogStore`] on a detached tokio task. The response is never
//! delayed by the store.
//!
//! Store failures happen after the response was finalized and cannot
//! change it. A store that was closed while the write was in flight
//! ([`RequestLogError::StoreClosed`]) is expected during shutdown: the
//! failure is swallowed and reported as
//! [`Diagnostic::PostCompletionErrorSwallowed`]. Every other failure is
//! logged and kept, and [`LogRequestMiddleware::drain`] returns it.

use crate::context::{MiddlewareContext, RequestContext};
use crate::diagnostics::Diagnostic;
use crate::middleware::{BoxFuture, Middleware, MiddlewareResult};
use crate::sentinel::ResponseWriter;
use crate::types::SharedRequest;
use chrono::{DateTime, Utc};
use http::StatusCode;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tether_core::RequestId;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinSet;

/// One finished request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLogEntry {
    /// The request ID.
    pub request_id: RequestId,
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub route: String,
    /// Endpoint descriptor at the time the response ended.
    pub endpoint: String,
    /// Final status code.
    pub status: u16,
    /// When the response ended.
    pub created_at: DateTime<Utc>,
    /// Time from the start of the run to the end of the response.
    pub duration_ms: u64,
}

/// A failed request log write.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RequestLogError {
    /// The store was shut down while the write was in flight.
    #[error("request log store is closed")]
    StoreClosed,

    /// The store rejected the write.
    #[error("request log store failed: {0}")]
    Store(String),

    /// The detached write task panicked or was cancelled.
    #[error("request log task failed: {0}")]
    Task(String),
}

/// Destination for request log entries.
pub trait RequestLogStore: Send + Sync + 'static {
    /// Persists one entry.
    fn record(&self, entry: RequestLogEntry) -> BoxFuture<'static, Result<(), RequestLogError>>;
}

/// An in-memory [`RequestLogStore`].
///
/// Clones share the same entries. After [`close`](Self::close), every write
/// fails with [`RequestLogError::StoreClosed`].
#[derive(Debug, Clone, Default)]
pub struct MemoryRequestLog {
    entries: Arc<Mutex<Vec<RequestLogEntry>>>,
    closed: Arc<AtomicBool>,
}

impl MemoryRequestLog {
    /// Creates an empty, open log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded entries.
    pub fn entries(&self) -> Vec<RequestLogEntry> {
        self.entries.lock().clone()
    }

    /// Refuses every later write.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl RequestLogStore for MemoryRequestLog {
    fn record(&self, entry: RequestLogEntry) -> BoxFuture<'static, Result<(), RequestLogError>> {
        let entries = Arc::clone(&self.entries);
        let closed = Arc::clone(&self.closed);
        Box::pin(async move {
            if closed.load(Ordering::SeqCst) {
                return Err(RequestLogError::StoreClosed);
            }
            entries.lock().push(entry);
            Ok(())
        })
    }
}

#[derive(Default)]
struct PendingWrites {
    tasks: JoinSet<Result<(), RequestLogError>>,
    failures: Vec<RequestLogError>,
}

impl PendingWrites {
    fn reap(&mut self) {
        while let Some(outcome) = self.tasks.try_join_next() {
            self.keep_failure(outcome);
        }
    }

    fn keep_failure(
        &mut self,
        outcome: Result<Result<(), RequestLogError>, tokio::task::JoinError>,
    ) {
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(error)) => self.failures.push(error),
            Err(error) => self.failures.push(RequestLogError::Task(error.to_string())),
        }
    }
}

/// Records every finished request in a [`RequestLogStore`].
///
/// Clones share the store and the pending writes.
#[derive(Clone)]
pub struct LogRequestMiddleware {
    store: Arc<dyn RequestLogStore>,
    pending: Arc<Mutex<PendingWrites>>,
}

impl fmt::Debug for LogRequestMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self.pending.lock();
        f.debug_struct("LogRequestMiddleware")
            .field("pending", &pending.tasks.len())
            .field("failures", &pending.failures.len())
            .finish_non_exhaustive()
    }
}

impl LogRequestMiddleware {
    /// Creates the stage writing to `store`.
    pub fn new(store: impl RequestLogStore) -> Self {
        Self {
            store: Arc::new(store),
            pending: Arc::new(Mutex::new(PendingWrites::default())),
        }
    }

    /// Waits for every detached write and returns the first failure seen
    /// since the last drain.
    pub async fn drain(&self) -> Result<(), RequestLogError> {
        let mut drained = std::mem::take(&mut *self.pending.lock());
        while let Some(outcome) = drained.tasks.join_next().await {
            drained.keep_failure(outcome);
        }

        drained.failures.into_iter().next().map_or(Ok(()), Err)
    }

    fn spawn_write<O: Send + Sync + 'static>(
        &self,
        shared: Arc<RequestContext<O>>,
        entry: RequestLogEntry,
    ) {
        let Ok(handle) = Handle::try_current() else {
            tracing::warn!(
                request_id = %entry.request_id,
                "no tokio runtime on response end; request log entry dropped"
            );
            return;
        };

        let write = write_entry(Arc::clone(&self.store), shared, entry);
        let mut pending = self.pending.lock();
        pending.reap();
        pending.tasks.spawn_on(write, &handle);
    }
}

async fn write_entry<O: Send + Sync + 'static>(
    store: Arc<dyn RequestLogStore>,
    shared: Arc<RequestContext<O>>,
    entry: RequestLogEntry,
) -> Result<(), RequestLogError> {
    let request_id = entry.request_id;
    match store.record(entry).await {
        Ok(()) => Ok(()),
        Err(RequestLogError::StoreClosed) => {
            shared.emit(Diagnostic::PostCompletionErrorSwallowed {
                message: RequestLogError::StoreClosed.to_string(),
            });
            Ok(())
        }
        Err(error) => {
            tracing::error!(
                request_id = %request_id,
                error = %error,
                "failed to record request"
            );
            Err(error)
        }
    }
}

impl<O: Send + Sync + 'static> Middleware<O> for LogRequestMiddleware {
    fn name(&self) -> &'static str {
        "log-request"
    }

    fn process<'a>(
        &'a self,
        request: SharedRequest,
        response: ResponseWriter,
        ctx: MiddlewareContext<O>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            let stage = self.clone();
            let shared = Arc::clone(ctx.request_context());
            let method = request.method().to_string();
            let route = request.uri().path().to_string();

            response.on_end(move |status: StatusCode| {
                let entry = RequestLogEntry {
                    request_id: shared.request_id(),
                    method,
                    route,
                    endpoint: shared.endpoint_descriptor(),
                    status: status.as_u16(),
                    created_at: Utc::now(),
                    duration_ms: u64::try_from(shared.elapsed().as_millis()).unwrap_or(u64::MAX),
                };

                metrics::counter!(
                    "tether_requests_logged_total",
                    "endpoint" => entry.endpoint.clone(),
                    "status" => status.as_str().to_owned()
                )
                .increment(1);

                stage.spawn_write(shared, entry);
            });

            Ok(())
        })
    }
}
