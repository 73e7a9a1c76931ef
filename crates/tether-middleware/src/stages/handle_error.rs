//! Error handling.
//!
//! Placed at the end of the error chain, this stage reads the error the
//! runtime captured from the primary chain and responds with a JSON error
//! envelope whose status follows the error's [`ErrorCategory`]:
//!
//! ```json
//! {
//!   "error": {
//!     "code": "NOT_FOUND",
//!     "message": "user with ID 'alice' not found",
//!     "category": "not_found"
//!   },
//!   "request_id": "0190..."
//! }
//! ```
//!
//! Server-fault messages are hidden unless exposure is enabled. Handlers
//! registered per category take precedence over the default response.
//!
//! If the response was already sent, the error cannot be reported to the
//! client and is raised again for the host.
//!
//! # Example
//!
//! ```
//! use http::StatusCode;
//! use tether_core::ErrorCategory;
//! use tether_middleware::stages::HandleErrorMiddleware;
//!
//! let stage = HandleErrorMiddleware::new()
//!     .expose_internal_errors(false)
//!     .on_category(ErrorCategory::Conflict, |error, response| {
//!         response.status(StatusCode::CONFLICT).send(error.to_string());
//!         Ok(())
//!     });
//! # let _ = stage;
//! ```

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, MiddlewareResult};
use crate::sentinel::ResponseWriter;
use crate::types::SharedRequest;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tether_core::{ApiError, ErrorCategory};

/// A custom responder for one error category.
pub type ErrorHandlerFn = Arc<dyn Fn(&ApiError, &ResponseWriter) -> MiddlewareResult + Send + Sync>;

/// Responds to the captured error.
#[derive(Clone, Default)]
pub struct HandleErrorMiddleware {
    expose_internal_errors: bool,
    handlers: HashMap<ErrorCategory, ErrorHandlerFn>,
}

impl fmt::Debug for HandleErrorMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleErrorMiddleware")
            .field("expose_internal_errors", &self.expose_internal_errors)
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl HandleErrorMiddleware {
    /// Creates the stage with internal messages hidden.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether server-fault messages reach the client.
    ///
    /// **Warning**: Only enable this in development environments.
    #[must_use]
    pub fn expose_internal_errors(mut self, expose: bool) -> Self {
        self.expose_internal_errors = expose;
        self
    }

    /// Uses `handler` instead of the default response for errors of
    /// `category`.
    #[must_use]
    pub fn on_category<F>(mut self, category: ErrorCategory, handler: F) -> Self
    where
        F: Fn(&ApiError, &ResponseWriter) -> MiddlewareResult + Send + Sync + 'static,
    {
        self.handlers.insert(category, Arc::new(handler));
        self
    }
}

impl<O: Send + Sync + 'static> Middleware<O> for HandleErrorMiddleware {
    fn name(&self) -> &'static str {
        "handle-error"
    }

    fn process<'a>(
        &'a self,
        request: SharedRequest,
        response: ResponseWriter,
        ctx: MiddlewareContext<O>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            let Some(error) = ctx.runtime().error() else {
                tracing::debug!("no captured error; nothing to handle");
                return Ok(());
            };

            if response.is_sent() {
                tracing::debug!(
                    error = %error,
                    "cannot handle error: response already sent; raising again"
                );
                return Err(ApiError::shared(error));
            }

            let category = error.category();
            if let Some(handler) = self.handlers.get(&category) {
                tracing::debug!(?category, "using custom error handler");
                return handler(&error, &response);
            }

            if category.is_server_fault() {
                tracing::error!(
                    request_id = %ctx.request_id(),
                    endpoint = %ctx.endpoint().descriptor,
                    uri = %request.uri(),
                    error = %error,
                    source = ?std::error::Error::source(&*error),
                    "error - exception on request"
                );
            } else {
                tracing::debug!(?category, error = %error, "handling client error");
            }

            let request_id = ctx.request_id().to_string();
            response
                .status(error.status_code())
                .json(&error.to_envelope(Some(&request_id), self.expose_internal_errors))
        })
    }
}
