//! Method check.
//!
//! Responds `405 Method Not Allowed`, with an `Allow` header listing the
//! endpoint's methods, when the request method is globally disallowed or
//! not among the endpoint's allowed methods. Allowed requests pass through
//! untouched.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, MiddlewareResult};
use crate::sentinel::ResponseWriter;
use crate::types::{error_body, SharedRequest};
use http::header::{HeaderValue, ALLOW};
use http::{Method, StatusCode};
use tether_core::ApiError;

/// Rejects requests whose method the endpoint does not serve.
#[derive(Debug, Clone, Default)]
pub struct CheckMethodMiddleware {
    disallowed: Vec<Method>,
}

impl CheckMethodMiddleware {
    /// Creates the stage with no globally disallowed methods.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuses `methods` on every endpoint, whatever the endpoint allows.
    #[must_use]
    pub fn disallow(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.disallowed = methods.into_iter().collect();
        self
    }

    /// Creates the stage from configured method names.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, ApiError> {
        let methods = names
            .iter()
            .map(|name| {
                Method::from_bytes(name.as_ref().to_uppercase().as_bytes()).map_err(|e| {
                    ApiError::internal_with_source(format!("invalid method `{}`", name.as_ref()), e)
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new().disallow(methods))
    }
}

impl<O: Send + Sync + 'static> Middleware<O> for CheckMethodMiddleware {
    fn name(&self) -> &'static str {
        "check-method"
    }

    fn process<'a>(
        &'a self,
        request: SharedRequest,
        response: ResponseWriter,
        ctx: MiddlewareContext<O>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            let method = request.method();
            let endpoint = ctx.endpoint();

            if !self.disallowed.contains(method) && endpoint.allows(method) {
                tracing::trace!(%method, "method check succeeded");
                return Ok(());
            }

            tracing::debug!(
                %method,
                endpoint = %endpoint.descriptor,
                "method check failed: disallowed or unsupported method"
            );

            let allow = HeaderValue::from_str(&endpoint.allow_header())
                .map_err(|e| ApiError::internal_with_source("invalid Allow header", e))?;
            response
                .status(StatusCode::METHOD_NOT_ALLOWED)
                .header(ALLOW, allow)
                .json(&error_body(
                    "METHOD_NOT_ALLOWED",
                    &format!("method {method} is not allowed"),
                ))
        })
    }
}
