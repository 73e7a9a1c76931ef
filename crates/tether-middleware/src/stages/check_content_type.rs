//! Content-type check.
//!
//! Responds `415 Unsupported Media Type` when the request's `Content-Type`
//! is not one the endpoint accepts. Place it after the method check.
//!
//! Unless configured otherwise, requests with a payload method (`POST`,
//! `PUT`, `PATCH`) and requests carrying any `Content-Type` are rejected;
//! other requests without a `Content-Type` pass.

use crate::context::MiddlewareContext;
use crate::middleware::{BoxFuture, Middleware, MiddlewareResult};
use crate::sentinel::ResponseWriter;
use crate::types::{error_body, SharedRequest};
use http::header::CONTENT_TYPE;
use http::{Method, StatusCode};
use std::collections::HashMap;

/// Which media types a request may carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentTypePolicy {
    /// Any `Content-Type`, or none at all.
    Any,
    /// Only requests without a `Content-Type`.
    Absent,
    /// One of the listed media types, or no `Content-Type` when
    /// `allow_absent` is set.
    Only {
        /// Accepted media types, lowercase.
        types: Vec<String>,
        /// Also accept requests without a `Content-Type`.
        allow_absent: bool,
    },
}

impl ContentTypePolicy {
    /// Accepts exactly the given media types.
    pub fn only<S: AsRef<str>>(types: impl IntoIterator<Item = S>) -> Self {
        Self::Only {
            types: types
                .into_iter()
                .map(|t| t.as_ref().to_ascii_lowercase())
                .collect(),
            allow_absent: false,
        }
    }

    /// Also accepts requests without a `Content-Type`.
    #[must_use]
    pub fn or_absent(self) -> Self {
        match self {
            Self::Only { types, .. } => Self::Only {
                types,
                allow_absent: true,
            },
            other => other,
        }
    }

    fn admits(&self, content_type: Option<&str>) -> bool {
        match (self, content_type) {
            (Self::Any, _) | (Self::Absent, None) => true,
            (Self::Absent, Some(_)) => false,
            (Self::Only { allow_absent, .. }, None) => *allow_absent,
            (Self::Only { types, .. }, Some(value)) => types.iter().any(|t| t == value),
        }
    }
}

/// Rejects requests whose `Content-Type` the endpoint does not accept.
#[derive(Debug, Clone, Default)]
pub struct CheckContentTypeMiddleware {
    allowed: Option<ContentTypePolicy>,
    per_method: HashMap<Method, ContentTypePolicy>,
}

impl CheckContentTypeMiddleware {
    /// Creates the stage with nothing allowed beyond the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `policy` to payload requests and to requests that carry a
    /// `Content-Type`.
    #[must_use]
    pub fn allow(mut self, policy: ContentTypePolicy) -> Self {
        self.allowed = Some(policy);
        self
    }

    /// Applies `policy` to every request using `method`.
    ///
    /// Once any method is configured, payload requests and requests with a
    /// `Content-Type` using an unlisted method are rejected.
    #[must_use]
    pub fn allow_for(mut self, method: Method, policy: ContentTypePolicy) -> Self {
        self.per_method.insert(method, policy);
        self
    }

    fn admits(&self, method: &Method, content_type: Option<&str>) -> bool {
        let constrained = is_payload_method(method) || content_type.is_some();

        if !self.per_method.is_empty() {
            return match self.per_method.get(method) {
                Some(policy) => policy.admits(content_type),
                None => !constrained,
            };
        }

        match &self.allowed {
            Some(ContentTypePolicy::Absent) => content_type.is_none(),
            Some(policy) => !constrained || policy.admits(content_type),
            None => !constrained,
        }
    }
}

fn is_payload_method(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

impl<O: Send + Sync + 'static> Middleware<O> for CheckContentTypeMiddleware {
    fn name(&self) -> &'static str {
        "check-content-type"
    }

    fn process<'a>(
        &'a self,
        request: SharedRequest,
        response: ResponseWriter,
        _ctx: MiddlewareContext<O>,
    ) -> BoxFuture<'a, MiddlewareResult> {
        Box::pin(async move {
            let method = request.method();
            let content_type = request
                .headers()
                .get(CONTENT_TYPE)
                .map(|value| String::from_utf8_lossy(value.as_bytes()).to_ascii_lowercase());

            if self.admits(method, content_type.as_deref()) {
                tracing::trace!(%method, ?content_type, "content-type check succeeded");
                return Ok(());
            }

            let shown = content_type.map_or_else(|| "(none)".to_string(), |t| format!("\"{t}\""));
            let message =
                format!("unrecognized or disallowed Content-Type header for method {method}: {shown}");
            tracing::debug!(%method, %message, "content-type check failed");

            response
                .status(StatusCode::UNSUPPORTED_MEDIA_TYPE)
                .json(&error_body("UNSUPPORTED_MEDIA_TYPE", &message))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ChainRunner;
    use crate::sentinel::BufferedResponse;
    use crate::types::Request;
    use bytes::Bytes;

    async fn run(stage: CheckContentTypeMiddleware, request: Request) -> BufferedResponse {
        let runner = ChainRunner::builder(())
            .add_use(crate::ChainEntry::new(stage))
            .handler_fn("ok", |_request, response, _ctx| async move {
                response.send("ok");
                Ok(())
            })
            .build();
        let buffer = BufferedResponse::new();
        runner.run(request, buffer.clone()).await.unwrap();
        buffer
    }

    fn request(method: Method, content_type: Option<&str>) -> Request {
        let mut builder = http::Request::builder().method(method);
        if let Some(value) = content_type {
            builder = builder.header(CONTENT_TYPE, value);
        }
        builder.body(Bytes::new()).unwrap()
    }

    #[tokio::test]
    async fn test_unconfigured_allows_plain_get() {
        let buffer = run(CheckContentTypeMiddleware::new(), request(Method::GET, None)).await;
        assert_eq!(buffer.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unconfigured_rejects_payload_methods() {
        let buffer = run(CheckContentTypeMiddleware::new(), request(Method::POST, None)).await;
        assert_eq!(buffer.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(buffer.end_calls(), 1);
    }

    #[tokio::test]
    async fn test_listed_type_passes_case_insensitively() {
        let stage = CheckContentTypeMiddleware::new()
            .allow(ContentTypePolicy::only(["application/json"]));

        let buffer = run(stage.clone(), request(Method::POST, Some("Application/JSON"))).await;
        assert_eq!(buffer.status(), StatusCode::OK);

        let buffer = run(stage, request(Method::POST, Some("text/plain"))).await;
        assert_eq!(buffer.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let body: serde_json::Value = serde_json::from_slice(&buffer.body()).unwrap();
        assert_eq!(
            body["error"]["message"],
            "unrecognized or disallowed Content-Type header for method POST: \"text/plain\""
        );
    }

    #[tokio::test]
    async fn test_absent_type_needs_opt_in() {
        let strict = CheckContentTypeMiddleware::new()
            .allow(ContentTypePolicy::only(["application/json"]));
        let buffer = run(strict, request(Method::PUT, None)).await;
        assert_eq!(buffer.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let lenient = CheckContentTypeMiddleware::new()
            .allow(ContentTypePolicy::only(["application/json"]).or_absent());
        let buffer = run(lenient, request(Method::PUT, None)).await;
        assert_eq!(buffer.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_absent_policy_rejects_any_type() {
        let stage = CheckContentTypeMiddleware::new().allow(ContentTypePolicy::Absent);
        let buffer = run(stage, request(Method::GET, Some("text/plain"))).await;
        assert_eq!(buffer.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_per_method_policies() {
        let stage = CheckContentTypeMiddleware::new()
            .allow_for(Method::POST, ContentTypePolicy::Any)
            .allow_for(Method::GET, ContentTypePolicy::Absent);

        let buffer = run(stage.clone(), request(Method::POST, Some("text/csv"))).await;
        assert_eq!(buffer.status(), StatusCode::OK);

        let buffer = run(stage.clone(), request(Method::GET, Some("text/csv"))).await;
        assert_eq!(buffer.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let buffer = run(stage, request(Method::PATCH, Some("text/csv"))).await;
        assert_eq!(buffer.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
}
