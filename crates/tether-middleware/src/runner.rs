//! The chain runner.
//!
//! A [`ChainRunner`] is built once per route from a primary chain (`use`),
//! an error chain (`useOnError`), an optional terminal handler, and shared
//! options. Every request then goes through the same steps:
//!
//! 1. The runtime's response-end observer is installed on the response.
//! 2. The primary chain is walked.
//! 3. If it finished without an error and nothing was sent, the handler
//!    runs with the primary chain's control.
//! 4. If the primary chain (or the handler) raised and nothing was sent,
//!    the error chain is walked; its middleware reads the captured error
//!    through [`RuntimeControl::error`](crate::RuntimeControl::error).
//! 5. If the response is still unsent, a `501 Not Implemented` is sent.
//!
//! # Example
//!
//! ```
//! use http::StatusCode;
//! use tether_middleware::{BufferedResponse, ChainRunner, MiddlewareContext};
//!
//! # tokio_test::block_on(async {
//! let runner = ChainRunner::builder(())
//!     .add_use_fn("auth", |_request, _response, ctx: MiddlewareContext<()>| async move {
//!         ctx.runtime().next().await
//!     })
//!     .handler_fn("hello", |_request, response, _ctx| async move {
//!         response.send("hello");
//!         Ok(())
//!     })
//!     .build();
//!
//! let buffer = BufferedResponse::new();
//! runner
//!     .run(http::Request::new(bytes::Bytes::new()), buffer.clone())
//!     .await
//!     .unwrap();
//!
//! assert_eq!(buffer.status(), StatusCode::OK);
//! assert_eq!(buffer.body(), "hello");
//! # });
//! ```

use crate::context::{MiddlewareContext, Phase, RequestContext};
use crate::control::{ChainKind, RuntimeControl};
use crate::diagnostics::{DiagnosticSink, TracingDiagnostics};
use crate::middleware::{BoxedMiddleware, ChainEntry, FnMiddleware, MiddlewareResult};
use crate::sentinel::{BufferedResponse, ResponseSink, ResponseWriter};
use crate::types::{Request, Response, ResponseExt, SharedRequest};
use crate::walker;
use http::StatusCode;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tether_core::{ApiError, EndpointMetadata};
use thiserror::Error;
use tracing::Instrument;

/// A failure the runner could not turn into a response.
#[derive(Debug, Error)]
pub enum RunError {
    /// The primary chain raised and no error-chain middleware sent a
    /// response. Carries the original error.
    #[error("unhandled error: {0}")]
    Unhandled(Arc<ApiError>),

    /// An error-chain middleware raised.
    #[error("error chain raised: {0}")]
    ErrorChain(ApiError),
}

impl RunError {
    /// Returns the underlying API error.
    pub fn api_error(&self) -> &ApiError {
        match self {
            Self::Unhandled(error) => error,
            Self::ErrorChain(error) => error,
        }
    }
}

/// Configuration a runner is built from.
pub struct RunnerConfig<O> {
    /// The primary chain.
    pub use_chain: Vec<ChainEntry<O>>,
    /// The error chain.
    pub use_on_error: Vec<ChainEntry<O>>,
    /// Options visible to every middleware.
    pub options: Arc<O>,
    /// Abort the active chain when the response ends.
    pub call_done_on_end: bool,
    /// Metadata of the route the runner serves.
    pub endpoint: EndpointMetadata,
    /// Where runtime diagnostics go.
    pub diagnostics: Arc<dyn DiagnosticSink>,
}

impl<O> RunnerConfig<O> {
    /// Creates a configuration with empty chains.
    pub fn new(options: O) -> Self {
        Self {
            use_chain: Vec::new(),
            use_on_error: Vec::new(),
            options: Arc::new(options),
            call_done_on_end: true,
            endpoint: EndpointMetadata::default(),
            diagnostics: Arc::new(TracingDiagnostics),
        }
    }
}

impl<O: 'static> Clone for RunnerConfig<O> {
    fn clone(&self) -> Self {
        Self {
            use_chain: self.use_chain.clone(),
            use_on_error: self.use_on_error.clone(),
            options: Arc::clone(&self.options),
            call_done_on_end: self.call_done_on_end,
            endpoint: self.endpoint.clone(),
            diagnostics: Arc::clone(&self.diagnostics),
        }
    }
}

impl<O: 'static> fmt::Debug for RunnerConfig<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerConfig")
            .field("use_chain", &self.use_chain)
            .field("use_on_error", &self.use_on_error)
            .field("call_done_on_end", &self.call_done_on_end)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

/// Runs a route's middleware chains for each request.
pub struct ChainRunner<O> {
    handler: Option<BoxedMiddleware<O>>,
    use_chain: Arc<[ChainEntry<O>]>,
    use_on_error: Arc<[ChainEntry<O>]>,
    options: Arc<O>,
    call_done_on_end: bool,
    endpoint: EndpointMetadata,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl<O: 'static> fmt::Debug for ChainRunner<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainRunner")
            .field("handler", &self.handler.as_ref().map(|h| h.name()))
            .field("use_chain", &self.use_chain)
            .field("use_on_error", &self.use_on_error)
            .field("call_done_on_end", &self.call_done_on_end)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl<O: Send + Sync + 'static> ChainRunner<O> {
    /// Creates a runner from a handler and a configuration.
    ///
    /// Without a handler, a request no middleware answered gets the
    /// `501 Not Implemented` fallback, which stubs out a route.
    pub fn new(handler: Option<BoxedMiddleware<O>>, config: RunnerConfig<O>) -> Self {
        Self {
            handler,
            use_chain: config.use_chain.into(),
            use_on_error: config.use_on_error.into(),
            options: config.options,
            call_done_on_end: config.call_done_on_end,
            endpoint: config.endpoint,
            diagnostics: config.diagnostics,
        }
    }

    /// Creates a builder.
    pub fn builder(options: O) -> RunnerBuilder<O> {
        RunnerBuilder::new(options)
    }

    /// Returns the route metadata.
    pub const fn endpoint(&self) -> &EndpointMetadata {
        &self.endpoint
    }

    /// Returns the names of the primary chain's entries.
    pub fn use_names(&self) -> Vec<&str> {
        self.use_chain.iter().map(ChainEntry::label).collect()
    }

    /// Returns the names of the error chain's entries.
    pub fn use_on_error_names(&self) -> Vec<&str> {
        self.use_on_error.iter().map(ChainEntry::label).collect()
    }

    /// Runs one request, writing the response into `sink`.
    ///
    /// `Ok` means a response was produced: by middleware, by the handler,
    /// or by the `501` fallback. On `Err`, the response may be unsent if
    /// the error chain itself raised; the host decides what to send.
    pub async fn run(&self, request: Request, sink: impl ResponseSink) -> Result<(), RunError> {
        let shared = Arc::new(RequestContext::new(
            Arc::clone(&self.options),
            self.endpoint.clone(),
            Arc::clone(&self.diagnostics),
            self.call_done_on_end,
        ));
        let span = tracing::debug_span!(
            "chain_run",
            request_id = %shared.request_id(),
            endpoint = %self.endpoint.descriptor,
            method = %request.method(),
        );

        self.run_with(shared, Arc::new(request), ResponseWriter::new(sink))
            .instrument(span)
            .await
    }

    /// Runs one request into an in-memory response and returns it.
    ///
    /// A request that failed without a response becomes a
    /// `500 Internal Server Error`.
    pub async fn handle(&self, request: Request) -> Response {
        let buffer = BufferedResponse::new();
        if let Err(error) = self.run(request, buffer.clone()).await {
            tracing::error!(
                endpoint = %self.endpoint.descriptor,
                error = %error,
                "request failed"
            );
            if !buffer.is_ended() {
                return Response::json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "an internal error occurred",
                );
            }
        }
        buffer.to_response()
    }

    async fn run_with(
        &self,
        shared: Arc<RequestContext<O>>,
        request: SharedRequest,
        response: ResponseWriter,
    ) -> Result<(), RunError> {
        let observer = Arc::clone(&shared);
        response.on_end(move |_| observer.observe_response_end());

        shared.advance(Phase::RunningPrimary);
        let primary = RuntimeControl::new(
            Arc::clone(&shared),
            ChainKind::Primary,
            Arc::clone(&self.use_chain),
            Arc::clone(&request),
            response.clone(),
        );
        shared.activate(Arc::clone(primary.progress()));

        let result = match self.run_primary(&primary).await {
            Ok(()) => Ok(()),
            Err(error) => self.recover(&shared, &request, &response, error).await,
        };

        self.finalize(&shared, &response, result)
    }

    async fn run_primary(&self, primary: &RuntimeControl<O>) -> MiddlewareResult {
        walker::walk(primary.clone()).await?;

        if primary.response().is_sent() {
            return Ok(());
        }
        let Some(handler) = &self.handler else {
            tracing::debug!("no handler configured");
            return Ok(());
        };

        tracing::trace!(handler = handler.name(), "invoking handler");
        let result = handler
            .process(
                Arc::clone(primary.request()),
                primary.response().clone(),
                primary.context(),
            )
            .await;
        if result.is_err() {
            primary.progress().fail();
        }
        result
    }

    async fn recover(
        &self,
        shared: &Arc<RequestContext<O>>,
        request: &SharedRequest,
        response: &ResponseWriter,
        error: ApiError,
    ) -> Result<(), RunError> {
        let error = Arc::new(error);

        if response.is_sent() {
            tracing::warn!(
                error = %error,
                "error raised after the response was sent; error chain skipped"
            );
            return Err(RunError::Unhandled(error));
        }
        if self.use_on_error.is_empty() {
            return Err(RunError::Unhandled(error));
        }

        shared.capture_error(Arc::clone(&error));
        let control = RuntimeControl::new(
            Arc::clone(shared),
            ChainKind::Error,
            Arc::clone(&self.use_on_error),
            Arc::clone(request),
            response.clone(),
        );
        shared.activate(Arc::clone(control.progress()));

        walker::walk(control).await.map_err(RunError::ErrorChain)?;

        if response.is_sent() {
            Ok(())
        } else {
            tracing::debug!(error = %error, "error chain finished without sending a response");
            Err(RunError::Unhandled(error))
        }
    }

    fn finalize(
        &self,
        shared: &RequestContext<O>,
        response: &ResponseWriter,
        result: Result<(), RunError>,
    ) -> Result<(), RunError> {
        let phase = shared.finish(result.is_err());

        let needs_fallback =
            !response.is_sent() && !matches!(result, Err(RunError::ErrorChain(_)));
        if needs_fallback {
            metrics::counter!(
                "tether_not_implemented_total",
                "endpoint" => shared.endpoint_descriptor()
            )
            .increment(1);
            tracing::debug!("no response sent; responding 501 Not Implemented");

            let request_id = shared.request_id().to_string();
            let envelope = ApiError::not_implemented().to_envelope(Some(&request_id), false);
            if let Err(error) = response.status(StatusCode::NOT_IMPLEMENTED).json(&envelope) {
                tracing::error!(error = %error, "failed to serialize fallback response");
                response.end();
            }
        }

        tracing::debug!(?phase, ok = result.is_ok(), "run finished");
        result
    }
}

/// Builder for [`ChainRunner`].
#[must_use]
pub struct RunnerBuilder<O> {
    handler: Option<BoxedMiddleware<O>>,
    config: RunnerConfig<O>,
}

impl<O: Send + Sync + 'static> RunnerBuilder<O> {
    /// Creates a builder with empty chains and no handler.
    pub fn new(options: O) -> Self {
        Self {
            handler: None,
            config: RunnerConfig::new(options),
        }
    }

    /// Appends an entry to the primary chain.
    pub fn add_use(mut self, entry: ChainEntry<O>) -> Self {
        self.config.use_chain.push(entry);
        self
    }

    /// Appends an async closure to the primary chain.
    pub fn add_use_fn<F, Fut>(self, name: &'static str, func: F) -> Self
    where
        F: Fn(SharedRequest, ResponseWriter, MiddlewareContext<O>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MiddlewareResult> + Send + 'static,
    {
        self.add_use(ChainEntry::from_fn(name, func))
    }

    /// Appends an entry to the error chain.
    pub fn add_use_on_error(mut self, entry: ChainEntry<O>) -> Self {
        self.config.use_on_error.push(entry);
        self
    }

    /// Appends an async closure to the error chain.
    pub fn add_use_on_error_fn<F, Fut>(self, name: &'static str, func: F) -> Self
    where
        F: Fn(SharedRequest, ResponseWriter, MiddlewareContext<O>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MiddlewareResult> + Send + 'static,
    {
        self.add_use_on_error(ChainEntry::from_fn(name, func))
    }

    /// Sets the terminal handler.
    pub fn handler(mut self, handler: BoxedMiddleware<O>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Sets an async closure as the terminal handler.
    pub fn handler_fn<F, Fut>(self, name: &'static str, func: F) -> Self
    where
        F: Fn(SharedRequest, ResponseWriter, MiddlewareContext<O>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = MiddlewareResult> + Send + 'static,
    {
        self.handler(Arc::new(FnMiddleware::new(name, func)))
    }

    /// Sets whether ending the response aborts the active chain.
    pub fn call_done_on_end(mut self, enabled: bool) -> Self {
        self.config.call_done_on_end = enabled;
        self
    }

    /// Sets the route metadata.
    pub fn endpoint(mut self, endpoint: EndpointMetadata) -> Self {
        self.config.endpoint = endpoint;
        self
    }

    /// Sets the diagnostic sink.
    pub fn diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.config.diagnostics = sink;
        self
    }

    /// Builds the runner.
    pub fn build(self) -> ChainRunner<O> {
        ChainRunner::new(self.handler, self.config)
    }
}

/// Per-route adjustments applied by a [`MiddlewareFactory`].
///
/// Resulting chains are `prepend ++ defaults ++ append`.
pub struct ChainOverrides<O> {
    /// Entries placed before the default primary chain.
    pub prepend_use: Vec<ChainEntry<O>>,
    /// Entries placed after the default primary chain.
    pub append_use: Vec<ChainEntry<O>>,
    /// Entries placed before the default error chain.
    pub prepend_use_on_error: Vec<ChainEntry<O>>,
    /// Entries placed after the default error chain.
    pub append_use_on_error: Vec<ChainEntry<O>>,
    /// Replaces the default options.
    pub options: Option<O>,
    /// Replaces the default route metadata.
    pub endpoint: Option<EndpointMetadata>,
    /// Replaces the default `call_done_on_end`.
    pub call_done_on_end: Option<bool>,
}

impl<O> Default for ChainOverrides<O> {
    fn default() -> Self {
        Self {
            prepend_use: Vec::new(),
            append_use: Vec::new(),
            prepend_use_on_error: Vec::new(),
            append_use_on_error: Vec::new(),
            options: None,
            endpoint: None,
            call_done_on_end: None,
        }
    }
}

/// Builds runners that share a default configuration.
///
/// # Example
///
/// ```
/// use tether_middleware::{ChainEntry, ChainOverrides, MiddlewareFactory, RunnerConfig};
///
/// let mut defaults = RunnerConfig::new(());
/// defaults.use_chain.push(ChainEntry::from_fn("auth", |_request, _response, _ctx| async { Ok(()) }));
/// let factory = MiddlewareFactory::new(defaults);
///
/// let runner = factory.create(
///     None,
///     ChainOverrides {
///         prepend_use: vec![ChainEntry::from_fn("cors", |_request, _response, _ctx| async { Ok(()) })],
///         ..ChainOverrides::default()
///     },
/// );
/// assert_eq!(runner.use_names(), vec!["cors", "auth"]);
/// ```
pub struct MiddlewareFactory<O> {
    defaults: RunnerConfig<O>,
}

impl<O: 'static> fmt::Debug for MiddlewareFactory<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareFactory")
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl<O: Send + Sync + 'static> MiddlewareFactory<O> {
    /// Creates a factory.
    pub const fn new(defaults: RunnerConfig<O>) -> Self {
        Self { defaults }
    }

    /// Returns the default configuration.
    pub const fn defaults(&self) -> &RunnerConfig<O> {
        &self.defaults
    }

    /// Creates a runner for one route.
    pub fn create(
        &self,
        handler: Option<BoxedMiddleware<O>>,
        overrides: ChainOverrides<O>,
    ) -> ChainRunner<O> {
        let defaults = &self.defaults;
        let config = RunnerConfig {
            use_chain: concat(overrides.prepend_use, &defaults.use_chain, overrides.append_use),
            use_on_error: concat(
                overrides.prepend_use_on_error,
                &defaults.use_on_error,
                overrides.append_use_on_error,
            ),
            options: overrides
                .options
                .map_or_else(|| Arc::clone(&defaults.options), Arc::new),
            call_done_on_end: overrides
                .call_done_on_end
                .unwrap_or(defaults.call_done_on_end),
            endpoint: overrides
                .endpoint
                .unwrap_or_else(|| defaults.endpoint.clone()),
            diagnostics: Arc::clone(&defaults.diagnostics),
        };
        ChainRunner::new(handler, config)
    }
}

fn concat<O: 'static>(
    prepend: Vec<ChainEntry<O>>,
    base: &[ChainEntry<O>],
    append: Vec<ChainEntry<O>>,
) -> Vec<ChainEntry<O>> {
    let mut chain = prepend;
    chain.extend(base.iter().cloned());
    chain.extend(append);
    chain
}
