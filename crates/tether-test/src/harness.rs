//! In-memory chain runs.

use crate::diagnostics::RecordingDiagnostics;
use crate::error::TestError;
use crate::request::{TestRequest, TestRequestBuilder};
use crate::response::TestResponse;
use std::sync::Arc;
use tether_middleware::{
    BoxedMiddleware, BufferedResponse, ChainRunner, Diagnostic, RunError, RunnerBuilder,
    RunnerConfig,
};

/// Runs requests through a [`ChainRunner`] and records its diagnostics.
///
/// # Example
///
/// ```
/// use http::StatusCode;
/// use tether_middleware::ChainRunner;
/// use tether_test::{TestHarness, TestRequest};
///
/// # tokio_test::block_on(async {
/// let harness = TestHarness::new(ChainRunner::builder(()));
///
/// let outcome = harness.send(TestRequest::get("/v1/users")).await.unwrap();
/// outcome.response.assert_status(StatusCode::NOT_IMPLEMENTED);
/// assert!(outcome.result.is_ok());
/// # });
/// ```
#[derive(Debug)]
pub struct TestHarness<O: 'static> {
    runner: ChainRunner<O>,
    diagnostics: Arc<RecordingDiagnostics>,
}

/// What one run produced.
#[derive(Debug)]
pub struct TestOutcome {
    /// The response as the client would see it.
    pub response: TestResponse,
    /// What [`ChainRunner::run`] returned.
    pub result: Result<(), RunError>,
    /// Diagnostics recorded during the run.
    pub diagnostics: Vec<Diagnostic>,
}

impl TestOutcome {
    /// Returns the stable codes of the recorded diagnostics.
    pub fn diagnostic_codes(&self) -> Vec<&'static str> {
        self.diagnostics.iter().map(Diagnostic::code).collect()
    }
}

impl<O: Send + Sync + 'static> TestHarness<O> {
    /// Builds the runner with a recording diagnostic sink.
    pub fn new(builder: RunnerBuilder<O>) -> Self {
        let diagnostics = Arc::new(RecordingDiagnostics::new());
        let runner = builder.diagnostics(diagnostics.clone()).build();
        Self {
            runner,
            diagnostics,
        }
    }

    /// Builds the runner from a configuration, replacing its diagnostic
    /// sink with a recording one.
    pub fn from_config(handler: Option<BoxedMiddleware<O>>, mut config: RunnerConfig<O>) -> Self {
        let diagnostics = Arc::new(RecordingDiagnostics::new());
        config.diagnostics = diagnostics.clone();
        Self {
            runner: ChainRunner::new(handler, config),
            diagnostics,
        }
    }

    /// Returns the runner under test.
    pub fn runner(&self) -> &ChainRunner<O> {
        &self.runner
    }

    /// Returns the recorder, including diagnostics emitted after a run
    /// returned (for example by detached tasks).
    pub fn diagnostics(&self) -> &RecordingDiagnostics {
        &self.diagnostics
    }

    /// Runs one request.
    pub async fn send(&self, request: TestRequestBuilder) -> Result<TestOutcome, TestError> {
        Ok(self.run(request.build()?).await)
    }

    /// Runs one already-built request.
    pub async fn run(&self, request: TestRequest) -> TestOutcome {
        self.diagnostics.take();
        let buffer = BufferedResponse::new();
        let result = self
            .runner
            .run(request.into_http_request(), buffer.clone())
            .await;

        TestOutcome {
            response: TestResponse::from_buffered(&buffer),
            result,
            diagnostics: self.diagnostics.take(),
        }
    }

    /// Runs one request through [`ChainRunner::handle`], as a host would.
    pub async fn handle(&self, request: TestRequestBuilder) -> Result<TestResponse, TestError> {
        let response = self
            .runner
            .handle(request.build()?.into_http_request())
            .await;
        TestResponse::from_http(response).await
    }
}
