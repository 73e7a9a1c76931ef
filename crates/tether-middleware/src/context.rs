//! Per-request context.
//!
//! A [`RequestContext`] is created for every run of a
//! [`ChainRunner`](crate::ChainRunner) and shared, behind an [`Arc`], by
//! every control, every middleware, and the response-end observer of that
//! run. It holds the runner's options, a per-request copy of the endpoint
//! metadata, typed extensions, and the request-level [`Phase`].
//!
//! Middleware sees it through [`MiddlewareContext`], which also carries the
//! [`RuntimeControl`] of the chain the middleware belongs to.

use crate::control::{ChainKind, ChainProgress, ChainStatus, RuntimeControl};
use crate::diagnostics::{Diagnostic, DiagnosticSink};
use parking_lot::{Mutex, RwLock};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tether_core::{ApiError, EndpointMetadata, RequestId};

/// Request-level lifecycle phase.
///
/// Phases only move forward; `Completed` and `Aborted` are final.
///
/// ```text
/// Idle ─▶ RunningPrimary ─▶ RunningError ─▶ Completed | Aborted
///               └──────────────────────────▶ Completed | Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Created, nothing ran yet.
    Idle,
    /// The primary chain (or the handler) is running.
    RunningPrimary,
    /// The error chain is running.
    RunningError,
    /// Finalised after the last chain ran every entry.
    Completed,
    /// Finalised after the last chain was aborted.
    Aborted,
}

impl Phase {
    const fn rank(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::RunningPrimary => 1,
            Self::RunningError => 2,
            Self::Completed | Self::Aborted => 3,
        }
    }

    /// Returns true while one of the chains is running.
    pub const fn is_running(self) -> bool {
        matches!(self, Self::RunningPrimary | Self::RunningError)
    }

    /// Returns true once the run was finalised.
    pub const fn is_final(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    /// Returns true if moving to `next` keeps the phase monotonic.
    pub const fn can_advance_to(self, next: Self) -> bool {
        !self.is_final() && next.rank() > self.rank()
    }
}

#[derive(Debug)]
struct RuntimeState {
    phase: Phase,
    error: Option<Arc<ApiError>>,
    response_sent: bool,
    active: Option<Arc<ChainProgress>>,
}

/// State shared by everything taking part in one run.
pub struct RequestContext<O> {
    request_id: RequestId,
    options: Arc<O>,
    endpoint: RwLock<EndpointMetadata>,
    state: Mutex<RuntimeState>,
    extensions: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
    diagnostics: Arc<dyn DiagnosticSink>,
    call_done_on_end: bool,
    started_at: Instant,
}

impl<O> RequestContext<O> {
    pub(crate) fn new(
        options: Arc<O>,
        endpoint: EndpointMetadata,
        diagnostics: Arc<dyn DiagnosticSink>,
        call_done_on_end: bool,
    ) -> Self {
        Self {
            request_id: RequestId::new(),
            options,
            endpoint: RwLock::new(endpoint),
            state: Mutex::new(RuntimeState {
                phase: Phase::Idle,
                error: None,
                response_sent: false,
                active: None,
            }),
            extensions: Mutex::new(HashMap::new()),
            diagnostics,
            call_done_on_end,
            started_at: Instant::now(),
        }
    }

    /// Returns the request ID.
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the runner's options.
    pub fn options(&self) -> &O {
        &self.options
    }

    /// Returns a copy of this request's endpoint metadata.
    pub fn endpoint(&self) -> EndpointMetadata {
        self.endpoint.read().clone()
    }

    /// Returns the endpoint descriptor.
    pub fn endpoint_descriptor(&self) -> String {
        self.endpoint.read().descriptor.clone()
    }

    /// Mutates this request's endpoint metadata.
    ///
    /// Only this request sees the change; the runner's metadata is copied
    /// per request.
    pub fn update_endpoint(&self, update: impl FnOnce(&mut EndpointMetadata)) {
        update(&mut self.endpoint.write());
    }

    /// Returns the current phase.
    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// Returns the error captured from the primary chain, if any.
    pub fn error(&self) -> Option<Arc<ApiError>> {
        self.state.lock().error.clone()
    }

    /// Returns true once the response ended.
    pub fn is_response_sent(&self) -> bool {
        self.state.lock().response_sent
    }

    /// Returns the time elapsed since the run started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Reports a diagnostic to the runner's sink.
    pub fn emit(&self, diagnostic: Diagnostic) {
        tracing::debug!(
            request_id = %self.request_id,
            diagnostic = diagnostic.code(),
            "runtime diagnostic"
        );
        self.diagnostics.emit(&diagnostic);
    }

    /// Stores a typed value for later middleware.
    ///
    /// A value of the same type stored earlier is replaced.
    pub fn insert_extension<T: Send + Sync + 'static>(&self, value: T) {
        self.extensions
            .lock()
            .insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Returns a copy of a typed value stored earlier.
    pub fn extension<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.extensions
            .lock()
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    /// Moves the phase forward. Returns false, changing nothing, if `next`
    /// would move it backwards or out of a final phase.
    pub(crate) fn advance(&self, next: Phase) -> bool {
        let mut state = self.state.lock();
        if !state.phase.can_advance_to(next) {
            tracing::debug!(
                request_id = %self.request_id,
                from = ?state.phase,
                to = ?next,
                "refused backwards phase transition"
            );
            return false;
        }
        state.phase = next;
        true
    }

    /// Makes `progress` the chain the response-end observer acts on.
    pub(crate) fn activate(&self, progress: Arc<ChainProgress>) {
        self.state.lock().active = Some(progress);
    }

    /// Records the primary chain's error and enters the error phase.
    pub(crate) fn capture_error(&self, error: Arc<ApiError>) {
        self.state.lock().error = Some(error);
        self.advance(Phase::RunningError);
    }

    /// Detaches the active chain and settles the final phase. A run that
    /// `failed` always ends `Aborted`.
    pub(crate) fn finish(&self, failed: bool) -> Phase {
        let mut state = self.state.lock();
        let aborted = state
            .active
            .take()
            .is_some_and(|progress| progress.status() == ChainStatus::Aborted)
            || failed;
        let last = if aborted {
            Phase::Aborted
        } else {
            Phase::Completed
        };
        if state.phase.can_advance_to(last) {
            state.phase = last;
        }
        state.phase
    }

    /// Called once, on the first end of the response.
    ///
    /// Applies the implicit `done()` to the active chain when the runner was
    /// configured with `call_done_on_end`.
    pub(crate) fn observe_response_end(&self) {
        let active = {
            let mut state = self.state.lock();
            state.response_sent = true;
            state.active.clone()
        };

        let Some(progress) = active else {
            return;
        };
        if !self.call_done_on_end {
            return;
        }

        match progress.abort() {
            Ok(()) => tracing::debug!(
                request_id = %self.request_id,
                chain = %progress.kind(),
                "response ended; chain aborted"
            ),
            Err(_) => self.emit(Diagnostic::ImplicitDoneSkipped {
                chain: progress.kind(),
                status: progress.status(),
            }),
        }
    }
}

impl<O> fmt::Debug for RequestContext<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("endpoint", &*self.endpoint.read())
            .field("state", &*self.state.lock())
            .field("call_done_on_end", &self.call_done_on_end)
            .finish_non_exhaustive()
    }
}

/// What a middleware receives besides the request and response.
///
/// # Example
///
/// ```
/// use tether_middleware::{ChainEntry, MiddlewareContext};
///
/// #[derive(Debug)]
/// struct Options {
///     banner: &'static str,
/// }
///
/// let entry: ChainEntry<Options> =
///     ChainEntry::from_fn("banner", |_request, response, ctx: MiddlewareContext<Options>| async move {
///         response.send(ctx.options().banner);
///         Ok(())
///     });
/// # let _ = entry;
/// ```
pub struct MiddlewareContext<O> {
    runtime: RuntimeControl<O>,
}

impl<O> Clone for MiddlewareContext<O> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
        }
    }
}

impl<O> fmt::Debug for MiddlewareContext<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareContext")
            .field("runtime", &self.runtime)
            .finish()
    }
}

impl<O: Send + Sync + 'static> MiddlewareContext<O> {
    pub(crate) const fn new(runtime: RuntimeControl<O>) -> Self {
        Self { runtime }
    }

    /// Returns the control of the chain this middleware belongs to.
    pub const fn runtime(&self) -> &RuntimeControl<O> {
        &self.runtime
    }

    /// Returns the shared request context.
    pub fn request_context(&self) -> &Arc<RequestContext<O>> {
        self.runtime.shared()
    }

    /// Returns the runner's options.
    pub fn options(&self) -> &O {
        self.request_context().options()
    }

    /// Returns a copy of this request's endpoint metadata.
    pub fn endpoint(&self) -> EndpointMetadata {
        self.request_context().endpoint()
    }

    /// Mutates this request's endpoint metadata.
    pub fn update_endpoint(&self, update: impl FnOnce(&mut EndpointMetadata)) {
        self.request_context().update_endpoint(update);
    }

    /// Returns the request ID.
    pub fn request_id(&self) -> RequestId {
        self.request_context().request_id()
    }

    /// Returns the time elapsed since the run started.
    pub fn elapsed(&self) -> Duration {
        self.request_context().elapsed()
    }

    /// Returns which chain this middleware runs in.
    pub fn chain(&self) -> ChainKind {
        self.runtime.chain()
    }

    /// Stores a typed value for later middleware.
    pub fn insert_extension<T: Send + Sync + 'static>(&self, value: T) {
        self.request_context().insert_extension(value);
    }

    /// Returns a copy of a typed value stored earlier.
    pub fn extension<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.request_context().extension()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::TracingDiagnostics;

    fn context(call_done_on_end: bool) -> RequestContext<()> {
        RequestContext::new(
            Arc::new(()),
            EndpointMetadata::new("v1/test"),
            Arc::new(TracingDiagnostics),
            call_done_on_end,
        )
    }

    #[test]
    fn test_phase_is_monotonic() {
        let ctx = context(true);
        assert_eq!(ctx.phase(), Phase::Idle);
        assert!(ctx.advance(Phase::RunningPrimary));
        assert!(ctx.advance(Phase::RunningError));
        assert!(!ctx.advance(Phase::RunningPrimary));
        assert_eq!(ctx.phase(), Phase::RunningError);
    }

    #[test]
    fn test_final_phase_is_sticky() {
        assert!(!Phase::Completed.can_advance_to(Phase::Aborted));
        assert!(!Phase::Aborted.can_advance_to(Phase::Completed));
        assert!(Phase::RunningPrimary.can_advance_to(Phase::Completed));
        assert!(Phase::Idle.can_advance_to(Phase::Aborted));
    }

    #[test]
    fn test_finish_reports_aborted_chain() {
        let ctx = context(true);
        ctx.advance(Phase::RunningPrimary);
        let progress = Arc::new(ChainProgress::new(ChainKind::Primary, 2));
        ctx.activate(Arc::clone(&progress));
        progress.abort().unwrap();

        assert_eq!(ctx.finish(false), Phase::Aborted);
        assert_eq!(ctx.finish(false), Phase::Aborted);
    }

    #[test]
    fn test_finish_without_active_chain_completes() {
        let ctx = context(true);
        ctx.advance(Phase::RunningPrimary);
        assert_eq!(ctx.finish(false), Phase::Completed);
    }

    #[test]
    fn test_failed_run_finishes_aborted() {
        let ctx = context(true);
        ctx.advance(Phase::RunningPrimary);
        let progress = Arc::new(ChainProgress::new(ChainKind::Primary, 0));
        assert_eq!(progress.current(), None);
        ctx.activate(progress);

        assert_eq!(ctx.finish(true), Phase::Aborted);
    }

    #[test]
    fn test_response_end_aborts_active_chain() {
        let ctx = context(true);
        let progress = Arc::new(ChainProgress::new(ChainKind::Primary, 2));
        ctx.activate(Arc::clone(&progress));

        ctx.observe_response_end();
        assert!(ctx.is_response_sent());
        assert_eq!(progress.status(), ChainStatus::Aborted);
    }

    #[test]
    fn test_response_end_without_call_done_on_end() {
        let ctx = context(false);
        let progress = Arc::new(ChainProgress::new(ChainKind::Primary, 2));
        ctx.activate(Arc::clone(&progress));

        ctx.observe_response_end();
        assert!(ctx.is_response_sent());
        assert_eq!(progress.status(), ChainStatus::Running);
    }

    #[test]
    fn test_update_endpoint_is_per_request() {
        let ctx = context(true);
        ctx.update_endpoint(|endpoint| endpoint.descriptor = "v1/renamed".to_string());
        assert_eq!(ctx.endpoint_descriptor(), "v1/renamed");
    }

    #[test]
    fn test_extensions() {
        #[derive(Debug, Clone, PartialEq)]
        struct UserId(String);

        let ctx = context(true);
        assert!(ctx.extension::<UserId>().is_none());

        ctx.insert_extension(UserId("user-1".to_string()));
        ctx.insert_extension(UserId("user-2".to_string()));
        assert_eq!(ctx.extension::<UserId>(), Some(UserId("user-2".to_string())));
    }
}
