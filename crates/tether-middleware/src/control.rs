//! Chain control: cursor, status, and the `next`/`done`/`error` surface.
//!
//! Every chain invocation owns a [`ChainProgress`]: a cursor into its
//! entries plus a [`ChainStatus`]. The progress is shared between the walker
//! and every [`RuntimeControl`] handed to middleware of that chain, so a
//! nested `next()` and the outer walker always agree on what already ran.
//!
//! Status transitions are one-way:
//!
//! ```text
//! Running ──exhausted──▶ Exhausted
//!    │
//!    └──done() / error──▶ Aborted
//! ```

use crate::context::{MiddlewareContext, Phase, RequestContext};
use crate::diagnostics::Diagnostic;
use crate::middleware::{BoxFuture, ChainEntry, MiddlewareResult};
use crate::sentinel::ResponseWriter;
use crate::types::SharedRequest;
use crate::walker;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tether_core::ApiError;

/// Which of a runner's two chains a control belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainKind {
    /// The `use` chain, run for every request.
    Primary,
    /// The `useOnError` chain, run after the primary chain raised an error.
    Error,
}

impl fmt::Display for ChainKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Error => f.write_str("error"),
        }
    }
}

/// Execution status of one chain invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainStatus {
    /// Entries remain to be run.
    Running,
    /// Every entry ran.
    Exhausted,
    /// Stopped early by `done()`, by an entry error, or by the response
    /// ending.
    Aborted,
}

impl ChainStatus {
    /// Returns true while entries may still run.
    pub const fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

#[derive(Debug)]
struct Progress {
    cursor: usize,
    status: ChainStatus,
    failure: Option<Arc<ApiError>>,
}

/// Shared cursor and status of one chain invocation.
#[derive(Debug)]
pub(crate) struct ChainProgress {
    kind: ChainKind,
    len: usize,
    inner: Mutex<Progress>,
}

impl ChainProgress {
    pub(crate) fn new(kind: ChainKind, len: usize) -> Self {
        Self {
            kind,
            len,
            inner: Mutex::new(Progress {
                cursor: 0,
                status: ChainStatus::Running,
                failure: None,
            }),
        }
    }

    pub(crate) const fn kind(&self) -> ChainKind {
        self.kind
    }

    pub(crate) fn status(&self) -> ChainStatus {
        self.inner.lock().status
    }

    pub(crate) fn cursor(&self) -> usize {
        self.inner.lock().cursor
    }

    /// Returns the index of the entry to run, or `None` once the chain
    /// stopped. Reaching the end marks the chain exhausted.
    pub(crate) fn current(&self) -> Option<usize> {
        let mut progress = self.inner.lock();
        if !progress.status.is_running() {
            return None;
        }
        if progress.cursor >= self.len {
            progress.status = ChainStatus::Exhausted;
            return None;
        }
        Some(progress.cursor)
    }

    /// Moves past `index` unless the entry itself already moved the cursor
    /// or stopped the chain.
    pub(crate) fn advance_from(&self, index: usize) {
        let mut progress = self.inner.lock();
        if progress.status.is_running() && progress.cursor == index {
            progress.cursor += 1;
        }
    }

    /// Claims the entry after the cursor for an explicit `next()`.
    pub(crate) fn pull(&self) -> Result<(), Diagnostic> {
        let mut progress = self.inner.lock();
        match progress.status {
            ChainStatus::Running => {
                progress.cursor += 1;
                Ok(())
            }
            ChainStatus::Aborted => Err(Diagnostic::NextAfterAbort { chain: self.kind }),
            ChainStatus::Exhausted => Err(Diagnostic::NextAfterCompletion { chain: self.kind }),
        }
    }

    /// Stops the chain on behalf of `done()`.
    pub(crate) fn abort(&self) -> Result<(), Diagnostic> {
        let mut progress = self.inner.lock();
        match progress.status {
            ChainStatus::Running => {
                progress.status = ChainStatus::Aborted;
                Ok(())
            }
            ChainStatus::Aborted => Err(Diagnostic::DoneAfterAbort { chain: self.kind }),
            ChainStatus::Exhausted => Err(Diagnostic::DoneAfterCompletion { chain: self.kind }),
        }
    }

    /// Stops the chain after an entry error, whatever its status.
    pub(crate) fn fail(&self) {
        self.inner.lock().status = ChainStatus::Aborted;
    }

    /// Records the error a `next()` call resolved with, until the entry
    /// that called it returns. The first recorded error is kept.
    pub(crate) fn record_failure(&self, error: Arc<ApiError>) {
        let mut progress = self.inner.lock();
        progress.status = ChainStatus::Aborted;
        progress.failure.get_or_insert(error);
    }

    pub(crate) fn take_failure(&self) -> Option<Arc<ApiError>> {
        self.inner.lock().failure.take()
    }
}

/// The runtime surface a middleware uses to drive its chain.
///
/// A control is bound to one chain invocation. Clones share that
/// invocation's progress.
pub struct RuntimeControl<O> {
    shared: Arc<RequestContext<O>>,
    entries: Arc<[ChainEntry<O>]>,
    progress: Arc<ChainProgress>,
    request: SharedRequest,
    response: ResponseWriter,
}

impl<O> Clone for RuntimeControl<O> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            entries: Arc::clone(&self.entries),
            progress: Arc::clone(&self.progress),
            request: Arc::clone(&self.request),
            response: self.response.clone(),
        }
    }
}

impl<O> fmt::Debug for RuntimeControl<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeControl")
            .field("request_id", &self.shared.request_id())
            .field("chain", &self.progress.kind())
            .field("entries", &self.entries.len())
            .field("progress", &self.progress)
            .finish()
    }
}

impl<O: Send + Sync + 'static> RuntimeControl<O> {
    pub(crate) fn new(
        shared: Arc<RequestContext<O>>,
        kind: ChainKind,
        entries: Arc<[ChainEntry<O>]>,
        request: SharedRequest,
        response: ResponseWriter,
    ) -> Self {
        let progress = Arc::new(ChainProgress::new(kind, entries.len()));
        Self {
            shared,
            entries,
            progress,
            request,
            response,
        }
    }

    /// Runs the rest of the chain, starting after the current entry.
    ///
    /// Resolves once the chain finished (or stopped) and returns the first
    /// error an entry raised. Nothing happens until the future is awaited.
    /// On a chain that already stopped this emits a diagnostic and resolves
    /// to `Ok(())`.
    ///
    /// The error stays with the chain: if the caller returns `Ok` instead of
    /// propagating it, the chain still fails with it once the caller returns,
    /// unless the caller sent a response.
    pub fn next(&self) -> BoxFuture<'static, MiddlewareResult> {
        let control = self.clone();
        Box::pin(async move {
            if let Err(diagnostic) = control.progress.pull() {
                control.shared.emit(diagnostic);
                return Ok(());
            }
            let progress = Arc::clone(&control.progress);
            walker::walk(control).await.map_err(|error| {
                let error = Arc::new(error);
                progress.record_failure(Arc::clone(&error));
                ApiError::shared(error)
            })
        })
    }

    /// Aborts the chain: no further entry of it will run.
    ///
    /// Calling it on a chain that already stopped emits a diagnostic and
    /// changes nothing.
    pub fn done(&self) {
        match self.progress.abort() {
            Ok(()) => tracing::debug!(
                request_id = %self.shared.request_id(),
                chain = %self.progress.kind(),
                "chain aborted by runtime.done()"
            ),
            Err(diagnostic) => self.shared.emit(diagnostic),
        }
    }

    /// Returns the error that triggered the error chain.
    ///
    /// Always `None` on a primary-chain control, and `None` once the run
    /// finished, even on an error-chain control kept past it.
    pub fn error(&self) -> Option<Arc<ApiError>> {
        match (self.progress.kind(), self.shared.phase()) {
            (ChainKind::Error, Phase::RunningError) => self.shared.error(),
            _ => None,
        }
    }

    /// Returns the chain this control drives.
    pub fn chain(&self) -> ChainKind {
        self.progress.kind()
    }

    /// Returns the chain's current status.
    pub fn status(&self) -> ChainStatus {
        self.progress.status()
    }

    /// Returns the index of the entry the cursor points at.
    pub fn cursor(&self) -> usize {
        self.progress.cursor()
    }

    /// Returns the request-level phase.
    pub fn phase(&self) -> Phase {
        self.shared.phase()
    }

    pub(crate) fn context(&self) -> MiddlewareContext<O> {
        MiddlewareContext::new(self.clone())
    }

    pub(crate) fn shared(&self) -> &Arc<RequestContext<O>> {
        &self.shared
    }

    pub(crate) fn progress(&self) -> &Arc<ChainProgress> {
        &self.progress
    }

    pub(crate) fn entry(&self, index: usize) -> Option<&ChainEntry<O>> {
        self.entries.get(index)
    }

    pub(crate) fn request(&self) -> &SharedRequest {
        &self.request
    }

    pub(crate) fn response(&self) -> &ResponseWriter {
        &self.response
    }
}
