//! Developer diagnostics.
//!
//! The runtime never fails a request because of misuse it can recover from:
//! calling `next()` on a finished chain, calling `done()` twice, putting a
//! non-middleware item in a chain. Each of these is reported as a
//! [`Diagnostic`] to the runner's [`DiagnosticSink`] and otherwise ignored.
//!
//! The default sink, [`TracingDiagnostics`], logs them as `tracing` warnings.
//! Tests install a recording sink to assert on them.

use crate::control::{ChainKind, ChainStatus};
use std::fmt;

/// A recoverable misuse or no-op observed by the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// `next()` was called on a chain that was aborted.
    NextAfterAbort {
        /// The chain the call was made on.
        chain: ChainKind,
    },
    /// `next()` was called on a chain that already ran every entry.
    NextAfterCompletion {
        /// The chain the call was made on.
        chain: ChainKind,
    },
    /// `done()` was called on a chain that was already aborted.
    DoneAfterAbort {
        /// The chain the call was made on.
        chain: ChainKind,
    },
    /// `done()` was called on a chain that already ran every entry.
    DoneAfterCompletion {
        /// The chain the call was made on.
        chain: ChainKind,
    },
    /// The walker reached an entry that cannot be invoked.
    SkippedNonCallable {
        /// The chain being walked.
        chain: ChainKind,
        /// Position of the entry in the chain.
        index: usize,
        /// What the entry was.
        description: String,
    },
    /// The response ended while the active chain had already stopped, so the
    /// implicit `done()` was not applied.
    ImplicitDoneSkipped {
        /// The active chain.
        chain: ChainKind,
        /// The status the chain had already reached.
        status: ChainStatus,
    },
    /// A deferred task failed with a benign teardown error after the
    /// response was finalised; the error was dropped.
    PostCompletionErrorSwallowed {
        /// The swallowed error's message.
        message: String,
    },
}

impl Diagnostic {
    /// Returns a stable machine-readable code for this diagnostic.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NextAfterAbort { .. } => "next_after_abort",
            Self::NextAfterCompletion { .. } => "next_after_completion",
            Self::DoneAfterAbort { .. } => "done_after_abort",
            Self::DoneAfterCompletion { .. } => "done_after_completion",
            Self::SkippedNonCallable { .. } => "skipped_non_callable",
            Self::ImplicitDoneSkipped { .. } => "implicit_done_skipped",
            Self::PostCompletionErrorSwallowed { .. } => "post_completion_error_swallowed",
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NextAfterAbort { chain } => write!(
                f,
                "{chain} chain was aborted; calling runtime.next() at this point is a noop"
            ),
            Self::NextAfterCompletion { chain } => write!(
                f,
                "{chain} chain already finished executing; calling runtime.next() at this point is a noop"
            ),
            Self::DoneAfterAbort { chain } => write!(
                f,
                "{chain} chain already aborted; calling runtime.done() at this point is a noop"
            ),
            Self::DoneAfterCompletion { chain } => write!(
                f,
                "{chain} chain already finished executing; calling runtime.done() at this point is a noop"
            ),
            Self::SkippedNonCallable {
                chain,
                index,
                description,
            } => write!(
                f,
                "skipping execution of non-function item in chain ({chain} chain, index {index}: {description})"
            ),
            Self::ImplicitDoneSkipped { chain, status } => {
                let state = match status {
                    ChainStatus::Aborted => "aborted",
                    ChainStatus::Exhausted | ChainStatus::Running => "finished executing",
                };
                write!(
                    f,
                    "skipped calling runtime.done on response end: {chain} chain already {state}"
                )
            }
            Self::PostCompletionErrorSwallowed { message } => write!(
                f,
                "ignored error raised after the response was finalized: {message}"
            ),
        }
    }
}

/// Receives runtime diagnostics.
pub trait DiagnosticSink: Send + Sync + 'static {
    /// Records one diagnostic.
    fn emit(&self, diagnostic: &Diagnostic);
}

/// Logs diagnostics as `tracing` warnings.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn emit(&self, diagnostic: &Diagnostic) {
        tracing::warn!(diagnostic = diagnostic.code(), "{diagnostic}");
    }
}
