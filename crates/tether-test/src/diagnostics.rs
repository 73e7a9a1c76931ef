//! Diagnostic recording.

use parking_lot::Mutex;
use tether_middleware::{Diagnostic, DiagnosticSink};

/// A [`DiagnosticSink`] that keeps every diagnostic for assertions.
#[derive(Debug, Default)]
pub struct RecordingDiagnostics {
    seen: Mutex<Vec<Diagnostic>>,
}

impl RecordingDiagnostics {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of everything recorded so far.
    pub fn all(&self) -> Vec<Diagnostic> {
        self.seen.lock().clone()
    }

    /// Removes and returns everything recorded so far.
    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.seen.lock())
    }

    /// Returns the stable codes of everything recorded so far.
    pub fn codes(&self) -> Vec<&'static str> {
        self.seen.lock().iter().map(Diagnostic::code).collect()
    }

    /// Returns how many diagnostics with `code` were recorded.
    pub fn count(&self, code: &str) -> usize {
        self.seen
            .lock()
            .iter()
            .filter(|diagnostic| diagnostic.code() == code)
            .count()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}

impl DiagnosticSink for RecordingDiagnostics {
    fn emit(&self, diagnostic: &Diagnostic) {
        self.seen.lock().push(diagnostic.clone());
    }
}
