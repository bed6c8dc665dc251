//! Diagnostic sinks.
//!
//! The lowering pass reports through the [`DiagnosticSink`] trait and never
//! aborts on a reported error. [`DiagnosticQueue`] is the collecting sink:
//! it enforces an error limit, drops exact repeats, and hands back the
//! diagnostics in report order.

use rustc_hash::FxHashSet;

use cadence_ir::Span;

use crate::{Diagnostic, ErrorCode, ErrorGuaranteed};

/// Receiver of diagnostics.
pub trait DiagnosticSink {
    /// Report one diagnostic. Returns `false` if the sink filtered it.
    fn report(&mut self, diagnostic: Diagnostic) -> bool;

    /// Report an error and get proof that it was reported.
    fn emit_error(&mut self, diagnostic: Diagnostic) -> ErrorGuaranteed {
        self.report(diagnostic);
        ErrorGuaranteed::new()
    }
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) -> bool {
        self.push(diagnostic);
        true
    }
}

/// Configuration for diagnostic processing.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DiagnosticConfig {
    /// Maximum number of errors kept (0 = unlimited).
    pub error_limit: usize,
    /// Drop a diagnostic identical in code, span and message to an
    /// earlier one.
    pub deduplicate: bool,
}

impl Default for DiagnosticConfig {
    fn default() -> Self {
        DiagnosticConfig {
            error_limit: 20,
            deduplicate: true,
        }
    }
}

impl DiagnosticConfig {
    /// No limit, no deduplication (for testing).
    pub fn unlimited() -> Self {
        DiagnosticConfig {
            error_limit: 0,
            deduplicate: false,
        }
    }
}

/// Collecting sink.
///
/// # Example
///
/// ```text
/// let mut queue = DiagnosticQueue::new();
/// let module = lower_module(&procs, &arena, &interner, &options, &mut queue);
/// for diagnostic in queue.flush() { ... }
/// ```
#[derive(Clone, Debug, Default)]
pub struct DiagnosticQueue {
    diagnostics: Vec<Diagnostic>,
    /// (code, primary span, message) of every kept error.
    seen: FxHashSet<(ErrorCode, Option<Span>, String)>,
    error_count: usize,
    /// Errors dropped because the limit was reached.
    suppressed: usize,
    config: DiagnosticConfig,
}

impl DiagnosticQueue {
    /// Create a queue with the default configuration.
    pub fn new() -> Self {
        Self::with_config(DiagnosticConfig::default())
    }

    pub fn with_config(config: DiagnosticConfig) -> Self {
        DiagnosticQueue {
            diagnostics: Vec::new(),
            seen: FxHashSet::default(),
            error_count: 0,
            suppressed: 0,
            config,
        }
    }

    /// Check if the error limit has been reached.
    pub fn limit_reached(&self) -> bool {
        self.config.error_limit > 0 && self.error_count >= self.config.error_limit
    }

    /// Number of errors kept.
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Proof of errors, if any were kept.
    pub fn has_errors(&self) -> Option<ErrorGuaranteed> {
        ErrorGuaranteed::from_error_count(self.error_count)
    }

    /// Diagnostics without clearing the queue.
    pub fn peek(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Take every diagnostic in report order and reset the queue.
    ///
    /// If errors were dropped by the limit, a closing "too many errors"
    /// diagnostic is appended.
    pub fn flush(&mut self) -> Vec<Diagnostic> {
        let mut result = std::mem::take(&mut self.diagnostics);
        if self.suppressed > 0 {
            result.push(too_many_errors(self.config.error_limit, self.suppressed));
        }
        self.seen.clear();
        self.error_count = 0;
        self.suppressed = 0;
        result
    }

    fn is_duplicate(&self, diagnostic: &Diagnostic) -> bool {
        self.seen.contains(&Self::key(diagnostic))
    }

    fn key(diagnostic: &Diagnostic) -> (ErrorCode, Option<Span>, String) {
        (
            diagnostic.code,
            diagnostic.primary_span(),
            diagnostic.message.clone(),
        )
    }
}

impl DiagnosticSink for DiagnosticQueue {
    fn report(&mut self, diagnostic: Diagnostic) -> bool {
        let is_error = diagnostic.is_error();

        if is_error && self.limit_reached() {
            self.suppressed += 1;
            return false;
        }

        if self.config.deduplicate && is_error {
            if self.is_duplicate(&diagnostic) {
                return false;
            }
            self.seen.insert(Self::key(&diagnostic));
        }

        if is_error {
            self.error_count += 1;
        }
        self.diagnostics.push(diagnostic);
        true
    }
}

/// Create a "too many errors" diagnostic.
#[cold]
pub fn too_many_errors(limit: usize, suppressed: usize) -> Diagnostic {
    Diagnostic::error(ErrorCode::E9002)
        .with_message(format!("stopped after {limit} errors"))
        .with_note(format!("{suppressed} further error(s) were not reported"))
        .with_suggestion("raise `DiagnosticConfig::error_limit` to see them")
}

#[cfg(test)]
mod tests;
