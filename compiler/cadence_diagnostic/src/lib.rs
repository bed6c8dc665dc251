//! Diagnostics for the lowering pass.
//!
//! Every rejection carries:
//! - an error code for searchability
//! - a message saying what went wrong
//! - a primary span saying where
//! - notes and a remediation hint saying how to fix it
//!
//! Diagnostics are handed to a [`DiagnosticSink`]. The lowering pass never
//! decides how they are rendered; [`DiagnosticQueue`] is the in-tree sink
//! used by tests and by drivers that want sorted, deduplicated output.
//!
//! # Error Guarantees
//!
//! [`ErrorGuaranteed`] is proof that at least one error was reported.
//!
//! ```text
//! let guarantee = queue.emit_error(diagnostic);
//! fn lower() -> Result<Artifact, ErrorGuaranteed> { ... }
//! ```

mod diagnostic;
mod error_code;
mod guarantee;
pub mod queue;

pub use diagnostic::{Diagnostic, Label, Severity};
pub use error_code::{ErrorCode, Phase};
pub use guarantee::ErrorGuaranteed;
pub use queue::{DiagnosticConfig, DiagnosticQueue, DiagnosticSink};
