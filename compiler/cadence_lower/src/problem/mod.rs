//! Problems found while lowering one procedure.
//!
//! Every pass reports `Vec<LowerProblem>` instead of stopping at the first
//! issue. A problem only ever blocks the procedure it was found in; the
//! pipeline converts each one into a [`Diagnostic`] for the caller's sink.

use cadence_diagnostic::{Diagnostic, ErrorCode};
use cadence_ir::{Primitive, Span};

/// A reason a procedure cannot be lowered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LowerProblem {
    // Structural
    /// The body is a single expression, so there is nothing to segment.
    ExpressionBody { span: Span },
    /// `suspend` inside an anonymous procedure.
    SuspendInClosure { suspend: Span, closure: Span },
    /// `goto` or a label.
    UnstructuredJump { what: &'static str, label: String, span: Span },
    /// `break`/`continue` with no enclosing loop.
    LoopControlOutsideLoop { keyword: &'static str, span: Span },
    /// `return` that would skip a later suspension point.
    ReturnBeforeLastSuspension { ret: Span, last_suspend: Span },
    /// Generator `yield return` in a procedure that also suspends.
    GeneratorWithSuspend { yield_span: Span, suspend: Span },
    /// `suspend` inside an `if`/`while` body or condition.
    SuspendInControlFlow {
        suspend: Span,
        construct: &'static str,
        construct_span: Span,
    },
    /// `suspend` buried inside a larger expression.
    SuspendNotAtStatementLevel { suspend: Span },
    /// More than one `suspend` in one statement.
    MultipleSuspendsInStatement { stmt: Span, count: usize },
    /// The cancellation index names no parameter, or one of the wrong type.
    InvalidCancellationParam { index: u32, span: Span, found: Option<String> },

    // Classification
    /// The awaited operand is neither a scheduling primitive nor deferred.
    UnrecognizedSuspension { span: Span, ty: String },
    /// Wrong number of arguments to a scheduling primitive.
    PrimitiveArity {
        primitive: Primitive,
        expected: &'static str,
        found: usize,
        span: Span,
    },
    /// Timing argument of `Delay`/`DelayFrames` is not numeric.
    NonNumericTiming {
        primitive: Primitive,
        found: String,
        span: Span,
    },
    /// Operand of `WhenAll`/`WhenAny` is not a deferred result.
    NonDeferredJoinOperand {
        primitive: Primitive,
        found: String,
        span: Span,
    },
    /// Value taken from a suspension whose completion carries nothing.
    ValuelessDelivery { target: String, span: Span },

    // Storage
    /// A value that must persist across suspension has no persistent
    /// representation.
    UnpersistableSlot { name: String, ty: String, span: Span },

    /// Invariant violation inside the lowering pass itself.
    Internal { message: String, span: Span },
}

impl LowerProblem {
    /// Primary location.
    pub fn span(&self) -> Span {
        match self {
            LowerProblem::ExpressionBody { span }
            | LowerProblem::UnstructuredJump { span, .. }
            | LowerProblem::LoopControlOutsideLoop { span, .. }
            | LowerProblem::InvalidCancellationParam { span, .. }
            | LowerProblem::UnrecognizedSuspension { span, .. }
            | LowerProblem::PrimitiveArity { span, .. }
            | LowerProblem::NonNumericTiming { span, .. }
            | LowerProblem::NonDeferredJoinOperand { span, .. }
            | LowerProblem::ValuelessDelivery { span, .. }
            | LowerProblem::UnpersistableSlot { span, .. }
            | LowerProblem::Internal { span, .. } => *span,
            LowerProblem::SuspendInClosure { suspend, .. }
            | LowerProblem::SuspendInControlFlow { suspend, .. }
            | LowerProblem::SuspendNotAtStatementLevel { suspend } => *suspend,
            LowerProblem::ReturnBeforeLastSuspension { ret, .. } => *ret,
            LowerProblem::GeneratorWithSuspend { yield_span, .. } => *yield_span,
            LowerProblem::MultipleSuspendsInStatement { stmt, .. } => *stmt,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            LowerProblem::ExpressionBody { .. } => ErrorCode::E1001,
            LowerProblem::SuspendInClosure { .. } => ErrorCode::E1002,
            LowerProblem::UnstructuredJump { .. } => ErrorCode::E1003,
            LowerProblem::LoopControlOutsideLoop { .. } => ErrorCode::E1004,
            LowerProblem::ReturnBeforeLastSuspension { .. } => ErrorCode::E1005,
            LowerProblem::GeneratorWithSuspend { .. } => ErrorCode::E1006,
            LowerProblem::SuspendInControlFlow { .. } => ErrorCode::E1007,
            LowerProblem::SuspendNotAtStatementLevel { .. }
            | LowerProblem::MultipleSuspendsInStatement { .. } => ErrorCode::E1008,
            LowerProblem::InvalidCancellationParam { .. } => ErrorCode::E1009,
            LowerProblem::UnrecognizedSuspension { .. } => ErrorCode::E2001,
            LowerProblem::PrimitiveArity { .. } => ErrorCode::E2002,
            LowerProblem::NonNumericTiming { .. } => ErrorCode::E2003,
            LowerProblem::NonDeferredJoinOperand { .. } => ErrorCode::E2004,
            LowerProblem::ValuelessDelivery { .. } => ErrorCode::E2005,
            LowerProblem::UnpersistableSlot { .. } => ErrorCode::E3001,
            LowerProblem::Internal { .. } => ErrorCode::E9001,
        }
    }

    /// Render as a diagnostic for `procedure`.
    pub fn into_diagnostic(self, procedure: &str) -> Diagnostic {
        let code = self.code();
        let diag = Diagnostic::error(code);
        match self {
            LowerProblem::ExpressionBody { span } => diag
                .with_message(format!(
                    "async procedure `{procedure}` has an expression body"
                ))
                .with_label(span, "no statement list to split at suspension points")
                .with_suggestion("convert the body to a statement block"),

            LowerProblem::SuspendInClosure { suspend, closure } => diag
                .with_message("`suspend` inside a closure")
                .with_label(suspend, "suspends here")
                .with_secondary_label(closure, "inside this closure")
                .with_note("closures run outside the state machine and cannot be resumed")
                .with_suggestion("extract the suspending closure into a named procedure"),

            LowerProblem::UnstructuredJump { what, label, span } => diag
                .with_message(format!("`{what} {label}` in async procedure `{procedure}`"))
                .with_label(span, "unstructured jump")
                .with_note("jumps may cross segment boundaries")
                .with_suggestion("restructure with `if`/`while`"),

            LowerProblem::LoopControlOutsideLoop { keyword, span } => diag
                .with_message(format!("`{keyword}` outside of a loop"))
                .with_label(span, format!("cannot `{keyword}` here"))
                .with_suggestion(format!("move the `{keyword}` inside a `while` loop")),

            LowerProblem::ReturnBeforeLastSuspension { ret, last_suspend } => diag
                .with_message("`return` before the last suspension point")
                .with_label(ret, "returns here")
                .with_secondary_label(last_suspend, "but execution may still suspend here")
                .with_suggestion(
                    "move the early exit after the final `suspend` or split the procedure",
                ),

            LowerProblem::GeneratorWithSuspend {
                yield_span,
                suspend,
            } => diag
                .with_message(format!(
                    "`{procedure}` mixes generator `yield return` with `suspend`"
                ))
                .with_label(yield_span, "generator yield")
                .with_secondary_label(suspend, "suspension")
                .with_suggestion("split into two procedures"),

            LowerProblem::SuspendInControlFlow {
                suspend,
                construct,
                construct_span,
            } => diag
                .with_message(format!("`suspend` inside `{construct}`"))
                .with_label(suspend, "suspends here")
                .with_secondary_label(construct_span, format!("inside this `{construct}`"))
                .with_note("only top-level statements can end a segment")
                .with_suggestion("hoist the suspension to the top level of the body"),

            LowerProblem::SuspendNotAtStatementLevel { suspend } => diag
                .with_message("`suspend` must be a whole statement")
                .with_label(suspend, "nested inside a larger expression")
                .with_note(
                    "supported forms are `suspend E;`, `let x = suspend E;` and `x = suspend E;`",
                )
                .with_suggestion("bind the awaited value to a local first"),

            LowerProblem::MultipleSuspendsInStatement { stmt, count } => diag
                .with_message(format!("{count} suspension points in one statement"))
                .with_label(stmt, "this statement")
                .with_suggestion("bind the awaited value to a local first"),

            LowerProblem::InvalidCancellationParam { index, span, found } => {
                let diag = diag
                    .with_message(format!(
                        "cancellation handle of `{procedure}` is not a cancellation parameter"
                    ))
                    .with_label(span, format!("parameter #{index}"))
                    .with_suggestion("declare the handle parameter with the cancellation token type");
                match found {
                    Some(ty) => diag.with_note(format!("found type `{ty}`")),
                    None => diag.with_note("no parameter at that position"),
                }
            }

            LowerProblem::UnrecognizedSuspension { span, ty } => diag
                .with_message("cannot suspend on this expression")
                .with_label(span, format!("has type `{ty}`"))
                .with_note(
                    "expected a scheduling primitive or a call returning a deferred result",
                ),

            LowerProblem::PrimitiveArity {
                primitive,
                expected,
                found,
                span,
            } => diag
                .with_message(format!(
                    "`{}` takes {expected} argument(s) but {found} were supplied",
                    primitive.as_str()
                ))
                .with_label(span, "wrong number of arguments"),

            LowerProblem::NonNumericTiming {
                primitive,
                found,
                span,
            } => {
                let expected = match primitive {
                    Primitive::DelayFrames => "int",
                    _ => "int or float",
                };
                diag.with_message(format!(
                    "`{}` expects {expected}, found `{found}`",
                    primitive.as_str()
                ))
                .with_label(span, "timing argument")
            }

            LowerProblem::NonDeferredJoinOperand {
                primitive,
                found,
                span,
            } => diag
                .with_message(format!(
                    "`{}` operand is not a deferred result",
                    primitive.as_str()
                ))
                .with_label(span, format!("has type `{found}`")),

            LowerProblem::ValuelessDelivery { target, span } => diag
                .with_message(format!(
                    "cannot assign to `{target}`: this suspension produces no value"
                ))
                .with_label(span, "completes without a value"),

            LowerProblem::UnpersistableSlot { name, ty, span } => diag
                .with_message(format!(
                    "`{name}` must survive a suspension but `{ty}` cannot be stored per instance"
                ))
                .with_label(span, "declared here")
                .with_suggestion("copy the value into a storable type before suspending"),

            LowerProblem::Internal { message, span } => diag
                .with_message(format!("internal lowering error: {message}"))
                .with_label(span, "while lowering this"),
        }
    }
}
