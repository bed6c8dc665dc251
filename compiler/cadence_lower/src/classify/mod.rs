//! Suspension classification.
//!
//! Maps each `suspend E` operand to a [`SuspensionKind`]. Scheduling
//! primitives are recognized by the binder's resolved [`Primitive`]
//! identity, never by spelling. Any other operand whose static type is
//! `Deferred<T>` is a delegation to another async procedure. Anything else
//! is an error; there is no silent fallback.

use smallvec::SmallVec;

use cadence_ir::{
    AsyncProcedure, CallTarget, ExprArena, ExprId, ExprKind, LocalId, Place, Primitive, ProcBody,
    Span, StmtId, StmtKind, StringInterner, Ty,
};

use crate::validate::statement_suspend;
use crate::LowerProblem;

/// Classified shape of one suspension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SuspensionKind {
    /// `Delay(duration)`
    TimedDelay { duration: ExprId },
    /// `DelayFrames(frames)`
    FrameDelay { frames: ExprId },
    /// `Yield()`
    YieldOneStep,
    /// `WhenAll(a, b, ...)`
    JoinAll { operands: SmallVec<[ExprId; 4]> },
    /// `WhenAny(a, b, ...)`
    JoinAny { operands: SmallVec<[ExprId; 4]> },
    /// Any other deferred result.
    DelegateToProcedure { operand: ExprId },
}

impl SuspensionKind {
    /// Completion is signalled by other tasks rather than by time.
    pub fn awaits_tasks(&self) -> bool {
        matches!(
            self,
            SuspensionKind::JoinAll { .. }
                | SuspensionKind::JoinAny { .. }
                | SuspensionKind::DelegateToProcedure { .. }
        )
    }

    /// Number of task handles held while waiting.
    pub fn task_count(&self) -> usize {
        match self {
            SuspensionKind::JoinAll { operands } | SuspensionKind::JoinAny { operands } => {
                operands.len()
            }
            SuspensionKind::DelegateToProcedure { .. } => 1,
            SuspensionKind::TimedDelay { .. }
            | SuspensionKind::FrameDelay { .. }
            | SuspensionKind::YieldOneStep => 0,
        }
    }

    /// Operands whose tasks are awaited, in slot order.
    pub fn awaited_operands(&self) -> &[ExprId] {
        match self {
            SuspensionKind::JoinAll { operands } | SuspensionKind::JoinAny { operands } => {
                operands.as_slice()
            }
            SuspensionKind::DelegateToProcedure { operand } => std::slice::from_ref(operand),
            SuspensionKind::TimedDelay { .. }
            | SuspensionKind::FrameDelay { .. }
            | SuspensionKind::YieldOneStep => &[],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SuspensionKind::TimedDelay { .. } => "TimedDelay",
            SuspensionKind::FrameDelay { .. } => "FrameDelay",
            SuspensionKind::YieldOneStep => "YieldOneStep",
            SuspensionKind::JoinAll { .. } => "JoinAll",
            SuspensionKind::JoinAny { .. } => "JoinAny",
            SuspensionKind::DelegateToProcedure { .. } => "DelegateToProcedure",
        }
    }
}

/// Where a suspension's completion value goes on resume.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Delivery {
    pub target: Place,
    /// `let x = suspend E;` (as opposed to `x = suspend E;`).
    pub declares: bool,
}

impl Delivery {
    pub fn local(&self) -> Option<LocalId> {
        match self.target {
            Place::Local(local) => Some(local),
            Place::Param(_) | Place::Field(_) => None,
        }
    }
}

/// One classified suspension point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SuspensionPoint {
    /// Zero-based, in body order.
    pub index: u32,
    pub kind: SuspensionKind,
    /// Completion produces a value (`Deferred<T>` with `T != void`).
    pub carries_value: bool,
    /// Type of the completion value (`Unit` when none).
    pub value_ty: Ty,
    /// Top-level statement that closes the segment.
    pub stmt: StmtId,
    /// Position of `stmt` in the top-level statement list.
    pub position: usize,
    /// The `suspend` expression itself.
    pub suspend: ExprId,
    pub span: Span,
    pub delivery: Option<Delivery>,
}

/// Classify a single `suspend` operand.
///
/// Returns the kind and whether completion carries a value.
pub fn classify_suspension(
    operand: ExprId,
    arena: &ExprArena,
    interner: &StringInterner,
) -> Result<(SuspensionKind, bool), Vec<LowerProblem>> {
    let expr = arena.expr(operand);
    let carries_value = expr
        .ty
        .deferred_output()
        .is_some_and(|output| *output != Ty::Unit);

    if let ExprKind::Call {
        target: CallTarget::Primitive(primitive),
        args,
    } = expr.kind
    {
        let args = arena.expr_list(args);
        let kind = classify_primitive(primitive, args, expr.span, arena, interner)?;
        // Timers complete with nothing to deliver, whatever the binder's type says.
        let carries_value = carries_value && kind.awaits_tasks();
        return Ok((kind, carries_value));
    }

    if expr.ty.is_deferred() {
        return Ok((
            SuspensionKind::DelegateToProcedure { operand },
            carries_value,
        ));
    }

    Err(vec![LowerProblem::UnrecognizedSuspension {
        span: expr.span,
        ty: expr.ty.display(interner).to_string(),
    }])
}

fn classify_primitive(
    primitive: Primitive,
    args: &[ExprId],
    span: Span,
    arena: &ExprArena,
    interner: &StringInterner,
) -> Result<SuspensionKind, Vec<LowerProblem>> {
    let arity = |expected: &'static str| LowerProblem::PrimitiveArity {
        primitive,
        expected,
        found: args.len(),
        span,
    };

    match primitive {
        Primitive::Delay | Primitive::DelayFrames => {
            let &[timing] = args else {
                return Err(vec![arity("1")]);
            };
            let timing_expr = arena.expr(timing);
            let accepted = match primitive {
                Primitive::DelayFrames => timing_expr.ty == Ty::Int,
                _ => timing_expr.ty.is_numeric(),
            };
            if !accepted {
                return Err(vec![LowerProblem::NonNumericTiming {
                    primitive,
                    found: timing_expr.ty.display(interner).to_string(),
                    span: timing_expr.span,
                }]);
            }
            Ok(if primitive == Primitive::Delay {
                SuspensionKind::TimedDelay { duration: timing }
            } else {
                SuspensionKind::FrameDelay { frames: timing }
            })
        }
        Primitive::Yield => {
            if args.is_empty() {
                Ok(SuspensionKind::YieldOneStep)
            } else {
                Err(vec![arity("0")])
            }
        }
        Primitive::WhenAll | Primitive::WhenAny => {
            if args.is_empty() {
                return Err(vec![arity("at least 1")]);
            }
            let problems: Vec<_> = args
                .iter()
                .map(|&arg| arena.expr(arg))
                .filter(|arg| !arg.ty.is_deferred())
                .map(|arg| LowerProblem::NonDeferredJoinOperand {
                    primitive,
                    found: arg.ty.display(interner).to_string(),
                    span: arg.span,
                })
                .collect();
            if !problems.is_empty() {
                return Err(problems);
            }
            let operands = args.iter().copied().collect();
            Ok(if primitive == Primitive::WhenAll {
                SuspensionKind::JoinAll { operands }
            } else {
                SuspensionKind::JoinAny { operands }
            })
        }
    }
}

/// Find and classify every suspension point of a validated body.
pub fn collect_suspension_points(
    proc: &AsyncProcedure,
    arena: &ExprArena,
    interner: &StringInterner,
) -> Result<Vec<SuspensionPoint>, Vec<LowerProblem>> {
    let ProcBody::Block(body) = proc.body else {
        return Ok(Vec::new());
    };

    let mut points = Vec::new();
    let mut problems = Vec::new();

    for (position, &stmt_id) in arena.stmt_list(body).iter().enumerate() {
        let stmt = arena.stmt(stmt_id);
        let Some(suspend) = statement_suspend(stmt, arena) else {
            continue;
        };
        let ExprKind::Suspend(operand) = arena.expr(suspend).kind else {
            continue;
        };

        let delivery = match stmt.kind {
            StmtKind::Let { local, .. } => Some(Delivery {
                target: Place::Local(local),
                declares: true,
            }),
            StmtKind::Assign { target, .. } => Some(Delivery {
                target,
                declares: false,
            }),
            _ => None,
        };

        match classify_suspension(operand, arena, interner) {
            Ok((kind, carries_value)) => {
                if let (Some(delivery), false) = (delivery, carries_value) {
                    problems.push(LowerProblem::ValuelessDelivery {
                        target: place_name(delivery.target, proc, interner),
                        span: stmt.span,
                    });
                    continue;
                }
                let value_ty = if carries_value {
                    arena
                        .expr(operand)
                        .ty
                        .deferred_output()
                        .cloned()
                        .unwrap_or(Ty::Unit)
                } else {
                    Ty::Unit
                };
                tracing::trace!(
                    index = points.len(),
                    kind = kind.name(),
                    carries_value,
                    "classified suspension point"
                );
                points.push(SuspensionPoint {
                    index: crate::to_u32(points.len()),
                    kind,
                    carries_value,
                    value_ty,
                    stmt: stmt_id,
                    position,
                    suspend,
                    span: arena.expr(suspend).span,
                    delivery,
                });
            }
            Err(mut found) => problems.append(&mut found),
        }
    }

    tracing::debug!(
        procedure = interner.lookup(proc.name),
        points = points.len(),
        problems = problems.len(),
        "classified suspension points"
    );

    if problems.is_empty() {
        Ok(points)
    } else {
        Err(problems)
    }
}

/// Source-level name of a place, for diagnostics.
pub(crate) fn place_name(place: Place, proc: &AsyncProcedure, interner: &StringInterner) -> String {
    let name = match place {
        Place::Local(local) => proc.local(local).map(|decl| decl.name),
        Place::Param(index) => proc.param(index).map(|param| param.name),
        Place::Field(name) => Some(name),
    };
    name.map_or_else(|| "<unknown>".to_owned(), |n| interner.lookup(n).to_owned())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
