//! Structural validation of async procedure bodies.
//!
//! Segmentation assumes a straight-line top-level statement list where
//! every suspension is a whole statement. This pass rejects everything
//! else before any other analysis runs:
//!
//! - expression bodies
//! - `suspend` inside closures, `if`/`while`, or larger expressions
//! - `goto`/labels, and `break`/`continue` outside loops
//! - `return` that would skip a later suspension point
//! - generator `yield return` mixed with `suspend`
//! - a cancellation handle that is not a cancellation parameter
//!
//! All problems are collected; the caller decides what to report.

use cadence_ir::visitor::{walk_expr, walk_stmt, Visitor};
use cadence_ir::{
    AsyncProcedure, Expr, ExprArena, ExprId, ExprKind, ProcBody, Span, Stmt, StmtId, StmtKind,
    StringInterner, Ty,
};

use crate::LowerProblem;

/// Validate the shape of `proc`.
pub fn validate(
    proc: &AsyncProcedure,
    arena: &ExprArena,
    interner: &StringInterner,
) -> Result<(), Vec<LowerProblem>> {
    let mut problems = Vec::new();
    check_cancellation(proc, interner, &mut problems);

    let body = match proc.body {
        ProcBody::Block(body) => body,
        ProcBody::Expr(expr) => {
            problems.push(LowerProblem::ExpressionBody {
                span: arena.expr(expr).span,
            });
            return Err(problems);
        }
    };

    let mut scan = BodyScan::new(interner);
    for (position, &stmt_id) in arena.stmt_list(body).iter().enumerate() {
        scan.begin_statement(position, stmt_id, arena);
        scan.visit_stmt_id(stmt_id, arena);
        scan.end_statement();
    }
    scan.finish();
    problems.append(&mut scan.problems);

    tracing::debug!(
        procedure = interner.lookup(proc.name),
        problems = problems.len(),
        "validated async procedure"
    );

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}

fn check_cancellation(
    proc: &AsyncProcedure,
    interner: &StringInterner,
    problems: &mut Vec<LowerProblem>,
) {
    let Some(index) = proc.cancellation else {
        return;
    };
    match proc.param(index) {
        Some(param) if param.ty == Ty::Cancellation => {}
        Some(param) => problems.push(LowerProblem::InvalidCancellationParam {
            index,
            span: param.span,
            found: Some(param.ty.display(interner).to_string()),
        }),
        None => problems.push(LowerProblem::InvalidCancellationParam {
            index,
            span: proc.span,
            found: None,
        }),
    }
}

/// The one `suspend` a top-level statement may contain: the whole
/// expression of `suspend E;`, the initializer of `let x = suspend E;`,
/// or the value of `x = suspend E;`.
pub(crate) fn statement_suspend(stmt: &Stmt, arena: &ExprArena) -> Option<ExprId> {
    let candidate = match stmt.kind {
        StmtKind::Expr(expr) => expr,
        StmtKind::Let { init, .. } if init.is_valid() => init,
        StmtKind::Assign { value, .. } => value,
        _ => return None,
    };
    matches!(arena.expr(candidate).kind, ExprKind::Suspend(_)).then_some(candidate)
}

/// Walks one body, one top-level statement at a time.
struct BodyScan<'a> {
    interner: &'a StringInterner,
    problems: Vec<LowerProblem>,

    // Per top-level statement.
    position: usize,
    stmt_span: Span,
    sanctioned: Option<ExprId>,
    suspends_in_stmt: usize,
    misplaced: Vec<Span>,

    /// Enclosing `if`/`while` inside the current top-level statement.
    control: Vec<(&'static str, Span)>,
    /// Enclosing closures.
    closures: Vec<Span>,
    /// Loop depth per closure frame; the body itself is frame 0.
    loop_depth: Vec<u32>,

    first_suspend: Option<Span>,
    last_suspend: Option<(usize, Span)>,
    first_yield: Option<Span>,
    returns: Vec<(usize, Span)>,
}

impl<'a> BodyScan<'a> {
    fn new(interner: &'a StringInterner) -> Self {
        BodyScan {
            interner,
            problems: Vec::new(),
            position: 0,
            stmt_span: Span::DUMMY,
            sanctioned: None,
            suspends_in_stmt: 0,
            misplaced: Vec::new(),
            control: Vec::new(),
            closures: Vec::new(),
            loop_depth: vec![0],
            first_suspend: None,
            last_suspend: None,
            first_yield: None,
            returns: Vec::new(),
        }
    }

    fn begin_statement(&mut self, position: usize, id: StmtId, arena: &ExprArena) {
        let stmt = arena.stmt(id);
        self.position = position;
        self.stmt_span = stmt.span;
        self.sanctioned = statement_suspend(stmt, arena);
        self.suspends_in_stmt = 0;
        self.misplaced.clear();
    }

    fn end_statement(&mut self) {
        if self.suspends_in_stmt > 1 {
            self.problems.push(LowerProblem::MultipleSuspendsInStatement {
                stmt: self.stmt_span,
                count: self.suspends_in_stmt,
            });
        } else {
            for &suspend in &self.misplaced {
                self.problems
                    .push(LowerProblem::SuspendNotAtStatementLevel { suspend });
            }
        }
    }

    fn finish(&mut self) {
        if let Some((last_position, last_suspend)) = self.last_suspend {
            for &(position, ret) in &self.returns {
                if position < last_position {
                    self.problems.push(LowerProblem::ReturnBeforeLastSuspension {
                        ret,
                        last_suspend,
                    });
                }
            }
        }
        if let (Some(yield_span), Some(suspend)) = (self.first_yield, self.first_suspend) {
            self.problems.push(LowerProblem::GeneratorWithSuspend {
                yield_span,
                suspend,
            });
        }
    }

    fn in_closure(&self) -> bool {
        !self.closures.is_empty()
    }

    fn record_suspend(&mut self, id: ExprId, span: Span) {
        if let Some(&closure) = self.closures.last() {
            self.problems.push(LowerProblem::SuspendInClosure {
                suspend: span,
                closure,
            });
            return;
        }

        self.first_suspend.get_or_insert(span);
        self.last_suspend = Some((self.position, span));

        if let Some(&(construct, construct_span)) = self.control.first() {
            self.problems.push(LowerProblem::SuspendInControlFlow {
                suspend: span,
                construct,
                construct_span,
            });
            return;
        }

        self.suspends_in_stmt += 1;
        if self.sanctioned != Some(id) {
            self.misplaced.push(span);
        }
    }

    fn current_loop_depth(&mut self) -> &mut u32 {
        // Frame 0 is never popped.
        let last = self.loop_depth.len() - 1;
        &mut self.loop_depth[last]
    }
}

impl<'ast> Visitor<'ast> for BodyScan<'_> {
    fn visit_stmt(&mut self, id: StmtId, stmt: &'ast Stmt, arena: &'ast ExprArena) {
        match &stmt.kind {
            StmtKind::If { .. } => {
                self.control.push(("if", stmt.span));
                walk_stmt(self, id, stmt, arena);
                self.control.pop();
                return;
            }
            StmtKind::While { .. } => {
                self.control.push(("while", stmt.span));
                *self.current_loop_depth() += 1;
                walk_stmt(self, id, stmt, arena);
                *self.current_loop_depth() -= 1;
                self.control.pop();
                return;
            }
            StmtKind::Break | StmtKind::Continue => {
                if *self.current_loop_depth() == 0 {
                    let keyword = if matches!(stmt.kind, StmtKind::Break) {
                        "break"
                    } else {
                        "continue"
                    };
                    self.problems.push(LowerProblem::LoopControlOutsideLoop {
                        keyword,
                        span: stmt.span,
                    });
                }
            }
            StmtKind::Goto(label) | StmtKind::Label(label) => {
                let what = if matches!(stmt.kind, StmtKind::Goto(_)) {
                    "goto"
                } else {
                    "label"
                };
                self.problems.push(LowerProblem::UnstructuredJump {
                    what,
                    label: self.interner.lookup(*label).to_owned(),
                    span: stmt.span,
                });
            }
            StmtKind::Return(_) if !self.in_closure() => {
                self.returns.push((self.position, stmt.span));
            }
            StmtKind::YieldReturn(_) if !self.in_closure() => {
                self.first_yield.get_or_insert(stmt.span);
            }
            _ => {}
        }
        walk_stmt(self, id, stmt, arena);
    }

    fn visit_expr(&mut self, id: ExprId, expr: &'ast Expr, arena: &'ast ExprArena) {
        match expr.kind {
            ExprKind::Lambda { .. } => {
                self.closures.push(expr.span);
                self.loop_depth.push(0);
                walk_expr(self, id, expr, arena);
                self.loop_depth.pop();
                self.closures.pop();
                return;
            }
            ExprKind::Suspend(_) => self.record_suspend(id, expr.span),
            _ => {}
        }
        walk_expr(self, id, expr, arena);
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
