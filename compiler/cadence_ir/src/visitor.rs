//! Bound-IR visitor.
//!
//! A single [`Visitor`] trait with `walk_*` functions that traverse
//! children in evaluation order. Override `visit_*` methods to observe
//! specific nodes; call the matching `walk_*` to keep descending.
//!
//! Evaluation order matters to the lowering analyses:
//! - `Let`: the declared local is visited before the initializer.
//! - `Assign`: the value is walked before the target place.
//! - `Lambda`: the body is walked in place (closure bodies are part of
//!   the enclosing body for reference purposes).

use cadence_stack::ensure_sufficient_stack;

use crate::ast::{Expr, ExprKind, Place, Stmt, StmtKind};
use crate::{ExprArena, ExprId, LocalId, StmtId, StmtRange};

/// Bound-IR visitor trait.
pub trait Visitor<'ast> {
    fn visit_stmt_list(&mut self, range: StmtRange, arena: &'ast ExprArena) {
        walk_stmt_list(self, range, arena);
    }

    fn visit_stmt_id(&mut self, id: StmtId, arena: &'ast ExprArena) {
        self.visit_stmt(id, arena.stmt(id), arena);
    }

    fn visit_stmt(&mut self, id: StmtId, stmt: &'ast Stmt, arena: &'ast ExprArena) {
        walk_stmt(self, id, stmt, arena);
    }

    fn visit_expr_id(&mut self, id: ExprId, arena: &'ast ExprArena) {
        self.visit_expr(id, arena.expr(id), arena);
    }

    fn visit_expr(&mut self, id: ExprId, expr: &'ast Expr, arena: &'ast ExprArena) {
        walk_expr(self, id, expr, arena);
    }

    /// A `let` introduced `local` at `stmt`.
    fn visit_declaration(&mut self, local: LocalId, stmt: &'ast Stmt) {
        let _ = (local, stmt);
    }

    /// An assignment wrote to `place` at `stmt`.
    fn visit_place(&mut self, place: Place, stmt: &'ast Stmt) {
        let _ = (place, stmt);
    }
}

pub fn walk_stmt_list<'ast, V: Visitor<'ast> + ?Sized>(
    visitor: &mut V,
    range: StmtRange,
    arena: &'ast ExprArena,
) {
    for &id in arena.stmt_list(range) {
        visitor.visit_stmt_id(id, arena);
    }
}

pub fn walk_stmt<'ast, V: Visitor<'ast> + ?Sized>(
    visitor: &mut V,
    _id: StmtId,
    stmt: &'ast Stmt,
    arena: &'ast ExprArena,
) {
    match &stmt.kind {
        StmtKind::Expr(expr) | StmtKind::YieldReturn(expr) => visitor.visit_expr_id(*expr, arena),
        StmtKind::Let { local, init } => {
            visitor.visit_declaration(*local, stmt);
            if init.is_valid() {
                visitor.visit_expr_id(*init, arena);
            }
        }
        StmtKind::Assign { target, value } => {
            visitor.visit_expr_id(*value, arena);
            visitor.visit_place(*target, stmt);
        }
        StmtKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            visitor.visit_expr_id(*cond, arena);
            visitor.visit_stmt_list(*then_branch, arena);
            visitor.visit_stmt_list(*else_branch, arena);
        }
        StmtKind::While { cond, body } => {
            visitor.visit_expr_id(*cond, arena);
            visitor.visit_stmt_list(*body, arena);
        }
        StmtKind::Return(value) => {
            if value.is_valid() {
                visitor.visit_expr_id(*value, arena);
            }
        }
        StmtKind::Break | StmtKind::Continue | StmtKind::Goto(_) | StmtKind::Label(_) => {}
    }
}

pub fn walk_expr<'ast, V: Visitor<'ast> + ?Sized>(
    visitor: &mut V,
    _id: ExprId,
    expr: &'ast Expr,
    arena: &'ast ExprArena,
) {
    ensure_sufficient_stack(|| match &expr.kind {
        ExprKind::Int(_)
        | ExprKind::Float(_)
        | ExprKind::Bool(_)
        | ExprKind::Str(_)
        | ExprKind::Unit
        | ExprKind::Local(_)
        | ExprKind::Param(_)
        | ExprKind::Field(_)
        | ExprKind::Error => {}
        ExprKind::Binary { left, right, .. } => {
            visitor.visit_expr_id(*left, arena);
            visitor.visit_expr_id(*right, arena);
        }
        ExprKind::Unary { operand, .. } | ExprKind::Suspend(operand) => {
            visitor.visit_expr_id(*operand, arena);
        }
        ExprKind::Call { args, .. } => {
            for &arg in arena.expr_list(*args) {
                visitor.visit_expr_id(arg, arena);
            }
        }
        ExprKind::Lambda { body } => visitor.visit_stmt_list(*body, arena),
    });
}
