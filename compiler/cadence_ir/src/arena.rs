//! Flat storage for bound expressions and statements.

use crate::ast::{Expr, Stmt};
use crate::{ExprId, ExprRange, StmtId, StmtRange};

/// Arena holding every expression and statement of one or more bound
/// procedures.
///
/// Children are referenced by [`ExprId`]/[`StmtId`]; lists (call arguments,
/// statement blocks) by ranges into the side tables `expr_lists` and
/// `stmt_lists`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExprArena {
    exprs: Vec<Expr>,
    stmts: Vec<Stmt>,
    expr_lists: Vec<ExprId>,
    stmt_lists: Vec<StmtId>,
}

impl ExprArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an expression and return its id.
    pub fn alloc_expr(&mut self, expr: Expr) -> ExprId {
        let id = ExprId::new(to_u32(self.exprs.len(), "expression"));
        self.exprs.push(expr);
        id
    }

    /// Allocate a statement and return its id.
    pub fn alloc_stmt(&mut self, stmt: Stmt) -> StmtId {
        let id = StmtId::new(to_u32(self.stmts.len(), "statement"));
        self.stmts.push(stmt);
        id
    }

    /// Store a list of expression ids contiguously.
    pub fn alloc_expr_list(&mut self, ids: impl IntoIterator<Item = ExprId>) -> ExprRange {
        let start = to_u32(self.expr_lists.len(), "expression list");
        self.expr_lists.extend(ids);
        let len = self.expr_lists.len() - start as usize;
        ExprRange::new(start, to_u16(len))
    }

    /// Store a list of statement ids contiguously.
    pub fn alloc_stmt_list(&mut self, ids: impl IntoIterator<Item = StmtId>) -> StmtRange {
        let start = to_u32(self.stmt_lists.len(), "statement list");
        self.stmt_lists.extend(ids);
        let len = self.stmt_lists.len() - start as usize;
        StmtRange::new(start, to_u16(len))
    }

    #[inline]
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    #[inline]
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    #[inline]
    pub fn expr_list(&self, range: ExprRange) -> &[ExprId] {
        &self.expr_lists[range.to_range()]
    }

    #[inline]
    pub fn stmt_list(&self, range: StmtRange) -> &[StmtId] {
        &self.stmt_lists[range.to_range()]
    }

    /// Number of allocated expressions.
    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }

    /// Number of allocated statements.
    pub fn stmt_count(&self) -> usize {
        self.stmts.len()
    }
}

pub(crate) fn to_u32(len: usize, what: &str) -> u32 {
    u32::try_from(len).unwrap_or_else(|_| panic!("{what} arena exceeded u32::MAX entries"))
}

pub(crate) fn to_u16(len: usize) -> u16 {
    u16::try_from(len).unwrap_or_else(|_| panic!("list of {len} entries exceeds u16::MAX"))
}
