//! Bound statements.

use crate::{ExprId, LocalId, Name, Span, StmtRange};

/// Statement node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Stmt { kind, span }
    }
}

/// Statement kinds.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum StmtKind {
    /// Expression evaluated for its effect.
    Expr(ExprId),

    /// Local declaration. `init` is `ExprId::INVALID` when absent.
    Let { local: LocalId, init: ExprId },

    /// Assignment to a place.
    Assign { target: Place, value: ExprId },

    If {
        cond: ExprId,
        then_branch: StmtRange,
        else_branch: StmtRange,
    },

    While { cond: ExprId, body: StmtRange },

    Break,
    Continue,

    /// `return` with an optional value (`ExprId::INVALID` when absent).
    Return(ExprId),

    /// Unstructured jump to a label.
    Goto(Name),
    /// Jump target.
    Label(Name),

    /// Generator-style `yield return <value>`.
    YieldReturn(ExprId),
}

/// Assignable location.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Place {
    Local(LocalId),
    Param(u32),
    Field(Name),
}
