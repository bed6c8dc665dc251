//! Bound expressions.
//!
//! Every identifier is already resolved by the binder: locals to
//! [`LocalId`], parameters to their position, calls to a [`CallTarget`].
//! Every node also carries its static type.

use crate::{ExprId, ExprRange, LocalId, Name, Span, StmtRange, Ty};

/// Expression node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Ty,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Ty, span: Span) -> Self {
        Expr { kind, ty, span }
    }
}

/// Expression kinds.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExprKind {
    Int(i64),
    /// Float literal stored as bits for `Eq`/`Hash`.
    Float(u64),
    Bool(bool),
    Str(Name),
    Unit,

    /// Read of a procedure-local variable.
    Local(LocalId),
    /// Read of the procedure's parameter at this position.
    Param(u32),
    /// Read of a field of the owning instance.
    Field(Name),

    Binary {
        op: BinaryOp,
        left: ExprId,
        right: ExprId,
    },
    Unary {
        op: UnaryOp,
        operand: ExprId,
    },
    Call {
        target: CallTarget,
        args: ExprRange,
    },

    /// Anonymous sub-procedure. Its body is a nested statement list.
    Lambda { body: StmtRange },

    /// `suspend <operand>`: pause here, resume when the operand completes.
    Suspend(ExprId),

    /// Placeholder left by the front end after a reported error.
    Error,
}

/// Binary operators.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

/// Unary operators.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Resolved identity of a call's callee.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CallTarget {
    /// A built-in scheduling primitive.
    Primitive(Primitive),
    /// Another procedure of the same owning type.
    Procedure(Name),
    /// A host-provided function (logging, engine API, ...).
    Host(Name),
}

/// Built-in scheduling primitives, identified by the binder's resolution
/// rather than by spelling.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Primitive {
    /// `Delay(seconds)`
    Delay,
    /// `DelayFrames(count)`
    DelayFrames,
    /// `Yield()`: resume on the next frame.
    Yield,
    /// `WhenAll(a, b, ...)`
    WhenAll,
    /// `WhenAny(a, b, ...)`
    WhenAny,
}

impl Primitive {
    /// Source-level spelling, for diagnostics.
    pub fn as_str(self) -> &'static str {
        match self {
            Primitive::Delay => "Delay",
            Primitive::DelayFrames => "DelayFrames",
            Primitive::Yield => "Yield",
            Primitive::WhenAll => "WhenAll",
            Primitive::WhenAny => "WhenAny",
        }
    }
}
