//! Async procedure descriptor.

use crate::{ExprId, LocalId, Name, Span, StmtRange, Ty};

/// A formal parameter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Param {
    pub name: Name,
    pub ty: Ty,
    pub span: Span,
}

/// A local variable declared somewhere in the body.
///
/// `LocalDecl`s are stored in declaration order and indexed by their
/// [`LocalId`]; the binder guarantees `locals[id.index()].id == id`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LocalDecl {
    pub id: LocalId,
    pub name: Name,
    pub ty: Ty,
    pub span: Span,
}

/// Procedure body shape.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ProcBody {
    /// `{ stmt; stmt; ... }`
    Block(StmtRange),
    /// `=> expr`
    Expr(ExprId),
}

/// A bound procedure that contains (or may contain) suspension points.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AsyncProcedure {
    pub name: Name,
    pub params: Vec<Param>,
    pub locals: Vec<LocalDecl>,
    /// The `T` of the procedure's `Deferred<T>` result.
    pub result: Ty,
    /// Position of the cancellation-handle parameter, if any.
    pub cancellation: Option<u32>,
    pub body: ProcBody,
    pub span: Span,
}

impl AsyncProcedure {
    /// Does completion carry a value?
    pub fn returns_value(&self) -> bool {
        self.result != Ty::Unit
    }

    /// Does the procedure take a cancellation handle?
    pub fn accepts_cancellation(&self) -> bool {
        self.cancellation.is_some()
    }

    /// Declaration of a local.
    pub fn local(&self, id: LocalId) -> Option<&LocalDecl> {
        self.locals.get(id.index())
    }

    /// Declaration of a parameter.
    pub fn param(&self, index: u32) -> Option<&Param> {
        self.params.get(index as usize)
    }
}
