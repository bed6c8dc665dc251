//! Bound procedure IR.
//!
//! This is the shape the front end hands to the lowering pass: names and
//! types already resolved, expressions and statements flattened into an
//! [`ExprArena`](crate::ExprArena) and referenced by index.

mod expr;
mod procedure;
mod stmt;

pub use expr::{BinaryOp, CallTarget, Expr, ExprKind, Primitive, UnaryOp};
pub use procedure::{AsyncProcedure, LocalDecl, Param, ProcBody};
pub use stmt::{Place, Stmt, StmtKind};
