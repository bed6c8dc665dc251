//! Cadence IR - intermediate representations for the async lowering pass.
//!
//! This crate contains:
//! - Spans for source locations
//! - Names for interned identifiers
//! - Resolved static types
//! - The bound procedure IR handed over by the front end
//! - The machine IR produced by lowering
//!
//! # Design Philosophy
//!
//! - **Intern Everything**: strings become `Name(u32)`
//! - **Flatten Everything**: no `Box<Expr>`, children are `ExprId(u32)`
//!   indices into an arena
//!
//! Floats are stored as u64 bits so every node is `Eq + Hash`.

/// Compile-time assertion that a type has a specific size.
#[macro_export]
macro_rules! static_assert_size {
    ($ty:ty, $size:expr) => {
        const _: [(); $size] = [(); ::std::mem::size_of::<$ty>()];
    };
}

mod arena;
pub mod ast;
pub mod builder;
mod ids;
mod interner;
pub mod machine;
mod name;
mod span;
mod ty;
pub mod visitor;

pub use arena::ExprArena;
pub use ast::{
    AsyncProcedure, BinaryOp, CallTarget, Expr, ExprKind, LocalDecl, Param, Place, Primitive,
    ProcBody, Stmt, StmtKind, UnaryOp,
};
pub use ids::{
    ExprId, ExprRange, LocalId, MachExprId, MachExprRange, MachStmtId, MachStmtRange, SlotId,
    StmtId, StmtRange,
};
pub use interner::{InternError, StringInterner};
pub use name::Name;
pub use span::Span;
pub use ty::{Ty, TyDisplay};
pub use visitor::Visitor;

#[cfg(target_pointer_width = "64")]
mod size_asserts {
    use super::{ExprId, ExprRange, Name};
    crate::static_assert_size!(ExprId, 4);
    crate::static_assert_size!(ExprRange, 8);
    crate::static_assert_size!(Name, 4);
}
