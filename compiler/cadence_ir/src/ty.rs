//! Static types supplied by the binder.
//!
//! The lowering pass only needs enough type information to answer three
//! questions: is this a deferred result (and of what), is this a
//! cancellation handle, and can a value of this type live in per-instance
//! persistent storage.

use std::fmt;

use crate::{Name, StringInterner};

/// A resolved static type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Ty {
    Unit,
    Bool,
    Int,
    Float,
    Str,
    /// Reference to a host object (component, asset, ...).
    Object(Name),
    Array(Box<Ty>),
    /// Deferred result of an async procedure or scheduling primitive.
    Deferred(Box<Ty>),
    /// Cooperative cancellation handle.
    Cancellation,
    /// By-reference parameter. Has no persistent representation.
    ByRef(Box<Ty>),
    /// Anonymous procedure value.
    Closure,
    /// A binder-known type the host storage model cannot represent.
    Opaque(Name),
}

impl Ty {
    /// `Deferred<T>` shorthand.
    pub fn deferred(inner: Ty) -> Ty {
        Ty::Deferred(Box::new(inner))
    }

    /// `T[]` shorthand.
    pub fn array(elem: Ty) -> Ty {
        Ty::Array(Box::new(elem))
    }

    /// The `T` of `Deferred<T>`, if this is a deferred type.
    pub fn deferred_output(&self) -> Option<&Ty> {
        match self {
            Ty::Deferred(inner) => Some(inner),
            _ => None,
        }
    }

    /// Returns `true` for `Deferred<_>`.
    pub fn is_deferred(&self) -> bool {
        matches!(self, Ty::Deferred(_))
    }

    /// Returns `true` for `int` and `float`.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Ty::Int | Ty::Float)
    }

    /// Can a value of this type be stored in a persistent instance slot?
    pub fn is_persistable(&self) -> bool {
        match self {
            Ty::Unit
            | Ty::Bool
            | Ty::Int
            | Ty::Float
            | Ty::Str
            | Ty::Object(_)
            | Ty::Deferred(_)
            | Ty::Cancellation => true,
            Ty::Array(elem) => elem.is_persistable(),
            Ty::ByRef(_) | Ty::Closure | Ty::Opaque(_) => false,
        }
    }

    /// Render with names resolved through `interner`.
    pub fn display<'a>(&'a self, interner: &'a StringInterner) -> TyDisplay<'a> {
        TyDisplay { ty: self, interner }
    }
}

/// [`Ty`] paired with an interner for `Display`.
pub struct TyDisplay<'a> {
    ty: &'a Ty,
    interner: &'a StringInterner,
}

impl fmt::Display for TyDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ty {
            Ty::Unit => write!(f, "void"),
            Ty::Bool => write!(f, "bool"),
            Ty::Int => write!(f, "int"),
            Ty::Float => write!(f, "float"),
            Ty::Str => write!(f, "string"),
            Ty::Object(name) | Ty::Opaque(name) => write!(f, "{}", self.interner.lookup(*name)),
            Ty::Array(elem) => write!(f, "{}[]", elem.display(self.interner)),
            Ty::Deferred(inner) => write!(f, "Deferred<{}>", inner.display(self.interner)),
            Ty::Cancellation => write!(f, "CancellationToken"),
            Ty::ByRef(inner) => write!(f, "ref {}", inner.display(self.interner)),
            Ty::Closure => write!(f, "<closure>"),
        }
    }
}
