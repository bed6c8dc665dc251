//! Index and range newtypes for arena-allocated IR.
//!
//! Bound-IR ids (`ExprId`, `StmtId`) and machine-IR ids (`MachExprId`,
//! `MachStmtId`, `SlotId`) live in separate index spaces so a lowered
//! reference can never be confused with a source reference.

/// Defines a `u32` index newtype with an `INVALID` sentinel.
macro_rules! define_id {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => { $(
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Sentinel value meaning "absent".
            pub const INVALID: Self = Self(u32::MAX);

            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }

            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }

            #[inline]
            pub const fn is_valid(self) -> bool {
                self.0 != u32::MAX
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::INVALID
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                if self.is_valid() {
                    write!(f, "{}({})", stringify!($name), self.0)
                } else {
                    write!(f, "{}::INVALID", stringify!($name))
                }
            }
        }
    )* };
}

/// Defines a `start + len` range into one of an arena's list tables.
macro_rules! define_range {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => { $(
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
        #[repr(C)]
        pub struct $name {
            pub start: u32,
            pub len: u16,
        }

        impl $name {
            pub const EMPTY: Self = Self { start: 0, len: 0 };

            #[inline]
            pub const fn new(start: u32, len: u16) -> Self {
                Self { start, len }
            }

            #[inline]
            pub const fn is_empty(&self) -> bool {
                self.len == 0
            }

            #[inline]
            pub const fn len(&self) -> usize {
                self.len as usize
            }

            #[inline]
            pub(crate) fn to_range(self) -> ::std::ops::Range<usize> {
                let start = self.start as usize;
                start..start + self.len as usize
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                write!(f, "{}({}..{})", stringify!($name), self.start, self.start + u32::from(self.len))
            }
        }
    )* };
}

define_id!(
    /// Index of an expression in an [`ExprArena`](crate::ExprArena).
    ExprId,
    /// Index of a statement in an [`ExprArena`](crate::ExprArena).
    StmtId,
    /// Binder-resolved local variable of one procedure.
    LocalId,
    /// Index of an expression in a [`MachArena`](crate::machine::MachArena).
    MachExprId,
    /// Index of a statement in a [`MachArena`](crate::machine::MachArena).
    MachStmtId,
    /// Persistent per-instance storage slot of one state machine.
    SlotId,
);

define_range!(
    /// Expression list in an [`ExprArena`](crate::ExprArena).
    ExprRange,
    /// Statement list in an [`ExprArena`](crate::ExprArena).
    StmtRange,
    /// Expression list in a [`MachArena`](crate::machine::MachArena).
    MachExprRange,
    /// Statement list in a [`MachArena`](crate::machine::MachArena).
    MachStmtRange,
);
