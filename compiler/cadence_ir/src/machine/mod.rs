//! Machine IR: the lowered, suspension-free form of an async procedure.
//!
//! The lowering pass turns one [`AsyncProcedure`](crate::AsyncProcedure)
//! into a [`StateMachineArtifact`]: a set of persistent slots plus two
//! ordinary procedures.
//!
//! - **entry**: resets the slots, copies parameters, runs the first step,
//!   and hands the caller a task handle.
//! - **dispatch**: the resume entry point. It switches on the state slot,
//!   runs one segment, and either schedules itself again or finishes.
//!
//! Nothing here suspends. Waiting is expressed by [`MachStmtKind::Schedule`]
//! followed by a plain return; the host calls dispatch back later.

use smallvec::SmallVec;

use crate::ast::{BinaryOp, CallTarget, LocalDecl, Param, UnaryOp};
use crate::{LocalId, MachExprId, MachExprRange, MachStmtId, MachStmtRange, Name, SlotId, Span, Ty};

// ── Slots ───────────────────────────────────────────────────────────

/// Why a persistent slot exists.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SlotRole {
    /// Index of the next segment to run.
    StateIndex,
    /// [`TaskStatus`] of the current activation.
    Status,
    /// Completion value, for procedures whose result is not `Unit`.
    Result,
    /// A parameter or local whose lifetime spans a suspension point.
    Hoisted(HoistOrigin),
    /// Handle of a deferred operation awaited at a suspension point.
    Awaited { point: u32, operand: u32 },
}

/// Where a hoisted slot's value came from.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HoistOrigin {
    Param(u32),
    Local(LocalId),
}

/// A per-instance storage slot added by lowering.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PersistentSlot {
    pub id: SlotId,
    /// Mangled, collision-free name.
    pub name: Name,
    pub ty: Ty,
    pub role: SlotRole,
}

/// Status values stored in the status slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(i64)]
pub enum TaskStatus {
    Running = 0,
    Succeeded = 1,
    Cancelled = 2,
}

impl TaskStatus {
    /// Value stored in the status slot.
    #[inline]
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(TaskStatus::Running),
            1 => Some(TaskStatus::Succeeded),
            2 => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }
}

// ── Scheduling ──────────────────────────────────────────────────────

/// How many awaited tasks must complete before resuming.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum JoinMode {
    All,
    Any,
}

/// Procedure the host should call back. The host resolves it to a
/// concrete resume handle when the artifact is loaded.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct DispatchTarget {
    pub procedure: Name,
}

/// When a scheduled resume fires.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Timing {
    /// After a (scaled) duration in seconds.
    Seconds(MachExprId),
    /// After this many frames.
    Frames(MachExprId),
    /// On the next frame.
    NextFrame,
    /// When the tasks held in these slots complete.
    Completion {
        tasks: SmallVec<[SlotId; 2]>,
        mode: JoinMode,
    },
}

// ── Expressions ─────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MachExpr {
    pub kind: MachExprKind,
    pub ty: Ty,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MachExprKind {
    Int(i64),
    Float(u64),
    Bool(bool),
    Str(Name),
    Unit,
    Local(LocalId),
    Param(u32),
    Field(Name),
    /// Read of a persistent slot.
    Slot(SlotId),
    Binary {
        op: BinaryOp,
        left: MachExprId,
        right: MachExprId,
    },
    Unary {
        op: UnaryOp,
        operand: MachExprId,
    },
    Call {
        target: CallTarget,
        args: MachExprRange,
    },
    Lambda {
        body: MachStmtRange,
    },
    /// Have the awaited tasks completed (all of them, or any one)?
    TasksDone {
        tasks: SmallVec<[SlotId; 2]>,
        mode: JoinMode,
    },
    /// Value delivered by completed tasks. `Any` yields the position of
    /// the first completed task; `All` over one task yields its result.
    TaskValue {
        tasks: SmallVec<[SlotId; 2]>,
        mode: JoinMode,
    },
    /// Has cancellation been requested on the handle in this slot?
    CancelRequested(SlotId),
    Error,
}

// ── Statements ──────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MachStmt {
    pub kind: MachStmtKind,
    pub span: Span,
}

/// Assignable location in lowered code.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MachPlace {
    Local(LocalId),
    Param(u32),
    Field(Name),
    Slot(SlotId),
}

/// One arm of a state switch.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SwitchArm {
    pub value: u32,
    pub body: MachStmtRange,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MachStmtKind {
    Expr(MachExprId),
    /// `init` is `MachExprId::INVALID` when absent.
    Let {
        local: LocalId,
        init: MachExprId,
    },
    Assign {
        target: MachPlace,
        value: MachExprId,
    },
    If {
        cond: MachExprId,
        then_branch: MachStmtRange,
        else_branch: MachStmtRange,
    },
    While {
        cond: MachExprId,
        body: MachStmtRange,
    },
    Break,
    Continue,
    /// Leave the current procedure (or closure). `MachExprId::INVALID`
    /// when there is no value.
    Return(MachExprId),
    /// `state <- value`
    SetState(u32),
    /// Ask the host to call `target` back according to `timing`.
    Schedule {
        target: DispatchTarget,
        timing: Timing,
    },
    /// Call `target` now.
    Invoke(DispatchTarget),
    /// Write the result (if any), set the final status, leave.
    Finish {
        status: TaskStatus,
        /// `MachExprId::INVALID` when there is no value.
        value: MachExprId,
    },
    /// Return the task handle observing this activation.
    ReturnTask,
    /// Run the arm whose value equals the slot; no arm matching is a no-op.
    Switch {
        scrutinee: SlotId,
        arms: Vec<SwitchArm>,
    },
}

// ── Arena ───────────────────────────────────────────────────────────

/// Flat storage for lowered expressions and statements.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MachArena {
    exprs: Vec<MachExpr>,
    stmts: Vec<MachStmt>,
    expr_lists: Vec<MachExprId>,
    stmt_lists: Vec<MachStmtId>,
}

impl MachArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_expr(&mut self, kind: MachExprKind, ty: Ty, span: Span) -> MachExprId {
        let id = MachExprId::new(crate::arena::to_u32(self.exprs.len(), "machine expression"));
        self.exprs.push(MachExpr { kind, ty, span });
        id
    }

    pub fn alloc_stmt(&mut self, kind: MachStmtKind, span: Span) -> MachStmtId {
        let id = MachStmtId::new(crate::arena::to_u32(self.stmts.len(), "machine statement"));
        self.stmts.push(MachStmt { kind, span });
        id
    }

    pub fn alloc_expr_list(&mut self, ids: impl IntoIterator<Item = MachExprId>) -> MachExprRange {
        let start = crate::arena::to_u32(self.expr_lists.len(), "machine expression list");
        self.expr_lists.extend(ids);
        let len = self.expr_lists.len() - start as usize;
        MachExprRange::new(start, crate::arena::to_u16(len))
    }

    pub fn alloc_stmt_list(&mut self, ids: impl IntoIterator<Item = MachStmtId>) -> MachStmtRange {
        let start = crate::arena::to_u32(self.stmt_lists.len(), "machine statement list");
        self.stmt_lists.extend(ids);
        let len = self.stmt_lists.len() - start as usize;
        MachStmtRange::new(start, crate::arena::to_u16(len))
    }

    #[inline]
    pub fn expr(&self, id: MachExprId) -> &MachExpr {
        &self.exprs[id.index()]
    }

    #[inline]
    pub fn stmt(&self, id: MachStmtId) -> &MachStmt {
        &self.stmts[id.index()]
    }

    #[inline]
    pub fn expr_list(&self, range: MachExprRange) -> &[MachExprId] {
        &self.expr_lists[range.to_range()]
    }

    #[inline]
    pub fn stmt_list(&self, range: MachStmtRange) -> &[MachStmtId] {
        &self.stmt_lists[range.to_range()]
    }

    pub fn stmt_count(&self) -> usize {
        self.stmts.len()
    }
}

// ── Artifact ────────────────────────────────────────────────────────

/// A generated, suspension-free procedure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MachProc {
    pub name: Name,
    pub body: MachStmtRange,
}

/// Output of lowering one async procedure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateMachineArtifact {
    /// Name of the source procedure.
    pub procedure: Name,
    /// Parameters of the entry procedure (unchanged from the source).
    pub params: Vec<Param>,
    /// Locals that remain ordinary, per-activation variables.
    pub locals: Vec<LocalDecl>,
    /// The `T` of the `Deferred<T>` handed to callers.
    pub result: Ty,
    pub arena: MachArena,
    pub slots: Vec<PersistentSlot>,
    pub state_slot: SlotId,
    pub status_slot: SlotId,
    pub result_slot: Option<SlotId>,
    /// Slot holding the cancellation handle, if the procedure takes one.
    pub cancel_slot: Option<SlotId>,
    pub entry: MachProc,
    pub dispatch: MachProc,
    /// Number of segments (suspension points + 1).
    pub state_count: u32,
}

impl StateMachineArtifact {
    pub fn slot(&self, id: SlotId) -> &PersistentSlot {
        &self.slots[id.index()]
    }

    /// Slots holding hoisted parameters and locals.
    pub fn hoisted_slots(&self) -> impl Iterator<Item = &PersistentSlot> {
        self.slots
            .iter()
            .filter(|slot| matches!(slot.role, SlotRole::Hoisted(_)))
    }

    /// Slot holding a hoisted parameter or local, if it was hoisted.
    pub fn slot_for(&self, origin: HoistOrigin) -> Option<SlotId> {
        self.slots
            .iter()
            .find(|slot| slot.role == SlotRole::Hoisted(origin))
            .map(|slot| slot.id)
    }

    /// The target every `Schedule` in this artifact names.
    pub fn dispatch_target(&self) -> DispatchTarget {
        DispatchTarget {
            procedure: self.dispatch.name,
        }
    }
}
