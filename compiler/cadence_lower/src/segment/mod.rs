//! Body segmentation.
//!
//! Splits the top-level statement list at suspension statements and
//! rewrites each segment into the machine arena:
//!
//! - reads and writes of hoisted parameters and locals become slot
//!   accesses; `let` of a hoisted local becomes a slot assignment;
//! - `return` outside closures becomes a successful finish;
//! - the statement that closes a segment contributes only its operand,
//!   stored into await slots or turned into a [`ResumeRequest`];
//! - the next segment opens with the delivery of the awaited value.
//!
//! Non-hoisted locals are per-activation. A segment that touches one it
//! did not declare gets its own declaration: a top-level overwrite becomes
//! the `let`, anything else gets an uninitialized `let` at the top.

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use cadence_ir::machine::{JoinMode, MachArena, MachExprKind, MachPlace, MachStmtKind, TaskStatus};
use cadence_ir::{
    AsyncProcedure, ExprArena, ExprId, ExprKind, LocalId, MachExprId, MachStmtId, MachStmtRange,
    Place, ProcBody, SlotId, Span, StmtId, StmtKind, StmtRange,
};
use cadence_stack::ensure_sufficient_stack;

use crate::classify::{SuspensionKind, SuspensionPoint};
use crate::hoist::segment_of_positions;
use crate::layout::SlotLayout;
use crate::LowerProblem;

/// One resumable slice of the body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segment {
    pub index: u32,
    /// Rewritten statements, delivery first.
    pub body: Vec<MachStmtId>,
    /// The suspension that ends this segment; `None` for the last one.
    pub exit: Option<SegmentExit>,
}

impl Segment {
    pub fn is_terminal(&self) -> bool {
        self.exit.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegmentExit {
    pub point: u32,
    pub request: ResumeRequest,
}

/// What the scheduler is asked to wait for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResumeRequest {
    Seconds(MachExprId),
    Frames(MachExprId),
    NextFrame,
    Join {
        mode: JoinMode,
        tasks: SmallVec<[SlotId; 2]>,
    },
    Delegate(SlotId),
}

impl ResumeRequest {
    /// Task slots and join mode, for requests completed by other tasks.
    pub fn awaited(&self) -> Option<(SmallVec<[SlotId; 2]>, JoinMode)> {
        match self {
            ResumeRequest::Join { mode, tasks } => Some((tasks.clone(), *mode)),
            ResumeRequest::Delegate(task) => Some((SmallVec::from_elem(*task, 1), JoinMode::All)),
            ResumeRequest::Seconds(_) | ResumeRequest::Frames(_) | ResumeRequest::NextFrame => {
                None
            }
        }
    }
}

/// Segment a validated body. Always returns `points.len() + 1` segments.
pub fn segment_body(
    proc: &AsyncProcedure,
    arena: &ExprArena,
    points: &[SuspensionPoint],
    layout: &SlotLayout,
    out: &mut MachArena,
) -> Result<Vec<Segment>, Vec<LowerProblem>> {
    let body = match proc.body {
        ProcBody::Block(body) => body,
        ProcBody::Expr(expr) => {
            return Err(vec![LowerProblem::ExpressionBody {
                span: arena.expr(expr).span,
            }])
        }
    };

    let stmts = arena.stmt_list(body);
    let segment_of = segment_of_positions(stmts.len(), points);
    let points_by_stmt: FxHashMap<StmtId, &SuspensionPoint> =
        points.iter().map(|p| (p.stmt, p)).collect();

    let mut rewriter = Rewriter {
        src: arena,
        out,
        layout,
        lambda_depth: 0,
        declared: FxHashSet::default(),
        undeclared: Vec::new(),
        problems: Vec::new(),
    };

    let mut segments = Vec::with_capacity(points.len() + 1);
    let mut cursor = 0;
    for index in 0..=points.len() {
        let opening = index.checked_sub(1).and_then(|prev| points.get(prev));
        let mut segment = Segment {
            index: crate::to_u32(index),
            body: Vec::new(),
            exit: None,
        };
        rewriter.begin_segment();

        let delivery = opening.and_then(|point| rewriter.delivery(point));

        let mut rewritten = Vec::new();
        while cursor < stmts.len() && segment_of[cursor] == index {
            let stmt_id = stmts[cursor];
            cursor += 1;
            if let Some(point) = points_by_stmt.get(&stmt_id) {
                let (stores, request) = rewriter.suspension_exit(point);
                rewritten.extend(stores);
                segment.exit = Some(SegmentExit {
                    point: point.index,
                    request,
                });
                break;
            }
            if let Some(stmt) = rewriter.top_level_stmt(stmt_id) {
                rewritten.push(stmt);
            }
        }

        segment.body.extend(delivery);
        segment.body.extend(rewriter.pending_declarations());
        segment.body.extend(rewritten);
        segments.push(segment);
    }

    tracing::debug!(
        segments = segments.len(),
        statements = rewriter.out.stmt_count(),
        "segmented body"
    );

    if rewriter.problems.is_empty() {
        Ok(segments)
    } else {
        Err(rewriter.problems)
    }
}

struct Rewriter<'a> {
    src: &'a ExprArena,
    out: &'a mut MachArena,
    layout: &'a SlotLayout,
    lambda_depth: u32,
    /// Non-hoisted locals declared so far in the current segment.
    declared: FxHashSet<LocalId>,
    /// Non-hoisted locals referenced before any declaration in the current
    /// segment, in first-reference order.
    undeclared: Vec<LocalId>,
    problems: Vec<LowerProblem>,
}

impl Rewriter<'_> {
    fn begin_segment(&mut self) {
        self.declared.clear();
        self.undeclared.clear();
    }

    fn pending_declarations(&mut self) -> Vec<MachStmtId> {
        let locals = std::mem::take(&mut self.undeclared);
        locals
            .into_iter()
            .map(|local| {
                self.out.alloc_stmt(
                    MachStmtKind::Let {
                        local,
                        init: MachExprId::INVALID,
                    },
                    Span::DUMMY,
                )
            })
            .collect()
    }

    fn touch(&mut self, local: LocalId) {
        if !self.declared.contains(&local) && !self.undeclared.contains(&local) {
            self.undeclared.push(local);
        }
    }

    fn declare(&mut self, local: LocalId) {
        self.declared.insert(local);
    }

    // ── Suspension boundaries ───────────────────────────────────────

    /// Statement delivering `point`'s value at the top of the next segment.
    fn delivery(&mut self, point: &SuspensionPoint) -> Option<MachStmtId> {
        let delivery = point.delivery?;
        if !point.carries_value {
            return None;
        }
        let layout = self.layout;
        let (tasks, mode) = match &point.kind {
            SuspensionKind::JoinAny { .. } => (layout.awaits(point.index), JoinMode::Any),
            SuspensionKind::DelegateToProcedure { .. } | SuspensionKind::JoinAll { .. } => {
                (layout.awaits(point.index), JoinMode::All)
            }
            SuspensionKind::TimedDelay { .. }
            | SuspensionKind::FrameDelay { .. }
            | SuspensionKind::YieldOneStep => return None,
        };
        let value = self.out.alloc_expr(
            MachExprKind::TaskValue {
                tasks: tasks.iter().copied().collect(),
                mode,
            },
            point.value_ty.clone(),
            point.span,
        );

        let kind = match delivery.target {
            Place::Local(local) => match self.layout.local(local) {
                Some(slot) => MachStmtKind::Assign {
                    target: MachPlace::Slot(slot),
                    value,
                },
                None => {
                    self.declare(local);
                    MachStmtKind::Let { local, init: value }
                }
            },
            Place::Param(index) => MachStmtKind::Assign {
                target: self.param_place(index),
                value,
            },
            Place::Field(name) => MachStmtKind::Assign {
                target: MachPlace::Field(name),
                value,
            },
        };
        Some(self.out.alloc_stmt(kind, point.span))
    }

    /// Await-slot stores and the resume request closing a segment.
    fn suspension_exit(&mut self, point: &SuspensionPoint) -> (Vec<MachStmtId>, ResumeRequest) {
        let mut stores = Vec::new();
        let request = match &point.kind {
            SuspensionKind::TimedDelay { duration } => {
                ResumeRequest::Seconds(self.expr(*duration))
            }
            SuspensionKind::FrameDelay { frames } => ResumeRequest::Frames(self.expr(*frames)),
            SuspensionKind::YieldOneStep => ResumeRequest::NextFrame,
            SuspensionKind::JoinAll { operands } | SuspensionKind::JoinAny { operands } => {
                let mode = if matches!(point.kind, SuspensionKind::JoinAll { .. }) {
                    JoinMode::All
                } else {
                    JoinMode::Any
                };
                let tasks: SmallVec<[SlotId; 2]> =
                    self.layout.awaits(point.index).iter().copied().collect();
                for (&operand, &slot) in operands.iter().zip(tasks.iter()) {
                    stores.push(self.store_task(operand, slot));
                }
                ResumeRequest::Join { mode, tasks }
            }
            SuspensionKind::DelegateToProcedure { operand } => {
                match self.layout.awaits(point.index).first().copied() {
                    Some(slot) => {
                        stores.push(self.store_task(*operand, slot));
                        ResumeRequest::Delegate(slot)
                    }
                    None => {
                        self.problems.push(LowerProblem::Internal {
                            message: format!("no await slot for suspension point {}", point.index),
                            span: point.span,
                        });
                        ResumeRequest::NextFrame
                    }
                }
            }
        };
        (stores, request)
    }

    fn store_task(&mut self, operand: ExprId, slot: SlotId) -> MachStmtId {
        let span = self.src.expr(operand).span;
        let value = self.expr(operand);
        self.out.alloc_stmt(
            MachStmtKind::Assign {
                target: MachPlace::Slot(slot),
                value,
            },
            span,
        )
    }

    // ── Statements ──────────────────────────────────────────────────

    fn top_level_stmt(&mut self, id: StmtId) -> Option<MachStmtId> {
        let stmt = self.src.stmt(id);
        if let StmtKind::Assign {
            target: Place::Local(local),
            value,
        } = stmt.kind
        {
            let first_touch = self.layout.local(local).is_none()
                && !self.declared.contains(&local)
                && !self.undeclared.contains(&local);
            if first_touch {
                let init = self.expr(value);
                self.declare(local);
                return Some(
                    self.out
                        .alloc_stmt(MachStmtKind::Let { local, init }, stmt.span),
                );
            }
        }
        self.stmt(id)
    }

    fn stmt_list(&mut self, range: StmtRange) -> MachStmtRange {
        let ids: Vec<StmtId> = self.src.stmt_list(range).to_vec();
        let rewritten: Vec<MachStmtId> = ids.into_iter().filter_map(|id| self.stmt(id)).collect();
        self.out.alloc_stmt_list(rewritten)
    }

    fn stmt(&mut self, id: StmtId) -> Option<MachStmtId> {
        let src = self.src;
        let stmt = src.stmt(id);
        let kind = match stmt.kind {
            StmtKind::Expr(expr) => MachStmtKind::Expr(self.expr(expr)),
            StmtKind::Let { local, init } => match self.layout.local(local) {
                Some(slot) => {
                    if !init.is_valid() {
                        return None;
                    }
                    MachStmtKind::Assign {
                        target: MachPlace::Slot(slot),
                        value: self.expr(init),
                    }
                }
                None => {
                    self.declare(local);
                    MachStmtKind::Let {
                        local,
                        init: self.opt_expr(init),
                    }
                }
            },
            StmtKind::Assign { target, value } => {
                let value = self.expr(value);
                MachStmtKind::Assign {
                    target: self.place(target),
                    value,
                }
            }
            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => MachStmtKind::If {
                cond: self.expr(cond),
                then_branch: self.stmt_list(then_branch),
                else_branch: self.stmt_list(else_branch),
            },
            StmtKind::While { cond, body } => MachStmtKind::While {
                cond: self.expr(cond),
                body: self.stmt_list(body),
            },
            StmtKind::Break => MachStmtKind::Break,
            StmtKind::Continue => MachStmtKind::Continue,
            StmtKind::Return(value) => {
                let value = self.opt_expr(value);
                if self.lambda_depth > 0 {
                    MachStmtKind::Return(value)
                } else {
                    MachStmtKind::Finish {
                        status: TaskStatus::Succeeded,
                        value,
                    }
                }
            }
            StmtKind::Goto(_) | StmtKind::Label(_) | StmtKind::YieldReturn(_) => {
                self.problems.push(LowerProblem::Internal {
                    message: "unstructured statement reached the segmenter".to_owned(),
                    span: stmt.span,
                });
                return None;
            }
        };
        Some(self.out.alloc_stmt(kind, stmt.span))
    }

    fn place(&mut self, place: Place) -> MachPlace {
        match place {
            Place::Local(local) => match self.layout.local(local) {
                Some(slot) => MachPlace::Slot(slot),
                None => {
                    self.touch(local);
                    MachPlace::Local(local)
                }
            },
            Place::Param(index) => self.param_place(index),
            Place::Field(name) => MachPlace::Field(name),
        }
    }

    fn param_place(&self, index: u32) -> MachPlace {
        self.layout
            .param(index)
            .map_or(MachPlace::Param(index), MachPlace::Slot)
    }

    // ── Expressions ─────────────────────────────────────────────────

    fn opt_expr(&mut self, id: ExprId) -> MachExprId {
        if id.is_valid() {
            self.expr(id)
        } else {
            MachExprId::INVALID
        }
    }

    fn expr(&mut self, id: ExprId) -> MachExprId {
        ensure_sufficient_stack(|| self.expr_inner(id))
    }

    fn expr_inner(&mut self, id: ExprId) -> MachExprId {
        let src = self.src;
        let expr = src.expr(id);
        let kind = match expr.kind {
            ExprKind::Int(v) => MachExprKind::Int(v),
            ExprKind::Float(bits) => MachExprKind::Float(bits),
            ExprKind::Bool(v) => MachExprKind::Bool(v),
            ExprKind::Str(name) => MachExprKind::Str(name),
            ExprKind::Unit => MachExprKind::Unit,
            ExprKind::Local(local) => match self.layout.local(local) {
                Some(slot) => MachExprKind::Slot(slot),
                None => {
                    self.touch(local);
                    MachExprKind::Local(local)
                }
            },
            ExprKind::Param(index) => match self.layout.param(index) {
                Some(slot) => MachExprKind::Slot(slot),
                None => MachExprKind::Param(index),
            },
            ExprKind::Field(name) => MachExprKind::Field(name),
            ExprKind::Binary { op, left, right } => MachExprKind::Binary {
                op,
                left: self.expr(left),
                right: self.expr(right),
            },
            ExprKind::Unary { op, operand } => MachExprKind::Unary {
                op,
                operand: self.expr(operand),
            },
            ExprKind::Call { target, args } => {
                let args: Vec<ExprId> = src.expr_list(args).to_vec();
                let args: Vec<MachExprId> = args.into_iter().map(|a| self.expr(a)).collect();
                MachExprKind::Call {
                    target,
                    args: self.out.alloc_expr_list(args),
                }
            }
            ExprKind::Lambda { body } => {
                self.lambda_depth += 1;
                let body = self.stmt_list(body);
                self.lambda_depth -= 1;
                MachExprKind::Lambda { body }
            }
            ExprKind::Suspend(_) => {
                self.problems.push(LowerProblem::Internal {
                    message: "suspension outside a segment boundary".to_owned(),
                    span: expr.span,
                });
                MachExprKind::Error
            }
            ExprKind::Error => MachExprKind::Error,
        };
        self.out.alloc_expr(kind, expr.ty.clone(), expr.span)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
