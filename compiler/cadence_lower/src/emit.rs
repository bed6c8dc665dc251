//! State machine emission.
//!
//! Wraps the segments into the two generated procedures.
//!
//! Entry:
//!
//! ```text
//! state <- 0; status <- Running;
//! slot_p <- p;            // per hoisted parameter
//! invoke dispatch;
//! return task;
//! ```
//!
//! Dispatch:
//!
//! ```text
//! if status != Running { return; }
//! switch state {
//!     i => {
//!         if cancel_requested(token) { finish Cancelled; }
//!         if !tasks_done(awaits of point i-1) { schedule completion; return; }
//!         <segment i>
//!         state <- i + 1; schedule <point i>; return;   // or: finish Succeeded
//!     }
//! }
//! ```
//!
//! An out-of-range state matches no arm, so dispatch does nothing.

use smallvec::smallvec;

use cadence_ir::machine::{
    DispatchTarget, HoistOrigin, JoinMode, MachArena, MachExprKind, MachPlace, MachProc,
    MachStmtKind, SlotRole, SwitchArm, TaskStatus, Timing,
};
use cadence_ir::{
    AsyncProcedure, BinaryOp, MachExprId, MachStmtId, MachStmtRange, Name, SlotId, Span, Ty,
    UnaryOp,
};

use crate::layout::SlotLayout;
use crate::segment::{ResumeRequest, Segment};

/// The generated entry and dispatch procedures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmittedProcs {
    pub entry: MachProc,
    pub dispatch: MachProc,
}

pub fn emit_state_machine(
    proc: &AsyncProcedure,
    segments: &[Segment],
    layout: &SlotLayout,
    dispatch_name: Name,
    out: &mut MachArena,
) -> EmittedProcs {
    let mut emitter = Emitter {
        out,
        layout,
        target: DispatchTarget {
            procedure: dispatch_name,
        },
        span: proc.span,
    };
    let entry = emitter.entry(proc);
    let dispatch = emitter.dispatch(segments);

    tracing::debug!(
        arms = segments.len(),
        cancellable = layout.cancel.is_some(),
        "emitted state machine"
    );

    EmittedProcs {
        entry: MachProc {
            name: proc.name,
            body: entry,
        },
        dispatch: MachProc {
            name: dispatch_name,
            body: dispatch,
        },
    }
}

struct Emitter<'a> {
    out: &'a mut MachArena,
    layout: &'a SlotLayout,
    target: DispatchTarget,
    span: Span,
}

impl Emitter<'_> {
    fn stmt(&mut self, kind: MachStmtKind) -> MachStmtId {
        self.out.alloc_stmt(kind, self.span)
    }

    fn expr(&mut self, kind: MachExprKind, ty: Ty) -> MachExprId {
        self.out.alloc_expr(kind, ty, self.span)
    }

    fn leave(&mut self) -> MachStmtId {
        self.stmt(MachStmtKind::Return(MachExprId::INVALID))
    }

    // ── Entry ───────────────────────────────────────────────────────

    fn entry(&mut self, proc: &AsyncProcedure) -> MachStmtRange {
        let mut body = vec![self.stmt(MachStmtKind::SetState(0))];

        let running = self.expr(MachExprKind::Int(TaskStatus::Running.code()), Ty::Int);
        body.push(self.stmt(MachStmtKind::Assign {
            target: MachPlace::Slot(self.layout.status),
            value: running,
        }));

        let layout = self.layout;
        for slot in layout.slots() {
            let SlotRole::Hoisted(HoistOrigin::Param(index)) = slot.role else {
                continue;
            };
            let ty = proc
                .param(index)
                .map_or_else(|| slot.ty.clone(), |param| param.ty.clone());
            let value = self.expr(MachExprKind::Param(index), ty);
            body.push(self.stmt(MachStmtKind::Assign {
                target: MachPlace::Slot(slot.id),
                value,
            }));
        }

        body.push(self.stmt(MachStmtKind::Invoke(self.target)));
        body.push(self.stmt(MachStmtKind::ReturnTask));
        self.out.alloc_stmt_list(body)
    }

    // ── Dispatch ────────────────────────────────────────────────────

    fn dispatch(&mut self, segments: &[Segment]) -> MachStmtRange {
        let status = self.expr(MachExprKind::Slot(self.layout.status), Ty::Int);
        let running = self.expr(MachExprKind::Int(TaskStatus::Running.code()), Ty::Int);
        let finished = self.expr(
            MachExprKind::Binary {
                op: BinaryOp::NotEq,
                left: status,
                right: running,
            },
            Ty::Bool,
        );
        let leave = self.leave();
        let then_branch = self.out.alloc_stmt_list([leave]);
        let guard = self.stmt(MachStmtKind::If {
            cond: finished,
            then_branch,
            else_branch: MachStmtRange::EMPTY,
        });

        let arms = segments
            .iter()
            .enumerate()
            .map(|(i, segment)| {
                let previous = i.checked_sub(1).and_then(|p| segments.get(p));
                self.arm(segment, previous)
            })
            .collect();
        let switch = self.stmt(MachStmtKind::Switch {
            scrutinee: self.layout.state,
            arms,
        });

        self.out.alloc_stmt_list([guard, switch])
    }

    fn arm(&mut self, segment: &Segment, previous: Option<&Segment>) -> SwitchArm {
        let mut body = Vec::with_capacity(segment.body.len() + 4);

        if let Some(token) = self.layout.cancel {
            body.push(self.cancel_check(token));
        }

        let awaited = previous
            .and_then(|prev| prev.exit.as_ref())
            .and_then(|exit| exit.request.awaited());
        if let Some((tasks, mode)) = awaited {
            let done = self.expr(
                MachExprKind::TasksDone {
                    tasks: tasks.clone(),
                    mode,
                },
                Ty::Bool,
            );
            let not_done = self.expr(
                MachExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: done,
                },
                Ty::Bool,
            );
            // Dispatched before the awaited tasks finished: wait again
            // without advancing.
            let reschedule = self.stmt(MachStmtKind::Schedule {
                target: self.target,
                timing: Timing::Completion { tasks, mode },
            });
            let leave = self.leave();
            let then_branch = self.out.alloc_stmt_list([reschedule, leave]);
            body.push(self.stmt(MachStmtKind::If {
                cond: not_done,
                then_branch,
                else_branch: MachStmtRange::EMPTY,
            }));
        }

        body.extend_from_slice(&segment.body);

        match &segment.exit {
            Some(exit) => {
                body.push(self.stmt(MachStmtKind::SetState(segment.index + 1)));
                let timing = timing_for(&exit.request);
                body.push(self.stmt(MachStmtKind::Schedule {
                    target: self.target,
                    timing,
                }));
                body.push(self.leave());
            }
            None => body.push(self.stmt(MachStmtKind::Finish {
                status: TaskStatus::Succeeded,
                value: MachExprId::INVALID,
            })),
        }

        SwitchArm {
            value: segment.index,
            body: self.out.alloc_stmt_list(body),
        }
    }

    fn cancel_check(&mut self, token: SlotId) -> MachStmtId {
        let requested = self.expr(MachExprKind::CancelRequested(token), Ty::Bool);
        let finish = self.stmt(MachStmtKind::Finish {
            status: TaskStatus::Cancelled,
            value: MachExprId::INVALID,
        });
        let then_branch = self.out.alloc_stmt_list([finish]);
        self.stmt(MachStmtKind::If {
            cond: requested,
            then_branch,
            else_branch: MachStmtRange::EMPTY,
        })
    }
}

fn timing_for(request: &ResumeRequest) -> Timing {
    match request {
        ResumeRequest::Seconds(duration) => Timing::Seconds(*duration),
        ResumeRequest::Frames(frames) => Timing::Frames(*frames),
        ResumeRequest::NextFrame => Timing::NextFrame,
        ResumeRequest::Join { mode, tasks } => Timing::Completion {
            tasks: tasks.clone(),
            mode: *mode,
        },
        ResumeRequest::Delegate(task) => Timing::Completion {
            tasks: smallvec![*task],
            mode: JoinMode::All,
        },
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
