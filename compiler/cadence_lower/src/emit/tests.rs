use cadence_ir::builder::ProcBuilder;
use cadence_ir::machine::{MachStmtKind, StateMachineArtifact};
use cadence_ir::{ExprArena, MachStmtRange, StringInterner, Ty};
use pretty_assertions::assert_eq;

use super::*;
use crate::{lower_procedure, test_helpers, LowerOptions};

fn kinds(artifact: &StateMachineArtifact, range: MachStmtRange) -> Vec<&MachStmtKind> {
    artifact
        .arena
        .stmt_list(range)
        .iter()
        .map(|&id| &artifact.arena.stmt(id).kind)
        .collect()
}

fn arms(artifact: &StateMachineArtifact) -> &[SwitchArm] {
    let arena = &artifact.arena;
    for &id in arena.stmt_list(artifact.dispatch.body) {
        if let MachStmtKind::Switch { arms, .. } = &arena.stmt(id).kind {
            return arms;
        }
    }
    panic!("dispatch has no state switch");
}

fn lower(proc: &AsyncProcedure, arena: &ExprArena, interner: &StringInterner) -> StateMachineArtifact {
    lower_procedure(proc, arena, interner, &LowerOptions::default()).unwrap()
}

#[test]
fn entry_initializes_and_invokes_dispatch() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let proc = test_helpers::round_trip(&mut arena, &interner);
    let artifact = lower(&proc, &arena, &interner);
    let x = artifact.slot_for(HoistOrigin::Param(0)).unwrap();

    let entry = kinds(&artifact, artifact.entry.body);
    assert_eq!(entry.len(), 5);
    assert_eq!(entry[0], &MachStmtKind::SetState(0));
    assert!(matches!(
        entry[1],
        MachStmtKind::Assign { target: MachPlace::Slot(s), .. } if *s == artifact.status_slot
    ));
    let MachStmtKind::Assign {
        target: MachPlace::Slot(target),
        value,
    } = entry[2]
    else {
        panic!("expected parameter copy");
    };
    assert_eq!(*target, x);
    assert_eq!(artifact.arena.expr(*value).kind, MachExprKind::Param(0));
    assert_eq!(
        entry[3],
        &MachStmtKind::Invoke(artifact.dispatch_target())
    );
    assert_eq!(entry[4], &MachStmtKind::ReturnTask);
}

#[test]
fn dispatch_arms_advance_and_schedule() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let proc = test_helpers::seq(&mut arena, &interner);
    let artifact = lower(&proc, &arena, &interner);
    let arms = arms(&artifact);
    assert_eq!(arms.len(), 3);

    let arm0 = kinds(&artifact, arms[0].body);
    assert_eq!(arm0.len(), 4);
    assert_eq!(arm0[1], &MachStmtKind::SetState(1));
    assert!(matches!(
        arm0[2],
        MachStmtKind::Schedule { timing: Timing::Seconds(_), target } if *target == artifact.dispatch_target()
    ));
    assert_eq!(arm0[3], &MachStmtKind::Return(MachExprId::INVALID));

    let arm1 = kinds(&artifact, arms[1].body);
    assert!(matches!(
        arm1[2],
        MachStmtKind::Schedule {
            timing: Timing::NextFrame,
            ..
        }
    ));

    let arm2 = kinds(&artifact, arms[2].body);
    assert_eq!(
        arm2.last().copied(),
        Some(&MachStmtKind::Finish {
            status: TaskStatus::Succeeded,
            value: MachExprId::INVALID,
        })
    );
}

#[test]
fn every_arm_checks_cancellation_first() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let mut b = ProcBuilder::new(&mut arena, &interner, "Cancellable");
    b.cancellation_param("token");
    let a = b.log("A");
    let step = b.yield_frame();
    let s0 = b.suspend_stmt(step);
    let c = b.log("B");
    let proc = b.finish_block(vec![a, s0, c]);
    let artifact = lower(&proc, &arena, &interner);
    let token = artifact.cancel_slot.unwrap();

    for arm in arms(&artifact) {
        let body = kinds(&artifact, arm.body);
        let MachStmtKind::If {
            cond, then_branch, ..
        } = body[0]
        else {
            panic!("arm {} does not start with a cancellation check", arm.value);
        };
        assert_eq!(
            artifact.arena.expr(*cond).kind,
            MachExprKind::CancelRequested(token)
        );
        assert_eq!(
            kinds(&artifact, *then_branch),
            vec![&MachStmtKind::Finish {
                status: TaskStatus::Cancelled,
                value: MachExprId::INVALID,
            }]
        );
    }
}

#[test]
fn delegation_resumes_behind_completion_guard() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let mut b = ProcBuilder::new(&mut arena, &interner, "Outer");
    let task = b.call_proc("Inner", Vec::new(), Ty::Unit);
    let s0 = b.suspend_stmt(task);
    let done = b.log("done");
    let proc = b.finish_block(vec![s0, done]);
    let artifact = lower(&proc, &arena, &interner);
    let arms = arms(&artifact);

    let arm0 = kinds(&artifact, arms[0].body);
    let MachStmtKind::Schedule {
        timing: Timing::Completion { tasks, mode },
        ..
    } = arm0[arm0.len() - 2]
    else {
        panic!("expected completion request, got {arm0:?}");
    };
    assert_eq!(*mode, JoinMode::All);
    assert_eq!(tasks.len(), 1);

    let arm1 = kinds(&artifact, arms[1].body);
    let MachStmtKind::If {
        cond, then_branch, ..
    } = arm1[0]
    else {
        panic!("expected completion guard");
    };
    assert!(matches!(
        artifact.arena.expr(*cond).kind,
        MachExprKind::Unary { op: UnaryOp::Not, .. }
    ));
    let guard = kinds(&artifact, *then_branch);
    assert!(matches!(
        guard.as_slice(),
        [MachStmtKind::Schedule { timing: Timing::Completion { .. }, .. }, MachStmtKind::Return(_)]
    ));
}

#[test]
fn dispatch_leaves_unless_running() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let proc = test_helpers::seq(&mut arena, &interner);
    let artifact = lower(&proc, &arena, &interner);

    let body = kinds(&artifact, artifact.dispatch.body);
    let MachStmtKind::If {
        cond, then_branch, ..
    } = body[0]
    else {
        panic!("expected status guard");
    };
    assert!(matches!(
        artifact.arena.expr(*cond).kind,
        MachExprKind::Binary {
            op: BinaryOp::NotEq,
            ..
        }
    ));
    assert_eq!(
        kinds(&artifact, *then_branch),
        vec![&MachStmtKind::Return(MachExprId::INVALID)]
    );
}
