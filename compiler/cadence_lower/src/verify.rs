//! Debug-mode validation of state machine invariants.
//!
//! Walks a finished artifact and reports every violated invariant:
//! - slot ids are dense and every slot reference resolves
//! - the entry procedure starts at state 0 and hands back a task
//! - dispatch has one arm per state, in order
//! - every non-terminal arm advances the state by exactly one and ends
//!   with exactly one schedule request followed by a return
//! - the terminal arm finishes
//! - every schedule request targets the artifact's own dispatch procedure
//!
//! [`debug_verify`] runs after lowering in debug builds and panics with a
//! descriptive message, catching lowering bugs before a host runs them.

use cadence_ir::machine::{MachExprKind, MachPlace, MachStmtKind, StateMachineArtifact, Timing};
use cadence_ir::{MachExprId, MachExprRange, MachStmtId, MachStmtRange, SlotId};

/// Panic (debug builds only) if `artifact` violates an invariant.
pub fn debug_verify(artifact: &StateMachineArtifact) {
    if cfg!(debug_assertions) {
        let violations = check_artifact(artifact);
        debug_assert!(
            violations.is_empty(),
            "invalid state machine:\n  {}",
            violations.join("\n  ")
        );
    }
}

/// Every invariant violation in `artifact`, as messages.
pub fn check_artifact(artifact: &StateMachineArtifact) -> Vec<String> {
    let mut checker = Checker {
        artifact,
        violations: Vec::new(),
    };
    checker.slots();
    checker.entry();
    checker.dispatch();
    checker.violations
}

struct Checker<'a> {
    artifact: &'a StateMachineArtifact,
    violations: Vec<String>,
}

impl Checker<'_> {
    fn fail(&mut self, message: String) {
        self.violations.push(message);
    }

    fn slots(&mut self) {
        let artifact = self.artifact;
        for (index, slot) in artifact.slots.iter().enumerate() {
            if slot.id.index() != index {
                self.fail(format!("slot at {index} has id {:?}", slot.id));
            }
        }
        let fixed = [
            Some(self.artifact.state_slot),
            Some(self.artifact.status_slot),
            self.artifact.result_slot,
            self.artifact.cancel_slot,
        ];
        for slot in fixed.into_iter().flatten() {
            self.slot_ref(slot);
        }
    }

    fn slot_ref(&mut self, slot: SlotId) {
        if slot.index() >= self.artifact.slots.len() {
            self.fail(format!(
                "{slot:?} out of bounds ({} slots)",
                self.artifact.slots.len()
            ));
        }
    }

    fn entry(&mut self) {
        let artifact = self.artifact;
        let body = artifact.arena.stmt_list(artifact.entry.body);
        let first = body.first().map(|&id| &artifact.arena.stmt(id).kind);
        if first != Some(&MachStmtKind::SetState(0)) {
            self.fail(format!("entry must start with SetState(0), found {first:?}"));
        }
        let last = body.last().map(|&id| &artifact.arena.stmt(id).kind);
        if last != Some(&MachStmtKind::ReturnTask) {
            self.fail(format!("entry must end with ReturnTask, found {last:?}"));
        }
        self.stmt_list(artifact.entry.body);
    }

    fn dispatch(&mut self) {
        let artifact = self.artifact;
        let arena = &artifact.arena;
        self.stmt_list(artifact.dispatch.body);

        let switch = arena
            .stmt_list(artifact.dispatch.body)
            .iter()
            .find_map(|&id| match &arena.stmt(id).kind {
                MachStmtKind::Switch { scrutinee, arms } => Some((*scrutinee, arms)),
                _ => None,
            });
        let Some((scrutinee, arms)) = switch else {
            self.fail("dispatch has no state switch".to_owned());
            return;
        };
        if scrutinee != artifact.state_slot {
            self.fail(format!("dispatch switches on {scrutinee:?}, not the state slot"));
        }
        if arms.len() != artifact.state_count as usize {
            self.fail(format!(
                "{} arms for {} states",
                arms.len(),
                artifact.state_count
            ));
        }

        let last_state = artifact.state_count.saturating_sub(1);
        for (position, arm) in arms.iter().enumerate() {
            if arm.value as usize != position {
                self.fail(format!("arm {position} matches state {}", arm.value));
            }
            let body = arena.stmt_list(arm.body);
            let kinds: Vec<&MachStmtKind> = body.iter().map(|&id| &arena.stmt(id).kind).collect();
            if arm.value == last_state {
                if !matches!(kinds.last(), Some(MachStmtKind::Finish { .. })) {
                    self.fail(format!("terminal arm {} does not finish", arm.value));
                }
            } else {
                self.non_terminal_arm(arm.value, &kinds);
            }
        }
    }

    fn non_terminal_arm(&mut self, state: u32, kinds: &[&MachStmtKind]) {
        let tail = kinds.len().checked_sub(3).map(|start| &kinds[start..]);
        let well_formed = matches!(
            tail,
            Some([MachStmtKind::SetState(next), MachStmtKind::Schedule { .. }, MachStmtKind::Return(_)])
                if *next == state + 1
        );
        if !well_formed {
            self.fail(format!(
                "arm {state} must end with SetState({}), Schedule, Return",
                state + 1
            ));
        }
        // The completion guard's schedule is nested, so not counted here.
        let schedules = kinds
            .iter()
            .filter(|kind| matches!(kind, MachStmtKind::Schedule { .. }))
            .count();
        if schedules != 1 {
            self.fail(format!("arm {state} issues {schedules} schedule requests"));
        }
    }

    fn stmt_list(&mut self, range: MachStmtRange) {
        let artifact = self.artifact;
        let arena = &artifact.arena;
        for &id in arena.stmt_list(range) {
            self.stmt(id);
        }
    }

    fn stmt(&mut self, id: MachStmtId) {
        let artifact = self.artifact;
        let arena = &artifact.arena;
        if id.index() >= arena.stmt_count() {
            self.fail(format!("{id:?} out of bounds"));
            return;
        }
        match &arena.stmt(id).kind {
            MachStmtKind::Expr(expr) => self.expr(*expr),
            MachStmtKind::Let { init, .. } => self.opt_expr(*init),
            MachStmtKind::Assign { target, value } => {
                if let MachPlace::Slot(slot) = target {
                    self.slot_ref(*slot);
                }
                self.expr(*value);
            }
            MachStmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.expr(*cond);
                self.stmt_list(*then_branch);
                self.stmt_list(*else_branch);
            }
            MachStmtKind::While { cond, body } => {
                self.expr(*cond);
                self.stmt_list(*body);
            }
            MachStmtKind::Return(value) => self.opt_expr(*value),
            MachStmtKind::Finish { value, .. } => self.opt_expr(*value),
            MachStmtKind::Schedule { target, timing } => {
                if *target != artifact.dispatch_target() {
                    self.fail(format!("schedule targets {target:?}, not own dispatch"));
                }
                match timing {
                    Timing::Seconds(expr) | Timing::Frames(expr) => self.expr(*expr),
                    Timing::NextFrame => {}
                    Timing::Completion { tasks, .. } => {
                        for &task in tasks {
                            self.slot_ref(task);
                        }
                    }
                }
            }
            MachStmtKind::Invoke(target) => {
                if *target != artifact.dispatch_target() {
                    self.fail(format!("entry invokes {target:?}, not own dispatch"));
                }
            }
            MachStmtKind::Switch { scrutinee, arms } => {
                self.slot_ref(*scrutinee);
                for arm in arms {
                    self.stmt_list(arm.body);
                }
            }
            MachStmtKind::Break
            | MachStmtKind::Continue
            | MachStmtKind::SetState(_)
            | MachStmtKind::ReturnTask => {}
        }
    }

    fn opt_expr(&mut self, id: MachExprId) {
        if id.is_valid() {
            self.expr(id);
        }
    }

    fn expr_list(&mut self, range: MachExprRange) {
        let artifact = self.artifact;
        let arena = &artifact.arena;
        for &id in arena.expr_list(range) {
            self.expr(id);
        }
    }

    fn expr(&mut self, id: MachExprId) {
        let artifact = self.artifact;
        let arena = &artifact.arena;
        if !id.is_valid() {
            self.fail("missing expression".to_owned());
            return;
        }
        match &arena.expr(id).kind {
            MachExprKind::Slot(slot) | MachExprKind::CancelRequested(slot) => self.slot_ref(*slot),
            MachExprKind::TasksDone { tasks, .. } | MachExprKind::TaskValue { tasks, .. } => {
                for &task in tasks {
                    self.slot_ref(task);
                }
            }
            MachExprKind::Binary { left, right, .. } => {
                self.expr(*left);
                self.expr(*right);
            }
            MachExprKind::Unary { operand, .. } => self.expr(*operand),
            MachExprKind::Call { args, .. } => self.expr_list(*args),
            MachExprKind::Lambda { body } => self.stmt_list(*body),
            MachExprKind::Int(_)
            | MachExprKind::Float(_)
            | MachExprKind::Bool(_)
            | MachExprKind::Str(_)
            | MachExprKind::Unit
            | MachExprKind::Local(_)
            | MachExprKind::Param(_)
            | MachExprKind::Field(_)
            | MachExprKind::Error => {}
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests {
    use cadence_ir::{ExprArena, StringInterner};

    use super::*;
    use crate::{lower_procedure, test_helpers, LowerOptions};

    #[test]
    fn tampered_artifacts_are_caught() {
        let interner = StringInterner::new();
        let mut arena = ExprArena::new();
        let proc = test_helpers::seq(&mut arena, &interner);
        let artifact =
            lower_procedure(&proc, &arena, &interner, &LowerOptions::default()).unwrap();
        assert!(check_artifact(&artifact).is_empty());

        let mut extra_state = artifact.clone();
        extra_state.state_count += 1;
        let violations = check_artifact(&extra_state);
        assert!(violations.iter().any(|v| v == "3 arms for 4 states"), "{violations:?}");

        let mut foreign = artifact.clone();
        foreign.dispatch.name = interner.intern("Elsewhere");
        assert!(check_artifact(&foreign)
            .iter()
            .any(|v| v.contains("not own dispatch")));

        let mut missing_slot = artifact;
        missing_slot.slots.pop();
        assert!(check_artifact(&missing_slot)
            .iter()
            .any(|v| v.contains("out of bounds")));
    }
}
