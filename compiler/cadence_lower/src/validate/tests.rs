use cadence_diagnostic::ErrorCode;
use cadence_ir::builder::ProcBuilder;
use cadence_ir::{BinaryOp, ExprArena, Place, StringInterner, Ty};
use pretty_assertions::assert_eq;

use super::*;
use crate::test_helpers;

fn codes(result: Result<(), Vec<LowerProblem>>) -> Vec<ErrorCode> {
    match result {
        Ok(()) => Vec::new(),
        Err(problems) => problems.iter().map(LowerProblem::code).collect(),
    }
}

#[test]
fn well_formed_bodies_pass() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let seq = test_helpers::seq(&mut arena, &interner);
    let round_trip = test_helpers::round_trip(&mut arena, &interner);
    assert_eq!(validate(&seq, &arena, &interner), Ok(()));
    assert_eq!(validate(&round_trip, &arena, &interner), Ok(()));
}

#[test]
fn expression_body_rejected() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let mut b = ProcBuilder::new(&mut arena, &interner, "E");
    let delay = b.delay(1.0);
    let body = b.suspend(delay);
    let proc = b.finish_expr(body);
    assert_eq!(codes(validate(&proc, &arena, &interner)), vec![ErrorCode::E1001]);
}

#[test]
fn suspend_in_closure_rejected_with_location() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let mut b = ProcBuilder::new(&mut arena, &interner, "Spawn");
    let delay = b.delay(1.0);
    let inner = b.suspend_stmt(delay);
    let lambda = b.lambda(vec![inner]);
    let register = b.call_host("register", vec![lambda], Ty::Unit);
    let stmt = b.expr_stmt(register);
    let proc = b.finish_block(vec![stmt]);

    let problems = validate(&proc, &arena, &interner).unwrap_err();
    assert_eq!(problems.len(), 1);
    let LowerProblem::SuspendInClosure { suspend, closure } = problems[0] else {
        panic!("unexpected problem {:?}", problems[0]);
    };
    assert!(closure.contains_span(suspend));
}

#[test]
fn jumps_rejected() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let mut b = ProcBuilder::new(&mut arena, &interner, "J");
    let label = b.label("top");
    let goto = b.goto("top");
    let brk = b.break_();
    let proc = b.finish_block(vec![label, goto, brk]);
    assert_eq!(
        codes(validate(&proc, &arena, &interner)),
        vec![ErrorCode::E1003, ErrorCode::E1003, ErrorCode::E1004]
    );
}

#[test]
fn break_inside_loop_is_fine_but_not_inside_closure_in_loop() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let mut b = ProcBuilder::new(&mut arena, &interner, "L");
    let cond = b.bool(true);
    let brk = b.break_();
    let inner_brk = b.break_();
    let lambda = b.lambda(vec![inner_brk]);
    let call = b.call_host("register", vec![lambda], Ty::Unit);
    let call = b.expr_stmt(call);
    let lp = b.while_(cond, vec![call, brk]);
    let proc = b.finish_block(vec![lp]);
    assert_eq!(codes(validate(&proc, &arena, &interner)), vec![ErrorCode::E1004]);
}

#[test]
fn early_return_before_suspension_rejected() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let mut b = ProcBuilder::new(&mut arena, &interner, "R");
    let cond = b.bool(false);
    let ret = b.return_(None);
    let guard = b.if_(cond, vec![ret], Vec::new());
    let step = b.yield_frame();
    let wait = b.suspend_stmt(step);
    let tail = b.return_(None);
    let proc = b.finish_block(vec![guard, wait, tail]);
    assert_eq!(codes(validate(&proc, &arena, &interner)), vec![ErrorCode::E1005]);
}

#[test]
fn generator_yield_with_suspend_rejected() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let mut b = ProcBuilder::new(&mut arena, &interner, "G");
    let one = b.int(1);
    let y = b.yield_return(one);
    let step = b.yield_frame();
    let wait = b.suspend_stmt(step);
    let proc = b.finish_block(vec![y, wait]);
    assert_eq!(codes(validate(&proc, &arena, &interner)), vec![ErrorCode::E1006]);
}

#[test]
fn suspend_in_control_flow_rejected() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let mut b = ProcBuilder::new(&mut arena, &interner, "C");
    let cond = b.bool(true);
    let step = b.yield_frame();
    let wait = b.suspend_stmt(step);
    let branch = b.if_(cond, vec![wait], Vec::new());
    let cond = b.bool(true);
    let step = b.yield_frame();
    let wait = b.suspend_stmt(step);
    let lp = b.while_(cond, vec![wait]);
    let proc = b.finish_block(vec![branch, lp]);

    let problems = validate(&proc, &arena, &interner).unwrap_err();
    let constructs: Vec<_> = problems
        .iter()
        .map(|p| match p {
            LowerProblem::SuspendInControlFlow { construct, .. } => *construct,
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(constructs, vec!["if", "while"]);
}

#[test]
fn suspend_inside_expression_rejected() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let mut b = ProcBuilder::new(&mut arena, &interner, "N");
    let x = b.local("x", Ty::Int);
    let task = b.call_proc("Compute", Vec::new(), Ty::Int);
    let value = b.suspend(task);
    let one = b.int(1);
    let sum = b.binary(BinaryOp::Add, value, one, Ty::Int);
    let decl = b.let_(x, sum);
    let proc = b.finish_block(vec![decl]);
    assert_eq!(codes(validate(&proc, &arena, &interner)), vec![ErrorCode::E1008]);
}

#[test]
fn two_suspends_in_one_statement_reported_once() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let mut b = ProcBuilder::new(&mut arena, &interner, "Two");
    let x = b.local("x", Ty::Int);
    let a = b.call_proc("A", Vec::new(), Ty::Int);
    let a = b.suspend(a);
    let c = b.call_proc("B", Vec::new(), Ty::Int);
    let c = b.suspend(c);
    let sum = b.binary(BinaryOp::Add, a, c, Ty::Int);
    let decl = b.let_(x, sum);
    let proc = b.finish_block(vec![decl]);

    let problems = validate(&proc, &arena, &interner).unwrap_err();
    assert_eq!(problems.len(), 1);
    assert!(matches!(
        problems[0],
        LowerProblem::MultipleSuspendsInStatement { count: 2, .. }
    ));
}

#[test]
fn statement_level_forms_accepted() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let mut b = ProcBuilder::new(&mut arena, &interner, "Forms");
    let x = b.local("x", Ty::Int);
    let task = b.call_proc("Compute", Vec::new(), Ty::Int);
    let value = b.suspend(task);
    let decl = b.let_(x, value);
    let task = b.call_proc("Compute", Vec::new(), Ty::Int);
    let value = b.suspend(task);
    let assign = b.assign(Place::Local(x), value);
    let task = b.call_proc("Compute", Vec::new(), Ty::Int);
    let value = b.suspend(task);
    let score = b.intern("score");
    let field = b.assign(Place::Field(score), value);
    let proc = b.finish_block(vec![decl, assign, field]);
    assert_eq!(validate(&proc, &arena, &interner), Ok(()));
}

#[test]
fn cancellation_param_must_be_cancellation_typed() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let mut b = ProcBuilder::new(&mut arena, &interner, "Bad");
    let index = b.param("token", Ty::Int);
    b.set_cancellation(index);
    let proc = b.finish_block(Vec::new());
    assert_eq!(codes(validate(&proc, &arena, &interner)), vec![ErrorCode::E1009]);

    let mut b = ProcBuilder::new(&mut arena, &interner, "Missing");
    b.set_cancellation(4);
    let proc = b.finish_block(Vec::new());
    assert_eq!(codes(validate(&proc, &arena, &interner)), vec![ErrorCode::E1009]);
}

#[test]
fn every_problem_is_collected() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let mut b = ProcBuilder::new(&mut arena, &interner, "Many");
    let goto = b.goto("end");
    let cond = b.bool(true);
    let step = b.yield_frame();
    let wait = b.suspend_stmt(step);
    let branch = b.if_(cond, vec![wait], Vec::new());
    let cont = b.continue_();
    let proc = b.finish_block(vec![goto, branch, cont]);
    assert_eq!(
        codes(validate(&proc, &arena, &interner)),
        vec![ErrorCode::E1003, ErrorCode::E1007, ErrorCode::E1004]
    );
}
