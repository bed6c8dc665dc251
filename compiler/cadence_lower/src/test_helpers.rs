//! Shared fixtures for unit tests.

use cadence_ir::builder::ProcBuilder;
use cadence_ir::{AsyncProcedure, ExprArena, Place, StringInterner, Ty};

/// `Seq() { log("A"); suspend Delay(1f); log("B"); suspend Yield(); log("C"); }`
pub(crate) fn seq(arena: &mut ExprArena, interner: &StringInterner) -> AsyncProcedure {
    let mut b = ProcBuilder::new(arena, interner, "Seq");
    let a = b.log("A");
    let delay = b.delay(1.0);
    let s1 = b.suspend_stmt(delay);
    let bb = b.log("B");
    let step = b.yield_frame();
    let s2 = b.suspend_stmt(step);
    let c = b.log("C");
    b.finish_block(vec![a, s1, bb, s2, c])
}

/// `P(int x) { store(x); suspend Delay(1); use(x); }`
pub(crate) fn round_trip(arena: &mut ExprArena, interner: &StringInterner) -> AsyncProcedure {
    let mut b = ProcBuilder::new(arena, interner, "P");
    let x = b.param("x", Ty::Int);
    let read = b.param_ref(x);
    let store = b.call_host("store", vec![read], Ty::Unit);
    let store = b.expr_stmt(store);
    let delay = b.delay(1.0);
    let wait = b.suspend_stmt(delay);
    let read = b.param_ref(x);
    let used = b.call_host("use", vec![read], Ty::Unit);
    let used = b.expr_stmt(used);
    b.finish_block(vec![store, wait, used])
}

/// Locals on both sides of one suspension:
///
/// ```text
/// Mix(int p) {
///     int before = p;   log(before);
///     int across = 1;
///     suspend Yield();
///     log(across);
///     int after = 2;    log(after);
/// }
/// ```
pub(crate) fn mixed_locals(arena: &mut ExprArena, interner: &StringInterner) -> AsyncProcedure {
    let mut b = ProcBuilder::new(arena, interner, "Mix");
    let p = b.param("p", Ty::Int);
    let before = b.local("before", Ty::Int);
    let across = b.local("across", Ty::Int);
    let after = b.local("after", Ty::Int);

    let init = b.param_ref(p);
    let s0 = b.let_(before, init);
    let read = b.local_ref(before);
    let log = b.call_host("log", vec![read], Ty::Unit);
    let s1 = b.expr_stmt(log);
    let one = b.int(1);
    let s2 = b.let_(across, one);
    let step = b.yield_frame();
    let s3 = b.suspend_stmt(step);
    let read = b.local_ref(across);
    let log = b.call_host("log", vec![read], Ty::Unit);
    let s4 = b.expr_stmt(log);
    let two = b.int(2);
    let s5 = b.let_(after, two);
    let read = b.local_ref(after);
    let log = b.call_host("log", vec![read], Ty::Unit);
    let s6 = b.expr_stmt(log);
    b.finish_block(vec![s0, s1, s2, s3, s4, s5, s6])
}

/// `x` is overwritten before being read after the suspension:
///
/// ```text
/// Over() {
///     int x = 1; log(x);
///     suspend Yield();
///     x = 2; log(x);
/// }
/// ```
pub(crate) fn overwritten_local(
    arena: &mut ExprArena,
    interner: &StringInterner,
) -> AsyncProcedure {
    let mut b = ProcBuilder::new(arena, interner, "Over");
    let x = b.local("x", Ty::Int);
    let one = b.int(1);
    let s0 = b.let_(x, one);
    let read = b.local_ref(x);
    let log = b.call_host("log", vec![read], Ty::Unit);
    let s1 = b.expr_stmt(log);
    let step = b.yield_frame();
    let s2 = b.suspend_stmt(step);
    let two = b.int(2);
    let s3 = b.assign(Place::Local(x), two);
    let read = b.local_ref(x);
    let log = b.call_host("log", vec![read], Ty::Unit);
    let s4 = b.expr_stmt(log);
    b.finish_block(vec![s0, s1, s2, s3, s4])
}
