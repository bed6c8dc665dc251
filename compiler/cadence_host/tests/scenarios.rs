//! End-to-end behavior of lowered procedures running on the reference host.

#![allow(clippy::unwrap_used, clippy::expect_used, reason = "Tests can panic")]

use std::cell::RefCell;
use std::rc::Rc;

use cadence_host::{Host, HostConfig, HostError, TaskState, Value};
use cadence_ir::builder::ProcBuilder;
use cadence_ir::machine::{StateMachineArtifact, TaskStatus};
use cadence_ir::{AsyncProcedure, ExprArena, Place, Primitive, StringInterner, Ty};
use cadence_lower::{lower_procedure, LowerOptions, LowerProblem};
use pretty_assertions::assert_eq;

// -- Fixtures --

/// `Seq() { log("A"); suspend Delay(1f); log("B"); suspend Yield(); log("C"); }`
fn seq(arena: &mut ExprArena, interner: &StringInterner) -> AsyncProcedure {
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
fn round_trip(arena: &mut ExprArena, interner: &StringInterner) -> AsyncProcedure {
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

/// `Cancellable(CancellationToken token) { log("A"); suspend Delay(1); log("B"); suspend Yield(); log("C"); }`
fn cancellable(arena: &mut ExprArena, interner: &StringInterner) -> AsyncProcedure {
    let mut b = ProcBuilder::new(arena, interner, "Cancellable");
    b.cancellation_param("token");
    let a = b.log("A");
    let delay = b.delay(1.0);
    let s1 = b.suspend_stmt(delay);
    let bb = b.log("B");
    let step = b.yield_frame();
    let s2 = b.suspend_stmt(step);
    let c = b.log("C");
    b.finish_block(vec![a, s1, bb, s2, c])
}

/// `int Inner() { suspend Delay(0.5); return 7; }`
fn inner(arena: &mut ExprArena, interner: &StringInterner) -> AsyncProcedure {
    let mut b = ProcBuilder::new(arena, interner, "Inner");
    b.returns(Ty::Int);
    let delay = b.delay(0.5);
    let s0 = b.suspend_stmt(delay);
    let seven = b.int(7);
    let s1 = b.return_(Some(seven));
    b.finish_block(vec![s0, s1])
}

/// `Outer() { int v = suspend Inner(); log(v); }`
fn outer(arena: &mut ExprArena, interner: &StringInterner) -> AsyncProcedure {
    let mut b = ProcBuilder::new(arena, interner, "Outer");
    let v = b.local("v", Ty::Int);
    let call = b.call_proc("Inner", Vec::new(), Ty::Int);
    let wait = b.suspend(call);
    let s0 = b.let_(v, wait);
    let read = b.local_ref(v);
    let log = b.call_host("log", vec![read], Ty::Unit);
    let s1 = b.expr_stmt(log);
    b.finish_block(vec![s0, s1])
}

fn lower(
    proc: &AsyncProcedure,
    arena: &ExprArena,
    interner: &StringInterner,
) -> StateMachineArtifact {
    lower_procedure(proc, arena, interner, &LowerOptions::default()).unwrap()
}

fn host_for<'i>(
    interner: &'i StringInterner,
    arena: &ExprArena,
    procs: &[AsyncProcedure],
) -> Host<'i> {
    let mut host = Host::new(interner);
    for proc in procs {
        host.load(lower(proc, arena, interner)).unwrap();
    }
    host
}

/// Register `name` as a host function that records its arguments.
fn recorder(host: &mut Host<'_>, name: &str) -> Rc<RefCell<Vec<Value>>> {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    host.register_fn(name, move |_, args| {
        sink.borrow_mut().extend(args.iter().cloned());
        Ok(Value::Unit)
    });
    seen
}

// -- Sequencing --

#[test]
fn seq_runs_one_segment_per_resume() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let proc = seq(&mut arena, &interner);
    let mut host = host_for(&interner, &arena, &[proc]);
    let obj = host.spawn_instance();

    let task = host.call(obj, "Seq", Vec::new()).unwrap();
    assert_eq!(host.messages(), vec!["A"]);
    assert_eq!(host.state_index(obj, "Seq").unwrap(), 1);
    assert_eq!(host.task_state(&task), Some(&TaskState::Pending));
    assert_eq!(host.scheduler().len(), 1);

    host.fire_pending(0).unwrap();
    assert_eq!(host.messages(), vec!["A", "B"]);
    assert_eq!(host.state_index(obj, "Seq").unwrap(), 2);

    host.fire_pending(0).unwrap();
    assert_eq!(host.messages(), vec!["A", "B", "C"]);
    assert_eq!(host.state_index(obj, "Seq").unwrap(), 2);
    assert_eq!(host.status(obj, "Seq").unwrap(), Some(TaskStatus::Succeeded));
    assert_eq!(host.task_state(&task), Some(&TaskState::Succeeded(Value::Unit)));
    assert!(host.scheduler().is_empty());
}

#[test]
fn firing_timers_honors_submission_and_clock() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let proc = seq(&mut arena, &interner);
    let mut host = host_for(&interner, &arena, &[proc]);
    let obj = host.spawn_instance();
    host.call(obj, "Seq", Vec::new()).unwrap();

    // The yield submitted by the second segment stays pending.
    assert_eq!(host.fire_all_timers().unwrap(), 1);
    assert_eq!(host.messages(), vec!["A", "B"]);
    assert!(host.scheduler().now() >= 1.0);
    assert_eq!(host.scheduler().len(), 1);

    assert_eq!(host.fire_all_timers().unwrap(), 1);
    assert_eq!(host.messages(), vec!["A", "B", "C"]);
}

#[test]
fn delays_wait_for_the_clock() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let proc = seq(&mut arena, &interner);
    let mut host = Host::with_config(
        &interner,
        HostConfig {
            frame_seconds: 0.5,
            ..HostConfig::default()
        },
    );
    host.load(lower(&proc, &arena, &interner)).unwrap();
    let obj = host.spawn_instance();
    host.call(obj, "Seq", Vec::new()).unwrap();

    assert_eq!(host.advance_frame().unwrap(), 0);
    assert_eq!(host.messages(), vec!["A"]);
    assert_eq!(host.advance_frame().unwrap(), 1);
    assert_eq!(host.messages(), vec!["A", "B"]);
    assert_eq!(host.advance_frame().unwrap(), 1);
    assert_eq!(host.messages(), vec!["A", "B", "C"]);
}

#[test]
fn parameters_survive_the_suspension() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let proc = round_trip(&mut arena, &interner);
    let mut host = host_for(&interner, &arena, &[proc]);
    let stored = recorder(&mut host, "store");
    let used = recorder(&mut host, "use");
    let obj = host.spawn_instance();

    host.call(obj, "P", vec![Value::Int(42)]).unwrap();
    assert_eq!(*stored.borrow(), vec![Value::Int(42)]);
    assert!(used.borrow().is_empty());
    assert_eq!(host.slot_value(obj, "P", "__P_x").unwrap(), Value::Int(42));

    host.run_until_idle().unwrap();
    assert_eq!(*used.borrow(), vec![Value::Int(42)]);
}

#[test]
fn procedure_without_suspensions_finishes_on_first_call() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let mut b = ProcBuilder::new(&mut arena, &interner, "Plain");
    let x = b.local("x", Ty::Int);
    let one = b.int(1);
    let s0 = b.let_(x, one);
    let read = b.local_ref(x);
    let log = b.call_host("log", vec![read], Ty::Unit);
    let s1 = b.expr_stmt(log);
    let proc = b.finish_block(vec![s0, s1]);

    let mut host = host_for(&interner, &arena, &[proc]);
    let obj = host.spawn_instance();
    let task = host.call(obj, "Plain", Vec::new()).unwrap();

    assert_eq!(host.messages(), vec!["1"]);
    assert_eq!(host.state_index(obj, "Plain").unwrap(), 0);
    assert_eq!(host.task_state(&task), Some(&TaskState::Succeeded(Value::Unit)));
    assert!(host.scheduler().is_empty());
}

#[test]
fn result_value_reaches_the_task_and_slot() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let proc = inner(&mut arena, &interner);
    let mut host = host_for(&interner, &arena, &[proc]);
    let obj = host.spawn_instance();

    let task = host.call(obj, "Inner", Vec::new()).unwrap();
    host.run_until_idle().unwrap();

    assert_eq!(host.task_state(&task), Some(&TaskState::Succeeded(Value::Int(7))));
    assert_eq!(host.slot_value(obj, "Inner", "__Inner_result").unwrap(), Value::Int(7));
}

// -- Terminal and out-of-range states --

#[test]
fn resuming_a_finished_activation_does_nothing() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let proc = seq(&mut arena, &interner);
    let mut host = host_for(&interner, &arena, &[proc]);
    let obj = host.spawn_instance();
    host.call(obj, "Seq", Vec::new()).unwrap();
    host.run_until_idle().unwrap();

    let handle = host.resume_handle(obj, "Seq").unwrap();
    host.resume(handle).unwrap();
    host.resume(handle).unwrap();

    assert_eq!(host.messages(), vec!["A", "B", "C"]);
    assert_eq!(host.state_index(obj, "Seq").unwrap(), 2);
    assert!(host.scheduler().is_empty());
}

#[test]
fn unknown_state_is_a_no_op() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let proc = seq(&mut arena, &interner);
    let mut host = host_for(&interner, &arena, &[proc]);
    let obj = host.spawn_instance();
    host.call(obj, "Seq", Vec::new()).unwrap();

    host.set_slot_value(obj, "Seq", "__Seq_state", Value::Int(99))
        .unwrap();
    let handle = host.resume_handle(obj, "Seq").unwrap();
    host.resume(handle).unwrap();

    assert_eq!(host.messages(), vec!["A"]);
    assert_eq!(host.state_index(obj, "Seq").unwrap(), 99);
    assert_eq!(host.status(obj, "Seq").unwrap(), Some(TaskStatus::Running));
}

// -- Instances --

#[test]
fn instances_keep_separate_state() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let proc = round_trip(&mut arena, &interner);
    let mut host = host_for(&interner, &arena, &[proc]);
    let stored = recorder(&mut host, "store");
    let used = recorder(&mut host, "use");
    let first = host.spawn_instance();
    let second = host.spawn_instance();

    host.call(first, "P", vec![Value::Int(1)]).unwrap();
    host.call(second, "P", vec![Value::Int(2)]).unwrap();
    assert_eq!(*stored.borrow(), vec![Value::Int(1), Value::Int(2)]);
    assert_eq!(host.slot_value(first, "P", "__P_x").unwrap(), Value::Int(1));
    assert_eq!(host.slot_value(second, "P", "__P_x").unwrap(), Value::Int(2));

    host.run_until_idle().unwrap();
    assert_eq!(*used.borrow(), vec![Value::Int(1), Value::Int(2)]);
}

#[test]
fn reentry_abandons_the_earlier_activation() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let proc = seq(&mut arena, &interner);
    let mut host = host_for(&interner, &arena, &[proc]);
    let obj = host.spawn_instance();

    let first = host.call(obj, "Seq", Vec::new()).unwrap();
    let second = host.call(obj, "Seq", Vec::new()).unwrap();
    assert_eq!(host.messages(), vec!["A", "A"]);
    assert_eq!(host.scheduler().len(), 1);

    host.run_until_idle().unwrap();
    assert_eq!(host.messages(), vec!["A", "A", "B", "C"]);
    assert_eq!(host.task_state(&first), Some(&TaskState::Pending));
    assert_eq!(
        host.task_state(&second),
        Some(&TaskState::Succeeded(Value::Unit))
    );
}

// -- Cancellation --

#[test]
fn cancellation_takes_effect_at_the_next_resume() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let proc = cancellable(&mut arena, &interner);
    let mut host = host_for(&interner, &arena, &[proc]);
    let obj = host.spawn_instance();
    let token = host.new_cancel_token();

    let task = host.call(obj, "Cancellable", vec![token.clone()]).unwrap();
    assert_eq!(host.messages(), vec!["A"]);

    host.cancel(&token).unwrap();
    host.run_until_idle().unwrap();

    assert_eq!(host.messages(), vec!["A"]);
    assert_eq!(host.task_state(&task), Some(&TaskState::Cancelled));
    assert_eq!(
        host.status(obj, "Cancellable").unwrap(),
        Some(TaskStatus::Cancelled)
    );
    assert!(host.scheduler().is_empty());
}

#[test]
fn cancelled_before_start_runs_nothing() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let proc = cancellable(&mut arena, &interner);
    let mut host = host_for(&interner, &arena, &[proc]);
    let obj = host.spawn_instance();
    let token = host.new_cancel_token();
    host.cancel(&token).unwrap();

    let task = host.call(obj, "Cancellable", vec![token]).unwrap();

    assert!(host.messages().is_empty());
    assert_eq!(host.task_state(&task), Some(&TaskState::Cancelled));
    assert!(host.scheduler().is_empty());
}

#[test]
fn cancelling_a_non_token_is_an_error() {
    let interner = StringInterner::new();
    let mut host = Host::new(&interner);
    assert_eq!(
        host.cancel(&Value::Int(3)),
        Err(HostError::TypeMismatch {
            expected: "cancellation token",
            found: "int",
        })
    );
}

// -- Delegation and joins --

#[test]
fn delegation_delivers_the_inner_result() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let procs = [inner(&mut arena, &interner), outer(&mut arena, &interner)];
    let mut host = host_for(&interner, &arena, &procs);
    let obj = host.spawn_instance();

    let task = host.call(obj, "Outer", Vec::new()).unwrap();
    assert!(host.messages().is_empty());
    assert_eq!(host.state_index(obj, "Outer").unwrap(), 1);

    host.run_until_idle().unwrap();
    assert_eq!(host.messages(), vec!["7"]);
    assert_eq!(host.task_state(&task), Some(&TaskState::Succeeded(Value::Unit)));
}

#[test]
fn early_completion_dispatch_waits_again() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let procs = [inner(&mut arena, &interner), outer(&mut arena, &interner)];
    let mut host = host_for(&interner, &arena, &procs);
    let obj = host.spawn_instance();
    host.call(obj, "Outer", Vec::new()).unwrap();

    // [Inner's delay, Outer's completion request]
    assert_eq!(host.scheduler().len(), 2);
    host.fire_pending(1).unwrap();

    assert!(host.messages().is_empty());
    assert_eq!(host.state_index(obj, "Outer").unwrap(), 1);
    assert_eq!(host.scheduler().len(), 2);

    host.run_until_idle().unwrap();
    assert_eq!(host.messages(), vec!["7"]);
}

#[test]
fn delivery_into_a_field() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let first = inner(&mut arena, &interner);
    let mut b = ProcBuilder::new(&mut arena, &interner, "Scorer");
    let score = b.intern("score");
    let call = b.call_proc("Inner", Vec::new(), Ty::Int);
    let wait = b.suspend(call);
    let s0 = b.assign(Place::Field(score), wait);
    let second = b.finish_block(vec![s0]);

    let mut host = host_for(&interner, &arena, &[first, second]);
    let obj = host.spawn_instance();
    host.call(obj, "Scorer", Vec::new()).unwrap();
    assert_eq!(host.field(obj, "score").unwrap(), None);

    host.run_until_idle().unwrap();
    assert_eq!(host.field(obj, "score").unwrap(), Some(&Value::Int(7)));
}

#[test]
fn when_any_delivers_the_first_finisher() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let mut b = ProcBuilder::new(&mut arena, &interner, "Race");
    let first = b.local("first", Ty::Int);
    let slow = b.delay(2.0);
    let fast = b.delay(0.5);
    let any = b.primitive(Primitive::WhenAny, vec![slow, fast]);
    let wait = b.suspend(any);
    let s0 = b.let_(first, wait);
    let read = b.local_ref(first);
    let log = b.call_host("log", vec![read], Ty::Unit);
    let s1 = b.expr_stmt(log);
    let proc = b.finish_block(vec![s0, s1]);

    let mut host = host_for(&interner, &arena, &[proc]);
    let obj = host.spawn_instance();
    host.call(obj, "Race", Vec::new()).unwrap();

    host.advance_seconds(0.5).unwrap();
    assert_eq!(host.messages(), vec!["1"]);
    assert_eq!(host.status(obj, "Race").unwrap(), Some(TaskStatus::Succeeded));
}

#[test]
fn when_all_waits_for_every_operand() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let mut b = ProcBuilder::new(&mut arena, &interner, "Both");
    let slow = b.delay(1.0);
    let fast = b.delay(0.25);
    let all = b.primitive(Primitive::WhenAll, vec![slow, fast]);
    let s0 = b.suspend_stmt(all);
    let s1 = b.log("both");
    let proc = b.finish_block(vec![s0, s1]);

    let mut host = host_for(&interner, &arena, &[proc]);
    let obj = host.spawn_instance();
    host.call(obj, "Both", Vec::new()).unwrap();

    host.advance_seconds(0.5).unwrap();
    assert!(host.messages().is_empty());
    host.advance_seconds(0.5).unwrap();
    assert_eq!(host.messages(), vec!["both"]);
}

// -- Closures --

#[test]
fn closures_read_hoisted_parameters() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let mut b = ProcBuilder::new(&mut arena, &interner, "Register");
    let n = b.param("n", Ty::Int);
    let read = b.param_ref(n);
    let log = b.call_host("log", vec![read], Ty::Unit);
    let body = b.expr_stmt(log);
    let lambda = b.lambda(vec![body]);
    let register = b.call_host("register", vec![lambda], Ty::Unit);
    let s0 = b.expr_stmt(register);
    let step = b.yield_frame();
    let s1 = b.suspend_stmt(step);
    let proc = b.finish_block(vec![s0, s1]);

    let mut host = host_for(&interner, &arena, &[proc]);
    let registered = recorder(&mut host, "register");
    let obj = host.spawn_instance();
    host.call(obj, "Register", vec![Value::Int(5)]).unwrap();
    host.run_until_idle().unwrap();

    let closure = registered.borrow()[0].clone();
    host.call_closure(&closure).unwrap();
    assert_eq!(host.messages(), vec!["5"]);
}

#[test]
fn suspension_inside_a_closure_is_never_lowered() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let mut b = ProcBuilder::new(&mut arena, &interner, "Spawn");
    let delay = b.delay(1.0);
    let inner = b.suspend_stmt(delay);
    let lambda = b.lambda(vec![inner]);
    let register = b.call_host("register", vec![lambda], Ty::Unit);
    let stmt = b.expr_stmt(register);
    let proc = b.finish_block(vec![stmt]);

    let failure = lower_procedure(&proc, &arena, &interner, &LowerOptions::default()).unwrap_err();
    assert!(matches!(
        failure.problems.as_slice(),
        [LowerProblem::SuspendInClosure { .. }]
    ));

    let mut host = Host::new(&interner);
    let obj = host.spawn_instance();
    assert_eq!(
        host.call(obj, "Spawn", Vec::new()),
        Err(HostError::UnknownProcedure("Spawn".to_owned()))
    );
}

// -- Liveness modes --

#[test]
fn liveness_modes_run_the_same() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let mut b = ProcBuilder::new(&mut arena, &interner, "Over");
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
    let proc = b.finish_block(vec![s0, s1, s2, s3, s4]);

    let mut logs = Vec::new();
    for options in [LowerOptions::default(), LowerOptions::dataflow()] {
        let artifact = lower_procedure(&proc, &arena, &interner, &options).unwrap();
        let mut host = Host::new(&interner);
        host.load(artifact).unwrap();
        let obj = host.spawn_instance();
        host.call(obj, "Over", Vec::new()).unwrap();
        host.run_until_idle().unwrap();
        logs.push(host.messages().join(","));
    }
    assert_eq!(logs, vec!["1,2".to_owned(), "1,2".to_owned()]);
}

// -- Loading and guards --

#[test]
fn loading_rejects_duplicates_and_tampered_artifacts() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let proc = seq(&mut arena, &interner);
    let mut host = Host::new(&interner);
    host.load(lower(&proc, &arena, &interner)).unwrap();
    assert_eq!(
        host.load(lower(&proc, &arena, &interner)),
        Err(HostError::DuplicateProcedure("Seq".to_owned()))
    );

    let mut tampered = lower(&proc, &arena, &interner);
    tampered.state_count += 1;
    let mut fresh = Host::new(&interner);
    assert!(matches!(
        fresh.load(tampered),
        Err(HostError::InvalidArtifact { procedure, .. }) if procedure == "Seq"
    ));
}

#[test]
fn calls_check_arity() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let proc = round_trip(&mut arena, &interner);
    let mut host = host_for(&interner, &arena, &[proc]);
    let obj = host.spawn_instance();
    assert_eq!(
        host.call(obj, "P", Vec::new()),
        Err(HostError::ArityMismatch {
            procedure: "P".to_owned(),
            expected: 1,
            got: 0,
        })
    );
}

#[test]
fn runaway_dispatch_is_cut_off() {
    let interner = StringInterner::new();
    let mut arena = ExprArena::new();
    let proc = seq(&mut arena, &interner);
    let mut host = Host::with_config(
        &interner,
        HostConfig {
            max_dispatch_per_tick: 1,
            ..HostConfig::default()
        },
    );
    host.load(lower(&proc, &arena, &interner)).unwrap();
    let first = host.spawn_instance();
    let second = host.spawn_instance();
    host.call(first, "Seq", Vec::new()).unwrap();
    host.call(second, "Seq", Vec::new()).unwrap();

    assert_eq!(
        host.advance_seconds(1.0),
        Err(HostError::RunawaySchedule { limit: 1 })
    );
}
