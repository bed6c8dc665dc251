//! Machine IR interpreter.
//!
//! Runs one entry or dispatch procedure to completion. Nothing in machine
//! IR blocks: waiting is a `Schedule` request handed to the scheduler
//! followed by a plain return.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use cadence_ir::machine::{
    DispatchTarget, JoinMode, MachExprKind, MachPlace, MachStmtKind, TaskStatus, Timing,
};
use cadence_ir::{
    BinaryOp, CallTarget, LocalId, MachExprId, MachStmtId, MachStmtRange, Name, Primitive, SlotId,
    StringInterner, UnaryOp,
};
use cadence_stack::ensure_sufficient_stack;

use crate::runtime::{
    first_done, tasks_done, Closure, LogEntry, ProcEntry, Program, Role, Runtime, TaskKind,
    TaskState,
};
use crate::scheduler::{Action, Due, ResumeHandle};
use crate::value::{ClosureId, InstanceId, ProcIndex, TaskId, Value};
use crate::HostError;

type EvalResult<T = Value> = Result<T, HostError>;

/// How a statement left its block.
enum Flow {
    Next,
    Break,
    Continue,
    Return(Value),
    Finished,
}

/// Activation record of one running procedure or closure.
struct Frame {
    instance: InstanceId,
    program: usize,
    params: Vec<Value>,
    locals: FxHashMap<LocalId, Value>,
}

pub(crate) struct Interp<'a> {
    pub programs: &'a [Program],
    pub procs: &'a [ProcEntry],
    pub by_name: &'a FxHashMap<Name, ProcIndex>,
    pub interner: &'a StringInterner,
    pub rt: &'a mut Runtime,
}

impl Interp<'_> {
    // ── Procedures ──────────────────────────────────────────────────

    pub fn run_proc(&mut self, proc: ProcIndex, instance: InstanceId, args: Vec<Value>) -> EvalResult {
        ensure_sufficient_stack(|| self.run_proc_inner(proc, instance, args))
    }

    fn run_proc_inner(
        &mut self,
        proc: ProcIndex,
        instance: InstanceId,
        args: Vec<Value>,
    ) -> EvalResult {
        let programs = self.programs;
        let entry = self
            .procs
            .get(proc.index())
            .copied()
            .ok_or_else(|| HostError::UnknownProcedure(format!("{proc:?}")))?;
        let program = &programs[entry.program];
        let artifact = &program.artifact;

        let (body, expected) = match entry.role {
            Role::Entry => (artifact.entry.body, artifact.params.len()),
            Role::Dispatch => (artifact.dispatch.body, 0),
        };
        if args.len() != expected {
            return Err(HostError::ArityMismatch {
                procedure: program.name.clone(),
                expected,
                got: args.len(),
            });
        }
        if entry.role == Role::Entry {
            let task = self.rt.new_task(TaskKind::Activation);
            self.rt.storage_mut(instance, entry.program, artifact)?.task = Some(task);
        }

        tracing::trace!(
            procedure = %program.name,
            role = ?entry.role,
            instance = instance.index(),
            "entering procedure"
        );
        let mut frame = Frame {
            instance,
            program: entry.program,
            params: args,
            locals: FxHashMap::default(),
        };
        match self.block(&mut frame, body)? {
            Flow::Return(value) => Ok(value),
            Flow::Next | Flow::Finished => Ok(Value::Unit),
            Flow::Break | Flow::Continue => Err(HostError::StrayLoopControl),
        }
    }

    pub fn run_closure(&mut self, closure: ClosureId) -> EvalResult {
        let Some(closure) = self.rt.closures.get(closure.index()).cloned() else {
            return Err(HostError::type_mismatch("closure", &Value::Unit));
        };
        let Closure {
            instance,
            program,
            body,
            params,
            locals,
        } = closure;
        let mut frame = Frame {
            instance,
            program,
            params,
            locals,
        };
        match self.block(&mut frame, body)? {
            Flow::Return(value) => Ok(value),
            Flow::Next | Flow::Finished => Ok(Value::Unit),
            Flow::Break | Flow::Continue => Err(HostError::StrayLoopControl),
        }
    }

    fn check_target(&self, frame: &Frame, target: DispatchTarget) -> EvalResult<ProcIndex> {
        let program = &self.programs[frame.program];
        if target != program.artifact.dispatch_target() {
            return Err(HostError::ForeignDispatch {
                expected: self
                    .interner
                    .lookup(program.artifact.dispatch.name)
                    .to_owned(),
                found: self.interner.lookup(target.procedure).to_owned(),
            });
        }
        Ok(program.dispatch)
    }

    // ── Statements ──────────────────────────────────────────────────

    fn block(&mut self, frame: &mut Frame, range: MachStmtRange) -> EvalResult<Flow> {
        let programs = self.programs;
        let arena = &programs[frame.program].artifact.arena;
        for &id in arena.stmt_list(range) {
            match self.stmt(frame, id)? {
                Flow::Next => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Next)
    }

    fn stmt(&mut self, frame: &mut Frame, id: MachStmtId) -> EvalResult<Flow> {
        let programs = self.programs;
        let artifact = &programs[frame.program].artifact;
        match &artifact.arena.stmt(id).kind {
            MachStmtKind::Expr(expr) => {
                self.eval(frame, *expr)?;
            }
            MachStmtKind::Let { local, init } => {
                let value = if init.is_valid() {
                    self.eval(frame, *init)?
                } else {
                    artifact
                        .locals
                        .iter()
                        .find(|decl| decl.id == *local)
                        .map_or(Value::Unit, |decl| Value::default_for(&decl.ty))
                };
                frame.locals.insert(*local, value);
            }
            MachStmtKind::Assign { target, value } => {
                let value = self.eval(frame, *value)?;
                self.write(frame, *target, value)?;
            }
            MachStmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let branch = if self.eval_bool(frame, *cond)? {
                    *then_branch
                } else {
                    *else_branch
                };
                return self.block(frame, branch);
            }
            MachStmtKind::While { cond, body } => {
                while self.eval_bool(frame, *cond)? {
                    match self.block(frame, *body)? {
                        Flow::Next | Flow::Continue => {}
                        Flow::Break => break,
                        flow => return Ok(flow),
                    }
                }
            }
            MachStmtKind::Break => return Ok(Flow::Break),
            MachStmtKind::Continue => return Ok(Flow::Continue),
            MachStmtKind::Return(value) => {
                let value = self.opt_eval(frame, *value)?.unwrap_or_default();
                return Ok(Flow::Return(value));
            }
            MachStmtKind::SetState(state) => {
                self.write_slot(frame, artifact.state_slot, Value::Int(i64::from(*state)))?;
            }
            MachStmtKind::Schedule { target, timing } => {
                let dispatch = self.check_target(frame, *target)?;
                let due = self.due(frame, timing)?;
                let handle = ResumeHandle {
                    instance: frame.instance,
                    procedure: dispatch,
                };
                self.rt.scheduler.submit(due, Action::Resume(handle));
            }
            MachStmtKind::Invoke(target) => {
                let dispatch = self.check_target(frame, *target)?;
                self.run_proc(dispatch, frame.instance, Vec::new())?;
            }
            MachStmtKind::Finish { status, value } => {
                self.finish(frame, *status, *value)?;
                return Ok(Flow::Finished);
            }
            MachStmtKind::ReturnTask => {
                let task = self
                    .rt
                    .storage_mut(frame.instance, frame.program, artifact)?
                    .task;
                return Ok(Flow::Return(task.map_or(Value::Unit, Value::Task)));
            }
            MachStmtKind::Switch { scrutinee, arms } => {
                let value = self.read_slot(frame, *scrutinee)?;
                let state = value
                    .as_int()
                    .ok_or_else(|| HostError::type_mismatch("int", &value))?;
                match arms.iter().find(|arm| i64::from(arm.value) == state) {
                    Some(arm) => return self.block(frame, arm.body),
                    None => tracing::trace!(state, "no arm for state"),
                }
            }
        }
        Ok(Flow::Next)
    }

    fn finish(&mut self, frame: &Frame, status: TaskStatus, value: MachExprId) -> EvalResult<()> {
        let programs = self.programs;
        let artifact = &programs[frame.program].artifact;

        let value = self.opt_eval(frame, value)?;
        let result = match (artifact.result_slot, value) {
            (Some(slot), Some(value)) => {
                self.write_slot(frame, slot, value.clone())?;
                value
            }
            (Some(slot), None) => self.read_slot(frame, slot)?,
            (None, value) => value.unwrap_or_default(),
        };
        self.write_slot(frame, artifact.status_slot, Value::Int(status.code()))?;

        let task = self
            .rt
            .storage_mut(frame.instance, frame.program, artifact)?
            .task;
        if let Some(task) = task {
            let state = match status {
                TaskStatus::Succeeded => TaskState::Succeeded(result),
                TaskStatus::Cancelled => TaskState::Cancelled,
                TaskStatus::Running => return Ok(()),
            };
            self.rt.complete(task, state);
        }
        tracing::debug!(
            procedure = %programs[frame.program].name,
            instance = frame.instance.index(),
            ?status,
            "activation finished"
        );
        Ok(())
    }

    fn due(&mut self, frame: &Frame, timing: &Timing) -> EvalResult<Due> {
        Ok(match timing {
            Timing::Seconds(expr) => {
                let value = self.eval(frame, *expr)?;
                let seconds = value
                    .as_f64()
                    .ok_or_else(|| HostError::type_mismatch("number", &value))?;
                self.rt.scheduler.after_seconds(seconds)
            }
            Timing::Frames(expr) => {
                let value = self.eval(frame, *expr)?;
                let frames = value
                    .as_int()
                    .ok_or_else(|| HostError::type_mismatch("int", &value))?;
                self.rt.scheduler.after_frames(frames)
            }
            Timing::NextFrame => self.rt.scheduler.after_frames(1),
            Timing::Completion { tasks, mode } => Due::Completion {
                tasks: self.task_slots(frame, tasks)?,
                mode: *mode,
            },
        })
    }

    // ── Places ──────────────────────────────────────────────────────

    fn write(&mut self, frame: &mut Frame, place: MachPlace, value: Value) -> EvalResult<()> {
        match place {
            MachPlace::Local(local) => {
                frame.locals.insert(local, value);
            }
            MachPlace::Param(index) => {
                let slot = frame
                    .params
                    .get_mut(index as usize)
                    .ok_or(HostError::MissingParam(index))?;
                *slot = value;
            }
            MachPlace::Field(name) => {
                self.rt
                    .instance_mut(frame.instance)?
                    .fields
                    .insert(name, value);
            }
            MachPlace::Slot(slot) => self.write_slot(frame, slot, value)?,
        }
        Ok(())
    }

    fn write_slot(&mut self, frame: &Frame, slot: SlotId, value: Value) -> EvalResult<()> {
        let programs = self.programs;
        let artifact = &programs[frame.program].artifact;
        let storage = self.rt.storage_mut(frame.instance, frame.program, artifact)?;
        match storage.slots.get_mut(slot.index()) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(self.unknown_slot(frame, slot)),
        }
    }

    fn read_slot(&mut self, frame: &Frame, slot: SlotId) -> EvalResult {
        let programs = self.programs;
        let artifact = &programs[frame.program].artifact;
        let storage = self.rt.storage_mut(frame.instance, frame.program, artifact)?;
        match storage.slots.get(slot.index()) {
            Some(value) => Ok(value.clone()),
            None => Err(self.unknown_slot(frame, slot)),
        }
    }

    fn unknown_slot(&self, frame: &Frame, slot: SlotId) -> HostError {
        HostError::UnknownSlot {
            procedure: self.programs[frame.program].name.clone(),
            slot: format!("{slot:?}"),
        }
    }

    fn task_slots(&mut self, frame: &Frame, slots: &[SlotId]) -> EvalResult<SmallVec<[TaskId; 2]>> {
        slots
            .iter()
            .map(|&slot| {
                let value = self.read_slot(frame, slot)?;
                value
                    .as_task()
                    .ok_or_else(|| HostError::type_mismatch("task", &value))
            })
            .collect()
    }

    // ── Expressions ─────────────────────────────────────────────────

    fn opt_eval(&mut self, frame: &Frame, id: MachExprId) -> EvalResult<Option<Value>> {
        if id.is_valid() {
            self.eval(frame, id).map(Some)
        } else {
            Ok(None)
        }
    }

    fn eval_bool(&mut self, frame: &Frame, id: MachExprId) -> EvalResult<bool> {
        let value = self.eval(frame, id)?;
        value
            .as_bool()
            .ok_or_else(|| HostError::type_mismatch("bool", &value))
    }

    fn eval(&mut self, frame: &Frame, id: MachExprId) -> EvalResult {
        ensure_sufficient_stack(|| self.eval_inner(frame, id))
    }

    fn eval_inner(&mut self, frame: &Frame, id: MachExprId) -> EvalResult {
        let programs = self.programs;
        let arena = &programs[frame.program].artifact.arena;
        match &arena.expr(id).kind {
            MachExprKind::Int(v) => Ok(Value::Int(*v)),
            MachExprKind::Float(bits) => Ok(Value::Float(f64::from_bits(*bits))),
            MachExprKind::Bool(v) => Ok(Value::Bool(*v)),
            MachExprKind::Str(name) => Ok(Value::Str(self.interner.lookup(*name).to_owned())),
            MachExprKind::Unit => Ok(Value::Unit),
            MachExprKind::Local(local) => frame
                .locals
                .get(local)
                .cloned()
                .ok_or(HostError::UninitializedLocal),
            MachExprKind::Param(index) => frame
                .params
                .get(*index as usize)
                .cloned()
                .ok_or(HostError::MissingParam(*index)),
            MachExprKind::Field(name) => self
                .rt
                .instance(frame.instance)?
                .fields
                .get(name)
                .cloned()
                .ok_or_else(|| HostError::UnknownField(self.interner.lookup(*name).to_owned())),
            MachExprKind::Slot(slot) => self.read_slot(frame, *slot),
            MachExprKind::Binary { op, left, right } => self.binary_expr(frame, *op, *left, *right),
            MachExprKind::Unary { op, operand } => {
                let value = self.eval(frame, *operand)?;
                unary(*op, value)
            }
            MachExprKind::Call { target, args } => {
                let args = arena
                    .expr_list(*args)
                    .iter()
                    .map(|&arg| self.eval(frame, arg))
                    .collect::<EvalResult<Vec<_>>>()?;
                self.call(frame, *target, args)
            }
            MachExprKind::Lambda { body } => {
                let id = ClosureId::new(self.rt.closures.len());
                self.rt.closures.push(Closure {
                    instance: frame.instance,
                    program: frame.program,
                    body: *body,
                    params: frame.params.clone(),
                    locals: frame.locals.clone(),
                });
                Ok(Value::Closure(id))
            }
            MachExprKind::TasksDone { tasks, mode } => {
                let ids = self.task_slots(frame, tasks)?;
                Ok(Value::Bool(tasks_done(&self.rt.tasks, &ids, *mode)))
            }
            MachExprKind::TaskValue { tasks, mode } => {
                let ids = self.task_slots(frame, tasks)?;
                self.task_value(&ids, *mode)
            }
            MachExprKind::CancelRequested(slot) => match self.read_slot(frame, *slot)? {
                Value::Cancel(token) => Ok(Value::Bool(
                    self.rt.tokens.get(token.index()).copied().unwrap_or(false),
                )),
                Value::Unit => Ok(Value::Bool(false)),
                other => Err(HostError::type_mismatch("cancellation token", &other)),
            },
            MachExprKind::Error => Err(HostError::ErrorNode),
        }
    }

    fn binary_expr(
        &mut self,
        frame: &Frame,
        op: BinaryOp,
        left: MachExprId,
        right: MachExprId,
    ) -> EvalResult {
        match op {
            BinaryOp::And => Ok(Value::Bool(
                self.eval_bool(frame, left)? && self.eval_bool(frame, right)?,
            )),
            BinaryOp::Or => Ok(Value::Bool(
                self.eval_bool(frame, left)? || self.eval_bool(frame, right)?,
            )),
            _ => {
                let left = self.eval(frame, left)?;
                let right = self.eval(frame, right)?;
                binary(op, left, right)
            }
        }
    }

    fn task_value(&self, ids: &[TaskId], mode: JoinMode) -> EvalResult {
        match mode {
            JoinMode::Any => first_done(&self.rt.tasks, ids)
                .map(Value::Int)
                .ok_or(HostError::TaskNotDone),
            JoinMode::All => match ids {
                [task] => match self.rt.task(*task).map(|t| &t.state) {
                    Some(TaskState::Succeeded(value)) => Ok(value.clone()),
                    Some(TaskState::Cancelled) => Ok(Value::Unit),
                    Some(TaskState::Pending) | None => Err(HostError::TaskNotDone),
                },
                _ if tasks_done(&self.rt.tasks, ids, JoinMode::All) => Ok(Value::Unit),
                _ => Err(HostError::TaskNotDone),
            },
        }
    }

    // ── Calls ───────────────────────────────────────────────────────

    fn call(&mut self, frame: &Frame, target: CallTarget, args: Vec<Value>) -> EvalResult {
        match target {
            CallTarget::Primitive(primitive) => self.primitive(primitive, &args),
            CallTarget::Procedure(name) => {
                let proc = self.by_name.get(&name).copied().ok_or_else(|| {
                    HostError::UnknownProcedure(self.interner.lookup(name).to_owned())
                })?;
                self.run_proc(proc, frame.instance, args)
            }
            CallTarget::Host(name) => self.host_fn(frame.instance, name, &args),
        }
    }

    fn primitive(&mut self, primitive: Primitive, args: &[Value]) -> EvalResult {
        let first = args.first().cloned().unwrap_or_default();
        let due = match primitive {
            Primitive::Delay => {
                let seconds = first
                    .as_f64()
                    .ok_or_else(|| HostError::type_mismatch("number", &first))?;
                self.rt.scheduler.after_seconds(seconds)
            }
            Primitive::DelayFrames => {
                let frames = first
                    .as_int()
                    .ok_or_else(|| HostError::type_mismatch("int", &first))?;
                self.rt.scheduler.after_frames(frames)
            }
            Primitive::Yield => self.rt.scheduler.after_frames(1),
            Primitive::WhenAll | Primitive::WhenAny => {
                let mode = if primitive == Primitive::WhenAll {
                    JoinMode::All
                } else {
                    JoinMode::Any
                };
                let tasks = args
                    .iter()
                    .map(|arg| {
                        arg.as_task()
                            .ok_or_else(|| HostError::type_mismatch("task", arg))
                    })
                    .collect::<EvalResult<SmallVec<[TaskId; 2]>>>()?;
                let task = self.rt.new_task(TaskKind::Join {
                    tasks: tasks.clone(),
                    mode,
                });
                self.rt
                    .scheduler
                    .submit(Due::Completion { tasks, mode }, Action::Complete(task));
                return Ok(Value::Task(task));
            }
        };
        let task = self.rt.new_task(TaskKind::Timer);
        self.rt.scheduler.submit(due, Action::Complete(task));
        Ok(Value::Task(task))
    }

    fn host_fn(&mut self, instance: InstanceId, name: Name, args: &[Value]) -> EvalResult {
        if let Some(function) = self.rt.functions.get_mut(&name) {
            return function(instance, args);
        }
        match self.interner.lookup(name) {
            "log" => {
                let message = args
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                tracing::debug!(instance = instance.index(), %message, "log");
                self.rt.log.push(LogEntry { instance, message });
                Ok(Value::Unit)
            }
            other => Err(HostError::UnknownFunction(other.to_owned())),
        }
    }
}

// ── Operators ───────────────────────────────────────────────────────

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Int(_), Value::Float(_)) | (Value::Float(_), Value::Int(_)) => {
            left.as_f64() == right.as_f64()
        }
        _ => left == right,
    }
}

pub(crate) fn binary(op: BinaryOp, left: Value, right: Value) -> EvalResult {
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(values_equal(&left, &right))),
        BinaryOp::NotEq => return Ok(Value::Bool(!values_equal(&left, &right))),
        BinaryOp::And | BinaryOp::Or => {
            return match (left.as_bool(), right.as_bool()) {
                (Some(a), Some(b)) => Ok(Value::Bool(if op == BinaryOp::And {
                    a && b
                } else {
                    a || b
                })),
                (None, _) => Err(HostError::type_mismatch("bool", &left)),
                (_, None) => Err(HostError::type_mismatch("bool", &right)),
            };
        }
        _ => {}
    }
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => int_op(op, a, b),
        (Value::Str(a), right) if op == BinaryOp::Add => Ok(Value::Str(format!("{a}{right}"))),
        (left, right) => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => float_op(op, a, b),
            (None, _) => Err(HostError::type_mismatch("number", &left)),
            (_, None) => Err(HostError::type_mismatch("number", &right)),
        },
    }
}

fn int_op(op: BinaryOp, a: i64, b: i64) -> EvalResult {
    Ok(match op {
        BinaryOp::Add => Value::Int(a.wrapping_add(b)),
        BinaryOp::Sub => Value::Int(a.wrapping_sub(b)),
        BinaryOp::Mul => Value::Int(a.wrapping_mul(b)),
        BinaryOp::Div | BinaryOp::Rem if b == 0 => return Err(HostError::DivisionByZero),
        BinaryOp::Div => Value::Int(a.wrapping_div(b)),
        BinaryOp::Rem => Value::Int(a.wrapping_rem(b)),
        BinaryOp::Lt => Value::Bool(a < b),
        BinaryOp::LtEq => Value::Bool(a <= b),
        BinaryOp::Gt => Value::Bool(a > b),
        BinaryOp::GtEq => Value::Bool(a >= b),
        BinaryOp::Eq => Value::Bool(a == b),
        BinaryOp::NotEq => Value::Bool(a != b),
        BinaryOp::And | BinaryOp::Or => {
            return Err(HostError::type_mismatch("bool", &Value::Int(a)))
        }
    })
}

fn float_op(op: BinaryOp, a: f64, b: f64) -> EvalResult {
    Ok(match op {
        BinaryOp::Add => Value::Float(a + b),
        BinaryOp::Sub => Value::Float(a - b),
        BinaryOp::Mul => Value::Float(a * b),
        BinaryOp::Div => Value::Float(a / b),
        BinaryOp::Rem => Value::Float(a % b),
        BinaryOp::Lt => Value::Bool(a < b),
        BinaryOp::LtEq => Value::Bool(a <= b),
        BinaryOp::Gt => Value::Bool(a > b),
        BinaryOp::GtEq => Value::Bool(a >= b),
        BinaryOp::Eq => Value::Bool(a == b),
        BinaryOp::NotEq => Value::Bool(a != b),
        BinaryOp::And | BinaryOp::Or => {
            return Err(HostError::type_mismatch("bool", &Value::Float(a)))
        }
    })
}

pub(crate) fn unary(op: UnaryOp, value: Value) -> EvalResult {
    match (op, value) {
        (UnaryOp::Neg, Value::Int(v)) => Ok(Value::Int(v.wrapping_neg())),
        (UnaryOp::Neg, Value::Float(v)) => Ok(Value::Float(-v)),
        (UnaryOp::Not, Value::Bool(v)) => Ok(Value::Bool(!v)),
        (UnaryOp::Neg, other) => Err(HostError::type_mismatch("number", &other)),
        (UnaryOp::Not, other) => Err(HostError::type_mismatch("bool", &other)),
    }
}

#[cfg(test)]
mod tests;
