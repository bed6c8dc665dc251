//! The reference host.
//!
//! Loads lowered artifacts, owns per-instance storage and drives the
//! [`TestScheduler`]. Every `DispatchTarget` is resolved to a procedure
//! index once, when its artifact is loaded; firing a request never looks
//! a procedure up by name.

use rustc_hash::FxHashMap;

use cadence_ir::machine::{StateMachineArtifact, TaskStatus};
use cadence_ir::{Name, SlotId, StringInterner};

use crate::interp::Interp;
use crate::runtime::{tasks_done, Instance, LogEntry, ProcEntry, Program, Role, Runtime, TaskState};
use crate::scheduler::{Action, Request, ResumeHandle, TestScheduler};
use crate::value::{InstanceId, ProcIndex, Value};
use crate::HostError;

/// Frames `run_until_idle` will advance before giving up.
const IDLE_FRAME_LIMIT: u64 = 100_000;

/// Host configuration.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HostConfig {
    /// Clock time that passes per frame.
    pub frame_seconds: f64,
    /// Most requests that may fire in one scheduler step. Guards against
    /// zero-delay rescheduling loops.
    pub max_dispatch_per_tick: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            frame_seconds: 1.0 / 60.0,
            max_dispatch_per_tick: 10_000,
        }
    }
}

pub struct Host<'i> {
    interner: &'i StringInterner,
    programs: Vec<Program>,
    procs: Vec<ProcEntry>,
    by_name: FxHashMap<Name, ProcIndex>,
    rt: Runtime,
}

impl<'i> Host<'i> {
    pub fn new(interner: &'i StringInterner) -> Self {
        Self::with_config(interner, HostConfig::default())
    }

    pub fn with_config(interner: &'i StringInterner, config: HostConfig) -> Self {
        Host {
            interner,
            programs: Vec::new(),
            procs: Vec::new(),
            by_name: FxHashMap::default(),
            rt: Runtime::new(config),
        }
    }

    pub fn config(&self) -> HostConfig {
        self.rt.config
    }

    fn interp(&mut self) -> Interp<'_> {
        Interp {
            programs: &self.programs,
            procs: &self.procs,
            by_name: &self.by_name,
            interner: self.interner,
            rt: &mut self.rt,
        }
    }

    // ── Loading ─────────────────────────────────────────────────────

    /// Load an artifact, making its entry and dispatch procedures callable.
    pub fn load(&mut self, artifact: StateMachineArtifact) -> Result<(), HostError> {
        let name = self.interner.lookup(artifact.procedure).to_owned();
        let violations = cadence_lower::check_artifact(&artifact);
        if !violations.is_empty() {
            return Err(HostError::InvalidArtifact {
                procedure: name,
                violations,
            });
        }
        for proc_name in [artifact.entry.name, artifact.dispatch.name] {
            if self.by_name.contains_key(&proc_name) {
                return Err(HostError::DuplicateProcedure(
                    self.interner.lookup(proc_name).to_owned(),
                ));
            }
        }

        let program = self.programs.len();
        let entry = ProcIndex::new(self.procs.len());
        self.procs.push(ProcEntry {
            program,
            role: Role::Entry,
        });
        let dispatch = ProcIndex::new(self.procs.len());
        self.procs.push(ProcEntry {
            program,
            role: Role::Dispatch,
        });
        self.by_name.insert(artifact.entry.name, entry);
        self.by_name.insert(artifact.dispatch.name, dispatch);

        tracing::debug!(
            procedure = %name,
            states = artifact.state_count,
            slots = artifact.slots.len(),
            "loaded artifact"
        );
        self.programs.push(Program {
            name,
            artifact,
            dispatch,
        });
        Ok(())
    }

    pub fn load_all(
        &mut self,
        artifacts: impl IntoIterator<Item = StateMachineArtifact>,
    ) -> Result<(), HostError> {
        artifacts.into_iter().try_for_each(|artifact| self.load(artifact))
    }

    pub fn spawn_instance(&mut self) -> InstanceId {
        let id = InstanceId::new(self.rt.instances.len());
        self.rt.instances.push(Instance::default());
        id
    }

    /// Make `name` callable from lowered code. Replaces the built-in `log`
    /// when registered under that name.
    pub fn register_fn(
        &mut self,
        name: &str,
        function: impl FnMut(InstanceId, &[Value]) -> Result<Value, HostError> + 'static,
    ) {
        let name = self.interner.intern(name);
        self.rt.functions.insert(name, Box::new(function));
    }

    fn resolve(&self, procedure: &str) -> Result<ProcIndex, HostError> {
        self.by_name
            .iter()
            .find(|(name, _)| self.interner.lookup(**name) == procedure)
            .map(|(_, &proc)| proc)
            .ok_or_else(|| HostError::UnknownProcedure(procedure.to_owned()))
    }

    fn program(&self, procedure: &str) -> Result<usize, HostError> {
        self.programs
            .iter()
            .position(|program| program.name == procedure)
            .ok_or_else(|| HostError::UnknownProcedure(procedure.to_owned()))
    }

    // ── Calling ─────────────────────────────────────────────────────

    /// Call an entry or dispatch procedure by name.
    ///
    /// Calling an entry procedure returns the task observing the new
    /// activation. Calling it again while that activation is in flight
    /// resets the instance's state and abandons the earlier activation.
    pub fn call(
        &mut self,
        instance: InstanceId,
        procedure: &str,
        args: Vec<Value>,
    ) -> Result<Value, HostError> {
        let proc = self.resolve(procedure)?;
        self.rt.instance(instance)?;
        let value = self.interp().run_proc(proc, instance, args)?;
        let mut fired = 0;
        self.pump_completions(&mut fired)?;
        Ok(value)
    }

    /// Handle the scheduler would use to resume `procedure` on `instance`.
    pub fn resume_handle(
        &self,
        instance: InstanceId,
        procedure: &str,
    ) -> Result<ResumeHandle, HostError> {
        let program = self.program(procedure)?;
        Ok(ResumeHandle {
            instance,
            procedure: self.programs[program].dispatch,
        })
    }

    /// Run a dispatch procedure now, as the scheduler would.
    pub fn resume(&mut self, handle: ResumeHandle) -> Result<(), HostError> {
        self.run_action(Action::Resume(handle))?;
        let mut fired = 0;
        self.pump_completions(&mut fired)
    }

    pub fn call_closure(&mut self, closure: &Value) -> Result<Value, HostError> {
        let Value::Closure(id) = closure else {
            return Err(HostError::type_mismatch("closure", closure));
        };
        let value = self.interp().run_closure(*id)?;
        let mut fired = 0;
        self.pump_completions(&mut fired)?;
        Ok(value)
    }

    // ── Cancellation ────────────────────────────────────────────────

    pub fn new_cancel_token(&mut self) -> Value {
        let id = crate::value::CancelId::new(self.rt.tokens.len());
        self.rt.tokens.push(false);
        Value::Cancel(id)
    }

    /// Request cancellation. Takes effect at the next dispatch of every
    /// activation holding the token.
    pub fn cancel(&mut self, token: &Value) -> Result<(), HostError> {
        let requested = match token {
            Value::Cancel(id) => self.rt.tokens.get_mut(id.index()),
            _ => None,
        };
        match requested {
            Some(flag) => {
                *flag = true;
                Ok(())
            }
            None => Err(HostError::type_mismatch("cancellation token", token)),
        }
    }

    // ── Inspection ──────────────────────────────────────────────────

    pub fn set_field(
        &mut self,
        instance: InstanceId,
        field: &str,
        value: Value,
    ) -> Result<(), HostError> {
        let name = self.interner.intern(field);
        self.rt.instance_mut(instance)?.fields.insert(name, value);
        Ok(())
    }

    pub fn field(&self, instance: InstanceId, field: &str) -> Result<Option<&Value>, HostError> {
        let fields = &self.rt.instance(instance)?.fields;
        Ok(fields
            .iter()
            .find(|(name, _)| self.interner.lookup(**name) == field)
            .map(|(_, value)| value))
    }

    fn slot_by_name(&self, program: usize, slot: &str) -> Result<SlotId, HostError> {
        let program = &self.programs[program];
        program
            .artifact
            .slots
            .iter()
            .find(|s| self.interner.lookup(s.name) == slot)
            .map(|s| s.id)
            .ok_or_else(|| HostError::UnknownSlot {
                procedure: program.name.clone(),
                slot: slot.to_owned(),
            })
    }

    fn read_slot(&self, instance: InstanceId, program: usize, slot: SlotId) -> Result<Value, HostError> {
        let artifact = &self.programs[program].artifact;
        let stored = self
            .rt
            .storage(instance, program)?
            .and_then(|storage| storage.slots.get(slot.index()));
        Ok(match stored {
            Some(value) => value.clone(),
            None => Value::default_for(&artifact.slot(slot).ty),
        })
    }

    /// Current value of a persistent slot, by its generated name.
    pub fn slot_value(
        &self,
        instance: InstanceId,
        procedure: &str,
        slot: &str,
    ) -> Result<Value, HostError> {
        let program = self.program(procedure)?;
        let slot = self.slot_by_name(program, slot)?;
        self.read_slot(instance, program, slot)
    }

    pub fn set_slot_value(
        &mut self,
        instance: InstanceId,
        procedure: &str,
        slot: &str,
        value: Value,
    ) -> Result<(), HostError> {
        let program = self.program(procedure)?;
        let slot = self.slot_by_name(program, slot)?;
        let artifact = &self.programs[program].artifact;
        let storage = self.rt.storage_mut(instance, program, artifact)?;
        if let Some(cell) = storage.slots.get_mut(slot.index()) {
            *cell = value;
        }
        Ok(())
    }

    /// The state index of `procedure` on `instance`.
    pub fn state_index(&self, instance: InstanceId, procedure: &str) -> Result<i64, HostError> {
        let program = self.program(procedure)?;
        let state = self.programs[program].artifact.state_slot;
        let value = self.read_slot(instance, program, state)?;
        value
            .as_int()
            .ok_or_else(|| HostError::type_mismatch("int", &value))
    }

    pub fn status(
        &self,
        instance: InstanceId,
        procedure: &str,
    ) -> Result<Option<TaskStatus>, HostError> {
        let program = self.program(procedure)?;
        let status = self.programs[program].artifact.status_slot;
        let value = self.read_slot(instance, program, status)?;
        Ok(value.as_int().and_then(TaskStatus::from_code))
    }

    pub fn task_state(&self, task: &Value) -> Option<&TaskState> {
        let id = task.as_task()?;
        self.rt.task(id).map(|task| &task.state)
    }

    /// Everything written by the built-in `log`, in order.
    pub fn log(&self) -> &[LogEntry] {
        &self.rt.log
    }

    pub fn messages(&self) -> Vec<&str> {
        self.rt.log.iter().map(|entry| entry.message.as_str()).collect()
    }

    pub fn messages_of(&self, instance: InstanceId) -> Vec<&str> {
        self.rt
            .log
            .iter()
            .filter(|entry| entry.instance == instance)
            .map(|entry| entry.message.as_str())
            .collect()
    }

    pub fn scheduler(&self) -> &TestScheduler {
        &self.rt.scheduler
    }

    // ── Driving the scheduler ───────────────────────────────────────

    fn fire(&mut self, request: Request, fired: &mut usize) -> Result<(), HostError> {
        *fired += 1;
        let limit = self.rt.config.max_dispatch_per_tick;
        if *fired > limit {
            return Err(HostError::RunawaySchedule { limit });
        }
        tracing::trace!(seq = request.seq, action = ?request.action, "firing request");
        self.run_action(request.action)
    }

    fn run_action(&mut self, action: Action) -> Result<(), HostError> {
        match action {
            Action::Resume(handle) => {
                self.interp()
                    .run_proc(handle.procedure, handle.instance, Vec::new())?;
            }
            Action::Complete(task) => self.rt.complete_scheduled(task),
        }
        Ok(())
    }

    /// Fire completion requests until none is ready.
    fn pump_completions(&mut self, fired: &mut usize) -> Result<(), HostError> {
        loop {
            let rt = &mut self.rt;
            let tasks = &rt.tasks;
            let Some(request) = rt
                .scheduler
                .take_ready_completion(|ids, mode| tasks_done(tasks, ids, mode))
            else {
                return Ok(());
            };
            self.fire(request, fired)?;
        }
    }

    /// Fire everything due at the current clock time.
    fn fire_due(&mut self) -> Result<usize, HostError> {
        let mut fired = 0;
        self.pump_completions(&mut fired)?;
        while let Some(request) = self.rt.scheduler.take_due_timer() {
            self.fire(request, &mut fired)?;
            self.pump_completions(&mut fired)?;
        }
        Ok(fired)
    }

    /// Advance one frame and fire what became due. Returns the number of
    /// requests fired.
    pub fn advance_frame(&mut self) -> Result<usize, HostError> {
        self.rt.scheduler.advance_frame();
        self.fire_due()
    }

    pub fn advance_seconds(&mut self, seconds: f64) -> Result<usize, HostError> {
        self.rt.scheduler.advance_seconds(seconds);
        self.fire_due()
    }

    /// Fire every outstanding timer now, whatever its due time, moving the
    /// clock forward as needed. Timers submitted while firing stay pending.
    pub fn fire_all_timers(&mut self) -> Result<usize, HostError> {
        let mut fired = 0;
        for seq in self.rt.scheduler.timer_seqs() {
            if let Some(request) = self.rt.scheduler.take_seq(seq) {
                self.fire(request, &mut fired)?;
                self.pump_completions(&mut fired)?;
            }
        }
        Ok(fired)
    }

    /// Fire the request at `index` in submission order, even if it is not
    /// due yet.
    pub fn fire_pending(&mut self, index: usize) -> Result<(), HostError> {
        let seq = self
            .rt
            .scheduler
            .pending()
            .get(index)
            .map(|request| request.seq)
            .ok_or(HostError::NoPendingRequest(index))?;
        let mut fired = 0;
        if let Some(request) = self.rt.scheduler.take_seq(seq) {
            self.fire(request, &mut fired)?;
            self.pump_completions(&mut fired)?;
        }
        Ok(())
    }

    /// Advance frame by frame until no timer is outstanding. Completion
    /// requests whose tasks never finish do not keep the host busy.
    pub fn run_until_idle(&mut self) -> Result<usize, HostError> {
        let mut fired = self.fire_due()?;
        let mut frames = 0;
        while self.rt.scheduler.has_timers() {
            if frames == IDLE_FRAME_LIMIT {
                return Err(HostError::NeverIdle { frames });
            }
            frames += 1;
            fired += self.advance_frame()?;
        }
        Ok(fired)
    }
}
