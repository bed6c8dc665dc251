//! Mutable host state: instances, their slots, tasks and tokens.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use cadence_ir::machine::{JoinMode, StateMachineArtifact};
use cadence_ir::{LocalId, MachStmtRange, Name};

use crate::scheduler::TestScheduler;
use crate::value::{InstanceId, ProcIndex, TaskId, Value};
use crate::{HostConfig, HostError};

/// A host function callable from lowered code.
pub type HostFn = Box<dyn FnMut(InstanceId, &[Value]) -> Result<Value, HostError>>;

/// Observable outcome of a task.
#[derive(Clone, Debug, PartialEq)]
pub enum TaskState {
    Pending,
    Succeeded(Value),
    Cancelled,
}

impl TaskState {
    pub fn is_done(&self) -> bool {
        !matches!(self, TaskState::Pending)
    }
}

#[derive(Clone, Debug)]
pub(crate) enum TaskKind {
    /// One activation of a lowered procedure.
    Activation,
    /// `Delay`, `DelayFrames` or `Yield` used as a value.
    Timer,
    /// `WhenAll` or `WhenAny` used as a value.
    Join {
        tasks: SmallVec<[TaskId; 2]>,
        mode: JoinMode,
    },
}

#[derive(Clone, Debug)]
pub(crate) struct Task {
    pub state: TaskState,
    pub kind: TaskKind,
}

/// One line written by the built-in `log` function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogEntry {
    pub instance: InstanceId,
    pub message: String,
}

/// A loaded artifact.
pub(crate) struct Program {
    pub name: String,
    pub artifact: StateMachineArtifact,
    pub dispatch: ProcIndex,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Role {
    Entry,
    Dispatch,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct ProcEntry {
    pub program: usize,
    pub role: Role,
}

/// Persistent slots of one procedure on one instance.
#[derive(Clone, Debug)]
pub(crate) struct Storage {
    pub slots: Vec<Value>,
    /// Task observing the latest activation.
    pub task: Option<TaskId>,
}

impl Storage {
    fn new(artifact: &StateMachineArtifact) -> Self {
        Storage {
            slots: artifact
                .slots
                .iter()
                .map(|slot| Value::default_for(&slot.ty))
                .collect(),
            task: None,
        }
    }
}

#[derive(Default)]
pub(crate) struct Instance {
    pub fields: FxHashMap<Name, Value>,
    /// Indexed by program; created on first use.
    pub storage: Vec<Option<Storage>>,
}

#[derive(Clone, Debug)]
pub(crate) struct Closure {
    pub instance: InstanceId,
    pub program: usize,
    pub body: MachStmtRange,
    pub params: Vec<Value>,
    pub locals: FxHashMap<LocalId, Value>,
}

pub(crate) struct Runtime {
    pub config: HostConfig,
    pub scheduler: TestScheduler,
    pub instances: Vec<Instance>,
    pub tasks: Vec<Task>,
    pub tokens: Vec<bool>,
    pub closures: Vec<Closure>,
    pub functions: FxHashMap<Name, HostFn>,
    pub log: Vec<LogEntry>,
}

impl Runtime {
    pub fn new(config: HostConfig) -> Self {
        Runtime {
            scheduler: TestScheduler::new(config.frame_seconds),
            config,
            instances: Vec::new(),
            tasks: Vec::new(),
            tokens: Vec::new(),
            closures: Vec::new(),
            functions: FxHashMap::default(),
            log: Vec::new(),
        }
    }

    pub fn new_task(&mut self, kind: TaskKind) -> TaskId {
        let id = TaskId::new(self.tasks.len());
        self.tasks.push(Task {
            state: TaskState::Pending,
            kind,
        });
        id
    }

    /// Record a task's outcome. The first outcome sticks.
    pub fn complete(&mut self, task: TaskId, state: TaskState) {
        if let Some(entry) = self.tasks.get_mut(task.index()) {
            if !entry.state.is_done() {
                tracing::trace!(task = task.index(), ?state, "task completed");
                entry.state = state;
            }
        }
    }

    /// Complete a timer or join task whose scheduler request fired.
    pub fn complete_scheduled(&mut self, task: TaskId) {
        let Some(entry) = self.tasks.get(task.index()) else {
            return;
        };
        let value = match &entry.kind {
            TaskKind::Activation => return,
            TaskKind::Timer => Value::Unit,
            TaskKind::Join { tasks, mode } => match mode {
                JoinMode::All => Value::Unit,
                JoinMode::Any => first_done(&self.tasks, tasks).map_or(Value::Unit, Value::Int),
            },
        };
        self.complete(task, TaskState::Succeeded(value));
    }

    pub fn task(&self, task: TaskId) -> Option<&Task> {
        self.tasks.get(task.index())
    }

    pub fn instance(&self, instance: InstanceId) -> Result<&Instance, HostError> {
        self.instances
            .get(instance.index())
            .ok_or(HostError::UnknownInstance(instance))
    }

    pub fn instance_mut(&mut self, instance: InstanceId) -> Result<&mut Instance, HostError> {
        self.instances
            .get_mut(instance.index())
            .ok_or(HostError::UnknownInstance(instance))
    }

    /// Slots of `program` on `instance`, created on first use.
    pub fn storage_mut(
        &mut self,
        instance: InstanceId,
        program: usize,
        artifact: &StateMachineArtifact,
    ) -> Result<&mut Storage, HostError> {
        let instance = self.instance_mut(instance)?;
        if instance.storage.len() <= program {
            instance.storage.resize_with(program + 1, || None);
        }
        Ok(instance.storage[program].get_or_insert_with(|| Storage::new(artifact)))
    }

    pub fn storage(&self, instance: InstanceId, program: usize) -> Result<Option<&Storage>, HostError> {
        Ok(self
            .instance(instance)?
            .storage
            .get(program)
            .and_then(Option::as_ref))
    }
}

/// Have the tasks completed (all of them, or any one)?
pub(crate) fn tasks_done(tasks: &[Task], ids: &[TaskId], mode: JoinMode) -> bool {
    let done = |id: &TaskId| tasks.get(id.index()).is_some_and(|t| t.state.is_done());
    match mode {
        JoinMode::All => ids.iter().all(done),
        JoinMode::Any => ids.iter().any(done),
    }
}

/// Position of the first completed task among `ids`.
pub(crate) fn first_done(tasks: &[Task], ids: &[TaskId]) -> Option<i64> {
    ids.iter()
        .position(|id| tasks.get(id.index()).is_some_and(|t| t.state.is_done()))
        .and_then(|pos| i64::try_from(pos).ok())
}
