//! Runtime failures of the reference host.

use crate::value::InstanceId;

/// An error raised while loading or running lowered code.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum HostError {
    #[error("artifact for `{procedure}` is malformed: {}", violations.join("; "))]
    InvalidArtifact {
        procedure: String,
        violations: Vec<String>,
    },

    #[error("procedure `{0}` is already loaded")]
    DuplicateProcedure(String),

    #[error("no procedure named `{0}`")]
    UnknownProcedure(String),

    #[error("no host function named `{0}`")]
    UnknownFunction(String),

    #[error("no instance {0:?}")]
    UnknownInstance(InstanceId),

    #[error("instance has no field `{0}`")]
    UnknownField(String),

    #[error("`{procedure}` has no slot named `{slot}`")]
    UnknownSlot { procedure: String, slot: String },

    #[error("local read before it was assigned")]
    UninitializedLocal,

    #[error("no argument at position {0}")]
    MissingParam(u32),

    #[error("task value read before the task completed")]
    TaskNotDone,

    #[error("`{procedure}` expects {expected} argument(s), got {got}")]
    ArityMismatch {
        procedure: String,
        expected: usize,
        got: usize,
    },

    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("`break` or `continue` outside a loop")]
    StrayLoopControl,

    #[error("schedule names `{found}`, expected its own dispatch `{expected}`")]
    ForeignDispatch { expected: String, found: String },

    #[error("lowered code contains an error node")]
    ErrorNode,

    #[error("more than {limit} callbacks in one scheduler step")]
    RunawaySchedule { limit: usize },

    #[error("timers still pending after {frames} frames")]
    NeverIdle { frames: u64 },

    #[error("no pending request at position {0}")]
    NoPendingRequest(usize),

    #[error("host function `{name}` failed: {message}")]
    Function { name: String, message: String },
}

impl HostError {
    pub(crate) fn type_mismatch(expected: &'static str, found: &crate::Value) -> Self {
        HostError::TypeMismatch {
            expected,
            found: found.type_name(),
        }
    }
}
