//! Cadence Host - a reference cooperative host for lowered state machines.
//!
//! The host plays the part of the single-threaded engine the lowering
//! targets:
//!
//! - per-instance persistent storage for every loaded artifact,
//! - a deterministic [`TestScheduler`] serving time, frame and completion
//!   requests,
//! - cancellation tokens and host functions,
//! - an interpreter for machine IR.
//!
//! It is a test harness, not a production scheduler.
//!
//! ```text
//! lower_procedure -> Host::load -> Host::call -> advance_frame / fire_* ...
//! ```

mod error;
mod host;
mod interp;
mod runtime;
mod scheduler;
mod value;

pub use error::HostError;
pub use host::{Host, HostConfig};
pub use runtime::{HostFn, LogEntry, TaskState};
pub use scheduler::{Action, Due, Request, ResumeHandle, TestScheduler};
pub use value::{CancelId, ClosureId, InstanceId, ProcIndex, TaskId, Value};
