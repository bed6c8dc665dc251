//! Cadence Lower - turns async procedures into re-entrant state machines.
//!
//! An async procedure pauses at `suspend` points. A cooperative host with
//! no stack capture cannot pause a call, so each procedure is rewritten
//! into:
//!
//! - persistent per-instance slots (state index, status, result, hoisted
//!   parameters and locals, awaited task handles),
//! - an **entry** procedure with the original signature that initializes
//!   the slots, runs the first segment and returns a task handle,
//! - a **dispatch** procedure the scheduler calls back, one `switch` arm
//!   per segment.
//!
//! # Pipeline
//!
//! ```text
//! validate -> classify -> hoist -> layout -> segment -> emit -> verify
//! ```
//!
//! Every stage reports all of its problems. A problem blocks only the
//! procedure it was found in; [`lower_module`] keeps going with the rest.

mod classify;
mod emit;
mod hoist;
mod layout;
mod naming;
mod options;
mod problem;
mod segment;
mod validate;
mod verify;

#[cfg(test)]
mod test_helpers;

use std::fmt;
use std::sync::Once;

use cadence_diagnostic::{Diagnostic, DiagnosticSink, ErrorGuaranteed};
use cadence_ir::machine::{MachArena, StateMachineArtifact};
use cadence_ir::{AsyncProcedure, ExprArena, StringInterner};

pub use classify::{
    classify_suspension, collect_suspension_points, Delivery, SuspensionKind, SuspensionPoint,
};
pub use emit::{emit_state_machine, EmittedProcs};
pub use hoist::{compute_hoisting, segment_liveness, HoistSet, HoistedSlot, SegmentLiveness};
pub use layout::SlotLayout;
pub use naming::{BookkeepingNames, SlotNamer};
pub use options::{LivenessMode, LowerOptions};
pub use problem::LowerProblem;
pub use segment::{segment_body, ResumeRequest, Segment, SegmentExit};
pub use validate::validate;
pub use verify::{check_artifact, debug_verify};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing from `RUST_LOG`.
///
/// Safe to call more than once; only the first call has an effect, and
/// nothing is installed when `RUST_LOG` is unset.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}

/// Why one procedure could not be lowered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LowerFailure {
    pub procedure: String,
    pub problems: Vec<LowerProblem>,
}

impl LowerFailure {
    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        let procedure = self.procedure;
        self.problems
            .into_iter()
            .map(|problem| problem.into_diagnostic(&procedure))
            .collect()
    }
}

impl fmt::Display for LowerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot lower `{}`: {} problem(s)",
            self.procedure,
            self.problems.len()
        )
    }
}

impl std::error::Error for LowerFailure {}

/// Lower one async procedure.
pub fn lower_procedure(
    proc: &AsyncProcedure,
    arena: &ExprArena,
    interner: &StringInterner,
    options: &LowerOptions,
) -> Result<StateMachineArtifact, LowerFailure> {
    let name = interner.lookup(proc.name);
    let _span = tracing::debug_span!("lower_procedure", procedure = name).entered();
    let fail = |problems: Vec<LowerProblem>| LowerFailure {
        procedure: name.to_owned(),
        problems,
    };

    validate(proc, arena, interner).map_err(fail)?;
    let points = collect_suspension_points(proc, arena, interner).map_err(fail)?;

    let mut namer = SlotNamer::new(&options.slot_prefix, name, interner);
    let books = namer.reserve_bookkeeping();
    let hoists = compute_hoisting(proc, arena, &points, options.liveness, &mut namer, interner)
        .map_err(fail)?;
    let layout =
        SlotLayout::build(proc, arena, &points, &hoists, books, &mut namer, interner).map_err(fail)?;

    let mut out = MachArena::new();
    let segments = segment_body(proc, arena, &points, &layout, &mut out).map_err(fail)?;
    let procs = emit_state_machine(
        proc,
        &segments,
        &layout,
        namer.dispatch_procedure(),
        &mut out,
    );

    let locals = proc
        .locals
        .iter()
        .filter(|decl| layout.local(decl.id).is_none())
        .cloned()
        .collect();

    let artifact = StateMachineArtifact {
        procedure: proc.name,
        params: proc.params.clone(),
        locals,
        result: proc.result.clone(),
        arena: out,
        state_slot: layout.state,
        status_slot: layout.status,
        result_slot: layout.result,
        cancel_slot: layout.cancel,
        entry: procs.entry,
        dispatch: procs.dispatch,
        state_count: to_u32(segments.len()),
        slots: layout.into_slots(),
    };
    debug_verify(&artifact);

    tracing::debug!(
        points = points.len(),
        slots = artifact.slots.len(),
        hoisted = hoists.len(),
        "lowered procedure"
    );
    Ok(artifact)
}

/// Result of lowering a whole module.
#[derive(Debug)]
pub struct LoweredModule {
    /// Artifacts of the procedures that lowered, in input order.
    pub artifacts: Vec<StateMachineArtifact>,
    /// Set once any procedure failed and its errors reached the sink.
    pub errors: Option<ErrorGuaranteed>,
}

/// Lower every procedure, reporting failures to `sink`.
pub fn lower_module(
    procs: &[AsyncProcedure],
    arena: &ExprArena,
    interner: &StringInterner,
    options: &LowerOptions,
    sink: &mut dyn DiagnosticSink,
) -> LoweredModule {
    let mut artifacts = Vec::with_capacity(procs.len());
    let mut errors = None;
    let mut failed = 0usize;
    for proc in procs {
        match lower_procedure(proc, arena, interner, options) {
            Ok(artifact) => artifacts.push(artifact),
            Err(failure) => {
                failed += 1;
                for diagnostic in failure.into_diagnostics() {
                    errors = Some(sink.emit_error(diagnostic));
                }
            }
        }
    }
    tracing::debug!(
        lowered = artifacts.len(),
        failed,
        "lowered module"
    );
    LoweredModule { artifacts, errors }
}

/// Convert a length to `u32`, saturating.
pub(crate) fn to_u32(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
