//! Liveness across suspension points.
//!
//! Decides which parameters and locals must move from per-activation
//! storage into per-instance persistent slots.
//!
//! # Parameters
//!
//! Every segment, including the first, runs inside the dispatch
//! procedure, so any parameter the body references is hoisted. The
//! cancellation handle is always hoisted because every arm checks it.
//!
//! # Locals
//!
//! - [`LivenessMode::Positional`]: number every declaration, reference and
//!   suspension in evaluation order. A local is hoisted when some
//!   suspension lies strictly between its declaration and its last
//!   reference. Conservative: may hoist a local that is overwritten before
//!   it is read again.
//! - [`LivenessMode::Dataflow`]: backward gen/kill over segments.
//!   `live_in(S) = gen(S) ∪ (live_out(S) - kill(S))` with
//!   `live_out(S) = live_in(S + 1)`. Segments form a chain, so one
//!   backward sweep reaches the fixed point. A local is hoisted when it is
//!   live on entry to a segment after the one that declares it.
//!
//! Only top-level `let` and assignment are kills; writes nested in
//! `if`/`while`/closures may not execute.

use rustc_hash::{FxHashMap, FxHashSet};

use cadence_ir::machine::HoistOrigin;
use cadence_ir::visitor::{walk_expr, Visitor};
use cadence_ir::{
    AsyncProcedure, Expr, ExprArena, ExprId, ExprKind, LocalId, Name, Place, ProcBody, Span,
    Stmt, StmtId, StmtKind, StmtRange, StringInterner, Ty,
};

use crate::classify::SuspensionPoint;
use crate::naming::SlotNamer;
use crate::options::LivenessMode;
use crate::LowerProblem;

/// A parameter or local promoted to persistent storage.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HoistedSlot {
    pub origin: HoistOrigin,
    /// Name in the source.
    pub source_name: Name,
    /// Synthesized slot name.
    pub slot_name: Name,
    pub ty: Ty,
    pub span: Span,
}

/// Hoisted slots in declaration order: parameters first, then locals.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HoistSet {
    slots: Vec<HoistedSlot>,
}

impl HoistSet {
    pub fn iter(&self) -> impl Iterator<Item = &HoistedSlot> {
        self.slots.iter()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn contains(&self, origin: HoistOrigin) -> bool {
        self.slots.iter().any(|slot| slot.origin == origin)
    }

    pub fn contains_local(&self, local: LocalId) -> bool {
        self.contains(HoistOrigin::Local(local))
    }
}

/// Compute the hoist set of a validated procedure.
pub fn compute_hoisting(
    proc: &AsyncProcedure,
    arena: &ExprArena,
    points: &[SuspensionPoint],
    mode: LivenessMode,
    namer: &mut SlotNamer<'_>,
    interner: &StringInterner,
) -> Result<HoistSet, Vec<LowerProblem>> {
    let ProcBody::Block(body) = proc.body else {
        return Ok(HoistSet::default());
    };

    let events = EventScan::run(arena, body);

    let mut params: Vec<u32> = events.params.iter().copied().collect();
    if let Some(cancel) = proc.cancellation {
        if !params.contains(&cancel) {
            params.push(cancel);
        }
    }
    params.sort_unstable();

    let locals = match mode {
        LivenessMode::Positional => positional_locals(&events),
        LivenessMode::Dataflow => dataflow_locals(arena, body, points),
    };
    let mut locals: Vec<LocalId> = locals.into_iter().collect();
    locals.sort_unstable();

    let mut set = HoistSet::default();
    let mut problems = Vec::new();

    let param_slots = params.into_iter().filter_map(|index| {
        proc.param(index)
            .map(|param| (HoistOrigin::Param(index), param.name, &param.ty, param.span))
    });
    let local_slots = locals.into_iter().filter_map(|local| {
        proc.local(local)
            .map(|decl| (HoistOrigin::Local(local), decl.name, &decl.ty, decl.span))
    });

    for (origin, source_name, ty, span) in param_slots.chain(local_slots) {
        if !ty.is_persistable() {
            problems.push(LowerProblem::UnpersistableSlot {
                name: interner.lookup(source_name).to_owned(),
                ty: ty.display(interner).to_string(),
                span,
            });
            continue;
        }
        set.slots.push(HoistedSlot {
            origin,
            source_name,
            slot_name: namer.fresh(interner.lookup(source_name)),
            ty: ty.clone(),
            span,
        });
    }

    tracing::debug!(
        procedure = interner.lookup(proc.name),
        ?mode,
        hoisted = set.len(),
        "computed hoisting"
    );

    if problems.is_empty() {
        Ok(set)
    } else {
        Err(problems)
    }
}

// ── Positional ──────────────────────────────────────────────────────

/// Evaluation-order event positions of one body.
#[derive(Default)]
struct EventScan {
    position: u32,
    declared_at: FxHashMap<LocalId, u32>,
    last_reference: FxHashMap<LocalId, u32>,
    params: FxHashSet<u32>,
    suspends: Vec<u32>,
}

impl EventScan {
    fn run(arena: &ExprArena, body: StmtRange) -> Self {
        let mut scan = EventScan::default();
        scan.visit_stmt_list(body, arena);
        scan
    }

    fn tick(&mut self) -> u32 {
        self.position += 1;
        self.position
    }

    fn reference_local(&mut self, local: LocalId) {
        let at = self.tick();
        self.last_reference.insert(local, at);
    }
}

impl<'ast> Visitor<'ast> for EventScan {
    fn visit_expr(&mut self, id: ExprId, expr: &'ast Expr, arena: &'ast ExprArena) {
        match expr.kind {
            ExprKind::Local(local) => self.reference_local(local),
            ExprKind::Param(index) => {
                self.tick();
                self.params.insert(index);
            }
            ExprKind::Suspend(_) => {
                let at = self.tick();
                self.suspends.push(at);
            }
            _ => {}
        }
        walk_expr(self, id, expr, arena);
    }

    fn visit_declaration(&mut self, local: LocalId, _stmt: &'ast Stmt) {
        let at = self.tick();
        self.declared_at.entry(local).or_insert(at);
    }

    fn visit_place(&mut self, place: Place, _stmt: &'ast Stmt) {
        match place {
            Place::Local(local) => self.reference_local(local),
            Place::Param(index) => {
                self.tick();
                self.params.insert(index);
            }
            Place::Field(_) => {}
        }
    }
}

fn positional_locals(events: &EventScan) -> FxHashSet<LocalId> {
    events
        .last_reference
        .iter()
        .filter(|(local, &last)| {
            // Locals with no `let` count as declared before everything.
            let declared = events.declared_at.get(local).copied().unwrap_or(0);
            events
                .suspends
                .iter()
                .any(|&suspend| declared < suspend && suspend < last)
        })
        .map(|(&local, _)| local)
        .collect()
}

// ── Dataflow ────────────────────────────────────────────────────────

/// Per-segment liveness of locals.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SegmentLiveness {
    pub gen: Vec<FxHashSet<LocalId>>,
    pub kill: Vec<FxHashSet<LocalId>>,
    pub live_in: Vec<FxHashSet<LocalId>>,
    /// Segment holding each local's declaration.
    pub declared_in: FxHashMap<LocalId, usize>,
}

/// Segment index of every top-level statement: the number of suspension
/// statements strictly before it.
pub(crate) fn segment_of_positions(len: usize, points: &[SuspensionPoint]) -> Vec<usize> {
    let mut segment = 0;
    let mut next_point = points.iter().map(|p| p.position).peekable();
    (0..len)
        .map(|position| {
            let current = segment;
            if next_point.peek() == Some(&position) {
                next_point.next();
                segment += 1;
            }
            current
        })
        .collect()
}

/// Compute gen/kill/live-in for every segment.
pub fn segment_liveness(
    arena: &ExprArena,
    body: StmtRange,
    points: &[SuspensionPoint],
) -> SegmentLiveness {
    let stmts = arena.stmt_list(body);
    let segment_count = points.len() + 1;
    let segment_of = segment_of_positions(stmts.len(), points);

    let mut gen: Vec<FxHashSet<LocalId>> = vec![FxHashSet::default(); segment_count];
    let mut kill: Vec<FxHashSet<LocalId>> = vec![FxHashSet::default(); segment_count];
    let mut declared_in = FxHashMap::default();

    let points_by_stmt: FxHashMap<StmtId, &SuspensionPoint> =
        points.iter().map(|p| (p.stmt, p)).collect();

    for (position, &stmt_id) in stmts.iter().enumerate() {
        let segment = segment_of[position];
        let stmt = arena.stmt(stmt_id);

        let mut uses = UseScan::default();
        let mut top_level_kill = None;

        if let Some(point) = points_by_stmt.get(&stmt_id) {
            // Only the operand runs in this segment; the delivery write
            // happens at the start of the next one.
            if let ExprKind::Suspend(operand) = arena.expr(point.suspend).kind {
                uses.visit_expr_id(operand, arena);
            }
            if let StmtKind::Let { local, .. } = stmt.kind {
                declared_in.entry(local).or_insert(segment);
            }
            if let Some(local) = point.delivery.and_then(|d| d.local()) {
                kill[segment + 1].insert(local);
            }
        } else {
            uses.visit_stmt_id(stmt_id, arena);
            match stmt.kind {
                StmtKind::Let { local, .. } => top_level_kill = Some(local),
                StmtKind::Assign {
                    target: Place::Local(local),
                    ..
                } => top_level_kill = Some(local),
                _ => {}
            }
        }

        for local in uses.reads {
            if !kill[segment].contains(&local) {
                gen[segment].insert(local);
            }
        }
        for local in uses.declared {
            declared_in.entry(local).or_insert(segment);
        }
        if let Some(local) = top_level_kill {
            kill[segment].insert(local);
        }
    }

    let mut live_in: Vec<FxHashSet<LocalId>> = vec![FxHashSet::default(); segment_count];
    let mut live_out = FxHashSet::default();
    for segment in (0..segment_count).rev() {
        let mut current = gen[segment].clone();
        current.extend(live_out.iter().filter(|l| !kill[segment].contains(*l)));
        live_in[segment].clone_from(&current);
        live_out = current;
    }

    SegmentLiveness {
        gen,
        kill,
        live_in,
        declared_in,
    }
}

fn dataflow_locals(
    arena: &ExprArena,
    body: StmtRange,
    points: &[SuspensionPoint],
) -> FxHashSet<LocalId> {
    let liveness = segment_liveness(arena, body, points);
    let mut hoisted = FxHashSet::default();
    for (segment, live) in liveness.live_in.iter().enumerate() {
        for &local in live {
            let declared = liveness.declared_in.get(&local).copied().unwrap_or(0);
            if segment > declared {
                hoisted.insert(local);
            }
        }
    }
    tracing::trace!(
        segments = liveness.live_in.len(),
        hoisted = hoisted.len(),
        "dataflow liveness"
    );
    hoisted
}

/// Reads of locals (and nested declarations) in evaluation order. Nested
/// writes are neither uses nor kills.
#[derive(Default)]
struct UseScan {
    reads: Vec<LocalId>,
    declared: Vec<LocalId>,
}

impl<'ast> Visitor<'ast> for UseScan {
    fn visit_expr(&mut self, id: ExprId, expr: &'ast Expr, arena: &'ast ExprArena) {
        if let ExprKind::Local(local) = expr.kind {
            self.reads.push(local);
        }
        walk_expr(self, id, expr, arena);
    }

    fn visit_declaration(&mut self, local: LocalId, _stmt: &'ast Stmt) {
        self.declared.push(local);
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
