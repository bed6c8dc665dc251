//! Persistent slot table.
//!
//! Bookkeeping slots come first (state, status, result), then hoisted
//! parameters and locals, then one slot per task handle awaited at each
//! suspension point.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use cadence_ir::machine::{HoistOrigin, PersistentSlot, SlotRole};
use cadence_ir::{AsyncProcedure, ExprArena, LocalId, Name, SlotId, StringInterner, Ty};

use crate::classify::SuspensionPoint;
use crate::hoist::HoistSet;
use crate::naming::{BookkeepingNames, SlotNamer};
use crate::LowerProblem;

/// Every persistent slot of one artifact, with lookups by purpose.
#[derive(Clone, Debug)]
pub struct SlotLayout {
    slots: Vec<PersistentSlot>,
    pub state: SlotId,
    pub status: SlotId,
    pub result: Option<SlotId>,
    pub cancel: Option<SlotId>,
    hoisted: FxHashMap<HoistOrigin, SlotId>,
    awaits: Vec<SmallVec<[SlotId; 2]>>,
}

impl SlotLayout {
    pub fn build(
        proc: &AsyncProcedure,
        arena: &ExprArena,
        points: &[SuspensionPoint],
        hoists: &HoistSet,
        books: BookkeepingNames,
        namer: &mut SlotNamer<'_>,
        interner: &StringInterner,
    ) -> Result<Self, Vec<LowerProblem>> {
        let mut slots = Vec::new();
        let mut push = |name: Name, ty: Ty, role: SlotRole| {
            let id = SlotId::new(crate::to_u32(slots.len()));
            slots.push(PersistentSlot { id, name, ty, role });
            id
        };

        let state = push(books.state, Ty::Int, SlotRole::StateIndex);
        let status = push(books.status, Ty::Int, SlotRole::Status);

        let mut problems = Vec::new();
        let result = if proc.returns_value() {
            if !proc.result.is_persistable() {
                problems.push(LowerProblem::UnpersistableSlot {
                    name: "<result>".to_owned(),
                    ty: proc.result.display(interner).to_string(),
                    span: proc.span,
                });
            }
            Some(push(books.result, proc.result.clone(), SlotRole::Result))
        } else {
            None
        };

        let mut hoisted = FxHashMap::default();
        for slot in hoists.iter() {
            let id = push(slot.slot_name, slot.ty.clone(), SlotRole::Hoisted(slot.origin));
            hoisted.insert(slot.origin, id);
        }

        let mut awaits = Vec::with_capacity(points.len());
        for point in points {
            let operands = point.kind.awaited_operands();
            let count = operands.len();
            let mut handles = SmallVec::new();
            for (operand, &expr) in operands.iter().enumerate() {
                let stem = if count == 1 {
                    format!("await{}", point.index)
                } else {
                    format!("await{}_{operand}", point.index)
                };
                let role = SlotRole::Awaited {
                    point: point.index,
                    operand: crate::to_u32(operand),
                };
                // Classification guarantees a `Deferred<T>` operand.
                let ty = arena.expr(expr).ty.clone();
                handles.push(push(namer.fresh(&stem), ty, role));
            }
            awaits.push(handles);
        }

        if !problems.is_empty() {
            return Err(problems);
        }

        let cancel = proc
            .cancellation
            .and_then(|index| hoisted.get(&HoistOrigin::Param(index)).copied());

        tracing::debug!(slots = slots.len(), "laid out persistent slots");

        Ok(SlotLayout {
            slots,
            state,
            status,
            result,
            cancel,
            hoisted,
            awaits,
        })
    }

    pub fn param(&self, index: u32) -> Option<SlotId> {
        self.hoisted.get(&HoistOrigin::Param(index)).copied()
    }

    pub fn local(&self, local: LocalId) -> Option<SlotId> {
        self.hoisted.get(&HoistOrigin::Local(local)).copied()
    }

    /// Task-handle slots of one suspension point (empty for timed waits).
    pub fn awaits(&self, point: u32) -> &[SlotId] {
        self.awaits
            .get(point as usize)
            .map_or(&[], |handles| handles.as_slice())
    }

    pub fn slots(&self) -> &[PersistentSlot] {
        &self.slots
    }

    pub fn into_slots(self) -> Vec<PersistentSlot> {
        self.slots
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests {
    use cadence_ir::builder::ProcBuilder;
    use cadence_ir::{ExprArena, Primitive};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::classify::collect_suspension_points;
    use crate::hoist::compute_hoisting;
    use crate::options::LivenessMode;

    #[test]
    fn bookkeeping_then_hoisted_then_awaits() {
        let interner = StringInterner::new();
        let mut arena = ExprArena::new();
        let mut b = ProcBuilder::new(&mut arena, &interner, "Join");
        b.returns(Ty::Int);
        let n = b.param("n", Ty::Int);
        let read = b.param_ref(n);
        let a = b.call_proc("A", vec![read], Ty::Unit);
        let c = b.call_proc("B", Vec::new(), Ty::Unit);
        let both = b.primitive(Primitive::WhenAll, vec![a, c]);
        let s0 = b.suspend_stmt(both);
        let task = b.call_proc("C", Vec::new(), Ty::Int);
        let s1 = b.suspend_stmt(task);
        let proc = b.finish_block(vec![s0, s1]);

        let points = collect_suspension_points(&proc, &arena, &interner).unwrap();
        let mut namer = SlotNamer::new("__", "Join", &interner);
        let books = namer.reserve_bookkeeping();
        let hoists = compute_hoisting(
            &proc,
            &arena,
            &points,
            LivenessMode::Positional,
            &mut namer,
            &interner,
        )
        .unwrap();
        let layout =
            SlotLayout::build(&proc, &arena, &points, &hoists, books, &mut namer, &interner)
                .unwrap();

        let names: Vec<_> = layout
            .slots()
            .iter()
            .map(|slot| interner.lookup(slot.name))
            .collect();
        assert_eq!(
            names,
            vec![
                "__Join_state",
                "__Join_status",
                "__Join_result",
                "__Join_n",
                "__Join_await0_0",
                "__Join_await0_1",
                "__Join_await1",
            ]
        );
        assert_eq!(layout.awaits(0).len(), 2);
        assert_eq!(layout.awaits(1), &[SlotId::new(6)]);
        assert_eq!(layout.param(0), Some(SlotId::new(3)));
        assert!(layout.cancel.is_none());
        assert_eq!(layout.result, Some(SlotId::new(2)));

        let types: Vec<_> = layout.slots()[4..].iter().map(|slot| slot.ty.clone()).collect();
        assert_eq!(
            types,
            vec![
                Ty::deferred(Ty::Unit),
                Ty::deferred(Ty::Unit),
                Ty::deferred(Ty::Int),
            ]
        );
    }

    #[test]
    fn closure_result_is_not_persistable() {
        let interner = StringInterner::new();
        let mut arena = ExprArena::new();
        let mut b = ProcBuilder::new(&mut arena, &interner, "Make");
        b.returns(Ty::Closure);
        let proc = b.finish_block(Vec::new());
        let mut namer = SlotNamer::new("__", "Make", &interner);
        let books = namer.reserve_bookkeeping();
        let problems = SlotLayout::build(
            &proc,
            &arena,
            &[],
            &HoistSet::default(),
            books,
            &mut namer,
            &interner,
        )
        .unwrap_err();
        assert_eq!(problems.len(), 1);
    }
}
