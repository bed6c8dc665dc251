//! Collision-free names for synthesized slots and procedures.

use rustc_hash::FxHashSet;

use cadence_ir::{Name, StringInterner};

/// Hands out `{prefix}{procedure}_{stem}` names, adding `_1`, `_2`, ...
/// when a stem repeats.
pub struct SlotNamer<'a> {
    interner: &'a StringInterner,
    base: String,
    used: FxHashSet<Name>,
}

/// Names of the bookkeeping slots, reserved before any hoisted slot so
/// they never pick up a suffix.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BookkeepingNames {
    pub state: Name,
    pub status: Name,
    pub result: Name,
}

impl<'a> SlotNamer<'a> {
    pub fn new(prefix: &str, procedure: &str, interner: &'a StringInterner) -> Self {
        SlotNamer {
            interner,
            base: format!("{prefix}{procedure}_"),
            used: FxHashSet::default(),
        }
    }

    pub fn reserve_bookkeeping(&mut self) -> BookkeepingNames {
        BookkeepingNames {
            state: self.fresh("state"),
            status: self.fresh("status"),
            result: self.fresh("result"),
        }
    }

    /// A name not handed out before.
    pub fn fresh(&mut self, stem: &str) -> Name {
        let mut candidate = self.interner.intern(&format!("{}{stem}", self.base));
        let mut suffix = 1u32;
        while !self.used.insert(candidate) {
            candidate = self
                .interner
                .intern(&format!("{}{stem}_{suffix}", self.base));
            suffix += 1;
        }
        candidate
    }

    /// Name of the generated dispatch procedure.
    pub fn dispatch_procedure(&self) -> Name {
        self.interner.intern(&format!("{}dispatch", self.base))
    }
}
