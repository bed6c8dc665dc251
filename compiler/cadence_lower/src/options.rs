//! Lowering configuration.

/// How the hoisting analyzer decides which locals outlive a suspension.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum LivenessMode {
    /// A local is hoisted when a suspension point lies between its
    /// declaration and a later reference, in evaluation order.
    #[default]
    Positional,
    /// A local is hoisted only when it is live on entry to a segment after
    /// the one that declares it. Never hoists more than `Positional`.
    Dataflow,
}

/// Options for [`lower_procedure`](crate::lower_procedure).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LowerOptions {
    pub liveness: LivenessMode,
    /// Prefix of every synthesized slot name. Chosen to be unspellable in
    /// the source language.
    pub slot_prefix: String,
}

impl Default for LowerOptions {
    fn default() -> Self {
        LowerOptions {
            liveness: LivenessMode::Positional,
            slot_prefix: "__".to_owned(),
        }
    }
}

impl LowerOptions {
    /// Default options with dataflow liveness.
    pub fn dataflow() -> Self {
        LowerOptions {
            liveness: LivenessMode::Dataflow,
            ..Self::default()
        }
    }
}
