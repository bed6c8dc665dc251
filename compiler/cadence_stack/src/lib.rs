//! On-demand stack growth for recursive IR walks.
//!
//! Bound expressions nest arbitrarily (binary chains, calls inside lambdas
//! inside calls), and every pass over them recurses. Wrapping each
//! recursive step in [`ensure_sufficient_stack`] lets a walk of a
//! pathological expression finish instead of overflowing the thread stack.
//!
//! On `wasm32` the wrapper is a plain call.

/// Grow when less than this much stack remains.
const RED_ZONE: usize = 128 * 1024;

/// Size of each newly allocated stack segment.
const GROWTH: usize = 1024 * 1024;

/// Run `f`, first growing the stack if the remaining space is below the
/// red zone.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, GROWTH, f)
}

#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
