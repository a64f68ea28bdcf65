#![forbid(unsafe_code)]

//! Wrap-safe tick counter.

use std::sync::atomic::{AtomicI32, Ordering};

/// Monotonic tick counter that restarts at `0` after `i32::MAX`.
///
/// Derived scheduling logic ("every Nth tick") reads it from any thread; only
/// the dispatch thread advances it.
#[derive(Debug, Default)]
pub struct TickCounter {
    value: AtomicI32,
}

impl TickCounter {
    /// Counter starting at zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            value: AtomicI32::new(0),
        }
    }

    /// Counter starting at `value` (clamped to be non-negative).
    #[must_use]
    pub const fn starting_at(value: i32) -> Self {
        let value = if value < 0 { 0 } else { value };
        Self {
            value: AtomicI32::new(value),
        }
    }

    /// Current value.
    #[inline]
    pub fn get(&self) -> i32 {
        self.value.load(Ordering::Acquire)
    }

    /// Advance by one and return the new value.
    pub fn advance(&self) -> i32 {
        let prev = self
            .value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| Some(next(v)))
            .unwrap_or_else(|v| v);
        next(prev)
    }

    /// True when the current value is a multiple of `n`. `n == 0` never matches.
    #[inline]
    pub fn is_every(&self, n: u32) -> bool {
        n != 0 && (self.get() as u32).is_multiple_of(n)
    }
}

#[inline]
const fn next(v: i32) -> i32 {
    if v == i32::MAX { 0 } else { v + 1 }
}
