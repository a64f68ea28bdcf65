#![forbid(unsafe_code)]

//! Counted suspension of background tick and idle activity.
//!
//! Modal or blocking operations take a [`SuspendGuard`]; while any guard is
//! alive, tick and idle passes are skipped entirely. Guards nest.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared suspension state.
#[derive(Debug, Default)]
pub struct IdleSuspension {
    depth: AtomicUsize,
}

impl IdleSuspension {
    /// Not suspended.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend until the returned guard drops.
    #[must_use = "suspension ends when the guard is dropped"]
    pub fn suspend(self: &Arc<Self>) -> SuspendGuard {
        let depth = self.depth.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(depth, "idle suspended");
        SuspendGuard {
            owner: Arc::clone(self),
        }
    }

    /// True while at least one guard is alive.
    #[inline]
    pub fn is_suspended(&self) -> bool {
        self.depth.load(Ordering::Acquire) > 0
    }

    /// Number of live guards.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Acquire)
    }
}

/// Keeps idle suspended while alive.
#[derive(Debug)]
pub struct SuspendGuard {
    owner: Arc<IdleSuspension>,
}

impl Drop for SuspendGuard {
    fn drop(&mut self) {
        let depth = self.owner.depth.fetch_sub(1, Ordering::AcqRel) - 1;
        tracing::debug!(depth, "idle suspension released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guards_nest() {
        let s = Arc::new(IdleSuspension::new());
        assert!(!s.is_suspended());
        let outer = s.suspend();
        let inner = s.suspend();
        assert_eq!(s.depth(), 2);
        drop(inner);
        assert!(s.is_suspended());
        drop(outer);
        assert!(!s.is_suspended());
    }

    #[test]
    fn guard_can_cross_threads() {
        let s = Arc::new(IdleSuspension::new());
        let guard = s.suspend();
        std::thread::spawn(move || drop(guard)).join().unwrap();
        assert!(!s.is_suspended());
    }
}
