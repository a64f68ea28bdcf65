#![forbid(unsafe_code)]

//! Reentrancy guard for dispatch passes.
//!
//! When a handler pumps the host's event queue (a modal wait, a nested
//! message loop) the source can fire again while the outer pass is still
//! inside that handler. [`ExecutingSet`] records which handles are mid-call so
//! the nested pass skips them.
//!
//! Entries are pushed and popped in stack order in the common case. A handle
//! that deregisters another in-flight handle removes it from the middle of
//! the stack, so popping falls back to a linear search when the top does not
//! match.

use parking_lot::Mutex;

use crate::handler::HandleId;

/// Handles currently executing within the active dispatch pass.
#[derive(Debug, Default)]
pub struct ExecutingSet {
    stack: Mutex<Vec<HandleId>>,
}

impl ExecutingSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` as executing.
    ///
    /// Returns `None` if it is already executing; the caller must skip it.
    /// The returned guard pops the entry when dropped.
    #[must_use = "dropping the guard immediately ends the execution mark"]
    pub fn enter(&self, id: HandleId) -> Option<ExecutionGuard<'_>> {
        let mut stack = self.stack.lock();
        if stack.contains(&id) {
            return None;
        }
        stack.push(id);
        Some(ExecutionGuard { set: self, id })
    }

    /// Pop `id`: O(1) when it is the most recent entry, O(n) otherwise.
    ///
    /// Missing ids are ignored; they were already forgotten by a removal.
    fn exit(&self, id: HandleId) {
        let mut stack = self.stack.lock();
        if stack.last() == Some(&id) {
            stack.pop();
        } else if let Some(pos) = stack.iter().rposition(|h| *h == id) {
            stack.remove(pos);
        }
    }

    /// Drop `id` from the set because its handle was deregistered.
    ///
    /// Returns `true` if it was executing.
    pub fn forget(&self, id: HandleId) -> bool {
        let mut stack = self.stack.lock();
        match stack.iter().rposition(|h| *h == id) {
            Some(pos) => {
                stack.remove(pos);
                true
            }
            None => false,
        }
    }

    /// True if `id` is mid-invocation.
    pub fn contains(&self, id: HandleId) -> bool {
        self.stack.lock().contains(&id)
    }

    /// Number of handles mid-invocation. Zero outside of dispatch.
    pub fn len(&self) -> usize {
        self.stack.lock().len()
    }

    /// True outside of dispatch.
    pub fn is_empty(&self) -> bool {
        self.stack.lock().is_empty()
    }
}

/// Pops its handle from the [`ExecutingSet`] on drop, including during unwinding.
#[derive(Debug)]
pub struct ExecutionGuard<'a> {
    set: &'a ExecutingSet,
    id: HandleId,
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        self.set.exit(self.id);
    }
}
