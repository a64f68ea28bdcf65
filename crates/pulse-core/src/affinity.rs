#![forbid(unsafe_code)]

//! Designated-thread affinity for dispatch.
//!
//! The first thread that dispatches becomes the owner unless one is bound
//! explicitly. Debug builds assert every later dispatch happens there;
//! release builds skip the check.

use std::sync::OnceLock;
use std::thread::{self, ThreadId};

/// Records which thread is allowed to dispatch.
#[derive(Debug, Default)]
pub struct ThreadAffinity {
    owner: OnceLock<ThreadId>,
}

impl ThreadAffinity {
    /// Unbound affinity; the first dispatching thread claims it.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            owner: OnceLock::new(),
        }
    }

    /// Bind to the calling thread.
    ///
    /// Returns `false` if another thread already owns dispatch.
    pub fn bind_current(&self) -> bool {
        let me = thread::current().id();
        *self.owner.get_or_init(|| me) == me
    }

    /// The owning thread, if bound.
    pub fn owner(&self) -> Option<ThreadId> {
        self.owner.get().copied()
    }

    /// True if the calling thread may dispatch. Binds on first use.
    #[inline]
    pub fn is_current(&self) -> bool {
        self.bind_current()
    }

    /// Debug-only assertion that the caller is the dispatch thread.
    #[inline]
    #[track_caller]
    pub fn debug_assert_current(&self, site: &'static str) {
        debug_assert!(
            self.is_current(),
            "{site} dispatch from {:?}, designated thread is {:?}",
            thread::current().id(),
            self.owner()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn first_caller_becomes_owner() {
        let affinity = ThreadAffinity::new();
        assert!(affinity.owner().is_none());
        assert!(affinity.is_current());
        assert_eq!(affinity.owner(), Some(thread::current().id()));
    }

    #[test]
    fn other_thread_is_rejected() {
        let affinity = Arc::new(ThreadAffinity::new());
        assert!(affinity.bind_current());
        let remote = Arc::clone(&affinity);
        let ok = thread::spawn(move || remote.is_current()).join().unwrap();
        assert!(!ok);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "tick dispatch from")]
    fn debug_assert_fires_off_thread() {
        let affinity = Arc::new(ThreadAffinity::new());
        let remote = Arc::clone(&affinity);
        thread::spawn(move || {
            remote.bind_current();
        })
        .join()
        .unwrap();
        affinity.debug_assert_current("tick");
    }
}
