#![forbid(unsafe_code)]

//! Registration and dispatch shared by the tick and idle sources.

use std::sync::Arc;

use pulse_core::{
    DispatchReport, ExecutingSet, FnHandler, HandleId, Handler, HandlerRef, HandlerSet,
    ThreadAffinity, dispatch,
};

/// One handler list plus its reentrancy guard.
#[derive(Debug)]
pub(crate) struct HandlerChannel {
    site: &'static str,
    handlers: HandlerSet<dyn Handler>,
    executing: ExecutingSet,
    affinity: Arc<ThreadAffinity>,
}

impl HandlerChannel {
    pub(crate) fn new(site: &'static str, affinity: Arc<ThreadAffinity>) -> Self {
        Self {
            site,
            handlers: HandlerSet::new(),
            executing: ExecutingSet::new(),
            affinity,
        }
    }

    pub(crate) fn add(&self, handler: HandlerRef) {
        self.handlers.add(handler);
    }

    pub(crate) fn remove<H: Handler + ?Sized>(&self, handler: &Arc<H>) -> bool {
        self.remove_id(HandleId::of(handler))
    }

    pub(crate) fn remove_id(&self, id: HandleId) -> bool {
        let removed = self.handlers.remove_id(id);
        if removed {
            self.executing.forget(id);
        }
        removed
    }

    pub(crate) fn contains<H: Handler + ?Sized>(&self, handler: &Arc<H>) -> bool {
        self.handlers.contains(handler)
    }

    /// Wrap `func` into an [`FnHandler`] and register it.
    pub(crate) fn subscribe_fn(&self, func: fn()) -> HandlerRef {
        let handler: HandlerRef = Arc::new(FnHandler::new(func));
        self.handlers.add(Arc::clone(&handler));
        handler
    }

    /// Remove the first wrapper holding the same function value as `func`.
    pub(crate) fn unsubscribe_fn(&self, func: fn()) -> bool {
        let removed = self.handlers.remove_where(|h| {
            h.wrapped_fn()
                .is_some_and(|wrapped| std::ptr::fn_addr_eq(wrapped, func))
        });
        match removed {
            Some(handler) => {
                self.executing.forget(HandleId::of(&handler));
                true
            }
            None => false,
        }
    }

    pub(crate) fn dispatch(&self) -> DispatchReport {
        self.affinity.debug_assert_current(self.site);
        let snapshot = self.handlers.snapshot();
        dispatch(&snapshot, &self.executing, self.site)
    }

    pub(crate) fn clear(&self) -> usize {
        self.handlers.clear()
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers.len()
    }

    pub(crate) fn is_executing(&self, id: HandleId) -> bool {
        self.executing.contains(id)
    }
}
