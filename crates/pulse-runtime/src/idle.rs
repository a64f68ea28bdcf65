#![forbid(unsafe_code)]

//! Idle source: runs whenever the host has no pending work.
//!
//! # Pass order
//!
//! 1. Drain the [`SingleActionQueue`] (actions queued during the drain wait
//!    for the next pass).
//! 2. Call [`HostHooks::on_idle`].
//! 3. Dispatch the idle handlers.
//! 4. Record that an idle pass happened (read by the tick fallback).
//! 5. Call [`HostHooks::invalidate_caches`].
//!
//! A pass that starts while another is in progress on the same source is
//! refused, so a handler that makes the host check for pending work cannot
//! recurse into idle without bound.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use pulse_core::{
    DispatchReport, HandleId, Handler, HandlerFault, HandlerRef, ThreadAffinity, run_isolated,
};

use crate::channel::HandlerChannel;
use crate::hooks::HostHooks;
use crate::single_action::{DrainReport, SingleActionQueue};

/// Outcome of one idle pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdleReport {
    /// One-shot actions run at the start of the pass.
    pub actions: DrainReport,
    /// Faults raised by the collaborator hooks.
    pub hook_faults: Vec<HandlerFault>,
    /// Idle handler dispatch.
    pub dispatch: DispatchReport,
}

impl IdleReport {
    /// Total faults across actions, hooks and handlers.
    pub fn fault_count(&self) -> usize {
        self.actions.faults.len() + self.hook_faults.len() + self.dispatch.faults.len()
    }
}

/// Idle handler registry with its one-shot action queue.
#[derive(Debug)]
pub struct IdleSource {
    channel: HandlerChannel,
    actions: SingleActionQueue,
    in_pass: AtomicBool,
    occurred: AtomicBool,
}

/// Clears the in-pass flag even if a hook unwinds past the isolation layer.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl IdleSource {
    /// Standalone source with its own thread affinity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_affinity(Arc::new(ThreadAffinity::new()))
    }

    pub(crate) fn with_affinity(affinity: Arc<ThreadAffinity>) -> Self {
        Self {
            channel: HandlerChannel::new("idle", affinity),
            actions: SingleActionQueue::new(),
            in_pass: AtomicBool::new(false),
            occurred: AtomicBool::new(false),
        }
    }

    /// Register an idle handler. Callable from any thread.
    pub fn add(&self, handler: HandlerRef) {
        self.channel.add(handler);
    }

    /// Unregister a handler by identity. Takes effect from the next pass.
    pub fn remove<H: Handler + ?Sized>(&self, handler: &Arc<H>) -> bool {
        self.channel.remove(handler)
    }

    /// Unregister by raw identity.
    pub fn remove_id(&self, id: HandleId) -> bool {
        self.channel.remove_id(id)
    }

    /// True if `handler` is registered.
    pub fn contains<H: Handler + ?Sized>(&self, handler: &Arc<H>) -> bool {
        self.channel.contains(handler)
    }

    /// Register a plain function.
    pub fn subscribe_fn(&self, func: fn()) -> HandlerRef {
        self.channel.subscribe_fn(func)
    }

    /// Remove the first subscription wrapping `func`.
    pub fn unsubscribe_fn(&self, func: fn()) -> bool {
        self.channel.unsubscribe_fn(func)
    }

    /// Number of registered idle handlers.
    pub fn len(&self) -> usize {
        self.channel.len()
    }

    /// True if no idle handler is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue a one-shot action for the next idle pass. Callable from any thread.
    pub fn add_single_action(&self, action: impl FnOnce() + Send + 'static) {
        self.actions.push(action);
    }

    /// True if one-shot actions are waiting.
    pub fn has_pending_actions(&self) -> bool {
        self.actions.has_pending()
    }

    /// True while a pass is running.
    #[inline]
    pub fn in_pass(&self) -> bool {
        self.in_pass.load(Ordering::Acquire)
    }

    /// True if a pass completed since the last [`reset_occurred`](Self::reset_occurred).
    #[inline]
    pub fn has_occurred(&self) -> bool {
        self.occurred.load(Ordering::Acquire)
    }

    pub(crate) fn reset_occurred(&self) {
        self.occurred.store(false, Ordering::Release);
    }

    /// Run one idle pass. Designated thread only.
    ///
    /// Returns `None` when another pass is already running on this source.
    pub fn fire(&self, hooks: &dyn HostHooks) -> Option<IdleReport> {
        if self.in_pass.swap(true, Ordering::AcqRel) {
            tracing::trace!("idle pass already running; ignoring nested request");
            return None;
        }
        let _pass = PassGuard(&self.in_pass);
        let _span = tracing::trace_span!("pulse.idle").entered();

        let mut report = IdleReport {
            actions: self.actions.drain("single-action"),
            ..IdleReport::default()
        };

        if let Err(fault) = run_isolated(hooks.name(), "idle-hook", || {
            hooks.on_idle();
            Ok(())
        }) {
            report.hook_faults.push(fault);
        }

        report.dispatch = self.channel.dispatch();
        self.occurred.store(true, Ordering::Release);

        if let Err(fault) = run_isolated(hooks.name(), "cache-hook", || {
            hooks.invalidate_caches();
            Ok(())
        }) {
            report.hook_faults.push(fault);
        }

        Some(report)
    }

    pub(crate) fn clear(&self) -> (usize, usize) {
        (self.channel.clear(), self.actions.clear())
    }
}

impl Default for IdleSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::NoopHooks;
    use parking_lot::Mutex;
    use pulse_core::from_fn;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Recorder {
        log: Mutex<Vec<&'static str>>,
    }

    impl HostHooks for Recorder {
        fn on_idle(&self) {
            self.log.lock().push("on_idle");
        }

        fn invalidate_caches(&self) {
            self.log.lock().push("invalidate");
        }
    }

    #[test]
    fn pass_runs_steps_in_order() {
        let source = IdleSource::new();
        let hooks = Arc::new(Recorder::default());

        {
            let hooks = Arc::clone(&hooks);
            source.add_single_action(move || hooks.log.lock().push("action"));
        }
        {
            let hooks = Arc::clone(&hooks);
            source.add(from_fn("handler", move || {
                hooks.log.lock().push("handler");
                Ok(())
            }));
        }

        assert!(!source.has_occurred());
        let report = source.fire(hooks.as_ref()).unwrap();
        assert_eq!(report.actions.ran, 1);
        assert_eq!(report.dispatch.invoked, 1);
        assert_eq!(report.fault_count(), 0);
        assert!(source.has_occurred());
        assert_eq!(
            *hooks.log.lock(),
            vec!["action", "on_idle", "handler", "invalidate"]
        );
    }

    #[test]
    fn nested_pass_is_refused() {
        let source = Arc::new(IdleSource::new());
        let nested_result = Arc::new(Mutex::new(None));
        {
            let inner = Arc::clone(&source);
            let nested_result = Arc::clone(&nested_result);
            source.add(from_fn("recurses", move || {
                *nested_result.lock() = Some(inner.fire(&NoopHooks).is_none());
                Ok(())
            }));
        }
        assert!(source.fire(&NoopHooks).is_some());
        assert_eq!(*nested_result.lock(), Some(true));
        assert!(!source.in_pass());
    }

    #[test]
    fn faulting_hooks_are_reported() {
        struct Broken;
        impl HostHooks for Broken {
            fn on_idle(&self) {
                panic!("refresh failed");
            }
            fn name(&self) -> &'static str {
                "broken"
            }
        }

        let source = IdleSource::new();
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let hits = Arc::clone(&hits);
            source.add(from_fn("after-hook", move || {
                hits.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }));
        }
        let report = source.fire(&Broken).unwrap();
        assert_eq!(report.hook_faults.len(), 1);
        assert_eq!(report.hook_faults[0].handler, "broken");
        assert_eq!(report.hook_faults[0].site, "idle-hook");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_drops_handlers_and_actions() {
        let source = IdleSource::new();
        source.add(from_fn("h", || Ok(())));
        source.add_single_action(|| {});
        assert_eq!(source.clear(), (1, 1));
        assert!(source.is_empty());
        assert!(!source.has_pending_actions());
    }
}
