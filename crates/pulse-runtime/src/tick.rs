#![forbid(unsafe_code)]

//! Fixed-period tick source.
//!
//! [`TickSource`] owns the periodic handler list and the wrap-safe tick
//! counter. It does not own a timer: the host's event pump (or
//! [`EventLoop`](crate::EventLoop)) decides when a period has elapsed and
//! drives it through [`Pulse::tick`](crate::Pulse::tick), which layers
//! suspension, the status-flush hook and the idle fallback on top of
//! [`TickSource::fire`].

use std::sync::Arc;
use std::time::Duration;

use pulse_core::{
    DispatchReport, HandleId, Handler, HandlerRef, ThreadAffinity, TickCounter,
};

use crate::channel::HandlerChannel;

/// Periodic handler registry.
#[derive(Debug)]
pub struct TickSource {
    period: Duration,
    channel: HandlerChannel,
    counter: TickCounter,
}

impl TickSource {
    /// Standalone source with its own thread affinity.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        Self::with_affinity(period, Arc::new(ThreadAffinity::new()))
    }

    pub(crate) fn with_affinity(period: Duration, affinity: Arc<ThreadAffinity>) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            channel: HandlerChannel::new("tick", affinity),
            counter: TickCounter::new(),
        }
    }

    /// Wall-clock period between ticks.
    #[inline]
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Register a periodic handler. Callable from any thread.
    pub fn add(&self, handler: HandlerRef) {
        self.channel.add(handler);
    }

    /// Unregister a handler by identity. Callable from any thread, including
    /// from inside a tick handler. Takes effect from the next pass.
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

    /// Register a plain function; remove it again with [`unsubscribe_fn`](Self::unsubscribe_fn).
    pub fn subscribe_fn(&self, func: fn()) -> HandlerRef {
        self.channel.subscribe_fn(func)
    }

    /// Remove the first subscription wrapping `func`.
    pub fn unsubscribe_fn(&self, func: fn()) -> bool {
        self.channel.unsubscribe_fn(func)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.channel.len()
    }

    /// True if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current tick count.
    #[inline]
    pub fn tick_count(&self) -> i32 {
        self.counter.get()
    }

    /// The counter itself, for "every Nth tick" checks.
    #[inline]
    pub fn counter(&self) -> &TickCounter {
        &self.counter
    }

    /// True while `handler` is mid-invocation in a tick pass.
    pub fn is_executing<H: Handler + ?Sized>(&self, handler: &Arc<H>) -> bool {
        self.channel.is_executing(HandleId::of(handler))
    }

    /// Advance the counter and dispatch one pass. Designated thread only.
    ///
    /// Returns the new tick count and the pass report. A handler may call
    /// `fire` again from inside its callback (nested pumping); the nested pass
    /// skips every handler already executing.
    pub fn fire(&self) -> (i32, DispatchReport) {
        let tick = self.counter.advance();
        let _span = tracing::trace_span!("pulse.tick", tick).entered();
        let report = self.channel.dispatch();
        (tick, report)
    }

    pub(crate) fn clear(&self) -> usize {
        self.channel.clear()
    }
}
