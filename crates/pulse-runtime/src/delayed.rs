#![forbid(unsafe_code)]

//! Debounce trigger built on the tick and idle sources.
//!
//! A [`DelayedTrigger`] coalesces bursts of "something changed" into one
//! deferred callback. Each activation restarts the debounce window; the
//! callback runs once, on the dispatch thread, after the window passes with
//! no further activation.
//!
//! # Timing
//!
//! Ticks are coarse (one per period), so the window is expressed as a skip
//! count rather than a second timer: `skip = ceil(delay / period)`. Every tick
//! decrements it and the trigger fires when it goes negative, which is
//! `skip + 1` ticks after the last activation. The extra tick absorbs the
//! phase between the activation and the next tick boundary.
//!
//! A zero delay registers with the idle source instead and fires on the next
//! idle pass, no matter how often it was activated before that pass.
//!
//! # States
//!
//! ```text
//!            activate()                     tick: skip < 0 / idle pass
//! Inactive ─────────────► Active ───────────────────────────────────────┐
//!    ▲                      │  ▲ activate(): skip reset                  │
//!    │   deactivate()       │  └──────────┘                              │
//!    └──────────────────────┴──────────── fire: Inactive, then callback ◄┘
//! ```

use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use pulse_core::{HandleId, Handler, HandlerRef, HandlerResult};

use crate::error::TriggerError;
use crate::idle::IdleSource;
use crate::tick::TickSource;

/// Longest accepted delay: one day.
pub const MAX_DELAY: Duration = Duration::from_millis(86_400_000);

type Callback = Arc<dyn Fn() + Send + Sync + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Registration {
    Tick,
    Idle,
}

#[derive(Debug)]
struct TriggerState {
    active: bool,
    delay: Duration,
    skip: i64,
    registration: Option<Registration>,
}

struct TriggerCore {
    me: Weak<TriggerCore>,
    tick: Arc<TickSource>,
    idle: Arc<IdleSource>,
    state: Mutex<TriggerState>,
    callback: Mutex<Option<Callback>>,
    fired: AtomicU64,
}

impl TriggerCore {
    fn skips_for(&self, delay: Duration) -> i64 {
        let period = self.tick.period().as_millis().max(1);
        let skips = delay.as_millis().div_ceil(period);
        i64::try_from(skips).unwrap_or(i64::MAX)
    }

    fn activate(&self) {
        let mut state = self.state.lock();
        state.skip = self.skips_for(state.delay);
        if state.active {
            tracing::trace!(skip = state.skip, "delayed trigger re-armed");
            return;
        }
        let Some(me) = self.me.upgrade() else {
            return;
        };
        state.active = true;
        let handler: HandlerRef = me;
        if state.delay.is_zero() {
            self.idle.add(handler);
            state.registration = Some(Registration::Idle);
        } else {
            self.tick.add(handler);
            state.registration = Some(Registration::Tick);
        }
        tracing::debug!(
            delay_ms = state.delay.as_millis() as u64,
            skip = state.skip,
            via = ?state.registration,
            "delayed trigger armed"
        );
    }

    fn deactivate(&self) -> bool {
        let mut state = self.state.lock();
        if !state.active {
            return false;
        }
        state.active = false;
        state.skip = 0;
        let id = HandleId::of_ref(self);
        match state.registration.take() {
            Some(Registration::Tick) => {
                self.tick.remove_id(id);
            }
            Some(Registration::Idle) => {
                self.idle.remove_id(id);
            }
            None => {}
        }
        true
    }

    fn fire(&self) -> HandlerResult {
        if !self.deactivate() {
            return Ok(());
        }
        self.fired.fetch_add(1, Ordering::Relaxed);
        let callback = self.callback.lock().clone();
        tracing::debug!(has_callback = callback.is_some(), "delayed trigger fired");
        if let Some(callback) = callback {
            callback();
        }
        Ok(())
    }
}

impl Handler for TriggerCore {
    fn invoke(&self) -> HandlerResult {
        let due = {
            let mut state = self.state.lock();
            match state.registration {
                Some(Registration::Tick) => {
                    state.skip -= 1;
                    state.skip < 0
                }
                Some(Registration::Idle) => true,
                None => false,
            }
        };
        if due { self.fire() } else { Ok(()) }
    }

    fn name(&self) -> Cow<'static, str> {
        Cow::Borrowed("delayed-trigger")
    }
}

/// Debounce/coalescing trigger.
///
/// Dropping the trigger deactivates it, so a pending callback never runs
/// after its owner is gone.
pub struct DelayedTrigger {
    core: Arc<TriggerCore>,
}

impl DelayedTrigger {
    /// Trigger with zero delay (fires on the next idle pass).
    #[must_use]
    pub fn new(tick: Arc<TickSource>, idle: Arc<IdleSource>) -> Self {
        let core = Arc::new_cyclic(|me| TriggerCore {
            me: me.clone(),
            tick,
            idle,
            state: Mutex::new(TriggerState {
                active: false,
                delay: Duration::ZERO,
                skip: 0,
                registration: None,
            }),
            callback: Mutex::new(None),
            fired: AtomicU64::new(0),
        });
        Self { core }
    }

    /// Trigger with the given delay.
    pub fn with_delay(
        tick: Arc<TickSource>,
        idle: Arc<IdleSource>,
        delay: Duration,
    ) -> Result<Self, TriggerError> {
        let trigger = Self::new(tick, idle);
        trigger.set_delay(delay)?;
        Ok(trigger)
    }

    /// True between activation and firing (or deactivation).
    pub fn is_active(&self) -> bool {
        self.core.state.lock().active
    }

    /// Activate or deactivate.
    pub fn set_active(&self, active: bool) {
        if active {
            self.activate();
        } else {
            self.deactivate();
        }
    }

    /// Start (or restart) the debounce window.
    pub fn activate(&self) {
        self.core.activate();
    }

    /// Cancel a pending fire. Idempotent.
    pub fn deactivate(&self) {
        if self.core.deactivate() {
            tracing::trace!("delayed trigger cancelled");
        }
    }

    /// Debounce window.
    pub fn delay(&self) -> Duration {
        self.core.state.lock().delay
    }

    /// Change the debounce window. Only allowed while inactive.
    pub fn set_delay(&self, delay: Duration) -> Result<(), TriggerError> {
        let mut state = self.core.state.lock();
        if state.active {
            return Err(TriggerError::DelayWhileActive);
        }
        if delay > MAX_DELAY {
            return Err(TriggerError::DelayOutOfRange {
                requested: delay,
                max: MAX_DELAY,
            });
        }
        state.delay = delay;
        Ok(())
    }

    /// Set the callback run when the trigger fires, replacing any previous one.
    pub fn set_callback(&self, callback: impl Fn() + Send + Sync + 'static) {
        *self.core.callback.lock() = Some(Arc::new(callback));
    }

    /// Remove the callback. A later fire still deactivates the trigger.
    pub fn clear_callback(&self) {
        *self.core.callback.lock() = None;
    }

    /// Remaining skip count (diagnostics).
    pub fn remaining_skips(&self) -> i64 {
        self.core.state.lock().skip
    }

    /// How many times the trigger has fired.
    pub fn fire_count(&self) -> u64 {
        self.core.fired.load(Ordering::Relaxed)
    }
}

impl Drop for DelayedTrigger {
    fn drop(&mut self) {
        self.core.deactivate();
    }
}

impl fmt::Debug for DelayedTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.core.state.lock();
        f.debug_struct("DelayedTrigger")
            .field("active", &state.active)
            .field("delay", &state.delay)
            .field("skip", &state.skip)
            .field("fired", &self.core.fired.load(Ordering::Relaxed))
            .finish()
    }
}
