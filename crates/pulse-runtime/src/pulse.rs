#![forbid(unsafe_code)]

//! The process-scoped tick/idle service.
//!
//! [`Pulse`] owns one [`TickSource`] and one [`IdleSource`], the collaborator
//! [`HostHooks`], the idle suspension counter and the startup flag. Create one
//! per process with [`Pulse::init`] or [`Pulse::builder`], hand the `Arc` to
//! collaborators, and call [`Pulse::shutdown`] on exit.
//!
//! # Tick pass
//!
//! 1. Skip entirely while idle is suspended (or after shutdown).
//! 2. Call [`HostHooks::flush_status`].
//! 3. Advance the tick counter and dispatch tick handlers.
//! 4. Every `idle_fallback_ticks` ticks, force an idle pass if none ran since
//!    the previous check. Hosts whose "no pending work" notification can lag
//!    under sustained activity still see idle work at least that often.
//!
//! # Idle pass
//!
//! Skipped before [`Pulse::mark_started`], while suspended, or after
//! shutdown; otherwise see [`IdleSource::fire`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use pulse_core::{DispatchReport, HandlerRef, ThreadAffinity, run_isolated};

use crate::config::PulseConfig;
use crate::delayed::DelayedTrigger;
use crate::error::TriggerError;
use crate::hooks::{HostHooks, NoopHooks};
use crate::idle::{IdleReport, IdleSource};
use crate::suspend::{IdleSuspension, SuspendGuard};
use crate::tick::TickSource;

/// Why a pass did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Idle is suspended by a live [`SuspendGuard`].
    Suspended,
    /// [`Pulse::mark_started`] has not been called yet.
    NotStarted,
    /// An idle pass is already running.
    Reentrant,
    /// [`Pulse::shutdown`] was called.
    ShutDown,
}

/// Outcome of [`Pulse::tick`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The pass did not run.
    Skipped(SkipReason),
    /// The pass ran.
    Ran {
        /// Tick count after advancing.
        tick: i32,
        /// Tick handler dispatch.
        report: DispatchReport,
        /// The synthetic idle pass, if the fallback forced one.
        forced_idle: Option<IdleReport>,
    },
}

impl TickOutcome {
    /// True if the pass ran.
    pub fn ran(&self) -> bool {
        matches!(self, Self::Ran { .. })
    }

    /// True if this tick forced an idle pass.
    pub fn forced_idle(&self) -> bool {
        matches!(
            self,
            Self::Ran {
                forced_idle: Some(_),
                ..
            }
        )
    }
}

/// Outcome of [`Pulse::idle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleOutcome {
    /// The pass did not run.
    Skipped(SkipReason),
    /// The pass ran.
    Ran(IdleReport),
}

impl IdleOutcome {
    /// True if the pass ran.
    pub fn ran(&self) -> bool {
        matches!(self, Self::Ran(_))
    }
}

/// Counters over the lifetime of a [`Pulse`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PulseStats {
    /// Tick passes that ran.
    pub ticks: u64,
    /// Idle passes that ran, forced ones included.
    pub idle_passes: u64,
    /// Idle passes forced by the tick fallback.
    pub forced_idle_passes: u64,
    /// Tick or idle passes that were skipped.
    pub skipped_passes: u64,
    /// Faults isolated across all passes.
    pub faults: u64,
}

#[derive(Debug, Default)]
struct Counters {
    ticks: AtomicU64,
    idle_passes: AtomicU64,
    forced_idle_passes: AtomicU64,
    skipped_passes: AtomicU64,
    faults: AtomicU64,
}

impl Counters {
    #[inline]
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }
}

/// Builder for [`Pulse`].
pub struct PulseBuilder {
    config: PulseConfig,
    hooks: Arc<dyn HostHooks>,
    started: bool,
}

impl PulseBuilder {
    /// Start from `config` with no-op hooks, not yet started.
    pub fn new(config: PulseConfig) -> Self {
        Self {
            config,
            hooks: Arc::new(NoopHooks),
            started: false,
        }
    }

    /// Install collaborator hooks.
    pub fn hooks(mut self, hooks: Arc<dyn HostHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    /// Mark startup as already complete.
    pub fn started(mut self, started: bool) -> Self {
        self.started = started;
        self
    }

    /// Build the service.
    pub fn build(self) -> Arc<Pulse> {
        let affinity = Arc::new(ThreadAffinity::new());
        let period = self.config.effective_tick_period();
        tracing::debug!(
            tick_ms = period.as_millis() as u64,
            idle_fallback_ticks = self.config.idle_fallback_ticks,
            started = self.started,
            "pulse initialized"
        );
        Arc::new(Pulse {
            tick: Arc::new(TickSource::with_affinity(period, Arc::clone(&affinity))),
            idle: Arc::new(IdleSource::with_affinity(Arc::clone(&affinity))),
            affinity,
            hooks: self.hooks,
            suspension: Arc::new(IdleSuspension::new()),
            started: AtomicBool::new(self.started),
            shut_down: AtomicBool::new(false),
            counters: Counters::default(),
            config: self.config,
        })
    }
}

/// Tick and idle multiplexer for one designated thread.
pub struct Pulse {
    config: PulseConfig,
    tick: Arc<TickSource>,
    idle: Arc<IdleSource>,
    affinity: Arc<ThreadAffinity>,
    hooks: Arc<dyn HostHooks>,
    suspension: Arc<IdleSuspension>,
    started: AtomicBool,
    shut_down: AtomicBool,
    counters: Counters,
}

impl Pulse {
    /// Create a started service with no-op hooks.
    pub fn init(config: PulseConfig) -> Arc<Self> {
        PulseBuilder::new(config).started(true).build()
    }

    /// Builder for custom hooks or deferred startup.
    pub fn builder(config: PulseConfig) -> PulseBuilder {
        PulseBuilder::new(config)
    }

    /// Active configuration.
    pub fn config(&self) -> &PulseConfig {
        &self.config
    }

    /// Tick period.
    pub fn tick_period(&self) -> Duration {
        self.tick.period()
    }

    /// The periodic handler registry.
    pub fn tick_source(&self) -> &Arc<TickSource> {
        &self.tick
    }

    /// The idle handler registry.
    pub fn idle_source(&self) -> &Arc<IdleSource> {
        &self.idle
    }

    /// Register a periodic handler.
    pub fn add_tick_handler(&self, handler: HandlerRef) {
        self.tick.add(handler);
    }

    /// Register an idle handler.
    pub fn add_idle_handler(&self, handler: HandlerRef) {
        self.idle.add(handler);
    }

    /// Queue a one-shot action for the next idle pass. Any thread.
    pub fn add_single_action(&self, action: impl FnOnce() + Send + 'static) {
        self.idle.add_single_action(action);
    }

    /// New inactive trigger with zero delay bound to this service's sources.
    pub fn delayed_trigger(&self) -> DelayedTrigger {
        DelayedTrigger::new(Arc::clone(&self.tick), Arc::clone(&self.idle))
    }

    /// New inactive trigger with the given delay.
    pub fn delayed_trigger_with(&self, delay: Duration) -> Result<DelayedTrigger, TriggerError> {
        DelayedTrigger::with_delay(Arc::clone(&self.tick), Arc::clone(&self.idle), delay)
    }

    /// Current tick count.
    pub fn tick_counter(&self) -> i32 {
        self.tick.tick_count()
    }

    /// Make the calling thread the designated dispatch thread.
    ///
    /// Returns `false` if another thread already dispatched.
    pub fn bind_current_thread(&self) -> bool {
        self.affinity.bind_current()
    }

    /// Signal that application startup finished; idle passes may run.
    pub fn mark_started(&self) {
        if !self.started.swap(true, Ordering::AcqRel) {
            tracing::debug!("pulse startup complete");
        }
    }

    /// True once startup finished.
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Suspend tick and idle passes until the guard drops.
    #[must_use = "suspension ends when the guard is dropped"]
    pub fn suspend_idle(&self) -> SuspendGuard {
        self.suspension.suspend()
    }

    /// True while any suspension guard is alive.
    pub fn is_idle_suspended(&self) -> bool {
        self.suspension.is_suspended()
    }

    /// True after [`shutdown`](Self::shutdown).
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Counter snapshot.
    pub fn stats(&self) -> PulseStats {
        let c = &self.counters;
        PulseStats {
            ticks: c.ticks.load(Ordering::Relaxed),
            idle_passes: c.idle_passes.load(Ordering::Relaxed),
            forced_idle_passes: c.forced_idle_passes.load(Ordering::Relaxed),
            skipped_passes: c.skipped_passes.load(Ordering::Relaxed),
            faults: c.faults.load(Ordering::Relaxed),
        }
    }

    /// Run one tick pass. Designated thread only.
    pub fn tick(&self) -> TickOutcome {
        if self.is_shut_down() {
            return self.skip_tick(SkipReason::ShutDown);
        }
        if self.is_idle_suspended() {
            return self.skip_tick(SkipReason::Suspended);
        }

        let mut faults = 0;
        if run_isolated(self.hooks.name(), "status-hook", || {
            self.hooks.flush_status();
            Ok(())
        })
        .is_err()
        {
            faults += 1;
        }

        let (tick, report) = self.tick.fire();
        faults += report.faults.len();
        Counters::bump(&self.counters.ticks, 1);
        Counters::bump(&self.counters.faults, faults as u64);

        let mut forced_idle = None;
        let every = self.config.idle_fallback_ticks;
        if every != 0 && self.tick.counter().is_every(every) {
            if !self.idle.has_occurred() {
                tracing::trace!(tick, "no idle pass since last check; forcing one");
                if let IdleOutcome::Ran(idle) = self.idle() {
                    Counters::bump(&self.counters.forced_idle_passes, 1);
                    forced_idle = Some(idle);
                }
            }
            self.idle.reset_occurred();
        }

        TickOutcome::Ran {
            tick,
            report,
            forced_idle,
        }
    }

    /// Run one idle pass. Designated thread only.
    pub fn idle(&self) -> IdleOutcome {
        if self.is_shut_down() {
            return self.skip_idle(SkipReason::ShutDown);
        }
        if !self.is_started() {
            return self.skip_idle(SkipReason::NotStarted);
        }
        if self.is_idle_suspended() {
            return self.skip_idle(SkipReason::Suspended);
        }
        match self.idle.fire(self.hooks.as_ref()) {
            Some(report) => {
                Counters::bump(&self.counters.idle_passes, 1);
                Counters::bump(&self.counters.faults, report.fault_count() as u64);
                IdleOutcome::Ran(report)
            }
            None => self.skip_idle(SkipReason::Reentrant),
        }
    }

    /// Detach every handler and drop pending one-shot actions. Idempotent.
    ///
    /// Later passes report [`SkipReason::ShutDown`].
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let tick_handlers = self.tick.clear();
        let (idle_handlers, actions) = self.idle.clear();
        tracing::debug!(
            tick_handlers,
            idle_handlers,
            dropped_actions = actions,
            "pulse shut down"
        );
    }

    fn skip_tick(&self, reason: SkipReason) -> TickOutcome {
        Counters::bump(&self.counters.skipped_passes, 1);
        tracing::trace!(?reason, "tick pass skipped");
        TickOutcome::Skipped(reason)
    }

    fn skip_idle(&self, reason: SkipReason) -> IdleOutcome {
        Counters::bump(&self.counters.skipped_passes, 1);
        tracing::trace!(?reason, "idle pass skipped");
        IdleOutcome::Skipped(reason)
    }
}

impl std::fmt::Debug for Pulse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pulse")
            .field("config", &self.config)
            .field("tick_handlers", &self.tick.len())
            .field("idle_handlers", &self.idle.len())
            .field("tick_counter", &self.tick.tick_count())
            .field("started", &self.is_started())
            .field("suspended", &self.is_idle_suspended())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}
