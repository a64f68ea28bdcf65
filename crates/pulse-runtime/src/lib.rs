#![forbid(unsafe_code)]

//! Pulse runtime: tick and idle multiplexing for a designated thread.
//!
//! # Key Components
//!
//! - [`Pulse`] - process-scoped service owning both sources, hooks and suspension
//! - [`TickSource`] - fixed-period handlers and the wrap-safe tick counter
//! - [`IdleSource`] - handlers run when the host has no pending work
//! - [`SingleActionQueue`] - one-shot actions consumed by the next idle pass
//! - [`DelayedTrigger`] - debounced callback that fires once after a quiet period
//! - [`EventLoop`] - optional pump owning the designated thread
//!
//! # Threading
//!
//! Registration, removal and one-shot actions may come from any thread.
//! Dispatch (tick, idle, trigger firing) happens on one designated thread;
//! debug builds assert it.
//!
//! # Faults
//!
//! Handler, action and hook failures are caught, logged through `tracing`
//! and reported per pass. They never abort a pass or reach the caller.
//! Misuse of the API (changing an active trigger's delay, bad configuration)
//! returns [`TriggerError`] or [`ConfigError`].

mod channel;
pub mod config;
pub mod delayed;
pub mod error;
pub mod event_loop;
pub mod hooks;
pub mod idle;
pub mod pulse;
pub mod single_action;
pub mod suspend;
pub mod tick;

pub use config::{ENV_IDLE_FALLBACK_TICKS, ENV_TICK_MS, PulseConfig};
pub use delayed::{DelayedTrigger, MAX_DELAY};
pub use error::{ConfigError, TriggerError};
pub use event_loop::{EventLoop, LoopExit, LoopHandle, LoopSender};
pub use hooks::{HostHooks, NoopHooks};
pub use idle::{IdleReport, IdleSource};
pub use pulse::{IdleOutcome, Pulse, PulseBuilder, PulseStats, SkipReason, TickOutcome};
pub use single_action::{DrainReport, SingleAction, SingleActionQueue};
pub use suspend::{IdleSuspension, SuspendGuard};
pub use tick::TickSource;

pub use pulse_core::{
    BoxError, DispatchReport, FaultKind, HandleId, Handler, HandlerFault, HandlerRef,
    HandlerResult, from_fn,
};
