#![forbid(unsafe_code)]

//! Pulse core: handler registry, snapshot dispatch and reentrancy guard.
//!
//! # Key Components
//!
//! - [`Handler`] - the single-method callback contract
//! - [`HandlerSet`] - thread-safe registry with cached immutable snapshots
//! - [`ExecutingSet`] - tracks handles mid-invocation so nested passes skip them
//! - [`dispatch`] - the fault-isolating pass shared by every source
//! - [`TickCounter`] - wrap-safe tick counter
//! - [`ThreadAffinity`] - designated-thread check for dispatch
//!
//! # Role in Pulse
//! `pulse-core` holds the pieces with no notion of time or idleness.
//! `pulse-runtime` builds the tick source, idle source and delayed trigger
//! on top of them.

pub mod affinity;
pub mod counter;
pub mod dispatch;
pub mod error;
pub mod executing;
pub mod handler;
pub mod handler_set;

pub use affinity::ThreadAffinity;
pub use counter::TickCounter;
pub use dispatch::{DispatchReport, dispatch, run_isolated};
pub use error::{BoxError, FaultKind, HandlerFault};
pub use executing::{ExecutingSet, ExecutionGuard};
pub use handler::{
    ClosureHandler, FnHandler, HandleId, Handler, HandlerRef, HandlerResult, from_fn,
};
pub use handler_set::{HandlerSet, Snapshot};
