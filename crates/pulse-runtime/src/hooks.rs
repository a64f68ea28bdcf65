#![forbid(unsafe_code)]

//! Collaborator hooks called once per tick or idle pass.
//!
//! These are the seams where the surrounding application plugs in work that
//! is not a registered handler: flushing a deferred status message, refreshing
//! command state, resetting a short-lived lookup cache. Every hook runs with
//! the same panic isolation as a handler.

/// Application hooks driven by [`Pulse`](crate::Pulse).
///
/// All methods default to no-ops.
pub trait HostHooks: Send + Sync + 'static {
    /// Called at the start of every unsuspended tick.
    fn flush_status(&self) {}

    /// Called once per idle pass, after one-shot actions and before idle handlers.
    fn on_idle(&self) {}

    /// Called at the end of every idle pass.
    fn invalidate_caches(&self) {}

    /// Name used when one of the hooks faults.
    fn name(&self) -> &'static str {
        "host-hooks"
    }
}

/// Hooks that do nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl HostHooks for NoopHooks {}
