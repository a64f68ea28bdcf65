#![forbid(unsafe_code)]

//! Snapshot dispatch shared by the tick and idle sources.
//!
//! # Algorithm
//!
//! For each handle in the snapshot, in order:
//!
//! 1. Skip it if it is already in the [`ExecutingSet`] (nested pass).
//! 2. Mark it executing, call [`Handler::invoke`] under `catch_unwind`.
//! 3. An `Err` or a panic becomes a [`HandlerFault`]; it is logged and the
//!    pass moves on.
//! 4. Unmark it (the guard handles out-of-order removal).
//!
//! Because the loop walks a snapshot, a handle removed mid-pass is still
//! called once in that pass, and a handle added mid-pass waits for the next.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::error::{FaultKind, HandlerFault};
use crate::executing::ExecutingSet;
use crate::handler::{HandleId, Handler, HandlerResult};

/// Outcome of one dispatch pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handles in the snapshot.
    pub visited: usize,
    /// Handles actually invoked (including those that faulted).
    pub invoked: usize,
    /// Handles skipped because they were already executing.
    pub skipped: usize,
    /// Faults caught during the pass, in invocation order.
    pub faults: Vec<HandlerFault>,
}

impl DispatchReport {
    /// True if no handler failed.
    #[inline]
    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
    }
}

/// Run `f` with panic isolation, logging any failure against `name`/`site`.
///
/// Used for handlers, one-shot actions and collaborator hooks alike.
pub fn run_isolated<F>(name: &str, site: &'static str, f: F) -> Result<(), HandlerFault>
where
    F: FnOnce() -> HandlerResult,
{
    let kind = match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(err)) => FaultKind::Error(err.to_string()),
        Err(payload) => FaultKind::from_panic(payload),
    };
    let fault = HandlerFault::new(name, site, kind);
    tracing::error!(
        handler = %fault.handler,
        site = fault.site,
        label = fault.as_label(),
        error = %fault.kind,
        "handler fault suppressed"
    );
    Err(fault)
}

/// Dispatch one pass over `snapshot`.
pub fn dispatch<T>(snapshot: &[Arc<T>], executing: &ExecutingSet, site: &'static str) -> DispatchReport
where
    T: Handler + ?Sized,
{
    let mut report = DispatchReport {
        visited: snapshot.len(),
        ..DispatchReport::default()
    };

    for handle in snapshot {
        let Some(_guard) = executing.enter(HandleId::of(handle)) else {
            tracing::trace!(site, handler = %handle.name(), "skipping reentrant handler");
            report.skipped += 1;
            continue;
        };
        report.invoked += 1;
        if let Err(fault) = run_isolated(&handle.name(), site, || handle.invoke()) {
            report.faults.push(fault);
        }
    }

    tracing::trace!(
        site,
        visited = report.visited,
        invoked = report.invoked,
        skipped = report.skipped,
        faults = report.faults.len(),
        "dispatch pass complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerRef, from_fn};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(name: &'static str, hits: &Arc<AtomicUsize>) -> HandlerRef {
        let hits = Arc::clone(hits);
        from_fn(name, move || {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn empty_snapshot_is_clean() {
        let report = dispatch::<dyn Handler>(&[], &ExecutingSet::new(), "tick");
        assert_eq!(report, DispatchReport::default());
        assert!(report.is_clean());
    }

    #[test]
    fn every_handle_is_invoked_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let snapshot: Vec<HandlerRef> = (0..4).map(|_| counting("c", &hits)).collect();
        let executing = ExecutingSet::new();
        let report = dispatch(&snapshot, &executing, "tick");
        assert_eq!(hits.load(Ordering::SeqCst), 4);
        assert_eq!(report.visited, 4);
        assert_eq!(report.invoked, 4);
        assert!(executing.is_empty());
    }

    #[test]
    fn error_and_panic_do_not_stop_the_pass() {
        let hits = Arc::new(AtomicUsize::new(0));
        let snapshot: Vec<HandlerRef> = vec![
            counting("first", &hits),
            from_fn("erroring", || Err("disk full".into())),
            from_fn("panicking", || panic!("kaboom")),
            counting("last", &hits),
        ];
        let executing = ExecutingSet::new();
        let report = dispatch(&snapshot, &executing, "idle");

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(report.invoked, 4);
        assert_eq!(report.faults.len(), 2);
        assert_eq!(report.faults[0].handler, "erroring");
        assert_eq!(report.faults[0].site, "idle");
        assert_eq!(report.faults[0].kind, FaultKind::Error("disk full".into()));
        assert_eq!(report.faults[1].kind, FaultKind::Panic("kaboom".into()));
        assert!(executing.is_empty(), "panicking handler must be unmarked");
    }

    #[test]
    fn executing_handles_are_skipped() {
        let hits = Arc::new(AtomicUsize::new(0));
        let busy = counting("busy", &hits);
        let idle = counting("idle", &hits);
        let executing = ExecutingSet::new();
        let _held = executing.enter(HandleId::of(&busy)).unwrap();

        let report = dispatch(&[Arc::clone(&busy), idle], &executing, "tick");
        assert_eq!(report.skipped, 1);
        assert_eq!(report.invoked, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn run_isolated_passes_through_success() {
        assert!(run_isolated("ok", "hook", || Ok(())).is_ok());
        let fault = run_isolated("bad", "hook", || panic!("hook blew up")).unwrap_err();
        assert_eq!(fault.kind, FaultKind::Panic("hook blew up".into()));
    }
}
