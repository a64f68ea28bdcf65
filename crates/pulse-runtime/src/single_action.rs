#![forbid(unsafe_code)]

//! One-shot actions consumed by the next idle pass.
//!
//! # Invariants
//!
//! - Every queued action runs exactly once.
//! - The queue is swapped out under the lock and run outside it, so an action
//!   that queues another (or itself) defers the new one to the next pass.
//! - An idle pass with nothing queued only reads an atomic flag.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use pulse_core::{HandlerFault, run_isolated};

/// A queued one-shot callback.
pub type SingleAction = Box<dyn FnOnce() + Send + 'static>;

/// Thread-safe FIFO of one-shot callbacks.
#[derive(Default)]
pub struct SingleActionQueue {
    queue: Mutex<Vec<SingleAction>>,
    pending: AtomicBool,
}

/// Result of draining the queue once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Actions executed.
    pub ran: usize,
    /// Actions that panicked.
    pub faults: Vec<HandlerFault>,
}

impl SingleActionQueue {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `action` for the next drain. Callable from any thread.
    pub fn push(&self, action: impl FnOnce() + Send + 'static) {
        let mut queue = self.queue.lock();
        queue.push(Box::new(action));
        self.pending.store(true, Ordering::Release);
    }

    /// Take every queued action, leaving the queue empty.
    ///
    /// Skips the lock entirely when nothing is pending.
    pub fn take(&self) -> Vec<SingleAction> {
        if !self.pending.load(Ordering::Acquire) {
            return Vec::new();
        }
        let mut queue = self.queue.lock();
        self.pending.store(false, Ordering::Release);
        std::mem::take(&mut *queue)
    }

    /// Run every action queued before this call, isolating panics.
    pub fn drain(&self, site: &'static str) -> DrainReport {
        let actions = self.take();
        let mut report = DrainReport::default();
        for action in actions {
            report.ran += 1;
            let result = run_isolated("single-action", site, || {
                action();
                Ok(())
            });
            if let Err(fault) = result {
                report.faults.push(fault);
            }
        }
        report
    }

    /// True if something is queued.
    #[inline]
    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Number of queued actions.
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// True if nothing is queued.
    pub fn is_empty(&self) -> bool {
        !self.has_pending()
    }

    /// Drop every queued action without running it. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let dropped = self.take();
        dropped.len()
    }
}

impl fmt::Debug for SingleActionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleActionQueue")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn empty_queue_drains_nothing() {
        let q = SingleActionQueue::new();
        assert!(q.is_empty());
        assert_eq!(q.drain("idle"), DrainReport::default());
    }

    #[test]
    fn actions_run_once_in_order() {
        let q = SingleActionQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = Arc::clone(&log);
            q.push(move || log.lock().push(i));
        }
        assert_eq!(q.len(), 3);

        let report = q.drain("idle");
        assert_eq!(report.ran, 3);
        assert_eq!(*log.lock(), vec![0, 1, 2]);
        assert!(q.is_empty());
        assert_eq!(q.drain("idle").ran, 0);
    }

    #[test]
    fn requeue_during_drain_is_deferred() {
        let q = Arc::new(SingleActionQueue::new());
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let q2 = Arc::clone(&q);
            let hits = Arc::clone(&hits);
            q.push(move || {
                hits.fetch_add(1, Ordering::SeqCst);
                let hits = Arc::clone(&hits);
                q2.push(move || {
                    hits.fetch_add(1, Ordering::SeqCst);
                });
            });
        }

        assert_eq!(q.drain("idle").ran, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(q.has_pending());
        assert_eq!(q.drain("idle").ran, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_action_is_isolated() {
        let q = SingleActionQueue::new();
        let hits = Arc::new(AtomicUsize::new(0));
        q.push(|| panic!("bad action"));
        {
            let hits = Arc::clone(&hits);
            q.push(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }
        let report = q.drain("idle");
        assert_eq!(report.ran, 2);
        assert_eq!(report.faults.len(), 1);
        assert_eq!(report.faults[0].handler, "single-action");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_drops_without_running() {
        let q = SingleActionQueue::new();
        q.push(|| panic!("must not run"));
        assert_eq!(q.clear(), 1);
        assert_eq!(q.drain("idle").ran, 0);
    }

    #[test]
    fn pushes_from_many_threads() {
        let q = Arc::new(SingleActionQueue::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let q = Arc::clone(&q);
                let hits = Arc::clone(&hits);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        let hits = Arc::clone(&hits);
                        q.push(move || {
                            hits.fetch_add(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(q.drain("idle").ran, 100);
        assert_eq!(hits.load(Ordering::SeqCst), 100);
    }
}
