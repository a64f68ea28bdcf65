#![forbid(unsafe_code)]

//! Minimal event pump that drives a [`Pulse`] on a dedicated thread.
//!
//! Hosts with their own message loop call [`Pulse::tick`] and
//! [`Pulse::idle`] directly. Everyone else can let [`EventLoop`] own the
//! designated thread: it waits on a channel until the next tick is due,
//! runs posted work, ticks on schedule, and runs one idle pass whenever the
//! queue has drained after a tick, posted work, or an explicit wake.
//!
//! # Loop iteration
//!
//! 1. Block for the next message, at most until the next tick (or not at
//!    all when an idle pass is armed).
//! 2. Drain every queued message.
//! 3. Tick if the deadline passed. Missed periods are not replayed.
//! 4. If armed, run one idle pass.

use std::io;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use pulse_core::run_isolated;

use crate::pulse::Pulse;

type Job = Box<dyn FnOnce() + Send + 'static>;

enum LoopMsg {
    Work(Job),
    Wake,
    Stop,
}

/// Cloneable handle for posting to a running [`EventLoop`].
#[derive(Clone)]
pub struct LoopSender {
    tx: mpsc::Sender<LoopMsg>,
}

impl LoopSender {
    /// Run `work` on the loop thread. Returns `false` once the loop is gone.
    pub fn post(&self, work: impl FnOnce() + Send + 'static) -> bool {
        self.tx.send(LoopMsg::Work(Box::new(work))).is_ok()
    }

    /// Ask for an idle pass as soon as the queue drains.
    pub fn request_idle(&self) -> bool {
        self.tx.send(LoopMsg::Wake).is_ok()
    }

    /// Stop the loop after the messages already queued.
    pub fn stop(&self) -> bool {
        self.tx.send(LoopMsg::Stop).is_ok()
    }
}

impl std::fmt::Debug for LoopSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopSender").finish_non_exhaustive()
    }
}

/// Why [`EventLoop::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// A stop message arrived.
    Stopped,
    /// Every [`LoopSender`] was dropped.
    Disconnected,
    /// The [`Pulse`] was shut down.
    PulseShutDown,
}

/// Single-threaded tick/idle pump.
pub struct EventLoop {
    pulse: Arc<Pulse>,
    rx: mpsc::Receiver<LoopMsg>,
    period: Duration,
    next_tick: Instant,
    idle_armed: bool,
}

impl EventLoop {
    /// Create a loop for `pulse` and the sender that feeds it.
    pub fn new(pulse: Arc<Pulse>) -> (Self, LoopSender) {
        let (tx, rx) = mpsc::channel();
        let period = pulse.tick_period();
        let event_loop = Self {
            pulse,
            rx,
            period,
            next_tick: Instant::now() + period,
            idle_armed: false,
        };
        (event_loop, LoopSender { tx })
    }

    /// Run the loop on a new thread named after `config.loop_name`.
    pub fn spawn(pulse: Arc<Pulse>) -> io::Result<LoopHandle> {
        let name = pulse.config().loop_name.clone();
        let (event_loop, sender) = Self::new(Arc::clone(&pulse));
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || event_loop.run())?;
        Ok(LoopHandle {
            sender,
            pulse,
            handle: Some(handle),
        })
    }

    /// Pump until stopped. The calling thread becomes the dispatch thread.
    pub fn run(mut self) -> LoopExit {
        if !self.pulse.bind_current_thread() {
            tracing::warn!("event loop running off the designated dispatch thread");
        }
        tracing::debug!(
            period_ms = self.period.as_millis() as u64,
            "event loop started"
        );
        let exit = self.pump();
        tracing::debug!(?exit, "event loop stopped");
        exit
    }

    fn pump(&mut self) -> LoopExit {
        loop {
            if self.pulse.is_shut_down() {
                return LoopExit::PulseShutDown;
            }

            let timeout = if self.idle_armed {
                Duration::ZERO
            } else {
                self.next_tick.saturating_duration_since(Instant::now())
            };
            match self.rx.recv_timeout(timeout) {
                Ok(msg) => {
                    if let Some(exit) = self.handle(msg) {
                        return exit;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return LoopExit::Disconnected,
            }
            while let Ok(msg) = self.rx.try_recv() {
                if let Some(exit) = self.handle(msg) {
                    return exit;
                }
            }

            let now = Instant::now();
            if now >= self.next_tick {
                self.pulse.tick();
                self.next_tick += self.period;
                if self.next_tick <= now {
                    self.next_tick = now + self.period;
                }
                self.idle_armed = true;
            }

            if self.pulse.is_started()
                && !self.pulse.is_idle_suspended()
                && self.pulse.idle_source().has_pending_actions()
            {
                self.idle_armed = true;
            }
            if self.idle_armed {
                self.idle_armed = false;
                self.pulse.idle();
            }
        }
    }

    fn handle(&mut self, msg: LoopMsg) -> Option<LoopExit> {
        match msg {
            LoopMsg::Work(job) => {
                let _ = run_isolated("posted-work", "loop-work", || {
                    job();
                    Ok(())
                });
                self.idle_armed = true;
                None
            }
            LoopMsg::Wake => {
                self.idle_armed = true;
                None
            }
            LoopMsg::Stop => Some(LoopExit::Stopped),
        }
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("period", &self.period)
            .field("idle_armed", &self.idle_armed)
            .finish_non_exhaustive()
    }
}

/// Owner of a spawned [`EventLoop`] thread. Dropping it stops and joins the loop.
#[derive(Debug)]
pub struct LoopHandle {
    sender: LoopSender,
    pulse: Arc<Pulse>,
    handle: Option<JoinHandle<LoopExit>>,
}

impl LoopHandle {
    /// The driven service.
    pub fn pulse(&self) -> &Arc<Pulse> {
        &self.pulse
    }

    /// A sender that can outlive this handle.
    pub fn sender(&self) -> LoopSender {
        self.sender.clone()
    }

    /// Run `work` on the loop thread.
    pub fn post(&self, work: impl FnOnce() + Send + 'static) -> bool {
        self.sender.post(work)
    }

    /// Ask for an idle pass as soon as the queue drains.
    pub fn request_idle(&self) -> bool {
        self.sender.request_idle()
    }

    /// Queue a one-shot action and wake the loop so it runs promptly.
    pub fn add_single_action(&self, action: impl FnOnce() + Send + 'static) {
        self.pulse.add_single_action(action);
        self.sender.request_idle();
    }

    /// Stop the loop and wait for the thread.
    ///
    /// Returns `None` if the loop thread panicked or was already joined.
    pub fn shutdown(mut self) -> Option<LoopExit> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Option<LoopExit> {
        let handle = self.handle.take()?;
        let _ = self.sender.stop();
        if handle.thread().id() == thread::current().id() {
            return None;
        }
        handle.join().ok()
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        let _ = self.stop_and_join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PulseConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_pulse() -> Arc<Pulse> {
        Pulse::init(
            PulseConfig::default()
                .with_tick_period(Duration::from_millis(5))
                .with_loop_name("pulse-test-loop"),
        )
    }

    #[test]
    fn posted_work_runs_on_loop_thread() {
        let handle = EventLoop::spawn(fast_pulse()).unwrap();
        let (tx, rx) = mpsc::channel();
        handle.post(move || {
            let _ = tx.send(thread::current().name().map(str::to_owned));
        });
        let name = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(name.as_deref(), Some("pulse-test-loop"));
        assert_eq!(handle.shutdown(), Some(LoopExit::Stopped));
    }

    #[test]
    fn loop_ticks_on_schedule() {
        let pulse = fast_pulse();
        let (tx, rx) = mpsc::channel();
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let hits = Arc::clone(&hits);
            pulse.add_tick_handler(pulse_core::from_fn("ticker", move || {
                if hits.fetch_add(1, Ordering::SeqCst) == 2 {
                    let _ = tx.send(());
                }
                Ok(())
            }));
        }
        let handle = EventLoop::spawn(pulse).unwrap();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        drop(handle);
        assert!(hits.load(Ordering::SeqCst) >= 3);
    }

    #[test]
    fn single_action_wakes_idle() {
        let pulse = Pulse::init(PulseConfig::default().with_tick_period(Duration::from_secs(60)));
        let handle = EventLoop::spawn(pulse).unwrap();
        let (tx, rx) = mpsc::channel();
        handle.add_single_action(move || {
            let _ = tx.send(());
        });
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let pulse = Arc::clone(handle.pulse());
        assert_eq!(handle.shutdown(), Some(LoopExit::Stopped));
        assert!(pulse.stats().idle_passes >= 1);
    }

    #[test]
    fn panicking_work_does_not_kill_loop() {
        let handle = EventLoop::spawn(fast_pulse()).unwrap();
        handle.post(|| panic!("posted work failed"));
        let (tx, rx) = mpsc::channel();
        handle.post(move || {
            let _ = tx.send(7);
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), 7);
    }

    #[test]
    fn dropping_all_senders_ends_run() {
        let (event_loop, sender) = EventLoop::new(fast_pulse());
        drop(sender);
        assert_eq!(event_loop.run(), LoopExit::Disconnected);
    }

    #[test]
    fn pulse_shutdown_ends_run() {
        let pulse = fast_pulse();
        let (event_loop, sender) = EventLoop::new(Arc::clone(&pulse));
        pulse.shutdown();
        assert_eq!(event_loop.run(), LoopExit::PulseShutDown);
        drop(sender);
    }
}
