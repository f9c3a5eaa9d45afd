//! Deferred-execution scheduler backed by one dedicated OS thread.
//!
//! Callers hand over "run this no sooner than `delay` from now" and return
//! immediately; the background loop sleeps on a `parking_lot::Condvar` until
//! the earliest entry is due or a new entry (or shutdown) wakes it, re-checks
//! the head of the queue on every wake, and runs due tasks outside the queue
//! lock.
//!
//! Shutdown is best-effort: entries still pending are discarded, not drained.
//!
//! ```
//! use std::sync::mpsc;
//! use std::time::Duration;
//! use orderflow::config::SchedulerConfig;
//! use orderflow::core::DeferredScheduler;
//!
//! let scheduler = DeferredScheduler::new(&SchedulerConfig::default()).unwrap();
//! let (tx, rx) = mpsc::channel();
//! scheduler.call_later(Duration::from_millis(10), move || {
//!     tx.send("fired")?;
//!     Ok(())
//! });
//! assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), "fired");
//! scheduler.shutdown();
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use crate::config::SchedulerConfig;
use crate::core::timer_queue::TimerQueue;
use crate::core::{AppResult, DeferredTaskError, SchedulerError};
use crate::util::clock::{Clock, SystemClock};
use crate::util::thread::join_with_timeout;

/// A callback registered to run later.
pub type DeferredTask = Box<dyn FnOnce() -> AppResult<()> + Send + 'static>;

/// Lifecycle of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Accepting and firing entries.
    Running,
    /// Shutdown requested; the loop has not exited yet.
    ShuttingDown,
    /// The loop has exited.
    Stopped,
}

/// Counters describing scheduler activity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Entries accepted by `call_later`.
    pub scheduled: u64,
    /// Tasks that ran to completion.
    pub executed: u64,
    /// Tasks that returned an error or panicked.
    pub failed: u64,
    /// Entries dropped at shutdown without running.
    pub discarded: u64,
    /// Entries currently waiting.
    pub pending: usize,
}

/// Lock-free counters shared by both scheduler flavors.
#[derive(Debug, Default)]
pub(crate) struct SchedulerCounters {
    pub scheduled: AtomicU64,
    pub executed: AtomicU64,
    pub failed: AtomicU64,
    pub discarded: AtomicU64,
}

impl SchedulerCounters {
    pub fn snapshot(&self, pending: usize) -> SchedulerStats {
        SchedulerStats {
            scheduled: self.scheduled.load(Ordering::Relaxed),
            executed: self.executed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            pending,
        }
    }

    /// Run `task`, converting errors and panics into counted, logged failures.
    pub fn run(&self, task: DeferredTask) {
        match run_task(task) {
            Ok(()) => {
                self.executed.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                error!(error = %err, "deferred task failed");
            }
        }
    }
}

fn run_task(task: DeferredTask) -> Result<(), DeferredTaskError> {
    match panic::catch_unwind(AssertUnwindSafe(task)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(DeferredTaskError::Failed(err)),
        Err(payload) => Err(DeferredTaskError::from_panic(payload.as_ref())),
    }
}

/// Convert real-valued seconds to a delay. Negative and NaN become zero;
/// values too large for a `Duration` saturate.
pub(crate) fn delay_from_secs(delay_secs: f64) -> Duration {
    if delay_secs.is_nan() || delay_secs <= 0.0 {
        Duration::ZERO
    } else {
        Duration::try_from_secs_f64(delay_secs).unwrap_or(Duration::MAX)
    }
}

struct Inner {
    queue: TimerQueue<Instant, DeferredTask>,
    state: SchedulerState,
}

struct Shared {
    inner: Mutex<Inner>,
    wake: Condvar,
    clock: Arc<dyn Clock>,
    counters: SchedulerCounters,
}

/// Thread-backed deferred scheduler.
///
/// Any number of instances may exist; each owns exactly one background thread.
pub struct DeferredScheduler {
    shared: Arc<Shared>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    shutdown_timeout: Duration,
}

impl DeferredScheduler {
    /// Start a scheduler on the system clock.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Spawn` if the background thread cannot be created.
    pub fn new(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Start a scheduler that reads time from `clock`.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::Spawn` if the background thread cannot be created.
    pub fn with_clock(config: &SchedulerConfig, clock: Arc<dyn Clock>) -> Result<Self, SchedulerError> {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                queue: TimerQueue::new(),
                state: SchedulerState::Running,
            }),
            wake: Condvar::new(),
            clock,
            counters: SchedulerCounters::default(),
        });

        let loop_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || run_loop(&loop_shared))?;

        info!(thread = %config.thread_name, "deferred scheduler started");

        Ok(Self {
            shared,
            loop_handle: Mutex::new(Some(handle)),
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    /// Run `task` on the scheduler thread no sooner than `delay` from now.
    ///
    /// Only holds the queue lock for an O(log n) insert. Once the scheduler is
    /// no longer running the task is dropped with a warning.
    pub fn call_later<F>(&self, delay: Duration, task: F)
    where
        F: FnOnce() -> AppResult<()> + Send + 'static,
    {
        let now = self.shared.clock.now();
        let Some(fire_at) = now.checked_add(delay) else {
            warn!(?delay, "delay overflows the clock, ignoring task");
            return;
        };

        {
            let mut inner = self.shared.inner.lock();
            if inner.state != SchedulerState::Running {
                drop(inner);
                warn!("scheduler is shut down, ignoring task");
                return;
            }
            inner.queue.push(fire_at, Box::new(task));
        }
        self.shared.counters.scheduled.fetch_add(1, Ordering::Relaxed);
        self.shared.wake.notify_one();
        debug!(?delay, "task scheduled");
    }

    /// [`call_later`](Self::call_later) with the delay in seconds.
    /// Negative or NaN delays run as soon as possible.
    pub fn call_later_secs<F>(&self, delay_secs: f64, task: F)
    where
        F: FnOnce() -> AppResult<()> + Send + 'static,
    {
        self.call_later(delay_from_secs(delay_secs), task);
    }

    /// Stop the loop, discarding pending entries, and wait (bounded) for the
    /// thread to exit. Idempotent.
    ///
    /// A task that is already running finishes first. When called from a
    /// deferred task the scheduler thread is not joined.
    pub fn shutdown(&self) {
        let Some(discarded) = self.begin_shutdown() else {
            return;
        };
        info!(discarded, "shutting down deferred scheduler");

        let Some(handle) = self.loop_handle.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            debug!("shutdown requested from a deferred task; not joining");
            return;
        }
        join_with_timeout(handle, self.shutdown_timeout);
        info!("deferred scheduler shutdown complete");
    }

    /// Make the loop re-read its clock now.
    ///
    /// Only needed when the clock jumps on its own, as a [`ManualClock`]
    /// does after `advance`; registering or shutting down already wakes it.
    ///
    /// [`ManualClock`]: crate::util::clock::ManualClock
    pub fn wake(&self) {
        self.shared.wake.notify_all();
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SchedulerState {
        self.shared.inner.lock().state
    }

    /// Number of entries waiting to fire.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.inner.lock().queue.len()
    }

    /// Activity counters.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        let pending = self.pending();
        self.shared.counters.snapshot(pending)
    }

    /// Move `Running -> ShuttingDown` and drop pending entries. Returns the
    /// number discarded, or `None` if shutdown had already begun.
    fn begin_shutdown(&self) -> Option<usize> {
        let discarded = {
            let mut inner = self.shared.inner.lock();
            if inner.state != SchedulerState::Running {
                return None;
            }
            inner.state = SchedulerState::ShuttingDown;
            inner.queue.clear()
        };
        self.shared
            .counters
            .discarded
            .fetch_add(discarded as u64, Ordering::Relaxed);
        self.shared.wake.notify_all();
        Some(discarded)
    }
}

impl Drop for DeferredScheduler {
    fn drop(&mut self) {
        // Signal but do not join; explicit shutdown() is the graceful path.
        if self.begin_shutdown().is_some() {
            debug!("DeferredScheduler dropped without explicit shutdown - loop detached");
        }
    }
}

fn run_loop(shared: &Shared) {
    debug!("scheduler loop started");
    while let Some(task) = next_due(shared) {
        shared.counters.run(task);
    }
    shared.inner.lock().state = SchedulerState::Stopped;
    debug!("scheduler loop exited");
}

/// Block until the head entry is due, returning it, or until shutdown.
fn next_due(shared: &Shared) -> Option<DeferredTask> {
    let mut inner = shared.inner.lock();
    loop {
        if inner.state != SchedulerState::Running {
            return None;
        }
        let now = shared.clock.now();
        if let Some(task) = inner.queue.pop_due(now) {
            return Some(task);
        }
        match inner.queue.next_deadline() {
            None => shared.wake.wait(&mut inner),
            Some(fire_at) => {
                let _ = shared
                    .wake
                    .wait_for(&mut inner, fire_at.saturating_duration_since(now));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::clock::ManualClock;
    use std::sync::mpsc;

    fn config() -> SchedulerConfig {
        SchedulerConfig {
            thread_name: "scheduler-test".into(),
            shutdown_timeout_ms: 2_000,
        }
    }

    #[test]
    fn test_delay_from_secs_clamps() {
        assert_eq!(delay_from_secs(-3.0), Duration::ZERO);
        assert_eq!(delay_from_secs(f64::NAN), Duration::ZERO);
        assert_eq!(delay_from_secs(0.5), Duration::from_millis(500));
        assert_eq!(delay_from_secs(f64::INFINITY), Duration::MAX);
    }

    #[test]
    fn test_fires_after_delay() {
        let scheduler = DeferredScheduler::new(&config()).unwrap();
        let (tx, rx) = mpsc::channel();
        let start = Instant::now();

        scheduler.call_later(Duration::from_millis(30), move || {
            tx.send(Instant::now())?;
            Ok(())
        });

        let fired_at = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(fired_at - start >= Duration::from_millis(30));
        scheduler.shutdown();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
    }

    #[test]
    fn test_manual_clock_holds_entries_until_advanced() {
        let clock = ManualClock::new();
        let scheduler = DeferredScheduler::with_clock(&config(), Arc::new(clock.clone())).unwrap();
        let (tx, rx) = mpsc::channel();

        scheduler.call_later(Duration::from_secs(60), move || {
            tx.send(())?;
            Ok(())
        });
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        clock.advance(Duration::from_secs(61));
        // Any insertion wakes the loop, which re-reads the clock.
        scheduler.call_later(Duration::ZERO, || Ok(()));
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        scheduler.shutdown();
    }

    #[test]
    fn test_wake_after_advance_fires_due_entry() {
        let clock = ManualClock::new();
        let scheduler = DeferredScheduler::with_clock(&config(), Arc::new(clock.clone())).unwrap();
        let (tx, rx) = mpsc::channel();

        scheduler.call_later(Duration::from_secs(3_600), move || {
            tx.send(())?;
            Ok(())
        });
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

        // Without a wake the loop would sleep out the hour in real time.
        clock.advance(Duration::from_secs(3_600));
        scheduler.wake();
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(scheduler.pending(), 0);
        scheduler.shutdown();
    }

    #[test]
    fn test_failures_are_counted_not_fatal() {
        let scheduler = DeferredScheduler::new(&config()).unwrap();
        let (tx, rx) = mpsc::channel();

        scheduler.call_later(Duration::ZERO, || Err(anyhow::anyhow!("publish failed")));
        scheduler.call_later(Duration::from_millis(1), || panic!("boom"));
        scheduler.call_later(Duration::from_millis(5), move || {
            tx.send(())?;
            Ok(())
        });

        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        scheduler.shutdown();
        let stats = scheduler.stats();
        assert_eq!(stats.scheduled, 3);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.executed, 1);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let scheduler = DeferredScheduler::new(&config()).unwrap();
        scheduler.call_later(Duration::from_secs(30), || Ok(()));

        scheduler.shutdown();
        scheduler.shutdown();

        let stats = scheduler.stats();
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.pending, 0);
    }

    #[test]
    fn test_shutdown_from_inside_a_task() {
        let scheduler = Arc::new(DeferredScheduler::new(&config()).unwrap());
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&scheduler);

        scheduler.call_later(Duration::ZERO, move || {
            inner.shutdown();
            tx.send(())?;
            Ok(())
        });

        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_ne!(scheduler.state(), SchedulerState::Running);
    }
}
