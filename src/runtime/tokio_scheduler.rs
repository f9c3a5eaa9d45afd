//! Deferred scheduler running as a task on a Tokio runtime.
//!
//! Same contract as [`DeferredScheduler`](crate::core::DeferredScheduler):
//! entries fire in deadline order, never early, and shutdown discards what is
//! still pending. The loop waits on a [`Notify`] raced against
//! [`sleep_until`] the head deadline, and reads time from
//! [`tokio::time::Instant`], so tests can drive it with a paused clock.
//!
//! Tasks are synchronous closures and run inline on the loop task; keep them
//! short (publish an event, flip a flag).

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::SchedulerConfig;
use crate::core::scheduler::{delay_from_secs, SchedulerCounters};
use crate::core::timer_queue::TimerQueue;
use crate::core::{AppResult, DeferredTask, SchedulerError, SchedulerState, SchedulerStats};

struct Inner {
    queue: TimerQueue<Instant, DeferredTask>,
    state: SchedulerState,
}

struct Shared {
    inner: Mutex<Inner>,
    wake: Notify,
    counters: SchedulerCounters,
}

impl Shared {
    /// Either the next due task or the deadline to sleep until.
    fn poll(&self) -> Option<Step> {
        let mut inner = self.inner.lock();
        if inner.state != SchedulerState::Running {
            return None;
        }
        let now = Instant::now();
        Some(match inner.queue.pop_due(now) {
            Some(task) => Step::Run(task),
            None => Step::Wait(inner.queue.next_deadline()),
        })
    }
}

enum Step {
    Run(DeferredTask),
    Wait(Option<Instant>),
}

/// Tokio-backed deferred scheduler.
pub struct AsyncDeferredScheduler {
    shared: Arc<Shared>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    shutdown_timeout: Duration,
}

impl AsyncDeferredScheduler {
    /// Start on the runtime the caller is running in.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::NoRuntime` outside a Tokio runtime.
    pub fn start(config: &SchedulerConfig) -> Result<Self, SchedulerError> {
        let handle = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        Ok(Self::spawn_on(&handle, config))
    }

    /// Start the loop on `handle`.
    #[must_use]
    pub fn spawn_on(handle: &Handle, config: &SchedulerConfig) -> Self {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                queue: TimerQueue::new(),
                state: SchedulerState::Running,
            }),
            wake: Notify::new(),
            counters: SchedulerCounters::default(),
        });

        let loop_handle = handle.spawn(run_loop(Arc::clone(&shared)));
        info!(name = %config.thread_name, "async deferred scheduler started");

        Self {
            shared,
            loop_handle: Mutex::new(Some(loop_handle)),
            shutdown_timeout: config.shutdown_timeout(),
        }
    }

    /// Run `task` no sooner than `delay` from now. Dropped with a warning once
    /// the scheduler is shut down.
    pub fn call_later<F>(&self, delay: Duration, task: F)
    where
        F: FnOnce() -> AppResult<()> + Send + 'static,
    {
        let Some(fire_at) = Instant::now().checked_add(delay) else {
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
        // notify_one leaves a permit if the loop is not parked yet.
        self.shared.wake.notify_one();
        debug!(?delay, "task scheduled");
    }

    /// [`call_later`](Self::call_later) with the delay in seconds.
    pub fn call_later_secs<F>(&self, delay_secs: f64, task: F)
    where
        F: FnOnce() -> AppResult<()> + Send + 'static,
    {
        self.call_later(delay_from_secs(delay_secs), task);
    }

    /// Discard pending entries and wait (bounded) for the loop to exit.
    /// A loop that overstays the timeout is aborted. Idempotent.
    pub async fn shutdown(&self) {
        let Some(discarded) = self.begin_shutdown() else {
            return;
        };
        info!(discarded, "shutting down async deferred scheduler");

        let Some(mut handle) = self.loop_handle.lock().take() else {
            return;
        };
        match tokio::time::timeout(self.shutdown_timeout, &mut handle).await {
            Ok(Ok(())) => info!("async deferred scheduler shutdown complete"),
            Ok(Err(e)) => warn!(error = %e, "scheduler loop ended abnormally"),
            Err(_) => {
                warn!(timeout = ?self.shutdown_timeout, "scheduler loop did not exit in time - aborting");
                handle.abort();
            }
        }
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
        self.shared.wake.notify_one();
        Some(discarded)
    }
}

impl Drop for AsyncDeferredScheduler {
    fn drop(&mut self) {
        if self.begin_shutdown().is_some() {
            debug!("AsyncDeferredScheduler dropped without explicit shutdown - loop detached");
        }
    }
}

async fn run_loop(shared: Arc<Shared>) {
    debug!("async scheduler loop started");
    while let Some(step) = shared.poll() {
        match step {
            Step::Run(task) => shared.counters.run(task),
            Step::Wait(None) => shared.wake.notified().await,
            Step::Wait(Some(deadline)) => {
                tokio::select! {
                    () = shared.wake.notified() => {}
                    () = sleep_until(deadline) => {}
                }
            }
        }
    }
    shared.inner.lock().state = SchedulerState::Stopped;
    debug!("async scheduler loop exited");
}
