//! Fixed-size pool of dedicated OS threads for event handlers.
//!
//! Handlers are short, blocking closures (take ledger locks, schedule a
//! deferred publish). Running them on a pool keeps the bus delivery thread
//! free and bounds how many orders are in flight at once.
//!
//! # Design Principles
//!
//! - **No polling**: workers block on channel `recv`
//! - **Bounded admission**: a full queue rejects instead of blocking the submitter
//! - **Clean shutdown**: dropping the sender lets workers drain and exit

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::WorkerPoolConfig;
use crate::util::thread::join_with_timeout;

/// A unit of work run on a pool thread.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Errors that can occur when using a `WorkerPool`.
#[derive(Debug, Error)]
pub enum PoolError {
    /// The job queue is full; no more jobs can be accepted.
    #[error("job queue is full")]
    QueueFull,
    /// The pool has been shut down.
    #[error("pool has been shut down")]
    PoolShutdown,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Jobs currently executing.
    pub active_jobs: u64,
    /// Jobs waiting in the queue.
    pub queued_jobs: u64,
    /// Jobs that returned normally.
    pub completed_jobs: u64,
    /// Jobs that panicked.
    pub failed_jobs: u64,
    /// Jobs accepted by `submit`.
    pub submitted_jobs: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
struct PoolCounters {
    active_jobs: AtomicU64,
    queued_jobs: AtomicU64,
    completed_jobs: AtomicU64,
    failed_jobs: AtomicU64,
    submitted_jobs: AtomicU64,
}

impl PoolCounters {
    fn snapshot(&self, worker_count: usize) -> PoolStats {
        PoolStats {
            worker_count,
            active_jobs: self.active_jobs.load(Ordering::Relaxed),
            queued_jobs: self.queued_jobs.load(Ordering::Relaxed),
            completed_jobs: self.completed_jobs.load(Ordering::Relaxed),
            failed_jobs: self.failed_jobs.load(Ordering::Relaxed),
            submitted_jobs: self.submitted_jobs.load(Ordering::Relaxed),
        }
    }
}

/// Worker pool with dedicated OS threads.
pub struct WorkerPool {
    name: String,
    config: WorkerPoolConfig,
    worker_count: usize,
    /// Job sender. `None` once shutdown has begun.
    job_tx: Mutex<Option<Sender<Job>>>,
    counters: Arc<PoolCounters>,
    shutdown: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Create a pool and spawn its threads, named `{name}-{index}`.
    ///
    /// # Errors
    ///
    /// - `PoolError::InvalidConfig` if the configuration is invalid
    /// - `PoolError::Spawn` if a thread cannot be created
    pub fn new(name: impl Into<String>, config: WorkerPoolConfig) -> Result<Self, PoolError> {
        config.validate().map_err(PoolError::InvalidConfig)?;
        let name = name.into();
        let worker_count = config.resolved_worker_count();

        let (job_tx, job_rx) = bounded::<Job>(config.max_queue_depth);
        let counters = Arc::new(PoolCounters::default());

        let mut workers = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let spawned = spawn_worker(
                &name,
                worker_id,
                job_rx.clone(),
                Arc::clone(&counters),
                config.thread_stack_size,
            );
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Closing the channel lets the threads already spawned exit.
                    drop(job_tx);
                    return Err(PoolError::Spawn(e));
                }
            }
        }

        info!(
            pool = %name,
            worker_count,
            max_queue_depth = config.max_queue_depth,
            "WorkerPool initialized"
        );

        Ok(Self {
            name,
            config,
            worker_count,
            job_tx: Mutex::new(Some(job_tx)),
            counters,
            shutdown: AtomicBool::new(false),
            workers: Mutex::new(workers),
        })
    }

    /// Enqueue a job without blocking.
    ///
    /// # Errors
    ///
    /// - `PoolError::QueueFull` if the queue is at capacity
    /// - `PoolError::PoolShutdown` if the pool has been shut down
    pub fn submit<F>(&self, job: F) -> Result<(), PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::PoolShutdown);
        }

        let job_tx = self.job_tx.lock();
        let Some(job_tx) = job_tx.as_ref() else {
            return Err(PoolError::PoolShutdown);
        };

        // Count before sending so a fast worker never decrements first.
        self.counters.queued_jobs.fetch_add(1, Ordering::Relaxed);
        match job_tx.try_send(Box::new(job)) {
            Ok(()) => {
                self.counters.submitted_jobs.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.counters.queued_jobs.fetch_sub(1, Ordering::Relaxed);
                warn!(pool = %self.name, "worker pool queue is full");
                Err(PoolError::QueueFull)
            }
            Err(TrySendError::Disconnected(_)) => {
                self.counters.queued_jobs.fetch_sub(1, Ordering::Relaxed);
                Err(PoolError::PoolShutdown)
            }
        }
    }

    /// Current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot(self.worker_count)
    }

    /// Pool name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop accepting jobs, let workers finish what is queued, and join each
    /// worker with the configured timeout. Workers that overstay are detached.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(pool = %self.name, "shutting down worker pool");

        // Dropping the sender unblocks idle workers once the queue is drained.
        self.job_tx.lock().take();

        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        let worker_count = workers.len();
        for worker in workers {
            join_with_timeout(worker, self.config.shutdown_timeout());
        }
        info!(pool = %self.name, worker_count, "worker pool shut down complete");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Signal shutdown but don't join in Drop.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            self.job_tx.lock().take();
            debug!(pool = %self.name, "WorkerPool dropped without explicit shutdown - workers detached");
        }
    }
}

fn spawn_worker(
    pool: &str,
    worker_id: usize,
    job_rx: Receiver<Job>,
    counters: Arc<PoolCounters>,
    stack_size: usize,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("{pool}-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || {
            debug!(worker_id, "worker thread started");

            // Blocking recv; returns Err once the sender is dropped and the
            // queue is empty.
            while let Ok(job) = job_rx.recv() {
                counters.queued_jobs.fetch_sub(1, Ordering::Relaxed);
                counters.active_jobs.fetch_add(1, Ordering::Relaxed);

                let outcome = panic::catch_unwind(AssertUnwindSafe(job));

                counters.active_jobs.fetch_sub(1, Ordering::Relaxed);
                if outcome.is_ok() {
                    counters.completed_jobs.fetch_add(1, Ordering::Relaxed);
                } else {
                    counters.failed_jobs.fetch_add(1, Ordering::Relaxed);
                    error!(worker_id, "job panicked");
                }
            }

            debug!(worker_id, "worker thread exiting");
        })
}
