//! Concurrency core: the reservation ledger, deferred schedulers, and worker pool.

pub mod error;
pub mod ledger;
pub mod scheduler;
pub mod timer_queue;
pub mod worker_pool;

pub use error::{AppResult, DeferredTaskError, ReservationError, SchedulerError};
pub use ledger::{ReservationLine, ReservationRequest, ResourceKey, ResourceLedger};
pub use scheduler::{DeferredScheduler, DeferredTask, SchedulerState, SchedulerStats};
pub use timer_queue::TimerQueue;
pub use worker_pool::{Job, PoolError, PoolStats, WorkerPool};
