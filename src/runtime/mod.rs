//! Runtime adapters for async hosts.

pub mod tokio_scheduler;

pub use tokio_scheduler::AsyncDeferredScheduler;
