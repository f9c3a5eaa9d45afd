//! Error types for the reservation ledger and the deferred scheduler.

use thiserror::Error;

/// Why a reservation (or release) was refused.
///
/// These are routine outcomes that callers branch on, so they travel in a
/// `Result` rather than a panic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReservationError {
    /// The key names no known resource.
    #[error("not found: {0}")]
    NotFound(String),
    /// The resource exists but holds less than requested.
    #[error("insufficient: {key}")]
    InsufficientQuantity {
        /// Resource that could not cover the request.
        key: String,
        /// Quantity asked for (after duplicate lines were summed).
        requested: u64,
        /// Quantity available when the check ran.
        available: u64,
    },
}

impl ReservationError {
    /// Key of the line that failed.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::NotFound(key) | Self::InsufficientQuantity { key, .. } => key,
        }
    }
}

/// Failure raised by a deferred task. Logged by the scheduler and never fatal to it.
#[derive(Debug, Error)]
pub enum DeferredTaskError {
    /// The task returned an error.
    #[error("deferred task failed: {0:#}")]
    Failed(#[source] anyhow::Error),
    /// The task panicked.
    #[error("deferred task panicked: {0}")]
    Panicked(String),
}

impl DeferredTaskError {
    /// Build from a `catch_unwind` payload.
    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".into());
        Self::Panicked(message)
    }
}

/// Errors produced while starting a scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The background thread could not be spawned.
    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(#[from] std::io::Error),
    /// No Tokio runtime is available on the calling thread.
    #[error("no tokio runtime available")]
    NoRuntime,
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
