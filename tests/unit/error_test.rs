//! Tests for error types

use orderflow::core::{DeferredTaskError, PoolError, ReservationError, SchedulerError};
use orderflow::infra::bus::BusError;
use orderflow::services::OrderError;

#[test]
fn test_not_found_error() {
    let err = ReservationError::NotFound("item_009".to_string());
    assert_eq!(format!("{}", err), "not found: item_009");
    assert_eq!(err.key(), "item_009");
}

#[test]
fn test_insufficient_error() {
    let err = ReservationError::InsufficientQuantity {
        key: "item_001".to_string(),
        requested: 5,
        available: 2,
    };
    assert_eq!(format!("{}", err), "insufficient: item_001");
    assert_eq!(err.key(), "item_001");
}

#[test]
fn test_task_failure_keeps_cause() {
    let err = DeferredTaskError::Failed(anyhow::anyhow!("broker unavailable"));
    assert_eq!(format!("{}", err), "deferred task failed: broker unavailable");
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn test_task_panic_error() {
    let err = DeferredTaskError::Panicked("boom".to_string());
    assert_eq!(format!("{}", err), "deferred task panicked: boom");
}

#[test]
fn test_scheduler_errors() {
    assert_eq!(format!("{}", SchedulerError::NoRuntime), "no tokio runtime available");
    let io = std::io::Error::other("out of threads");
    assert_eq!(
        format!("{}", SchedulerError::from(io)),
        "failed to spawn scheduler thread: out of threads"
    );
}

#[test]
fn test_pool_errors() {
    assert_eq!(format!("{}", PoolError::QueueFull), "job queue is full");
    assert_eq!(format!("{}", PoolError::PoolShutdown), "pool has been shut down");
}

#[test]
fn test_order_error_wraps_bus_error() {
    let err = OrderError::from(BusError::Closed);
    assert_eq!(format!("{}", err), "event bus is closed");
    assert_eq!(format!("{}", OrderError::MissingFields), "missing required fields");
}
