//! # Orderflow
//!
//! Concurrency primitives for an event-driven order pipeline, and the
//! pipeline built on them.
//!
//! ## Core
//!
//! - [`ResourceLedger`](core::ResourceLedger): atomic all-or-nothing
//!   reservation of quantities across several keys. Per-key locks are always
//!   taken in one canonical order, so overlapping requests serialize without
//!   deadlock while disjoint ones run in parallel.
//! - [`DeferredScheduler`](core::DeferredScheduler): "run this no sooner than
//!   `delay` from now" on a single background thread, without blocking the
//!   caller. [`AsyncDeferredScheduler`](runtime::AsyncDeferredScheduler) is the
//!   same contract on Tokio.
//! - [`WorkerPool`](core::WorkerPool): bounded pool of OS threads for event
//!   handlers.
//!
//! ## Pipeline
//!
//! [`build_pipeline`](builders::build_pipeline) wires the order, inventory,
//! payment, and notification services to any [`EventBus`](infra::EventBus):
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use orderflow::builders::build_pipeline;
//! use orderflow::config::PipelineConfig;
//! use orderflow::infra::InMemoryEventBus;
//! use orderflow::services::{NewOrder, OrderItem};
//!
//! # fn main() -> orderflow::core::AppResult<()> {
//! orderflow::util::init_tracing();
//! let pipeline = build_pipeline(
//!     &PipelineConfig::from_env().map_err(anyhow::Error::msg)?,
//!     Arc::new(InMemoryEventBus::new()),
//! )?;
//! let order = pipeline.orders.create_order(NewOrder {
//!     customer_id: "cust-1".into(),
//!     items: vec![OrderItem::new("item_001", 2, 999.0)],
//! })?;
//! println!("accepted {}", order.order_id);
//! pipeline.shutdown();
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

/// Reservation ledger, deferred scheduler, worker pool, and their errors.
pub mod core;
/// Configuration models for the pipeline, pools, and scheduler.
pub mod config;
/// Builders that assemble the pipeline from configuration.
pub mod builders;
/// Infrastructure adapters for the event bus.
pub mod infra;
/// Runtime adapters for async hosts.
#[cfg(feature = "tokio-runtime")]
pub mod runtime;
/// Order pipeline services.
pub mod services;
/// Shared utilities.
pub mod util;
