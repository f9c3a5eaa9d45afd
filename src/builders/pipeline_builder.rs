//! Assemble the order pipeline from configuration.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::config::PipelineConfig;
use crate::core::{DeferredScheduler, PoolError, ResourceLedger, SchedulerError};
use crate::infra::bus::{BusError, EventBus};
use crate::services::{
    ApproveAll, InventoryService, LogNotifier, NotificationService, Notifier, OrderTracker,
    PaymentGateway, PaymentService,
};

/// Errors raised while assembling a pipeline.
#[derive(Debug, Error)]
pub enum BuildError {
    /// Configuration failed validation.
    #[error("config invalid: {0}")]
    InvalidConfig(String),
    /// A worker pool could not be started.
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// The scheduler could not be started.
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    /// A subscription was refused.
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// A running pipeline: one ledger, one scheduler, and the four services.
pub struct Pipeline {
    /// Stock shared by every reservation.
    pub ledger: Arc<ResourceLedger>,
    /// Scheduler for deferred outcome events.
    pub scheduler: Arc<DeferredScheduler>,
    /// Order intake and tracking.
    pub orders: Arc<OrderTracker>,
    /// Inventory stage.
    pub inventory: Arc<InventoryService>,
    /// Payment stage.
    pub payment: Arc<PaymentService>,
    /// Notifications.
    pub notifications: Arc<NotificationService>,
    /// Transport the pipeline is subscribed on.
    pub bus: Arc<dyn EventBus>,
}

impl Pipeline {
    /// Stop the worker pools (draining queued handlers), then the scheduler.
    pub fn shutdown(&self) {
        info!("shutting down pipeline");
        self.inventory.shutdown();
        self.payment.shutdown();
        self.scheduler.shutdown();
        info!("pipeline shut down");
    }
}

/// Build a pipeline with the default gateway and notifier.
///
/// # Errors
///
/// Returns a `BuildError` if the configuration is invalid or a component
/// cannot be started.
pub fn build_pipeline(cfg: &PipelineConfig, bus: Arc<dyn EventBus>) -> Result<Pipeline, BuildError> {
    build_pipeline_with(cfg, bus, Arc::new(ApproveAll), Arc::new(LogNotifier))
}

/// Build a pipeline with an explicit payment gateway and notifier.
///
/// # Errors
///
/// Returns a `BuildError` if the configuration is invalid or a component
/// cannot be started.
pub fn build_pipeline_with(
    cfg: &PipelineConfig,
    bus: Arc<dyn EventBus>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
) -> Result<Pipeline, BuildError> {
    cfg.validate().map_err(BuildError::InvalidConfig)?;

    let ledger = Arc::new(ResourceLedger::with_resources(
        cfg.stock.iter().map(|(key, quantity)| (key.clone(), *quantity)),
    ));
    let scheduler = Arc::new(DeferredScheduler::new(&cfg.scheduler)?);

    let orders = Arc::new(OrderTracker::new(Arc::clone(&bus)));
    let inventory = Arc::new(InventoryService::new(
        &cfg.inventory,
        Arc::clone(&ledger),
        Arc::clone(&scheduler),
        Arc::clone(&bus),
    )?);
    let payment = Arc::new(PaymentService::new(
        &cfg.payment,
        gateway,
        Arc::clone(&scheduler),
        Arc::clone(&bus),
    )?);
    let notifications = Arc::new(NotificationService::new(notifier, Arc::clone(&bus)));

    // The tracker binds first so order state is current before order.final goes out.
    bus.subscribe(OrderTracker::QUEUE, &OrderTracker::TOPICS, orders.event_handler())?;
    bus.subscribe(InventoryService::QUEUE, &InventoryService::TOPICS, inventory.event_handler())?;
    bus.subscribe(PaymentService::QUEUE, &PaymentService::TOPICS, payment.event_handler())?;
    bus.subscribe(
        NotificationService::QUEUE,
        &NotificationService::TOPICS,
        notifications.event_handler(),
    )?;

    info!(resources = ledger.len(), "pipeline assembled");
    Ok(Pipeline {
        ledger,
        scheduler,
        orders,
        inventory,
        payment,
        notifications,
        bus,
    })
}
