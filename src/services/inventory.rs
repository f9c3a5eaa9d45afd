//! Inventory stage: reserve stock for new orders and announce the outcome.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::ServiceConfig;
use crate::core::{AppResult, DeferredScheduler, PoolError, PoolStats, ResourceLedger, WorkerPool};
use crate::infra::bus::{handler, publish_json, topics, Event, EventBus, EventHandler};
use crate::services::model::{InventoryShortage, Order};

/// Reserves stock on `order.created`.
///
/// A shortage is published at once as `inventory.insufficient`; a successful
/// reservation is announced as `inventory.reserved` after the configured delay.
pub struct InventoryService {
    ledger: Arc<ResourceLedger>,
    scheduler: Arc<DeferredScheduler>,
    bus: Arc<dyn EventBus>,
    pool: WorkerPool,
    delay: Duration,
}

impl InventoryService {
    /// Queue the service consumes from.
    pub const QUEUE: &'static str = "inventory_service_queue";
    /// Topics the service listens to.
    pub const TOPICS: [&'static str; 1] = [topics::ORDER_CREATED];

    /// Start the service's worker pool.
    ///
    /// # Errors
    ///
    /// Returns a `PoolError` if the pool cannot be started.
    pub fn new(
        config: &ServiceConfig,
        ledger: Arc<ResourceLedger>,
        scheduler: Arc<DeferredScheduler>,
        bus: Arc<dyn EventBus>,
    ) -> Result<Self, PoolError> {
        let pool = WorkerPool::new("inventory", config.workers.clone())?;
        info!(workers = pool.stats().worker_count, delay_secs = config.delay_secs, "inventory service ready");
        Ok(Self {
            ledger,
            scheduler,
            bus,
            pool,
            delay: config.delay(),
        })
    }

    /// Hand an `order.created` event to the pool.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed payload or when the pool refuses the
    /// job, so the bus can redeliver.
    pub fn handle(self: &Arc<Self>, event: &Event) -> AppResult<()> {
        let order: Order = event.payload()?;
        let service = Arc::clone(self);
        self.pool.submit(move || service.reserve(order))?;
        Ok(())
    }

    /// Reserve stock for `order` and publish the outcome.
    pub fn reserve(&self, order: Order) {
        info!(order_id = %order.order_id, "checking inventory");

        if let Err(e) = self.ledger.check_and_reserve(&order.reservation()) {
            warn!(order_id = %order.order_id, error = %e, "reservation refused");
            let shortage = InventoryShortage {
                order_id: order.order_id,
                reason: e.to_string(),
            };
            if let Err(e) = publish_json(self.bus.as_ref(), topics::INVENTORY_INSUFFICIENT, &shortage) {
                error!(order_id = %shortage.order_id, error = %e, "failed to publish shortage");
            }
            return;
        }

        let order_id = order.order_id.clone();
        let bus = Arc::clone(&self.bus);
        self.scheduler.call_later(self.delay, move || {
            publish_json(bus.as_ref(), topics::INVENTORY_RESERVED, &order)?;
            Ok(())
        });
        info!(%order_id, delay = ?self.delay, "inventory reserved, event scheduled");
    }

    /// Bus handler that feeds events into [`handle`](Self::handle).
    #[must_use]
    pub fn event_handler(self: &Arc<Self>) -> EventHandler {
        let service = Arc::clone(self);
        handler(move |event| service.handle(event))
    }

    /// The ledger reservations are made against.
    #[must_use]
    pub fn ledger(&self) -> &Arc<ResourceLedger> {
        &self.ledger
    }

    /// Worker pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Drain and stop the worker pool.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}
