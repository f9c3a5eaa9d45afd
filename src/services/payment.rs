//! Payment stage: charge reserved orders and announce the result after a delay.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::core::{AppResult, DeferredScheduler, PoolError, PoolStats, WorkerPool};
use crate::infra::bus::{handler, publish_json, topics, Event, EventBus, EventHandler};
use crate::services::model::{Order, PaymentDeclined, PaymentReceipt};
use crate::util::clock::now_ms;

/// Result of a charge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    /// The charge went through.
    Approved {
        /// Gateway reference.
        payment_id: String,
    },
    /// The charge was refused.
    Declined {
        /// Gateway explanation.
        reason: String,
    },
}

/// Something that can take money for an order.
pub trait PaymentGateway: Send + Sync {
    /// Charge `amount` for `order_id`.
    fn charge(&self, order_id: &str, amount: f64) -> ChargeOutcome;
}

/// Gateway that approves every charge with a random payment id.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproveAll;

impl PaymentGateway for ApproveAll {
    fn charge(&self, _order_id: &str, _amount: f64) -> ChargeOutcome {
        ChargeOutcome::Approved {
            payment_id: Uuid::new_v4().to_string(),
        }
    }
}

/// Charges orders on `inventory.reserved` and schedules `payment.processed`
/// or `payment.failed`.
pub struct PaymentService {
    gateway: Arc<dyn PaymentGateway>,
    scheduler: Arc<DeferredScheduler>,
    bus: Arc<dyn EventBus>,
    pool: WorkerPool,
    delay: Duration,
}

impl PaymentService {
    /// Queue the service consumes from.
    pub const QUEUE: &'static str = "payment_service_queue";
    /// Topics the service listens to.
    pub const TOPICS: [&'static str; 1] = [topics::INVENTORY_RESERVED];

    /// Start the service's worker pool.
    ///
    /// # Errors
    ///
    /// Returns a `PoolError` if the pool cannot be started.
    pub fn new(
        config: &ServiceConfig,
        gateway: Arc<dyn PaymentGateway>,
        scheduler: Arc<DeferredScheduler>,
        bus: Arc<dyn EventBus>,
    ) -> Result<Self, PoolError> {
        let pool = WorkerPool::new("payment", config.workers.clone())?;
        info!(workers = pool.stats().worker_count, delay_secs = config.delay_secs, "payment service ready");
        Ok(Self {
            gateway,
            scheduler,
            bus,
            pool,
            delay: config.delay(),
        })
    }

    /// Hand an `inventory.reserved` event to the pool.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed payload or when the pool refuses the job.
    pub fn handle(self: &Arc<Self>, event: &Event) -> AppResult<()> {
        let order: Order = event.payload()?;
        let service = Arc::clone(self);
        self.pool.submit(move || service.process(&order))?;
        Ok(())
    }

    /// Charge `order` and schedule the outcome event.
    pub fn process(&self, order: &Order) {
        let order_id = order.order_id.clone();
        let amount = order.total_amount;
        info!(%order_id, amount, "processing payment");

        let bus = Arc::clone(&self.bus);
        match self.gateway.charge(&order_id, amount) {
            ChargeOutcome::Approved { payment_id } => {
                let receipt = PaymentReceipt {
                    order_id: order_id.clone(),
                    payment_id,
                    amount,
                    timestamp_ms: now_ms(),
                };
                self.scheduler.call_later(self.delay, move || {
                    publish_json(bus.as_ref(), topics::PAYMENT_PROCESSED, &receipt)?;
                    Ok(())
                });
                info!(%order_id, delay = ?self.delay, "payment processed, event scheduled");
            }
            ChargeOutcome::Declined { reason } => {
                warn!(%order_id, %reason, "payment declined");
                let declined = PaymentDeclined {
                    order_id: order_id.clone(),
                    reason,
                    amount,
                    timestamp_ms: now_ms(),
                };
                self.scheduler.call_later(self.delay, move || {
                    publish_json(bus.as_ref(), topics::PAYMENT_FAILED, &declined)?;
                    Ok(())
                });
            }
        }
    }

    /// Bus handler that feeds events into [`handle`](Self::handle).
    #[must_use]
    pub fn event_handler(self: &Arc<Self>) -> EventHandler {
        let service = Arc::clone(self);
        handler(move |event| service.handle(event))
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
