//! Customer notifications and the terminal `order.final` event.

use std::sync::Arc;

use tracing::info;

use crate::core::AppResult;
use crate::infra::bus::{handler, topics, Event, EventBus, EventHandler};
use crate::services::model::{InventoryShortage, Order, OrderRef};

/// Delivery channel for notifications.
pub trait Notifier: Send + Sync {
    /// Send `message` to `recipient`.
    ///
    /// # Errors
    ///
    /// Returns an error if the message could not be delivered.
    fn notify(&self, recipient: &str, message: &str) -> AppResult<()>;
}

/// Notifier that writes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, recipient: &str, message: &str) -> AppResult<()> {
        info!(recipient, message, "notification");
        Ok(())
    }
}

/// Tells customers about their orders and republishes every terminal outcome
/// as `order.final`.
pub struct NotificationService {
    notifier: Arc<dyn Notifier>,
    bus: Arc<dyn EventBus>,
}

impl NotificationService {
    /// Queue the service consumes from.
    pub const QUEUE: &'static str = "notification_service_queue";
    /// Topics the service listens to.
    pub const TOPICS: [&'static str; 4] = [
        topics::ORDER_CREATED,
        topics::INVENTORY_INSUFFICIENT,
        topics::PAYMENT_PROCESSED,
        topics::PAYMENT_FAILED,
    ];

    /// Service notifying through `notifier` and publishing on `bus`.
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>, bus: Arc<dyn EventBus>) -> Self {
        Self { notifier, bus }
    }

    /// React to one event.
    ///
    /// # Errors
    ///
    /// Returns an error for a malformed payload, a failed notification, or a
    /// failed `order.final` publish.
    pub fn handle(&self, event: &Event) -> AppResult<()> {
        let terminal = match event.event_type.as_str() {
            topics::ORDER_CREATED => {
                let order: Order = event.payload()?;
                self.notifier.notify(
                    &order.customer_id,
                    &format!("Order {} received and is being processed", order.order_id),
                )?;
                false
            }
            topics::INVENTORY_INSUFFICIENT => {
                let shortage: InventoryShortage = event.payload()?;
                self.notifier.notify(
                    "system",
                    &format!("Order {} failed: {}", shortage.order_id, shortage.reason),
                )?;
                true
            }
            topics::PAYMENT_PROCESSED => {
                let OrderRef { order_id } = event.payload()?;
                self.notifier
                    .notify("system", &format!("Payment successful! Order {order_id} confirmed"))?;
                true
            }
            topics::PAYMENT_FAILED => {
                let OrderRef { order_id } = event.payload()?;
                self.notifier
                    .notify("system", &format!("Payment failed for order {order_id}"))?;
                true
            }
            _ => false,
        };

        if terminal {
            self.bus.publish(topics::ORDER_FINAL, event.data.clone())?;
        }
        Ok(())
    }

    /// Bus handler that feeds events into [`handle`](Self::handle).
    #[must_use]
    pub fn event_handler(self: &Arc<Self>) -> EventHandler {
        let service = Arc::clone(self);
        handler(move |event| service.handle(event))
    }
}
