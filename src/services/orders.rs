//! Order intake and status tracking.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::core::AppResult;
use crate::infra::bus::{handler, publish_json, topics, Event, EventBus, EventHandler};
use crate::services::model::{
    InventoryShortage, NewOrder, Order, OrderError, OrderRef, OrderStatus, PaymentDeclined,
    PaymentReceipt,
};

/// Accepts orders, announces them, and follows their progress through the
/// inventory and payment events.
pub struct OrderTracker {
    orders: RwLock<HashMap<String, Order>>,
    bus: Arc<dyn EventBus>,
}

impl OrderTracker {
    /// Queue the tracker consumes from.
    pub const QUEUE: &'static str = "order_service_queue";
    /// Topics the tracker listens to.
    pub const TOPICS: [&'static str; 4] = [
        topics::INVENTORY_RESERVED,
        topics::INVENTORY_INSUFFICIENT,
        topics::PAYMENT_PROCESSED,
        topics::PAYMENT_FAILED,
    ];

    /// Tracker publishing on `bus`.
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>) -> Self {
        Self {
            orders: RwLock::new(HashMap::new()),
            bus,
        }
    }

    /// Validate and record a new order, then publish `order.created`.
    ///
    /// # Errors
    ///
    /// Returns the validation error, or `OrderError::Publish` if the bus
    /// refused the event (the order is then forgotten).
    pub fn create_order(&self, input: NewOrder) -> Result<Order, OrderError> {
        let order = Order::create(input)?;
        self.orders
            .write()
            .insert(order.order_id.clone(), order.clone());

        if let Err(e) = publish_json(self.bus.as_ref(), topics::ORDER_CREATED, &order) {
            self.orders.write().remove(&order.order_id);
            return Err(e.into());
        }
        info!(order_id = %order.order_id, total = order.total_amount, "order created");
        Ok(order)
    }

    /// Current view of an order.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` for an unknown id.
    pub fn get(&self, order_id: &str) -> Result<Order, OrderError> {
        self.orders
            .read()
            .get(order_id)
            .cloned()
            .ok_or_else(|| OrderError::NotFound(order_id.to_string()))
    }

    /// Status of an order, if known.
    #[must_use]
    pub fn status(&self, order_id: &str) -> Option<OrderStatus> {
        self.orders.read().get(order_id).map(|order| order.status)
    }

    /// Number of orders tracked.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    /// Whether no order has been accepted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }

    /// Fold an inventory or payment event into the order it names.
    ///
    /// Events for unknown orders are ignored, as are events that would move an
    /// order out of a terminal state.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is malformed.
    pub fn apply(&self, event: &Event) -> AppResult<()> {
        let OrderRef { order_id } = event.payload()?;
        let mut orders = self.orders.write();
        let Some(order) = orders.get_mut(&order_id) else {
            debug!(%order_id, event_type = %event.event_type, "event for unknown order");
            return Ok(());
        };
        if order.status.is_terminal() {
            debug!(%order_id, status = ?order.status, event_type = %event.event_type, "order already final");
            return Ok(());
        }

        match event.event_type.as_str() {
            topics::INVENTORY_RESERVED => {
                order.status = OrderStatus::InventoryReserved;
                info!(%order_id, "inventory reserved");
            }
            topics::INVENTORY_INSUFFICIENT => {
                let shortage: InventoryShortage = event.payload()?;
                order.status = OrderStatus::Failed;
                order.failure_reason = Some(shortage.reason);
                info!(%order_id, "insufficient inventory");
            }
            topics::PAYMENT_PROCESSED => {
                let receipt: PaymentReceipt = event.payload()?;
                order.status = OrderStatus::Completed;
                order.payment_id = Some(receipt.payment_id);
                info!(%order_id, "payment processed");
            }
            topics::PAYMENT_FAILED => {
                let declined: PaymentDeclined = event.payload()?;
                order.status = OrderStatus::PaymentFailed;
                order.failure_reason = Some(declined.reason);
                info!(%order_id, "payment failed");
            }
            other => debug!(event_type = other, "ignoring event"),
        }
        Ok(())
    }

    /// Bus handler that feeds events into [`apply`](Self::apply).
    #[must_use]
    pub fn event_handler(self: &Arc<Self>) -> EventHandler {
        let tracker = Arc::clone(self);
        handler(move |event| tracker.apply(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::bus::InMemoryEventBus;
    use crate::services::model::OrderItem;
    use serde_json::json;

    fn tracker() -> (Arc<InMemoryEventBus>, OrderTracker) {
        let bus = Arc::new(InMemoryEventBus::new());
        let tracker = OrderTracker::new(bus.clone());
        (bus, tracker)
    }

    fn new_order() -> NewOrder {
        NewOrder {
            customer_id: "cust-1".into(),
            items: vec![OrderItem::new("item_001", 1, 5.0)],
        }
    }

    #[test]
    fn test_create_publishes_order_created() {
        let (bus, tracker) = tracker();
        let order = tracker.create_order(new_order()).unwrap();

        let created = bus.published_of(topics::ORDER_CREATED);
        assert_eq!(created.len(), 1);
        let announced: Order = created[0].payload().unwrap();
        assert_eq!(announced, order);
        assert_eq!(tracker.status(&order.order_id), Some(OrderStatus::Pending));
    }

    #[test]
    fn test_closed_bus_forgets_order() {
        let (bus, tracker) = tracker();
        bus.close();
        assert!(matches!(tracker.create_order(new_order()), Err(OrderError::Publish(_))));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_apply_walks_status() {
        let (_bus, tracker) = tracker();
        let order = tracker.create_order(new_order()).unwrap();
        let id = order.order_id.as_str();

        tracker
            .apply(&Event::new(topics::INVENTORY_RESERVED, json!({ "order_id": id })))
            .unwrap();
        assert_eq!(tracker.status(id), Some(OrderStatus::InventoryReserved));

        tracker
            .apply(&Event::new(
                topics::PAYMENT_PROCESSED,
                json!({ "order_id": id, "payment_id": "pay-1", "amount": 5.0, "timestamp_ms": 1 }),
            ))
            .unwrap();
        let done = tracker.get(id).unwrap();
        assert_eq!(done.status, OrderStatus::Completed);
        assert_eq!(done.payment_id.as_deref(), Some("pay-1"));

        // Terminal orders stay put.
        tracker
            .apply(&Event::new(
                topics::INVENTORY_INSUFFICIENT,
                json!({ "order_id": id, "reason": "late" }),
            ))
            .unwrap();
        assert_eq!(tracker.status(id), Some(OrderStatus::Completed));
    }

    #[test]
    fn test_unknown_order_is_ignored() {
        let (_bus, tracker) = tracker();
        tracker
            .apply(&Event::new(topics::INVENTORY_RESERVED, json!({ "order_id": "nope" })))
            .unwrap();
        assert!(matches!(tracker.get("nope"), Err(OrderError::NotFound(_))));
    }

    #[test]
    fn test_malformed_payload_is_an_error() {
        let (_bus, tracker) = tracker();
        assert!(tracker
            .apply(&Event::new(topics::PAYMENT_FAILED, json!({ "id": 1 })))
            .is_err());
    }
}
