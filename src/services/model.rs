//! Order domain types and the payloads the services exchange on the bus.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::ReservationRequest;
use crate::infra::bus::BusError;

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Resource key of the item.
    pub item_id: String,
    /// Units ordered.
    pub quantity: u64,
    /// Unit price.
    pub price: f64,
}

impl OrderItem {
    /// Build an item line.
    #[must_use]
    pub fn new(item_id: impl Into<String>, quantity: u64, price: f64) -> Self {
        Self {
            item_id: item_id.into(),
            quantity,
            price,
        }
    }
}

/// Where an order stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Accepted, waiting on inventory.
    Pending,
    /// Stock is held, waiting on payment.
    InventoryReserved,
    /// Paid.
    Completed,
    /// Stock could not be reserved.
    Failed,
    /// Payment was declined.
    PaymentFailed,
}

impl OrderStatus {
    /// Whether no further transition is expected.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::PaymentFailed)
    }
}

/// Input for creating an order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    /// Customer placing the order.
    pub customer_id: String,
    /// Requested lines.
    pub items: Vec<OrderItem>,
}

/// An order as tracked by the order service and carried on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Unique id.
    pub order_id: String,
    /// Customer placing the order.
    pub customer_id: String,
    /// Requested lines.
    pub items: Vec<OrderItem>,
    /// Sum of price times quantity over all lines.
    pub total_amount: f64,
    /// Current status.
    pub status: OrderStatus,
    /// Why the order failed, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Payment reference once paid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
}

impl Order {
    /// Validate `input` and assign a fresh id.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::MissingFields` without a customer id or items,
    /// and `OrderError::InvalidItem` for a line with an empty id or a
    /// negative or non-finite price.
    pub fn create(input: NewOrder) -> Result<Self, OrderError> {
        if input.customer_id.trim().is_empty() || input.items.is_empty() {
            return Err(OrderError::MissingFields);
        }
        if let Some(bad) = input
            .items
            .iter()
            .find(|item| item.item_id.is_empty() || !item.price.is_finite() || item.price < 0.0)
        {
            return Err(OrderError::InvalidItem(bad.item_id.clone()));
        }

        #[allow(clippy::cast_precision_loss)]
        let total_amount: f64 = input
            .items
            .iter()
            .map(|item| item.price * item.quantity as f64)
            .sum();

        Ok(Self {
            order_id: Uuid::new_v4().to_string(),
            customer_id: input.customer_id,
            items: input.items,
            total_amount,
            status: OrderStatus::Pending,
            failure_reason: None,
            payment_id: None,
        })
    }

    /// The stock this order needs, one line per item.
    #[must_use]
    pub fn reservation(&self) -> ReservationRequest {
        self.items
            .iter()
            .map(|item| (item.item_id.clone(), item.quantity))
            .collect()
    }
}

/// Any payload that names an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRef {
    /// Order the event is about.
    pub order_id: String,
}

/// Payload of `inventory.insufficient`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryShortage {
    /// Order that could not be reserved.
    pub order_id: String,
    /// Human-readable cause.
    pub reason: String,
}

/// Payload of `payment.processed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    /// Order that was paid.
    pub order_id: String,
    /// Gateway reference.
    pub payment_id: String,
    /// Amount charged.
    pub amount: f64,
    /// When the charge was made, milliseconds since the Unix epoch.
    pub timestamp_ms: u128,
}

/// Payload of `payment.failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentDeclined {
    /// Order whose payment failed.
    pub order_id: String,
    /// Why the gateway declined.
    pub reason: String,
    /// Amount that was attempted.
    pub amount: f64,
    /// When the attempt was made, milliseconds since the Unix epoch.
    pub timestamp_ms: u128,
}

/// Errors raised by the order service.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Customer id or items missing.
    #[error("missing required fields")]
    MissingFields,
    /// An item line is malformed.
    #[error("invalid item: {0:?}")]
    InvalidItem(String),
    /// No order with this id.
    #[error("order not found: {0}")]
    NotFound(String),
    /// The order could not be announced.
    #[error(transparent)]
    Publish(#[from] BusError),
}
