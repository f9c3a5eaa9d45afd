//! Publish/subscribe event bus contract.
//!
//! The transport is a collaborator: any broker with topic routing and
//! at-least-once delivery fits behind [`EventBus`]. Handlers may be invoked
//! concurrently for different events, so everything they touch must be
//! thread-safe.

pub mod memory;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::AppResult;
use crate::util::clock::now_ms;

pub use memory::InMemoryEventBus;

/// Routing keys used by the order pipeline.
pub mod topics {
    /// A new order was accepted.
    pub const ORDER_CREATED: &str = "order.created";
    /// Stock for every line of an order was reserved.
    pub const INVENTORY_RESERVED: &str = "inventory.reserved";
    /// An order could not be reserved.
    pub const INVENTORY_INSUFFICIENT: &str = "inventory.insufficient";
    /// Payment succeeded.
    pub const PAYMENT_PROCESSED: &str = "payment.processed";
    /// Payment was declined.
    pub const PAYMENT_FAILED: &str = "payment.failed";
    /// The order reached a terminal state.
    pub const ORDER_FINAL: &str = "order.final";
}

/// Envelope carried on the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Routing key.
    pub event_type: String,
    /// Unique id, `{event_type}_{uuid}`.
    pub event_id: String,
    /// Publication time, milliseconds since the Unix epoch.
    pub timestamp_ms: u128,
    /// Event payload.
    pub data: serde_json::Value,
}

impl Event {
    /// Wrap `data` in a fresh envelope.
    #[must_use]
    pub fn new(event_type: &str, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            event_id: format!("{event_type}_{}", Uuid::new_v4()),
            timestamp_ms: now_ms(),
            data,
        }
    }

    /// Deserialize the payload.
    ///
    /// # Errors
    ///
    /// Returns `BusError::Payload` if the payload does not match `T`.
    pub fn payload<T: serde::de::DeserializeOwned>(&self) -> Result<T, BusError> {
        serde_json::from_value(self.data.clone()).map_err(|e| BusError::Payload {
            event_type: self.event_type.clone(),
            source: e,
        })
    }
}

/// Callback invoked for each delivered event. An `Err` asks for redelivery.
pub type EventHandler = Arc<dyn Fn(&Event) -> AppResult<()> + Send + Sync + 'static>;

/// Wrap a closure as an [`EventHandler`].
pub fn handler<F>(f: F) -> EventHandler
where
    F: Fn(&Event) -> AppResult<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Errors raised by bus adapters.
#[derive(Debug, Error)]
pub enum BusError {
    /// The payload could not be encoded.
    #[error("failed to encode {event_type} payload: {source}")]
    Encode {
        /// Routing key of the event.
        event_type: String,
        /// Underlying serializer error.
        #[source]
        source: serde_json::Error,
    },
    /// The payload did not match the expected shape.
    #[error("malformed {event_type} payload: {source}")]
    Payload {
        /// Routing key of the event.
        event_type: String,
        /// Underlying deserializer error.
        #[source]
        source: serde_json::Error,
    },
    /// The bus has been closed.
    #[error("event bus is closed")]
    Closed,
}

/// Topic-routed publish/subscribe transport.
pub trait EventBus: Send + Sync {
    /// Publish `data` under `event_type`, returning the envelope sent.
    ///
    /// # Errors
    ///
    /// Returns a `BusError` if the event could not be handed to the transport.
    fn publish(&self, event_type: &str, data: serde_json::Value) -> Result<Event, BusError>;

    /// Bind `queue` to `topics` and deliver matching events to `handler`.
    ///
    /// # Errors
    ///
    /// Returns a `BusError` if the binding could not be created.
    fn subscribe(&self, queue: &str, topics: &[&str], handler: EventHandler) -> Result<(), BusError>;
}

/// Serialize `payload` and publish it.
///
/// # Errors
///
/// Returns `BusError::Encode` if serialization fails, or whatever the bus returns.
pub fn publish_json<T: Serialize + ?Sized>(
    bus: &dyn EventBus,
    event_type: &str,
    payload: &T,
) -> Result<Event, BusError> {
    let data = serde_json::to_value(payload).map_err(|e| BusError::Encode {
        event_type: event_type.to_string(),
        source: e,
    })?;
    bus.publish(event_type, data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_envelope() {
        let event = Event::new(topics::ORDER_CREATED, json!({"order_id": "o-1"}));
        assert_eq!(event.event_type, "order.created");
        assert!(event.event_id.starts_with("order.created_"));
        assert!(event.timestamp_ms > 0);
    }

    #[test]
    fn test_payload_mismatch_is_reported() {
        #[derive(Debug, Deserialize)]
        struct Needs {
            #[allow(dead_code)]
            order_id: String,
        }
        let event = Event::new(topics::PAYMENT_FAILED, json!({"amount": 3}));
        let err = event.payload::<Needs>().unwrap_err();
        assert!(err.to_string().starts_with("malformed payment.failed payload"));
    }
}
