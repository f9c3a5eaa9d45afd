//! Infrastructure adapters: the event bus contract and its in-memory transport.

pub mod bus;

pub use bus::{Event, EventBus, EventHandler, InMemoryEventBus};
