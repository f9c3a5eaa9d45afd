//! Order pipeline services wired to the event bus.
//!
//! Each service exposes its queue name, the topics it binds, and an
//! [`EventHandler`](crate::infra::bus::EventHandler) to subscribe with.

pub mod inventory;
pub mod model;
pub mod notification;
pub mod orders;
pub mod payment;

pub use inventory::InventoryService;
pub use model::{NewOrder, Order, OrderError, OrderItem, OrderStatus};
pub use notification::{LogNotifier, NotificationService, Notifier};
pub use orders::OrderTracker;
pub use payment::{ApproveAll, ChargeOutcome, PaymentGateway, PaymentService};
