//! In-process event bus for development and testing.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, warn};

use super::{BusError, Event, EventBus, EventHandler};

struct Subscription {
    queue: String,
    topics: Vec<String>,
    handler: EventHandler,
}

impl Subscription {
    fn matches(&self, event_type: &str) -> bool {
        self.topics.iter().any(|topic| topic == event_type)
    }
}

/// Synchronous in-memory bus.
///
/// `publish` delivers to every matching queue on the caller's thread. A
/// handler that fails (or panics) is retried up to `max_deliveries` times,
/// standing in for a broker's nack-and-requeue; after that the event is
/// dropped for that queue. Published events are kept in a bounded log.
pub struct InMemoryEventBus {
    subscriptions: RwLock<Vec<Arc<Subscription>>>,
    log: Mutex<VecDeque<Event>>,
    max_log: usize,
    max_deliveries: u32,
    closed: AtomicBool,
}

impl InMemoryEventBus {
    /// Bus keeping the last 1024 events and delivering each up to 3 times.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(1024, 3)
    }

    /// Bus with explicit log size and delivery attempts (minimum 1).
    #[must_use]
    pub fn with_limits(max_log: usize, max_deliveries: u32) -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            log: Mutex::new(VecDeque::with_capacity(max_log.min(1024))),
            max_log,
            max_deliveries: max_deliveries.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Snapshot of the published-event log, oldest first.
    #[must_use]
    pub fn published(&self) -> Vec<Event> {
        self.log.lock().iter().cloned().collect()
    }

    /// Logged events of one type, oldest first.
    #[must_use]
    pub fn published_of(&self, event_type: &str) -> Vec<Event> {
        self.log
            .lock()
            .iter()
            .filter(|event| event.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Reject further publishes.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        debug!("event bus closed");
    }

    fn record(&self, event: &Event) {
        if self.max_log == 0 {
            return;
        }
        let mut log = self.log.lock();
        if log.len() >= self.max_log {
            log.pop_front();
        }
        log.push_back(event.clone());
    }

    fn deliver(&self, subscription: &Subscription, event: &Event) {
        for attempt in 1..=self.max_deliveries {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (subscription.handler)(event)));
            match outcome {
                Ok(Ok(())) => return,
                Ok(Err(e)) => warn!(
                    queue = %subscription.queue,
                    event_id = %event.event_id,
                    attempt,
                    error = %e,
                    "handler failed, redelivering"
                ),
                Err(_) => warn!(
                    queue = %subscription.queue,
                    event_id = %event.event_id,
                    attempt,
                    "handler panicked, redelivering"
                ),
            }
        }
        error!(
            queue = %subscription.queue,
            event_id = %event.event_id,
            attempts = self.max_deliveries,
            "dropping event after repeated handler failures"
        );
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for InMemoryEventBus {
    fn publish(&self, event_type: &str, data: serde_json::Value) -> Result<Event, BusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        let event = Event::new(event_type, data);
        self.record(&event);
        debug!(event_type, event_id = %event.event_id, "published event");

        // Release the subscription lock before dispatch so handlers may publish.
        let targets: Vec<Arc<Subscription>> = self
            .subscriptions
            .read()
            .iter()
            .filter(|sub| sub.matches(event_type))
            .cloned()
            .collect();
        for subscription in &targets {
            self.deliver(subscription, &event);
        }
        Ok(event)
    }

    fn subscribe(&self, queue: &str, topics: &[&str], handler: EventHandler) -> Result<(), BusError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BusError::Closed);
        }
        self.subscriptions.write().push(Arc::new(Subscription {
            queue: queue.to_string(),
            topics: topics.iter().map(|t| (*t).to_string()).collect(),
            handler,
        }));
        debug!(queue, ?topics, "subscribed");
        Ok(())
    }
}
