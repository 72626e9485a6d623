//! In-process message bus carrying completion messages from workers to the bridge.
//!
//! Handlers are registered against string addresses. Publishing snapshots the handlers for an address and
//! invokes them on the publishing thread, outside the registry lock, so a handler may itself subscribe or
//! unsubscribe without deadlocking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use harness_core::{COMPLETION_TOKEN_KEY, CompletionMessage, CompletionSink};
use serde_json::Value;

type Handler = Arc<dyn Fn(Value) + Send + Sync>;

/// Registration handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    address: String,
    id: u64,
}

impl Subscription {
    pub fn address(&self) -> &str {
        &self.address
    }
}

#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<HashMap<String, Vec<(u64, Handler)>>>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<String, Vec<(u64, Handler)>>> {
        self.handlers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register `handler` for messages published on `address`.
    pub fn subscribe<F>(&self, address: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        let address = address.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry()
            .entry(address.clone())
            .or_default()
            .push((id, Arc::new(handler)));
        tracing::trace!(address = %address, id, "handler registered");
        Subscription { address, id }
    }

    /// Remove a registration. Returns `false` if it was already removed.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut registry = self.registry();
        let Some(handlers) = registry.get_mut(&subscription.address) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(id, _)| *id != subscription.id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            registry.remove(&subscription.address);
        }
        tracing::trace!(address = %subscription.address, id = subscription.id, removed, "handler unregistered");
        removed
    }

    /// Deliver `body` to every handler registered on `address`.
    ///
    /// ## Returns
    /// - (`usize`): the number of handlers reached. Zero is not an error: nobody was listening.
    pub fn publish(&self, address: &str, body: Value) -> usize {
        let handlers: Vec<Handler> = match self.registry().get(address) {
            Some(handlers) => handlers.iter().map(|(_, h)| Arc::clone(h)).collect(),
            None => Vec::new(),
        };
        if handlers.is_empty() {
            tracing::debug!(address, "message published with no registered handler; dropped");
            return 0;
        }
        let count = handlers.len();
        for handler in handlers {
            handler(body.clone());
        }
        count
    }

    pub fn handler_count(&self, address: &str) -> usize {
        self.registry().get(address).map_or(0, Vec::len)
    }
}

/// [`CompletionSink`] that publishes onto a bus address.
pub struct BusSink {
    bus: Arc<EventBus>,
    address: String,
    token: Option<String>,
}

impl BusSink {
    pub fn new(bus: Arc<EventBus>, address: impl Into<String>) -> Self {
        Self {
            bus,
            address: address.into(),
            token: None,
        }
    }

    /// Stamp every published body with `token` under [`COMPLETION_TOKEN_KEY`].
    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }
}

impl CompletionSink for BusSink {
    fn publish(&self, message: CompletionMessage) {
        let mut body = message.to_value();
        if let (Some(token), Value::Object(fields)) = (&self.token, &mut body) {
            fields.insert(COMPLETION_TOKEN_KEY.to_string(), Value::String(token.clone()));
        }
        self.bus.publish(&self.address, body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_publish_reaches_subscriber() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe("a", move |v| sink.lock().unwrap().push(v));
        assert_eq!(bus.publish("a", json!({"type": "done"})), 1);
        assert_eq!(bus.publish("b", json!(1)), 0);
        assert_eq!(*seen.lock().unwrap(), vec![json!({"type": "done"})]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicU64::new(0));
        let counter = count.clone();
        let sub = bus.subscribe("a", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish("a", Value::Null);
        assert!(bus.unsubscribe(&sub));
        assert!(!bus.unsubscribe(&sub));
        bus.publish("a", Value::Null);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.handler_count("a"), 0);
    }

    #[test]
    fn test_handler_may_unsubscribe_itself() {
        let bus = Arc::new(EventBus::new());
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let (inner_bus, inner_slot) = (bus.clone(), slot.clone());
        let sub = bus.subscribe("a", move |_| {
            if let Some(sub) = inner_slot.lock().unwrap().take() {
                inner_bus.unsubscribe(&sub);
            }
        });
        *slot.lock().unwrap() = Some(sub);
        assert_eq!(bus.publish("a", Value::Null), 1);
        assert_eq!(bus.handler_count("a"), 0);
    }

    #[test]
    fn test_bus_sink_publishes_wire_form() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        bus.subscribe("done-here", move |v| *slot.lock().unwrap() = Some(v));
        BusSink::new(bus, "done-here").publish(CompletionMessage::Done);
        assert_eq!(*seen.lock().unwrap(), Some(json!({"type": "done"})));
    }

    #[test]
    fn test_bus_sink_stamps_token() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        bus.subscribe("done-here", move |v| *slot.lock().unwrap() = Some(v));
        BusSink::new(bus, "done-here")
            .with_token(Some("run-7".to_string()))
            .publish(CompletionMessage::Done);
        assert_eq!(
            *seen.lock().unwrap(),
            Some(json!({"type": "done", "completionToken": "run-7"}))
        );
    }
}
