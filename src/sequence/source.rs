//! # Event sources.
//!
//! The matcher consumes events through [`EventSource`]: subscribe a handler to an event
//! type, get back an [`Unsubscribe`] that detaches it. Transport modules (MQTT, home
//! automation websockets, ...) implement the trait; [`LocalEventSource`] is the
//! in-process implementation.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use serde_json::{Value, json};
//! use stagehand::{EventSource, LocalEventSource};
//!
//! let source = LocalEventSource::new();
//! let seen = Arc::new(AtomicUsize::new(0));
//! let s = seen.clone();
//! let unsubscribe = source.on_event("button", Arc::new(move |_: &Value| {
//!     s.fetch_add(1, Ordering::SeqCst);
//! }));
//!
//! source.emit("button", &json!({ "action": "single" }));
//! unsubscribe.call();
//! source.emit("button", &json!({ "action": "single" }));
//! assert_eq!(seen.load(Ordering::SeqCst), 1);
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::Value;

/// Handler invoked with each event payload.
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Detaches a handler registered with [`EventSource::on_event`]. Runs at most once.
#[must_use = "dropping an Unsubscribe keeps the handler attached"]
pub struct Unsubscribe(Option<Box<dyn FnOnce() + Send>>);

impl Unsubscribe {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(f)))
    }

    /// An unsubscribe that does nothing.
    pub fn noop() -> Self {
        Self(None)
    }

    /// Detaches the handler.
    pub fn call(mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

/// Source of typed JSON events.
///
/// `on_event` must not invoke `handler` before returning.
pub trait EventSource: Send + Sync {
    fn on_event(&self, event_type: &str, handler: EventHandler) -> Unsubscribe;
}

type HandlerMap = HashMap<String, Vec<(u64, EventHandler)>>;

/// In-process event source.
///
/// Cheap to clone; clones share handlers.
#[derive(Clone, Default)]
pub struct LocalEventSource {
    handlers: Arc<RwLock<HandlerMap>>,
    next_id: Arc<AtomicU64>,
}

impl LocalEventSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `payload` to every handler of `event_type`, in registration order.
    pub fn emit(&self, event_type: &str, payload: &Value) {
        let handlers: Vec<EventHandler> = match self.handlers.read().get(event_type) {
            Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
            None => return,
        };
        for handler in handlers {
            handler(payload);
        }
    }

    /// Number of handlers attached to `event_type`.
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers.read().get(event_type).map_or(0, Vec::len)
    }
}

impl EventSource for LocalEventSource {
    fn on_event(&self, event_type: &str, handler: EventHandler) -> Unsubscribe {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .write()
            .entry(event_type.to_string())
            .or_default()
            .push((id, handler));

        let handlers: Weak<RwLock<HandlerMap>> = Arc::downgrade(&self.handlers);
        let event_type = event_type.to_string();
        Unsubscribe::new(move || {
            let Some(handlers) = handlers.upgrade() else {
                return;
            };
            let mut map = handlers.write();
            if let Some(list) = map.get_mut(&event_type) {
                list.retain(|(h, _)| *h != id);
                if list.is_empty() {
                    map.remove(&event_type);
                }
            }
        })
    }
}
