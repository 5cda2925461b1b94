//! # Subscriber contract.
//!
//! [`Subscribe`] is how code outside the runtime observes it: execution outcomes,
//! stage progress, schedule state and sequence matches all arrive as [`Event`]s.
//! Each subscriber gets its own worker task and bounded queue inside the
//! [`SubscriberSet`](crate::subscribers::SubscriberSet), so a slow one never delays
//! callbacks or other subscribers.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use stagehand::{Event, EventKind, Subscribe};
//!
//! struct FailureAlarm;
//!
//! #[async_trait]
//! impl Subscribe for FailureAlarm {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::ExecFailed {
//!             // page someone
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "failure-alarm"
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Receives runtime events on a dedicated worker.
///
/// Events are delivered in publish order per subscriber. When the queue is full the
/// event is dropped for this subscriber only and a `SubscriberOverflow` event is published.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &Event);

    /// Name used in logs and overflow/panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Capacity of this subscriber's queue (min 1).
    fn queue_capacity(&self) -> usize {
        1024
    }
}
