//! # Runtime events emitted by the lifecycle, scheduler and sequence matcher.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Lifecycle events**: stage execution flow and child attachment
//! - **Execution events**: outcome of every supervised callback
//! - **Scheduler/matcher events**: schedule state changes, matches, expiries
//! - **Subscriber events**: fan-out overflow and panics
//!
//! The [`Event`] struct carries additional metadata such as timestamps, the
//! `{context, label}` pair, stage, durations and reasons.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use stagehand::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::ExecFailed)
//!     .with_context("lights")
//!     .with_label("sunset")
//!     .with_reason("boom")
//!     .with_duration(Duration::from_millis(12));
//!
//! assert_eq!(ev.kind, EventKind::ExecFailed);
//! assert_eq!(ev.label.as_deref(), Some("sunset"));
//! assert_eq!(ev.duration_ms, Some(12));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::lifecycle::Stage;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Lifecycle events ===
    /// A stage is about to run its callbacks.
    ///
    /// Sets: `stage`
    StageStarting,

    /// A stage finished; every callback settled.
    ///
    /// Sets: `stage`, `duration_ms`
    StageCompleted,

    /// A boot stage failed and the boot sequence was aborted.
    ///
    /// Sets: `stage`, `label` (callback name), `reason`
    StageFailed,

    /// A callback was registered after its stage had already run.
    ///
    /// Sets: `stage`, `label` (callback name)
    LateRegistration,

    /// A child lifecycle merged its callbacks into the root.
    ///
    /// Sets: `context` (child name)
    ChildAttached,

    // === Execution events ===
    /// A supervised callback completed.
    ///
    /// Sets: `context`, `label`, `duration_ms`
    ExecSucceeded,

    /// A supervised callback failed or panicked; the error was swallowed.
    ///
    /// Sets: `context`, `label`, `duration_ms`, `reason`
    ExecFailed,

    // === Scheduler events ===
    /// A schedule handle moved to `Running`.
    ///
    /// Sets: `context`, `label`
    ScheduleStarted,

    /// A schedule handle moved to `Stopped`.
    ///
    /// Sets: `context`, `label`
    ScheduleStopped,

    /// A sliding schedule skipped or replaced a pending execution.
    ///
    /// Sets: `context`, `label`, `reason`
    ScheduleSkipped,

    // === Sequence matcher events ===
    /// A watcher's history matched its target sequence.
    ///
    /// Sets: `context`, `label`
    SequenceMatched,

    /// A partial history expired without completing.
    ///
    /// Sets: `context`, `label`
    SequenceExpired,

    /// The matcher subscribed to an event type on its source.
    ///
    /// Sets: `reason` (event type)
    SubscriptionOpened,

    /// The matcher released its subscription for an event type.
    ///
    /// Sets: `reason` (event type)
    SubscriptionClosed,

    // === Shutdown events ===
    /// Shutdown requested (OS signal observed).
    ShutdownRequested,

    // === Subscriber events ===
    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `context` (subscriber name), `reason`
    SubscriberOverflow,

    /// Subscriber panicked during event processing.
    ///
    /// Sets: `context` (subscriber name), `reason`
    SubscriberPanicked,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Lifecycle stage, if applicable.
    pub stage: Option<Stage>,
    /// Owning module context (scheduler context, child name, subscriber name).
    pub context: Option<Arc<str>>,
    /// Label inside the context (schedule or watcher label, callback name).
    pub label: Option<Arc<str>>,
    /// Duration in milliseconds (compact).
    pub duration_ms: Option<u32>,
    /// Human-readable reason (errors, overflow details, event type).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            stage: None,
            context: None,
            label: None,
            duration_ms: None,
            reason: None,
        }
    }

    /// Attaches a lifecycle stage.
    #[inline]
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Attaches a context.
    #[inline]
    pub fn with_context(mut self, context: impl Into<Arc<str>>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Attaches a label.
    #[inline]
    pub fn with_label(mut self, label: impl Into<Arc<str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Attaches an optional label; `None` leaves the field empty.
    #[inline]
    pub fn with_label_opt(mut self, label: Option<&str>) -> Self {
        self.label = label.map(Arc::from);
        self
    }

    /// Attaches a duration (stored as milliseconds).
    #[inline]
    pub fn with_duration(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.duration_ms = Some(ms);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_context(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_context(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::new(EventKind::StageStarting);
        let b = Event::new(EventKind::StageCompleted);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn duration_saturates() {
        let ev = Event::new(EventKind::ExecSucceeded).with_duration(Duration::from_secs(u64::MAX));
        assert_eq!(ev.duration_ms, Some(u32::MAX));
    }
}
