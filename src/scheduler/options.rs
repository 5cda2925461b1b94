//! # Schedule options.
//!
//! One options struct per strategy. Each carries the callback and an optional label;
//! the context comes from the [`Scheduler`](super::Scheduler) that builds the schedule.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use stagehand::{CallbackFn, CallbackRef, CronOptions, IntervalOptions, TaskError};
//!
//! let tick: CallbackRef = CallbackFn::arc("tick", || async { Ok::<_, TaskError>(()) });
//!
//! let every_minute = CronOptions::new(["* * * * *"], tick.clone()).with_label("tick");
//! assert_eq!(every_minute.schedule, vec!["* * * * *".to_string()]);
//!
//! let poll = IntervalOptions::new(Duration::from_secs(30), tick);
//! assert!(poll.label.is_none());
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::lifecycle::CallbackRef;

/// Computes the next instant a sliding schedule should fire; `None` skips this round.
pub type NextFn = Arc<dyn Fn() -> Option<DateTime<Utc>> + Send + Sync>;

/// Calendar schedule: one timer per expression.
///
/// Five-field expressions (`min hour dom month dow`) get a leading seconds field `0`;
/// six- and seven-field expressions are used as written.
#[derive(Clone)]
pub struct CronOptions {
    pub schedule: Vec<String>,
    pub exec: CallbackRef,
    pub label: Option<String>,
}

impl CronOptions {
    pub fn new<I, S>(schedule: I, exec: CallbackRef) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            schedule: schedule.into_iter().map(Into::into).collect(),
            exec,
            label: None,
        }
    }

    /// Returns the options with a metrics/log label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Fixed-period schedule; the first run happens one period after start.
#[derive(Clone)]
pub struct IntervalOptions {
    pub interval: Duration,
    pub exec: CallbackRef,
    pub label: Option<String>,
}

impl IntervalOptions {
    pub fn new(interval: Duration, exec: CallbackRef) -> Self {
        Self {
            interval,
            exec,
            label: None,
        }
    }

    /// Returns the options with a metrics/log label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Dynamic schedule.
///
/// On every `reset` occurrence `next` is asked for the upcoming fire instant and a
/// single one-shot timer is armed for it. A pending one-shot is replaced, not queued.
#[derive(Clone)]
pub struct SlidingOptions {
    pub reset: String,
    pub next: NextFn,
    pub exec: CallbackRef,
    pub label: Option<String>,
}

impl SlidingOptions {
    pub fn new<F>(reset: impl Into<String>, next: F, exec: CallbackRef) -> Self
    where
        F: Fn() -> Option<DateTime<Utc>> + Send + Sync + 'static,
    {
        Self {
            reset: reset.into(),
            next: Arc::new(next),
            exec,
            label: None,
        }
    }

    /// Returns the options with a metrics/log label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}
