//! # ExecutionTracker: in-memory execution statistics.
//!
//! Fed directly by the [`Supervisor`](crate::Supervisor), never through the bus, so
//! no execution is lost when observers fall behind:
//!
//! ```text
//! Supervisor::run ─► record(labels, elapsed, failed) ─► executions += 1
//!                                                       errors += failed
//!                                                       total += elapsed
//! ScheduleHandle  ─► schedule_transition(running)     ─► active ± 1
//! ```
//!
//! Handles report each `Created → Running → Stopped` transition once, so a
//! repeated `stop()` never moves the active count.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;

use crate::core::ExecLabels;

/// Counters for one `{context, label}` pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecStats {
    pub executions: u64,
    pub errors: u64,
    pub total_duration: Duration,
}

#[derive(Debug, Default)]
struct Inner {
    by_key: HashMap<(String, String), ExecStats>,
    active_schedules: i64,
}

/// Keeps execution counters and the number of running schedules.
#[derive(Debug, Default)]
pub struct ExecutionTracker {
    inner: RwLock<Inner>,
}

impl ExecutionTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters for `{context, label}`, if anything ran under that key.
    #[must_use]
    pub fn stats(&self, context: &str, label: &str) -> Option<ExecStats> {
        self.inner
            .read()
            .by_key
            .get(&(context.to_owned(), label.to_owned()))
            .copied()
    }

    /// Number of schedules currently running.
    #[must_use]
    pub fn active_schedules(&self) -> i64 {
        self.inner.read().active_schedules
    }

    /// Counts one execution; unlabeled executions have no key and are skipped.
    pub(crate) fn record(&self, labels: &ExecLabels, elapsed: Duration, failed: bool) {
        let Some(label) = labels.label.as_deref() else {
            return;
        };
        let mut g = self.inner.write();
        let entry = g
            .by_key
            .entry((labels.context.to_string(), label.to_owned()))
            .or_default();
        entry.executions += 1;
        if failed {
            entry.errors += 1;
        }
        entry.total_duration += elapsed;
    }

    pub(crate) fn schedule_transition(&self, running: bool) {
        let mut g = self.inner.write();
        if running {
            g.active_schedules += 1;
        } else {
            g.active_schedules -= 1;
        }
    }
}
