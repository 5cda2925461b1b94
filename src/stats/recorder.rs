//! Execution metrics.
//!
//! Supervised executions and schedule transitions are written straight to the
//! `metrics` facade once [`RuntimeBuilder::with_metrics`](crate::RuntimeBuilder::with_metrics)
//! is set. Install any `metrics` recorder (Prometheus exporter, statsd, ...) before
//! building the runtime; without one, recording is a no-op.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};

use crate::core::ExecLabels;

/// Executions counter (success and failure).
pub const EXECUTIONS_TOTAL: &str = "stagehand_executions_total";

/// Failed executions counter.
pub const EXECUTION_ERRORS_TOTAL: &str = "stagehand_execution_errors_total";

/// Execution duration histogram.
pub const EXECUTION_DURATION: &str = "stagehand_execution_duration_seconds";

/// Running schedules gauge.
pub const ACTIVE_SCHEDULES: &str = "stagehand_active_schedules";

/// Registers the metric descriptions.
///
/// Call this once at startup after installing the metrics recorder.
pub fn register_metrics() {
    describe_counter!(EXECUTIONS_TOTAL, "Total supervised executions");
    describe_counter!(EXECUTION_ERRORS_TOTAL, "Total supervised executions that failed");
    describe_histogram!(EXECUTION_DURATION, "Duration of supervised executions in seconds");
    describe_gauge!(ACTIVE_SCHEDULES, "Schedules currently running");
}

/// `kind`, `context` and `label` of one labeled execution.
fn execution_labels(labels: &ExecLabels, label: &str) -> [(&'static str, String); 3] {
    [
        ("kind", labels.kind.as_str().to_string()),
        ("context", labels.context.to_string()),
        ("label", label.to_string()),
    ]
}

pub(crate) fn record_execution(labels: &ExecLabels, elapsed: Duration, failed: bool) {
    let Some(label) = labels.label.as_deref() else {
        return;
    };
    let labels = execution_labels(labels, label);

    counter!(EXECUTIONS_TOTAL, &labels).increment(1);
    if failed {
        counter!(EXECUTION_ERRORS_TOTAL, &labels).increment(1);
    }
    histogram!(EXECUTION_DURATION, &labels).record(elapsed.as_secs_f64());
}

pub(crate) fn record_schedule(running: bool) {
    if running {
        gauge!(ACTIVE_SCHEDULES).increment(1.0);
    } else {
        gauge!(ACTIVE_SCHEDULES).decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ExecKind;

    #[test]
    fn schedule_and_sequence_executions_are_told_apart() {
        let tick = ExecLabels::new(ExecKind::Schedule, "lights", Some("sunset"));
        let double_on = ExecLabels::new(ExecKind::Sequence, "lights", Some("sunset"));

        let a = execution_labels(&tick, "sunset");
        let b = execution_labels(&double_on, "sunset");
        assert_eq!(a[0], ("kind", "schedule".to_string()));
        assert_eq!(b[0], ("kind", "sequence".to_string()));
        assert_eq!(a[1..], b[1..]);
    }
}
