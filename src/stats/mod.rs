//! # Execution statistics.
//!
//! Written synchronously from the supervisor, independent of the lossy event bus:
//! an in-memory [`ExecutionTracker`] and, when enabled, the `metrics` facade.

mod recorder;
mod tracker;

pub(crate) use recorder::{record_execution, record_schedule};
pub use recorder::{
    ACTIVE_SCHEDULES, EXECUTION_DURATION, EXECUTION_ERRORS_TOTAL, EXECUTIONS_TOTAL,
    register_metrics,
};
pub use tracker::{ExecStats, ExecutionTracker};
