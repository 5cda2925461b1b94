//! Error types used by the stagehand runtime and its callbacks.
//!
//! This module defines two main error enums:
//!
//! - [`RuntimeError`]: errors raised by the runtime core itself (lifecycle misuse,
//!   fatal boot failures, invalid schedules, shutdown overruns).
//! - [`TaskError`]: errors raised by individual callbacks (lifecycle callbacks,
//!   scheduled bodies, sequence-match triggers).
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics.

use std::fmt::Display;
use std::time::Duration;

use thiserror::Error;

use crate::lifecycle::Stage;

/// # Errors produced by the stagehand runtime.
///
/// Three families live here:
/// - **Bootstrap-fatal**: [`RuntimeError::StageFailed`], [`RuntimeError::AttachFailed`]
/// - **Programming errors**: double exec, double attach, double start
/// - **Shutdown**: [`RuntimeError::GraceExceeded`]
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The root lifecycle was already executed; stages are never re-run.
    #[error("lifecycle already executed; refusing to run stages twice")]
    AlreadyExecuted,

    /// A child lifecycle was attached twice.
    #[error("child lifecycle '{child}' is already attached")]
    AlreadyAttached {
        /// Name of the child lifecycle.
        child: String,
    },

    /// A callback failed during a boot stage (`PreInit..Bootstrap`).
    #[error("stage {stage} failed in callback '{callback}': {error}")]
    StageFailed {
        /// Stage that was running.
        stage: Stage,
        /// Name of the failing callback.
        callback: String,
        /// The callback error.
        error: TaskError,
    },

    /// An on-attach callback of a child lifecycle failed.
    #[error("attach of '{child}' failed in callback '{callback}': {error}")]
    AttachFailed {
        /// Name of the child lifecycle.
        child: String,
        /// Name of the failing callback.
        callback: String,
        /// The callback error.
        error: TaskError,
    },

    /// A schedule handle was started while already running.
    #[error("schedule {context}:{label} already started")]
    AlreadyStarted {
        /// Scheduler context.
        context: String,
        /// Schedule label (empty when unlabeled).
        label: String,
    },

    /// A schedule handle was started after being stopped.
    #[error("schedule {context}:{label} was stopped; create a new schedule to run it again")]
    ScheduleFinished {
        /// Scheduler context.
        context: String,
        /// Schedule label (empty when unlabeled).
        label: String,
    },

    /// A calendar expression or interval could not be used.
    #[error("invalid schedule '{expression}': {reason}")]
    InvalidSchedule {
        /// The offending expression (or interval rendering).
        expression: String,
        /// Parser or validation message.
        reason: String,
    },

    /// Shutdown callbacks did not finish within the grace period.
    #[error("shutdown exceeded grace period of {grace:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use stagehand::RuntimeError;
    ///
    /// assert_eq!(RuntimeError::AlreadyExecuted.as_label(), "runtime_already_executed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::AlreadyExecuted => "runtime_already_executed",
            RuntimeError::AlreadyAttached { .. } => "runtime_already_attached",
            RuntimeError::StageFailed { .. } => "runtime_stage_failed",
            RuntimeError::AttachFailed { .. } => "runtime_attach_failed",
            RuntimeError::AlreadyStarted { .. } => "schedule_already_started",
            RuntimeError::ScheduleFinished { .. } => "schedule_finished",
            RuntimeError::InvalidSchedule { .. } => "schedule_invalid",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::StageFailed {
                stage,
                callback,
                error,
            } => format!("stage={stage} callback={callback} {}", error.as_message()),
            RuntimeError::AttachFailed {
                child,
                callback,
                error,
            } => format!("child={child} callback={callback} {}", error.as_message()),
            other => other.to_string(),
        }
    }

    /// True for errors that must terminate the process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RuntimeError::AlreadyExecuted
                | RuntimeError::StageFailed { .. }
                | RuntimeError::AttachFailed { .. }
        )
    }
}

/// # Errors produced by callbacks.
///
/// Callbacks return `Result<(), TaskError>`; panics are caught by the
/// supervision boundary and surface as [`TaskError::Panicked`].
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum TaskError {
    /// Callback returned an error.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Callback panicked while running.
    #[error("callback panicked: {info}")]
    Panicked {
        /// Panic payload, if it was a string.
        info: String,
    },
}

impl TaskError {
    /// Shorthand for [`TaskError::Fail`] from anything printable.
    ///
    /// # Example
    /// ```
    /// use stagehand::TaskError;
    ///
    /// let err = TaskError::fail("socket closed");
    /// assert_eq!(err.as_label(), "task_failed");
    /// ```
    pub fn fail(error: impl Display) -> Self {
        TaskError::Fail {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Fail { .. } => "task_failed",
            TaskError::Panicked { .. } => "task_panicked",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            TaskError::Fail { error } => format!("error: {error}"),
            TaskError::Panicked { info } => format!("panic: {info}"),
        }
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        TaskError::Fail {
            error: format!("{err:#}"),
        }
    }
}
