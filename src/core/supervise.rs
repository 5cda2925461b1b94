//! # Supervised execution of callbacks.
//!
//! Runs one invocation of a [`Callback`], measures it, records the outcome, publishes
//! it to the [`Bus`] and swallows the error so a failing body never takes its
//! schedule or watcher down with it.
//!
//! ## Event flow
//! ```text
//! Success:
//!   cb.call() → Ok(())       → record + publish ExecSucceeded { duration }
//!
//! Failure:
//!   cb.call() → Err(e)       → error! + record + publish ExecFailed { duration, reason }
//!
//! Panic:
//!   cb.call() → panic        → caught → TaskError::Panicked → same as failure
//! ```
//!
//! ## Rules
//! - Counters and metrics are written in place; the bus only feeds observers and may lag
//! - Always publishes **at most one** terminal event per invocation
//! - Executions without a label are run and logged but not recorded (no metrics key)
//! - [`Supervisor::dispatch`] never blocks the caller; the body runs on its own task

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::error;

use crate::error::TaskError;
use crate::events::{Bus, Event, EventKind};
use crate::lifecycle::Callback;
use crate::stats::{ExecutionTracker, record_execution, record_schedule};

/// What a supervised execution was triggered by.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExecKind {
    /// A scheduled body.
    Schedule,
    /// A sequence-match trigger.
    Sequence,
}

impl ExecKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecKind::Schedule => "schedule",
            ExecKind::Sequence => "sequence",
        }
    }
}

/// The `{kind, context, label}` key every supervised execution is reported under.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExecLabels {
    pub kind: ExecKind,
    pub context: Arc<str>,
    pub label: Option<Arc<str>>,
}

impl ExecLabels {
    pub fn new(kind: ExecKind, context: impl Into<Arc<str>>, label: Option<&str>) -> Self {
        Self {
            kind,
            context: context.into(),
            label: label.filter(|l| !l.is_empty()).map(Arc::from),
        }
    }

    /// Label text for logs; empty when unlabeled.
    pub fn label_str(&self) -> &str {
        self.label.as_deref().unwrap_or("")
    }
}

/// Runs callbacks under supervision and owns the spawn handle of the runtime.
///
/// Cheap to clone.
#[derive(Clone, Debug)]
pub struct Supervisor {
    bus: Bus,
    handle: Handle,
    tracker: Arc<ExecutionTracker>,
    metrics: bool,
}

impl Supervisor {
    /// Creates a supervisor bound to the current Tokio runtime.
    ///
    /// # Panics
    /// Panics when called outside of a Tokio runtime.
    pub fn new(bus: Bus) -> Self {
        Self {
            bus,
            handle: Handle::current(),
            tracker: Arc::new(ExecutionTracker::new()),
            metrics: false,
        }
    }

    /// Also writes every outcome to the `metrics` facade.
    pub(crate) fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics = enabled;
        self
    }

    /// Returns the bus outcomes are published on.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Counters of every labeled execution run by this supervisor.
    pub fn tracker(&self) -> &Arc<ExecutionTracker> {
        &self.tracker
    }

    /// Counts a schedule entering (`true`) or leaving (`false`) the running state.
    pub(crate) fn schedule_transition(&self, running: bool) {
        self.tracker.schedule_transition(running);
        if self.metrics {
            record_schedule(running);
        }
    }

    /// Spawns a future on the runtime this supervisor was created in.
    pub(crate) fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(fut)
    }

    /// Runs one invocation and returns its result, converting panics to errors.
    pub(crate) async fn invoke(cb: &dyn Callback) -> Result<(), TaskError> {
        match AssertUnwindSafe(async { cb.call().await })
            .catch_unwind()
            .await
        {
            Ok(res) => res,
            Err(payload) => Err(TaskError::Panicked {
                info: panic_message(payload.as_ref()),
            }),
        }
    }

    /// Runs one supervised invocation: measure, publish, swallow.
    pub async fn run(&self, labels: &ExecLabels, cb: &dyn Callback) {
        let started = Instant::now();
        let res = Self::invoke(cb).await;
        let elapsed = started.elapsed();

        self.tracker.record(labels, elapsed, res.is_err());
        if self.metrics {
            record_execution(labels, elapsed, res.is_err());
        }

        match res {
            Ok(()) => {
                if let Some(label) = &labels.label {
                    self.bus.publish(
                        Event::new(EventKind::ExecSucceeded)
                            .with_context(labels.context.clone())
                            .with_label(label.clone())
                            .with_duration(elapsed),
                    );
                }
            }
            Err(e) => {
                error!(
                    context = %labels.context,
                    label = labels.label_str(),
                    callback = cb.name(),
                    error = %e,
                    "callback threw error"
                );
                if let Some(label) = &labels.label {
                    self.bus.publish(
                        Event::new(EventKind::ExecFailed)
                            .with_context(labels.context.clone())
                            .with_label(label.clone())
                            .with_duration(elapsed)
                            .with_reason(e.to_string()),
                    );
                }
            }
        }
    }

    /// Runs the callback soon, on its own task, without blocking the caller.
    pub fn dispatch(&self, labels: ExecLabels, cb: Arc<dyn Callback>) -> JoinHandle<()> {
        let me = self.clone();
        self.spawn(async move { me.run(&labels, cb.as_ref()).await })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{CallbackFn, CallbackRef};

    #[tokio::test]
    async fn failures_are_published_and_swallowed() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let sup = Supervisor::new(bus);

        let cb: CallbackRef = CallbackFn::arc("broken", || async { Err(TaskError::fail("nope")) });
        sup.run(&ExecLabels::new(ExecKind::Schedule, "test", Some("tick")), cb.as_ref()).await;

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::ExecFailed);
        assert_eq!(ev.label.as_deref(), Some("tick"));
        assert_eq!(ev.reason.as_deref(), Some("execution failed: nope"));
    }

    #[tokio::test]
    async fn panics_become_task_errors() {
        let cb: CallbackRef = CallbackFn::arc("panics", || async {
            if true {
                panic!("kaboom");
            }
            Ok(())
        });
        let err = Supervisor::invoke(cb.as_ref()).await.unwrap_err();
        assert!(matches!(err, TaskError::Panicked { ref info } if info == "kaboom"));
    }

    #[tokio::test]
    async fn unlabeled_runs_publish_nothing() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let sup = Supervisor::new(bus.clone());

        let cb: CallbackRef = CallbackFn::arc("quiet", || async { Ok(()) });
        sup.dispatch(ExecLabels::new(ExecKind::Schedule, "test", None), cb).await.unwrap();

        bus.publish(Event::new(EventKind::ShutdownRequested));
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::ShutdownRequested);
        assert_eq!(sup.tracker().stats("test", ""), None);
    }

    #[tokio::test]
    async fn counts_survive_a_lagging_bus() {
        let bus = Bus::new(8);
        let _slow = bus.subscribe();
        let sup = Supervisor::new(bus);
        let labels = ExecLabels::new(ExecKind::Sequence, "lights", Some("double-on"));

        let ok: CallbackRef = CallbackFn::arc("ok", || async { Ok(()) });
        let broken: CallbackRef = CallbackFn::arc("broken", || async { Err(TaskError::fail("nope")) });
        for i in 0..3000 {
            let cb = if i % 3 == 0 { &broken } else { &ok };
            sup.run(&labels, cb.as_ref()).await;
        }

        let stats = sup.tracker().stats("lights", "double-on").unwrap();
        assert_eq!(stats.executions, 3000);
        assert_eq!(stats.errors, 1000);
    }
}
