//! # Schedule handle.
//!
//! ```text
//!            start()                 stop()
//! Created ───────────► Running ───────────────► Stopped
//!    │                   │ start() → AlreadyStarted      start() → ScheduleFinished
//!    └──── stop() ───────┴──────────────────────► Stopped  (never starts on Ready)
//!    └──── start() after ShutdownStart ─────────► Stopped
//! ```
//!
//! `ScheduleStarted`/`ScheduleStopped` are published once per transition, so
//! repeated `stop()` calls never move counters twice.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::RuntimeError;
use crate::events::{Event, EventKind};

use super::registry::ScheduleRegistry;
use super::strategy::{DriveCtx, Strategy};

/// Observable state of a schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduleState {
    /// Built, waiting for `Ready` (or a manual start).
    Created,
    /// Timers are armed.
    Running,
    /// Stopped for good.
    Stopped,
}

enum Slot {
    Created,
    Running(CancellationToken),
    Stopped,
}

struct HandleInner {
    id: u64,
    strategy: Strategy,
    ctx: DriveCtx,
    registry: Weak<ScheduleRegistry>,
    slot: Mutex<Slot>,
}

/// Controls one schedule. Cheap to clone.
#[derive(Clone)]
pub struct ScheduleHandle {
    inner: Arc<HandleInner>,
}

impl ScheduleHandle {
    pub(crate) fn new(strategy: Strategy, ctx: DriveCtx, registry: &Arc<ScheduleRegistry>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: registry.next_id(),
                strategy,
                ctx,
                registry: Arc::downgrade(registry),
                slot: Mutex::new(Slot::Created),
            }),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.inner.id
    }

    /// Current state.
    pub fn state(&self) -> ScheduleState {
        match &*self.inner.slot.lock() {
            Slot::Created => ScheduleState::Created,
            Slot::Running(_) => ScheduleState::Running,
            Slot::Stopped => ScheduleState::Stopped,
        }
    }

    /// Arms the schedule's timers.
    ///
    /// Schedules start on their own when the lifecycle reaches `Ready`; call this
    /// only to start earlier.
    ///
    /// ### Errors
    /// - [`RuntimeError::AlreadyStarted`] while running
    /// - [`RuntimeError::ScheduleFinished`] after [`stop`](Self::stop), or once the
    ///   application is shutting down; the schedule is `Stopped` then
    pub fn start(&self) -> Result<(), RuntimeError> {
        let token = {
            let mut slot = self.inner.slot.lock();
            match &*slot {
                Slot::Created => {}
                Slot::Running(_) => {
                    let err = RuntimeError::AlreadyStarted {
                        context: self.inner.ctx.labels.context.to_string(),
                        label: self.inner.ctx.labels.label_str().to_string(),
                    };
                    error!(error = %err, "double start");
                    return Err(err);
                }
                Slot::Stopped => {
                    return Err(RuntimeError::ScheduleFinished {
                        context: self.inner.ctx.labels.context.to_string(),
                        label: self.inner.ctx.labels.label_str().to_string(),
                    });
                }
            }
            // registered under the slot lock so a concurrent stop_all cannot miss it
            let admitted = self
                .inner
                .registry
                .upgrade()
                .is_none_or(|registry| registry.insert(self.clone()));
            if !admitted {
                *slot = Slot::Stopped;
                warn!(
                    context = %self.inner.ctx.labels.context,
                    label = self.inner.ctx.labels.label_str(),
                    "schedule not started: application is shutting down"
                );
                return Err(RuntimeError::ScheduleFinished {
                    context: self.inner.ctx.labels.context.to_string(),
                    label: self.inner.ctx.labels.label_str().to_string(),
                });
            }
            let token = CancellationToken::new();
            *slot = Slot::Running(token.clone());
            token
        };

        debug!(
            context = %self.inner.ctx.labels.context,
            label = self.inner.ctx.labels.label_str(),
            schedule = %self.inner.strategy.describe(),
            "starting schedule"
        );
        self.inner.ctx.supervisor.schedule_transition(true);
        self.publish(EventKind::ScheduleStarted);
        self.inner.strategy.spawn(&self.inner.ctx, &token);
        Ok(())
    }

    /// Starts a schedule that is still `Created`; used by the `Ready` hook.
    ///
    /// A schedule refused because of shutdown is not an error here.
    pub(crate) fn start_if_created(&self) -> Result<(), RuntimeError> {
        if self.state() != ScheduleState::Created {
            return Ok(());
        }
        match self.start() {
            Err(RuntimeError::ScheduleFinished { .. }) => Ok(()),
            res => res,
        }
    }

    /// Cancels every timer of this schedule, including a pending sliding one-shot.
    ///
    /// Idempotent. Executions already dispatched run to completion.
    pub fn stop(&self) {
        let prev = std::mem::replace(&mut *self.inner.slot.lock(), Slot::Stopped);
        match prev {
            Slot::Running(token) => {
                token.cancel();
                if let Some(registry) = self.inner.registry.upgrade() {
                    registry.remove(self.inner.id);
                }
                debug!(
                    context = %self.inner.ctx.labels.context,
                    label = self.inner.ctx.labels.label_str(),
                    "stopping schedule"
                );
                self.inner.ctx.supervisor.schedule_transition(false);
        self.publish(EventKind::ScheduleStopped);
            }
            Slot::Created => warn!(
                context = %self.inner.ctx.labels.context,
                label = self.inner.ctx.labels.label_str(),
                "schedule stopped before it started"
            ),
            Slot::Stopped => {}
        }
    }

    fn publish(&self, kind: EventKind) {
        let labels = &self.inner.ctx.labels;
        self.inner.ctx.supervisor.bus().publish(
            Event::new(kind)
                .with_context(labels.context.clone())
                .with_label_opt(labels.label.as_deref()),
        );
    }
}
