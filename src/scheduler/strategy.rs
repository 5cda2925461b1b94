//! # Schedule drivers.
//!
//! A [`Strategy`] turns a running schedule into timer tasks. Every driver races its
//! sleep against the schedule's [`CancellationToken`] and hands each fire to
//! [`Supervisor::dispatch`], so a slow or failing body never delays the next tick.
//!
//! ```text
//! Cron(exprs)      one task per expression:  sleep until next occurrence ─► dispatch
//! Interval(period) one task:                 tick every period (first after one period) ─► dispatch
//! Sliding          one task on `reset`:      next() ─► arm one-shot (replacing a pending one)
//!                                                         └─► sleep ─► generation check ─► run
//! ```
//!
//! Calendar waits go through [`Clock::sleep_until`], so occurrences are computed in the
//! clock's zone and follow the wall clock rather than a single monotonic sleep.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::core::{ExecLabels, Supervisor};
use crate::error::RuntimeError;
use crate::events::{Event, EventKind};
use crate::lifecycle::CallbackRef;

use super::clock::Clock;
use super::options::NextFn;

/// A parsed calendar expression with its original text.
#[derive(Clone, Debug)]
pub(crate) struct CronExpr {
    source: String,
    schedule: cron::Schedule,
}

impl CronExpr {
    /// Parses a five-, six- or seven-field expression.
    ///
    /// Five fields are read as `min hour dom month dow` and get seconds `0`.
    pub(crate) fn parse(expr: &str) -> Result<Self, RuntimeError> {
        let fields = expr.split_whitespace().count();
        let normalized = match fields {
            5 => format!("0 {expr}"),
            6 | 7 => expr.to_string(),
            n => {
                return Err(RuntimeError::InvalidSchedule {
                    expression: expr.to_string(),
                    reason: format!("expected 5, 6 or 7 fields, got {n}"),
                });
            }
        };
        let schedule =
            cron::Schedule::from_str(&normalized).map_err(|e| RuntimeError::InvalidSchedule {
                expression: expr.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            source: expr.to_string(),
            schedule,
        })
    }

    pub(crate) fn source(&self) -> &str {
        &self.source
    }
}

/// Pending one-shot of a sliding schedule.
#[derive(Default)]
pub(crate) struct Pending {
    token: Option<CancellationToken>,
    generation: u64,
}

/// How a schedule produces fires.
pub(crate) enum Strategy {
    Cron(Vec<CronExpr>),
    Interval(Duration),
    Sliding {
        reset: CronExpr,
        next: NextFn,
        pending: Arc<Mutex<Pending>>,
    },
}

impl Strategy {
    pub(crate) fn sliding(reset: CronExpr, next: NextFn) -> Self {
        Strategy::Sliding {
            reset,
            next,
            pending: Arc::new(Mutex::new(Pending::default())),
        }
    }

    /// Short description for logs.
    pub(crate) fn describe(&self) -> String {
        match self {
            Strategy::Cron(exprs) => exprs
                .iter()
                .map(CronExpr::source)
                .collect::<Vec<_>>()
                .join(", "),
            Strategy::Interval(period) => format!("every {period:?}"),
            Strategy::Sliding { reset, .. } => format!("sliding, reset {}", reset.source()),
        }
    }

    /// Spawns the timer tasks; they stop when `token` is cancelled.
    pub(crate) fn spawn(&self, ctx: &DriveCtx, token: &CancellationToken) {
        match self {
            Strategy::Cron(exprs) => {
                for expr in exprs {
                    let ctx = ctx.clone();
                    let expr = expr.clone();
                    let token = token.clone();
                    ctx.supervisor.clone().spawn(async move {
                        drive_calendar(&expr, &ctx.clock, &token, || ctx.fire()).await;
                    });
                }
            }
            Strategy::Interval(period) => {
                let ctx = ctx.clone();
                let period = *period;
                let token = token.clone();
                ctx.supervisor.clone().spawn(async move {
                    drive_interval(period, &token, || ctx.fire()).await;
                });
            }
            Strategy::Sliding {
                reset,
                next,
                pending,
            } => {
                let ctx = ctx.clone();
                let reset = reset.clone();
                let next = next.clone();
                let pending = pending.clone();
                let token = token.clone();
                ctx.supervisor.clone().spawn(async move {
                    drive_calendar(&reset, &ctx.clock, &token, || {
                        ctx.slide(next.as_ref(), &pending, &token)
                    })
                    .await;
                });
            }
        }
    }
}

/// Everything a driver needs to run the schedule's callback.
#[derive(Clone)]
pub(crate) struct DriveCtx {
    pub labels: ExecLabels,
    pub exec: CallbackRef,
    pub supervisor: Supervisor,
    pub clock: Clock,
}

impl DriveCtx {
    fn fire(&self) {
        self.supervisor
            .dispatch(self.labels.clone(), self.exec.clone());
    }

    fn skipped(&self, reason: &'static str) {
        self.supervisor.bus().publish(
            Event::new(EventKind::ScheduleSkipped)
                .with_context(self.labels.context.clone())
                .with_label_opt(self.labels.label.as_deref())
                .with_reason(reason),
        );
    }

    /// One `reset` occurrence of a sliding schedule.
    fn slide(
        &self,
        next: &(dyn Fn() -> Option<chrono::DateTime<chrono::Utc>> + Send + Sync),
        pending: &Arc<Mutex<Pending>>,
        stop: &CancellationToken,
    ) {
        let replaced = {
            let mut p = pending.lock();
            p.generation += 1;
            match p.token.take() {
                Some(prev) => {
                    prev.cancel();
                    true
                }
                None => false,
            }
        };
        if replaced {
            warn!(
                context = %self.labels.context,
                label = self.labels.label_str(),
                "sliding schedule retrieving next execution time before previous ran"
            );
            self.skipped("replaced pending execution");
        }

        let Some(at) = next() else {
            debug!(context = %self.labels.context, label = self.labels.label_str(), "sliding schedule has no next execution");
            return;
        };
        let Some(wait) = self.clock.until(at) else {
            warn!(
                context = %self.labels.context,
                label = self.labels.label_str(),
                next = %at.to_rfc3339(),
                "cannot schedule sliding executions for the past"
            );
            self.skipped("next execution in the past");
            return;
        };

        let token = stop.child_token();
        let generation = {
            let mut p = pending.lock();
            p.generation += 1;
            p.token = Some(token.clone());
            p.generation
        };

        debug!(
            context = %self.labels.context,
            label = self.labels.label_str(),
            next = %at.to_rfc3339(),
            wait_ms = wait.as_millis() as u64,
            "sliding execution armed"
        );
        let ctx = self.clone();
        let pending = pending.clone();
        self.supervisor.spawn(async move {
            if !ctx.clock.sleep_until(at, &token).await {
                return;
            }
            {
                let mut p = pending.lock();
                if p.generation != generation {
                    return;
                }
                p.token = None;
            }
            ctx.supervisor.run(&ctx.labels, ctx.exec.as_ref()).await;
        });
    }
}

async fn drive_calendar(
    expr: &CronExpr,
    clock: &Clock,
    token: &CancellationToken,
    mut on_tick: impl FnMut(),
) {
    let mut last = clock.now();
    loop {
        let from = clock.now().max(last);
        let Some(next) = clock.next_after(&expr.schedule, from) else {
            debug!(schedule = expr.source(), "calendar expression has no upcoming occurrences");
            return;
        };
        if !clock.sleep_until(next, token).await {
            return;
        }
        last = next;
        on_tick();
    }
}

async fn drive_interval(period: Duration, token: &CancellationToken, mut on_tick: impl FnMut()) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            _ = ticker.tick() => on_tick(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_fields_get_a_seconds_column() {
        assert!(CronExpr::parse("*/5 * * * *").is_ok());
        assert!(CronExpr::parse("0 */5 * * * *").is_ok());
    }

    #[test]
    fn bad_expressions_are_rejected() {
        for expr in ["", "* *", "61 * * * *", "not a cron at all"] {
            let err = CronExpr::parse(expr).unwrap_err();
            assert_eq!(err.as_label(), "schedule_invalid", "{expr}");
        }
    }
}
