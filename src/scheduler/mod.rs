//! # Scheduler: repeating supervised executions gated on the lifecycle.
//!
//! A [`Scheduler`] is bound to a context and to the lifecycle (root or child) it was
//! created with. Every schedule it builds:
//! - starts when that lifecycle reaches `Ready`
//! - stops when the root reaches `ShutdownStart` (all schedules are tracked centrally)
//! - runs each fire through the [`Supervisor`](crate::core::Supervisor), so failures
//!   are logged, counted and swallowed
//!
//! ```text
//! scheduler.cron(opts)     ─┐
//! scheduler.interval(opts) ─┼─► ScheduleHandle (Created) ── Ready ──► Running ── ShutdownStart ──► Stopped
//! scheduler.sliding(opts)  ─┘
//! ```

mod clock;
mod handle;
mod options;
mod registry;
mod strategy;

use std::sync::Arc;

pub use clock::{CalendarZone, Clock};
pub use handle::{ScheduleHandle, ScheduleState};
pub use options::{CronOptions, IntervalOptions, NextFn, SlidingOptions};
pub(crate) use registry::{ScheduleRegistry, stop_all_callback};

use crate::core::{ExecKind, ExecLabels, Supervisor};
use crate::error::{RuntimeError, TaskError};
use crate::lifecycle::{CallbackFn, CallbackRef, StageRegistry};

use strategy::{CronExpr, DriveCtx, Strategy};

/// Builds schedules for one context.
///
/// Obtained from [`Runtime::scheduler`](crate::Runtime::scheduler).
pub struct Scheduler {
    context: Arc<str>,
    lifecycle: Arc<dyn StageRegistry>,
    supervisor: Supervisor,
    clock: Clock,
    registry: Arc<ScheduleRegistry>,
}

impl Scheduler {
    pub(crate) fn new(
        context: Arc<str>,
        lifecycle: Arc<dyn StageRegistry>,
        supervisor: Supervisor,
        clock: Clock,
        registry: Arc<ScheduleRegistry>,
    ) -> Self {
        Self {
            context,
            lifecycle,
            supervisor,
            clock,
            registry,
        }
    }

    /// Context every schedule of this scheduler reports under.
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Calendar schedule; each expression drives its own timer.
    ///
    /// ### Errors
    /// [`RuntimeError::InvalidSchedule`] when the list is empty or an expression does not parse.
    pub fn cron(&self, opts: CronOptions) -> Result<ScheduleHandle, RuntimeError> {
        if opts.schedule.is_empty() {
            return Err(RuntimeError::InvalidSchedule {
                expression: String::new(),
                reason: "no calendar expressions given".to_string(),
            });
        }
        let exprs = opts
            .schedule
            .iter()
            .map(|expr| CronExpr::parse(expr))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.register(opts.label.as_deref(), Strategy::Cron(exprs), opts.exec))
    }

    /// Fixed-period schedule.
    ///
    /// ### Errors
    /// [`RuntimeError::InvalidSchedule`] for a zero period.
    pub fn interval(&self, opts: IntervalOptions) -> Result<ScheduleHandle, RuntimeError> {
        if opts.interval.is_zero() {
            return Err(RuntimeError::InvalidSchedule {
                expression: format!("{:?}", opts.interval),
                reason: "interval must be greater than zero".to_string(),
            });
        }
        Ok(self.register(
            opts.label.as_deref(),
            Strategy::Interval(opts.interval),
            opts.exec,
        ))
    }

    /// Sliding schedule: `next()` is consulted on every `reset` occurrence.
    ///
    /// ### Errors
    /// [`RuntimeError::InvalidSchedule`] when `reset` does not parse.
    pub fn sliding(&self, opts: SlidingOptions) -> Result<ScheduleHandle, RuntimeError> {
        let reset = CronExpr::parse(&opts.reset)?;
        Ok(self.register(
            opts.label.as_deref(),
            Strategy::sliding(reset, opts.next),
            opts.exec,
        ))
    }

    fn register(&self, label: Option<&str>, strategy: Strategy, exec: CallbackRef) -> ScheduleHandle {
        let ctx = DriveCtx {
            labels: ExecLabels::new(ExecKind::Schedule, self.context.clone(), label),
            exec,
            supervisor: self.supervisor.clone(),
            clock: self.clock.clone(),
        };
        let handle = ScheduleHandle::new(strategy, ctx, &self.registry);

        let starter = handle.clone();
        let name = format!("{}:{}:start", self.context, label.unwrap_or("schedule"));
        self.lifecycle.on_ready(CallbackFn::arc(name, move || {
            let res = starter.start_if_created().map_err(TaskError::fail);
            async move { res }
        }));
        handle
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use arc_swap::ArcSwap;
    use chrono::{DateTime, FixedOffset, TimeDelta, TimeZone, Utc};
    use tokio::time::sleep;

    use super::*;
    use crate::config::{Config, ConfigOverrides};
    use crate::events::{Bus, EventKind};
    use crate::lifecycle::{Lifecycle, Stage};

    struct Fixture {
        lifecycle: Lifecycle,
        scheduler: Scheduler,
        registry: Arc<ScheduleRegistry>,
        clock: Clock,
        bus: Bus,
    }

    fn noon_thirty() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 30).unwrap()
    }

    fn fixture() -> Fixture {
        fixture_in(CalendarZone::Utc)
    }

    fn fixture_in(zone: CalendarZone) -> Fixture {
        let bus = Bus::new(256);
        let supervisor = Supervisor::new(bus.clone());
        let lifecycle = Lifecycle::new(
            "test",
            Arc::new(ArcSwap::from_pointee(Config::default())),
            supervisor.clone(),
        );
        let registry = Arc::new(ScheduleRegistry::default());
        lifecycle.on_stage(Stage::ShutdownStart, stop_all_callback(&registry), Some(i32::MIN));
        let clock = Clock::starting_at(noon_thirty()).with_zone(zone);
        let scheduler = Scheduler::new(
            Arc::from("jobs"),
            Arc::new(lifecycle.clone()),
            supervisor,
            clock.clone(),
            registry.clone(),
        );
        Fixture {
            lifecycle,
            scheduler,
            registry,
            clock,
            bus,
        }
    }

    fn counter() -> (Arc<AtomicUsize>, CallbackRef) {
        let hits = Arc::new(AtomicUsize::new(0));
        let c = hits.clone();
        let cb: CallbackRef = CallbackFn::arc("count", move || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });
        (hits, cb)
    }

    #[tokio::test(start_paused = true)]
    async fn cron_every_minute_fires_sixty_times_an_hour() {
        let f = fixture();
        let (hits, cb) = counter();
        let handle = f
            .scheduler
            .cron(CronOptions::new(["0 * * * * *"], cb).with_label("minutely"))
            .unwrap();
        assert_eq!(handle.state(), ScheduleState::Created);

        f.lifecycle.exec(ConfigOverrides::default()).await.unwrap();
        assert_eq!(handle.state(), ScheduleState::Running);

        sleep(Duration::from_secs(3600)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 60);
    }

    #[tokio::test(start_paused = true)]
    async fn five_field_expressions_fire_on_the_minute() {
        let f = fixture();
        let (hits, cb) = counter();
        f.scheduler.cron(CronOptions::new(["*/15 * * * *"], cb)).unwrap();
        f.lifecycle.exec(ConfigOverrides::default()).await.unwrap();

        // 12:00:30 → 13:00:30 covers 12:15, 12:30, 12:45, 13:00
        sleep(Duration::from_secs(3600)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn calendar_follows_the_clock_zone() {
        let east = FixedOffset::east_opt(2 * 3600).unwrap();
        let f = fixture_in(CalendarZone::Fixed(east));
        let (hits, cb) = counter();
        // 15:00 at +02:00 is 13:00 UTC, half an hour after the clock starts
        f.scheduler.cron(CronOptions::new(["0 15 * * *"], cb)).unwrap();
        f.lifecycle.exec(ConfigOverrides::default()).await.unwrap();

        sleep(Duration::from_secs(3600)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cron_follows_a_wall_clock_step() {
        let f = fixture();
        let (hits, cb) = counter();
        f.scheduler.cron(CronOptions::new(["0 18 * * *"], cb)).unwrap();
        f.lifecycle.exec(ConfigOverrides::default()).await.unwrap();

        // 12:00:30 → 17:59:30
        f.clock.step(TimeDelta::minutes(359));
        sleep(Duration::from_secs(90)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn schedules_created_after_shutdown_never_start() {
        let f = fixture();
        f.lifecycle.exec(ConfigOverrides::default()).await.unwrap();
        f.lifecycle.teardown().await;

        let (hits, cb) = counter();
        let handle = f
            .scheduler
            .interval(IntervalOptions::new(Duration::from_secs(1), cb).with_label("late"))
            .unwrap();

        sleep(Duration::from_secs(10)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(handle.state(), ScheduleState::Stopped);
        assert_eq!(f.registry.len(), 0);
        assert!(matches!(handle.start(), Err(RuntimeError::ScheduleFinished { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn interval_stop_prevents_further_fires() {
        let f = fixture();
        let (hits, cb) = counter();
        let handle = f
            .scheduler
            .interval(IntervalOptions::new(Duration::from_secs(60), cb))
            .unwrap();
        f.lifecycle.exec(ConfigOverrides::default()).await.unwrap();

        sleep(Duration::from_secs(30 * 60 + 30)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 30);

        handle.stop();
        sleep(Duration::from_secs(30 * 60)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 30);
        assert_eq!(handle.state(), ScheduleState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_runs_sixty_times_an_hour() {
        let f = fixture();
        let (hits, cb) = counter();
        f.scheduler
            .interval(IntervalOptions::new(Duration::from_secs(60), cb))
            .unwrap();
        f.lifecycle.exec(ConfigOverrides::default()).await.unwrap();

        sleep(Duration::from_secs(60 * 60 + 30)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 60);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_fires_before_ready() {
        let f = fixture();
        let (hits, cb) = counter();
        let handle = f
            .scheduler
            .interval(IntervalOptions::new(Duration::from_secs(1), cb))
            .unwrap();

        sleep(Duration::from_secs(300)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(handle.state(), ScheduleState::Created);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_every_schedule() {
        let f = fixture();
        let (hits, cb) = counter();
        f.scheduler
            .interval(IntervalOptions::new(Duration::from_secs(10), cb.clone()))
            .unwrap();
        f.scheduler.cron(CronOptions::new(["* * * * * *"], cb)).unwrap();
        f.lifecycle.exec(ConfigOverrides::default()).await.unwrap();
        assert_eq!(f.registry.len(), 2);

        sleep(Duration::from_millis(5500)).await;
        f.lifecycle.teardown().await;
        assert_eq!(f.registry.len(), 0);

        let before = hits.load(Ordering::SeqCst);
        sleep(Duration::from_secs(60)).await;
        assert_eq!(hits.load(Ordering::SeqCst), before);
    }

    #[tokio::test]
    async fn start_and_stop_misuse() {
        let f = fixture();
        let mut rx = f.bus.subscribe();
        let (_, cb) = counter();
        let handle = f
            .scheduler
            .interval(IntervalOptions::new(Duration::from_secs(60), cb).with_label("poll"))
            .unwrap();

        handle.start().unwrap();
        assert!(matches!(handle.start(), Err(RuntimeError::AlreadyStarted { .. })));
        handle.stop();
        handle.stop();
        assert!(matches!(handle.start(), Err(RuntimeError::ScheduleFinished { .. })));

        let mut transitions = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if matches!(ev.kind, EventKind::ScheduleStarted | EventKind::ScheduleStopped) {
                transitions.push(ev.kind);
            }
        }
        assert_eq!(
            transitions,
            [EventKind::ScheduleStarted, EventKind::ScheduleStopped]
        );
    }

    #[tokio::test]
    async fn invalid_schedules_are_rejected() {
        let f = fixture();
        let (_, cb) = counter();
        let zero = f
            .scheduler
            .interval(IntervalOptions::new(Duration::ZERO, cb.clone()));
        assert!(matches!(zero, Err(RuntimeError::InvalidSchedule { .. })));

        let bad = f.scheduler.cron(CronOptions::new(["every tuesday"], cb.clone()));
        assert!(matches!(bad, Err(RuntimeError::InvalidSchedule { .. })));

        let empty = f.scheduler.cron(CronOptions::new(Vec::<String>::new(), cb));
        assert!(matches!(empty, Err(RuntimeError::InvalidSchedule { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn sliding_fires_at_the_computed_instant() {
        let f = fixture();
        let (hits, cb) = counter();
        let clock = f.clock.clone();
        f.scheduler
            .sliding(SlidingOptions::new(
                "0 * * * * *",
                move || Some(clock.now() + TimeDelta::seconds(10)),
                cb,
            ))
            .unwrap();
        f.lifecycle.exec(ConfigOverrides::default()).await.unwrap();

        // resets at 12:01, 12:02, 12:03 → fires at :10 past each
        sleep(Duration::from_secs(180)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn sliding_never_fires_in_the_past() {
        let f = fixture();
        let mut rx = f.bus.subscribe();
        let (hits, cb) = counter();
        f.scheduler
            .sliding(SlidingOptions::new(
                "0 * * * * *",
                || Some(noon_thirty() - TimeDelta::hours(1)),
                cb,
            ))
            .unwrap();
        f.lifecycle.exec(ConfigOverrides::default()).await.unwrap();

        sleep(Duration::from_secs(180)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        let mut skipped = 0;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::ScheduleSkipped {
                skipped += 1;
            }
        }
        assert_eq!(skipped, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn sliding_replaces_a_pending_execution() {
        let f = fixture();
        let mut rx = f.bus.subscribe();
        let (hits, cb) = counter();
        let clock = f.clock.clone();
        f.scheduler
            .sliding(SlidingOptions::new(
                // resets at 12:01, 12:02 and 12:03 only
                "0 1-3 12 1 3 * 2024",
                move || Some(clock.now() + TimeDelta::seconds(90)),
                cb,
            ))
            .unwrap();
        f.lifecycle.exec(ConfigOverrides::default()).await.unwrap();

        // every reset but the last lands before the pending one-shot is due
        sleep(Duration::from_secs(200)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        // the one-shot armed at 12:03 runs at 12:04:30
        sleep(Duration::from_secs(100)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let mut replaced = 0;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::ScheduleSkipped
                && ev.reason.as_deref() == Some("replaced pending execution")
            {
                replaced += 1;
            }
        }
        assert_eq!(replaced, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sliding_skip_when_next_is_none() {
        let f = fixture();
        let (hits, cb) = counter();
        let handle = f
            .scheduler
            .sliding(SlidingOptions::new("0 * * * * *", || None, cb))
            .unwrap();
        f.lifecycle.exec(ConfigOverrides::default()).await.unwrap();

        sleep(Duration::from_secs(180)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(handle.state(), ScheduleState::Running);
    }
}
