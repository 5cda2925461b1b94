//! # Wall clock for calendar math.
//!
//! Calendar expressions are evaluated in wall time, in a [`CalendarZone`]; timers
//! sleep in monotonic time. The two are reconciled on every wait instead of once:
//!
//! ```text
//! system:    now() = Utc::now()                           (follows NTP steps, suspend)
//! simulated: now() = anchor_wall + (tokio Instant::now() - anchor_mono) + steps
//!
//! sleep_until(at): loop { wait = at - now(); sleep(min(wait, RESYNC)) } until wait == 0
//! ```
//!
//! With a paused Tokio clock (`start_paused`), a simulated clock advances exactly as far
//! as the Tokio clock does, which makes cron and sliding schedules deterministic in tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local, TimeDelta, TimeZone, Utc};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

/// Longest single timer sleep before the wall clock is read again.
const RESYNC: Duration = Duration::from_secs(30);

/// Time zone calendar expressions are evaluated in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CalendarZone {
    /// The process's local time zone (`TZ`, `/etc/localtime`).
    #[default]
    Local,
    Utc,
    Fixed(FixedOffset),
}

impl CalendarZone {
    /// First occurrence of `schedule` strictly after `from`, read in this zone.
    pub(crate) fn next_after(
        &self,
        schedule: &cron::Schedule,
        from: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match self {
            CalendarZone::Local => first_after(schedule, &from, &Local),
            CalendarZone::Utc => first_after(schedule, &from, &Utc),
            CalendarZone::Fixed(offset) => first_after(schedule, &from, offset),
        }
    }
}

fn first_after<Z: TimeZone>(
    schedule: &cron::Schedule,
    from: &DateTime<Utc>,
    zone: &Z,
) -> Option<DateTime<Utc>> {
    schedule
        .after(&from.with_timezone(zone))
        .next()
        .map(|at| at.with_timezone(&Utc))
}

#[derive(Debug)]
enum Source {
    System,
    Simulated {
        anchor_wall: DateTime<Utc>,
        anchor_mono: Instant,
        stepped_ms: AtomicI64,
    },
}

/// Wall clock used for calendar math. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Clock {
    source: Arc<Source>,
    zone: CalendarZone,
}

impl Clock {
    /// The host wall clock, read on every call; calendar expressions use local time.
    pub fn system() -> Self {
        Self {
            source: Arc::new(Source::System),
            zone: CalendarZone::Local,
        }
    }

    /// Simulated clock whose `now()` is `wall` at the moment of creation and then
    /// advances with the Tokio clock.
    ///
    /// # Example
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use stagehand::{CalendarZone, Clock};
    ///
    /// let noon = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    /// let clock = Clock::starting_at(noon).with_zone(CalendarZone::Utc);
    /// assert!(clock.now() >= noon);
    /// ```
    pub fn starting_at(wall: DateTime<Utc>) -> Self {
        Self {
            source: Arc::new(Source::Simulated {
                anchor_wall: wall,
                anchor_mono: Instant::now(),
                stepped_ms: AtomicI64::new(0),
            }),
            zone: CalendarZone::Local,
        }
    }

    /// Evaluates calendar expressions in `zone`.
    #[must_use]
    pub fn with_zone(mut self, zone: CalendarZone) -> Self {
        self.zone = zone;
        self
    }

    pub fn zone(&self) -> CalendarZone {
        self.zone
    }

    /// Moves a simulated clock's wall time by `by` without touching running timers,
    /// the way an NTP correction moves the host clock. No effect on [`Clock::system`].
    pub fn step(&self, by: TimeDelta) {
        if let Source::Simulated { stepped_ms, .. } = self.source.as_ref() {
            stepped_ms.fetch_add(by.num_milliseconds(), Ordering::SeqCst);
        }
    }

    /// Current wall time.
    pub fn now(&self) -> DateTime<Utc> {
        match self.source.as_ref() {
            Source::System => Utc::now(),
            Source::Simulated {
                anchor_wall,
                anchor_mono,
                stepped_ms,
            } => {
                let elapsed =
                    TimeDelta::from_std(anchor_mono.elapsed()).unwrap_or(TimeDelta::MAX);
                let stepped = TimeDelta::milliseconds(stepped_ms.load(Ordering::SeqCst));
                anchor_wall
                    .checked_add_signed(elapsed)
                    .and_then(|t| t.checked_add_signed(stepped))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC)
            }
        }
    }

    /// Time left until `at`, or `None` when `at` is already in the past.
    pub fn until(&self, at: DateTime<Utc>) -> Option<Duration> {
        (at - self.now()).to_std().ok()
    }

    /// Next occurrence of `schedule` after `from`, in this clock's zone.
    pub(crate) fn next_after(
        &self,
        schedule: &cron::Schedule,
        from: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        self.zone.next_after(schedule, from)
    }

    /// Sleeps until the wall clock reaches `at`; `false` when `token` was cancelled first.
    ///
    /// Sleeps in slices of at most 30 s so wall clock steps and host suspends are
    /// picked up.
    pub(crate) async fn sleep_until(&self, at: DateTime<Utc>, token: &CancellationToken) -> bool {
        loop {
            let wait = match self.until(at) {
                Some(wait) if !wait.is_zero() => wait,
                _ => return !token.is_cancelled(),
            };
            tokio::select! {
                _ = token.cancelled() => return false,
                _ = time::sleep(wait.min(RESYNC)) => {}
            }
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn follows_paused_time() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let clock = Clock::starting_at(start);

        tokio::time::sleep(Duration::from_secs(90)).await;
        assert_eq!(clock.now(), start + TimeDelta::seconds(90));
        assert_eq!(
            clock.until(start + TimeDelta::seconds(100)),
            Some(Duration::from_secs(10))
        );
        assert_eq!(clock.until(start), None);
    }

    #[test]
    fn calendar_is_read_in_the_configured_zone() {
        let seven = cron::Schedule::from_str("0 0 7 * * *").unwrap();
        let from = Utc.with_ymd_and_hms(2024, 3, 1, 4, 0, 30).unwrap();

        let utc = CalendarZone::Utc.next_after(&seven, from).unwrap();
        assert_eq!(utc, Utc.with_ymd_and_hms(2024, 3, 1, 7, 0, 0).unwrap());

        let east = FixedOffset::east_opt(2 * 3600).unwrap();
        let local = CalendarZone::Fixed(east).next_after(&seven, from).unwrap();
        assert_eq!(local, Utc.with_ymd_and_hms(2024, 3, 1, 5, 0, 0).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_picks_up_a_wall_clock_step() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        let clock = Clock::starting_at(start);
        let token = CancellationToken::new();
        let at = start + TimeDelta::hours(1);

        let waiter = {
            let clock = clock.clone();
            let token = token.clone();
            tokio::spawn(async move { clock.sleep_until(at, &token).await })
        };
        tokio::time::sleep(Duration::from_secs(5)).await;
        clock.step(TimeDelta::minutes(59));

        let began = Instant::now();
        assert!(waiter.await.unwrap());
        // two resync slices at most, instead of the 55 minutes left before the step
        assert!(began.elapsed() <= 2 * RESYNC);
        assert!(clock.now() >= at);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_sleep_reports_false() {
        let clock = Clock::starting_at(Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap());
        let token = CancellationToken::new();
        token.cancel();
        assert!(!clock.sleep_until(clock.now() + TimeDelta::hours(1), &token).await);
    }
}
