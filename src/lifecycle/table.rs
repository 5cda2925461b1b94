//! # Per-stage callback tables and tiered stage execution.
//!
//! ## Execution order within one stage
//! ```text
//! registrations ──► partition by priority
//!                     ├─ Some(p): sort ascending (stable) ──► run one at a time
//!                     │                                        (barrier)
//!                     └─ None: ──────────────────────────────► join_all (concurrent)
//! ```
//!
//! ## Rules
//! - Every prioritized callback settles before any unprioritized callback starts
//! - Equal priorities keep registration order
//! - Fatal stages stop at the first failure; other stages log and keep going

use futures::future::join_all;
use tracing::error;

use crate::core::Supervisor;
use crate::error::TaskError;

use super::callback::CallbackRef;
use super::stage::Stage;

/// One callback registered against a stage.
#[derive(Clone)]
pub(crate) struct Registration {
    pub callback: CallbackRef,
    pub priority: Option<i32>,
}

/// Callback lists indexed by stage.
#[derive(Default)]
pub(crate) struct StageTable {
    lists: [Vec<Registration>; Stage::COUNT],
}

impl StageTable {
    pub fn push(&mut self, stage: Stage, reg: Registration) {
        self.lists[stage.index()].push(reg);
    }

    /// Removes and returns the list for `stage`.
    pub fn take(&mut self, stage: Stage) -> Vec<Registration> {
        std::mem::take(&mut self.lists[stage.index()])
    }

    /// Removes every list, in stage order.
    pub fn drain(&mut self) -> Vec<(Stage, Vec<Registration>)> {
        Stage::BOOT
            .iter()
            .chain(Stage::SHUTDOWN.iter())
            .map(|stage| (*stage, self.take(*stage)))
            .collect()
    }

    #[cfg(test)]
    pub fn len(&self, stage: Stage) -> usize {
        self.lists[stage.index()].len()
    }
}

/// First failure of a fatal stage.
pub(crate) struct StageFailure {
    pub callback: String,
    pub error: TaskError,
}

/// Runs one stage's registrations: prioritized tier first, then the concurrent tier.
pub(crate) async fn run_tiers(stage: Stage, regs: Vec<Registration>) -> Result<(), StageFailure> {
    let fatal = stage.is_fatal();
    let (mut ordered, unordered): (Vec<_>, Vec<_>) =
        regs.into_iter().partition(|r| r.priority.is_some());
    ordered.sort_by_key(|r| r.priority);

    for reg in &ordered {
        if let Err(error) = Supervisor::invoke(reg.callback.as_ref()).await {
            if fatal {
                return Err(StageFailure {
                    callback: reg.callback.name().to_string(),
                    error,
                });
            }
            report(stage, reg, &error);
        }
    }

    let results = join_all(unordered.iter().map(|reg| async move {
        (reg, Supervisor::invoke(reg.callback.as_ref()).await)
    }))
    .await;

    let mut first = None;
    for (reg, res) in results {
        let Err(error) = res else { continue };
        if fatal {
            if first.is_none() {
                first = Some(StageFailure {
                    callback: reg.callback.name().to_string(),
                    error,
                });
            }
        } else {
            report(stage, reg, &error);
        }
    }

    match first {
        Some(failure) => Err(failure),
        None => Ok(()),
    }
}

fn report(stage: Stage, reg: &Registration, error: &TaskError) {
    error!(
        stage = %stage,
        callback = reg.callback.name(),
        error = %error,
        "lifecycle callback failed; continuing"
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use crate::lifecycle::CallbackFn;

    fn recorder(
        log: &Arc<Mutex<Vec<String>>>,
        name: &'static str,
        delay_ms: u64,
        priority: Option<i32>,
    ) -> Registration {
        let log = log.clone();
        Registration {
            callback: CallbackFn::arc(name, move || {
                let log = log.clone();
                async move {
                    log.lock().push(format!("start:{name}"));
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    log.lock().push(format!("end:{name}"));
                    Ok(())
                }
            }),
            priority,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn prioritized_tier_is_a_barrier() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let regs = vec![
            recorder(&log, "free-a", 1, None),
            recorder(&log, "p10", 5, Some(10)),
            recorder(&log, "free-b", 1, None),
            recorder(&log, "p-1", 20, Some(-1)),
            recorder(&log, "p10-late", 1, Some(10)),
        ];

        assert!(run_tiers(Stage::Bootstrap, regs).await.is_ok());

        let log = log.lock().clone();
        assert_eq!(
            &log[..6],
            &[
                "start:p-1",
                "end:p-1",
                "start:p10",
                "end:p10",
                "start:p10-late",
                "end:p10-late"
            ]
        );
        // the concurrent tier starts both before either ends
        assert_eq!(&log[6..8], &["start:free-a", "start:free-b"]);
    }

    #[tokio::test]
    async fn fatal_stage_stops_at_first_prioritized_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let regs = vec![
            Registration {
                callback: CallbackFn::arc("bad", || async { Err(TaskError::fail("boom")) }),
                priority: Some(0),
            },
            recorder(&log, "after", 0, Some(1)),
            recorder(&log, "free", 0, None),
        ];

        let failure = run_tiers(Stage::PreInit, regs).await.err().unwrap();
        assert_eq!(failure.callback, "bad");
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn non_fatal_stage_runs_everything() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let regs = vec![
            Registration {
                callback: CallbackFn::arc("bad", || async { Err(TaskError::fail("boom")) }),
                priority: Some(0),
            },
            recorder(&log, "after", 0, Some(1)),
            recorder(&log, "free", 0, None),
        ];

        assert!(run_tiers(Stage::ShutdownStart, regs).await.is_ok());
        assert_eq!(log.lock().len(), 4);
    }

    #[test]
    fn drain_empties_every_stage() {
        let mut table = StageTable::default();
        let cb: CallbackRef = CallbackFn::arc("x", || async { Ok(()) });
        table.push(
            Stage::Ready,
            Registration {
                callback: cb.clone(),
                priority: None,
            },
        );
        table.push(
            Stage::ShutdownComplete,
            Registration {
                callback: cb,
                priority: Some(3),
            },
        );

        let drained = table.drain();
        assert_eq!(drained.len(), Stage::COUNT);
        assert_eq!(table.len(Stage::Ready), 0);
        assert_eq!(table.len(Stage::ShutdownComplete), 0);
    }
}
