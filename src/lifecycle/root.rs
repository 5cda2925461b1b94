//! # Root lifecycle: owns the authoritative stage tables and runs them.
//!
//! ```text
//! exec(overrides)
//!   ├─► executed? ──yes──► error!(fatal) → Err(AlreadyExecuted)
//!   ├─► config.merge(overrides)
//!   └─► for stage in PreInit, Config, PostConfig, Bootstrap, Ready:
//!         ├─► mark running
//!         ├─► loop: take list ──empty──► mark done (late registrations now run immediately)
//!         │         └─► run_tiers(list)   (registrations made meanwhile join the next round)
//!         └─► Err on fatal stage ──► error!(fatal) → Err(StageFailed)
//!
//! teardown()
//!   └─► ShutdownStart ─► ShutdownComplete   (best-effort, never fails)
//! ```
//!
//! Finding the list empty and marking the stage done happen under the same lock a
//! registration takes, so every registration is either run by the stage itself or
//! run late; none is dropped and no stage overlaps the next.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ConfigOverrides};
use crate::core::Supervisor;
use crate::error::RuntimeError;
use crate::events::{Event, EventKind};

use super::callback::CallbackRef;
use super::child::ChildLifecycle;
use super::stage::Stage;
use super::table::{Registration, StageTable, run_tiers};
use super::StageRegistry;

/// Timing of one successful boot.
#[derive(Clone, Debug, Default)]
pub struct BootStats {
    /// Duration of each boot stage, in execution order.
    pub stages: Vec<(Stage, Duration)>,
    /// Wall time of the whole boot sequence.
    pub total: Duration,
}

impl BootStats {
    /// Duration of `stage`, if it ran.
    pub fn stage(&self, stage: Stage) -> Option<Duration> {
        self.stages
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, d)| *d)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Progress {
    #[default]
    Pending,
    Running,
    Done,
}

struct StageState {
    table: StageTable,
    progress: [Progress; Stage::COUNT],
}

/// State shared between the root and its children.
pub(crate) struct Shared {
    name: Arc<str>,
    state: Mutex<StageState>,
    executed: AtomicBool,
    torn_down: AtomicBool,
    config: Arc<ArcSwap<Config>>,
    supervisor: Supervisor,
}

impl Shared {
    /// Adds a registration, or runs it right away when its stage already ran.
    ///
    /// A registration for the stage that is running joins that stage.
    pub(crate) fn register(&self, stage: Stage, reg: Registration) {
        {
            let mut state = self.state.lock();
            if state.progress[stage.index()] != Progress::Done {
                state.table.push(stage, reg);
                return;
            }
        }
        self.run_late(stage, reg.callback);
    }

    fn run_late(&self, stage: Stage, callback: CallbackRef) {
        warn!(stage = %stage, callback = callback.name(), "[{stage}] late attach");
        self.supervisor.bus().publish(
            Event::new(EventKind::LateRegistration)
                .with_stage(stage)
                .with_context(self.name.clone())
                .with_label(callback.name()),
        );
        self.supervisor.spawn(async move {
            if let Err(error) = Supervisor::invoke(callback.as_ref()).await {
                error!(
                    stage = %stage,
                    callback = callback.name(),
                    error = %error,
                    "late lifecycle callback failed"
                );
            }
        });
    }

    pub(crate) fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    fn is_completed(&self, stage: Stage) -> bool {
        self.state.lock().progress[stage.index()] == Progress::Done
    }

    fn set_progress(&self, stage: Stage, progress: Progress) {
        self.state.lock().progress[stage.index()] = progress;
    }
}

/// The application's root lifecycle.
///
/// Cheap to clone; clones share the same stage tables.
#[derive(Clone)]
pub struct Lifecycle {
    shared: Arc<Shared>,
}

impl Lifecycle {
    pub(crate) fn new(
        name: impl Into<Arc<str>>,
        config: Arc<ArcSwap<Config>>,
        supervisor: Supervisor,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                state: Mutex::new(StageState {
                    table: StageTable::default(),
                    progress: [Progress::Pending; Stage::COUNT],
                }),
                executed: AtomicBool::new(false),
                torn_down: AtomicBool::new(false),
                config,
                supervisor,
            }),
        }
    }

    /// Application name used in logs.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Returns a child lifecycle that merges into this one when attached.
    pub fn child(&self, name: impl Into<Arc<str>>) -> ChildLifecycle {
        ChildLifecycle::new(name.into(), self.shared.clone())
    }

    /// True once `stage` has finished, successfully or not; later registrations run late.
    pub fn is_completed(&self, stage: Stage) -> bool {
        self.shared.is_completed(stage)
    }

    /// Snapshot of the resolved configuration.
    pub fn config(&self) -> Arc<Config> {
        self.shared.config.load_full()
    }

    /// Runs the boot stages `PreInit..=Ready`, once.
    ///
    /// `overrides` are merged into the resolved configuration before any stage runs,
    /// so `Config` callbacks and everything after observe them.
    ///
    /// ### Errors
    /// - [`RuntimeError::AlreadyExecuted`] on a second call; nothing is re-run
    /// - [`RuntimeError::StageFailed`] when a callback of `PreInit..=Bootstrap` fails;
    ///   later stages are not started
    pub async fn exec(&self, overrides: ConfigOverrides) -> Result<BootStats, RuntimeError> {
        if self.shared.executed.swap(true, Ordering::SeqCst) {
            let err = RuntimeError::AlreadyExecuted;
            error!(fatal = true, application = %self.shared.name, "{err}");
            return Err(err);
        }

        let mut config = Config::clone(&self.shared.config.load());
        config.merge(&overrides);
        self.shared.config.store(Arc::new(config));

        let started = Instant::now();
        let mut stats = BootStats::default();
        for stage in Stage::BOOT {
            match self.run_stage(stage).await {
                Ok(elapsed) => stats.stages.push((stage, elapsed)),
                Err(err) => {
                    error!(
                        fatal = true,
                        application = %self.shared.name,
                        stage = %stage,
                        error = %err.as_message(),
                        "bootstrap failed"
                    );
                    return Err(err);
                }
            }
        }
        stats.total = started.elapsed();

        info!(
            total_ms = stats.total.as_millis() as u64,
            "[{}] application bootstrapped", self.shared.name
        );
        Ok(stats)
    }

    /// Runs `ShutdownStart` then `ShutdownComplete`.
    ///
    /// Best-effort: failing callbacks are logged and the rest still run.
    /// A no-op before [`exec`](Self::exec) and on every call after the first.
    pub async fn teardown(&self) {
        if !self.shared.executed.load(Ordering::SeqCst) {
            debug!(application = %self.shared.name, "teardown before exec; nothing to do");
            return;
        }
        if self.shared.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }

        info!(application = %self.shared.name, "tearing down application");
        let started = Instant::now();
        for stage in Stage::SHUTDOWN {
            // shutdown stages are non-fatal; run_stage only fails on fatal stages
            let _ = self.run_stage(stage).await;
        }
        info!(
            application = %self.shared.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "application terminated"
        );
    }

    async fn run_stage(&self, stage: Stage) -> Result<Duration, RuntimeError> {
        self.shared.set_progress(stage, Progress::Running);

        let bus = self.shared.supervisor.bus();
        bus.publish(Event::new(EventKind::StageStarting).with_stage(stage));

        let started = Instant::now();
        let res = loop {
            let regs = {
                let mut state = self.shared.state.lock();
                let regs = state.table.take(stage);
                if regs.is_empty() {
                    state.progress[stage.index()] = Progress::Done;
                }
                regs
            };
            if regs.is_empty() {
                break Ok(());
            }

            debug!(stage = %stage, callbacks = regs.len(), "[{stage}] running lifecycle callbacks");
            if let Err(failure) = run_tiers(stage, regs).await {
                self.shared.set_progress(stage, Progress::Done);
                break Err(failure);
            }
        };
        let elapsed = started.elapsed();

        match res {
            Ok(()) => {
                bus.publish(
                    Event::new(EventKind::StageCompleted)
                        .with_stage(stage)
                        .with_duration(elapsed),
                );
                Ok(elapsed)
            }
            Err(failure) => {
                bus.publish(
                    Event::new(EventKind::StageFailed)
                        .with_stage(stage)
                        .with_label(failure.callback.as_str())
                        .with_reason(failure.error.to_string()),
                );
                Err(RuntimeError::StageFailed {
                    stage,
                    callback: failure.callback,
                    error: failure.error,
                })
            }
        }
    }
}

impl StageRegistry for Lifecycle {
    fn on_stage(&self, stage: Stage, callback: CallbackRef, priority: Option<i32>) {
        self.shared.register(stage, Registration { callback, priority });
    }
}
