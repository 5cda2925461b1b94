//! # Runtime: owns the lifecycle, event fan-out and schedule bookkeeping.
//!
//! The [`Runtime`] owns the event bus, a [`SubscriberSet`], the resolved
//! configuration, the root [`Lifecycle`] and the registry of running schedules.
//! It hands out schedulers and sequence matchers bound to a lifecycle, boots the
//! application, waits for OS signals and tears it down within [`Config::grace`].
//!
//! ## High-level architecture
//! ```text
//! Runtime::builder(cfg).with_subscribers(subs).build()
//!   - Bus (broadcast) ─► subscriber_listener ─► SubscriberSet::emit(&Event)
//!   - Supervisor(bus), Lifecycle(config, supervisor)
//!   - ScheduleRegistry, stop_all hooked at ShutdownStart (first in line)
//!
//! serve(overrides):
//!   lifecycle.exec(overrides)            ── Err ─► fatal log, return Err
//!             └─► PreInit … Ready       (schedules start at Ready)
//!   shutdown::wait_for_shutdown_signal()
//!             └─► Bus.publish(ShutdownRequested)
//!             └─► timeout(grace, lifecycle.teardown()):
//!                    ├─ Ok        → Ok(())
//!                    └─ Elapsed   → Err(GraceExceeded)
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use std::process::ExitCode;
//! use std::time::Duration;
//! use stagehand::{CallbackFn, Config, ConfigOverrides, IntervalOptions, Runtime};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> ExitCode {
//!     let runtime = Runtime::builder(Config::default()).with_name("demo").build();
//!     let lifecycle = runtime.lifecycle().clone();
//!
//!     let scheduler = runtime.scheduler("demo", &lifecycle);
//!     scheduler
//!         .interval(IntervalOptions::new(
//!             Duration::from_secs(5),
//!             CallbackFn::arc("tick", || async { Ok::<_, stagehand::TaskError>(()) }),
//!         ))
//!         .expect("non-zero interval");
//!
//!     runtime.run(ConfigOverrides::default()).await
//! }
//! ```

use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;

use arc_swap::ArcSwap;
use tracing::{error, info};

use super::builder::RuntimeBuilder;
use super::shutdown;
use super::supervise::Supervisor;
use crate::config::{Config, ConfigOverrides};
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::lifecycle::{BootStats, Lifecycle, StageRegistry};
use crate::scheduler::{Clock, ScheduleRegistry, Scheduler};
use crate::sequence::{EventSource, SequenceMatcher};
use crate::stats::ExecutionTracker;
use crate::subscribers::SubscriberSet;

/// Process-wide runtime value; build one with [`Runtime::builder`].
pub struct Runtime {
    pub(super) config: Arc<ArcSwap<Config>>,
    pub(super) bus: Bus,
    pub(super) subs: Arc<SubscriberSet>,
    pub(super) supervisor: Supervisor,
    pub(super) lifecycle: Lifecycle,
    pub(super) schedules: Arc<ScheduleRegistry>,
    pub(super) clock: Clock,
}

impl Runtime {
    /// Returns a builder over `cfg`.
    pub fn builder(cfg: Config) -> RuntimeBuilder {
        RuntimeBuilder::new(cfg)
    }

    /// The root lifecycle.
    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Bus every runtime event is published on.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Supervisor running callbacks for this runtime.
    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Snapshot of the resolved configuration.
    pub fn config(&self) -> Arc<Config> {
        self.config.load_full()
    }

    /// Per-`{context, label}` execution counters.
    pub fn tracker(&self) -> &Arc<ExecutionTracker> {
        self.supervisor.tracker()
    }

    /// Number of subscribers receiving runtime events.
    pub fn subscriber_count(&self) -> usize {
        self.subs.len()
    }

    /// Number of schedules currently running.
    pub fn running_schedules(&self) -> usize {
        self.schedules.len()
    }

    /// Scheduler for `context` whose schedules start when `lifecycle` reaches `Ready`.
    pub fn scheduler<L>(&self, context: &str, lifecycle: &L) -> Scheduler
    where
        L: StageRegistry + Clone + 'static,
    {
        Scheduler::new(
            Arc::from(context),
            Arc::new(lifecycle.clone()),
            self.supervisor.clone(),
            self.clock.clone(),
            self.schedules.clone(),
        )
    }

    /// Sequence matcher reading `source`; its timeout refreshes at `lifecycle`'s `PostConfig`.
    pub fn sequence_matcher<L>(&self, lifecycle: &L, source: Arc<dyn EventSource>) -> SequenceMatcher
    where
        L: StageRegistry,
    {
        SequenceMatcher::new(
            lifecycle,
            source,
            self.supervisor.clone(),
            self.config.clone(),
        )
    }

    /// Boots, waits for `stop` to resolve, then tears down within the grace period.
    ///
    /// ### Errors
    /// - boot errors of [`Lifecycle::exec`]; `stop` is never polled then
    /// - [`RuntimeError::GraceExceeded`] when shutdown callbacks outlive the grace period
    pub async fn serve_until<F>(&self, overrides: ConfigOverrides, stop: F) -> Result<BootStats, RuntimeError>
    where
        F: Future<Output = ()>,
    {
        let stats = self.lifecycle.exec(overrides).await?;
        stop.await;

        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        info!(application = self.lifecycle.name(), "shutdown requested");
        self.shutdown().await?;
        Ok(stats)
    }

    /// [`serve_until`](Self::serve_until) an OS termination signal.
    ///
    /// ### Errors
    /// See [`serve_until`](Self::serve_until).
    pub async fn serve(&self, overrides: ConfigOverrides) -> Result<BootStats, RuntimeError> {
        let signal = async {
            if let Err(e) = shutdown::wait_for_shutdown_signal().await {
                error!(error = %e, "cannot listen for termination signals; shutting down");
            }
        };
        self.serve_until(overrides, signal).await
    }

    /// Runs the application to completion and maps the outcome to a process exit code.
    pub async fn run(&self, overrides: ConfigOverrides) -> ExitCode {
        match self.serve(overrides).await {
            Ok(_) => ExitCode::SUCCESS,
            // boot failures were logged as fatal by the lifecycle
            Err(e) if e.is_fatal() => ExitCode::FAILURE,
            Err(e) => {
                error!(error = %e.as_message(), kind = e.as_label(), "shutdown failed");
                ExitCode::FAILURE
            }
        }
    }

    async fn shutdown(&self) -> Result<(), RuntimeError> {
        let teardown = self.lifecycle.teardown();
        match self.config().grace() {
            None => {
                teardown.await;
                Ok(())
            }
            Some(grace) => tokio::time::timeout(grace, teardown)
                .await
                .map_err(|_| RuntimeError::GraceExceeded { grace }),
        }
    }
}
