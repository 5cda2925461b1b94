//! # stagehand
//!
//! **Stagehand** is the runtime core of a long-running service: a staged application
//! lifecycle, supervised repeating schedules, and a matcher for ordered value
//! sequences on external event streams.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!    ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!    │ module "mqtt"│   │ module "http"│   │  app code    │
//!    │ ChildLifecycle   │ ChildLifecycle   │              │
//!    └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!           │ attach           │ attach           │ on_ready(...)
//!           ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Runtime                                                          │
//! │  - Lifecycle (root; PreInit … Ready, ShutdownStart, ShutdownCompl)│
//! │  - Supervisor (runs callbacks, reports + swallows failures)       │
//! │  - ScheduleRegistry (running schedules, stopped at ShutdownStart) │
//! │  - Config (ArcSwap; overrides merged on exec)                     │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               │
//!  ┌────────────┐    ┌────────────┐    ┌───────────────┐       │
//!  │ Scheduler  │    │ Scheduler  │    │SequenceMatcher│       │
//!  │ cron/inter-│    │  sliding   │    │ EventSource ─►│       │
//!  │ val        │    │            │    │ history/match │       │
//!  └─────┬──────┘    └─────┬──────┘    └──────┬────────┘       │
//!        │ Publishes       │                  │                │
//!        │ ScheduleStarted │ ScheduleSkipped  │ SequenceMatched│
//!        │ ExecSucceeded   │ ExecFailed       │ SequenceExpired│
//!        ▼                 ▼                  ▼                ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │                   (capacity: Config::bus_capacity)                │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  subscriber_listener   │
//!                       └───────────┬────────────┘
//!                                   ▼
//!                             SubscriberSet
//!                                   │
//!                                   ▼
//!                          LogWriter / custom
//!
//!  Supervisor::run ─► ExecutionTracker + metrics facade  (written in place, never lagged)
//! ```
//!
//! ### Lifecycle
//! ```text
//! exec(overrides):
//!   merge overrides into Config
//!   for stage in PreInit, Config, PostConfig, Bootstrap, Ready {
//!     ├─► publish StageStarting
//!     ├─► prioritized callbacks, ascending, one at a time
//!     ├─► unprioritized callbacks, concurrently
//!     └─► failure before Ready ─► StageFailed, fatal, later stages never run
//!   }
//!
//! teardown():
//!   ShutdownStart (schedules stopped first), ShutdownComplete; failures logged and skipped
//! ```
//!
//! ## Features
//! | Area              | Description                                                 | Key types / traits                            |
//! |-------------------|-------------------------------------------------------------|-----------------------------------------------|
//! | **Lifecycle**     | Ordered stages, priorities, child modules, late registration| [`Lifecycle`], [`ChildLifecycle`], [`StageRegistry`] |
//! | **Scheduling**    | Cron, fixed interval and sliding schedules                  | [`Scheduler`], [`ScheduleHandle`]             |
//! | **Sequences**     | Ordered value matching over event streams                   | [`SequenceMatcher`], [`EventSource`]          |
//! | **Subscriber API**| Hook into runtime events (logging, metrics, custom)         | [`Subscribe`], [`ExecutionTracker`]           |
//! | **Errors**        | Typed errors for the runtime and for callbacks              | [`RuntimeError`], [`TaskError`]               |
//! | **Configuration** | Defaults plus boot-time overrides                           | [`Config`], [`ConfigOverrides`]               |
//!
//! ## Optional features
//! - `logging`: exports a built-in [`LogWriter`] subscriber.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use stagehand::{
//!     CallbackFn, Config, ConfigOverrides, LocalEventSource, Runtime, StageRegistry, WatchOptions,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), stagehand::RuntimeError> {
//!     let runtime = Runtime::builder(Config::default()).with_name("example").build();
//!
//!     // a module registers against its own child lifecycle
//!     let module = runtime.lifecycle().child("lights");
//!     module.on_bootstrap(CallbackFn::arc("connect", || async { Ok::<_, stagehand::TaskError>(()) }));
//!     module.attach().await?;
//!
//!     let source = LocalEventSource::new();
//!     let matcher = runtime.sequence_matcher(&module, Arc::new(source.clone()));
//!     let watch = matcher.watch(WatchOptions::new(
//!         "lights",
//!         "switch",
//!         "state",
//!         ["on", "on"],
//!         CallbackFn::arc("double-on", || async { Ok::<_, stagehand::TaskError>(()) }),
//!     ));
//!
//!     runtime
//!         .serve_until(ConfigOverrides::default(), async {
//!             source.emit("switch", &json!({ "state": "on" }));
//!             source.emit("switch", &json!({ "state": "on" }));
//!         })
//!         .await?;
//!     watch.remove();
//!     Ok(())
//! }
//! ```
mod config;
mod core;
mod error;
mod events;
mod lifecycle;
mod scheduler;
mod sequence;
mod stats;
mod subscribers;
pub mod telemetry;

// ---- Public re-exports ----

pub use config::{Config, ConfigOverrides};
pub use crate::core::{ExecKind, ExecLabels, Runtime, RuntimeBuilder, Supervisor};
pub use error::{RuntimeError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use lifecycle::{
    BootStats, BoxCallbackFuture, Callback, CallbackFn, CallbackRef, ChildLifecycle, Lifecycle,
    Stage, StageRegistry,
};
pub use scheduler::{
    CalendarZone, Clock, CronOptions, IntervalOptions, NextFn, ScheduleHandle, ScheduleState,
    Scheduler, SlidingOptions,
};
pub use sequence::{
    EventHandler, EventSource, FilterFn, LocalEventSource, ResetPolicy, SequenceMatcher,
    Unsubscribe, WatchHandle, WatchOptions,
};
pub use stats::{
    ACTIVE_SCHEDULES, EXECUTION_DURATION, EXECUTION_ERRORS_TOTAL, EXECUTIONS_TOTAL, ExecStats,
    ExecutionTracker, register_metrics,
};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
