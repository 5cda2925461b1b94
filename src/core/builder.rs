use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::runtime::Runtime;
use super::supervise::Supervisor;
use crate::config::Config;
use crate::events::Bus;
use crate::lifecycle::{Lifecycle, Stage, StageRegistry};
use crate::scheduler::{Clock, ScheduleRegistry, stop_all_callback};
use crate::stats::register_metrics;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for constructing a [`Runtime`].
pub struct RuntimeBuilder {
    cfg: Config,
    name: Arc<str>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    clock: Clock,
    metrics: bool,
}

impl RuntimeBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            name: Arc::from("app"),
            subscribers: Vec::new(),
            clock: Clock::system(),
            metrics: false,
        }
    }

    /// Application name used in lifecycle logs.
    pub fn with_name(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (stages, executions, schedule changes)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Describes the `stagehand_*` metrics and records every execution into them.
    ///
    /// Values go to whatever recorder is installed on the `metrics` facade.
    pub fn with_metrics(mut self) -> Self {
        self.metrics = true;
        self
    }

    /// Wall clock used to evaluate calendar expressions.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Builds the runtime.
    ///
    /// This consumes the builder and initializes all runtime components:
    /// - event bus and subscriber workers
    /// - supervisor and root lifecycle
    /// - central schedule registry, stopped first at `ShutdownStart`
    ///
    /// Must be called inside a Tokio runtime.
    pub fn build(self) -> Runtime {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());

        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        subscriber_listener(&bus, Arc::clone(&subs));

        if self.metrics {
            register_metrics();
        }
        let config = Arc::new(ArcSwap::from_pointee(self.cfg));
        let supervisor = Supervisor::new(bus.clone()).with_metrics(self.metrics);
        let lifecycle = Lifecycle::new(self.name, config.clone(), supervisor.clone());

        let schedules = Arc::new(ScheduleRegistry::default());
        lifecycle.on_stage(
            Stage::ShutdownStart,
            stop_all_callback(&schedules),
            Some(i32::MIN),
        );

        Runtime {
            config,
            bus,
            subs,
            supervisor,
            lifecycle,
            schedules,
            clock: self.clock,
        }
    }
}

/// Subscribes to the bus and forwards events to the subscriber set (fire-and-forget).
fn subscriber_listener(bus: &Bus, set: Arc<SubscriberSet>) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => set.emit(&ev),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber listener lagged behind the bus");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
