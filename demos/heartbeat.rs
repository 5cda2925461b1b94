//! Heartbeat demo: a module with a boot hook, three kinds of schedules and a
//! double-press watcher fed by a simulated switch.
//!
//! Run with `cargo run --example heartbeat --features logging`, stop with Ctrl-C.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use serde_json::json;
use stagehand::{
    CallbackFn, Config, ConfigOverrides, CronOptions, IntervalOptions, LocalEventSource, LogWriter,
    ResetPolicy, Runtime, SlidingOptions, StageRegistry, Subscribe, TaskError, WatchOptions,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    stagehand::telemetry::init_tracing("info");

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let runtime = Runtime::builder(Config::default())
        .with_name("heartbeat")
        .with_subscribers(subs)
        .with_metrics()
        .build();

    let module = runtime.lifecycle().child("porch");
    module.on_bootstrap(CallbackFn::arc("porch:connect", || async {
        tracing::info!("porch controller connected");
        Ok::<_, TaskError>(())
    }));

    let scheduler = runtime.scheduler("porch", &module);
    let schedules = [
        scheduler.cron(
            CronOptions::new(
                ["*/10 * * * * *"],
                CallbackFn::arc("beat", || async {
                    tracing::info!("heartbeat");
                    Ok::<_, TaskError>(())
                }),
            )
            .with_label("heartbeat"),
        ),
        scheduler.interval(
            IntervalOptions::new(
                Duration::from_secs(7),
                CallbackFn::arc("flaky", || async {
                    Err::<(), _>(TaskError::fail("sensor did not answer"))
                }),
            )
            .with_label("sensor-poll"),
        ),
        scheduler.sliding(
            SlidingOptions::new(
                "0 * * * * *",
                || Some(Utc::now() + TimeDelta::seconds(20)),
                CallbackFn::arc("porch-light", || async {
                    tracing::info!("porch light off");
                    Ok::<_, TaskError>(())
                }),
            )
            .with_label("porch-light"),
        ),
    ];
    for schedule in schedules {
        if let Err(e) = schedule {
            tracing::error!(error = %e, "cannot create schedule");
            return ExitCode::FAILURE;
        }
    }

    let source = LocalEventSource::new();
    let matcher = runtime.sequence_matcher(&module, Arc::new(source.clone()));
    let _double_press = matcher.watch(
        WatchOptions::new(
            "porch",
            "switch",
            "state",
            ["on", "on"],
            CallbackFn::arc("double-press", || async {
                tracing::info!("double press: all lights on");
                Ok::<_, TaskError>(())
            }),
        )
        .with_label("double-press")
        .with_filter(|payload| payload["device"] == "porch-switch")
        .with_reset(ResetPolicy::Own),
    );

    let pressing = Arc::new(AtomicBool::new(true));
    let flag = pressing.clone();
    module.on_ready(CallbackFn::arc("porch:simulate", move || {
        let source = source.clone();
        let flag = flag.clone();
        async move {
            tokio::spawn(async move {
                while flag.load(Ordering::Relaxed) {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    source.emit("switch", &json!({ "device": "porch-switch", "state": "on" }));
                }
            });
            Ok::<_, TaskError>(())
        }
    }));
    module.on_shutdown_start(CallbackFn::arc("porch:stop-simulation", move || {
        pressing.store(false, Ordering::Relaxed);
        async { Ok::<_, TaskError>(()) }
    }));

    if let Err(e) = module.attach().await {
        tracing::error!(error = %e, "cannot attach porch module");
        return ExitCode::FAILURE;
    }

    runtime.run(ConfigOverrides::default()).await
}
