//! # LogWriter: renders runtime events as log lines.
//!
//! Enabled with the `logging` feature. Lines go through `tracing`, so they follow
//! whatever subscriber [`init_tracing`](crate::telemetry::init_tracing) installed.
//!
//! ## Example output
//! ```text
//! [stage-completed] stage=Bootstrap duration_ms=12
//! [exec-failed] context="lights" label="sunset" reason="execution failed: timeout"
//! [schedule-started] context="heartbeat" label="tick"
//! [sequence-matched] context="switch" label="double-press"
//! [shutdown-requested]
//! ```

use async_trait::async_trait;
use tracing::{info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn field(v: &Option<std::sync::Arc<str>>) -> &str {
    v.as_deref().unwrap_or("-")
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let stage = e.stage.map(|s| s.as_label()).unwrap_or("-");
        match e.kind {
            EventKind::StageStarting => info!("[stage-starting] stage={stage}"),
            EventKind::StageCompleted => info!(
                "[stage-completed] stage={stage} duration_ms={:?}",
                e.duration_ms
            ),
            EventKind::StageFailed => warn!(
                "[stage-failed] stage={stage} callback={:?} reason={:?}",
                field(&e.label),
                field(&e.reason)
            ),
            EventKind::LateRegistration => warn!(
                "[late-registration] stage={stage} callback={:?}",
                field(&e.label)
            ),
            EventKind::ChildAttached => info!("[child-attached] child={:?}", field(&e.context)),
            EventKind::ExecSucceeded => info!(
                "[exec-succeeded] context={:?} label={:?} duration_ms={:?}",
                field(&e.context),
                field(&e.label),
                e.duration_ms
            ),
            EventKind::ExecFailed => warn!(
                "[exec-failed] context={:?} label={:?} reason={:?}",
                field(&e.context),
                field(&e.label),
                field(&e.reason)
            ),
            EventKind::ScheduleStarted => info!(
                "[schedule-started] context={:?} label={:?}",
                field(&e.context),
                field(&e.label)
            ),
            EventKind::ScheduleStopped => info!(
                "[schedule-stopped] context={:?} label={:?}",
                field(&e.context),
                field(&e.label)
            ),
            EventKind::ScheduleSkipped => warn!(
                "[schedule-skipped] context={:?} label={:?} reason={:?}",
                field(&e.context),
                field(&e.label),
                field(&e.reason)
            ),
            EventKind::SequenceMatched => info!(
                "[sequence-matched] context={:?} label={:?}",
                field(&e.context),
                field(&e.label)
            ),
            EventKind::SequenceExpired => info!(
                "[sequence-expired] context={:?} label={:?}",
                field(&e.context),
                field(&e.label)
            ),
            EventKind::SubscriptionOpened => {
                info!("[subscription-opened] event_type={:?}", field(&e.reason))
            }
            EventKind::SubscriptionClosed => {
                info!("[subscription-closed] event_type={:?}", field(&e.reason))
            }
            EventKind::ShutdownRequested => info!("[shutdown-requested]"),
            EventKind::SubscriberOverflow => warn!(
                "[subscriber-overflow] subscriber={:?} reason={:?}",
                field(&e.context),
                field(&e.reason)
            ),
            EventKind::SubscriberPanicked => warn!(
                "[subscriber-panicked] subscriber={} info={}",
                field(&e.context),
                field(&e.reason)
            ),
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
