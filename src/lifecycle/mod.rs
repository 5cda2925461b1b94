//! # Staged application lifecycle.
//!
//! A [`Lifecycle`] collects callbacks against named [`Stage`]s and runs them in a fixed
//! order: boot via [`Lifecycle::exec`], shutdown via [`Lifecycle::teardown`].
//! Modules register against a [`ChildLifecycle`] and merge into the root with
//! [`ChildLifecycle::attach`].
//!
//! ```text
//!   child("mqtt") ──┐ attach
//!   child("http") ──┼──────────► Lifecycle ── exec ──► PreInit … Ready
//!   app code ───────┘                       ── teardown ──► ShutdownStart, ShutdownComplete
//! ```
//!
//! Inside one stage, prioritized callbacks run one by one in ascending priority, then
//! every unprioritized callback runs concurrently.

mod callback;
mod child;
mod root;
mod stage;
mod table;

pub use callback::{BoxCallbackFuture, Callback, CallbackFn, CallbackRef};
pub use child::ChildLifecycle;
pub use root::{BootStats, Lifecycle};
pub use stage::Stage;

/// Registration surface shared by the root and child lifecycles.
///
/// Registration is valid at any time. A callback registered for the stage that is
/// running joins it; one whose stage already ran is spawned right away and a
/// warning is logged.
pub trait StageRegistry: Send + Sync {
    /// Registers `callback` for `stage`; `priority` puts it in the ordered tier.
    fn on_stage(&self, stage: Stage, callback: CallbackRef, priority: Option<i32>);

    fn on_pre_init(&self, callback: CallbackRef) {
        self.on_stage(Stage::PreInit, callback, None);
    }

    fn on_config(&self, callback: CallbackRef) {
        self.on_stage(Stage::Config, callback, None);
    }

    fn on_post_config(&self, callback: CallbackRef) {
        self.on_stage(Stage::PostConfig, callback, None);
    }

    fn on_bootstrap(&self, callback: CallbackRef) {
        self.on_stage(Stage::Bootstrap, callback, None);
    }

    fn on_ready(&self, callback: CallbackRef) {
        self.on_stage(Stage::Ready, callback, None);
    }

    fn on_shutdown_start(&self, callback: CallbackRef) {
        self.on_stage(Stage::ShutdownStart, callback, None);
    }

    fn on_shutdown_complete(&self, callback: CallbackRef) {
        self.on_stage(Stage::ShutdownComplete, callback, None);
    }
}
