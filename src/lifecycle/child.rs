//! # Child lifecycle: local registrations merged into the root at attach time.
//!
//! ```text
//! library ──► child.on_ready(cb)      (kept locally)
//!         ──► child.on_attach(hook)
//!
//! child.attach()
//!   ├─► attached? ──yes──► Err(AlreadyAttached)
//!   ├─► move every local list into the root, in stage order
//!   │     (stages the root already ran execute late)
//!   └─► run on-attach hooks in registration order
//!
//! after attach: child.on_*(cb) ──► forwarded to the root
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::core::Supervisor;
use crate::error::RuntimeError;
use crate::events::{Event, EventKind};

use super::callback::CallbackRef;
use super::root::Shared;
use super::stage::Stage;
use super::table::{Registration, StageTable};
use super::StageRegistry;

struct ChildState {
    table: StageTable,
    on_attach: Vec<CallbackRef>,
    attached: bool,
}

struct ChildInner {
    name: Arc<str>,
    parent: Arc<Shared>,
    state: Mutex<ChildState>,
}

/// A module-local lifecycle created with [`Lifecycle::child`](super::Lifecycle::child).
///
/// Cheap to clone; stays usable after [`attach`](Self::attach).
#[derive(Clone)]
pub struct ChildLifecycle {
    inner: Arc<ChildInner>,
}

impl ChildLifecycle {
    pub(crate) fn new(name: Arc<str>, parent: Arc<Shared>) -> Self {
        Self {
            inner: Arc::new(ChildInner {
                name,
                parent,
                state: Mutex::new(ChildState {
                    table: StageTable::default(),
                    on_attach: Vec::new(),
                    attached: false,
                }),
            }),
        }
    }

    /// Module name used in logs.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// True once [`attach`](Self::attach) has run.
    pub fn is_attached(&self) -> bool {
        self.inner.state.lock().attached
    }

    /// Registers a hook to run right after this child's callbacks are merged.
    pub fn on_attach(&self, callback: CallbackRef) {
        {
            let mut state = self.inner.state.lock();
            if !state.attached {
                state.on_attach.push(callback);
                return;
            }
        }

        warn!(child = %self.inner.name, callback = callback.name(), "[attach] late attach");
        let child = self.inner.name.clone();
        self.inner.parent.supervisor().spawn(async move {
            if let Err(error) = Supervisor::invoke(callback.as_ref()).await {
                error!(child = %child, callback = callback.name(), error = %error, "late attach hook failed");
            }
        });
    }

    /// Merges this child's registrations into the root, then runs its attach hooks.
    ///
    /// ### Errors
    /// - [`RuntimeError::AlreadyAttached`] on a second call
    /// - [`RuntimeError::AttachFailed`] when an attach hook fails; later hooks are skipped
    pub async fn attach(&self) -> Result<(), RuntimeError> {
        let hooks = {
            let mut state = self.inner.state.lock();
            if state.attached {
                let err = RuntimeError::AlreadyAttached {
                    child: self.inner.name.to_string(),
                };
                error!(child = %self.inner.name, "{err}");
                return Err(err);
            }
            state.attached = true;

            // parent registration happens under the child lock so a concurrent
            // forwarded registration cannot overtake the merged lists
            for (stage, regs) in state.table.drain() {
                for reg in regs {
                    self.inner.parent.register(stage, reg);
                }
            }
            std::mem::take(&mut state.on_attach)
        };

        debug!(child = %self.inner.name, hooks = hooks.len(), "child lifecycle attached");
        self.inner
            .parent
            .supervisor()
            .bus()
            .publish(Event::new(EventKind::ChildAttached).with_context(self.inner.name.clone()));

        for hook in hooks {
            if let Err(error) = Supervisor::invoke(hook.as_ref()).await {
                let err = RuntimeError::AttachFailed {
                    child: self.inner.name.to_string(),
                    callback: hook.name().to_string(),
                    error,
                };
                error!(fatal = true, child = %self.inner.name, error = %err.as_message(), "attach failed");
                return Err(err);
            }
        }
        Ok(())
    }
}

impl StageRegistry for ChildLifecycle {
    fn on_stage(&self, stage: Stage, callback: CallbackRef, priority: Option<i32>) {
        let reg = Registration { callback, priority };
        let mut state = self.inner.state.lock();
        if state.attached {
            self.inner.parent.register(stage, reg);
        } else {
            state.table.push(stage, reg);
        }
    }
}
