//! Watcher options.

use std::sync::Arc;

use serde_json::Value;

use crate::lifecycle::CallbackRef;

/// Predicate over a raw payload; events it rejects are ignored by the watcher.
pub type FilterFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Which histories are cleared when a watcher fires.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ResetPolicy {
    /// Only the firing watcher starts over.
    #[default]
    Own,
    /// The firing watcher and every watcher labeled with one of these labels start over.
    Labels(Vec<String>),
}

/// Describes one sequence watcher.
///
/// ```rust
/// use stagehand::{CallbackFn, CallbackRef, ResetPolicy, TaskError, WatchOptions};
///
/// let dim: CallbackRef = CallbackFn::arc("dim", || async { Ok::<_, TaskError>(()) });
/// let opts = WatchOptions::new("office", "switch", "action", ["down", "down"], dim)
///     .with_label("office-remote")
///     .with_filter(|payload| payload["device"] == "remote-1")
///     .with_reset(ResetPolicy::Labels(vec!["office-remote".into()]));
/// assert_eq!(opts.matches.len(), 2);
/// ```
#[derive(Clone)]
pub struct WatchOptions {
    pub context: String,
    pub label: Option<String>,
    pub event_type: String,
    /// Dotted path of the compared value inside each payload.
    pub path: String,
    /// Expected values, in order.
    pub matches: Vec<String>,
    pub filter: Option<FilterFn>,
    pub reset: ResetPolicy,
    pub exec: CallbackRef,
}

impl WatchOptions {
    pub fn new<I, S>(
        context: impl Into<String>,
        event_type: impl Into<String>,
        path: impl Into<String>,
        matches: I,
        exec: CallbackRef,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            context: context.into(),
            label: None,
            event_type: event_type.into(),
            path: path.into(),
            matches: matches.into_iter().map(Into::into).collect(),
            filter: None,
            reset: ResetPolicy::Own,
            exec,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn with_reset(mut self, reset: ResetPolicy) -> Self {
        self.reset = reset;
        self
    }
}
