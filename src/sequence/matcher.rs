//! # Sequence matcher.
//!
//! Watches event streams for an ordered run of values and fires a callback when a
//! watcher's accumulated history equals its expected sequence.
//!
//! ## Per inbound event (for every watcher of that event type)
//! ```text
//! payload ─► filter? ──no──► ignore
//!               │yes
//!               ▼
//!        extract value at path (missing → null)
//!               ▼
//!        cancel pending expiry, append to history
//!               ▼
//!        history == matches ?
//!          ├─ yes ─► dispatch exec, publish SequenceMatched
//!          │         reset: Own → clear this watcher
//!          │                Labels(set) → clear this watcher + every watcher labeled in set
//!          └─ no  ─► arm expiry (sequence timeout); on expiry clear this watcher
//! ```
//!
//! ## Rules
//! - One source subscription per event type, opened by the first watcher and closed by
//!   the removal of the last one
//! - Watchers are identified by their registration, not by their options
//! - Expiry timers are cancelled under the state lock and re-checked by generation
//!   under the same lock, so a newer event always wins over an older timer

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::core::{ExecKind, ExecLabels, Supervisor};
use crate::events::{Event, EventKind};
use crate::lifecycle::{CallbackFn, StageRegistry};

use super::options::{ResetPolicy, WatchOptions};
use super::path;
use super::source::{EventHandler, EventSource, Unsubscribe};

struct Watcher {
    opts: WatchOptions,
    labels: ExecLabels,
}

impl Watcher {
    fn label(&self) -> Option<&str> {
        self.opts.label.as_deref()
    }
}

/// Watcher identity: the registration itself.
#[derive(Clone)]
struct WatcherKey(Arc<Watcher>);

impl PartialEq for WatcherKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for WatcherKey {}

impl Hash for WatcherKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.0), state);
    }
}

/// Partial match of one watcher.
struct Active {
    history: Vec<Value>,
    expiry: Option<CancellationToken>,
    generation: u64,
}

impl Active {
    fn cancel(&mut self) {
        if let Some(token) = self.expiry.take() {
            token.cancel();
        }
    }
}

#[derive(Default)]
struct MatchState {
    watchers: HashMap<String, Vec<Arc<Watcher>>>,
    subscriptions: HashMap<String, Unsubscribe>,
    active: HashMap<WatcherKey, Active>,
    generation: u64,
}

impl MatchState {
    fn is_registered(&self, watcher: &Arc<Watcher>) -> bool {
        self.watchers
            .get(&watcher.opts.event_type)
            .is_some_and(|list| list.iter().any(|w| Arc::ptr_eq(w, watcher)))
    }

    fn clear(&mut self, key: &WatcherKey) {
        if let Some(mut active) = self.active.remove(key) {
            active.cancel();
        }
    }
}

struct MatcherInner {
    source: Arc<dyn EventSource>,
    supervisor: Supervisor,
    timeout_ms: AtomicU64,
    state: Mutex<MatchState>,
}

/// Matches ordered value sequences on event streams.
///
/// Obtained from [`Runtime::sequence_matcher`](crate::Runtime::sequence_matcher).
/// Listening starts with the first [`watch`](Self::watch), independent of lifecycle stage.
#[derive(Clone)]
pub struct SequenceMatcher {
    inner: Arc<MatcherInner>,
}

impl SequenceMatcher {
    /// Creates a matcher reading its timeout now and again at `PostConfig`.
    pub(crate) fn new(
        lifecycle: &dyn StageRegistry,
        source: Arc<dyn EventSource>,
        supervisor: Supervisor,
        config: Arc<ArcSwap<Config>>,
    ) -> Self {
        let inner = Arc::new(MatcherInner {
            source,
            supervisor,
            timeout_ms: AtomicU64::new(config.load().sequence_timeout_ms),
            state: Mutex::new(MatchState::default()),
        });

        let weak = Arc::downgrade(&inner);
        lifecycle.on_post_config(CallbackFn::arc("sequence-matcher:timeout", move || {
            if let Some(inner) = weak.upgrade() {
                let ms = config.load().sequence_timeout_ms;
                inner.timeout_ms.store(ms, Ordering::Relaxed);
                debug!(timeout_ms = ms, "sequence timeout refreshed");
            }
            async { Ok(()) }
        }));

        Self { inner }
    }

    /// Current inactivity timeout for partial sequences.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.inner.timeout_ms.load(Ordering::Relaxed))
    }

    /// Registers a watcher; the returned handle removes it.
    pub fn watch(&self, opts: WatchOptions) -> WatchHandle {
        if opts.matches.is_empty() {
            warn!(context = %opts.context, label = ?opts.label, "watcher with an empty sequence never fires");
        }
        if matches!(&opts.reset, ResetPolicy::Labels(labels) if labels.is_empty()) {
            warn!(context = %opts.context, label = ?opts.label, "empty reset label set; resetting own history only");
        }

        let labels = ExecLabels::new(ExecKind::Sequence, opts.context.as_str(), opts.label.as_deref());
        let watcher = Arc::new(Watcher { opts, labels });
        let event_type = watcher.opts.event_type.clone();

        let mut state = self.inner.state.lock();
        state
            .watchers
            .entry(event_type.clone())
            .or_default()
            .push(watcher.clone());

        if !state.subscriptions.contains_key(&event_type) {
            let weak = Arc::downgrade(&self.inner);
            let ty = event_type.clone();
            let handler: EventHandler = Arc::new(move |payload: &Value| {
                if let Some(inner) = weak.upgrade() {
                    inner.on_event(&ty, payload);
                }
            });
            let unsubscribe = self.inner.source.on_event(&event_type, handler);
            state.subscriptions.insert(event_type.clone(), unsubscribe);
            debug!(event_type = %event_type, "subscribed to event type");
            self.inner
                .supervisor
                .bus()
                .publish(Event::new(EventKind::SubscriptionOpened).with_reason(event_type.as_str()));
        }
        drop(state);

        WatchHandle {
            matcher: Arc::downgrade(&self.inner),
            watcher: Mutex::new(Some(watcher)),
        }
    }

    /// Number of watchers registered for `event_type`.
    pub fn watcher_count(&self, event_type: &str) -> usize {
        self.inner
            .state
            .lock()
            .watchers
            .get(event_type)
            .map_or(0, Vec::len)
    }
}

impl MatcherInner {
    fn on_event(self: &Arc<Self>, event_type: &str, payload: &Value) {
        let watchers = match self.state.lock().watchers.get(event_type) {
            Some(list) => list.clone(),
            None => return,
        };

        for watcher in watchers {
            if let Some(filter) = &watcher.opts.filter {
                if !filter(payload) {
                    continue;
                }
            }
            let value = path::extract(payload, &watcher.opts.path)
                .cloned()
                .unwrap_or(Value::Null);
            self.accept(&watcher, value);
        }
    }

    fn accept(self: &Arc<Self>, watcher: &Arc<Watcher>, value: Value) {
        let key = WatcherKey(watcher.clone());
        let mut state = self.state.lock();
        if !state.is_registered(watcher) {
            return;
        }

        let entry = state.active.entry(key.clone()).or_insert_with(|| Active {
            history: Vec::new(),
            expiry: None,
            generation: 0,
        });
        entry.cancel();
        entry.history.push(value);

        let matched = entry.history.len() == watcher.opts.matches.len()
            && entry
                .history
                .iter()
                .zip(&watcher.opts.matches)
                .all(|(seen, expected)| seen == expected);

        if matched {
            debug!(
                context = %watcher.labels.context,
                label = watcher.labels.label_str(),
                "sequence matched"
            );
            self.supervisor
                .bus()
                .publish(self.sequence_event(EventKind::SequenceMatched, watcher));
            self.supervisor
                .dispatch(watcher.labels.clone(), watcher.opts.exec.clone());
            Self::reset(&mut state, &key);
            return;
        }

        state.generation += 1;
        let generation = state.generation;
        let token = CancellationToken::new();
        if let Some(entry) = state.active.get_mut(&key) {
            entry.expiry = Some(token.clone());
            entry.generation = generation;
        }
        drop(state);

        let timeout = Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed));
        let weak = Arc::downgrade(self);
        self.supervisor.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(timeout) => {}
            }
            if let Some(inner) = weak.upgrade() {
                inner.expire(&key, generation);
            }
        });
    }

    fn reset(state: &mut MatchState, key: &WatcherKey) {
        state.clear(key);
        let ResetPolicy::Labels(labels) = &key.0.opts.reset else {
            return;
        };
        let group: Vec<WatcherKey> = state
            .active
            .keys()
            .filter(|k| k.0.label().is_some_and(|l| labels.iter().any(|g| g == l)))
            .cloned()
            .collect();
        for k in group {
            state.clear(&k);
        }
    }

    fn expire(&self, key: &WatcherKey, generation: u64) {
        let mut state = self.state.lock();
        let current = state
            .active
            .get(key)
            .is_some_and(|a| a.generation == generation && a.expiry.is_some());
        if !current {
            return;
        }
        state.active.remove(key);
        drop(state);

        debug!(
            context = %key.0.labels.context,
            label = key.0.labels.label_str(),
            "partial sequence expired"
        );
        self.supervisor
            .bus()
            .publish(self.sequence_event(EventKind::SequenceExpired, &key.0));
    }

    fn sequence_event(&self, kind: EventKind, watcher: &Watcher) -> Event {
        Event::new(kind)
            .with_context(watcher.labels.context.clone())
            .with_label_opt(watcher.labels.label.as_deref())
    }

    fn remove(&self, watcher: &Arc<Watcher>) {
        let event_type = &watcher.opts.event_type;
        let unsubscribe = {
            let mut state = self.state.lock();
            state.clear(&WatcherKey(watcher.clone()));

            let Some(list) = state.watchers.get_mut(event_type) else {
                return;
            };
            list.retain(|w| !Arc::ptr_eq(w, watcher));
            if !list.is_empty() {
                return;
            }
            state.watchers.remove(event_type);
            state.subscriptions.remove(event_type)
        };

        if let Some(unsubscribe) = unsubscribe {
            unsubscribe.call();
            debug!(event_type = %event_type, "released event type subscription");
            self.supervisor
                .bus()
                .publish(Event::new(EventKind::SubscriptionClosed).with_reason(event_type.as_str()));
        }
    }
}

/// Removes its watcher when [`remove`](Self::remove) is called. Removal is idempotent.
pub struct WatchHandle {
    matcher: Weak<MatcherInner>,
    watcher: Mutex<Option<Arc<Watcher>>>,
}

impl WatchHandle {
    /// Drops the watcher and any partial history it holds.
    ///
    /// Removing the last watcher of an event type releases the source subscription.
    pub fn remove(&self) {
        let Some(watcher) = self.watcher.lock().take() else {
            return;
        };
        if let Some(matcher) = self.matcher.upgrade() {
            matcher.remove(&watcher);
        }
    }

    /// True until [`remove`](Self::remove) has been called.
    pub fn is_active(&self) -> bool {
        self.watcher.lock().is_some()
    }
}
