//! # Sequence matching over external event streams.
//!
//! - [`EventSource`] / [`LocalEventSource`]: where events come from
//! - [`WatchOptions`] / [`ResetPolicy`]: what to look for and what to clear on a match
//! - [`SequenceMatcher`] / [`WatchHandle`]: the matcher and watcher removal

mod matcher;
mod options;
mod path;
mod source;

pub use matcher::{SequenceMatcher, WatchHandle};
pub use options::{FilterFn, ResetPolicy, WatchOptions};
pub use source::{EventHandler, EventSource, LocalEventSource, Unsubscribe};

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use arc_swap::ArcSwap;
    use serde_json::json;
    use tokio::time::sleep;

    use super::*;
    use crate::config::{Config, ConfigOverrides};
    use crate::core::Supervisor;
    use crate::events::{Bus, EventKind};
    use crate::lifecycle::{CallbackFn, CallbackRef, Lifecycle};

    struct Fixture {
        lifecycle: Lifecycle,
        source: LocalEventSource,
        matcher: SequenceMatcher,
        bus: Bus,
    }

    fn fixture() -> Fixture {
        let source = LocalEventSource::new();
        let bus = Bus::new(256);
        let (lifecycle, matcher) = with_source(Arc::new(source.clone()), bus.clone());
        Fixture {
            lifecycle,
            source,
            matcher,
            bus,
        }
    }

    fn with_source(source: Arc<dyn EventSource>, bus: Bus) -> (Lifecycle, SequenceMatcher) {
        let supervisor = Supervisor::new(bus);
        let config = Arc::new(ArcSwap::from_pointee(Config::default()));
        let lifecycle = Lifecycle::new("test", config.clone(), supervisor.clone());
        let matcher = SequenceMatcher::new(&lifecycle, source, supervisor, config);
        (lifecycle, matcher)
    }

    fn counter() -> (Arc<AtomicUsize>, CallbackRef) {
        let hits = Arc::new(AtomicUsize::new(0));
        let c = hits.clone();
        let cb: CallbackRef = CallbackFn::arc("matched", move || {
            c.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });
        (hits, cb)
    }

    async fn settle() {
        sleep(Duration::from_millis(1)).await;
    }

    fn press(source: &LocalEventSource, device: &str, state: &str) {
        source.emit("switch", &json!({ "device": device, "state": state }));
    }

    #[tokio::test(start_paused = true)]
    async fn fires_when_sequence_completes_in_time() {
        let f = fixture();
        let (hits, cb) = counter();
        f.matcher
            .watch(WatchOptions::new("lights", "switch", "state", ["on", "on"], cb).with_label("double-on"));

        press(&f.source, "s1", "on");
        sleep(Duration::from_millis(1000)).await;
        press(&f.source, "s1", "on");
        settle().await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn silence_longer_than_timeout_restarts_the_sequence() {
        let f = fixture();
        let (hits, cb) = counter();
        f.matcher
            .watch(WatchOptions::new("lights", "switch", "state", ["on", "on"], cb));

        press(&f.source, "s1", "on");
        sleep(Duration::from_millis(1600)).await;
        press(&f.source, "s1", "on");
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(500)).await;
        press(&f.source, "s1", "on");
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn own_reset_needs_a_full_new_sequence() {
        let f = fixture();
        let (hits, cb) = counter();
        f.matcher
            .watch(WatchOptions::new("lights", "switch", "state", ["on", "on"], cb));

        for _ in 0..3 {
            press(&f.source, "s1", "on");
        }
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        press(&f.source, "s1", "on");
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn group_reset_clears_every_labeled_watcher() {
        let f = fixture();
        let (hits_a, cb_a) = counter();
        let (hits_b, cb_b) = counter();
        let group = ResetPolicy::Labels(vec!["remote".to_string()]);

        f.matcher.watch(
            WatchOptions::new("lights", "switch", "state", ["up", "up"], cb_a)
                .with_label("remote")
                .with_filter(|p| p["device"] == "a")
                .with_reset(group.clone()),
        );
        f.matcher.watch(
            WatchOptions::new("lights", "switch", "state", ["up", "up"], cb_b)
                .with_label("remote")
                .with_filter(|p| p["device"] == "b")
                .with_reset(group),
        );

        press(&f.source, "b", "up");
        press(&f.source, "a", "up");
        press(&f.source, "a", "up");
        settle().await;
        assert_eq!(hits_a.load(Ordering::SeqCst), 1);

        // one more event each would complete both sequences had they not been cleared
        press(&f.source, "b", "up");
        press(&f.source, "a", "up");
        settle().await;
        assert_eq!(hits_a.load(Ordering::SeqCst), 1);
        assert_eq!(hits_b.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn filtered_events_do_not_touch_history() {
        let f = fixture();
        let (hits, cb) = counter();
        f.matcher.watch(
            WatchOptions::new("lights", "switch", "state", ["on", "off"], cb)
                .with_filter(|p| p["device"] == "kitchen"),
        );

        press(&f.source, "kitchen", "on");
        press(&f.source, "garage", "on");
        press(&f.source, "kitchen", "off");
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unexpected_values_are_kept_in_history() {
        let f = fixture();
        let (hits, cb) = counter();
        f.matcher
            .watch(WatchOptions::new("lights", "switch", "state", ["on", "off"], cb));

        press(&f.source, "s1", "on");
        press(&f.source, "s1", "on");
        press(&f.source, "s1", "off");
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        // only expiry gets the watcher out of a poisoned history
        sleep(Duration::from_millis(1600)).await;
        press(&f.source, "s1", "on");
        press(&f.source, "s1", "off");
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn removed_watcher_never_fires() {
        let f = fixture();
        let (hits, cb) = counter();
        let handle = f
            .matcher
            .watch(WatchOptions::new("lights", "switch", "state", ["on", "on"], cb));

        press(&f.source, "s1", "on");
        handle.remove();
        assert!(!handle.is_active());
        press(&f.source, "s1", "on");
        press(&f.source, "s1", "on");
        settle().await;

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(f.source.handler_count("switch"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn removal_after_expiry_is_quiet() {
        let f = fixture();
        let mut rx = f.bus.subscribe();
        let (hits, cb) = counter();
        let handle = f.matcher.watch(
            WatchOptions::new("lights", "switch", "state", ["on", "on"], cb).with_label("double-on"),
        );

        press(&f.source, "s1", "on");
        sleep(Duration::from_millis(1600)).await;
        handle.remove();
        handle.remove();
        press(&f.source, "s1", "on");
        settle().await;

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(f.source.handler_count("switch"), 0);

        let mut expired = 0;
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::SequenceExpired {
                expired += 1;
                assert_eq!(ev.label.as_deref(), Some("double-on"));
            }
        }
        assert_eq!(expired, 1);
    }

    struct CountingSource {
        inner: LocalEventSource,
        subscribed: Arc<AtomicUsize>,
        unsubscribed: Arc<AtomicUsize>,
    }

    impl EventSource for CountingSource {
        fn on_event(&self, event_type: &str, handler: EventHandler) -> Unsubscribe {
            self.subscribed.fetch_add(1, Ordering::SeqCst);
            let inner = self.inner.on_event(event_type, handler);
            let unsubscribed = self.unsubscribed.clone();
            Unsubscribe::new(move || {
                unsubscribed.fetch_add(1, Ordering::SeqCst);
                inner.call();
            })
        }
    }

    #[tokio::test]
    async fn last_removal_unsubscribes_exactly_once() {
        let subscribed = Arc::new(AtomicUsize::new(0));
        let unsubscribed = Arc::new(AtomicUsize::new(0));
        let (_lifecycle, matcher) = with_source(
            Arc::new(CountingSource {
                inner: LocalEventSource::new(),
                subscribed: subscribed.clone(),
                unsubscribed: unsubscribed.clone(),
            }),
            Bus::new(16),
        );
        let (_, cb) = counter();

        let first = matcher.watch(WatchOptions::new("c", "switch", "state", ["on"], cb.clone()));
        let second = matcher.watch(WatchOptions::new("c", "switch", "state", ["on"], cb));
        assert_eq!(subscribed.load(Ordering::SeqCst), 1);
        assert_eq!(matcher.watcher_count("switch"), 2);

        first.remove();
        assert_eq!(unsubscribed.load(Ordering::SeqCst), 0);

        second.remove();
        second.remove();
        first.remove();
        assert_eq!(unsubscribed.load(Ordering::SeqCst), 1);
        assert_eq!(matcher.watcher_count("switch"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_refreshed_after_config() {
        let f = fixture();
        assert_eq!(f.matcher.timeout(), Duration::from_millis(1500));

        f.lifecycle
            .exec(ConfigOverrides::sequence_timeout(400))
            .await
            .unwrap();
        assert_eq!(f.matcher.timeout(), Duration::from_millis(400));

        let (hits, cb) = counter();
        f.matcher
            .watch(WatchOptions::new("lights", "switch", "state", ["on", "on"], cb));
        press(&f.source, "s1", "on");
        sleep(Duration::from_millis(600)).await;
        press(&f.source, "s1", "on");
        settle().await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
