//! # Central registry of running schedules.
//!
//! Every started [`ScheduleHandle`] is tracked here until it stops, so shutdown can
//! cancel all timers deterministically instead of leaving them to keep the runtime busy.
//!
//! ```text
//! handle.start() ──► insert(id) ──closed──► refused, handle goes to Stopped
//! handle.stop()  ──► remove(id)
//! ShutdownStart  ──► stop_all(): close + drain under lock, stop each outside it
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::lifecycle::{CallbackFn, CallbackRef};

use super::handle::ScheduleHandle;

#[derive(Default)]
struct Running {
    handles: HashMap<u64, ScheduleHandle>,
    closed: bool,
}

#[derive(Default)]
pub(crate) struct ScheduleRegistry {
    running: Mutex<Running>,
    next_id: AtomicU64,
}

impl ScheduleRegistry {
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Tracks `handle`; `false` once [`stop_all`](Self::stop_all) has run.
    pub fn insert(&self, handle: ScheduleHandle) -> bool {
        let mut running = self.running.lock();
        if running.closed {
            return false;
        }
        running.handles.insert(handle.id(), handle);
        true
    }

    pub fn remove(&self, id: u64) {
        self.running.lock().handles.remove(&id);
    }

    /// Number of running schedules.
    pub fn len(&self) -> usize {
        self.running.lock().handles.len()
    }

    /// Stops every running schedule and refuses any later start.
    pub fn stop_all(&self) {
        let handles: Vec<ScheduleHandle> = {
            let mut running = self.running.lock();
            running.closed = true;
            running.handles.drain().map(|(_, h)| h).collect()
        };
        debug!(count = handles.len(), "stopping all schedules");
        for handle in handles {
            handle.stop();
        }
    }
}

/// Shutdown hook stopping every schedule tracked by `registry`.
pub(crate) fn stop_all_callback(registry: &Arc<ScheduleRegistry>) -> CallbackRef {
    let registry = registry.clone();
    CallbackFn::arc("scheduler:stop-all", move || {
        registry.stop_all();
        async { Ok(()) }
    })
}
