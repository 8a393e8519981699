//! The shared telemetry store.
//!
//! One [`TelemetryStore`] exists per process. Consumers read it through
//! [`TelemetryView`] handles, which cannot mutate. The active data source
//! writes through a [`TelemetryWriter`], a lease that the store revokes when
//! a new writer is issued, so a replaced source can never touch the state
//! again even if one of its tasks outlives its cancellation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use super::normalize::apply_snapshot;
use super::snapshot::{TelemetrySnapshot, DEFAULT_TRAFFIC_WINDOW};

#[derive(Debug)]
struct Shared {
    tx: watch::Sender<TelemetrySnapshot>,
    /// Id of the only lease allowed to write. Held for the whole mutation.
    lease: Mutex<u64>,
    revision: AtomicU64,
    window: usize,
}

/// Owner of the dashboard state.
///
/// Cloning the store clones the handle, not the state.
#[derive(Debug, Clone)]
pub struct TelemetryStore {
    shared: Arc<Shared>,
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryStore {
    /// Create a store with the default traffic window.
    pub fn new() -> Self {
        Self::with_window(DEFAULT_TRAFFIC_WINDOW)
    }

    /// Create a store whose traffic series keeps `window` samples.
    pub fn with_window(window: usize) -> Self {
        let snapshot = TelemetrySnapshot::with_window(window);
        let window = snapshot.network_traffic.window();
        let (tx, _rx) = watch::channel(snapshot);
        Self {
            shared: Arc::new(Shared {
                tx,
                lease: Mutex::new(0),
                revision: AtomicU64::new(0),
                window,
            }),
        }
    }

    /// The configured traffic window.
    pub fn window(&self) -> usize {
        self.shared.window
    }

    /// Get a read-only view of the state.
    pub fn view(&self) -> TelemetryView {
        TelemetryView {
            rx: self.shared.tx.subscribe(),
            shared: self.shared.clone(),
        }
    }

    /// Issue a new writer lease, revoking every previously issued writer.
    pub fn writer(&self) -> TelemetryWriter {
        let mut lease = self.shared.lease.lock();
        *lease += 1;
        debug!(lease = *lease, "issued telemetry writer");
        TelemetryWriter {
            shared: self.shared.clone(),
            lease: *lease,
        }
    }

    /// Revoke all writers without issuing a new one.
    pub fn revoke_writers(&self) {
        let mut lease = self.shared.lease.lock();
        *lease += 1;
    }

    /// Number of successful writes so far.
    pub fn revision(&self) -> u64 {
        self.shared.revision.load(Ordering::Acquire)
    }
}

/// Write access to the store, valid until the store issues another lease.
///
/// Clones share the same lease, so every task of one data source can hold
/// its own copy.
#[derive(Debug, Clone)]
pub struct TelemetryWriter {
    shared: Arc<Shared>,
    lease: u64,
}

impl TelemetryWriter {
    /// Mutate the state in place and notify all views.
    ///
    /// Returns `false` without running `f` if this lease has been revoked.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut TelemetrySnapshot),
    {
        let current = self.shared.lease.lock();
        if *current != self.lease {
            debug!(lease = self.lease, current = *current, "dropping write from revoked writer");
            return false;
        }
        let revision = &self.shared.revision;
        self.shared.tx.send_modify(|state| {
            f(state);
            revision.fetch_add(1, Ordering::AcqRel);
        });
        true
    }

    /// Normalize `payload` into the state.
    pub fn apply(&self, payload: &Value) -> bool {
        self.update(|state| apply_snapshot(state, payload))
    }

    /// Whether this lease is still the active one.
    pub fn is_current(&self) -> bool {
        *self.shared.lease.lock() == self.lease
    }
}

/// Read-only, change-notifying view of the state.
#[derive(Debug, Clone)]
pub struct TelemetryView {
    rx: watch::Receiver<TelemetrySnapshot>,
    shared: Arc<Shared>,
}

impl TelemetryView {
    /// Borrow the current state.
    ///
    /// Writers wait while the borrow is held, so keep it short.
    pub fn borrow(&self) -> watch::Ref<'_, TelemetrySnapshot> {
        self.rx.borrow()
    }

    /// Clone the current state.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.rx.borrow().clone()
    }

    /// Clone the current state and mark it as seen.
    pub fn snapshot_and_mark(&mut self) -> TelemetrySnapshot {
        self.rx.borrow_and_update().clone()
    }

    /// Whether the state changed since it was last marked as seen.
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// Wait for the next change.
    ///
    /// Returns `false` if the store has been dropped.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Number of successful writes so far.
    pub fn revision(&self) -> u64 {
        self.shared.revision.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_view_sees_writes() {
        let store = TelemetryStore::new();
        let view = store.view();
        let writer = store.writer();

        assert!(writer.update(|s| s.resource_gauges.cpu = 42.0));
        assert_eq!(view.borrow().resource_gauges.cpu, 42.0);
        assert_eq!(view.revision(), 1);
    }

    #[test]
    fn test_new_writer_revokes_previous() {
        let store = TelemetryStore::new();
        let view = store.view();
        let old = store.writer();
        let new = store.writer();

        assert!(!old.is_current());
        assert!(new.is_current());
        assert!(!old.update(|s| s.resource_gauges.cpu = 99.0));
        assert_eq!(view.borrow().resource_gauges.cpu, 0.0);
        assert_eq!(store.revision(), 0);

        assert!(new.apply(&json!({"resources": {"cpu": 12}})));
        assert_eq!(view.borrow().resource_gauges.cpu, 12.0);
    }

    #[test]
    fn test_revoke_writers() {
        let store = TelemetryStore::new();
        let writer = store.writer();
        let clone = writer.clone();
        store.revoke_writers();
        assert!(!writer.update(|_| {}));
        assert!(!clone.update(|_| {}));
    }

    #[test]
    fn test_store_window_is_applied() {
        let store = TelemetryStore::with_window(5);
        assert_eq!(store.window(), 5);
        assert_eq!(store.view().borrow().network_traffic.window(), 5);
    }

    #[tokio::test]
    async fn test_view_changed_notifies() {
        let store = TelemetryStore::new();
        let mut view = store.view();
        let writer = store.writer();

        assert!(!view.has_changed());
        let handle = tokio::spawn(async move {
            writer.update(|s| s.resource_gauges.mem = 7.0);
        });

        assert!(view.changed().await);
        assert_eq!(view.snapshot_and_mark().resource_gauges.mem, 7.0);
        assert!(!view.has_changed());
        handle.await.unwrap();
    }
}
