//! Process-wide sync status container and observer fan-out.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use log::debug;

use super::{PersistedSyncState, SyncStatus};

/// Callback invoked with a status snapshot on every state change.
pub type StatusObserver = Arc<dyn Fn(SyncStatus) + Send + Sync>;

struct BroadcasterInner {
    observers: Mutex<Vec<(u64, StatusObserver)>>,
    next_id: AtomicU64,
}

/// Synchronous observer registry.
///
/// Delivery happens in subscription order on whichever task calls
/// `publish`. The observer list is snapshotted before iterating, so an
/// observer unsubscribing mid-callback cannot skip a later observer.
pub struct StatusBroadcaster {
    inner: Arc<BroadcasterInner>,
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBroadcaster {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BroadcasterInner {
                observers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn subscribe(&self, observer: StatusObserver) -> SubscriptionHandle {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut observers) = self.inner.observers.lock() {
            observers.push((id, observer));
        }
        SubscriptionHandle {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    pub fn publish(&self, status: SyncStatus) {
        let snapshot = match self.inner.observers.lock() {
            Ok(observers) => observers.clone(),
            Err(_) => return,
        };
        for (_, observer) in snapshot {
            observer(status.clone());
        }
    }

    #[cfg(test)]
    fn observer_count(&self) -> usize {
        self.inner.observers.lock().map(|o| o.len()).unwrap_or(0)
    }
}

/// Removes its observer when dropped or explicitly unsubscribed.
pub struct SubscriptionHandle {
    id: u64,
    registry: Weak<BroadcasterInner>,
}

impl SubscriptionHandle {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            if let Ok(mut observers) = registry.observers.lock() {
                observers.retain(|(observer_id, _)| *observer_id != self.id);
            }
        }
    }
}

struct StatusInner {
    last_sync_attempt: Option<String>,
    last_successful_sync: Option<String>,
    pending_count: i64,
    failed_count: i64,
    sync_progress: u8,
}

/// Single owned status container, mutated in place for the process lifetime.
///
/// Run start/end go through compare-and-swap on `is_syncing`, which doubles
/// as the process-wide mutual exclusion for sync runs. Everything else is
/// guarded by a plain mutex and exposed only as immutable snapshots, so an
/// observer never sees a half-updated status.
pub struct SyncStatusHandle {
    is_syncing: AtomicBool,
    inner: Mutex<StatusInner>,
    broadcaster: StatusBroadcaster,
}

impl SyncStatusHandle {
    /// Rebuild from persisted state at process start. Counts are seeded
    /// separately once the queue store is open.
    pub fn new(persisted: PersistedSyncState) -> Self {
        Self {
            is_syncing: AtomicBool::new(false),
            inner: Mutex::new(StatusInner {
                last_sync_attempt: persisted.last_sync_attempt,
                last_successful_sync: persisted.last_successful_sync,
                pending_count: 0,
                failed_count: 0,
                sync_progress: 0,
            }),
            broadcaster: StatusBroadcaster::new(),
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.is_syncing.load(Ordering::Acquire)
    }

    pub fn subscribe(&self, observer: StatusObserver) -> SubscriptionHandle {
        self.broadcaster.subscribe(observer)
    }

    pub fn snapshot(&self) -> SyncStatus {
        let is_syncing = self.is_syncing();
        match self.inner.lock() {
            Ok(inner) => SyncStatus {
                is_syncing,
                last_sync_attempt: inner.last_sync_attempt.clone(),
                last_successful_sync: inner.last_successful_sync.clone(),
                pending_count: inner.pending_count,
                failed_count: inner.failed_count,
                sync_progress: inner.sync_progress,
            },
            Err(_) => SyncStatus {
                is_syncing,
                last_sync_attempt: None,
                last_successful_sync: None,
                pending_count: 0,
                failed_count: 0,
                sync_progress: 0,
            },
        }
    }

    /// Try to claim the single run slot. On success records the attempt
    /// timestamp, resets progress and publishes; returns false when a run
    /// is already in flight.
    pub fn begin_run(&self, attempted_at: String) -> bool {
        if self
            .is_syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("[Sync] Run already in flight, trigger dropped");
            return false;
        }
        if let Ok(mut inner) = self.inner.lock() {
            inner.last_sync_attempt = Some(attempted_at);
            inner.sync_progress = 0;
        }
        self.publish();
        true
    }

    pub fn set_progress(&self, progress: u8) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.sync_progress = progress.min(100);
        }
        self.publish();
    }

    pub fn set_counts(&self, pending_count: i64, failed_count: i64) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.pending_count = pending_count;
            inner.failed_count = failed_count;
        }
        self.publish();
    }

    /// Release the run slot. `succeeded_at` is set only when the run
    /// completed without a hard abort.
    pub fn finish_run(&self, succeeded_at: Option<String>) {
        if let Ok(mut inner) = self.inner.lock() {
            if let Some(at) = succeeded_at {
                inner.last_successful_sync = Some(at);
            }
            inner.sync_progress = 0;
        }
        self.is_syncing.store(false, Ordering::Release);
        self.publish();
    }

    fn publish(&self) {
        self.broadcaster.publish(self.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;

    #[test]
    fn begin_run_is_mutually_exclusive() {
        let handle = SyncStatusHandle::new(PersistedSyncState::default());
        assert!(handle.begin_run("2026-01-01T00:00:00Z".to_string()));
        assert!(!handle.begin_run("2026-01-01T00:00:01Z".to_string()));
        handle.finish_run(None);
        assert!(handle.begin_run("2026-01-01T00:00:02Z".to_string()));
    }

    #[test]
    fn finish_run_records_success_timestamp_only_when_given() {
        let handle = SyncStatusHandle::new(PersistedSyncState::default());
        handle.begin_run("2026-01-01T00:00:00Z".to_string());
        handle.finish_run(None);
        assert_eq!(handle.snapshot().last_successful_sync, None);

        handle.begin_run("2026-01-01T00:01:00Z".to_string());
        handle.finish_run(Some("2026-01-01T00:01:05Z".to_string()));
        let status = handle.snapshot();
        assert!(!status.is_syncing);
        assert_eq!(
            status.last_successful_sync.as_deref(),
            Some("2026-01-01T00:01:05Z")
        );
        assert_eq!(
            status.last_sync_attempt.as_deref(),
            Some("2026-01-01T00:01:00Z")
        );
    }

    #[test]
    fn status_rebuilt_from_persisted_timestamps() {
        let handle = SyncStatusHandle::new(PersistedSyncState {
            last_sync_attempt: Some("2026-01-01T00:00:00Z".to_string()),
            last_successful_sync: Some("2026-01-01T00:00:05Z".to_string()),
        });
        let status = handle.snapshot();
        assert_eq!(
            status.last_sync_attempt.as_deref(),
            Some("2026-01-01T00:00:00Z")
        );
        assert_eq!(
            status.last_successful_sync.as_deref(),
            Some("2026-01-01T00:00:05Z")
        );
    }

    #[test]
    fn observers_receive_snapshots_in_subscription_order() {
        let broadcaster = StatusBroadcaster::new();
        let order: Arc<StdMutex<Vec<&'static str>>> = Arc::new(StdMutex::new(Vec::new()));

        let first_order = Arc::clone(&order);
        let _first = broadcaster.subscribe(Arc::new(move |_| {
            first_order.lock().unwrap().push("first");
        }));
        let second_order = Arc::clone(&order);
        let _second = broadcaster.subscribe(Arc::new(move |_| {
            second_order.lock().unwrap().push("second");
        }));

        let handle = SyncStatusHandle::new(PersistedSyncState::default());
        broadcaster.publish(handle.snapshot());
        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn unsubscribe_during_callback_does_not_skip_later_observers() {
        let broadcaster = StatusBroadcaster::new();
        let second_handle: Arc<StdMutex<Option<SubscriptionHandle>>> =
            Arc::new(StdMutex::new(None));
        let second_called = Arc::new(AtomicBool::new(false));

        let handle_slot = Arc::clone(&second_handle);
        let _first = broadcaster.subscribe(Arc::new(move |_| {
            // Drop the second observer's handle while a publish is running.
            handle_slot.lock().unwrap().take();
        }));
        let called = Arc::clone(&second_called);
        let second = broadcaster.subscribe(Arc::new(move |_| {
            called.store(true, Ordering::SeqCst);
        }));
        *second_handle.lock().unwrap() = Some(second);

        let status = SyncStatusHandle::new(PersistedSyncState::default()).snapshot();
        broadcaster.publish(status.clone());
        // Snapshot iteration: the second observer still saw this publish.
        assert!(second_called.load(Ordering::SeqCst));

        second_called.store(false, Ordering::SeqCst);
        broadcaster.publish(status);
        assert!(!second_called.load(Ordering::SeqCst));
        assert_eq!(broadcaster.observer_count(), 1);
    }

    #[test]
    fn dropped_handle_unsubscribes() {
        let broadcaster = StatusBroadcaster::new();
        let handle = broadcaster.subscribe(Arc::new(|_| {}));
        assert_eq!(broadcaster.observer_count(), 1);
        handle.unsubscribe();
        assert_eq!(broadcaster.observer_count(), 0);
    }
}
