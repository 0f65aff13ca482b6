//! Background trigger sources for sync runs.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{debug, warn};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use super::{backoff_seconds, ConnectivityMonitor, SyncOrchestrator, SyncRunStatus, SyncTrigger};

/// Periodic sync cadence in seconds.
pub const SYNC_PERIODIC_INTERVAL_SECS: u64 = 15 * 60;

/// Maximum jitter (seconds) added to periodic intervals.
pub const SYNC_INTERVAL_JITTER_SECS: u64 = 30;

/// Fires sync runs on a timer, on offline-to-online transitions and on
/// app-foreground notifications.
///
/// The scheduler holds no dedup lock of its own: a trigger landing while a
/// run is in flight is dropped by the orchestrator's own mutual-exclusion
/// guard.
pub struct BackgroundScheduler {
    orchestrator: Arc<SyncOrchestrator>,
    connectivity: Arc<ConnectivityMonitor>,
    foreground: Notify,
    task: Mutex<Option<JoinHandle<()>>>,
    interval_secs: u64,
}

impl BackgroundScheduler {
    pub fn new(
        orchestrator: Arc<SyncOrchestrator>,
        connectivity: Arc<ConnectivityMonitor>,
        interval_secs: u64,
    ) -> Self {
        Self {
            orchestrator,
            connectivity,
            foreground: Notify::new(),
            task: Mutex::new(None),
            interval_secs,
        }
    }

    /// Called by the platform layer when the app returns to the foreground.
    pub fn notify_foregrounded(&self) {
        self.foreground.notify_one();
    }

    /// Spawn the trigger loop if it is not already running. Idempotent.
    pub async fn ensure_started(self: Arc<Self>) {
        let mut guard = self.task.lock().await;
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                return;
            }
            guard.take();
        }

        let scheduler = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            scheduler.trigger_loop().await;
        });
        *guard = Some(handle);
    }

    pub async fn ensure_stopped(&self) {
        let mut guard = self.task.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
        }
    }

    async fn trigger_loop(&self) {
        let mut online_rx = self.connectivity.subscribe();
        let mut was_online = *online_rx.borrow();
        let mut consecutive_failures = 0_i32;

        loop {
            let delay = next_delay(self.interval_secs, consecutive_failures);

            let trigger = tokio::select! {
                _ = tokio::time::sleep(delay) => SyncTrigger::Periodic,
                changed = online_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *online_rx.borrow();
                    let regained = online && !was_online;
                    was_online = online;
                    if !regained {
                        continue;
                    }
                    SyncTrigger::ConnectivityRegained
                }
                _ = self.foreground.notified() => SyncTrigger::Foreground,
            };

            debug!("[Sync] Trigger fired: {:?}", trigger);
            match self.orchestrator.run(false).await {
                Ok(outcome) => {
                    consecutive_failures = match outcome.status {
                        SyncRunStatus::Completed if outcome.failed_count == 0 => 0,
                        // Item failures and mid-batch aborts are worth a
                        // quicker, backoff-paced retry.
                        SyncRunStatus::Completed | SyncRunStatus::AbortedOffline => {
                            consecutive_failures.saturating_add(1)
                        }
                        SyncRunStatus::SkippedOffline | SyncRunStatus::SkippedAlreadyRunning => {
                            consecutive_failures
                        }
                    };
                }
                Err(err) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);
                    warn!("[Sync] Scheduled run failed: {}", err);
                }
            }
        }
    }
}

/// After a clean cycle the next periodic trigger waits the full interval
/// plus jitter; after failed cycles it waits a capped exponential backoff
/// instead, so transient outages are retried well before the next period.
fn next_delay(interval_secs: u64, consecutive_failures: i32) -> Duration {
    if consecutive_failures > 0 {
        return Duration::from_secs(backoff_seconds(consecutive_failures).unsigned_abs());
    }

    let jitter_bound = SYNC_INTERVAL_JITTER_SECS.max(1);
    let jitter_secs = Utc::now().timestamp_millis().unsigned_abs() % jitter_bound;
    Duration::from_secs(interval_secs + jitter_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_cycles_wait_the_full_interval_with_jitter() {
        let delay = next_delay(SYNC_PERIODIC_INTERVAL_SECS, 0).as_secs();
        assert!(delay >= SYNC_PERIODIC_INTERVAL_SECS);
        assert!(delay < SYNC_PERIODIC_INTERVAL_SECS + SYNC_INTERVAL_JITTER_SECS);
    }

    #[test]
    fn failed_cycles_retry_on_a_capped_backoff() {
        assert_eq!(next_delay(SYNC_PERIODIC_INTERVAL_SECS, 1).as_secs(), 10);
        assert_eq!(next_delay(SYNC_PERIODIC_INTERVAL_SECS, 2).as_secs(), 20);
        assert_eq!(next_delay(SYNC_PERIODIC_INTERVAL_SECS, 3).as_secs(), 40);
        assert_eq!(
            next_delay(SYNC_PERIODIC_INTERVAL_SECS, 9),
            next_delay(SYNC_PERIODIC_INTERVAL_SECS, 8)
        );
    }
}
