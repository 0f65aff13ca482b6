//! The sync run driver: drain the queue, classify failures, reconcile.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use log::{debug, warn};

use crate::Result;

use super::{
    ConnectivityMonitor, EntityKind, MutationQueueStore, PullReconciler, RemoteApplyAdapter,
    SyncStateStore, SyncStatusHandle, SYNC_BATCH_SIZE,
};

/// How a sync run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncRunStatus {
    /// Batch drained to the end (individual items may still have failed).
    Completed,
    /// Connectivity dropped mid-batch; remaining items stayed Pending.
    AbortedOffline,
    /// Device was offline when the run was triggered.
    SkippedOffline,
    /// Another run held the slot; this trigger was dropped, not queued.
    SkippedAlreadyRunning,
}

/// Aggregate outcome of one run. Individual item failures are recorded on
/// the items themselves and never propagated to the caller.
#[derive(Debug, Clone)]
pub struct SyncRunOutcome {
    pub status: SyncRunStatus,
    pub applied_count: usize,
    pub failed_count: usize,
    pub duration_ms: i64,
}

impl SyncRunOutcome {
    fn skipped(status: SyncRunStatus) -> Self {
        Self {
            status,
            applied_count: 0,
            failed_count: 0,
            duration_ms: 0,
        }
    }
}

/// Exponential backoff in seconds with cap, used by the scheduler to pace
/// retries after failed runs.
pub fn backoff_seconds(consecutive_failures: i32) -> i64 {
    const MAX_EXPONENT: i32 = 8;
    const BASE_DELAY_SECONDS: i64 = 5;

    let capped = i64::from(consecutive_failures.clamp(0, MAX_EXPONENT));
    2_i64.pow(capped as u32) * BASE_DELAY_SECONDS
}

struct DrainResult {
    applied: Vec<(String, EntityKind)>,
    failed_count: usize,
    aborted: bool,
}

/// Drives one sync run end to end.
///
/// At most one run executes process-wide; the slot is claimed with a
/// compare-and-swap on the shared status handle, so concurrent triggers
/// from the scheduler, connectivity events and manual actions collapse to
/// a single drain loop.
pub struct SyncOrchestrator {
    queue: Arc<dyn MutationQueueStore>,
    adapter: Arc<dyn RemoteApplyAdapter>,
    reconciler: Arc<PullReconciler>,
    connectivity: Arc<ConnectivityMonitor>,
    status: Arc<SyncStatusHandle>,
    state_store: Arc<dyn SyncStateStore>,
    batch_size: i64,
}

impl SyncOrchestrator {
    pub fn new(
        queue: Arc<dyn MutationQueueStore>,
        adapter: Arc<dyn RemoteApplyAdapter>,
        reconciler: Arc<PullReconciler>,
        connectivity: Arc<ConnectivityMonitor>,
        status: Arc<SyncStatusHandle>,
        state_store: Arc<dyn SyncStateStore>,
    ) -> Self {
        Self {
            queue,
            adapter,
            reconciler,
            connectivity,
            status,
            state_store,
            batch_size: SYNC_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn status_handle(&self) -> &Arc<SyncStatusHandle> {
        &self.status
    }

    /// Run one sync cycle. `forced` runs still require actual connectivity;
    /// forcing only guarantees the reconciler fires even when nothing was
    /// pushed.
    pub async fn run(&self, forced: bool) -> Result<SyncRunOutcome> {
        let started_at = Instant::now();

        if !self.connectivity.is_online() {
            debug!("[Sync] Skipping run: device is offline (forced={})", forced);
            return Ok(SyncRunOutcome::skipped(SyncRunStatus::SkippedOffline));
        }

        let attempted_at = Utc::now().to_rfc3339();
        if !self.status.begin_run(attempted_at.clone()) {
            return Ok(SyncRunOutcome::skipped(SyncRunStatus::SkippedAlreadyRunning));
        }
        if let Err(err) = self.state_store.record_attempt(attempted_at).await {
            self.status.finish_run(None);
            return Err(err);
        }

        let drained = match self.drain_batch().await {
            Ok(drained) => drained,
            Err(err) => {
                // A storage failure ends the run; release the slot so the
                // next trigger is not locked out forever.
                self.status.finish_run(None);
                return Err(err);
            }
        };

        let applied_ids: Vec<String> = drained.applied.iter().map(|(id, _)| id.clone()).collect();
        let applied_count = applied_ids.len();
        if let Err(err) = self.finalize(&drained, applied_ids, forced).await {
            self.status.finish_run(None);
            return Err(err);
        }

        let succeeded_at = if drained.aborted {
            None
        } else {
            Some(Utc::now().to_rfc3339())
        };
        if let Some(at) = succeeded_at.clone() {
            // Applied items are already removed at this point; losing the
            // timestamp write must still release the run slot.
            if let Err(err) = self.state_store.record_success(at).await {
                self.status.finish_run(None);
                return Err(err);
            }
        }
        self.status.finish_run(succeeded_at);

        let outcome = SyncRunOutcome {
            status: if drained.aborted {
                SyncRunStatus::AbortedOffline
            } else {
                SyncRunStatus::Completed
            },
            applied_count,
            failed_count: drained.failed_count,
            duration_ms: started_at.elapsed().as_millis() as i64,
        };
        debug!(
            "[Sync] Run complete status={:?} applied={} failed={} duration_ms={}",
            outcome.status, outcome.applied_count, outcome.failed_count, outcome.duration_ms
        );
        Ok(outcome)
    }

    /// Apply each pending item in `(priority, created_at)` order.
    ///
    /// Individual failures never abort the run; only losing connectivity
    /// does, and then items not yet attempted simply stay Pending.
    async fn drain_batch(&self) -> Result<DrainResult> {
        let batch = self.queue.dequeue_batch(self.batch_size)?;
        let total = batch.len();
        let mut result = DrainResult {
            applied: Vec::new(),
            failed_count: 0,
            aborted: false,
        };

        for (index, item) in batch.iter().enumerate() {
            if !self.connectivity.is_online() {
                warn!(
                    "[Sync] Connectivity lost after {} of {} items, aborting batch",
                    index, total
                );
                result.aborted = true;
                break;
            }

            match self.adapter.apply(item).await {
                Ok(()) => {
                    result.applied.push((item.id.clone(), item.entity_kind));
                }
                Err(err) => {
                    warn!(
                        "[Sync] Apply failed for {} '{}' ({:?}): {}",
                        item.entity_kind.collection_name(),
                        item.entity_id,
                        err.kind(),
                        err
                    );
                    result.failed_count += 1;
                    self.queue
                        .mark_attempt(item.id.clone(), Some((err.kind(), err.to_string())))
                        .await?;
                }
            }

            let progress = (((index + 1) * 100) / total.max(1)) as u8;
            self.status.set_progress(progress);
        }

        Ok(result)
    }

    /// Steps 5-7 of a run: remove successes, refresh counts, reconcile.
    async fn finalize(
        &self,
        drained: &DrainResult,
        applied_ids: Vec<String>,
        forced: bool,
    ) -> Result<()> {
        if !applied_ids.is_empty() {
            self.queue.remove(applied_ids).await?;
        }
        self.status
            .set_counts(self.queue.count_pending()?, self.queue.count_failed()?);

        // Reconcile only while we are still reachable; after a mid-batch
        // abort every per-collection fetch would fail anyway.
        if drained.aborted {
            return Ok(());
        }
        if drained.applied.is_empty() && !forced {
            return Ok(());
        }

        let kinds: Vec<EntityKind> = if forced {
            EntityKind::ALL.to_vec()
        } else {
            let mut kinds = Vec::new();
            for (_, kind) in &drained.applied {
                if !kinds.contains(kind) {
                    kinds.push(*kind);
                }
            }
            kinds
        };

        let outcome = self.reconciler.reconcile(&kinds).await;
        if !outcome.is_complete() {
            warn!(
                "[Sync] Reconciliation incomplete: {} of {} collections failed",
                outcome.failed.len(),
                kinds.len()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_exponential_and_capped() {
        assert_eq!(backoff_seconds(0), 5);
        assert_eq!(backoff_seconds(1), 10);
        assert_eq!(backoff_seconds(2), 20);
        assert_eq!(backoff_seconds(9), backoff_seconds(8));
    }
}
