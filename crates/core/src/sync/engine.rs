//! Facade wiring the sync engine together for the application shell.

use std::sync::Arc;

use log::debug;

use crate::Result;

use super::{
    BackgroundScheduler, ConnectivityMonitor, EnqueueRequest, EntityKind, MutationQueueStore,
    PullReconciler, PullSource, ReadCacheStore, RemoteApplyAdapter, RemoteRecord, StatusObserver,
    SubscriptionHandle, SyncOperation, SyncOrchestrator, SyncRunOutcome, SyncStateStore,
    SyncStatus, SyncStatusHandle, SyncTrigger, SYNC_BATCH_SIZE, SYNC_PERIODIC_INTERVAL_SECS,
};

/// Tunables for the engine; defaults match production behavior.
#[derive(Debug, Clone)]
pub struct SyncEngineConfig {
    pub batch_size: i64,
    pub periodic_interval_secs: u64,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            batch_size: SYNC_BATCH_SIZE,
            periodic_interval_secs: SYNC_PERIODIC_INTERVAL_SECS,
        }
    }
}

/// The engine's boundary with the rest of the app: optimistic local writes,
/// status subscription, manual sync controls.
pub struct SyncEngine {
    queue: Arc<dyn MutationQueueStore>,
    cache: Arc<dyn ReadCacheStore>,
    status: Arc<SyncStatusHandle>,
    orchestrator: Arc<SyncOrchestrator>,
    scheduler: Arc<BackgroundScheduler>,
    connectivity: Arc<ConnectivityMonitor>,
}

impl SyncEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn MutationQueueStore>,
        cache: Arc<dyn ReadCacheStore>,
        state_store: Arc<dyn SyncStateStore>,
        adapter: Arc<dyn RemoteApplyAdapter>,
        pull_source: Arc<dyn PullSource>,
        connectivity: Arc<ConnectivityMonitor>,
        config: SyncEngineConfig,
    ) -> Result<Self> {
        let status = Arc::new(SyncStatusHandle::new(state_store.load()?));
        status.set_counts(queue.count_pending()?, queue.count_failed()?);

        let reconciler = Arc::new(PullReconciler::new(pull_source, Arc::clone(&cache)));
        let orchestrator = Arc::new(
            SyncOrchestrator::new(
                Arc::clone(&queue),
                adapter,
                reconciler,
                Arc::clone(&connectivity),
                Arc::clone(&status),
                state_store,
            )
            .with_batch_size(config.batch_size),
        );
        let scheduler = Arc::new(BackgroundScheduler::new(
            Arc::clone(&orchestrator),
            Arc::clone(&connectivity),
            config.periodic_interval_secs,
        ));

        Ok(Self {
            queue,
            cache,
            status,
            orchestrator,
            scheduler,
            connectivity,
        })
    }

    /// Record a local mutation: enqueue it durably, then update the read
    /// cache so the UI sees the change immediately.
    ///
    /// Queue first; a crash in between leaves a pending mutation whose next
    /// successful run brings the cache back in line.
    pub async fn apply_local_mutation(&self, request: EnqueueRequest) -> Result<String> {
        let entity_kind = request.entity_kind;
        let entity_id = request.entity_id.clone();
        let operation = request.operation;
        let payload = request.payload.clone();

        let item_id = self.queue.enqueue(request).await?;

        match operation {
            SyncOperation::Delete => {
                self.cache.delete_record(entity_kind, &entity_id).await?;
            }
            SyncOperation::Create | SyncOperation::Update => {
                self.cache
                    .upsert_record(
                        entity_kind,
                        RemoteRecord {
                            id: entity_id.clone(),
                            payload,
                        },
                    )
                    .await?;
            }
        }

        self.status
            .set_counts(self.queue.count_pending()?, self.queue.count_failed()?);
        debug!(
            "[Sync] Queued {:?} for {} '{}'",
            operation,
            entity_kind.collection_name(),
            entity_id
        );
        Ok(item_id)
    }

    /// Current status snapshot.
    pub fn status(&self) -> SyncStatus {
        self.status.snapshot()
    }

    pub fn subscribe(&self, observer: StatusObserver) -> SubscriptionHandle {
        self.status.subscribe(observer)
    }

    /// Manual "Sync Now". Forced runs still require actual connectivity.
    pub async fn trigger_sync(&self, forced: bool) -> Result<SyncRunOutcome> {
        debug!(
            "[Sync] Trigger fired: {:?} (forced={})",
            SyncTrigger::Manual,
            forced
        );
        self.orchestrator.run(forced).await
    }

    /// Manual "Retry Failed": re-admit quarantined items for the next run.
    pub async fn retry_failed(&self) -> Result<usize> {
        let reset = self.queue.reset_failed().await?;
        self.status
            .set_counts(self.queue.count_pending()?, self.queue.count_failed()?);
        Ok(reset)
    }

    pub fn connectivity(&self) -> &Arc<ConnectivityMonitor> {
        &self.connectivity
    }

    pub fn notify_foregrounded(&self) {
        self.scheduler.notify_foregrounded();
    }

    pub async fn start_background(&self) {
        Arc::clone(&self.scheduler).ensure_started().await;
    }

    pub async fn stop_background(&self) {
        self.scheduler.ensure_stopped().await;
    }

    /// Read path for the UI: cached records for one collection.
    pub fn list_cached(&self, kind: EntityKind) -> Result<Vec<RemoteRecord>> {
        self.cache.list_collection(kind)
    }

    pub fn get_cached(&self, kind: EntityKind, record_id: &str) -> Result<Option<RemoteRecord>> {
        self.cache.get_record(kind, record_id)
    }
}
