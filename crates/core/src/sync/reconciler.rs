//! Pull reconciliation: refresh the local read cache from the backend.

use std::sync::Arc;

use log::{debug, warn};

use super::{EntityKind, PullSource, ReadCacheStore};

/// Per-collection result of one reconciliation pass.
#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    pub refreshed: Vec<EntityKind>,
    pub failed: Vec<(EntityKind, String)>,
}

impl ReconcileOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Replaces local read caches with the authoritative remote copy.
///
/// Whole-collection replace, not a per-record merge: the remote is
/// authoritative for anything not currently sitting in the mutation queue,
/// and the queue lives in a separate store, so pending local mutations are
/// never clobbered here.
pub struct PullReconciler {
    source: Arc<dyn PullSource>,
    cache: Arc<dyn ReadCacheStore>,
}

impl PullReconciler {
    pub fn new(source: Arc<dyn PullSource>, cache: Arc<dyn ReadCacheStore>) -> Self {
        Self { source, cache }
    }

    /// Refresh each requested collection. A failed collection does not stop
    /// the others; failures are absorbed into the outcome.
    pub async fn reconcile(&self, kinds: &[EntityKind]) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();

        for kind in kinds {
            let records = match self.source.fetch_collection(*kind).await {
                Ok(records) => records,
                Err(err) => {
                    warn!(
                        "[Sync] Pull failed for collection '{}': {}",
                        kind.collection_name(),
                        err
                    );
                    outcome.failed.push((*kind, err.to_string()));
                    continue;
                }
            };

            let count = records.len();
            match self.cache.replace_collection(*kind, records).await {
                Ok(()) => {
                    debug!(
                        "[Sync] Replaced collection '{}' with {} records",
                        kind.collection_name(),
                        count
                    );
                    outcome.refreshed.push(*kind);
                }
                Err(err) => {
                    warn!(
                        "[Sync] Cache replace failed for collection '{}': {}",
                        kind.collection_name(),
                        err
                    );
                    outcome.failed.push((*kind, err.to_string()));
                }
            }
        }

        outcome
    }
}
