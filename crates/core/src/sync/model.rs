//! Sync domain models and the store/adapter contracts.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Result;

/// Maximum apply attempts before an item is quarantined as Failed.
pub const SYNC_MAX_ATTEMPTS: i32 = 5;

/// Maximum number of queue items drained in a single sync run.
pub const SYNC_BATCH_SIZE: i64 = 50;

/// Default priority assigned to mutations when the caller has no ordering needs.
pub const SYNC_DEFAULT_PRIORITY: i32 = 100;

/// Domain collections that participate in offline sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Budget,
    Expense,
    SavingsGoal,
    Document,
}

impl EntityKind {
    /// All collections, in reconciliation order.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Budget,
        EntityKind::Expense,
        EntityKind::SavingsGoal,
        EntityKind::Document,
    ];

    /// Backend collection name for this kind.
    pub fn collection_name(&self) -> &'static str {
        match self {
            EntityKind::Budget => "budgets",
            EntityKind::Expense => "expenses",
            EntityKind::SavingsGoal => "savings_goals",
            EntityKind::Document => "documents",
        }
    }
}

/// Supported mutation operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

/// Lifecycle state of a queued mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemState {
    Pending,
    Failed,
}

/// Failure classification produced at the adapter boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorKind {
    /// Network unreachable, timeout, backend temporarily unavailable.
    /// Retried on the next run.
    Transient,
    /// Backend rejected the payload as invalid. Retrying an unchanged
    /// payload will not help, but it still consumes the attempt ceiling.
    Rejected,
}

/// Classified failure returned by the remote apply adapter or pull source.
#[derive(Debug, Clone, Error)]
pub enum RemoteApplyError {
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("rejected by backend: {0}")]
    Rejected(String),
}

impl RemoteApplyError {
    pub fn kind(&self) -> SyncErrorKind {
        match self {
            Self::Transient(_) => SyncErrorKind::Transient,
            Self::Rejected(_) => SyncErrorKind::Rejected,
        }
    }
}

/// A pending local mutation awaiting remote apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    pub id: String,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub operation: SyncOperation,
    /// Domain record for Create/Update, target identifier for Delete.
    /// Opaque to the engine.
    pub payload: serde_json::Value,
    pub priority: i32,
    pub created_at: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub last_error_kind: Option<SyncErrorKind>,
    pub state: QueueItemState,
}

/// Request to append a mutation to the queue.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub operation: SyncOperation,
    pub payload: serde_json::Value,
    pub priority: i32,
}

impl EnqueueRequest {
    pub fn new(
        entity_kind: EntityKind,
        entity_id: impl Into<String>,
        operation: SyncOperation,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            entity_kind,
            entity_id: entity_id.into(),
            operation,
            payload,
            priority: SYNC_DEFAULT_PRIORITY,
        }
    }

    /// Lower priorities drain first. Callers set this explicitly when a
    /// mutation must precede or follow mutations of dependent records.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// One authoritative record pulled from the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    pub id: String,
    pub payload: serde_json::Value,
}

/// Immutable status snapshot handed to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_syncing: bool,
    pub last_sync_attempt: Option<String>,
    pub last_successful_sync: Option<String>,
    pub pending_count: i64,
    pub failed_count: i64,
    /// 0-100, meaningful only while `is_syncing` is true.
    pub sync_progress: u8,
}

/// The slice of sync status that survives a process restart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSyncState {
    pub last_sync_attempt: Option<String>,
    pub last_successful_sync: Option<String>,
}

/// What caused a sync run to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    Periodic,
    ConnectivityRegained,
    Foreground,
    Manual,
}

/// Durable, ordered store of pending local mutations.
///
/// Writes serialize through the storage layer's single writer so an
/// enqueue from the UI during an in-flight run lands in the next batch.
/// Reads go straight to the pool and never block on writes.
#[async_trait]
pub trait MutationQueueStore: Send + Sync {
    /// Append a mutation, coalescing with any existing item for the same
    /// `(entity_kind, entity_id)`. Durable before this returns.
    async fn enqueue(&self, request: EnqueueRequest) -> Result<String>;

    /// Pending items ordered by `(priority asc, created_at asc)`.
    /// Does not remove them; removal is explicit.
    fn dequeue_batch(&self, max_items: i64) -> Result<Vec<SyncQueueItem>>;

    /// Delete items by id. Missing ids are ignored.
    async fn remove(&self, ids: Vec<String>) -> Result<()>;

    /// Record an apply attempt. With an error set, an item that has reached
    /// [`SYNC_MAX_ATTEMPTS`] transitions to Failed and keeps its count.
    async fn mark_attempt(&self, id: String, error: Option<(SyncErrorKind, String)>)
        -> Result<()>;

    /// Move all Failed items back to Pending with `attempts = 0`.
    /// Returns how many were reset.
    async fn reset_failed(&self) -> Result<usize>;

    fn list_failed(&self) -> Result<Vec<SyncQueueItem>>;
    fn count_pending(&self) -> Result<i64>;
    fn count_failed(&self) -> Result<i64>;
}

/// Executes one mutation against the authoritative backend.
///
/// Implemented by the backend-integration layer; the engine treats transport
/// and serialization as opaque. Each call is bounded by a timeout owned by
/// the adapter and reported back as a classified failure.
#[async_trait]
pub trait RemoteApplyAdapter: Send + Sync {
    async fn apply(&self, item: &SyncQueueItem) -> std::result::Result<(), RemoteApplyError>;
}

/// Fetches the authoritative copy of one collection.
#[async_trait]
pub trait PullSource: Send + Sync {
    async fn fetch_collection(
        &self,
        kind: EntityKind,
    ) -> std::result::Result<Vec<RemoteRecord>, RemoteApplyError>;
}

/// Local read cache the UI renders from.
///
/// Kept in a separate store from the mutation queue, so a pull can never
/// clobber pending local mutations.
#[async_trait]
pub trait ReadCacheStore: Send + Sync {
    /// Whole-collection replace with the authoritative record set.
    async fn replace_collection(&self, kind: EntityKind, records: Vec<RemoteRecord>)
        -> Result<()>;

    /// Optimistic local write, visible to the UI before the remote confirms.
    async fn upsert_record(&self, kind: EntityKind, record: RemoteRecord) -> Result<()>;

    /// Optimistic local delete.
    async fn delete_record(&self, kind: EntityKind, record_id: &str) -> Result<()>;

    fn list_collection(&self, kind: EntityKind) -> Result<Vec<RemoteRecord>>;
    fn get_record(&self, kind: EntityKind, record_id: &str) -> Result<Option<RemoteRecord>>;
}

/// Persistence for the two status timestamps that survive restarts.
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    fn load(&self) -> Result<PersistedSyncState>;
    async fn record_attempt(&self, at: String) -> Result<()>;
    async fn record_success(&self, at: String) -> Result<()>;
}

#[cfg(test)]
mod model_tests {
    use super::*;

    #[test]
    fn entity_kind_serialization_matches_backend_contract() {
        let actual = EntityKind::ALL
            .iter()
            .map(|kind| serde_json::to_string(kind).expect("serialize entity kind"))
            .collect::<Vec<_>>();

        let expected = vec![
            "\"budget\"",
            "\"expense\"",
            "\"savings_goal\"",
            "\"document\"",
        ];

        assert_eq!(actual, expected);
    }

    #[test]
    fn collection_names_are_stable() {
        assert_eq!(EntityKind::Budget.collection_name(), "budgets");
        assert_eq!(EntityKind::SavingsGoal.collection_name(), "savings_goals");
    }

    #[test]
    fn remote_apply_error_classification() {
        assert_eq!(
            RemoteApplyError::Transient("timeout".into()).kind(),
            SyncErrorKind::Transient
        );
        assert_eq!(
            RemoteApplyError::Rejected("constraint violation".into()).kind(),
            SyncErrorKind::Rejected
        );
    }

    #[test]
    fn enqueue_request_defaults_priority() {
        let request = EnqueueRequest::new(
            EntityKind::Expense,
            "exp-1",
            SyncOperation::Create,
            serde_json::json!({ "amount": 12.5 }),
        );
        assert_eq!(request.priority, SYNC_DEFAULT_PRIORITY);
        assert_eq!(request.with_priority(10).priority, 10);
    }
}
