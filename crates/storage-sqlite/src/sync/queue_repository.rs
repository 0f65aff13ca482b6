//! Durable mutation queue backed by the `sync_queue` table.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::dsl::count_star;
use diesel::prelude::*;
use uuid::Uuid;

use thriftly_core::sync::{
    EnqueueRequest, MutationQueueStore, QueueItemState, SyncErrorKind, SyncOperation,
    SyncQueueItem, SYNC_MAX_ATTEMPTS,
};
use thriftly_core::Result;

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::sync_queue;

use super::model::{enum_from_db, enum_to_db, SyncQueueItemDB};

/// One queue row per `(entity_kind, entity_id)`; repeat mutations against
/// the same record coalesce in place instead of piling up.
pub struct SqliteMutationQueue {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteMutationQueue {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

/// Decide the surviving operation and payload when a new mutation lands on
/// an existing queue item.
///
/// A queued Delete is final: later Creates or Updates for the same record
/// raced with the delete locally and lose. An incoming Delete supersedes
/// whatever was queued. Create absorbs Updates without losing its
/// Create-ness, since the backend has never seen the record.
fn coalesce(
    existing_op: SyncOperation,
    existing_payload: String,
    request: &EnqueueRequest,
) -> Result<(SyncOperation, String)> {
    if existing_op == SyncOperation::Delete {
        return Ok((SyncOperation::Delete, existing_payload));
    }
    if request.operation == SyncOperation::Delete {
        return Ok((SyncOperation::Delete, serde_json::to_string(&request.payload)?));
    }
    if existing_op == SyncOperation::Create {
        return Ok((SyncOperation::Create, serde_json::to_string(&request.payload)?));
    }
    Ok((request.operation, serde_json::to_string(&request.payload)?))
}

#[async_trait]
impl MutationQueueStore for SqliteMutationQueue {
    async fn enqueue(&self, request: EnqueueRequest) -> Result<String> {
        self.writer
            .exec(move |conn| {
                let entity_kind_db = enum_to_db(&request.entity_kind)?;
                let existing = sync_queue::table
                    .filter(sync_queue::entity_kind.eq(&entity_kind_db))
                    .filter(sync_queue::entity_id.eq(&request.entity_id))
                    .first::<SyncQueueItemDB>(conn)
                    .optional()
                    .map_err(StorageError::from)?;

                if let Some(row) = existing {
                    let existing_op: SyncOperation = enum_from_db(&row.operation)?;
                    let (operation, payload) =
                        coalesce(existing_op, row.payload.clone(), &request)?;

                    diesel::update(sync_queue::table.find(&row.id))
                        .set((
                            sync_queue::operation.eq(enum_to_db(&operation)?),
                            sync_queue::payload.eq(payload),
                            sync_queue::priority.eq(request.priority),
                        ))
                        .execute(conn)
                        .map_err(StorageError::from)?;

                    // A fresh mutation re-admits a quarantined item with a
                    // clean attempt history.
                    if row.state == enum_to_db(&QueueItemState::Failed)? {
                        diesel::update(sync_queue::table.find(&row.id))
                            .set((
                                sync_queue::state.eq(enum_to_db(&QueueItemState::Pending)?),
                                sync_queue::attempts.eq(0),
                                sync_queue::last_error.eq::<Option<String>>(None),
                                sync_queue::last_error_kind.eq::<Option<String>>(None),
                            ))
                            .execute(conn)
                            .map_err(StorageError::from)?;
                    }

                    return Ok(row.id);
                }

                let row = SyncQueueItemDB {
                    id: Uuid::new_v4().to_string(),
                    entity_kind: entity_kind_db,
                    entity_id: request.entity_id.clone(),
                    operation: enum_to_db(&request.operation)?,
                    payload: serde_json::to_string(&request.payload)?,
                    priority: request.priority,
                    created_at: Utc::now().to_rfc3339(),
                    attempts: 0,
                    last_error: None,
                    last_error_kind: None,
                    state: enum_to_db(&QueueItemState::Pending)?,
                };
                let id = row.id.clone();

                diesel::insert_into(sync_queue::table)
                    .values(&row)
                    .execute(conn)
                    .map_err(StorageError::from)?;

                Ok(id)
            })
            .await
    }

    fn dequeue_batch(&self, max_items: i64) -> Result<Vec<SyncQueueItem>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = sync_queue::table
            .filter(sync_queue::state.eq(enum_to_db(&QueueItemState::Pending)?))
            .order((sync_queue::priority.asc(), sync_queue::created_at.asc()))
            .limit(max_items)
            .load::<SyncQueueItemDB>(&mut conn)
            .map_err(StorageError::from)?;

        rows.into_iter().map(SyncQueueItemDB::into_domain).collect()
    }

    async fn remove(&self, ids: Vec<String>) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }

        self.writer
            .exec(move |conn| {
                diesel::delete(sync_queue::table.filter(sync_queue::id.eq_any(ids)))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn mark_attempt(
        &self,
        id: String,
        error: Option<(SyncErrorKind, String)>,
    ) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let row = sync_queue::table
                    .find(&id)
                    .first::<SyncQueueItemDB>(conn)
                    .optional()
                    .map_err(StorageError::from)?;
                let Some(row) = row else {
                    // Removed by a concurrent operation; nothing to record.
                    return Ok(());
                };

                let attempts = row.attempts + 1;
                match error {
                    Some((kind, message)) => {
                        let state = if attempts >= SYNC_MAX_ATTEMPTS {
                            QueueItemState::Failed
                        } else {
                            QueueItemState::Pending
                        };
                        diesel::update(sync_queue::table.find(&row.id))
                            .set((
                                sync_queue::attempts.eq(attempts),
                                sync_queue::last_error.eq(Some(message)),
                                sync_queue::last_error_kind.eq(Some(enum_to_db(&kind)?)),
                                sync_queue::state.eq(enum_to_db(&state)?),
                            ))
                            .execute(conn)
                            .map_err(StorageError::from)?;
                    }
                    None => {
                        diesel::update(sync_queue::table.find(&row.id))
                            .set((
                                sync_queue::attempts.eq(attempts),
                                sync_queue::last_error.eq::<Option<String>>(None),
                                sync_queue::last_error_kind.eq::<Option<String>>(None),
                            ))
                            .execute(conn)
                            .map_err(StorageError::from)?;
                    }
                }

                Ok(())
            })
            .await
    }

    async fn reset_failed(&self) -> Result<usize> {
        self.writer
            .exec(move |conn| {
                let reset = diesel::update(
                    sync_queue::table
                        .filter(sync_queue::state.eq(enum_to_db(&QueueItemState::Failed)?)),
                )
                .set((
                    sync_queue::state.eq(enum_to_db(&QueueItemState::Pending)?),
                    sync_queue::attempts.eq(0),
                    sync_queue::last_error.eq::<Option<String>>(None),
                    sync_queue::last_error_kind.eq::<Option<String>>(None),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(reset)
            })
            .await
    }

    fn list_failed(&self) -> Result<Vec<SyncQueueItem>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = sync_queue::table
            .filter(sync_queue::state.eq(enum_to_db(&QueueItemState::Failed)?))
            .order(sync_queue::created_at.asc())
            .load::<SyncQueueItemDB>(&mut conn)
            .map_err(StorageError::from)?;

        rows.into_iter().map(SyncQueueItemDB::into_domain).collect()
    }

    fn count_pending(&self) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        let count = sync_queue::table
            .filter(sync_queue::state.eq(enum_to_db(&QueueItemState::Pending)?))
            .select(count_star())
            .first(&mut conn)
            .map_err(StorageError::from)?;
        Ok(count)
    }

    fn count_failed(&self) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        let count = sync_queue::table
            .filter(sync_queue::state.eq(enum_to_db(&QueueItemState::Failed)?))
            .select(count_star())
            .first(&mut conn)
            .map_err(StorageError::from)?;
        Ok(count)
    }
}
