//! Database models for the sync engine tables.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use thriftly_core::sync::{PersistedSyncState, RemoteRecord, SyncQueueItem};
use thriftly_core::Result;

/// Serialize an enum to its wire string, stripping the JSON quotes.
pub(crate) fn enum_to_db<T: serde::Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?.trim_matches('"').to_string())
}

pub(crate) fn enum_from_db<T: serde::de::DeserializeOwned>(value: &str) -> Result<T> {
    Ok(serde_json::from_str(&format!("\"{}\"", value))?)
}

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = crate::schema::sync_queue)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncQueueItemDB {
    pub id: String,
    pub entity_kind: String,
    pub entity_id: String,
    pub operation: String,
    pub payload: String,
    pub priority: i32,
    pub created_at: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub last_error_kind: Option<String>,
    pub state: String,
}

impl SyncQueueItemDB {
    pub fn into_domain(self) -> Result<SyncQueueItem> {
        Ok(SyncQueueItem {
            id: self.id,
            entity_kind: enum_from_db(&self.entity_kind)?,
            entity_id: self.entity_id,
            operation: enum_from_db(&self.operation)?,
            payload: serde_json::from_str(&self.payload)?,
            priority: self.priority,
            created_at: self.created_at,
            attempts: self.attempts,
            last_error: self.last_error,
            last_error_kind: self
                .last_error_kind
                .as_deref()
                .map(enum_from_db)
                .transpose()?,
            state: enum_from_db(&self.state)?,
        })
    }
}

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(table_name = crate::schema::sync_state)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncStateDB {
    pub id: i32,
    pub last_sync_attempt: Option<String>,
    pub last_successful_sync: Option<String>,
    pub updated_at: String,
}

impl SyncStateDB {
    pub fn into_domain(self) -> PersistedSyncState {
        PersistedSyncState {
            last_sync_attempt: self.last_sync_attempt,
            last_successful_sync: self.last_successful_sync,
        }
    }
}

#[derive(
    Queryable,
    Identifiable,
    Insertable,
    AsChangeset,
    Selectable,
    Debug,
    Clone,
    Serialize,
    Deserialize,
)]
#[diesel(primary_key(entity_kind, record_id))]
#[diesel(table_name = crate::schema::cached_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct CachedRecordDB {
    pub entity_kind: String,
    pub record_id: String,
    pub payload: String,
    pub updated_at: String,
}

impl CachedRecordDB {
    pub fn into_domain(self) -> Result<RemoteRecord> {
        Ok(RemoteRecord {
            id: self.record_id,
            payload: serde_json::from_str(&self.payload)?,
        })
    }
}
