//! Single-row persistence for the sync status timestamps.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;

use thriftly_core::sync::{PersistedSyncState, SyncStateStore};
use thriftly_core::Result;

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::sync_state;

use super::model::SyncStateDB;

pub struct SqliteSyncState {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteSyncState {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl SyncStateStore for SqliteSyncState {
    fn load(&self) -> Result<PersistedSyncState> {
        let mut conn = get_connection(&self.pool)?;
        let row = sync_state::table
            .find(1)
            .first::<SyncStateDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(row.map(SyncStateDB::into_domain).unwrap_or_default())
    }

    async fn record_attempt(&self, at: String) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let now = Utc::now().to_rfc3339();
                diesel::insert_into(sync_state::table)
                    .values(SyncStateDB {
                        id: 1,
                        last_sync_attempt: Some(at.clone()),
                        last_successful_sync: None,
                        updated_at: now.clone(),
                    })
                    .on_conflict(sync_state::id)
                    .do_update()
                    .set((
                        sync_state::last_sync_attempt.eq(Some(at)),
                        sync_state::updated_at.eq(now),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn record_success(&self, at: String) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let now = Utc::now().to_rfc3339();
                diesel::insert_into(sync_state::table)
                    .values(SyncStateDB {
                        id: 1,
                        last_sync_attempt: None,
                        last_successful_sync: Some(at.clone()),
                        updated_at: now.clone(),
                    })
                    .on_conflict(sync_state::id)
                    .do_update()
                    .set((
                        sync_state::last_successful_sync.eq(Some(at)),
                        sync_state::updated_at.eq(now),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    use crate::db::{create_pool, init, run_migrations, write_actor::spawn_writer};

    fn setup_state() -> SqliteSyncState {
        let app_data = tempdir()
            .expect("tempdir")
            .keep()
            .to_string_lossy()
            .to_string();
        let db_path = init(&app_data).expect("init db");
        run_migrations(&db_path).expect("migrate db");
        let pool = create_pool(&db_path).expect("create pool");
        let writer = spawn_writer(pool.as_ref().clone());
        SqliteSyncState::new(pool, writer)
    }

    #[tokio::test]
    async fn load_defaults_to_empty_state() {
        let state = setup_state();
        assert_eq!(state.load().expect("load"), PersistedSyncState::default());
    }

    #[tokio::test]
    async fn attempt_and_success_are_recorded_independently() {
        let state = setup_state();

        state
            .record_attempt("2026-01-01T00:00:00Z".to_string())
            .await
            .expect("record attempt");
        let loaded = state.load().expect("load");
        assert_eq!(loaded.last_sync_attempt.as_deref(), Some("2026-01-01T00:00:00Z"));
        assert_eq!(loaded.last_successful_sync, None);

        state
            .record_success("2026-01-01T00:00:05Z".to_string())
            .await
            .expect("record success");
        let loaded = state.load().expect("load");
        assert_eq!(loaded.last_sync_attempt.as_deref(), Some("2026-01-01T00:00:00Z"));
        assert_eq!(
            loaded.last_successful_sync.as_deref(),
            Some("2026-01-01T00:00:05Z")
        );
    }
}
