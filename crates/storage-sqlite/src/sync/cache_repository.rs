//! Local read cache backed by the `cached_records` table.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;

use thriftly_core::sync::{EntityKind, ReadCacheStore, RemoteRecord};
use thriftly_core::Result;

use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::StorageError;
use crate::schema::cached_records;

use super::model::{enum_to_db, CachedRecordDB};

/// Collection cache the UI reads from. Lives in its own table so a pull
/// replace can never touch queued mutations.
pub struct SqliteReadCache {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl SqliteReadCache {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

fn to_row(kind_db: String, record: RemoteRecord, now: String) -> Result<CachedRecordDB> {
    Ok(CachedRecordDB {
        entity_kind: kind_db,
        record_id: record.id,
        payload: serde_json::to_string(&record.payload)?,
        updated_at: now,
    })
}

#[async_trait]
impl ReadCacheStore for SqliteReadCache {
    async fn replace_collection(
        &self,
        kind: EntityKind,
        records: Vec<RemoteRecord>,
    ) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let kind_db = enum_to_db(&kind)?;
                let now = Utc::now().to_rfc3339();

                // Delete-then-insert inside one write transaction, so
                // readers only ever see the old or the new collection.
                diesel::delete(
                    cached_records::table.filter(cached_records::entity_kind.eq(&kind_db)),
                )
                .execute(conn)
                .map_err(StorageError::from)?;

                for record in records {
                    let row = to_row(kind_db.clone(), record, now.clone())?;
                    diesel::insert_into(cached_records::table)
                        .values(&row)
                        .execute(conn)
                        .map_err(StorageError::from)?;
                }

                Ok(())
            })
            .await
    }

    async fn upsert_record(&self, kind: EntityKind, record: RemoteRecord) -> Result<()> {
        self.writer
            .exec(move |conn| {
                let row = to_row(enum_to_db(&kind)?, record, Utc::now().to_rfc3339())?;
                diesel::insert_into(cached_records::table)
                    .values(&row)
                    .on_conflict((cached_records::entity_kind, cached_records::record_id))
                    .do_update()
                    .set((
                        cached_records::payload.eq(row.payload.clone()),
                        cached_records::updated_at.eq(row.updated_at.clone()),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn delete_record(&self, kind: EntityKind, record_id: &str) -> Result<()> {
        let record_id = record_id.to_string();
        self.writer
            .exec(move |conn| {
                diesel::delete(
                    cached_records::table
                        .filter(cached_records::entity_kind.eq(enum_to_db(&kind)?))
                        .filter(cached_records::record_id.eq(record_id)),
                )
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    fn list_collection(&self, kind: EntityKind) -> Result<Vec<RemoteRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = cached_records::table
            .filter(cached_records::entity_kind.eq(enum_to_db(&kind)?))
            .order(cached_records::record_id.asc())
            .load::<CachedRecordDB>(&mut conn)
            .map_err(StorageError::from)?;

        rows.into_iter().map(CachedRecordDB::into_domain).collect()
    }

    fn get_record(&self, kind: EntityKind, record_id: &str) -> Result<Option<RemoteRecord>> {
        let mut conn = get_connection(&self.pool)?;
        let row = cached_records::table
            .find((enum_to_db(&kind)?, record_id))
            .first::<CachedRecordDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;

        row.map(CachedRecordDB::into_domain).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    use crate::db::{create_pool, init, run_migrations, write_actor::spawn_writer};

    fn setup_cache() -> SqliteReadCache {
        let app_data = tempdir()
            .expect("tempdir")
            .keep()
            .to_string_lossy()
            .to_string();
        let db_path = init(&app_data).expect("init db");
        run_migrations(&db_path).expect("migrate db");
        let pool = create_pool(&db_path).expect("create pool");
        let writer = spawn_writer(pool.as_ref().clone());
        SqliteReadCache::new(pool, writer)
    }

    fn record(id: &str, amount: i64) -> RemoteRecord {
        RemoteRecord {
            id: id.to_string(),
            payload: serde_json::json!({ "amount": amount }),
        }
    }

    #[tokio::test]
    async fn replace_collection_is_authoritative() {
        let cache = setup_cache();
        cache
            .upsert_record(EntityKind::Budget, record("b-local", 10))
            .await
            .expect("upsert");
        cache
            .upsert_record(EntityKind::Expense, record("e-1", 5))
            .await
            .expect("upsert");

        cache
            .replace_collection(EntityKind::Budget, vec![record("b-1", 100), record("b-2", 200)])
            .await
            .expect("replace");

        let budgets = cache.list_collection(EntityKind::Budget).expect("list");
        let ids: Vec<&str> = budgets.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b-1", "b-2"]);

        // Other collections are untouched.
        assert_eq!(cache.list_collection(EntityKind::Expense).expect("list").len(), 1);
    }

    #[tokio::test]
    async fn upsert_overwrites_and_get_reads_back() {
        let cache = setup_cache();
        cache
            .upsert_record(EntityKind::SavingsGoal, record("g-1", 500))
            .await
            .expect("upsert");
        cache
            .upsert_record(EntityKind::SavingsGoal, record("g-1", 750))
            .await
            .expect("upsert");

        let fetched = cache
            .get_record(EntityKind::SavingsGoal, "g-1")
            .expect("get")
            .expect("record");
        assert_eq!(fetched.payload, serde_json::json!({ "amount": 750 }));
    }

    #[tokio::test]
    async fn delete_record_is_scoped_to_the_collection() {
        let cache = setup_cache();
        cache
            .upsert_record(EntityKind::Budget, record("shared-id", 1))
            .await
            .expect("upsert");
        cache
            .upsert_record(EntityKind::Expense, record("shared-id", 2))
            .await
            .expect("upsert");

        cache
            .delete_record(EntityKind::Budget, "shared-id")
            .await
            .expect("delete");

        assert!(cache
            .get_record(EntityKind::Budget, "shared-id")
            .expect("get")
            .is_none());
        assert!(cache
            .get_record(EntityKind::Expense, "shared-id")
            .expect("get")
            .is_some());
    }
}
