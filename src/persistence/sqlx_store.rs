//! SQL record store over `sqlx::AnyPool`.
//!
//! Every collection lives in the one `records` table; record values are
//! stored as a JSON object in the `data` column. Identifiers are UUIDs and
//! records are returned in creation order.

use async_trait::async_trait;
use chrono::{Duration, SecondsFormat, Utc};
use serde_json::{Map, Value};
use sqlx::any::AnyRow;
use sqlx::{Any, Row, Transaction};
use std::collections::HashMap;

use crate::domain::{NewRecord, Record, RecordId};
use crate::persistence::migrations::{MigrationResult, MigrationRunner, MigrationStatus};
use crate::persistence::pool::{ConnectionPool, DatabaseBackend};
use crate::persistence::{
    LockPolicy, PersistenceConfig, PersistenceError, RecordFilter, RecordStore, StoreTransaction,
};

/// Identifier lists longer than this are split over several statements.
const ID_CHUNK: usize = 500;

/// Rows per multi-row INSERT. Each row binds five parameters, which keeps a
/// statement well under the SQLite and PostgreSQL bind limits whatever the
/// configured batch size.
const MAX_INSERT_ROWS: usize = 1000;

/// Rows written per statement for a requested batch size.
fn statement_rows(batch_size: usize, cap: usize) -> usize {
    batch_size.clamp(1, cap)
}

/// [`RecordStore`] backed by a SQL database
#[derive(Clone)]
pub struct SqlxRecordStore {
    pool: ConnectionPool,
}

impl SqlxRecordStore {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Connect using `config`, running migrations when `auto_migrate` is set.
    /// Fails early when the database does not answer a trivial query.
    pub async fn connect(config: &PersistenceConfig) -> Result<Self, PersistenceError> {
        let store = Self::new(ConnectionPool::from_config(config).await?);
        store.pool.health_check().await?;
        if config.auto_migrate {
            store.migrate().await?;
        }
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<MigrationResult, PersistenceError> {
        MigrationRunner::new(self.pool.clone()).migrate_up().await
    }

    pub async fn migration_status(&self) -> Result<Vec<MigrationStatus>, PersistenceError> {
        MigrationRunner::new(self.pool.clone()).status().await
    }

    /// Wait for in-flight connections and close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

fn select_sql(backend: DatabaseBackend, lock: LockPolicy) -> String {
    let mut sql = format!(
        "SELECT id, data FROM records WHERE collection = {} ORDER BY created_at, id",
        backend.param(1)
    );
    if lock == LockPolicy::ForUpdate && backend.supports_row_locks() {
        sql.push_str(" FOR UPDATE");
    }
    sql
}

fn parse_data(data: &str) -> Result<Map<String, Value>, PersistenceError> {
    match serde_json::from_str::<Value>(data)? {
        Value::Object(values) => Ok(values),
        other => Err(PersistenceError::Serialization(format!(
            "record data must be a JSON object, got {}",
            other
        ))),
    }
}

fn parse_row(row: &AnyRow) -> Result<Record, PersistenceError> {
    let id: String = row.try_get("id")?;
    let data: String = row.try_get("data")?;
    Ok(Record::new(id, parse_data(&data)?))
}

fn filter_rows(rows: Vec<AnyRow>, filter: &RecordFilter) -> Result<Vec<Record>, PersistenceError> {
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let record = parse_row(&row)?;
        if filter.matches(&record) {
            records.push(record);
        }
    }
    Ok(records)
}

fn timestamp(offset: i64) -> String {
    (Utc::now() + Duration::nanoseconds(offset)).to_rfc3339_opts(SecondsFormat::Nanos, true)
}

#[async_trait]
impl RecordStore for SqlxRecordStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, PersistenceError> {
        let tx = self
            .pool
            .pool()
            .begin()
            .await
            .map_err(|e| PersistenceError::Transaction(e.to_string()))?;
        tracing::debug!(backend = self.pool.backend().name(), "began transaction");
        Ok(Box::new(SqlxTransaction {
            tx,
            backend: self.pool.backend(),
        }))
    }

    async fn query(&self, filter: &RecordFilter) -> Result<Vec<Record>, PersistenceError> {
        let sql = select_sql(self.pool.backend(), LockPolicy::None);
        let rows = sqlx::query(&sql)
            .bind(&filter.collection)
            .fetch_all(self.pool.pool())
            .await?;
        filter_rows(rows, filter)
    }
}

/// Open transaction on a [`SqlxRecordStore`]
pub struct SqlxTransaction {
    tx: Transaction<'static, Any>,
    backend: DatabaseBackend,
}

impl SqlxTransaction {
    /// Current `data` of the given records, by identifier.
    async fn load_data(
        &mut self,
        collection: &str,
        ids: &[String],
    ) -> Result<HashMap<String, Map<String, Value>>, PersistenceError> {
        let sql = format!(
            "SELECT id, data FROM records WHERE collection = {} AND id IN ({})",
            self.backend.param(1),
            self.backend.params(2, ids.len())
        );
        let mut query = sqlx::query(&sql).bind(collection);
        for id in ids {
            query = query.bind(id);
        }
        let rows = query.fetch_all(&mut *self.tx).await?;

        let mut data = HashMap::with_capacity(rows.len());
        for row in rows {
            let record = parse_row(&row)?;
            data.insert(record.id.as_str().to_string(), record.values);
        }
        Ok(data)
    }
}

#[async_trait]
impl StoreTransaction for SqlxTransaction {
    async fn query(
        &mut self,
        filter: &RecordFilter,
        lock: LockPolicy,
    ) -> Result<Vec<Record>, PersistenceError> {
        let sql = select_sql(self.backend, lock);
        let rows = sqlx::query(&sql)
            .bind(&filter.collection)
            .fetch_all(&mut *self.tx)
            .await?;
        filter_rows(rows, filter)
    }

    async fn delete(
        &mut self,
        collection: &str,
        ids: &[RecordId],
    ) -> Result<u64, PersistenceError> {
        let mut deleted = 0;
        for chunk in ids.chunks(ID_CHUNK) {
            let sql = format!(
                "DELETE FROM records WHERE collection = {} AND id IN ({})",
                self.backend.param(1),
                self.backend.params(2, chunk.len())
            );
            let mut query = sqlx::query(&sql).bind(collection);
            for id in chunk {
                query = query.bind(id.as_str());
            }
            deleted += query.execute(&mut *self.tx).await?.rows_affected();
        }
        Ok(deleted)
    }

    async fn bulk_create(
        &mut self,
        collection: &str,
        records: Vec<NewRecord>,
        batch_size: usize,
    ) -> Result<Vec<Record>, PersistenceError> {
        let mut created = Vec::with_capacity(records.len());
        let mut offset = 0;

        for batch in records.chunks(statement_rows(batch_size, MAX_INSERT_ROWS)) {
            let rows = (0..batch.len())
                .map(|i| format!("({})", self.backend.params(i * 5 + 1, 5)))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "INSERT INTO records (id, collection, data, created_at, updated_at) VALUES {}",
                rows
            );

            let mut query = sqlx::query(&sql);
            let mut staged = Vec::with_capacity(batch.len());
            for record in batch {
                let id = uuid::Uuid::new_v4().to_string();
                // distinct timestamps keep creation order stable within a batch
                let now = timestamp(offset);
                offset += 1;
                query = query
                    .bind(id.clone())
                    .bind(collection.to_string())
                    .bind(serde_json::to_string(&record.values)?)
                    .bind(now.clone())
                    .bind(now);
                staged.push(Record::new(id, record.values.clone()));
            }
            query.execute(&mut *self.tx).await?;
            tracing::debug!(collection, count = staged.len(), "inserted record batch");
            created.extend(staged);
        }
        Ok(created)
    }

    async fn bulk_update(
        &mut self,
        collection: &str,
        records: Vec<Record>,
        fields: &[String],
        batch_size: usize,
    ) -> Result<u64, PersistenceError> {
        let mut updated = 0;
        let sql = format!(
            "UPDATE records SET data = {}, updated_at = {} WHERE collection = {} AND id = {}",
            self.backend.param(1),
            self.backend.param(2),
            self.backend.param(3),
            self.backend.param(4)
        );

        // one lookup per batch binds every identifier of it
        for batch in records.chunks(statement_rows(batch_size, ID_CHUNK)) {
            let ids: Vec<String> = batch.iter().map(|r| r.id.as_str().to_string()).collect();
            let mut stored = self.load_data(collection, &ids).await?;
            let now = timestamp(0);

            for record in batch {
                let data = stored
                    .get_mut(record.id.as_str())
                    .ok_or_else(|| PersistenceError::not_found(collection, &record.id))?;
                for field in fields {
                    if let Some(value) = record.values.get(field) {
                        data.insert(field.clone(), value.clone());
                    }
                }
                sqlx::query(&sql)
                    .bind(serde_json::to_string(data)?)
                    .bind(now.clone())
                    .bind(collection.to_string())
                    .bind(record.id.as_str().to_string())
                    .execute(&mut *self.tx)
                    .await?;
                updated += 1;
            }
            tracing::debug!(collection, count = batch.len(), "updated record batch");
        }
        Ok(updated)
    }

    async fn commit(self: Box<Self>) -> Result<(), PersistenceError> {
        self.tx
            .commit()
            .await
            .map_err(|e| PersistenceError::Transaction(e.to_string()))?;
        tracing::debug!("committed transaction");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), PersistenceError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| PersistenceError::Transaction(e.to_string()))?;
        tracing::debug!("rolled back transaction");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_sql_lock_policy() {
        assert!(!select_sql(DatabaseBackend::Sqlite, LockPolicy::ForUpdate).contains("FOR UPDATE"));
        assert!(select_sql(DatabaseBackend::Postgres, LockPolicy::ForUpdate).ends_with("FOR UPDATE"));
        assert!(select_sql(DatabaseBackend::Postgres, LockPolicy::None).contains("= $1"));
    }

    #[test]
    fn test_statement_rows_are_capped() {
        assert_eq!(statement_rows(0, MAX_INSERT_ROWS), 1);
        assert_eq!(statement_rows(200, MAX_INSERT_ROWS), 200);
        assert_eq!(statement_rows(10_000, MAX_INSERT_ROWS), MAX_INSERT_ROWS);
        assert_eq!(statement_rows(10_000, ID_CHUNK), ID_CHUNK);
    }

    #[test]
    fn test_parse_data_requires_object() {
        assert!(parse_data(r#"{"name": "A"}"#).is_ok());
        assert!(matches!(
            parse_data("[1, 2]"),
            Err(PersistenceError::Serialization(_))
        ));
        assert!(matches!(parse_data("nope"), Err(PersistenceError::Json(_))));
    }
}
