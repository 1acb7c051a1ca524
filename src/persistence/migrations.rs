//! Schema migrations for the SQL record store

use crate::persistence::error::PersistenceError;
use crate::persistence::pool::ConnectionPool;
use serde::Serialize;
use sqlx::Row;

/// One `records` table holds every collection; record values live in a JSON
/// text column.
const MIGRATION_001_RECORDS: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id VARCHAR(64) PRIMARY KEY,
    collection VARCHAR(255) NOT NULL,
    data TEXT NOT NULL,
    created_at VARCHAR(64) NOT NULL,
    updated_at VARCHAR(64) NOT NULL
);

CREATE INDEX idx_records_collection ON records(collection, created_at)
"#;

struct Migration {
    name: &'static str,
    sql: &'static str,
    checksum: &'static str,
}

fn migrations() -> Vec<Migration> {
    vec![Migration {
        name: "001_records",
        sql: MIGRATION_001_RECORDS,
        checksum: "v1",
    }]
}

/// Applies pending migrations and tracks them in `_silica_migrations`
pub struct MigrationRunner {
    pool: ConnectionPool,
}

impl MigrationRunner {
    pub fn new(pool: ConnectionPool) -> Self {
        Self { pool }
    }

    /// Run all pending migrations
    pub async fn migrate_up(&self) -> Result<MigrationResult, PersistenceError> {
        let mut result = MigrationResult::default();
        self.ensure_migrations_table().await?;

        for migration in migrations() {
            if self.applied_at(migration.name).await?.is_some() {
                tracing::debug!(migration = migration.name, "migration already applied");
                result.skipped += 1;
                continue;
            }

            tracing::info!(migration = migration.name, "applying migration");

            // statements run one at a time; not every driver accepts a script
            for statement in migration.sql.split(';').map(str::trim) {
                if statement.is_empty() {
                    continue;
                }
                sqlx::query(statement)
                    .execute(self.pool.pool())
                    .await
                    .map_err(|e| {
                        PersistenceError::Migration(format!(
                            "Failed to execute migration '{}': {}",
                            migration.name, e
                        ))
                    })?;
            }

            self.record(migration.name, migration.checksum).await?;
            result.applied += 1;
        }

        tracing::info!(
            applied = result.applied,
            skipped = result.skipped,
            "migrations complete"
        );
        Ok(result)
    }

    pub async fn status(&self) -> Result<Vec<MigrationStatus>, PersistenceError> {
        self.ensure_migrations_table().await?;

        let mut statuses = Vec::new();
        for migration in migrations() {
            let applied_at = self.applied_at(migration.name).await?;
            statuses.push(MigrationStatus {
                name: migration.name.to_string(),
                applied: applied_at.is_some(),
                applied_at,
            });
        }
        Ok(statuses)
    }

    async fn ensure_migrations_table(&self) -> Result<(), PersistenceError> {
        let sql = r#"
            CREATE TABLE IF NOT EXISTS _silica_migrations (
                name VARCHAR(255) PRIMARY KEY,
                applied_at VARCHAR(64) NOT NULL,
                checksum VARCHAR(64) NOT NULL
            )
        "#;

        sqlx::query(sql)
            .execute(self.pool.pool())
            .await
            .map_err(|e| {
                PersistenceError::Migration(format!("Failed to create migrations table: {}", e))
            })?;
        Ok(())
    }

    async fn applied_at(&self, name: &str) -> Result<Option<String>, PersistenceError> {
        let backend = self.pool.backend();
        let sql = format!(
            "SELECT applied_at FROM _silica_migrations WHERE name = {}",
            backend.param(1)
        );
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(self.pool.pool())
            .await
            .map_err(|e| {
                PersistenceError::Migration(format!("Failed to check migration status: {}", e))
            })?;

        row.map(|row| row.try_get::<String, _>("applied_at"))
            .transpose()
            .map_err(PersistenceError::from)
    }

    async fn record(&self, name: &str, checksum: &str) -> Result<(), PersistenceError> {
        let backend = self.pool.backend();
        let sql = format!(
            "INSERT INTO _silica_migrations (name, applied_at, checksum) VALUES ({})",
            backend.params(1, 3)
        );
        sqlx::query(&sql)
            .bind(name)
            .bind(chrono::Utc::now().to_rfc3339())
            .bind(checksum)
            .execute(self.pool.pool())
            .await
            .map_err(|e| PersistenceError::Migration(format!("Failed to record migration: {}", e)))?;
        Ok(())
    }
}

/// Result of running migrations
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MigrationResult {
    pub applied: usize,
    /// Already applied before this run
    pub skipped: usize,
}

/// Status of a single migration
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    pub name: String,
    pub applied: bool,
    pub applied_at: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_migrations_apply_once() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("m.db").display());
        let pool = ConnectionPool::new(&url, 1, 5).await.unwrap();
        let runner = MigrationRunner::new(pool);

        let first = runner.migrate_up().await.unwrap();
        assert_eq!(first, MigrationResult { applied: 1, skipped: 0 });
        let second = runner.migrate_up().await.unwrap();
        assert_eq!(second, MigrationResult { applied: 0, skipped: 1 });

        let status = runner.status().await.unwrap();
        assert_eq!(status.len(), 1);
        assert!(status[0].applied);
        assert!(status[0].applied_at.is_some());
    }
}
