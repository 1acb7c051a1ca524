//! Database connection pool management

use crate::persistence::error::PersistenceError;
use crate::persistence::PersistenceConfig;
use sqlx::{any::AnyPoolOptions, AnyPool};
use std::time::Duration;

/// Database backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
    Mysql,
}

impl DatabaseBackend {
    /// Detect the database backend from a connection URL
    pub fn from_url(url: &str) -> Result<Self, PersistenceError> {
        if url.starts_with("sqlite:") {
            Ok(Self::Sqlite)
        } else if url.starts_with("postgres:") || url.starts_with("postgresql:") {
            Ok(Self::Postgres)
        } else if url.starts_with("mysql:") || url.starts_with("mariadb:") {
            Ok(Self::Mysql)
        } else {
            Err(PersistenceError::Connection(format!(
                "Unsupported database URL format. Expected sqlite://, postgres://, or mysql://. Got: {}",
                url.split(':').next().unwrap_or("unknown")
            )))
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sqlite => "SQLite",
            Self::Postgres => "PostgreSQL",
            Self::Mysql => "MySQL",
        }
    }

    /// Bind parameter marker for the `index`-th (1-based) parameter.
    pub fn param(&self, index: usize) -> String {
        match self {
            Self::Postgres => format!("${}", index),
            Self::Sqlite | Self::Mysql => "?".to_string(),
        }
    }

    /// Comma separated markers for parameters `start..start + count`.
    pub fn params(&self, start: usize, count: usize) -> String {
        (start..start + count)
            .map(|i| self.param(i))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// SQLite locks the whole database for writing; it has no row locks.
    pub fn supports_row_locks(&self) -> bool {
        !matches!(self, Self::Sqlite)
    }
}

/// Connection pool wrapper with backend information
#[derive(Clone)]
pub struct ConnectionPool {
    pool: AnyPool,
    backend: DatabaseBackend,
}

impl ConnectionPool {
    /// Create a new connection pool from a database URL
    ///
    /// # Arguments
    ///
    /// * `url` - Database connection URL (sqlite://, postgres://, mysql://)
    /// * `max_connections` - Maximum number of connections in the pool
    /// * `connect_timeout_secs` - Connection timeout in seconds
    pub async fn new(
        url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> Result<Self, PersistenceError> {
        sqlx::any::install_default_drivers();

        let backend = DatabaseBackend::from_url(url)?;

        tracing::info!(
            "Connecting to {} database with max {} connections",
            backend.name(),
            max_connections
        );

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| PersistenceError::Connection(e.to_string()))?;

        tracing::info!("Successfully connected to {} database", backend.name());

        Ok(Self { pool, backend })
    }

    pub async fn from_config(config: &PersistenceConfig) -> Result<Self, PersistenceError> {
        Self::new(
            &config.url,
            config.max_connections,
            config.connect_timeout_secs,
        )
        .await
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn backend(&self) -> DatabaseBackend {
        self.backend
    }

    /// Check if the database connection is healthy
    pub async fn health_check(&self) -> Result<(), PersistenceError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::Connection(format!("Health check failed: {}", e)))?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_detection() {
        assert_eq!(
            DatabaseBackend::from_url("sqlite://silica.db?mode=rwc").unwrap(),
            DatabaseBackend::Sqlite
        );
        assert_eq!(
            DatabaseBackend::from_url("sqlite::memory:").unwrap(),
            DatabaseBackend::Sqlite
        );
        assert_eq!(
            DatabaseBackend::from_url("postgresql://localhost/db").unwrap(),
            DatabaseBackend::Postgres
        );
        assert_eq!(
            DatabaseBackend::from_url("mariadb://localhost/db").unwrap(),
            DatabaseBackend::Mysql
        );
        assert!(DatabaseBackend::from_url("redis://localhost").is_err());
    }

    #[test]
    fn test_params() {
        assert_eq!(DatabaseBackend::Sqlite.params(1, 3), "?, ?, ?");
        assert_eq!(DatabaseBackend::Postgres.params(3, 2), "$3, $4");
        assert!(!DatabaseBackend::Sqlite.supports_row_locks());
        assert!(DatabaseBackend::Mysql.supports_row_locks());
    }
}
