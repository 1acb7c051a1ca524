//! Persistence layer error types

use thiserror::Error;

/// Errors that can occur in the persistence layer
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Database connection error
    #[error("Database connection error: {0}")]
    Connection(String),

    /// Record not found
    #[error("Record not found: {collection} with identifier '{identifier}'")]
    NotFound {
        collection: String,
        identifier: String,
    },

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Stored data could not be decoded into a record
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Failure injected into the in-memory store
    #[error("Injected {operation} failure")]
    InjectedFailure { operation: String },

    /// Database error from SQLx
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PersistenceError {
    pub fn not_found(collection: &str, identifier: impl ToString) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            identifier: identifier.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = PersistenceError::not_found("members", 7);
        assert_eq!(
            err.to_string(),
            "Record not found: members with identifier '7'"
        );
        let err = PersistenceError::InjectedFailure {
            operation: "delete".into(),
        };
        assert_eq!(err.to_string(), "Injected delete failure");
    }
}
