//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)        Ledger rule (tally_core::CoreError) │
//! │       │                                      │                          │
//! │       ▼                                      ▼                          │
//! │  DbError (this module) ◄─────────────────────┘                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbError::kind() → Validation | NotFound | Conflict |                   │
//! │                    InsufficientResource | Storage                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Caller maps the kind to a status code / UI message                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tally_core::{CoreError, ErrorKind};
use thiserror::Error;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - Tab, sale or product id doesn't exist
    /// - `fetch_one` returns no rows
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A ledger rule rejected the operation. Nothing was written.
    #[error(transparent)]
    Ledger(#[from] CoreError),

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Inserting a duplicate SKU
    /// - Duplicate sequence number (should not happen, the counter is atomic)
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file can't be created
    /// - File permissions issue
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Configuration could not be read.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Category of the failure, for callers mapping errors to responses.
    ///
    /// ```text
    /// NotFound            → NotFound
    /// Ledger(e)           → e.kind()
    /// UniqueViolation     → Conflict
    /// everything else     → Storage
    /// ```
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::NotFound { .. } => ErrorKind::NotFound,
            DbError::Ledger(e) => e.kind(),
            DbError::UniqueViolation { .. } => ErrorKind::Conflict,
            _ => ErrorKind::Storage,
        }
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // UNIQUE constraint: "UNIQUE constraint failed: <table>.<column>"
                // FK constraint: "FOREIGN KEY constraint failed"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Lets repositories use `?` on validation results directly.
impl From<tally_core::ValidationError> for DbError {
    fn from(err: tally_core::ValidationError) -> Self {
        DbError::Ledger(CoreError::Validation(err))
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::Money;

    #[test]
    fn test_kinds() {
        assert_eq!(DbError::not_found("Tab", "t-1").kind(), ErrorKind::NotFound);
        assert_eq!(DbError::duplicate("sku", "BEER").kind(), ErrorKind::Conflict);
        assert_eq!(DbError::PoolExhausted.kind(), ErrorKind::Storage);

        let ledger: DbError = CoreError::PaymentExceedsBalance {
            amount: Money::from_cents(500),
            remaining: Money::from_cents(100),
        }
        .into();
        assert_eq!(ledger.kind(), ErrorKind::Validation);
        assert_eq!(
            ledger.to_string(),
            "Payment of $5.00 exceeds the remaining balance of $1.00"
        );
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
