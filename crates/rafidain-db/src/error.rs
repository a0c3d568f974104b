//! # Error Types
//!
//! Storage errors and the ledger-level error surface.
//!
//! ## Error Flow
//! ```text
//! SQLite error (sqlx::Error)
//!      │
//!      ▼
//! DbError            ← classified (unique / FK / connection / query)
//!      │
//!      ▼
//! LedgerError        ← what a ledger operation returns to the boundary:
//!                      validation | not-found | invalid-state | storage
//! ```
//!
//! Propagation policy: every multi-step mutation runs inside a
//! transaction; on any error the transaction is rolled back in full before
//! the error reaches the caller. There is no retry.

use thiserror::Error;

use rafidain_core::{CoreError, ValidationError};

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in the database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation (duplicate SKU, duplicate id).
    #[error("Duplicate {field}: already exists")]
    UniqueViolation { field: String },

    /// Foreign key constraint violation (unknown variant, branch, ...).
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

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
}

/// Classifies sqlx errors by inspecting the SQLite message.
///
/// UNIQUE constraint: "UNIQUE constraint failed: <table>.<column>"
/// FK constraint:     "FOREIGN KEY constraint failed"
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },
            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation { field }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }
            sqlx::Error::PoolTimedOut => {
                DbError::ConnectionFailed("connection busy".to_string())
            }
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool is closed".to_string()),
            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for raw database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Ledger error surface
// =============================================================================

/// What a ledger operation returns to the application boundary.
///
/// Four failure categories map onto the variants:
/// - validation  → [`LedgerError::Validation`] (rejected before mutation)
/// - referential → [`LedgerError::NotFound`] (mid-transaction, rolls back)
/// - invalid state → [`LedgerError::InvalidState`]
/// - storage     → [`LedgerError::Db`] (surfaced verbatim, rolls back)
///
/// Receiving an already-received purchase order is a success, not an
/// error.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("{0}")]
    InvalidState(String),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl LedgerError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        LedgerError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Db(DbError::from(err))
    }
}

impl From<CoreError> for LedgerError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(v) => LedgerError::Validation(v),
            CoreError::VariantNotFound(id) => LedgerError::not_found("Variant", id),
            CoreError::SaleNotFound(id) => LedgerError::not_found("Sale", id),
            CoreError::PurchaseOrderNotFound(id) => LedgerError::not_found("Purchase order", id),
            other @ CoreError::InvalidOrderStatus { .. } => {
                LedgerError::InvalidState(other.to_string())
            }
        }
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
