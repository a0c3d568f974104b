//! # Error Types
//!
//! Domain-specific error types for rafidain-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │  rafidain-core errors (this file)                                   │
//! │  ├── CoreError        - Domain rule violations                      │
//! │  └── ValidationError  - Input validation failures                   │
//! │                                                                     │
//! │  rafidain-db errors (separate crate)                                │
//! │  ├── DbError          - Storage failures                            │
//! │  └── LedgerError      - What the application boundary sees          │
//! │                                                                     │
//! │  Flow: ValidationError → CoreError → LedgerError → caller           │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Core business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A referenced variant does not exist.
    #[error("Variant not found: {0}")]
    VariantNotFound(String),

    /// A referenced sale does not exist.
    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    /// A referenced purchase order does not exist.
    #[error("Purchase order not found: {0}")]
    PurchaseOrderNotFound(String),

    /// A state-machine transition was requested from the wrong state.
    ///
    /// Cancelling a received order, marking a received order as ordered,
    /// and so on. Note that receiving an already-received order is NOT
    /// this error; it is an idempotent no-op.
    #[error("Purchase order {id} is {status}, cannot {operation}")]
    InvalidOrderStatus {
        id: String,
        status: String,
        operation: String,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Input validation errors.
///
/// Raised before any mutation; a validation failure never touches the
/// database.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required identifier is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// A sale or return was submitted with no line items.
    #[error("{entity} must have at least one item")]
    EmptyItems { entity: String },

    /// A quantity must be strictly positive.
    #[error("{field} must be positive, got {value}")]
    MustBePositive { field: String, value: i64 },

    /// A monetary amount may not be negative.
    #[error("{field} may not be negative, got {value}")]
    Negative { field: String, value: i64 },
}

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
