//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── CoreError        - Ledger state / business rule failures          │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  tally-db errors (separate crate)                                      │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  Every error maps to one ErrorKind the caller can branch on:           │
//! │  Validation │ NotFound │ Conflict │ InsufficientResource               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include the offending values in the message (balance, amount, id)
//! 3. Errors are enum variants, never String

use serde::Serialize;
use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Error Kind
// =============================================================================

/// Coarse classification of a failure, stable across crates.
///
/// ## Mapping
/// ```text
/// Validation           - bad input value, empty ledger, unsettled balance
/// NotFound             - tab / sale / product / line does not exist
/// Conflict             - operation not valid for the current state
/// InsufficientResource - inventory refused a decrement
/// Storage              - database / infrastructure failure (tally-db only)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    InsufficientResource,
    Storage,
}

// =============================================================================
// Core Error
// =============================================================================

/// Ledger business logic errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A referenced entity does not exist.
    ///
    /// ## When This Occurs
    /// - Tab or sale id is unknown
    /// - Product was never created or is inactive
    /// - Line id does not belong to the ledger
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The ledger is not in a state that allows the requested operation.
    ///
    /// ## When This Occurs
    /// - Adding items to a closed tab
    /// - Finalizing a sale twice
    /// - Cancelling a cancelled tab
    #[error("{entity} {id} is {status}, cannot {operation}")]
    InvalidStatus {
        entity: &'static str,
        id: String,
        status: String,
        operation: &'static str,
    },

    /// The line was already allocated to a payment.
    #[error("Item {item_id} is already paid")]
    ItemAlreadyPaid { item_id: String },

    /// The line was already excused from billing.
    #[error("Item {item_id} is already waived")]
    ItemAlreadyWaived { item_id: String },

    /// Closing / finalizing a ledger without lines.
    #[error("{entity} {id} has no items")]
    EmptyLedger { entity: &'static str, id: String },

    /// Closing a tab that still has money owed.
    ///
    /// ## User Workflow
    /// ```text
    /// Close tab
    ///      │
    ///      ▼
    /// OutstandingBalance { remaining: $16.50 }
    ///      │
    ///      ▼
    /// Register payment of $16.50 → retry close
    /// ```
    #[error("Tab {tab_id} still has an outstanding balance of {remaining}")]
    OutstandingBalance { tab_id: String, remaining: Money },

    /// Payment larger than what is owed (beyond one cent of slack).
    #[error("Payment of {amount} exceeds the remaining balance of {remaining}")]
    PaymentExceedsBalance { amount: Money, remaining: Money },

    /// Waiving the line would leave the tab paid beyond what it owes.
    #[error("Cannot waive item {item_id}: {paid} already paid against {owed} owed without it")]
    WaiverExceedsBalance {
        item_id: String,
        paid: Money,
        owed: Money,
    },

    /// None of the requested lines can be marked as paid.
    #[error("No payable items among {requested} requested")]
    NothingToPay { requested: usize },

    /// Inventory refused to go below zero.
    #[error("Insufficient stock for {product_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: String,
        available: f64,
        requested: f64,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Classifies the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::InvalidStatus { .. }
            | CoreError::ItemAlreadyPaid { .. }
            | CoreError::ItemAlreadyWaived { .. }
            | CoreError::WaiverExceedsBalance { .. } => ErrorKind::Conflict,
            CoreError::EmptyLedger { .. }
            | CoreError::OutstandingBalance { .. }
            | CoreError::PaymentExceedsBalance { .. }
            | CoreError::NothingToPay { .. }
            | CoreError::Validation(_) => ErrorKind::Validation,
            CoreError::InsufficientStock { .. } => ErrorKind::InsufficientResource,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input doesn't meet requirements.
/// Used for early validation before any ledger state is touched.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must be a finite number.
    #[error("{field} must be a finite number")]
    NotFinite { field: String },

    /// Invalid format (e.g., invalid UUID).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
