//! # Validation Module
//!
//! Input validation for ledger operations.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Input structs (OpenLedger, AddSaleItem, ...)                 │
//! │  ├── Required vs optional fields enforced by the type                  │
//! │  └── THIS MODULE: value checks before any transaction starts          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Ledger state machine (tally-core::ledger)                    │
//! │  ├── Status checks (OPEN only)                                         │
//! │  └── Balance checks (payment vs remaining)                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK constraints (quantity > 0, subtotal >= 0)                   │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tally_core::validation::{validate_customer_name, validate_quantity};
//!
//! validate_customer_name("Mesa 4").unwrap();
//! validate_quantity(0.5).unwrap();
//! assert!(validate_quantity(0.0).is_err());
//! ```

use crate::error::ValidationError;
use crate::money::{Money, FULL_BPS};
use crate::types::{Discount, DiscountKind};
use crate::{
    MAX_CUSTOMER_NAME_LEN, MAX_ITEM_QUANTITY, MAX_LEDGER_ITEMS, MAX_NOTES_LEN,
    MAX_UNIT_PRICE_CENTS,
};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates the customer name a ledger is opened for.
///
/// ## Rules
/// - Must not be empty (after trimming)
/// - At most 120 characters
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_customer_name;
///
/// assert!(validate_customer_name("João").is_ok());
/// assert!(validate_customer_name("  ").is_err());
/// ```
pub fn validate_customer_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "customer_name".to_string(),
        });
    }

    if name.chars().count() > MAX_CUSTOMER_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "customer_name".to_string(),
            max: MAX_CUSTOMER_NAME_LEN,
        });
    }

    Ok(())
}

/// Validates free-text notes.
pub fn validate_notes(notes: &str) -> ValidationResult<()> {
    if notes.chars().count() > MAX_NOTES_LEN {
        return Err(ValidationError::TooLong {
            field: "notes".to_string(),
            max: MAX_NOTES_LEN,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// ## Rules
/// - Must be a finite number
/// - Must be positive (> 0); fractions are allowed (kg, litres)
/// - Must not exceed MAX_ITEM_QUANTITY (999)
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Tab: Add Item                                                          │
/// │                                                                         │
/// │  Waiter enters quantity: 2                                             │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_quantity(2.0) ← THIS FUNCTION                                │
/// │       │                                                                 │
/// │       ├── qty <= 0? → Error: "quantity must be positive"               │
/// │       │                                                                 │
/// │       ├── qty > 999? → Error: "quantity must be between 0 and 999"     │
/// │       │                                                                 │
/// │       └── OK → Proceed with add_item                                   │
/// │                                                                         │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_quantity(qty: f64) -> ValidationResult<()> {
    if !qty.is_finite() {
        return Err(ValidationError::NotFinite {
            field: "quantity".to_string(),
        });
    }

    if qty <= 0.0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 0,
            max: MAX_ITEM_QUANTITY as i64,
        });
    }

    Ok(())
}

/// Validates a unit price in cents.
///
/// ## Rules
/// - Must be non-negative (>= 0)
/// - Zero is allowed (free items)
/// - Must not exceed MAX_UNIT_PRICE_CENTS
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents(650).is_ok());
/// assert!(validate_price_cents(0).is_ok());
/// assert!(validate_price_cents(-100).is_err());
/// assert!(validate_price_cents(i64::MAX).is_err());
/// ```
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if !(0..=MAX_UNIT_PRICE_CENTS).contains(&cents) {
        return Err(ValidationError::OutOfRange {
            field: "unit_price".to_string(),
            min: 0,
            max: MAX_UNIT_PRICE_CENTS,
        });
    }

    Ok(())
}

/// Validates a payment amount.
///
/// ## Rules
/// - Must be positive (> 0)
pub fn validate_payment_amount(amount: Money) -> ValidationResult<()> {
    if !amount.is_positive() {
        return Err(ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        });
    }

    Ok(())
}

/// Validates an amount tendered at sale finalization.
///
/// Zero is allowed (credit sales).
pub fn validate_amount_tendered(amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::OutOfRange {
            field: "amount_paid".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a discount.
///
/// ## Rules
/// - Fixed: non-negative cents
/// - Percentage: 0 to 10000 bps (0% to 100%)
pub fn validate_discount(discount: &Discount) -> ValidationResult<()> {
    match discount.kind {
        DiscountKind::Fixed if discount.value < 0 => Err(ValidationError::OutOfRange {
            field: "discount".to_string(),
            min: 0,
            max: i64::MAX,
        }),
        DiscountKind::Percentage if !(0..=FULL_BPS as i64).contains(&discount.value) => {
            Err(ValidationError::OutOfRange {
                field: "discount".to_string(),
                min: 0,
                max: FULL_BPS as i64,
            })
        }
        _ => Ok(()),
    }
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates ledger size before adding one more line.
///
/// ## Rules
/// - Must not exceed MAX_LEDGER_ITEMS (500)
pub fn validate_ledger_size(current_items: usize) -> ValidationResult<()> {
    if current_items >= MAX_LEDGER_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 0,
            max: MAX_LEDGER_ITEMS as i64,
        });
    }

    Ok(())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string format.
///
/// ## Example
/// ```rust
/// use tally_core::validation::validate_uuid;
///
/// assert!(validate_uuid("customer_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("customer_id", "not-a-uuid").is_err());
/// ```
pub fn validate_uuid(field: &str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
