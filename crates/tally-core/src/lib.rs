//! # tally-core: Pure Ledger Logic for Tally
//!
//! This crate is the **heart** of Tally. It contains the tab (comanda) and
//! sale (venda) ledgers as pure state machines with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Tally Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                Callers (HTTP handlers, desktop UI)              │   │
//! │  │    open tab ──► add items ──► payments ──► close               │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tally-db (repositories)                      │   │
//! │  │    BEGIN ─► load aggregate ─► apply ─► persist ─► COMMIT        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │  ledger   │  │ validation│  │   │
//! │  │   │  Product  │  │   Money   │  │ TabLedger │  │   rules   │  │   │
//! │  │   │  Discount │  │  round2   │  │SaleLedger │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Shared domain types (Product, statuses, Discount)
//! - [`money`] - Money type, `round2` and the settlement epsilon
//! - [`ledger`] - Tab and Sale aggregates and their state machines
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: ids and timestamps come from the caller
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: All monetary values are in cents (i64)
//! 4. **Explicit Errors**: All errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::Utc;
//! use tally_core::ledger::{OpenLedger, TabLedger};
//! use tally_core::Money;
//!
//! let mut tab = TabLedger::open(
//!     "tab-1".to_string(),
//!     1,
//!     &OpenLedger::new("Mesa 4"),
//!     Utc::now(),
//! )
//! .unwrap();
//!
//! assert!(tab.tab.amount_remaining().is_zero());
//! assert!(tab.register_payment("p-1".to_string(), Money::from_cents(100), Default::default(), Utc::now()).is_err());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod ledger;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ErrorKind, ValidationError};
pub use ledger::{
    AddSaleItem, AddTabItem, EditSaleItem, FinalizeSale, OpenLedger, RegisterPayment, Sale,
    SaleItem, SaleLedger, Tab, TabItem, TabLedger, TabPayment,
};
pub use money::{is_zero, round2, Money};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines on a single tab or sale.
///
/// ## Business Reason
/// A bar tab can run all night, but hundreds of lines means something
/// went wrong at the terminal.
pub const MAX_LEDGER_ITEMS: usize = 500;

/// Maximum quantity on a single line.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 1000 instead of 10)
pub const MAX_ITEM_QUANTITY: f64 = 999.0;

/// Maximum unit price in cents ($1,000,000.00).
///
/// Keeps `price × MAX_ITEM_QUANTITY × MAX_LEDGER_ITEMS` well inside i64.
pub const MAX_UNIT_PRICE_CENTS: i64 = 100_000_000;

/// Maximum length of the customer name snapshot.
pub const MAX_CUSTOMER_NAME_LEN: usize = 120;

/// Maximum length of ledger notes.
pub const MAX_NOTES_LEN: usize = 500;

/// Slack allowed when a payment slightly exceeds the remaining balance.
pub const PAYMENT_SLACK: Money = Money::from_cents(1);
