//! # Domain Types
//!
//! Shared domain types used by both ledgers.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │   TabStatus     │   │   SaleStatus    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  Open           │   │  Open           │       │
//! │  │  name           │   │  Closed         │   │  Finalized      │       │
//! │  │  price_cents    │   │  Cancelled      │   │  Cancelled      │       │
//! │  │  cost_cents     │   └─────────────────┘   └─────────────────┘       │
//! │  │  track_inventory│                                                    │
//! │  └─────────────────┘   ┌─────────────────┐   ┌─────────────────┐       │
//! │                        │    Discount     │   │ PaymentMethod   │       │
//! │                        │  ─────────────  │   │  ─────────────  │       │
//! │                        │  kind           │   │  Cash           │       │
//! │                        │  value          │   │  Card           │       │
//! │                        └─────────────────┘   │  Credit         │       │
//! │                                              └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ledger aggregates (Tab, Sale and their lines) live in [`crate::ledger`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::money::{Money, FULL_BPS};

// =============================================================================
// Product
// =============================================================================

/// A catalog product as seen by the ledger.
///
/// The catalog itself is managed elsewhere; the ledger only reads products
/// to snapshot name, price and cost onto lines, and to know whether closing
/// a tab must touch stock.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Stock Keeping Unit - business identifier.
    pub sku: String,

    /// Display name, copied onto lines at add time.
    pub name: String,

    /// Sale price in cents.
    pub price_cents: i64,

    /// Average unit cost in cents (for margin reporting).
    pub cost_cents: i64,

    /// Whether closing a ledger decrements stock for this product.
    pub track_inventory: bool,

    /// Allow stock to go below zero.
    pub allow_negative_stock: bool,

    /// Current stock level (fractional for products sold by weight/volume).
    pub current_stock: Option<f64>,

    /// Whether product is active (soft delete).
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Returns the price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Returns the unit cost as a Money type.
    #[inline]
    pub fn cost(&self) -> Money {
        Money::from_cents(self.cost_cents)
    }

    /// Checks if `quantity` is covered by stock (always true when untracked).
    pub fn has_stock_for(&self, quantity: f64) -> bool {
        if !self.track_inventory {
            return true;
        }
        self.current_stock.unwrap_or(0.0) >= quantity
    }
}

// =============================================================================
// Statuses
// =============================================================================

/// The status of a tab (comanda).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum TabStatus {
    /// Tab is running; items and payments can be added.
    Open,
    /// Tab was settled and stock consumed.
    Closed,
    /// Tab was abandoned; no stock effect.
    Cancelled,
}

impl TabStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TabStatus::Open => "open",
            TabStatus::Closed => "closed",
            TabStatus::Cancelled => "cancelled",
        }
    }
}

impl Default for TabStatus {
    fn default() -> Self {
        TabStatus::Open
    }
}

impl fmt::Display for TabStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The status of a sale (venda).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Sale is in progress (items being added).
    Open,
    /// Sale has been paid and stock consumed.
    Finalized,
    /// Sale was cancelled before finalizing.
    Cancelled,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Open => "open",
            SaleStatus::Finalized => "finalized",
            SaleStatus::Cancelled => "cancelled",
        }
    }
}

impl Default for SaleStatus {
    fn default() -> Self {
        SaleStatus::Open
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Physical cash payment.
    Cash,
    /// Card payment on external terminal.
    Card,
    /// On the customer's account, settled later.
    Credit,
}

impl Default for PaymentMethod {
    fn default() -> Self {
        PaymentMethod::Cash
    }
}

// =============================================================================
// Discount
// =============================================================================

/// How a discount value is interpreted.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind {
    /// Absolute amount in cents.
    Fixed,
    /// Basis points of the pre-discount amount (1000 = 10%).
    Percentage,
}

impl Default for DiscountKind {
    fn default() -> Self {
        DiscountKind::Fixed
    }
}

/// A discount as entered by the operator.
///
/// ## Value Encoding
/// ```text
/// Fixed      value = cents      (250  → $2.50 off)
/// Percentage value = bps        (1000 → 10% off)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Discount {
    pub kind: DiscountKind,
    pub value: i64,
}

impl Discount {
    /// No discount.
    pub const fn none() -> Self {
        Discount {
            kind: DiscountKind::Fixed,
            value: 0,
        }
    }

    /// Fixed amount off.
    pub const fn fixed(amount: Money) -> Self {
        Discount {
            kind: DiscountKind::Fixed,
            value: amount.cents(),
        }
    }

    /// Percentage off, in basis points.
    pub const fn percentage_bps(bps: u32) -> Self {
        Discount {
            kind: DiscountKind::Percentage,
            value: bps as i64,
        }
    }

    /// Percentage off from a plain percent value (10.0 = 10%).
    pub fn percentage(percent: f64) -> Self {
        Discount {
            kind: DiscountKind::Percentage,
            value: (percent * 100.0).round() as i64,
        }
    }

    /// Checks if the discount takes nothing off.
    pub fn is_none(&self) -> bool {
        self.value == 0
    }

    /// Amount taken off `base`, clamped to `[0, base]`.
    ///
    /// ## Example
    /// ```rust
    /// use tally_core::{Discount, Money};
    ///
    /// let base = Money::from_cents(1200);
    /// assert_eq!(Discount::percentage_bps(1000).amount_off(base).cents(), 120);
    /// assert_eq!(Discount::fixed(Money::from_cents(5000)).amount_off(base).cents(), 1200);
    /// ```
    pub fn amount_off(&self, base: Money) -> Money {
        if self.value <= 0 || !base.is_positive() {
            return Money::zero();
        }
        let off = match self.kind {
            DiscountKind::Fixed => Money::from_cents(self.value),
            DiscountKind::Percentage => {
                let bps = self.value.min(FULL_BPS as i64) as u32;
                base.percentage(bps)
            }
        };
        off.min(base)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
