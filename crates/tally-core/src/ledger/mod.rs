//! # Ledger Module
//!
//! The two ledgers Tally keeps, as pure in-memory aggregates.
//!
//! ## Lifecycles
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  TAB (comanda)                          SALE (venda)                   │
//! │                                                                         │
//! │  open ─► OPEN ──close──► CLOSED         open ─► OPEN ──finalize──► FINALIZED
//! │            │                                      │                     │
//! │            └──cancel──► CANCELLED                 └──cancel──► CANCELLED│
//! │                                                                         │
//! │  OPEN accepts: add/remove item,         OPEN accepts: add/edit/remove  │
//! │  mark paid, waive, discount,            item, discount                 │
//! │  partial payment                                                        │
//! │                                                                         │
//! │  Terminal states are immutable (recalculate excepted).                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every mutation recomputes the aggregate totals from the lines held by
//! the aggregate. The database layer loads the aggregate inside the same
//! transaction that persists the result, so totals never come from a stale
//! copy.

pub mod line;
pub mod sale;
pub mod tab;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{Discount, PaymentMethod};
use crate::validation::{
    validate_customer_name, validate_discount, validate_notes, validate_price_cents,
    validate_quantity, validate_uuid, ValidationResult,
};

pub use line::line_subtotal;
pub use sale::{Sale, SaleItem, SaleLedger};
pub use tab::{Tab, TabItem, TabLedger, TabPayment};

// =============================================================================
// Operation Inputs
// =============================================================================

/// Input for opening a tab or a sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OpenLedger {
    /// Name shown on the ledger (copied, not linked).
    pub customer_name: String,

    /// Registered customer, if any (weak reference).
    #[serde(default)]
    pub customer_id: Option<String>,

    #[serde(default)]
    pub notes: Option<String>,
}

impl OpenLedger {
    pub fn new(customer_name: impl Into<String>) -> Self {
        OpenLedger {
            customer_name: customer_name.into(),
            customer_id: None,
            notes: None,
        }
    }

    pub fn with_customer_id(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn validate(&self) -> ValidationResult<()> {
        validate_customer_name(&self.customer_name)?;
        if let Some(customer_id) = &self.customer_id {
            validate_uuid("customer_id", customer_id)?;
        }
        if let Some(notes) = &self.notes {
            validate_notes(notes)?;
        }
        Ok(())
    }

    /// Trimmed name, and notes with blank values dropped.
    pub(crate) fn normalized(&self) -> (String, Option<String>) {
        let notes = self
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        (self.customer_name.trim().to_string(), notes)
    }
}

/// Input for adding a line to a tab.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AddTabItem {
    pub product_id: String,
    pub quantity: f64,

    /// Overrides the product's current price.
    #[serde(default)]
    pub unit_price_cents: Option<i64>,
}

impl AddTabItem {
    pub fn new(product_id: impl Into<String>, quantity: f64) -> Self {
        AddTabItem {
            product_id: product_id.into(),
            quantity,
            unit_price_cents: None,
        }
    }

    pub fn validate(&self) -> ValidationResult<()> {
        require_product_id(&self.product_id)?;
        validate_quantity(self.quantity)?;
        if let Some(price) = self.unit_price_cents {
            validate_price_cents(price)?;
        }
        Ok(())
    }
}

/// Input for adding a line to a sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AddSaleItem {
    pub product_id: String,
    pub quantity: f64,

    /// Overrides the product's current price.
    #[serde(default)]
    pub unit_price_cents: Option<i64>,

    #[serde(default)]
    pub discount: Option<Discount>,
}

impl AddSaleItem {
    pub fn new(product_id: impl Into<String>, quantity: f64) -> Self {
        AddSaleItem {
            product_id: product_id.into(),
            quantity,
            unit_price_cents: None,
            discount: None,
        }
    }

    pub fn with_discount(mut self, discount: Discount) -> Self {
        self.discount = Some(discount);
        self
    }

    pub fn validate(&self) -> ValidationResult<()> {
        require_product_id(&self.product_id)?;
        validate_quantity(self.quantity)?;
        if let Some(price) = self.unit_price_cents {
            validate_price_cents(price)?;
        }
        if let Some(discount) = &self.discount {
            validate_discount(discount)?;
        }
        Ok(())
    }
}

/// Input for editing a sale line. Absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct EditSaleItem {
    #[serde(default)]
    pub quantity: Option<f64>,

    #[serde(default)]
    pub unit_price_cents: Option<i64>,

    #[serde(default)]
    pub discount: Option<Discount>,
}

impl EditSaleItem {
    pub fn validate(&self) -> ValidationResult<()> {
        if let Some(quantity) = self.quantity {
            validate_quantity(quantity)?;
        }
        if let Some(price) = self.unit_price_cents {
            validate_price_cents(price)?;
        }
        if let Some(discount) = &self.discount {
            validate_discount(discount)?;
        }
        Ok(())
    }
}

/// Input for a partial payment on a tab.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RegisterPayment {
    pub amount_cents: i64,

    #[serde(default)]
    pub method: PaymentMethod,
}

impl RegisterPayment {
    pub fn new(amount: Money) -> Self {
        RegisterPayment {
            amount_cents: amount.cents(),
            method: PaymentMethod::default(),
        }
    }

    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

/// Input for finalizing a sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FinalizeSale {
    /// Amount handed over by the customer (0 for credit sales).
    pub amount_paid_cents: i64,

    /// Keeps the method chosen at open when absent.
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

impl FinalizeSale {
    pub fn new(amount_paid: Money) -> Self {
        FinalizeSale {
            amount_paid_cents: amount_paid.cents(),
            payment_method: None,
        }
    }

    pub fn with_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = Some(method);
        self
    }

    pub fn amount_paid(&self) -> Money {
        Money::from_cents(self.amount_paid_cents)
    }
}

fn require_product_id(product_id: &str) -> ValidationResult<()> {
    if product_id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "product_id".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_ledger_validation() {
        assert!(OpenLedger::new("Mesa 4").validate().is_ok());
        assert!(OpenLedger::new("").validate().is_err());
        assert!(OpenLedger::new("Ana")
            .with_customer_id("not-a-uuid")
            .validate()
            .is_err());
        assert!(OpenLedger::new("Ana")
            .with_customer_id("550e8400-e29b-41d4-a716-446655440000")
            .validate()
            .is_ok());
    }

    #[test]
    fn test_open_ledger_normalization() {
        let input = OpenLedger::new("  Mesa 4 ").with_notes("   ");
        let (name, notes) = input.normalized();
        assert_eq!(name, "Mesa 4");
        assert!(notes.is_none());
    }

    #[test]
    fn test_inputs_deserialize_with_optional_fields() {
        let add: AddSaleItem =
            serde_json::from_str(r#"{"product_id":"p-1","quantity":2.5}"#).unwrap();
        assert!(add.unit_price_cents.is_none());
        assert!(add.discount.is_none());

        let pay: RegisterPayment = serde_json::from_str(r#"{"amount_cents":1650}"#).unwrap();
        assert_eq!(pay.method, PaymentMethod::Cash);
    }

    #[test]
    fn test_add_item_validation() {
        assert!(AddTabItem::new("p-1", 0.0).validate().is_err());
        assert!(AddTabItem::new("", 1.0).validate().is_err());
        assert!(AddSaleItem::new("p-1", 1.0)
            .with_discount(Discount::percentage(150.0))
            .validate()
            .is_err());
    }
}
