//! # Tab (Comanda)
//!
//! A running bill kept open while a customer consumes, then closed.
//!
//! ## Balance Equation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  total      = Σ subtotal (every line: unpaid, paid and waived)          │
//! │  waived     = Σ subtotal (waived lines)                                 │
//! │  billable   = total − waived                                            │
//! │  discount   = discount.amount_off(billable)                             │
//! │  paid       = Σ subtotal (paid lines) + Σ partial payments              │
//! │  remaining  = settle(billable − discount − paid)                        │
//! │                                                                         │
//! │  While not overpaid:                                                    │
//! │      paid + remaining + waived + discount == total                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lines are snapshots: name, price and cost are copied from the product
//! when the line is added and never follow later catalog changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::line::line_subtotal;
use super::{AddTabItem, OpenLedger};
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{Discount, DiscountKind, PaymentMethod, Product, TabStatus};
use crate::validation::{validate_discount, validate_ledger_size, validate_payment_amount};
use crate::PAYMENT_SLACK;

// =============================================================================
// Records
// =============================================================================

/// Tab header with its cached totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Tab {
    pub id: String,

    /// Human-facing number, unique and increasing.
    pub sequence_number: i64,

    pub customer_name: String,
    pub customer_id: Option<String>,
    pub notes: Option<String>,
    pub status: TabStatus,

    pub total_cents: i64,
    pub amount_paid_cents: i64,
    pub amount_remaining_cents: i64,
    pub waived_total_cents: i64,

    /// Discount as entered.
    pub discount_kind: DiscountKind,
    pub discount_value: i64,

    /// Discount as applied to the current billable amount.
    pub discount_cents: i64,

    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,

    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Tab {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    #[inline]
    pub fn amount_paid(&self) -> Money {
        Money::from_cents(self.amount_paid_cents)
    }

    #[inline]
    pub fn amount_remaining(&self) -> Money {
        Money::from_cents(self.amount_remaining_cents)
    }

    #[inline]
    pub fn waived_total(&self) -> Money {
        Money::from_cents(self.waived_total_cents)
    }

    #[inline]
    pub fn discount_amount(&self) -> Money {
        Money::from_cents(self.discount_cents)
    }

    pub fn discount(&self) -> Discount {
        Discount {
            kind: self.discount_kind,
            value: self.discount_value,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == TabStatus::Open
    }
}

/// One line on a tab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TabItem {
    pub id: String,
    pub tab_id: String,
    pub product_id: String,

    /// Product name at add time.
    pub product_name: String,

    pub quantity: f64,
    pub unit_price_cents: i64,
    pub unit_cost_cents: i64,

    /// `round2(quantity × unit_price)`, never negative.
    pub subtotal_cents: i64,

    /// Allocated to a payment. Paid and waived are mutually exclusive.
    pub paid: bool,

    /// Excused from billing (courtesy, spillage).
    pub waived: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl TabItem {
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    /// Unpaid and not waived.
    pub fn is_outstanding(&self) -> bool {
        !self.paid && !self.waived
    }
}

/// A partial payment against a tab's balance, not tied to any line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TabPayment {
    pub id: String,
    pub tab_id: String,
    pub amount_cents: i64,
    pub method: PaymentMethod,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl TabPayment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Aggregate
// =============================================================================

/// A tab with all of its lines and payments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TabLedger {
    pub tab: Tab,
    pub items: Vec<TabItem>,
    pub payments: Vec<TabPayment>,
}

impl TabLedger {
    /// Opens a new, empty tab.
    pub fn open(
        id: String,
        sequence_number: i64,
        input: &OpenLedger,
        now: DateTime<Utc>,
    ) -> CoreResult<Self> {
        input.validate()?;
        let (customer_name, notes) = input.normalized();

        Ok(TabLedger {
            tab: Tab {
                id,
                sequence_number,
                customer_name,
                customer_id: input.customer_id.clone(),
                notes,
                status: TabStatus::Open,
                total_cents: 0,
                amount_paid_cents: 0,
                amount_remaining_cents: 0,
                waived_total_cents: 0,
                discount_kind: DiscountKind::Fixed,
                discount_value: 0,
                discount_cents: 0,
                opened_at: now,
                closed_at: None,
                updated_at: now,
            },
            items: Vec::new(),
            payments: Vec::new(),
        })
    }

    /// Builds the aggregate from stored rows.
    pub fn from_parts(tab: Tab, items: Vec<TabItem>, payments: Vec<TabPayment>) -> Self {
        TabLedger {
            tab,
            items,
            payments,
        }
    }

    pub fn item(&self, item_id: &str) -> Option<&TabItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    /// Adds a line, snapshotting the product's name, price and cost.
    ///
    /// Stock is not checked here; a tab consumes stock only when it closes.
    pub fn add_item(
        &mut self,
        item_id: String,
        product: &Product,
        input: &AddTabItem,
        now: DateTime<Utc>,
    ) -> CoreResult<TabItem> {
        input.validate()?;
        self.ensure_open("add items")?;
        if !product.is_active {
            return Err(CoreError::not_found("Product", &product.id));
        }
        validate_ledger_size(self.items.len())?;

        let unit_price = input
            .unit_price_cents
            .map(Money::from_cents)
            .unwrap_or_else(|| product.price());
        let subtotal = line_subtotal(input.quantity, unit_price, &Discount::none());

        let item = TabItem {
            id: item_id,
            tab_id: self.tab.id.clone(),
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            quantity: input.quantity,
            unit_price_cents: unit_price.cents(),
            unit_cost_cents: product.cost().cents(),
            subtotal_cents: subtotal.cents(),
            paid: false,
            waived: false,
            created_at: now,
        };
        self.items.push(item.clone());
        self.touch(now);
        self.refresh_totals();
        Ok(item)
    }

    /// Removes an unpaid line.
    pub fn remove_item(&mut self, item_id: &str, now: DateTime<Utc>) -> CoreResult<TabItem> {
        self.ensure_open("remove items")?;
        let index = self
            .items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or_else(|| CoreError::not_found("Tab item", item_id))?;
        if self.items[index].paid {
            return Err(CoreError::ItemAlreadyPaid {
                item_id: item_id.to_string(),
            });
        }

        let removed = self.items.remove(index);
        self.touch(now);
        self.refresh_totals();
        Ok(removed)
    }

    /// Marks the given lines as paid and adds their subtotals to the amount
    /// paid. Ids that are unknown, already paid or waived are skipped.
    ///
    /// Returns the amount newly allocated.
    pub fn mark_paid(&mut self, item_ids: &[String], now: DateTime<Utc>) -> CoreResult<Money> {
        self.ensure_open("mark items paid")?;
        if item_ids.is_empty() {
            return Err(ValidationError::Required {
                field: "item_ids".to_string(),
            }
            .into());
        }

        let payable: Vec<usize> = self
            .items
            .iter()
            .enumerate()
            .filter(|(_, i)| i.is_outstanding() && item_ids.contains(&i.id))
            .map(|(index, _)| index)
            .collect();
        if payable.is_empty() {
            return Err(CoreError::NothingToPay {
                requested: item_ids.len(),
            });
        }

        let allocated: Money = payable.iter().map(|&i| self.items[i].subtotal()).sum();
        let remaining = self.tab.amount_remaining();
        if allocated > remaining + PAYMENT_SLACK {
            return Err(CoreError::PaymentExceedsBalance {
                amount: allocated,
                remaining,
            });
        }

        for index in payable {
            self.items[index].paid = true;
        }
        self.tab.amount_paid_cents += allocated.cents();
        self.touch(now);
        self.refresh_totals();
        Ok(allocated)
    }

    /// Excuses a line from billing. It stays on the tab and still consumes
    /// stock at close.
    ///
    /// Fails when payments already cover more than the tab would still owe
    /// without the line.
    pub fn waive(&mut self, item_id: &str, now: DateTime<Utc>) -> CoreResult<TabItem> {
        self.ensure_open("waive items")?;
        let index = self
            .items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or_else(|| CoreError::not_found("Tab item", item_id))?;
        let item = &self.items[index];
        if item.paid {
            return Err(CoreError::ItemAlreadyPaid {
                item_id: item_id.to_string(),
            });
        }
        if item.waived {
            return Err(CoreError::ItemAlreadyWaived {
                item_id: item_id.to_string(),
            });
        }

        let billable = self.tab.total() - self.tab.waived_total() - item.subtotal();
        let owed = billable - self.tab.discount().amount_off(billable);
        if self.tab.amount_paid() > owed + PAYMENT_SLACK {
            return Err(CoreError::WaiverExceedsBalance {
                item_id: item_id.to_string(),
                paid: self.tab.amount_paid(),
                owed,
            });
        }

        self.items[index].waived = true;
        let waived = self.items[index].clone();
        self.touch(now);
        self.refresh_totals();
        Ok(waived)
    }

    /// Sets the tab-level discount, replacing any previous one.
    pub fn apply_discount(&mut self, discount: Discount, now: DateTime<Utc>) -> CoreResult<()> {
        self.ensure_open("apply a discount")?;
        validate_discount(&discount)?;

        self.tab.discount_kind = discount.kind;
        self.tab.discount_value = discount.value;
        self.touch(now);
        self.refresh_totals();
        Ok(())
    }

    /// Records a partial payment against the balance.
    ///
    /// Up to [`PAYMENT_SLACK`] over the remaining balance is accepted; the
    /// remaining balance then settles at zero.
    pub fn register_payment(
        &mut self,
        payment_id: String,
        amount: Money,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> CoreResult<TabPayment> {
        self.ensure_open("register payments")?;
        validate_payment_amount(amount)?;

        let remaining = self.tab.amount_remaining();
        if amount > remaining + PAYMENT_SLACK {
            return Err(CoreError::PaymentExceedsBalance { amount, remaining });
        }

        let payment = TabPayment {
            id: payment_id,
            tab_id: self.tab.id.clone(),
            amount_cents: amount.cents(),
            method,
            created_at: now,
        };
        self.payments.push(payment.clone());
        self.tab.amount_paid_cents += amount.cents();
        self.touch(now);
        self.refresh_totals();
        Ok(payment)
    }

    /// Checks that the tab can close: open, has lines, nothing owed.
    pub fn ensure_closable(&self) -> CoreResult<()> {
        self.ensure_open("close")?;
        if self.items.is_empty() {
            return Err(CoreError::EmptyLedger {
                entity: "Tab",
                id: self.tab.id.clone(),
            });
        }
        if !self.tab.amount_remaining().is_settled() {
            return Err(CoreError::OutstandingBalance {
                tab_id: self.tab.id.clone(),
                remaining: self.tab.amount_remaining(),
            });
        }
        Ok(())
    }

    /// Closes the tab. Stock consumption is the caller's job and must happen
    /// in the same unit of work.
    pub fn close(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        self.ensure_closable()?;
        self.tab.status = TabStatus::Closed;
        self.tab.closed_at = Some(now);
        self.touch(now);
        Ok(())
    }

    /// Cancels an open tab. No stock effect.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        self.ensure_open("cancel")?;
        self.tab.status = TabStatus::Cancelled;
        self.tab.closed_at = Some(now);
        self.touch(now);
        Ok(())
    }

    /// Rebuilds every cached total from the lines and payments.
    ///
    /// Works in any status and is idempotent.
    pub fn recalculate(&mut self) {
        let from_items: Money = self
            .items
            .iter()
            .filter(|i| i.paid)
            .map(TabItem::subtotal)
            .sum();
        let from_payments: Money = self.payments.iter().map(TabPayment::amount).sum();
        self.tab.amount_paid_cents = (from_items + from_payments).cents();
        self.refresh_totals();
    }

    fn refresh_totals(&mut self) {
        let total: Money = self.items.iter().map(TabItem::subtotal).sum();
        let waived: Money = self
            .items
            .iter()
            .filter(|i| i.waived)
            .map(TabItem::subtotal)
            .sum();
        let billable = total - waived;
        let discount = self.tab.discount().amount_off(billable);
        let remaining = (billable - discount - self.tab.amount_paid()).settle();

        self.tab.total_cents = total.cents();
        self.tab.waived_total_cents = waived.cents();
        self.tab.discount_cents = discount.cents();
        self.tab.amount_remaining_cents = remaining.cents();
    }

    fn ensure_open(&self, operation: &'static str) -> CoreResult<()> {
        if self.tab.is_open() {
            return Ok(());
        }
        Err(CoreError::InvalidStatus {
            entity: "Tab",
            id: self.tab.id.clone(),
            status: self.tab.status.to_string(),
            operation,
        })
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.tab.updated_at = now;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn product(id: &str, name: &str, price_cents: i64) -> Product {
        let now = Utc::now();
        Product {
            id: id.to_string(),
            sku: id.to_uppercase(),
            name: name.to_string(),
            price_cents,
            cost_cents: price_cents / 2,
            track_inventory: true,
            allow_negative_stock: false,
            current_stock: Some(100.0),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn open_tab() -> TabLedger {
        TabLedger::open("tab-1".to_string(), 1, &OpenLedger::new("Mesa 4"), Utc::now()).unwrap()
    }

    fn add(tab: &mut TabLedger, item_id: &str, product: &Product, qty: f64) -> TabItem {
        tab.add_item(
            item_id.to_string(),
            product,
            &AddTabItem::new(product.id.clone(), qty),
            Utc::now(),
        )
        .unwrap()
    }

    fn assert_balanced(tab: &TabLedger) {
        let t = &tab.tab;
        assert_eq!(
            t.amount_paid() + t.amount_remaining() + t.waived_total() + t.discount_amount(),
            t.total(),
            "ledger does not balance: {:?}",
            t
        );
    }

    #[test]
    fn test_open_tab() {
        let tab = open_tab();
        assert_eq!(tab.tab.status, TabStatus::Open);
        assert_eq!(tab.tab.sequence_number, 1);
        assert_eq!(tab.tab.total(), Money::zero());
        assert!(tab.items.is_empty());
    }

    #[test]
    fn test_open_tab_requires_name() {
        let err = TabLedger::open("t".to_string(), 1, &OpenLedger::new(" "), Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_add_item_snapshots_product() {
        let mut tab = open_tab();
        let mut beer = product("beer", "Beer", 1000);
        let item = add(&mut tab, "i-1", &beer, 2.0);

        beer.price_cents = 1500;
        beer.name = "Craft Beer".to_string();

        assert_eq!(item.product_name, "Beer");
        assert_eq!(item.unit_price_cents, 1000);
        assert_eq!(item.unit_cost_cents, 500);
        assert_eq!(item.subtotal_cents, 2000);
        assert_eq!(tab.tab.total_cents, 2000);
        assert_eq!(tab.tab.amount_remaining_cents, 2000);
    }

    #[test]
    fn test_add_item_price_override() {
        let mut tab = open_tab();
        let beer = product("beer", "Beer", 1000);
        let mut input = AddTabItem::new("beer", 1.0);
        input.unit_price_cents = Some(800);
        let item = tab.add_item("i-1".to_string(), &beer, &input, Utc::now()).unwrap();
        assert_eq!(item.subtotal_cents, 800);
    }

    #[test]
    fn test_add_item_price_override_above_ceiling() {
        let mut tab = open_tab();
        let beer = product("beer", "Beer", 1000);
        add(&mut tab, "i-1", &beer, 1.0);

        let mut input = AddTabItem::new("beer", 999.0);
        input.unit_price_cents = Some(i64::MAX);
        let err = tab.add_item("i-2".to_string(), &beer, &input, Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(tab.items.len(), 1);
        assert_eq!(tab.tab.total_cents, 1000);
    }

    #[test]
    fn test_add_item_inactive_product_not_found() {
        let mut tab = open_tab();
        let mut beer = product("beer", "Beer", 1000);
        beer.is_active = false;
        let err = tab
            .add_item("i-1".to_string(), &beer, &AddTabItem::new("beer", 1.0), Utc::now())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_remove_item() {
        let mut tab = open_tab();
        let beer = product("beer", "Beer", 1000);
        add(&mut tab, "i-1", &beer, 1.0);
        add(&mut tab, "i-2", &beer, 1.0);

        tab.remove_item("i-1", Utc::now()).unwrap();
        assert_eq!(tab.items.len(), 1);
        assert_eq!(tab.tab.total_cents, 1000);

        let err = tab.remove_item("missing", Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_remove_paid_item_conflicts() {
        let mut tab = open_tab();
        let beer = product("beer", "Beer", 1000);
        add(&mut tab, "i-1", &beer, 1.0);
        tab.mark_paid(&["i-1".to_string()], Utc::now()).unwrap();

        let err = tab.remove_item("i-1", Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::ItemAlreadyPaid { .. }));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_mark_paid_skips_ineligible() {
        let mut tab = open_tab();
        let beer = product("beer", "Beer", 1000);
        add(&mut tab, "i-1", &beer, 1.0);
        add(&mut tab, "i-2", &beer, 1.0);
        tab.waive("i-2", Utc::now()).unwrap();

        let allocated = tab
            .mark_paid(&["i-1".to_string(), "i-2".to_string(), "nope".to_string()], Utc::now())
            .unwrap();
        assert_eq!(allocated.cents(), 1000);
        assert_eq!(tab.tab.amount_paid_cents, 1000);
        assert!(tab.tab.amount_remaining().is_zero());
        assert_balanced(&tab);

        // Nothing left to pay
        let err = tab.mark_paid(&["i-1".to_string()], Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::NothingToPay { requested: 1 }));
    }

    #[test]
    fn test_waive_rules() {
        let mut tab = open_tab();
        let beer = product("beer", "Beer", 1000);
        add(&mut tab, "i-1", &beer, 1.0);
        add(&mut tab, "i-2", &beer, 1.0);

        tab.waive("i-1", Utc::now()).unwrap();
        assert_eq!(tab.tab.waived_total_cents, 1000);
        assert_eq!(tab.tab.total_cents, 2000);
        assert_eq!(tab.tab.amount_remaining_cents, 1000);

        assert!(matches!(
            tab.waive("i-1", Utc::now()).unwrap_err(),
            CoreError::ItemAlreadyWaived { .. }
        ));

        tab.mark_paid(&["i-2".to_string()], Utc::now()).unwrap();
        assert!(matches!(
            tab.waive("i-2", Utc::now()).unwrap_err(),
            CoreError::ItemAlreadyPaid { .. }
        ));
        assert_balanced(&tab);
    }

    #[test]
    fn test_mark_paid_after_payments_settled_the_tab() {
        let mut tab = open_tab();
        let beer = product("beer", "Beer", 1000);
        add(&mut tab, "i-1", &beer, 1.0);
        add(&mut tab, "i-2", &beer, 1.0);
        tab.register_payment("p-1".to_string(), Money::from_cents(2000), PaymentMethod::Cash, Utc::now())
            .unwrap();

        let err = tab
            .mark_paid(&["i-1".to_string(), "i-2".to_string()], Utc::now())
            .unwrap_err();
        assert!(matches!(err, CoreError::PaymentExceedsBalance { .. }));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(tab.items.iter().all(|i| !i.paid));
        assert_eq!(tab.tab.amount_paid_cents, 2000);
        assert_balanced(&tab);
    }

    #[test]
    fn test_mark_paid_covers_what_partial_payments_left() {
        let mut tab = open_tab();
        let beer = product("beer", "Beer", 1000);
        add(&mut tab, "i-1", &beer, 1.0);
        add(&mut tab, "i-2", &beer, 1.0);
        tab.register_payment("p-1".to_string(), Money::from_cents(1000), PaymentMethod::Cash, Utc::now())
            .unwrap();

        // Both lines would allocate $20.00 against $10.00 owed
        assert!(tab
            .mark_paid(&["i-1".to_string(), "i-2".to_string()], Utc::now())
            .is_err());

        tab.mark_paid(&["i-2".to_string()], Utc::now()).unwrap();
        assert!(tab.tab.amount_remaining().is_zero());
        assert_eq!(tab.tab.amount_paid_cents, 2000);
        assert_balanced(&tab);
        tab.close(Utc::now()).unwrap();
    }

    #[test]
    fn test_waive_after_balance_paid_is_rejected() {
        let mut tab = open_tab();
        let beer = product("beer", "Beer", 1000);
        let snack = product("snack", "Snack", 500);
        add(&mut tab, "i-1", &beer, 1.0);
        add(&mut tab, "i-2", &snack, 1.0);
        tab.register_payment("p-1".to_string(), Money::from_cents(1500), PaymentMethod::Cash, Utc::now())
            .unwrap();

        let err = tab.waive("i-2", Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::WaiverExceedsBalance { .. }));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(!tab.items[1].waived);
        assert_eq!(tab.tab.waived_total_cents, 0);
        assert_balanced(&tab);
    }

    #[test]
    fn test_waive_allowed_while_payments_stay_within_balance() {
        let mut tab = open_tab();
        let beer = product("beer", "Beer", 1000);
        let snack = product("snack", "Snack", 500);
        add(&mut tab, "i-1", &beer, 1.0);
        add(&mut tab, "i-2", &snack, 1.0);
        tab.register_payment("p-1".to_string(), Money::from_cents(1000), PaymentMethod::Cash, Utc::now())
            .unwrap();

        tab.waive("i-2", Utc::now()).unwrap();
        assert!(tab.tab.amount_remaining().is_zero());
        assert_eq!(tab.tab.waived_total_cents, 500);
        assert_balanced(&tab);
    }

    #[test]
    fn test_discount_on_billable_amount() {
        let mut tab = open_tab();
        let beer = product("beer", "Beer", 1000);
        add(&mut tab, "i-1", &beer, 2.0);
        add(&mut tab, "i-2", &beer, 1.0);
        tab.waive("i-2", Utc::now()).unwrap();

        tab.apply_discount(Discount::percentage(10.0), Utc::now()).unwrap();
        assert_eq!(tab.tab.discount_cents, 200);
        assert_eq!(tab.tab.amount_remaining_cents, 1800);
        assert_balanced(&tab);

        // Replacing the discount
        tab.apply_discount(Discount::fixed(Money::from_cents(500)), Utc::now()).unwrap();
        assert_eq!(tab.tab.discount_cents, 500);
        assert_eq!(tab.tab.amount_remaining_cents, 1500);
    }

    #[test]
    fn test_partial_payments() {
        let mut tab = open_tab();
        let beer = product("beer", "Beer", 1000);
        add(&mut tab, "i-1", &beer, 3.0);

        tab.register_payment("p-1".to_string(), Money::from_cents(1000), PaymentMethod::Cash, Utc::now())
            .unwrap();
        assert_eq!(tab.tab.amount_remaining_cents, 2000);
        assert_balanced(&tab);

        let err = tab
            .register_payment("p-2".to_string(), Money::from_cents(2002), PaymentMethod::Card, Utc::now())
            .unwrap_err();
        assert!(matches!(err, CoreError::PaymentExceedsBalance { .. }));
        assert_eq!(tab.payments.len(), 1);

        // One cent of slack, remaining settles at zero
        tab.register_payment("p-3".to_string(), Money::from_cents(2001), PaymentMethod::Card, Utc::now())
            .unwrap();
        assert!(tab.tab.amount_remaining().is_zero());
        assert_eq!(tab.tab.amount_paid_cents, 3001);
    }

    #[test]
    fn test_payment_must_be_positive() {
        let mut tab = open_tab();
        let beer = product("beer", "Beer", 1000);
        add(&mut tab, "i-1", &beer, 1.0);
        let err = tab
            .register_payment("p".to_string(), Money::zero(), PaymentMethod::Cash, Utc::now())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_close_requires_items_and_settled_balance() {
        let mut tab = open_tab();
        assert!(matches!(
            tab.close(Utc::now()).unwrap_err(),
            CoreError::EmptyLedger { .. }
        ));

        let beer = product("beer", "Beer", 1000);
        add(&mut tab, "i-1", &beer, 1.0);
        let err = tab.close(Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::OutstandingBalance { .. }));
        assert_eq!(err.kind(), ErrorKind::Validation);

        tab.mark_paid(&["i-1".to_string()], Utc::now()).unwrap();
        tab.close(Utc::now()).unwrap();
        assert_eq!(tab.tab.status, TabStatus::Closed);
        assert!(tab.tab.closed_at.is_some());
    }

    #[test]
    fn test_terminal_tab_rejects_mutations() {
        let mut tab = open_tab();
        let beer = product("beer", "Beer", 1000);
        add(&mut tab, "i-1", &beer, 1.0);
        tab.cancel(Utc::now()).unwrap();

        let errors = [
            tab.add_item("i-2".to_string(), &beer, &AddTabItem::new("beer", 1.0), Utc::now())
                .unwrap_err(),
            tab.remove_item("i-1", Utc::now()).unwrap_err(),
            tab.waive("i-1", Utc::now()).unwrap_err(),
            tab.cancel(Utc::now()).unwrap_err(),
            tab.close(Utc::now()).unwrap_err(),
        ];
        for err in errors {
            assert_eq!(err.kind(), ErrorKind::Conflict, "{err}");
        }
    }

    #[test]
    fn test_mixed_waived_and_paid_closes() {
        // Beer $10 paid, Snack $5 waived.
        let mut tab = open_tab();
        let beer = product("beer", "Beer", 1000);
        let snack = product("snack", "Snack", 500);
        add(&mut tab, "i-1", &beer, 1.0);
        add(&mut tab, "i-2", &snack, 1.0);

        tab.waive("i-2", Utc::now()).unwrap();
        tab.mark_paid(&["i-1".to_string()], Utc::now()).unwrap();

        assert_eq!(tab.tab.total_cents, 1500);
        assert_eq!(tab.tab.waived_total_cents, 500);
        assert!(tab.tab.amount_remaining().is_zero());
        assert_balanced(&tab);
        tab.close(Utc::now()).unwrap();
    }

    #[test]
    fn test_recalculate_is_idempotent() {
        let mut tab = open_tab();
        let beer = product("beer", "Beer", 1000);
        add(&mut tab, "i-1", &beer, 2.0);
        add(&mut tab, "i-2", &beer, 1.0);
        tab.mark_paid(&["i-2".to_string()], Utc::now()).unwrap();
        tab.register_payment("p-1".to_string(), Money::from_cents(500), PaymentMethod::Cash, Utc::now())
            .unwrap();

        let before = tab.clone();
        // Corrupt the cache, then rebuild it
        tab.tab.total_cents = 0;
        tab.tab.amount_paid_cents = 12345;
        tab.tab.amount_remaining_cents = -1;
        tab.recalculate();
        assert_eq!(tab, before);
        tab.recalculate();
        assert_eq!(tab, before);
    }
}
