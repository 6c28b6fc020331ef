//! # Sale (Venda)
//!
//! A single-shot counter transaction: items go in, the sale is finalized
//! with one payment, stock goes out.
//!
//! ```text
//! subtotal  = Σ line subtotal (line discounts already applied)
//! discount  = discount.amount_off(subtotal)
//! total     = subtotal − discount
//!
//! at finalize:
//! remaining = max(total − paid, 0)     (owed on credit)
//! change    = max(paid − total, 0)     (handed back)
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::line::line_subtotal;
use super::{AddSaleItem, EditSaleItem, FinalizeSale, OpenLedger};
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Discount, DiscountKind, PaymentMethod, Product, SaleStatus};
use crate::validation::{validate_amount_tendered, validate_discount, validate_ledger_size};

/// Sale header with its cached totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub sequence_number: i64,
    pub customer_name: String,
    pub customer_id: Option<String>,
    pub notes: Option<String>,
    pub status: SaleStatus,

    pub subtotal_cents: i64,
    pub discount_kind: DiscountKind,
    pub discount_value: i64,
    pub discount_cents: i64,
    pub total_cents: i64,

    /// Amount tendered; zero until finalized.
    pub amount_paid_cents: i64,
    pub amount_remaining_cents: i64,
    pub change_cents: i64,
    pub payment_method: PaymentMethod,

    #[ts(as = "String")]
    pub opened_at: DateTime<Utc>,

    #[ts(as = "Option<String>")]
    pub closed_at: Option<DateTime<Utc>>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

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
    pub fn change(&self) -> Money {
        Money::from_cents(self.change_cents)
    }

    pub fn discount(&self) -> Discount {
        Discount {
            kind: self.discount_kind,
            value: self.discount_value,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == SaleStatus::Open
    }
}

/// One line on a sale, with its own optional discount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: f64,
    pub unit_price_cents: i64,
    pub unit_cost_cents: i64,
    pub discount_kind: DiscountKind,
    pub discount_value: i64,
    pub subtotal_cents: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl SaleItem {
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    pub fn discount(&self) -> Discount {
        Discount {
            kind: self.discount_kind,
            value: self.discount_value,
        }
    }

    fn recompute(&mut self) {
        self.subtotal_cents = line_subtotal(
            self.quantity,
            Money::from_cents(self.unit_price_cents),
            &self.discount(),
        )
        .cents();
    }
}

/// A sale with all of its lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleLedger {
    pub sale: Sale,
    pub items: Vec<SaleItem>,
}

impl SaleLedger {
    /// Opens a new, empty sale paid in cash unless told otherwise at finalize.
    pub fn open(
        id: String,
        sequence_number: i64,
        input: &OpenLedger,
        now: DateTime<Utc>,
    ) -> CoreResult<Self> {
        input.validate()?;
        let (customer_name, notes) = input.normalized();

        Ok(SaleLedger {
            sale: Sale {
                id,
                sequence_number,
                customer_name,
                customer_id: input.customer_id.clone(),
                notes,
                status: SaleStatus::Open,
                subtotal_cents: 0,
                discount_kind: DiscountKind::Fixed,
                discount_value: 0,
                discount_cents: 0,
                total_cents: 0,
                amount_paid_cents: 0,
                amount_remaining_cents: 0,
                change_cents: 0,
                payment_method: PaymentMethod::default(),
                opened_at: now,
                closed_at: None,
                updated_at: now,
            },
            items: Vec::new(),
        })
    }

    pub fn from_parts(sale: Sale, items: Vec<SaleItem>) -> Self {
        SaleLedger { sale, items }
    }

    pub fn item(&self, item_id: &str) -> Option<&SaleItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    /// Adds a line, snapshotting the product's name, price and cost.
    pub fn add_item(
        &mut self,
        item_id: String,
        product: &Product,
        input: &AddSaleItem,
        now: DateTime<Utc>,
    ) -> CoreResult<SaleItem> {
        input.validate()?;
        self.ensure_open("add items")?;
        if !product.is_active {
            return Err(CoreError::not_found("Product", &product.id));
        }
        validate_ledger_size(self.items.len())?;

        let discount = input.discount.unwrap_or_default();
        let mut item = SaleItem {
            id: item_id,
            sale_id: self.sale.id.clone(),
            product_id: product.id.clone(),
            product_name: product.name.clone(),
            quantity: input.quantity,
            unit_price_cents: input.unit_price_cents.unwrap_or(product.price_cents),
            unit_cost_cents: product.cost().cents(),
            discount_kind: discount.kind,
            discount_value: discount.value,
            subtotal_cents: 0,
            created_at: now,
        };
        item.recompute();

        self.items.push(item.clone());
        self.touch(now);
        self.refresh_totals();
        Ok(item)
    }

    /// Changes quantity, price or discount of a line and recomputes it.
    pub fn edit_item(
        &mut self,
        item_id: &str,
        input: &EditSaleItem,
        now: DateTime<Utc>,
    ) -> CoreResult<SaleItem> {
        input.validate()?;
        self.ensure_open("edit items")?;
        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or_else(|| CoreError::not_found("Sale item", item_id))?;

        if let Some(quantity) = input.quantity {
            item.quantity = quantity;
        }
        if let Some(price) = input.unit_price_cents {
            item.unit_price_cents = price;
        }
        if let Some(discount) = input.discount {
            item.discount_kind = discount.kind;
            item.discount_value = discount.value;
        }
        item.recompute();
        let edited = item.clone();

        self.touch(now);
        self.refresh_totals();
        Ok(edited)
    }

    pub fn remove_item(&mut self, item_id: &str, now: DateTime<Utc>) -> CoreResult<SaleItem> {
        self.ensure_open("remove items")?;
        let index = self
            .items
            .iter()
            .position(|i| i.id == item_id)
            .ok_or_else(|| CoreError::not_found("Sale item", item_id))?;

        let removed = self.items.remove(index);
        self.touch(now);
        self.refresh_totals();
        Ok(removed)
    }

    /// Sets the sale-level discount, replacing any previous one.
    pub fn apply_discount(&mut self, discount: Discount, now: DateTime<Utc>) -> CoreResult<()> {
        self.ensure_open("apply a discount")?;
        validate_discount(&discount)?;

        self.sale.discount_kind = discount.kind;
        self.sale.discount_value = discount.value;
        self.touch(now);
        self.refresh_totals();
        Ok(())
    }

    /// Checks everything finalize needs before stock is touched.
    pub fn ensure_finalizable(&self, input: &FinalizeSale) -> CoreResult<()> {
        self.ensure_open("finalize")?;
        if self.items.is_empty() {
            return Err(CoreError::EmptyLedger {
                entity: "Sale",
                id: self.sale.id.clone(),
            });
        }
        validate_amount_tendered(input.amount_paid())?;
        Ok(())
    }

    /// Settles the sale with the amount tendered.
    ///
    /// Underpayment is allowed (the rest is owed on credit); overpayment
    /// becomes change. Stock consumption is the caller's job and must happen
    /// in the same unit of work.
    pub fn finalize(&mut self, input: &FinalizeSale, now: DateTime<Utc>) -> CoreResult<()> {
        self.ensure_finalizable(input)?;

        let paid = input.amount_paid();
        let total = self.sale.total();
        self.sale.amount_paid_cents = paid.cents();
        self.sale.amount_remaining_cents = (total - paid).settle().cents();
        self.sale.change_cents = (paid - total).clamp_non_negative().cents();
        if let Some(method) = input.payment_method {
            self.sale.payment_method = method;
        }
        self.sale.status = SaleStatus::Finalized;
        self.sale.closed_at = Some(now);
        self.touch(now);
        Ok(())
    }

    /// Cancels an open sale. No stock effect.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> CoreResult<()> {
        self.ensure_open("cancel")?;
        self.sale.status = SaleStatus::Cancelled;
        self.sale.closed_at = Some(now);
        self.touch(now);
        Ok(())
    }

    fn refresh_totals(&mut self) {
        let subtotal: Money = self.items.iter().map(SaleItem::subtotal).sum();
        let discount = self.sale.discount().amount_off(subtotal);
        let total = (subtotal - discount).clamp_non_negative();

        self.sale.subtotal_cents = subtotal.cents();
        self.sale.discount_cents = discount.cents();
        self.sale.total_cents = total.cents();
        self.sale.amount_remaining_cents = (total - self.sale.amount_paid()).settle().cents();
    }

    fn ensure_open(&self, operation: &'static str) -> CoreResult<()> {
        if self.sale.is_open() {
            return Ok(());
        }
        Err(CoreError::InvalidStatus {
            entity: "Sale",
            id: self.sale.id.clone(),
            status: self.sale.status.to_string(),
            operation,
        })
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.sale.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn product(id: &str, price_cents: i64) -> Product {
        let now = Utc::now();
        Product {
            id: id.to_string(),
            sku: id.to_uppercase(),
            name: format!("Product {id}"),
            price_cents,
            cost_cents: 100,
            track_inventory: true,
            allow_negative_stock: false,
            current_stock: Some(10.0),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn open_sale() -> SaleLedger {
        SaleLedger::open("sale-1".to_string(), 7, &OpenLedger::new("Balcão"), Utc::now()).unwrap()
    }

    #[test]
    fn test_add_item_with_line_discount() {
        let mut sale = open_sale();
        let p = product("p", 400);
        let item = sale
            .add_item(
                "i-1".to_string(),
                &p,
                &AddSaleItem::new("p", 3.0).with_discount(Discount::percentage(10.0)),
                Utc::now(),
            )
            .unwrap();

        assert_eq!(item.subtotal_cents, 1080);
        assert_eq!(item.unit_cost_cents, p.cost().cents());
        assert_eq!(sale.sale.subtotal_cents, 1080);
        assert_eq!(sale.sale.total_cents, 1080);
    }

    #[test]
    fn test_edit_item_recomputes() {
        let mut sale = open_sale();
        let p = product("p", 400);
        sale.add_item("i-1".to_string(), &p, &AddSaleItem::new("p", 1.0), Utc::now())
            .unwrap();

        let edit = EditSaleItem {
            quantity: Some(2.0),
            discount: Some(Discount::fixed(Money::from_cents(100))),
            ..Default::default()
        };
        let item = sale.edit_item("i-1", &edit, Utc::now()).unwrap();
        assert_eq!(item.subtotal_cents, 700);
        assert_eq!(sale.sale.total_cents, 700);

        let err = sale.edit_item("nope", &edit, Utc::now()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_sale_discount_and_remove() {
        let mut sale = open_sale();
        let p = product("p", 1000);
        sale.add_item("i-1".to_string(), &p, &AddSaleItem::new("p", 1.0), Utc::now())
            .unwrap();
        sale.add_item("i-2".to_string(), &p, &AddSaleItem::new("p", 1.0), Utc::now())
            .unwrap();

        sale.apply_discount(Discount::percentage(25.0), Utc::now()).unwrap();
        assert_eq!(sale.sale.subtotal_cents, 2000);
        assert_eq!(sale.sale.discount_cents, 500);
        assert_eq!(sale.sale.total_cents, 1500);

        sale.remove_item("i-2", Utc::now()).unwrap();
        assert_eq!(sale.sale.discount_cents, 250);
        assert_eq!(sale.sale.total_cents, 750);
    }

    #[test]
    fn test_finalize_with_change() {
        // 2 × $4.00 with 10% off the line = $7.20, paid $10.00
        let mut sale = open_sale();
        let p = product("p", 400);
        sale.add_item(
            "i-1".to_string(),
            &p,
            &AddSaleItem::new("p", 2.0).with_discount(Discount::percentage(10.0)),
            Utc::now(),
        )
        .unwrap();

        sale.finalize(&FinalizeSale::new(Money::from_cents(1000)), Utc::now())
            .unwrap();
        assert_eq!(sale.sale.status, SaleStatus::Finalized);
        assert_eq!(sale.sale.total_cents, 720);
        assert_eq!(sale.sale.change_cents, 280);
        assert_eq!(sale.sale.amount_remaining_cents, 0);
        assert!(sale.sale.closed_at.is_some());
    }

    #[test]
    fn test_finalize_underpaid_on_credit() {
        let mut sale = open_sale();
        let p = product("p", 1000);
        sale.add_item("i-1".to_string(), &p, &AddSaleItem::new("p", 1.0), Utc::now())
            .unwrap();

        sale.finalize(
            &FinalizeSale::new(Money::zero()).with_method(PaymentMethod::Credit),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(sale.sale.amount_remaining_cents, 1000);
        assert_eq!(sale.sale.change_cents, 0);
        assert_eq!(sale.sale.payment_method, PaymentMethod::Credit);
    }

    #[test]
    fn test_finalize_rules() {
        let mut sale = open_sale();
        let err = sale
            .finalize(&FinalizeSale::new(Money::zero()), Utc::now())
            .unwrap_err();
        assert!(matches!(err, CoreError::EmptyLedger { .. }));

        let p = product("p", 1000);
        sale.add_item("i-1".to_string(), &p, &AddSaleItem::new("p", 1.0), Utc::now())
            .unwrap();
        let err = sale
            .finalize(&FinalizeSale::new(Money::from_cents(-1)), Utc::now())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        sale.finalize(&FinalizeSale::new(Money::from_cents(1000)), Utc::now())
            .unwrap();
        let err = sale
            .finalize(&FinalizeSale::new(Money::from_cents(1000)), Utc::now())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(sale.cancel(Utc::now()).unwrap_err().kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_cancel_open_sale() {
        let mut sale = open_sale();
        sale.cancel(Utc::now()).unwrap();
        assert_eq!(sale.sale.status, SaleStatus::Cancelled);
        let p = product("p", 1000);
        let err = sale
            .add_item("i-1".to_string(), &p, &AddSaleItem::new("p", 1.0), Utc::now())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
