//! # Sale Repository
//!
//! Transactional operations on sales (vendas).
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. OPEN                                                               │
//! │     └── open() → Sale { status: Open, number: next sale number }       │
//! │                                                                         │
//! │  2. ITEMS                                                              │
//! │     └── add_item() / edit_item() / remove_item() / apply_discount()    │
//! │     └── every call recomputes subtotal, discount and total             │
//! │                                                                         │
//! │  3. FINALIZE (one transaction)                                         │
//! │     └── decrement stock for every line                                 │
//! │     └── amount paid, remaining (credit), change                        │
//! │     └── Sale { status: Finalized }                                     │
//! │                                                                         │
//! │  4. (OPTIONAL) CANCEL while open                                       │
//! │     └── Sale { status: Cancelled }, no stock effect                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Mutations follow the same unit of work as tabs: lock the sale row, load
//! it fresh, apply, save, commit.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::inventory::InventoryAdjustment;
use super::product::find_product;
use super::sequence::{next_value, SequenceKind};
use crate::error::{DbError, DbResult};
use tally_core::{
    AddSaleItem, Discount, EditSaleItem, FinalizeSale, OpenLedger, Sale, SaleItem, SaleLedger,
    SaleStatus,
};

const SALE_COLUMNS: &str = r#"
    id, sequence_number, customer_name, customer_id, notes, status,
    subtotal_cents, discount_kind, discount_value, discount_cents, total_cents,
    amount_paid_cents, amount_remaining_cents, change_cents, payment_method,
    opened_at, closed_at, updated_at
"#;

const SALE_ITEM_COLUMNS: &str = r#"
    id, sale_id, product_id, product_name, quantity,
    unit_price_cents, unit_cost_cents, discount_kind, discount_value,
    subtotal_cents, created_at
"#;

/// Repository for sale operations.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
    inventory: Arc<dyn InventoryAdjustment>,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool, inventory: Arc<dyn InventoryAdjustment>) -> Self {
        SaleRepository { pool, inventory }
    }

    /// Gets a sale with its lines.
    pub async fn get(&self, sale_id: &str) -> DbResult<SaleLedger> {
        let mut conn = self.pool.acquire().await?;
        load_sale(&mut conn, sale_id)
            .await?
            .ok_or_else(|| DbError::not_found("Sale", sale_id))
    }

    /// Lists sale headers, newest first, optionally filtered by status.
    pub async fn list(&self, status: Option<SaleStatus>) -> DbResult<Vec<Sale>> {
        debug!(status = ?status, "Listing sales");

        let sales = match status {
            Some(status) => {
                sqlx::query_as::<_, Sale>(&format!(
                    "SELECT {SALE_COLUMNS} FROM sales WHERE status = ?1 ORDER BY sequence_number DESC"
                ))
                .bind(status)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Sale>(&format!(
                    "SELECT {SALE_COLUMNS} FROM sales ORDER BY sequence_number DESC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(sales)
    }

    /// Opens a new sale with the next sale number.
    pub async fn open(&self, input: &OpenLedger) -> DbResult<SaleLedger> {
        input.validate()?;

        let mut tx = self.pool.begin().await?;
        let sequence_number = next_value(&mut tx, SequenceKind::Sale).await?;
        let ledger = SaleLedger::open(
            Uuid::new_v4().to_string(),
            sequence_number,
            input,
            Utc::now(),
        )?;
        insert_sale(&mut tx, &ledger.sale).await?;
        tx.commit().await?;

        info!(sale_id = %ledger.sale.id, sequence_number, "Sale opened");
        Ok(ledger)
    }

    /// Adds a line priced from the product unless a price override is given.
    pub async fn add_item(&self, sale_id: &str, input: &AddSaleItem) -> DbResult<SaleLedger> {
        input.validate()?;
        debug!(sale_id = %sale_id, product_id = %input.product_id, quantity = input.quantity, "Adding sale item");

        let mut tx = self.pool.begin().await?;
        let mut ledger = lock_sale(&mut tx, sale_id).await?;
        let product = find_product(&mut tx, &input.product_id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", &input.product_id))?;

        if !product.has_stock_for(input.quantity) {
            warn!(
                sale_id = %sale_id,
                product_id = %product.id,
                stock = ?product.current_stock,
                quantity = input.quantity,
                "Low stock for sale item"
            );
        }

        ledger.add_item(Uuid::new_v4().to_string(), &product, input, Utc::now())?;
        save_sale(&mut tx, &ledger).await?;
        tx.commit().await?;

        Ok(ledger)
    }

    /// Edits quantity, price or discount of a line.
    pub async fn edit_item(
        &self,
        sale_id: &str,
        item_id: &str,
        input: &EditSaleItem,
    ) -> DbResult<SaleLedger> {
        input.validate()?;
        debug!(sale_id = %sale_id, item_id = %item_id, "Editing sale item");

        let mut tx = self.pool.begin().await?;
        let mut ledger = lock_sale(&mut tx, sale_id).await?;
        ledger.edit_item(item_id, input, Utc::now())?;
        save_sale(&mut tx, &ledger).await?;
        tx.commit().await?;

        Ok(ledger)
    }

    pub async fn remove_item(&self, sale_id: &str, item_id: &str) -> DbResult<SaleLedger> {
        debug!(sale_id = %sale_id, item_id = %item_id, "Removing sale item");

        let mut tx = self.pool.begin().await?;
        let mut ledger = lock_sale(&mut tx, sale_id).await?;
        let removed = ledger.remove_item(item_id, Utc::now())?;

        sqlx::query("DELETE FROM sale_items WHERE id = ?1 AND sale_id = ?2")
            .bind(&removed.id)
            .bind(sale_id)
            .execute(&mut *tx)
            .await?;
        save_sale(&mut tx, &ledger).await?;
        tx.commit().await?;

        Ok(ledger)
    }

    /// Replaces the sale-level discount.
    pub async fn apply_discount(&self, sale_id: &str, discount: Discount) -> DbResult<SaleLedger> {
        debug!(sale_id = %sale_id, kind = ?discount.kind, value = discount.value, "Applying sale discount");

        let mut tx = self.pool.begin().await?;
        let mut ledger = lock_sale(&mut tx, sale_id).await?;
        ledger.apply_discount(discount, Utc::now())?;
        save_sale(&mut tx, &ledger).await?;
        tx.commit().await?;

        Ok(ledger)
    }

    /// Finalizes the sale and consumes stock for every line.
    ///
    /// The inventory port decides what untracked products mean (the default
    /// one skips them). Any failure leaves the sale open and stock untouched.
    pub async fn finalize(&self, sale_id: &str, input: &FinalizeSale) -> DbResult<SaleLedger> {
        debug!(sale_id = %sale_id, amount_paid = %input.amount_paid(), "Finalizing sale");

        let mut tx = self.pool.begin().await?;
        let mut ledger = lock_sale(&mut tx, sale_id).await?;
        ledger.ensure_finalizable(input)?;

        for item in &ledger.items {
            self.inventory
                .decrement(&mut tx, &item.product_id, item.quantity)
                .await?;
        }

        ledger.finalize(input, Utc::now())?;
        save_sale(&mut tx, &ledger).await?;
        tx.commit().await?;

        info!(
            sale_id = %sale_id,
            total = %ledger.sale.total(),
            paid = %ledger.sale.amount_paid(),
            remaining = %ledger.sale.amount_remaining(),
            change = %ledger.sale.change(),
            "Sale finalized"
        );
        Ok(ledger)
    }

    /// Cancels an open sale. No stock effect.
    pub async fn cancel(&self, sale_id: &str) -> DbResult<SaleLedger> {
        let mut tx = self.pool.begin().await?;
        let mut ledger = lock_sale(&mut tx, sale_id).await?;
        ledger.cancel(Utc::now())?;
        save_sale(&mut tx, &ledger).await?;
        tx.commit().await?;

        info!(sale_id = %sale_id, "Sale cancelled");
        Ok(ledger)
    }
}

// =============================================================================
// Row Access
// =============================================================================

/// Takes the write lock on a sale row and loads the aggregate.
async fn lock_sale(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<SaleLedger> {
    let touched = sqlx::query("UPDATE sales SET updated_at = updated_at WHERE id = ?1")
        .bind(sale_id)
        .execute(&mut *conn)
        .await?;
    if touched.rows_affected() == 0 {
        return Err(DbError::not_found("Sale", sale_id));
    }

    load_sale(conn, sale_id)
        .await?
        .ok_or_else(|| DbError::not_found("Sale", sale_id))
}

async fn load_sale(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Option<SaleLedger>> {
    let sale = sqlx::query_as::<_, Sale>(&format!("SELECT {SALE_COLUMNS} FROM sales WHERE id = ?1"))
        .bind(sale_id)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(sale) = sale else {
        return Ok(None);
    };

    let items = sqlx::query_as::<_, SaleItem>(&format!(
        "SELECT {SALE_ITEM_COLUMNS} FROM sale_items WHERE sale_id = ?1 ORDER BY created_at, rowid"
    ))
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(SaleLedger::from_parts(sale, items)))
}

async fn insert_sale(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
    sqlx::query(&format!(
        "INSERT INTO sales ({SALE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
    ))
    .bind(&sale.id)
    .bind(sale.sequence_number)
    .bind(&sale.customer_name)
    .bind(&sale.customer_id)
    .bind(&sale.notes)
    .bind(sale.status)
    .bind(sale.subtotal_cents)
    .bind(sale.discount_kind)
    .bind(sale.discount_value)
    .bind(sale.discount_cents)
    .bind(sale.total_cents)
    .bind(sale.amount_paid_cents)
    .bind(sale.amount_remaining_cents)
    .bind(sale.change_cents)
    .bind(sale.payment_method)
    .bind(sale.opened_at)
    .bind(sale.closed_at)
    .bind(sale.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Writes the header and upserts every line.
async fn save_sale(conn: &mut SqliteConnection, ledger: &SaleLedger) -> DbResult<()> {
    let sale = &ledger.sale;
    sqlx::query(
        r#"
        UPDATE sales SET
            status = ?2,
            subtotal_cents = ?3,
            discount_kind = ?4,
            discount_value = ?5,
            discount_cents = ?6,
            total_cents = ?7,
            amount_paid_cents = ?8,
            amount_remaining_cents = ?9,
            change_cents = ?10,
            payment_method = ?11,
            closed_at = ?12,
            updated_at = ?13
        WHERE id = ?1
        "#,
    )
    .bind(&sale.id)
    .bind(sale.status)
    .bind(sale.subtotal_cents)
    .bind(sale.discount_kind)
    .bind(sale.discount_value)
    .bind(sale.discount_cents)
    .bind(sale.total_cents)
    .bind(sale.amount_paid_cents)
    .bind(sale.amount_remaining_cents)
    .bind(sale.change_cents)
    .bind(sale.payment_method)
    .bind(sale.closed_at)
    .bind(sale.updated_at)
    .execute(&mut *conn)
    .await?;

    for item in &ledger.items {
        sqlx::query(&format!(
            r#"
            INSERT INTO sale_items ({SALE_ITEM_COLUMNS})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT (id) DO UPDATE SET
                quantity = excluded.quantity,
                unit_price_cents = excluded.unit_price_cents,
                discount_kind = excluded.discount_kind,
                discount_value = excluded.discount_value,
                subtotal_cents = excluded.subtotal_cents
            "#
        ))
        .bind(&item.id)
        .bind(&item.sale_id)
        .bind(&item.product_id)
        .bind(&item.product_name)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.unit_cost_cents)
        .bind(item.discount_kind)
        .bind(item.discount_value)
        .bind(item.subtotal_cents)
        .bind(item.created_at)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
