//! # Tab Repository
//!
//! Transactional operations on tabs (comandas).
//!
//! ## Unit of Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Every tab mutation                                  │
//! │                                                                         │
//! │  BEGIN                                                                 │
//! │    │                                                                    │
//! │    ├── UPDATE tabs SET updated_at = updated_at WHERE id = ?            │
//! │    │      └── 0 rows → NotFound (nothing written)                      │
//! │    │      └── takes SQLite's write lock before anything is read        │
//! │    │                                                                    │
//! │    ├── load header + lines + payments (fresh, inside the tx)           │
//! │    ├── apply the tally-core operation                                  │
//! │    ├── (close only) decrement stock for every tracked line             │
//! │    └── save header + lines + new payments                              │
//! │    │                                                                    │
//! │  COMMIT  ── any error before this point drops the tx → ROLLBACK        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Two requests mutating the same tab are serialized by the write lock, so
//! neither ever computes totals from a copy the other has changed.

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
    AddTabItem, Discount, OpenLedger, RegisterPayment, Tab, TabItem, TabLedger, TabPayment,
    TabStatus,
};

const TAB_COLUMNS: &str = r#"
    id, sequence_number, customer_name, customer_id, notes, status,
    total_cents, amount_paid_cents, amount_remaining_cents, waived_total_cents,
    discount_kind, discount_value, discount_cents,
    opened_at, closed_at, updated_at
"#;

const TAB_ITEM_COLUMNS: &str = r#"
    id, tab_id, product_id, product_name, quantity,
    unit_price_cents, unit_cost_cents, subtotal_cents,
    paid, waived, created_at
"#;

/// Repository for tab operations.
#[derive(Debug, Clone)]
pub struct TabRepository {
    pool: SqlitePool,
    inventory: Arc<dyn InventoryAdjustment>,
}

impl TabRepository {
    pub fn new(pool: SqlitePool, inventory: Arc<dyn InventoryAdjustment>) -> Self {
        TabRepository { pool, inventory }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Gets a tab with its lines and payments.
    pub async fn get(&self, tab_id: &str) -> DbResult<TabLedger> {
        let mut conn = self.pool.acquire().await?;
        load_tab(&mut conn, tab_id)
            .await?
            .ok_or_else(|| DbError::not_found("Tab", tab_id))
    }

    /// Lists tab headers, newest first, optionally filtered by status.
    pub async fn list(&self, status: Option<TabStatus>) -> DbResult<Vec<Tab>> {
        debug!(status = ?status, "Listing tabs");

        let tabs = match status {
            Some(status) => {
                sqlx::query_as::<_, Tab>(&format!(
                    "SELECT {TAB_COLUMNS} FROM tabs WHERE status = ?1 ORDER BY sequence_number DESC"
                ))
                .bind(status)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Tab>(&format!(
                    "SELECT {TAB_COLUMNS} FROM tabs ORDER BY sequence_number DESC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(tabs)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Opens a new tab with the next tab number.
    pub async fn open(&self, input: &OpenLedger) -> DbResult<TabLedger> {
        input.validate()?;

        let mut tx = self.pool.begin().await?;
        let sequence_number = next_value(&mut tx, SequenceKind::Tab).await?;
        let ledger = TabLedger::open(
            Uuid::new_v4().to_string(),
            sequence_number,
            input,
            Utc::now(),
        )?;
        insert_tab(&mut tx, &ledger.tab).await?;
        tx.commit().await?;

        info!(
            tab_id = %ledger.tab.id,
            sequence_number,
            customer = %ledger.tab.customer_name,
            "Tab opened"
        );
        Ok(ledger)
    }

    /// Closes a settled tab and consumes stock for every line whose product
    /// tracks inventory (waived lines included).
    ///
    /// If any decrement fails nothing is kept: stock and tab are untouched.
    pub async fn close(&self, tab_id: &str) -> DbResult<TabLedger> {
        debug!(tab_id = %tab_id, "Closing tab");

        let mut tx = self.pool.begin().await?;
        let mut ledger = lock_tab(&mut tx, tab_id).await?;
        ledger.ensure_closable()?;

        for item in &ledger.items {
            match find_product(&mut tx, &item.product_id).await? {
                Some(product) if product.track_inventory => {
                    self.inventory
                        .decrement(&mut tx, &item.product_id, item.quantity)
                        .await?;
                }
                Some(_) => {}
                None => warn!(
                    tab_id = %tab_id,
                    product_id = %item.product_id,
                    "Line references a missing product, stock not adjusted"
                ),
            }
        }

        ledger.close(Utc::now())?;
        save_tab(&mut tx, &ledger).await?;
        tx.commit().await?;

        info!(
            tab_id = %tab_id,
            total = %ledger.tab.total(),
            paid = %ledger.tab.amount_paid(),
            waived = %ledger.tab.waived_total(),
            "Tab closed"
        );
        Ok(ledger)
    }

    /// Cancels an open tab. No stock effect.
    pub async fn cancel(&self, tab_id: &str) -> DbResult<TabLedger> {
        let mut tx = self.pool.begin().await?;
        let mut ledger = lock_tab(&mut tx, tab_id).await?;
        ledger.cancel(Utc::now())?;
        save_tab(&mut tx, &ledger).await?;
        tx.commit().await?;

        info!(tab_id = %tab_id, "Tab cancelled");
        Ok(ledger)
    }

    /// Rebuilds the cached totals from stored lines and payments.
    /// Works in any status.
    pub async fn recalculate(&self, tab_id: &str) -> DbResult<TabLedger> {
        let mut tx = self.pool.begin().await?;
        let mut ledger = lock_tab(&mut tx, tab_id).await?;
        ledger.recalculate();
        save_tab(&mut tx, &ledger).await?;
        tx.commit().await?;

        debug!(tab_id = %tab_id, total = %ledger.tab.total(), "Tab recalculated");
        Ok(ledger)
    }

    // =========================================================================
    // Lines
    // =========================================================================

    /// Adds a line priced from the product (or the override).
    ///
    /// Ordering more than the shelf holds is allowed; stock is only consumed
    /// at close, so this just warns.
    pub async fn add_item(&self, tab_id: &str, input: &AddTabItem) -> DbResult<TabLedger> {
        input.validate()?;
        debug!(tab_id = %tab_id, product_id = %input.product_id, quantity = input.quantity, "Adding tab item");

        let mut tx = self.pool.begin().await?;
        let mut ledger = lock_tab(&mut tx, tab_id).await?;
        let product = find_product(&mut tx, &input.product_id)
            .await?
            .ok_or_else(|| DbError::not_found("Product", &input.product_id))?;

        if !product.has_stock_for(input.quantity) {
            warn!(
                tab_id = %tab_id,
                product_id = %product.id,
                stock = ?product.current_stock,
                quantity = input.quantity,
                "Low stock for tab item"
            );
        }

        ledger.add_item(Uuid::new_v4().to_string(), &product, input, Utc::now())?;
        save_tab(&mut tx, &ledger).await?;
        tx.commit().await?;

        Ok(ledger)
    }

    /// Removes an unpaid line.
    pub async fn remove_item(&self, tab_id: &str, item_id: &str) -> DbResult<TabLedger> {
        debug!(tab_id = %tab_id, item_id = %item_id, "Removing tab item");

        let mut tx = self.pool.begin().await?;
        let mut ledger = lock_tab(&mut tx, tab_id).await?;
        let removed = ledger.remove_item(item_id, Utc::now())?;

        sqlx::query("DELETE FROM tab_items WHERE id = ?1 AND tab_id = ?2")
            .bind(&removed.id)
            .bind(tab_id)
            .execute(&mut *tx)
            .await?;
        save_tab(&mut tx, &ledger).await?;
        tx.commit().await?;

        Ok(ledger)
    }

    /// Marks lines as paid; their subtotals count toward the amount paid.
    pub async fn mark_paid(&self, tab_id: &str, item_ids: &[String]) -> DbResult<TabLedger> {
        debug!(tab_id = %tab_id, count = item_ids.len(), "Marking tab items paid");

        let mut tx = self.pool.begin().await?;
        let mut ledger = lock_tab(&mut tx, tab_id).await?;
        let allocated = ledger.mark_paid(item_ids, Utc::now())?;
        save_tab(&mut tx, &ledger).await?;
        tx.commit().await?;

        info!(tab_id = %tab_id, amount = %allocated, "Tab items paid");
        Ok(ledger)
    }

    /// Waives a line (courtesy). It keeps counting as cost.
    pub async fn waive(&self, tab_id: &str, item_id: &str) -> DbResult<TabLedger> {
        let mut tx = self.pool.begin().await?;
        let mut ledger = lock_tab(&mut tx, tab_id).await?;
        let item = ledger.waive(item_id, Utc::now())?;
        save_tab(&mut tx, &ledger).await?;
        tx.commit().await?;

        info!(tab_id = %tab_id, item_id = %item_id, amount = %item.subtotal(), "Tab item waived");
        Ok(ledger)
    }

    // =========================================================================
    // Money
    // =========================================================================

    /// Replaces the tab-level discount.
    pub async fn apply_discount(&self, tab_id: &str, discount: Discount) -> DbResult<TabLedger> {
        debug!(tab_id = %tab_id, kind = ?discount.kind, value = discount.value, "Applying tab discount");

        let mut tx = self.pool.begin().await?;
        let mut ledger = lock_tab(&mut tx, tab_id).await?;
        ledger.apply_discount(discount, Utc::now())?;
        save_tab(&mut tx, &ledger).await?;
        tx.commit().await?;

        Ok(ledger)
    }

    /// Records a partial payment against the balance.
    pub async fn register_payment(
        &self,
        tab_id: &str,
        input: &RegisterPayment,
    ) -> DbResult<TabLedger> {
        debug!(tab_id = %tab_id, amount = %input.amount(), "Registering tab payment");

        let mut tx = self.pool.begin().await?;
        let mut ledger = lock_tab(&mut tx, tab_id).await?;
        ledger.register_payment(
            Uuid::new_v4().to_string(),
            input.amount(),
            input.method,
            Utc::now(),
        )?;
        save_tab(&mut tx, &ledger).await?;
        tx.commit().await?;

        info!(
            tab_id = %tab_id,
            amount = %input.amount(),
            remaining = %ledger.tab.amount_remaining(),
            "Tab payment registered"
        );
        Ok(ledger)
    }
}

// =============================================================================
// Row Access
// =============================================================================

/// Takes the write lock on a tab row and loads the aggregate.
async fn lock_tab(conn: &mut SqliteConnection, tab_id: &str) -> DbResult<TabLedger> {
    let touched = sqlx::query("UPDATE tabs SET updated_at = updated_at WHERE id = ?1")
        .bind(tab_id)
        .execute(&mut *conn)
        .await?;
    if touched.rows_affected() == 0 {
        return Err(DbError::not_found("Tab", tab_id));
    }

    load_tab(conn, tab_id)
        .await?
        .ok_or_else(|| DbError::not_found("Tab", tab_id))
}

async fn load_tab(conn: &mut SqliteConnection, tab_id: &str) -> DbResult<Option<TabLedger>> {
    let tab = sqlx::query_as::<_, Tab>(&format!("SELECT {TAB_COLUMNS} FROM tabs WHERE id = ?1"))
        .bind(tab_id)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(tab) = tab else {
        return Ok(None);
    };

    let items = sqlx::query_as::<_, TabItem>(&format!(
        "SELECT {TAB_ITEM_COLUMNS} FROM tab_items WHERE tab_id = ?1 ORDER BY created_at, rowid"
    ))
    .bind(tab_id)
    .fetch_all(&mut *conn)
    .await?;

    let payments = sqlx::query_as::<_, TabPayment>(
        "SELECT id, tab_id, amount_cents, method, created_at FROM tab_payments WHERE tab_id = ?1 ORDER BY created_at, rowid",
    )
    .bind(tab_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Some(TabLedger::from_parts(tab, items, payments)))
}

async fn insert_tab(conn: &mut SqliteConnection, tab: &Tab) -> DbResult<()> {
    sqlx::query(&format!(
        "INSERT INTO tabs ({TAB_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
    ))
    .bind(&tab.id)
    .bind(tab.sequence_number)
    .bind(&tab.customer_name)
    .bind(&tab.customer_id)
    .bind(&tab.notes)
    .bind(tab.status)
    .bind(tab.total_cents)
    .bind(tab.amount_paid_cents)
    .bind(tab.amount_remaining_cents)
    .bind(tab.waived_total_cents)
    .bind(tab.discount_kind)
    .bind(tab.discount_value)
    .bind(tab.discount_cents)
    .bind(tab.opened_at)
    .bind(tab.closed_at)
    .bind(tab.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Writes the header, upserts every line and inserts payments not yet stored.
async fn save_tab(conn: &mut SqliteConnection, ledger: &TabLedger) -> DbResult<()> {
    let tab = &ledger.tab;
    sqlx::query(
        r#"
        UPDATE tabs SET
            status = ?2,
            total_cents = ?3,
            amount_paid_cents = ?4,
            amount_remaining_cents = ?5,
            waived_total_cents = ?6,
            discount_kind = ?7,
            discount_value = ?8,
            discount_cents = ?9,
            closed_at = ?10,
            updated_at = ?11
        WHERE id = ?1
        "#,
    )
    .bind(&tab.id)
    .bind(tab.status)
    .bind(tab.total_cents)
    .bind(tab.amount_paid_cents)
    .bind(tab.amount_remaining_cents)
    .bind(tab.waived_total_cents)
    .bind(tab.discount_kind)
    .bind(tab.discount_value)
    .bind(tab.discount_cents)
    .bind(tab.closed_at)
    .bind(tab.updated_at)
    .execute(&mut *conn)
    .await?;

    for item in &ledger.items {
        sqlx::query(&format!(
            r#"
            INSERT INTO tab_items ({TAB_ITEM_COLUMNS})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT (id) DO UPDATE SET
                subtotal_cents = excluded.subtotal_cents,
                paid = excluded.paid,
                waived = excluded.waived
            "#
        ))
        .bind(&item.id)
        .bind(&item.tab_id)
        .bind(&item.product_id)
        .bind(&item.product_name)
        .bind(item.quantity)
        .bind(item.unit_price_cents)
        .bind(item.unit_cost_cents)
        .bind(item.subtotal_cents)
        .bind(item.paid)
        .bind(item.waived)
        .bind(item.created_at)
        .execute(&mut *conn)
        .await?;
    }

    for payment in &ledger.payments {
        sqlx::query(
            r#"
            INSERT INTO tab_payments (id, tab_id, amount_cents, method, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(&payment.id)
        .bind(&payment.tab_id)
        .bind(payment.amount_cents)
        .bind(payment.method)
        .bind(payment.created_at)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::inventory::{SqliteInventory, StockMovement};
    use crate::repository::product::tests::{insert_product, ProductFixture};
    use async_trait::async_trait;
    use tally_core::{CoreError, ErrorKind, Money, PaymentMethod, Product};

    async fn setup() -> (Database, Product, Product) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let beer = insert_product(&db, ProductFixture::new("BEER", 500).stock(10.0)).await;
        let snack = insert_product(&db, ProductFixture::new("SNACK", 650).stock(5.0)).await;
        (db, beer, snack)
    }

    async fn open(db: &Database) -> TabLedger {
        db.tabs().open(&OpenLedger::new("Mesa 4")).await.unwrap()
    }

    async fn add(db: &Database, tab_id: &str, product: &Product, qty: f64) -> TabLedger {
        db.tabs()
            .add_item(tab_id, &AddTabItem::new(product.id.clone(), qty))
            .await
            .unwrap()
    }

    async fn pay(db: &Database, tab_id: &str, cents: i64) -> DbResult<TabLedger> {
        db.tabs()
            .register_payment(tab_id, &RegisterPayment::new(Money::from_cents(cents)))
            .await
    }

    async fn stock(db: &Database, product: &Product) -> Option<f64> {
        db.products().current_stock(&product.id).await.unwrap()
    }

    /// Inventory that refuses one product and delegates the rest.
    #[derive(Debug)]
    struct RefuseProduct(String);

    #[async_trait]
    impl InventoryAdjustment for RefuseProduct {
        async fn decrement(
            &self,
            conn: &mut SqliteConnection,
            product_id: &str,
            quantity: f64,
        ) -> DbResult<StockMovement> {
            if product_id == self.0 {
                return Err(DbError::Internal("inventory offline".to_string()));
            }
            SqliteInventory.decrement(conn, product_id, quantity).await
        }
    }

    #[tokio::test]
    async fn test_full_tab_lifecycle() {
        // 2 × $5.00 + 1 × $6.50
        let (db, beer, snack) = setup().await;
        let tab = open(&db).await;
        add(&db, &tab.tab.id, &beer, 2.0).await;
        let tab = add(&db, &tab.tab.id, &snack, 1.0).await;
        assert_eq!(tab.tab.total_cents, 1650);
        assert_eq!(tab.tab.amount_remaining_cents, 1650);

        let err = db.tabs().close(&tab.tab.id).await.unwrap_err();
        match &err {
            DbError::Ledger(CoreError::OutstandingBalance { remaining, .. }) => {
                assert_eq!(remaining.cents(), 1650)
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.kind(), ErrorKind::Validation);

        let tab = pay(&db, &tab.tab.id, 1650).await.unwrap();
        assert!(tab.tab.amount_remaining().is_zero());

        let tab = db.tabs().close(&tab.tab.id).await.unwrap();
        assert_eq!(tab.tab.status, TabStatus::Closed);
        assert!(tab.tab.closed_at.is_some());
        assert_eq!(stock(&db, &beer).await, Some(8.0));
        assert_eq!(stock(&db, &snack).await, Some(4.0));

        // Persisted as returned
        let stored = db.tabs().get(&tab.tab.id).await.unwrap();
        assert_eq!(stored, tab);
    }

    #[tokio::test]
    async fn test_waived_only_item_closes_and_still_consumes_stock() {
        let (db, beer, _) = setup().await;
        let tab = open(&db).await;
        let tab = add(&db, &tab.tab.id, &beer, 1.0).await;
        let item_id = tab.items[0].id.clone();

        db.tabs().waive(&tab.tab.id, &item_id).await.unwrap();

        let err = db
            .tabs()
            .mark_paid(&tab.tab.id, &[item_id.clone()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let tab = db.tabs().close(&tab.tab.id).await.unwrap();
        assert!(tab.tab.amount_remaining().is_zero());
        assert!(tab.items[0].waived);
        assert!(!tab.items[0].paid);
        assert_eq!(stock(&db, &beer).await, Some(9.0));
    }

    #[tokio::test]
    async fn test_remove_paid_item_conflicts() {
        let (db, beer, _) = setup().await;
        let tab = open(&db).await;
        let tab = add(&db, &tab.tab.id, &beer, 1.0).await;
        let item_id = tab.items[0].id.clone();
        db.tabs().mark_paid(&tab.tab.id, &[item_id.clone()]).await.unwrap();

        let err = db.tabs().remove_item(&tab.tab.id, &item_id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(db.tabs().get(&tab.tab.id).await.unwrap().items.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_unpaid_item() {
        let (db, beer, snack) = setup().await;
        let tab = open(&db).await;
        add(&db, &tab.tab.id, &beer, 1.0).await;
        let tab = add(&db, &tab.tab.id, &snack, 1.0).await;
        let snack_line = tab.items[1].id.clone();

        let tab = db.tabs().remove_item(&tab.tab.id, &snack_line).await.unwrap();
        assert_eq!(tab.tab.total_cents, 500);

        let stored = db.tabs().get(&tab.tab.id).await.unwrap();
        assert_eq!(stored.items.len(), 1);
        assert_eq!(stored.tab.total_cents, 500);
    }

    #[tokio::test]
    async fn test_payment_slack_boundaries() {
        let (db, beer, _) = setup().await;
        let tab = open(&db).await;
        let tab = add(&db, &tab.tab.id, &beer, 1.0).await;

        let err = pay(&db, &tab.tab.id, 502).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(db.tabs().get(&tab.tab.id).await.unwrap().payments.is_empty());

        let tab = pay(&db, &tab.tab.id, 200).await.unwrap();
        assert_eq!(tab.tab.amount_remaining_cents, 300);
        let tab = pay(&db, &tab.tab.id, 300).await.unwrap();
        assert!(tab.tab.amount_remaining().is_zero());
        db.tabs().close(&tab.tab.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_discount_and_payment_method_persist() {
        let (db, beer, _) = setup().await;
        let tab = open(&db).await;
        let tab = add(&db, &tab.tab.id, &beer, 4.0).await;

        let tab = db
            .tabs()
            .apply_discount(&tab.tab.id, Discount::percentage(10.0))
            .await
            .unwrap();
        assert_eq!(tab.tab.discount_cents, 200);
        assert_eq!(tab.tab.amount_remaining_cents, 1800);

        let mut card = RegisterPayment::new(Money::from_cents(1800));
        card.method = PaymentMethod::Card;
        db.tabs().register_payment(&tab.tab.id, &card).await.unwrap();

        let stored = db.tabs().get(&tab.tab.id).await.unwrap();
        assert_eq!(stored.payments.len(), 1);
        assert_eq!(stored.payments[0].method, PaymentMethod::Card);
        assert_eq!(
            stored.tab.amount_paid() + stored.tab.amount_remaining() + stored.tab.discount_amount(),
            stored.tab.total()
        );
    }

    #[tokio::test]
    async fn test_recalculate_is_idempotent() {
        let (db, beer, snack) = setup().await;
        let tab = open(&db).await;
        add(&db, &tab.tab.id, &beer, 2.0).await;
        let tab = add(&db, &tab.tab.id, &snack, 1.0).await;
        db.tabs()
            .mark_paid(&tab.tab.id, &[tab.items[1].id.clone()])
            .await
            .unwrap();
        pay(&db, &tab.tab.id, 400).await.unwrap();

        // Corrupt the cached totals behind the ledger's back
        sqlx::query("UPDATE tabs SET total_cents = 1, amount_paid_cents = 0, amount_remaining_cents = 0 WHERE id = ?1")
            .bind(&tab.tab.id)
            .execute(db.pool())
            .await
            .unwrap();

        let first = db.tabs().recalculate(&tab.tab.id).await.unwrap();
        assert_eq!(first.tab.total_cents, 1650);
        assert_eq!(first.tab.amount_paid_cents, 1050);
        assert_eq!(first.tab.amount_remaining_cents, 600);

        let second = db.tabs().recalculate(&tab.tab.id).await.unwrap();
        assert_eq!(first.tab.total_cents, second.tab.total_cents);
        assert_eq!(first.tab.amount_paid_cents, second.tab.amount_paid_cents);
        assert_eq!(first.tab.amount_remaining_cents, second.tab.amount_remaining_cents);
    }

    #[tokio::test]
    async fn test_recalculate_closed_tab() {
        let (db, beer, _) = setup().await;
        let tab = open(&db).await;
        let tab = add(&db, &tab.tab.id, &beer, 1.0).await;
        pay(&db, &tab.tab.id, 500).await.unwrap();
        db.tabs().close(&tab.tab.id).await.unwrap();

        let tab = db.tabs().recalculate(&tab.tab.id).await.unwrap();
        assert_eq!(tab.tab.status, TabStatus::Closed);
        assert!(tab.tab.amount_remaining().is_zero());
    }

    #[tokio::test]
    async fn test_close_rolls_back_when_inventory_fails() {
        let (db, beer, snack) = setup().await;
        let db = db.with_inventory(Arc::new(RefuseProduct(snack.id.clone())));
        let tab = open(&db).await;
        add(&db, &tab.tab.id, &beer, 2.0).await;
        add(&db, &tab.tab.id, &snack, 1.0).await;
        pay(&db, &tab.tab.id, 1650).await.unwrap();

        let err = db.tabs().close(&tab.tab.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);

        let stored = db.tabs().get(&tab.tab.id).await.unwrap();
        assert_eq!(stored.tab.status, TabStatus::Open);
        assert!(stored.tab.closed_at.is_none());
        assert_eq!(stock(&db, &beer).await, Some(10.0));
        assert_eq!(stock(&db, &snack).await, Some(5.0));
    }

    #[tokio::test]
    async fn test_close_with_insufficient_stock() {
        let (db, beer, _) = setup().await;
        let tab = open(&db).await;
        let tab = add(&db, &tab.tab.id, &beer, 12.0).await;
        pay(&db, &tab.tab.id, 6000).await.unwrap();

        let err = db.tabs().close(&tab.tab.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientResource);
        assert_eq!(
            db.tabs().get(&tab.tab.id).await.unwrap().tab.status,
            TabStatus::Open
        );
        assert_eq!(stock(&db, &beer).await, Some(10.0));
    }

    #[tokio::test]
    async fn test_close_drives_stock_negative_when_product_allows_it() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let draft = insert_product(
            &db,
            ProductFixture::new("DRAFT", 800).stock(1.0).allow_negative(),
        )
        .await;
        let tab = open(&db).await;
        let tab = add(&db, &tab.tab.id, &draft, 3.0).await;
        pay(&db, &tab.tab.id, 2400).await.unwrap();

        let tab = db.tabs().close(&tab.tab.id).await.unwrap();
        assert_eq!(tab.tab.status, TabStatus::Closed);
        assert_eq!(stock(&db, &draft).await, Some(-2.0));
    }

    #[tokio::test]
    async fn test_mark_paid_after_full_payment_is_rejected() {
        let (db, beer, _) = setup().await;
        let tab = open(&db).await;
        add(&db, &tab.tab.id, &beer, 1.0).await;
        let tab = add(&db, &tab.tab.id, &beer, 1.0).await;
        let lines: Vec<String> = tab.items.iter().map(|i| i.id.clone()).collect();
        pay(&db, &tab.tab.id, 1000).await.unwrap();

        let err = db.tabs().mark_paid(&tab.tab.id, &lines).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = db.tabs().waive(&tab.tab.id, &lines[0]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let stored = db.tabs().get(&tab.tab.id).await.unwrap();
        assert_eq!(stored.tab.amount_paid_cents, 1000);
        assert_eq!(stored.tab.waived_total_cents, 0);
        assert!(stored.items.iter().all(|i| !i.paid && !i.waived));
        db.tabs().close(&tab.tab.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_untracked_product_close() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let cover = insert_product(&db, ProductFixture::new("COVER", 1500).untracked()).await;
        let tab = open(&db).await;
        let tab = add(&db, &tab.tab.id, &cover, 2.0).await;
        pay(&db, &tab.tab.id, 3000).await.unwrap();

        let tab = db.tabs().close(&tab.tab.id).await.unwrap();
        assert_eq!(tab.tab.status, TabStatus::Closed);
        assert_eq!(stock(&db, &cover).await, None);
    }

    #[tokio::test]
    async fn test_missing_entities() {
        let (db, _, _) = setup().await;
        let err = db.tabs().close("no-such-tab").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = db.tabs().get("no-such-tab").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let tab = open(&db).await;
        let err = db
            .tabs()
            .add_item(&tab.tab.id, &AddTabItem::new("no-such-product", 1.0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_inactive_product_rejected_and_snapshot_kept() {
        let (db, beer, snack) = setup().await;
        let tab = open(&db).await;
        add(&db, &tab.tab.id, &beer, 1.0).await;

        db.products().update_price(&beer.id, 900).await.unwrap();
        db.products().soft_delete(&beer.id).await.unwrap();

        let err = db
            .tabs()
            .add_item(&tab.tab.id, &AddTabItem::new(beer.id.clone(), 1.0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let tab = add(&db, &tab.tab.id, &snack, 1.0).await;
        assert_eq!(tab.items[0].unit_price_cents, 500);
        assert_eq!(tab.tab.total_cents, 1150);
    }

    #[tokio::test]
    async fn test_add_more_than_stock_is_allowed() {
        let (db, _, snack) = setup().await;
        let tab = open(&db).await;
        let tab = add(&db, &tab.tab.id, &snack, 7.0).await;
        assert_eq!(tab.items.len(), 1);
        assert_eq!(stock(&db, &snack).await, Some(5.0));
    }

    #[tokio::test]
    async fn test_invalid_quantity_rejected_before_lookup() {
        let (db, beer, _) = setup().await;
        let tab = open(&db).await;
        let err = db
            .tabs()
            .add_item(&tab.tab.id, &AddTabItem::new(beer.id.clone(), 0.0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_cancelled_tab_is_immutable() {
        let (db, beer, _) = setup().await;
        let tab = open(&db).await;
        let tab = add(&db, &tab.tab.id, &beer, 1.0).await;
        let tab = db.tabs().cancel(&tab.tab.id).await.unwrap();
        assert_eq!(tab.tab.status, TabStatus::Cancelled);
        assert!(tab.tab.closed_at.is_some());
        assert_eq!(stock(&db, &beer).await, Some(10.0));

        let err = db
            .tabs()
            .add_item(&tab.tab.id, &AddTabItem::new(beer.id.clone(), 1.0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = db.tabs().cancel(&tab.tab.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_sequence_numbers_and_listing() {
        let (db, beer, _) = setup().await;
        let first = open(&db).await;
        let second = db
            .tabs()
            .open(&OpenLedger::new("Balcão").with_notes("sem gelo"))
            .await
            .unwrap();
        assert_eq!(first.tab.sequence_number, 1);
        assert_eq!(second.tab.sequence_number, 2);
        assert_eq!(second.tab.notes.as_deref(), Some("sem gelo"));

        let tab = add(&db, &first.tab.id, &beer, 1.0).await;
        db.tabs().cancel(&tab.tab.id).await.unwrap();

        let all = db.tabs().list(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].sequence_number, 2);

        let open_tabs = db.tabs().list(Some(TabStatus::Open)).await.unwrap();
        assert_eq!(open_tabs.len(), 1);
        assert_eq!(open_tabs[0].id, second.tab.id);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_payments_cannot_overpay() {
        let path = std::env::temp_dir().join(format!("tally-{}.db", Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path)).await.unwrap();
        let beer = insert_product(&db, ProductFixture::new("BEER", 500)).await;
        let tab = open(&db).await;
        add(&db, &tab.tab.id, &beer, 2.0).await;

        // Each payment alone covers the whole balance
        let (a, b) = tokio::join!(pay(&db, &tab.tab.id, 1000), pay(&db, &tab.tab.id, 1000));
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);

        let stored = db.tabs().get(&tab.tab.id).await.unwrap();
        assert_eq!(stored.payments.len(), 1);
        assert_eq!(stored.tab.amount_paid_cents, 1000);

        db.close().await;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
        }
    }
}
