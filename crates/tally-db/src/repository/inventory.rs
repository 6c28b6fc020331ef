//! # Inventory Adjustment
//!
//! Stock decrement applied when a tab closes or a sale finalizes.
//!
//! The port receives the caller's transaction connection, so a failure here
//! (or anywhere later in the close) rolls back every decrement already made.
//!
//! ```text
//! close / finalize tx
//!   ├── decrement(beer, 2)   ──► stock 10 → 8
//!   ├── decrement(snack, 1)  ──► InsufficientStock
//!   └── ROLLBACK             ──► beer back to 10, ledger still OPEN
//! ```

use async_trait::async_trait;
use sqlx::SqliteConnection;
use std::fmt::Debug;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use tally_core::CoreError;

/// What a decrement did.
#[derive(Debug, Clone, PartialEq)]
pub enum StockMovement {
    /// Product does not track stock; nothing changed.
    Untracked,
    /// Stock moved from `before` to `after`.
    Decremented { before: f64, after: f64 },
}

/// Port for consuming stock inside a ledger transaction.
#[async_trait]
pub trait InventoryAdjustment: Send + Sync + Debug {
    /// Removes `quantity` units of `product_id` from stock.
    ///
    /// Fails with [`CoreError::InsufficientStock`] when the product forbids
    /// negative stock and the decrement would go below zero.
    async fn decrement(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        quantity: f64,
    ) -> DbResult<StockMovement>;
}

/// Default port: updates `products.current_stock`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteInventory;

#[async_trait]
impl InventoryAdjustment for SqliteInventory {
    async fn decrement(
        &self,
        conn: &mut SqliteConnection,
        product_id: &str,
        quantity: f64,
    ) -> DbResult<StockMovement> {
        let row: Option<(bool, bool, Option<f64>)> = sqlx::query_as(
            "SELECT track_inventory, allow_negative_stock, current_stock FROM products WHERE id = ?1",
        )
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?;

        let (track_inventory, allow_negative, current_stock) =
            row.ok_or_else(|| DbError::not_found("Product", product_id))?;
        if !track_inventory {
            debug!(product_id = %product_id, "Product does not track stock, skipping");
            return Ok(StockMovement::Untracked);
        }

        let before = current_stock.unwrap_or(0.0);
        let after = before - quantity;
        if after < 0.0 && !allow_negative {
            return Err(CoreError::InsufficientStock {
                product_id: product_id.to_string(),
                available: before,
                requested: quantity,
            }
            .into());
        }

        sqlx::query(
            r#"
            UPDATE products
            SET current_stock = COALESCE(current_stock, 0) - ?2,
                updated_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(product_id)
        .bind(quantity)
        .bind(chrono::Utc::now())
        .execute(&mut *conn)
        .await?;

        if after < 0.0 {
            warn!(product_id = %product_id, stock = after, "Stock is negative");
        }
        debug!(product_id = %product_id, before, after, "Stock decremented");

        Ok(StockMovement::Decremented { before, after })
    }
}
