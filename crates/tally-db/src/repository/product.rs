//! # Product Repository
//!
//! The ledgers' view of the catalog: lookup for line snapshots, stock reads,
//! and the few writes the seed binary and tests need.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  add line ──► find_product(conn, id)                                    │
//! │                  │                                                      │
//! │                  ├── None / inactive ──► NotFound                       │
//! │                  └── Some(product)  ──► snapshot name, price, cost      │
//! │                                                                         │
//! │  Catalog CRUD (search, barcode, images) lives outside Tally.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use tally_core::validation::validate_price_cents;
use tally_core::Product;

const PRODUCT_COLUMNS: &str = r#"
    id, sku, name, price_cents, cost_cents,
    track_inventory, allow_negative_stock, current_stock,
    is_active, created_at, updated_at
"#;

/// Looks a product up on an existing connection (inside a ledger transaction).
///
/// Inactive products are returned too; deciding whether they may be used is
/// the ledger's business.
pub async fn find_product(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Product>> {
    let product = sqlx::query_as::<_, Product>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(product)
}

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a product by its ID, active or not.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        find_product(&mut conn, id).await
    }

    /// Lists active products sorted by name.
    pub async fn list_active(&self, limit: u32) -> DbResult<Vec<Product>> {
        let products = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE is_active = 1 ORDER BY name LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(products)
    }

    /// Inserts a new product.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - SKU already exists
    pub async fn insert(&self, product: &Product) -> DbResult<Product> {
        debug!(sku = %product.sku, "Inserting product");
        validate_price_cents(product.price_cents)?;
        validate_price_cents(product.cost_cents)?;

        sqlx::query(
            r#"
            INSERT INTO products (
                id, sku, name, price_cents, cost_cents,
                track_inventory, allow_negative_stock, current_stock,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&product.id)
        .bind(&product.sku)
        .bind(&product.name)
        .bind(product.price_cents)
        .bind(product.cost_cents)
        .bind(product.track_inventory)
        .bind(product.allow_negative_stock)
        .bind(product.current_stock)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(product.clone())
    }

    /// Changes the catalog price. Lines already on a ledger keep their snapshot.
    pub async fn update_price(&self, id: &str, price_cents: i64) -> DbResult<()> {
        debug!(id = %id, price_cents, "Updating product price");
        validate_price_cents(price_cents)?;

        let result = sqlx::query("UPDATE products SET price_cents = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id)
            .bind(price_cents)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Soft-deletes a product by setting is_active = false.
    ///
    /// Historical ledger lines still reference it.
    pub async fn soft_delete(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Soft-deleting product");

        let result = sqlx::query("UPDATE products SET is_active = 0, updated_at = ?2 WHERE id = ?1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Current stock level, `None` when the product has no stock row value.
    pub async fn current_stock(&self, id: &str) -> DbResult<Option<f64>> {
        let stock: Option<Option<f64>> =
            sqlx::query_scalar("SELECT current_stock FROM products WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        stock.ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Counts active products (for diagnostics).
    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE is_active = 1")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }
}

/// Helper to generate a new product ID.
pub fn generate_product_id() -> String {
    Uuid::new_v4().to_string()
}

// =============================================================================
// Unit Tests
// =============================================================================
