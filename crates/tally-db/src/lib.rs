//! # tally-db: Database Layer for Tally
//!
//! SQLite persistence for the tab and sale ledgers, using sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Tally Data Flow                                │
//! │                                                                         │
//! │  Caller (close tab 42)                                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ TabRepo       │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ SaleRepo      │    │ 001_init.sql │  │   │
//! │  │   │ Inventory port│    │ ProductRepo   │    │              │  │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │                                │                                │   │
//! │  │                                ▼                                │   │
//! │  │                  tally-core ledger rules                        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite database ($TALLY_DB_PATH)                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Tab, sale and product repositories plus ports
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_core::{AddTabItem, OpenLedger, RegisterPayment};
//! use tally_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::from_env()?).await?;
//!
//! let tab = db.tabs().open(&OpenLedger::new("Mesa 4")).await?;
//! db.tabs().add_item(&tab.tab.id, &AddTabItem::new(beer_id, 2.0)).await?;
//! let tab = db.tabs().get(&tab.tab.id).await?;
//! db.tabs()
//!     .register_payment(&tab.tab.id, &RegisterPayment::new(tab.tab.amount_remaining()))
//!     .await?;
//! db.tabs().close(&tab.tab.id).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::inventory::{InventoryAdjustment, SqliteInventory, StockMovement};
pub use repository::product::ProductRepository;
pub use repository::sale::SaleRepository;
pub use repository::sequence::SequenceKind;
pub use repository::tab::TabRepository;
