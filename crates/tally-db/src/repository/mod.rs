//! # Repository Module
//!
//! Database repositories for Tally.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Caller                                                                 │
//! │       │  db.tabs().register_payment(tab_id, &input)                    │
//! │       ▼                                                                 │
//! │  TabRepository / SaleRepository                                         │
//! │  ├── transaction boundaries                                            │
//! │  ├── load / save aggregates                                            │
//! │  └── ports: find_product, next_value, InventoryAdjustment              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  tally-core ledger (pure rules)          SQLite                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`tab::TabRepository`] - Tab (comanda) lifecycle
//! - [`sale::SaleRepository`] - Sale (venda) lifecycle
//! - [`product::ProductRepository`] - Catalog reads, stock reads
//!
//! Collaborators used inside ledger transactions:
//!
//! - [`product::find_product`] - Product lookup
//! - [`inventory::InventoryAdjustment`] - Stock decrement port
//! - [`sequence::next_value`] - Ledger number allocation

pub mod inventory;
pub mod product;
pub mod sale;
pub mod sequence;
pub mod tab;
