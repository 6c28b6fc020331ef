//! # Seed Data Generator
//!
//! Populates the database with a small bar catalog for development, and can
//! run a demo tab against it.
//!
//! ## Usage
//! ```bash
//! # Seed the database named by TALLY_DB_PATH (default ./tally.db)
//! cargo run -p tally-db --bin seed
//!
//! # Specify database path
//! cargo run -p tally-db --bin seed -- --db ./data/tally.db
//!
//! # Seed, then open, pay and close a demo tab, printing it as JSON
//! cargo run -p tally-db --bin seed -- --demo
//! ```
//!
//! ## Logging
//! - `RUST_LOG=debug` - Show debug messages
//! - `RUST_LOG=tally=trace` - Show trace for tally crates only
//! - Default: `info,tally=debug,sqlx=warn`

use chrono::Utc;
use std::env;
use tally_core::{AddTabItem, OpenLedger, Product, RegisterPayment};
use tally_db::{Database, DbConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// (sku, name, price_cents, cost_cents, stock). `None` stock = untracked.
const CATALOG: &[(&str, &str, i64, i64, Option<f64>)] = &[
    ("BEER-LAGER-600", "Lager 600ml", 1200, 650, Some(48.0)),
    ("BEER-IPA-355", "IPA Long Neck", 1500, 800, Some(24.0)),
    ("SODA-COLA-350", "Cola 350ml", 600, 280, Some(36.0)),
    ("WATER-500", "Mineral Water 500ml", 400, 150, Some(36.0)),
    ("CAIPIRINHA", "Caipirinha", 1800, 500, Some(20.0)),
    ("SNACK-FRIES", "French Fries Portion", 2500, 900, Some(15.0)),
    ("SNACK-PEANUTS", "Roasted Peanuts (kg)", 4000, 1800, Some(3.5)),
    ("POOL-HOUR", "Pool Table Hour", 2000, 0, None),
    ("COVER", "Cover Charge", 1500, 0, None),
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut config = DbConfig::from_env()?;
    let mut demo = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    config = DbConfig {
                        database_path: args[i + 1].clone().into(),
                        ..config
                    };
                    i += 1;
                }
            }
            "--demo" => demo = true,
            "--help" | "-h" => {
                println!("Tally Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: $TALLY_DB_PATH or ./tally.db)");
                println!("      --demo         Run a demo tab after seeding");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            other => warn!(argument = %other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    let db = Database::new(config).await?;

    let existing = db.products().count().await?;
    if existing > 0 {
        info!(existing, "Catalog already seeded, skipping");
    } else {
        for (sku, name, price_cents, cost_cents, stock) in CATALOG {
            let product = catalog_product(sku, name, *price_cents, *cost_cents, *stock);
            db.products().insert(&product).await?;
        }
        info!(count = CATALOG.len(), "Catalog seeded");
    }

    if demo {
        run_demo(&db).await?;
    }

    db.close().await;
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tally=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn catalog_product(
    sku: &str,
    name: &str,
    price_cents: i64,
    cost_cents: i64,
    stock: Option<f64>,
) -> Product {
    let now = Utc::now();
    Product {
        id: Uuid::new_v4().to_string(),
        sku: sku.to_string(),
        name: name.to_string(),
        price_cents,
        cost_cents,
        track_inventory: stock.is_some(),
        allow_negative_stock: false,
        current_stock: stock,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

/// Opens a tab, orders a round, waives the peanuts, pays and closes.
async fn run_demo(db: &Database) -> Result<(), Box<dyn std::error::Error>> {
    let products = db.products().list_active(100).await?;
    let find = |sku: &str| {
        products
            .iter()
            .find(|p| p.sku == sku)
            .map(|p| p.id.clone())
            .ok_or_else(|| format!("product {sku} missing from catalog"))
    };

    let tabs = db.tabs();
    let tab = tabs.open(&OpenLedger::new("Mesa 4").with_notes("demo")).await?;
    let id = tab.tab.id.clone();

    tabs.add_item(&id, &AddTabItem::new(find("BEER-LAGER-600")?, 2.0)).await?;
    tabs.add_item(&id, &AddTabItem::new(find("SNACK-FRIES")?, 1.0)).await?;
    let tab = tabs
        .add_item(&id, &AddTabItem::new(find("SNACK-PEANUTS")?, 0.25))
        .await?;

    let peanuts = tab
        .items
        .last()
        .map(|item| item.id.clone())
        .ok_or("demo tab has no items")?;
    let tab = tabs.waive(&id, &peanuts).await?;

    let tab = tabs
        .register_payment(&id, &RegisterPayment::new(tab.tab.amount_remaining()))
        .await?;
    let tab = tabs.close(&tab.tab.id).await?;

    println!("{}", serde_json::to_string_pretty(&tab)?);
    Ok(())
}
