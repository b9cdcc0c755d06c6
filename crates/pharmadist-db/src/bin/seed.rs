//! # Seed Data Generator
//!
//! Populates a development database with a pharmaceutical catalogue and
//! opening stock, so every batch starts with an OPENING ledger entry.
//!
//! ## Usage
//! ```bash
//! # Default catalogue, 3 batches per product
//! cargo run -p pharmadist-db --bin seed
//!
//! # More batches per product
//! cargo run -p pharmadist-db --bin seed -- --batches 5
//!
//! # Specify database path (otherwise pharmadist.toml / PHARMADIST_DB_PATH)
//! cargo run -p pharmadist-db --bin seed -- --db ./data/pharmadist_dev.db
//! ```
//!
//! ## Generated Data
//! - Products across tablets, capsules, syrups and injectables, each with
//!   cost price, trade price (TP) and MRP
//! - Per product, `--batches` batches numbered `{CODE}-{YYMM}` with
//!   staggered expiry dates and opening quantities from 20 to 500 units
//! - One sample raw material lot per active ingredient

use chrono::{Datelike, Months, NaiveDate, Utc};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pharmadist_core::MovementType;
use pharmadist_db::workflow::{ReceiveLot, ReceiveStock};
use pharmadist_db::{AppConfig, Database, NewProduct};

/// (code, name, category, unit, trade price in minor units)
const CATALOGUE: &[(&str, &str, &str, &str, i64)] = &[
    ("NPA", "Napa 500mg", "Tablet", "strip", 120),
    ("NPX", "Napa Extra 500mg", "Tablet", "strip", 250),
    ("SEC", "Seclo 20mg", "Capsule", "strip", 600),
    ("MXL", "Moxacil 500mg", "Capsule", "strip", 1_050),
    ("FEX", "Fexo 120mg", "Tablet", "strip", 900),
    ("MNT", "Montair 10mg", "Tablet", "strip", 1_600),
    ("ALT", "Alatrol 10mg", "Tablet", "strip", 300),
    ("ZMX", "Zimax 500mg", "Tablet", "strip", 3_500),
    ("CFX", "Ceftron 1g", "Injection", "vial", 24_000),
    ("OMD", "Omidon 10mg", "Tablet", "strip", 350),
    ("TSC", "Tusca Syrup", "Syrup", "bottle", 7_500),
    ("ORS", "Orsaline-N", "Powder", "sachet", 600),
];

/// (name, unit)
const RAW_MATERIALS: &[(&str, &str)] = &[
    ("Paracetamol BP", "kg"),
    ("Omeprazole Pellets", "kg"),
    ("Amoxicillin Trihydrate", "kg"),
];

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pharmadist_db=debug,pharmadist_core=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();

    let mut batches_per_product: usize = 3;
    let mut db_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--batches" | "-b" => {
                if i + 1 < args.len() {
                    batches_per_product = args[i + 1].parse().unwrap_or(3);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("PharmaDist Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -b, --batches <N>    Batches per product (default: 3)");
                println!("  -d, --db <PATH>      Database file path");
                println!("      --config <PATH>  pharmadist.toml to load");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            other => warn!(argument = other, "Ignoring unknown argument"),
        }
        i += 1;
    }

    let mut config = AppConfig::load(config_path)?;
    if let Some(path) = db_path {
        config.database.path = Some(path);
    }
    let db_config = config.to_db_config();

    if let Some(parent) = db_config.database_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    info!(path = %db_config.database_path.display(), batches_per_product, "Seeding database");
    let db = Database::new(db_config).await?;

    if !db.products().list_active(1).await?.is_empty() {
        warn!("Database already has products, skipping seed. Delete the database file to regenerate.");
        return Ok(());
    }

    let start = std::time::Instant::now();
    let today = Utc::now().date_naive();
    let mut products = 0;
    let mut batches = 0;

    for (index, (code, name, category, unit, tp_rate_cents)) in CATALOGUE.iter().enumerate() {
        let product = db
            .products()
            .create(&NewProduct {
                name: name.to_string(),
                category: Some(category.to_string()),
                unit: unit.to_string(),
                cost_price_cents: tp_rate_cents * 70 / 100,
                tp_rate_cents: *tp_rate_cents,
                sales_price_cents: tp_rate_cents * 115 / 100,
            })
            .await?;
        products += 1;

        for batch_index in 0..batches_per_product {
            let manufactured = today - Months::new((batch_index as u32 + 1) * 2);
            let expiry = manufactured + Months::new(24 + (index % 3) as u32 * 6);
            let receipt = ReceiveStock {
                product_id: product.id.clone(),
                batch_number: batch_number(code, manufactured, batch_index),
                quantity: opening_quantity(index, batch_index),
                unit_cost_cents: product.cost_price_cents,
                expiry_date: Some(expiry),
                kind: MovementType::Opening,
                reference: "OPENING".to_string(),
            };

            match db.stock().receive(&receipt).await {
                Ok(_) => batches += 1,
                Err(e) => warn!(batch = %receipt.batch_number, error = %e, "Failed to receive batch"),
            }
        }
    }

    for (index, (name, unit)) in RAW_MATERIALS.iter().enumerate() {
        let material = db.raw_material_workflow().create_material(name, unit).await?;
        db.raw_material_workflow()
            .receive_lot(&ReceiveLot {
                raw_material_id: material.id,
                lot_number: format!("RM-{:02}-{}", index + 1, today.format("%y%m")),
                quantity: 250,
                unit_cost_cents: 45_000,
                expiry_date: today.checked_add_months(Months::new(18)),
            })
            .await?;
    }

    let mismatches = db.reconciler().reconcile_all().await?;
    info!(
        products,
        batches,
        raw_materials = RAW_MATERIALS.len(),
        mismatches = mismatches.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Seed complete"
    );

    db.close().await;
    Ok(())
}

/// `{CODE}-{YYMM}` plus a suffix so two batches made in the same month stay
/// distinct.
fn batch_number(code: &str, manufactured: NaiveDate, batch_index: usize) -> String {
    format!(
        "{}-{:02}{:02}-{}",
        code,
        manufactured.year() % 100,
        manufactured.month(),
        batch_index + 1
    )
}

/// Deterministic 20..=500 spread, so some batches start near the low-stock line.
fn opening_quantity(product_index: usize, batch_index: usize) -> i64 {
    20 + ((product_index * 37 + batch_index * 113) % 481) as i64
}
