//! # Seed Data Generator
//!
//! Builds a demo shop: chart of accounts, opening capital, a laptop and
//! parts catalogue, and a few weeks of business on top of it.
//!
//! ## Usage
//! ```bash
//! # Seed the database from LAPTOPPOS_DB_PATH (default ./laptoppos.db)
//! cargo run -p laptoppos-db --bin seed
//!
//! # Specify database path
//! cargo run -p laptoppos-db --bin seed -- --db ./data/demo.db
//! ```
//!
//! ## Generated Activity
//! - Owner's capital into cash and bank
//! - Catalogue received through a purchase order on supplier credit
//! - Supplier paid by bank transfer
//! - Counter sales with split tenders
//! - Repair tickets: one completed, one cancelled with a fee
//! - Rent expense and one payroll run
//!
//! Every step goes through the repositories, so the ledger ends up exactly
//! as it would from the counter. The run ends with an integrity check.

use std::env;

use chrono::{Datelike, NaiveDate, Utc};
use laptoppos_core::journal::JournalEntryDraft;
use laptoppos_core::{
    CancellationRequest, Money, NewServiceTicket, PaymentMethod, Product, ReferenceType, SaleCart,
    ServiceStatus, Tender,
};
use laptoppos_db::config::AppConfig;
use laptoppos_db::logging::init_tracing;
use laptoppos_db::repository::product::new_product;
use laptoppos_db::repository::purchase::PurchaseLine;
use laptoppos_db::Database;

/// (sku, name, price, cost, tax bps) in minor units.
const CATALOGUE: &[(&str, &str, i64, i64, u32)] = &[
    ("LT-TP-T480", "Lenovo ThinkPad T480 i5 16GB", 6_500_000, 5_200_000, 1100),
    ("LT-DL-5490", "Dell Latitude 5490 i5 8GB", 5_200_000, 4_100_000, 1100),
    ("LT-HP-840G5", "HP EliteBook 840 G5 i7 16GB", 7_400_000, 6_000_000, 1100),
    ("SSD-512", "NVMe SSD 512GB", 750_000, 520_000, 1100),
    ("SSD-1T", "NVMe SSD 1TB", 1_250_000, 900_000, 1100),
    ("RAM-8", "DDR4 SODIMM 8GB", 380_000, 260_000, 1100),
    ("RAM-16", "DDR4 SODIMM 16GB", 690_000, 480_000, 1100),
    ("BAT-T480", "ThinkPad T480 battery 72Wh", 850_000, 600_000, 1100),
    ("KB-T480", "ThinkPad T480 keyboard US", 450_000, 300_000, 1100),
    ("CHG-65W", "USB-C charger 65W", 320_000, 210_000, 1100),
];

/// Units bought per catalogue line.
const OPENING_QUANTITIES: &[i64] = &[4, 3, 2, 10, 6, 12, 8, 5, 5, 15];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load()?;

    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    config.database_path = args[i + 1].clone().into();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("LaptopPOS Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: $LAPTOPPOS_DB_PATH or ./laptoppos.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    init_tracing(&config.log_filter);

    println!("🌱 LaptopPOS Seed Data Generator");
    println!("================================");
    println!("Database: {}", config.database_path.display());
    println!("Tenant:   {}", config.tenant_id);
    println!();

    let db = Database::new(config.db_config())
        .await?
        .for_tenant(&config.tenant_id)?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let accounts = db.accounts().seed_standard_chart().await?;
    println!("✓ Chart of accounts ({} new accounts)", accounts);

    if !db.products().list_active(1).await?.is_empty() {
        println!("⚠ Database already has products");
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    let start = std::time::Instant::now();

    // Opening capital
    let capital = JournalEntryDraft::new("Owner's opening capital")
        .reference(ReferenceType::Manual, "opening-capital")
        .debit("1000", Money::from_cents(5_000_000), "Cash float")
        .debit("1010", Money::from_cents(80_000_000), "Bank")
        .credit("3000", Money::from_cents(85_000_000), "Owner's equity");
    db.finance().post_entry(capital).await?;
    println!("✓ Opening capital posted");

    // Catalogue and stock
    let mut products: Vec<Product> = Vec::with_capacity(CATALOGUE.len());
    for (sku, name, price, cost, tax) in CATALOGUE {
        let mut product = new_product(sku, name, *price, *cost);
        product.tax_rate_bps = *tax;
        products.push(db.products().insert(&product).await?);
    }
    println!("✓ {} products created", products.len());

    let lines: Vec<PurchaseLine> = products
        .iter()
        .zip(OPENING_QUANTITIES)
        .map(|(p, qty)| PurchaseLine::new(&p.id, *qty, p.cost_cents))
        .collect();
    let order = db
        .purchases()
        .create_order("PT Sumber Komputer", &lines, Some("Opening stock"))
        .await?;
    db.purchases().receive(&order.id, None).await?;
    db.purchases()
        .pay_supplier(&order.id, PaymentMethod::BankTransfer)
        .await?;
    println!("✓ {} received and paid ({})", order.po_number, Money::from_cents(order.total_cents));

    // Counter sales
    let mut sales = 0;
    for (laptop, extra, tenders) in [
        (0, Some(6), vec![Tender::new(PaymentMethod::Cash, 8_000_000)]),
        (
            1,
            Some(9),
            vec![
                Tender::new(PaymentMethod::Card, 4_000_000).with_reference("EDC-00412"),
                Tender::new(PaymentMethod::Cash, 2_200_000),
            ],
        ),
        (2, None, vec![Tender::new(PaymentMethod::BankTransfer, 8_214_000)]),
    ] {
        let mut cart = SaleCart::new();
        cart.add_item(&products[laptop], 1)?;
        if let Some(idx) = extra {
            cart.add_item(&products[idx], 1)?;
        }
        let sale = db.sales().checkout(&cart, &tenders, "seed", None).await?;
        println!("  Sale {} total {}", sale.receipt_number, Money::from_cents(sale.total_cents));
        sales += 1;
    }
    println!("✓ {} sales", sales);

    // Service desk
    let services = db.services();
    let upgrade = services
        .create_ticket(&NewServiceTicket {
            customer_name: "Rina Kusuma".to_string(),
            customer_phone: Some("0812-555-0101".to_string()),
            device_description: "ThinkPad T480".to_string(),
            serial_number: Some("PF-1XK2".to_string()),
            problem_description: "Slow boot, upgrade to NVMe and 16GB".to_string(),
            labor_cents: 150_000,
            warranty_days: 30,
        })
        .await?;
    services
        .record_deposit(&upgrade.id, Money::from_cents(500_000), PaymentMethod::Cash)
        .await?;
    services.update_status(&upgrade.id, ServiceStatus::InProgress).await?;
    services.add_part(&upgrade.id, &products[3].id, 1).await?;
    services.add_part(&upgrade.id, &products[6].id, 1).await?;
    let upgrade = services.complete(&upgrade.id, PaymentMethod::Cash).await?;
    println!("  Ticket {} completed", upgrade.ticket_number);

    let declined = services
        .create_ticket(&NewServiceTicket {
            customer_name: "Budi Santoso".to_string(),
            customer_phone: None,
            device_description: "Dell Latitude 5490".to_string(),
            serial_number: None,
            problem_description: "Keyboard unresponsive".to_string(),
            labor_cents: 100_000,
            warranty_days: 0,
        })
        .await?;
    services
        .record_deposit(&declined.id, Money::from_cents(100_000), PaymentMethod::Cash)
        .await?;
    services.update_status(&declined.id, ServiceStatus::Diagnosing).await?;
    let outcome = services
        .cancel(
            &declined.id,
            &CancellationRequest::cancel("Customer declined the quote", PaymentMethod::Cash).with_fee(25_000),
        )
        .await?;
    println!(
        "  Ticket {} cancelled, refunded {}",
        outcome.ticket.ticket_number,
        Money::from_cents(outcome.refund_cents)
    );
    println!("✓ Service desk seeded");

    // Overheads
    db.finance()
        .record_expense("6100", Money::from_cents(3_500_000), PaymentMethod::BankTransfer, "Shop rent")
        .await?;

    let today = Utc::now().date_naive();
    let period_start = NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap_or(today);
    let record = db
        .payroll()
        .create_record("Dewi Lestari", period_start, today, 4_500_000, 250_000)
        .await?;
    db.payroll().pay(&record.id, PaymentMethod::BankTransfer).await?;
    println!("✓ Rent and payroll posted");

    // Verify
    println!();
    println!("Verifying ledger...");
    let report = db.finance().verify_integrity().await?;
    println!(
        "  {} entries, debits {} credits {}",
        report.entries_checked,
        Money::from_cents(report.total_debits_cents),
        Money::from_cents(report.total_credits_cents)
    );
    if !report.is_healthy() {
        return Err(format!("unbalanced entries: {:?}", report.unbalanced_entries).into());
    }

    let hits = db.products().search("thinkpad", 10).await?;
    println!("  Search 'thinkpad': {} results", hits.len());

    println!();
    println!("✓ Seed complete in {:?}", start.elapsed());

    Ok(())
}
