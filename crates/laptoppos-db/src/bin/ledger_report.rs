//! # Ledger Report
//!
//! Prints the trial balance, income statement and balance sheet as one JSON
//! document.
//!
//! ## Usage
//! ```bash
//! # Month to date
//! cargo run -p laptoppos-db --bin ledger-report
//!
//! # Explicit period (inclusive, UTC days)
//! cargo run -p laptoppos-db --bin ledger-report -- --from 2026-09-01 --to 2026-09-30
//! ```

use std::env;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use laptoppos_db::config::AppConfig;
use laptoppos_db::logging::init_tracing;
use laptoppos_db::Database;
use serde_json::json;

fn parse_day(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| format!("expected YYYY-MM-DD, got '{}'", raw))
}

fn start_of(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN))
}

fn end_of(day: NaiveDate) -> DateTime<Utc> {
    let last = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&day.and_time(last))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load()?;

    let today = Utc::now().date_naive();
    let mut from = NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap_or(today);
    let mut to = today;

    let args: Vec<String> = env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" if i + 1 < args.len() => {
                config.database_path = args[i + 1].clone().into();
                i += 1;
            }
            "--from" if i + 1 < args.len() => {
                from = parse_day(&args[i + 1])?;
                i += 1;
            }
            "--to" if i + 1 < args.len() => {
                to = parse_day(&args[i + 1])?;
                i += 1;
            }
            "--help" | "-h" => {
                println!("LaptopPOS Ledger Report");
                println!();
                println!("Usage: ledger-report [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>     Database file path");
                println!("      --from <DATE>   Period start, YYYY-MM-DD (default: first of this month)");
                println!("      --to <DATE>     Period end, YYYY-MM-DD (default: today)");
                println!("  -h, --help          Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    // Reports go to stdout, logs stay on stderr.
    init_tracing(&config.log_filter);

    let db = Database::new(config.db_config())
        .await?
        .for_tenant(&config.tenant_id)?;
    let finance = db.finance();

    let period_end = end_of(to);
    let trial_balance = finance.trial_balance(Some(period_end)).await?;
    let income_statement = finance.income_statement(start_of(from), period_end).await?;
    let balance_sheet = finance.balance_sheet(period_end).await?;
    let integrity = finance.verify_integrity().await?;
    let healthy = integrity.is_healthy();

    let report = json!({
        "tenant_id": config.tenant_id,
        "period": { "from": from, "to": to },
        "trial_balance": trial_balance,
        "income_statement": income_statement,
        "balance_sheet": balance_sheet,
        "integrity": integrity,
    });

    println!("{}", serde_json::to_string_pretty(&report)?);
    db.close().await;

    if !healthy {
        std::process::exit(2);
    }
    Ok(())
}
