//! # Database Migrations
//!
//! The schema lives in `migrations/sqlite/` and is compiled into the binary.
//!
//! ```text
//! migrations/sqlite/
//! └── 001_initial_schema.sql
//!       sequences, accounts, journal_entries, journal_lines (+ immutability
//!       triggers), products (+ FTS5), stock_movements, sales, sale_items,
//!       payments, service_tickets, service_parts, purchase_orders,
//!       purchase_items, payroll_records
//! ```
//!
//! Applied migrations are recorded in `_sqlx_migrations` with their
//! checksum, so editing an applied file fails startup. Schema changes go in
//! a new `NNN_description.sql`.

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies pending migrations in filename order. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    debug!(embedded = MIGRATOR.migrations.len(), "Checking for pending migrations");

    MIGRATOR.run(pool).await?;

    info!("Schema up to date");
    Ok(())
}

/// `(embedded, applied)` migration counts, for diagnostics.
pub async fn migration_status(pool: &SqlitePool) -> DbResult<(usize, usize)> {
    let embedded = MIGRATOR.migrations.len();

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await?;

    Ok((embedded, applied as usize))
}
