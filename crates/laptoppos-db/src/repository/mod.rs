//! # Repository Module
//!
//! Tenant-scoped repositories. Each holds a pool handle and the tenant id it
//! binds into every statement.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  db.for_tenant(id)?.services().complete(ticket_id, Cash)               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ServiceRepository                                                     │
//! │  ├── load ticket + parts            (tenant_id = ?)                    │
//! │  ├── posting::service_completion_entry   ← laptoppos-core             │
//! │  └── BEGIN                                                             │
//! │        journal::insert_entry_tx     ← validates against the chart     │
//! │        UPDATE service_tickets                                          │
//! │      COMMIT                                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Business events and their journal entries are written in one transaction.
//! Dropping a transaction without `commit` rolls it back, so any `?` between
//! `begin` and `commit` leaves no trace.
//!
//! ## Available Repositories
//!
//! - [`account::AccountRepository`] - Chart of accounts
//! - [`journal::JournalRepository`] - Entries, lines, aggregates
//! - [`product::ProductRepository`] - Catalogue, search, stock movements
//! - [`sale::SaleRepository`] - Checkout and voids
//! - [`service::ServiceRepository`] - Repair tickets and cancellations
//! - [`purchase::PurchaseRepository`] - Purchase orders and supplier payments
//! - [`payroll::PayrollRepository`] - Payroll records

use sqlx::SqliteConnection;

use crate::error::DbResult;

pub mod account;
pub mod journal;
pub mod payroll;
pub mod product;
pub mod purchase;
pub mod sale;
pub mod service;

/// Next value of a per-tenant counter, starting at 1.
///
/// Runs inside the caller's transaction so a rolled-back document does not
/// burn its number.
pub(crate) async fn next_sequence(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    name: &str,
) -> DbResult<i64> {
    let value: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO sequences (tenant_id, name, last_value)
        VALUES (?1, ?2, 1)
        ON CONFLICT (tenant_id, name) DO UPDATE SET last_value = last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(tenant_id)
    .bind(name)
    .fetch_one(&mut *conn)
    .await?;

    Ok(value)
}
