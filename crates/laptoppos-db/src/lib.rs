//! # laptoppos-db: Storage Layer for LaptopPOS
//!
//! SQLite persistence for the back office. Every business event (sale,
//! repair, purchase, payroll run) is written together with its journal
//! entry in one transaction.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      LaptopPOS Data Flow                                │
//! │                                                                         │
//! │  bin/seed, bin/ledger-report, back-office frontend                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  laptoppos-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │  sale, service│    │  (embedded)  │  │   │
//! │  │   │               │◄───│  purchase ... │    │              │  │   │
//! │  │   │ for_tenant()  │    ├───────────────┤    │ 001_initial  │  │   │
//! │  │   │               │◄───│ FinanceManager│    │   _schema    │  │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │                                │ posting rules, reports        │   │
//! │  │                                ▼                                │   │
//! │  │                        laptoppos-core                           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file ($LAPTOPPOS_DB_PATH)                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Environment configuration
//! - [`logging`] - Tracing subscriber setup for binaries
//! - [`pool`] - Connection pool and tenant scoping
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Tenant-scoped repositories
//! - [`finance`] - Ledger façade: postings, reversals, reports
//!
//! ## Usage
//!
//! ```rust,ignore
//! use laptoppos_db::{AppConfig, Database};
//!
//! let config = AppConfig::load()?;
//! let db = Database::new(config.db_config()).await?.for_tenant(&config.tenant_id)?;
//! db.accounts().seed_standard_chart().await?;
//!
//! let sale = db.sales().checkout(&cart, &tenders, "cashier-1", None).await?;
//! let tb = db.finance().trial_balance(None).await?;
//! assert!(tb.is_balanced());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod finance;
pub mod logging;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{AppConfig, ConfigError};
pub use error::{DbError, DbResult};
pub use finance::{FinanceManager, IntegrityReport};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::account::AccountRepository;
pub use repository::journal::JournalRepository;
pub use repository::payroll::PayrollRepository;
pub use repository::product::ProductRepository;
pub use repository::purchase::{PurchaseLine, PurchaseRepository};
pub use repository::sale::SaleRepository;
pub use repository::service::{CancellationOutcome, ServiceRepository};
