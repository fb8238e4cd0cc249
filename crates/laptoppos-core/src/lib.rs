//! # laptoppos-core: Pure Business Logic for LaptopPOS
//!
//! Ledger rules, posting rules and domain types for the LaptopPOS back
//! office (retail counter, repair desk, purchasing, payroll). Everything here
//! is deterministic and free of I/O; `laptoppos-db` persists what this crate
//! decides.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        LaptopPOS Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          laptoppos-db (repositories, FinanceManager)            │   │
//! │  │   checkout ─ service ─ purchase ─ payroll ─ reports             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ drafts, plans, totals                  │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │            ★ laptoppos-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌──────────┐       │   │
//! │  │   │ account  │  │ journal  │  │ balance  │  │ posting  │       │   │
//! │  │   │  chart   │  │  drafts  │  │ reports  │  │  rules   │       │   │
//! │  │   └──────────┘  └──────────┘  └──────────┘  └──────────┘       │   │
//! │  │   ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌──────────┐       │   │
//! │  │   │ service  │  │ reversal │  │   cart   │  │  types   │       │   │
//! │  │   │ tickets  │  │ cancels  │  │ checkout │  │ products │       │   │
//! │  │   └──────────┘  └──────────┘  └──────────┘  └──────────┘       │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`] - Integer money and tax arithmetic
//! - [`account`] - Account types, system accounts, chart of accounts
//! - [`journal`] - Journal entries, drafts, double-entry validation, reversal
//! - [`balance`] - Trial balance, income statement, balance sheet, ledgers
//! - [`posting`] - Business events to balanced journal drafts
//! - [`service`] - Repair tickets and their status machine
//! - [`reversal`] - Service cancellation and warranty refund plans
//! - [`cart`] - Checkout cart with frozen prices and costs
//! - [`types`] - Products, sales, purchasing, payroll
//! - [`error`] / [`validation`] - Typed errors and field rules
//!
//! ## Example Usage
//!
//! ```rust
//! use laptoppos_core::journal::JournalEntryDraft;
//! use laptoppos_core::money::Money;
//!
//! let draft = JournalEntryDraft::new("Owner capital")
//!     .debit("1000", Money::from_cents(500_000), "Cash in")
//!     .credit("3000", Money::from_cents(500_000), "Capital");
//!
//! assert_eq!(draft.validate().unwrap().cents(), 500_000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod account;
pub mod balance;
pub mod cart;
pub mod error;
pub mod journal;
pub mod money;
pub mod posting;
pub mod reversal;
pub mod service;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use account::{Account, AccountType, ChartOfAccounts, NormalBalance, SystemAccount};
pub use balance::{AccountBalance, AccountTotals, BalanceSheet, IncomeStatement, TrialBalance};
pub use cart::{CartItem, CartTotals, SaleCart, Tender};
pub use error::{CoreError, CoreResult, ValidationError};
pub use journal::{
    EntrySide, JournalEntry, JournalEntryDraft, JournalLine, JournalStatus, ReferenceType,
};
pub use money::Money;
pub use reversal::{CancellationPlan, CancellationRequest, CancellationScenario};
pub use service::{NewServiceTicket, ServicePart, ServiceStatus, ServiceTicket};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Tenant used by the binaries and tests when none is configured.
pub const DEFAULT_TENANT_ID: &str = "00000000-0000-0000-0000-000000000001";

/// Maximum distinct lines in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single line.
///
/// ## Business Reason
/// Catches typos at the counter (1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 999;
