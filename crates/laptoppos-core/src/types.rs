//! # Domain Types
//!
//! Inventory, sales, purchasing and payroll types. Ledger types live in
//! [`crate::journal`] and [`crate::account`]; service tickets in
//! [`crate::service`].
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ┌───────────────┐   ┌───────────────┐   ┌────────────────────┐        │
//! │  │   Product     │   │     Sale      │   │   PurchaseOrder    │        │
//! │  │  price/cost   │   │  SaleItem × n │   │  PurchaseItem × n  │        │
//! │  │  stock        │   │  Payment × n  │   │  credit or paid    │        │
//! │  └──────┬────────┘   └──────┬────────┘   └─────────┬──────────┘        │
//! │         │ StockMovement      │ journal_entry_id     │ journal entries   │
//! │         ▼                    ▼                      ▼                   │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                       Ledger (journal.rs)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                              ▲                                          │
//! │                     PayrollRecord                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Every entity has a UUID `id` for relations plus a business identifier
//! (sku, receipt number, PO number) for people.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::account::SystemAccount;
use crate::error::{CoreError, CoreResult};
use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate in basis points (1100 = 11%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(u32);

impl TaxRate {
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Creates a tax rate from a percentage (for convenience).
    pub fn from_percentage(pct: f64) -> Self {
        TaxRate((pct * 100.0).round() as u32)
    }

    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Display only.
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Product & Stock
// =============================================================================

/// A sellable item or repair part.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub tenant_id: String,
    pub sku: String,
    pub barcode: Option<String>,
    pub name: String,
    pub description: Option<String>,
    /// Selling price in minor units.
    pub price_cents: i64,
    /// Moving average cost in minor units; feeds COGS.
    pub cost_cents: i64,
    pub tax_rate_bps: u32,
    pub track_inventory: bool,
    pub allow_negative_stock: bool,
    pub current_stock: i64,
    /// Soft delete.
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    #[inline]
    pub fn cost(&self) -> Money {
        Money::from_cents(self.cost_cents)
    }

    #[inline]
    pub fn tax_rate(&self) -> TaxRate {
        TaxRate::from_bps(self.tax_rate_bps)
    }

    /// Checks if `quantity` can leave stock.
    pub fn can_sell(&self, quantity: i64) -> bool {
        if !self.track_inventory {
            return true;
        }

        if self.current_stock >= quantity {
            return true;
        }

        self.allow_negative_stock
    }

    /// `can_sell` as a typed error.
    pub fn ensure_available(&self, quantity: i64) -> CoreResult<()> {
        if self.can_sell(quantity) {
            Ok(())
        } else {
            Err(CoreError::InsufficientStock {
                sku: self.sku.clone(),
                available: self.current_stock,
                requested: quantity,
            })
        }
    }
}

/// Why stock moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Sale,
    SaleVoid,
    Purchase,
    /// Part taken from stock for a repair.
    ServiceReserve,
    /// Part returned to stock from a cancelled repair.
    ServiceReturn,
    Adjustment,
}

/// One change to a product's on-hand quantity.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockMovement {
    pub id: String,
    pub tenant_id: String,
    pub product_id: String,
    pub kind: MovementKind,
    /// Positive into stock, negative out of stock.
    pub quantity_delta: i64,
    pub unit_cost_cents: i64,
    pub reference_id: Option<String>,
    pub note: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Moving average cost after receiving stock.
///
/// Negative on-hand quantities contribute nothing; the received cost wins.
///
/// ```rust
/// use laptoppos_core::types::weighted_average_cost;
///
/// // 10 units @ 100 + 30 units @ 200 = 40 units @ 175
/// assert_eq!(weighted_average_cost(10, 100, 30, 200), 175);
/// assert_eq!(weighted_average_cost(0, 0, 5, 80), 80);
/// ```
pub fn weighted_average_cost(
    on_hand: i64,
    current_cost_cents: i64,
    received: i64,
    received_cost_cents: i64,
) -> i64 {
    let on_hand = on_hand.max(0);
    let total_qty = on_hand + received;
    if total_qty <= 0 {
        return received_cost_cents;
    }

    let value = on_hand as i128 * current_cost_cents as i128
        + received as i128 * received_cost_cents as i128;
    // Round half up.
    ((value * 2 + total_qty as i128) / (total_qty as i128 * 2)) as i64
}

// =============================================================================
// Sale Status & Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Draft,
    Completed,
    /// Cancelled after completion; the sale entry has been reversed.
    Voided,
}

impl Default for SaleStatus {
    fn default() -> Self {
        SaleStatus::Draft
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SaleStatus::Draft => "draft",
            SaleStatus::Completed => "completed",
            SaleStatus::Voided => "voided",
        };
        f.write_str(s)
    }
}

/// How money moved. Each method settles into one ledger account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    BankTransfer,
    /// Card on an external terminal, settled to the bank.
    Card,
    /// Customer pays later (accounts receivable).
    Credit,
}

impl PaymentMethod {
    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Card => "card",
            PaymentMethod::Credit => "credit",
        }
    }

    /// Ledger account debited when money comes in by this method.
    pub const fn settlement_account(&self) -> SystemAccount {
        match self {
            PaymentMethod::Cash => SystemAccount::Cash,
            PaymentMethod::BankTransfer | PaymentMethod::Card => SystemAccount::Bank,
            PaymentMethod::Credit => SystemAccount::AccountsReceivable,
        }
    }

    /// Whether the method can pay money out (refunds, suppliers, payroll).
    pub const fn can_pay_out(&self) -> bool {
        !matches!(self, PaymentMethod::Credit)
    }

    /// Settlement account for money going out.
    pub fn payout_account(&self) -> CoreResult<SystemAccount> {
        if !self.can_pay_out() {
            return Err(CoreError::PayoutMethodNotAllowed(self.as_str().to_string()));
        }
        Ok(self.settlement_account())
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Sale
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub tenant_id: String,
    pub receipt_number: String,
    pub status: SaleStatus,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    /// Cost of tracked items sold; posted to COGS.
    pub cost_cents: i64,
    pub user_id: String,
    pub customer_name: Option<String>,
    pub notes: Option<String>,
    pub journal_entry_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// A line item in a sale. Product data is frozen at time of sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    pub sku_snapshot: String,
    pub name_snapshot: String,
    pub unit_price_cents: i64,
    pub unit_cost_cents: i64,
    pub quantity: i64,
    /// unit_price × quantity, before tax.
    pub line_total_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl SaleItem {
    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }

    #[inline]
    pub fn line_cost(&self) -> Money {
        Money::from_cents(self.unit_cost_cents).multiply_quantity(self.quantity)
    }
}

/// A payment towards a sale. Split tender produces several.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Payment {
    pub id: String,
    pub sale_id: String,
    pub method: PaymentMethod,
    /// Amount applied to the sale (tendered minus change).
    pub amount_cents: i64,
    /// For cash: amount the customer handed over.
    pub tendered_cents: Option<i64>,
    /// For cash: change returned.
    pub change_cents: Option<i64>,
    /// External reference (transfer id, card auth code, ...).
    pub reference: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl Payment {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Purchasing
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Draft,
    /// Goods in stock, supplier not yet paid.
    Received,
    Paid,
    Cancelled,
}

impl fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PurchaseStatus::Draft => "draft",
            PurchaseStatus::Received => "received",
            PurchaseStatus::Paid => "paid",
            PurchaseStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PurchaseOrder {
    pub id: String,
    pub tenant_id: String,
    pub po_number: String,
    pub supplier_name: String,
    pub status: PurchaseStatus,
    pub total_cents: i64,
    /// Received on supplier credit (accounts payable).
    pub on_credit: bool,
    pub receipt_entry_id: Option<String>,
    pub payment_entry_id: Option<String>,
    pub notes: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub received_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PurchaseItem {
    pub id: String,
    pub purchase_id: String,
    pub product_id: String,
    pub sku_snapshot: String,
    pub name_snapshot: String,
    pub quantity: i64,
    pub unit_cost_cents: i64,
    pub line_total_cents: i64,
}

/// Sum of purchase line totals.
pub fn purchase_total(items: &[PurchaseItem]) -> Money {
    items.iter().map(|i| Money::from_cents(i.line_total_cents)).sum()
}

// =============================================================================
// Payroll
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PayrollStatus {
    Pending,
    Paid,
}

/// One employee's pay for one period.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PayrollRecord {
    pub id: String,
    pub tenant_id: String,
    pub employee_name: String,
    #[ts(as = "String")]
    pub period_start: NaiveDate,
    #[ts(as = "String")]
    pub period_end: NaiveDate,
    pub gross_cents: i64,
    /// Withheld taxes and contributions, owed to third parties.
    pub deductions_cents: i64,
    pub net_cents: i64,
    pub status: PayrollStatus,
    pub journal_entry_id: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,
}

/// Checks gross/deductions and returns net pay.
pub fn payroll_net(gross_cents: i64, deductions_cents: i64) -> CoreResult<i64> {
    if gross_cents <= 0 || deductions_cents < 0 || deductions_cents > gross_cents {
        return Err(CoreError::InvalidPayroll {
            gross: gross_cents,
            deductions: deductions_cents,
        });
    }
    Ok(gross_cents - deductions_cents)
}

// =============================================================================
// Unit Tests
// =============================================================================
