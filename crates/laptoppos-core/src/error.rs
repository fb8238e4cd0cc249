//! # Error Types
//!
//! Domain-specific error types for laptoppos-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  laptoppos-core errors (this file)                                     │
//! │  ├── CoreError        - Ledger and business rule violations            │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  laptoppos-db errors (separate crate)                                  │
//! │  └── DbError          - Database failures, wraps CoreError             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule errors.
#[derive(Debug, Error)]
pub enum CoreError {
    // -------------------------------------------------------------------------
    // Ledger
    // -------------------------------------------------------------------------
    /// Journal entry has fewer than two lines.
    #[error("Journal entry '{description}' needs at least two lines")]
    EmptyEntry { description: String },

    /// Journal entry only has debits or only has credits.
    #[error("Journal entry '{description}' must have both debit and credit lines")]
    SingleSidedEntry { description: String },

    /// Debits and credits differ.
    ///
    /// ## User Workflow
    /// ```text
    /// post_entry(draft)
    ///      │
    ///      ▼
    /// Σ debit = 150000, Σ credit = 149000
    ///      │
    ///      ▼
    /// UnbalancedEntry { debits: 150000, credits: 149000 }
    ///      │
    ///      ▼
    /// Nothing is written; the transaction never opens
    /// ```
    #[error("Journal entry is unbalanced: debits {debits}, credits {credits}")]
    UnbalancedEntry { debits: i64, credits: i64 },

    /// A line has a zero amount or both sides set.
    #[error("Invalid amount on line {line_no} ({account_code}): {reason}")]
    InvalidLineAmount {
        line_no: usize,
        account_code: String,
        reason: String,
    },

    /// Line totals overflowed i64.
    #[error("Journal entry amounts overflow")]
    AmountOverflow,

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Account {0} is inactive")]
    AccountInactive(String),

    /// Account code is already in the chart.
    #[error("Account {0} already exists")]
    DuplicateAccount(String),

    /// Account code is outside the range of its type (e.g. a 4xxx asset).
    #[error("Account code {code} is not valid for a {account_type} account")]
    CodeOutOfRange { code: String, account_type: String },

    /// System accounts are required by posting rules and cannot be changed.
    #[error("Account {0} is a system account")]
    SystemAccount(String),

    /// Account already carries postings.
    #[error("Account {0} has postings and cannot be deactivated")]
    AccountHasPostings(String),

    /// Expenses may only be booked to expense accounts.
    #[error("Account {0} is not an expense account")]
    NotAnExpenseAccount(String),

    #[error("Journal entry not found: {0}")]
    EntryNotFound(String),

    #[error("Journal entry {0} has already been reversed")]
    AlreadyReversed(String),

    /// Reversal entries are final; correct them with a new entry.
    #[error("Journal entry {0} is itself a reversal")]
    ReversalOfReversal(String),

    /// A reversal's lines must undo the original's lines exactly.
    #[error("Entry does not mirror journal entry {0}")]
    ReversalMismatch(String),

    // -------------------------------------------------------------------------
    // Inventory & Sales
    // -------------------------------------------------------------------------
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Insufficient stock to complete sale or reserve a part.
    #[error("Insufficient stock for {sku}: available {available}, requested {requested}")]
    InsufficientStock {
        sku: String,
        available: i64,
        requested: i64,
    },

    #[error("Sale not found: {0}")]
    SaleNotFound(String),

    #[error("Sale {sale_id} is {current_status}, cannot perform operation")]
    InvalidSaleStatus {
        sale_id: String,
        current_status: String,
    },

    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    #[error("Product {0} is not in the cart")]
    NotInCart(String),

    #[error("Cart is empty")]
    EmptyCart,

    /// Credit cannot pay money out (refunds, suppliers, payroll).
    #[error("Payment method {0} cannot be used to pay out")]
    PayoutMethodNotAllowed(String),

    #[error("Invalid payment amount: {reason}")]
    InvalidPaymentAmount { reason: String },

    /// Payments do not cover the amount due.
    #[error("Underpaid: due {due}, paid {paid}")]
    Underpaid { due: i64, paid: i64 },

    // -------------------------------------------------------------------------
    // Service Tickets
    // -------------------------------------------------------------------------
    #[error("Service ticket not found: {0}")]
    ServiceNotFound(String),

    #[error("Service ticket {ticket} cannot move from {from} to {to}")]
    InvalidServiceTransition {
        ticket: String,
        from: String,
        to: String,
    },

    /// Ticket was completed without any warranty period.
    #[error("Service ticket {0} has no warranty")]
    NoWarranty(String),

    #[error("Warranty for service ticket {ticket} expired at {expired_at}")]
    WarrantyExpired { ticket: String, expired_at: String },

    /// Fee exceeds what the customer has paid.
    #[error("Cancellation fee {fee} exceeds amount paid {paid}")]
    CancellationFeeTooLarge { fee: i64, paid: i64 },

    /// Warranty refund exceeds the ticket total.
    #[error("Refund {refund} exceeds ticket total {total}")]
    RefundTooLarge { refund: i64, total: i64 },

    /// Refund exceeds what the customer actually paid.
    #[error("Refund {refund} exceeds amount paid {paid}")]
    RefundExceedsPaid { refund: i64, paid: i64 },

    /// A completed ticket is missing its completion entry.
    #[error("Service ticket {0} has no completion journal entry")]
    MissingCompletionEntry(String),

    // -------------------------------------------------------------------------
    // Purchasing & Payroll
    // -------------------------------------------------------------------------
    #[error("Purchase order not found: {0}")]
    PurchaseNotFound(String),

    #[error("Purchase order {po} is {current_status}, cannot perform operation")]
    InvalidPurchaseStatus { po: String, current_status: String },

    #[error("Payroll record not found: {0}")]
    PayrollNotFound(String),

    #[error("Payroll record {0} is already paid")]
    PayrollAlreadyPaid(String),

    /// Deductions exceed gross pay.
    #[error("Deductions {deductions} exceed gross pay {gross}")]
    InvalidPayroll { gross: i64, deductions: i64 },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbalanced_message() {
        let err = CoreError::UnbalancedEntry {
            debits: 150_000,
            credits: 149_000,
        };
        assert_eq!(
            err.to_string(),
            "Journal entry is unbalanced: debits 150000, credits 149000"
        );
    }

    #[test]
    fn test_service_transition_message() {
        let err = CoreError::InvalidServiceTransition {
            ticket: "SRV-0001".to_string(),
            from: "cancelled".to_string(),
            to: "completed".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Service ticket SRV-0001 cannot move from cancelled to completed"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "sku".to_string(),
        };
        assert_eq!(err.to_string(), "sku is required");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "account code".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
