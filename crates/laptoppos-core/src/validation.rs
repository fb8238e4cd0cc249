//! # Validation Module
//!
//! Input validation for LaptopPOS.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: Caller (frontend / importer)                                  │
//! │  └── Basic format checks                                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                   │
//! │  └── Field rules: codes, names, amounts, quantities                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Ledger rules (journal.rs)                                     │
//! │  └── Balanced entries, postable accounts                                │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 4: SQLite                                                        │
//! │  └── NOT NULL, UNIQUE, FOREIGN KEY, CHECK constraints                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use laptoppos_core::validation::{validate_account_code, validate_quantity};
//!
//! validate_account_code("4100").unwrap();
//! validate_quantity(2).unwrap();
//! ```

use crate::error::ValidationError;
use crate::MAX_ITEM_QUANTITY;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

fn required_trimmed<'a>(field: &str, value: &'a str, max: usize) -> ValidationResult<&'a str> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    Ok(value)
}

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty, at most 50 characters
/// - Letters, digits, hyphens and underscores only
///
/// ```rust
/// use laptoppos_core::validation::validate_sku;
///
/// assert!(validate_sku("SSD-512-NVME").is_ok());
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("has space").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = required_trimmed("sku", sku, 50)?;

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a product name (1-200 characters).
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    required_trimmed("name", name, 200).map(|_| ())
}

/// Validates an account name (1-100 characters).
pub fn validate_account_name(name: &str) -> ValidationResult<()> {
    required_trimmed("account name", name, 100).map(|_| ())
}

/// Validates the name of a customer, supplier or employee (1-100 characters).
pub fn validate_party_name(field: &str, name: &str) -> ValidationResult<()> {
    required_trimmed(field, name, 100).map(|_| ())
}

/// Validates a warranty period in days (0 to 10 years).
pub fn validate_warranty_days(days: i64) -> ValidationResult<()> {
    if !(0..=3650).contains(&days) {
        return Err(ValidationError::OutOfRange {
            field: "warranty days".to_string(),
            min: 0,
            max: 3650,
        });
    }
    Ok(())
}

/// Validates a journal or business description (1-500 characters).
pub fn validate_description(description: &str) -> ValidationResult<()> {
    required_trimmed("description", description, 500).map(|_| ())
}

/// Validates a search query and returns it trimmed. Empty is allowed.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.len() > 100 {
        return Err(ValidationError::TooLong {
            field: "query".to_string(),
            max: 100,
        });
    }

    Ok(query.to_string())
}

/// Validates a chart-of-accounts code.
///
/// ## Rules
/// - 4 to 10 ASCII digits
/// - The first digit selects the account type (see `AccountType::code_prefixes`)
///
/// ```rust
/// use laptoppos_core::validation::validate_account_code;
///
/// assert!(validate_account_code("1000").is_ok());
/// assert!(validate_account_code("6200-01").is_err());
/// assert!(validate_account_code("12").is_err());
/// ```
pub fn validate_account_code(code: &str) -> ValidationResult<()> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "account code".to_string(),
        });
    }

    if code.len() < 4 {
        return Err(ValidationError::TooShort {
            field: "account code".to_string(),
            min: 4,
        });
    }

    if code.len() > 10 {
        return Err(ValidationError::TooLong {
            field: "account code".to_string(),
            max: 10,
        });
    }

    if !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "account code".to_string(),
            reason: "must contain only digits".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity value (1..=MAX_ITEM_QUANTITY).
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price or cost in minor units. Zero is allowed.
///
/// ```rust
/// use laptoppos_core::validation::validate_price_cents;
///
/// assert!(validate_price_cents(1099).is_ok());
/// assert!(validate_price_cents(0).is_ok());
/// assert!(validate_price_cents(-100).is_err());
/// ```
pub fn validate_price_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::OutOfRange {
            field: "price".to_string(),
            min: 0,
            max: i64::MAX,
        });
    }

    Ok(())
}

/// Validates a payment amount (> 0).
pub fn validate_payment_amount(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "payment amount".to_string(),
        });
    }

    Ok(())
}

/// Validates an amount posted to the ledger by a business operation (> 0).
pub fn validate_posting_amount(field: &str, cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates a tax rate in basis points (0..=10000).
pub fn validate_tax_rate_bps(bps: u32) -> ValidationResult<()> {
    if bps > 10000 {
        return Err(ValidationError::OutOfRange {
            field: "tax_rate".to_string(),
            min: 0,
            max: 10000,
        });
    }

    Ok(())
}

// =============================================================================
// Identifier Validators
// =============================================================================

/// Validates a UUID string.
///
/// ```rust
/// use laptoppos_core::validation::validate_uuid;
///
/// assert!(validate_uuid("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_uuid("not-a-uuid").is_err());
/// ```
pub fn validate_uuid(id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: "id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

/// Validates a tenant identifier. Tenants are keyed by UUID.
pub fn validate_tenant_id(tenant_id: &str) -> ValidationResult<()> {
    validate_uuid(tenant_id).map_err(|_| ValidationError::InvalidFormat {
        field: "tenant_id".to_string(),
        reason: "must be a valid UUID".to_string(),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
