//! # Database Error Types
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SQLite error (sqlx::Error) ──┐                                        │
//! │                               ├──► DbError ──► repository caller       │
//! │  Business rule (CoreError) ───┘                                        │
//! │                                                                         │
//! │  A rejected rule never leaves a partial write: the open transaction    │
//! │  is dropped, which rolls it back.                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The schema backs the rules with its own guards (UNIQUE keys, CHECKs and
//! the journal immutability triggers); those come back as the variants
//! below rather than raw SQLite text.

use laptoppos_core::{CoreError, ValidationError};
use thiserror::Error;

/// Raised by the `journal_lines_no_update` / `journal_lines_no_delete` triggers.
const IMMUTABLE_LEDGER_MESSAGE: &str = "journal lines are immutable";

#[derive(Debug, Error)]
pub enum DbError {
    /// A ledger or business rule rejected the operation.
    #[error(transparent)]
    Rule(#[from] CoreError),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Duplicate SKU, account code or document number within a tenant.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// A CHECK constraint refused the row (negative amounts, bad status text).
    #[error("Constraint failed: {0}")]
    ConstraintViolation(String),

    /// Something tried to edit or delete posted journal lines.
    #[error("Posted journal lines cannot be changed")]
    LedgerImmutable,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Connection pool exhausted")]
    PoolExhausted,

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Maps a SQLite error message onto a variant.
    fn from_sqlite_message(msg: &str) -> Self {
        if msg.contains(IMMUTABLE_LEDGER_MESSAGE) {
            return DbError::LedgerImmutable;
        }
        if let Some(columns) = msg.strip_prefix("UNIQUE constraint failed: ") {
            return DbError::duplicate(unique_field(columns), "unknown");
        }
        if msg.contains("FOREIGN KEY constraint failed") {
            return DbError::ForeignKeyViolation {
                message: msg.to_string(),
            };
        }
        if let Some(check) = msg.strip_prefix("CHECK constraint failed: ") {
            return DbError::ConstraintViolation(check.to_string());
        }
        DbError::QueryFailed(msg.to_string())
    }
}

/// `"products.tenant_id, products.sku"` → `"sku"`: the tenant column is
/// part of every business key, so the last column names the clash.
fn unique_field(columns: &str) -> String {
    columns
        .rsplit(',')
        .next()
        .map(str::trim)
        .and_then(|col| col.rsplit('.').next())
        .filter(|col| !col.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

impl From<ValidationError> for DbError {
    fn from(err: ValidationError) -> Self {
        DbError::Rule(CoreError::Validation(err))
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),
            sqlx::Error::Database(db_err) => DbError::from_sqlite_message(db_err.message()),
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),
            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_errors_pass_through() {
        let err: DbError = CoreError::UnbalancedEntry {
            debits: 100,
            credits: 90,
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Journal entry is unbalanced: debits 100, credits 90"
        );
        assert!(matches!(err, DbError::Rule(CoreError::UnbalancedEntry { .. })));
    }

    #[test]
    fn test_validation_errors_wrap_as_rule() {
        let err: DbError = ValidationError::Required {
            field: "name".to_string(),
        }
        .into();
        assert!(matches!(err, DbError::Rule(CoreError::Validation(_))));
    }

    #[test]
    fn test_sqlite_messages() {
        assert!(matches!(
            DbError::from_sqlite_message("journal lines are immutable"),
            DbError::LedgerImmutable
        ));
        match DbError::from_sqlite_message("UNIQUE constraint failed: products.tenant_id, products.sku") {
            DbError::UniqueViolation { field, .. } => assert_eq!(field, "sku"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            DbError::from_sqlite_message("CHECK constraint failed: quantity > 0"),
            DbError::ConstraintViolation(_)
        ));
        assert!(matches!(
            DbError::from_sqlite_message("no such table: widgets"),
            DbError::QueryFailed(_)
        ));
    }

    #[test]
    fn test_not_found_helper() {
        let err = DbError::not_found("Account", "9999");
        assert_eq!(err.to_string(), "Account not found: 9999");
    }
}
