//! # Account Repository
//!
//! Chart of accounts storage. Codes are unique per tenant; system accounts
//! are seeded once and never deactivated.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use laptoppos_core::{Account, AccountType, ChartOfAccounts, CoreError, SystemAccount};

const ACCOUNT_COLUMNS: &str = r#"
    id, tenant_id, code, name, account_type, parent_code,
    is_contra, is_system, is_active, created_at, updated_at
"#;

#[derive(Debug, Clone)]
pub struct AccountRepository {
    pool: SqlitePool,
    tenant_id: String,
}

impl AccountRepository {
    pub fn new(pool: SqlitePool, tenant_id: String) -> Self {
        AccountRepository { pool, tenant_id }
    }

    /// Inserts any missing system accounts. Returns how many were added.
    pub async fn seed_standard_chart(&self) -> DbResult<u64> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for sys in SystemAccount::ALL {
            let account = sys.to_account(&self.tenant_id, now);
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO accounts (
                    id, tenant_id, code, name, account_type, parent_code,
                    is_contra, is_system, is_active, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                "#,
            )
            .bind(&account.id)
            .bind(&account.tenant_id)
            .bind(&account.code)
            .bind(&account.name)
            .bind(account.account_type)
            .bind(&account.parent_code)
            .bind(account.is_contra)
            .bind(account.is_system)
            .bind(account.is_active)
            .bind(account.created_at)
            .bind(account.updated_at)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }

        tx.commit().await?;

        info!(tenant_id = %self.tenant_id, inserted, "Standard chart of accounts seeded");
        Ok(inserted)
    }

    /// Adds a tenant-defined account (e.g. `6110 Rent`).
    pub async fn create(
        &self,
        code: &str,
        name: &str,
        account_type: AccountType,
        parent_code: Option<&str>,
    ) -> DbResult<Account> {
        let mut account = Account::new(&self.tenant_id, code.trim(), name.trim(), account_type, Utc::now());
        account.parent_code = parent_code.map(str::to_string);

        let mut chart = self.load_chart().await?;
        if let Some(parent) = parent_code {
            let parent_account = chart
                .get(parent)
                .ok_or_else(|| CoreError::AccountNotFound(parent.to_string()))?;
            if parent_account.account_type != account_type {
                return Err(CoreError::CodeOutOfRange {
                    code: account.code.clone(),
                    account_type: parent_account.account_type.to_string(),
                }
                .into());
            }
        }
        chart.insert(account.clone())?;

        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, tenant_id, code, name, account_type, parent_code,
                is_contra, is_system, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&account.id)
        .bind(&account.tenant_id)
        .bind(&account.code)
        .bind(&account.name)
        .bind(account.account_type)
        .bind(&account.parent_code)
        .bind(account.is_contra)
        .bind(account.is_system)
        .bind(account.is_active)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;

        info!(code = %account.code, account_type = %account.account_type, "Account created");
        Ok(account)
    }

    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Account>> {
        let sql = format!(
            "SELECT {} FROM accounts WHERE tenant_id = ?1 AND code = ?2",
            ACCOUNT_COLUMNS
        );
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(&self.tenant_id)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        Ok(account)
    }

    /// All accounts, active and inactive, ordered by code.
    pub async fn list(&self) -> DbResult<Vec<Account>> {
        fetch_accounts(&self.pool, &self.tenant_id).await
    }

    /// Hides an account from new postings.
    ///
    /// ## Rules
    /// - System accounts cannot be deactivated
    /// - Accounts with postings cannot be deactivated
    pub async fn deactivate(&self, code: &str) -> DbResult<()> {
        let account = self
            .get_by_code(code)
            .await?
            .ok_or_else(|| DbError::not_found("Account", code))?;

        if account.is_system {
            warn!(code = %code, "Refusing to deactivate system account");
            return Err(CoreError::SystemAccount(code.to_string()).into());
        }

        let postings: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM journal_lines l
            JOIN journal_entries e ON e.id = l.entry_id
            WHERE e.tenant_id = ?1 AND l.account_code = ?2
            "#,
        )
        .bind(&self.tenant_id)
        .bind(code)
        .fetch_one(&self.pool)
        .await?;

        if postings > 0 {
            warn!(code = %code, postings, "Refusing to deactivate account with postings");
            return Err(CoreError::AccountHasPostings(code.to_string()).into());
        }

        sqlx::query(
            "UPDATE accounts SET is_active = 0, updated_at = ?1 WHERE tenant_id = ?2 AND code = ?3",
        )
        .bind(Utc::now())
        .bind(&self.tenant_id)
        .bind(code)
        .execute(&self.pool)
        .await?;

        debug!(code = %code, "Account deactivated");
        Ok(())
    }

    pub async fn load_chart(&self) -> DbResult<ChartOfAccounts> {
        let accounts = fetch_accounts(&self.pool, &self.tenant_id).await?;
        Ok(ChartOfAccounts::from_accounts(accounts))
    }
}

async fn fetch_accounts(pool: &SqlitePool, tenant_id: &str) -> DbResult<Vec<Account>> {
    let sql = format!(
        "SELECT {} FROM accounts WHERE tenant_id = ?1 ORDER BY code",
        ACCOUNT_COLUMNS
    );
    let accounts = sqlx::query_as::<_, Account>(&sql)
        .bind(tenant_id)
        .fetch_all(pool)
        .await?;
    Ok(accounts)
}

/// Chart as seen inside an open transaction.
pub(crate) async fn load_chart_tx(
    conn: &mut SqliteConnection,
    tenant_id: &str,
) -> DbResult<ChartOfAccounts> {
    let sql = format!(
        "SELECT {} FROM accounts WHERE tenant_id = ?1",
        ACCOUNT_COLUMNS
    );
    let accounts = sqlx::query_as::<_, Account>(&sql)
        .bind(tenant_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(ChartOfAccounts::from_accounts(accounts))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::ledger_db;
    use laptoppos_core::journal::JournalEntryDraft;
    use laptoppos_core::Money;

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let db = ledger_db().await;
        assert_eq!(db.accounts().seed_standard_chart().await.unwrap(), 0);

        let chart = db.accounts().load_chart().await.unwrap();
        assert_eq!(chart.len(), SystemAccount::ALL.len());
        assert!(chart.missing_system_accounts().is_empty());
        assert!(chart.get("4900").unwrap().is_contra);
    }

    #[tokio::test]
    async fn test_create_validates_code_range_and_duplicates() {
        let db = ledger_db().await;
        let accounts = db.accounts();

        let rent = accounts
            .create("6110", "Rent", AccountType::Expense, Some("6100"))
            .await
            .unwrap();
        assert_eq!(rent.parent_code.as_deref(), Some("6100"));

        assert!(matches!(
            accounts.create("6110", "Rent again", AccountType::Expense, None).await,
            Err(DbError::Rule(CoreError::DuplicateAccount(_)))
        ));
        assert!(matches!(
            accounts.create("4500", "Odd asset", AccountType::Asset, None).await,
            Err(DbError::Rule(CoreError::CodeOutOfRange { .. }))
        ));
    }

    #[tokio::test]
    async fn test_deactivate_rules() {
        let db = ledger_db().await;
        let accounts = db.accounts();

        assert!(matches!(
            accounts.deactivate("1000").await,
            Err(DbError::Rule(CoreError::SystemAccount(_)))
        ));

        accounts
            .create("6120", "Internet", AccountType::Expense, None)
            .await
            .unwrap();
        accounts
            .create("6130", "Electricity", AccountType::Expense, None)
            .await
            .unwrap();

        db.finance()
            .post_entry(
                JournalEntryDraft::new("Power bill")
                    .debit("6130", Money::from_cents(40_000), "October")
                    .credit("1000", Money::from_cents(40_000), "Paid"),
            )
            .await
            .unwrap();

        assert!(matches!(
            accounts.deactivate("6130").await,
            Err(DbError::Rule(CoreError::AccountHasPostings(_)))
        ));

        accounts.deactivate("6120").await.unwrap();
        assert!(!accounts.get_by_code("6120").await.unwrap().unwrap().is_active);
    }

    #[tokio::test]
    async fn test_tenants_have_separate_charts() {
        let db = ledger_db().await;
        let other = db
            .for_tenant("6f1c2b7e-9a43-4c55-8d1e-3b2a1c0d9e8f")
            .unwrap();

        assert!(other.accounts().list().await.unwrap().is_empty());
        other.accounts().seed_standard_chart().await.unwrap();
        assert_eq!(
            other.accounts().list().await.unwrap().len(),
            db.accounts().list().await.unwrap().len()
        );
    }
}
