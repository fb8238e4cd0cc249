//! # FinanceManager
//!
//! Tenant-scoped façade over the ledger: manual postings, reversals,
//! expenses and every report derived from journal lines.
//!
//! ## Report Derivation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  journal_lines ⋈ journal_entries (tenant, date range)                  │
//! │       │  GROUP BY account_code                                          │
//! │       ▼                                                                 │
//! │  Vec<AccountTotals> + ChartOfAccounts                                   │
//! │       │                                                                 │
//! │       ├── TrialBalance::from_totals     (as_of)                         │
//! │       ├── IncomeStatement::from_totals  (from..=to)                     │
//! │       ├── BalanceSheet::from_totals     (as_of)                         │
//! │       └── AccountLedger::build          (opening + postings)            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing here caches a balance. Each report re-reads the journal.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::account::{load_chart_tx, AccountRepository};
use crate::repository::journal::{insert_entry_tx, reverse_entry_tx, JournalRepository};
use laptoppos_core::balance::AccountLedger;
use laptoppos_core::posting::expense_entry;
use laptoppos_core::{
    AccountBalance, BalanceSheet, ChartOfAccounts, CoreError, IncomeStatement, JournalEntry,
    JournalEntryDraft, Money, PaymentMethod, TrialBalance,
};

/// Result of [`FinanceManager::verify_integrity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub entries_checked: usize,
    /// Entry numbers whose lines do not balance.
    pub unbalanced_entries: Vec<String>,
    pub total_debits_cents: i64,
    pub total_credits_cents: i64,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.unbalanced_entries.is_empty() && self.total_debits_cents == self.total_credits_cents
    }
}

#[derive(Debug, Clone)]
pub struct FinanceManager {
    pool: SqlitePool,
    tenant_id: String,
}

impl FinanceManager {
    pub fn new(pool: SqlitePool, tenant_id: String) -> Self {
        FinanceManager { pool, tenant_id }
    }

    fn journal(&self) -> JournalRepository {
        JournalRepository::new(self.pool.clone(), self.tenant_id.clone())
    }

    async fn chart(&self) -> DbResult<ChartOfAccounts> {
        AccountRepository::new(self.pool.clone(), self.tenant_id.clone())
            .load_chart()
            .await
    }

    // =========================================================================
    // Postings
    // =========================================================================

    /// Posts a manually built entry.
    pub async fn post_entry(&self, draft: JournalEntryDraft) -> DbResult<JournalEntry> {
        let mut tx = self.pool.begin().await?;
        let entry = insert_entry_tx(&mut tx, &self.tenant_id, &draft).await?;
        tx.commit().await?;
        Ok(entry)
    }

    /// Posts the mirror image of an entry and marks the original reversed.
    pub async fn reverse_entry(&self, entry_id: &str, reason: &str) -> DbResult<JournalEntry> {
        let mut tx = self.pool.begin().await?;
        let reversal = reverse_entry_tx(&mut tx, &self.tenant_id, entry_id, reason).await?;
        tx.commit().await?;

        info!(
            original = %entry_id,
            reversal = %reversal.entry_number,
            "Journal entry reversed"
        );
        Ok(reversal)
    }

    /// Books an operating expense paid from cash or bank.
    ///
    /// ## Rules
    /// - `account_code` must be an active expense account
    /// - The payment method must be able to pay out (not `Credit`)
    pub async fn record_expense(
        &self,
        account_code: &str,
        amount: Money,
        method: PaymentMethod,
        description: &str,
    ) -> DbResult<JournalEntry> {
        let mut tx = self.pool.begin().await?;
        let chart = load_chart_tx(&mut tx, &self.tenant_id).await?;
        let account = chart.require_postable(account_code)?;
        let draft = expense_entry(account, amount, method, description)?;
        let entry = insert_entry_tx(&mut tx, &self.tenant_id, &draft).await?;
        tx.commit().await?;

        debug!(account = %account_code, amount = %amount, method = %method, "Expense recorded");
        Ok(entry)
    }

    // =========================================================================
    // Balances & Reports
    // =========================================================================

    /// Balance of one account from every posting up to `as_of` (inclusive).
    pub async fn account_balance(
        &self,
        account_code: &str,
        as_of: Option<DateTime<Utc>>,
    ) -> DbResult<AccountBalance> {
        let chart = self.chart().await?;
        let account = chart
            .get(account_code)
            .ok_or_else(|| CoreError::AccountNotFound(account_code.to_string()))?;

        let totals = self.journal().account_totals(None, as_of).await?;
        let (debit, credit) = totals
            .iter()
            .find(|t| t.account_code == account_code)
            .map(|t| (t.debit_cents, t.credit_cents))
            .unwrap_or((0, 0));

        Ok(AccountBalance::new(account, debit, credit))
    }

    pub async fn trial_balance(&self, as_of: Option<DateTime<Utc>>) -> DbResult<TrialBalance> {
        let chart = self.chart().await?;
        let totals = self.journal().account_totals(None, as_of).await?;
        let trial = TrialBalance::from_totals(&chart, &totals, as_of)?;

        if !trial.is_balanced() {
            warn!(
                debits = trial.total_debits_cents,
                credits = trial.total_credits_cents,
                "Trial balance does not balance"
            );
        }
        Ok(trial)
    }

    /// Revenue and expenses for postings in `[from, to]`.
    pub async fn income_statement(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DbResult<IncomeStatement> {
        if to < from {
            return Err(DbError::Internal(format!(
                "Income statement period ends before it starts: {} > {}",
                from, to
            )));
        }
        let chart = self.chart().await?;
        let totals = self.journal().account_totals(Some(from), Some(to)).await?;
        Ok(IncomeStatement::from_totals(&chart, &totals, from, to)?)
    }

    pub async fn balance_sheet(&self, as_of: DateTime<Utc>) -> DbResult<BalanceSheet> {
        let chart = self.chart().await?;
        let totals = self.journal().account_totals(None, Some(as_of)).await?;
        let sheet = BalanceSheet::from_totals(&chart, &totals, as_of)?;

        if !sheet.is_balanced() {
            warn!(
                assets = sheet.total_assets_cents,
                liabilities = sheet.total_liabilities_cents,
                equity = sheet.total_equity_cents,
                "Balance sheet does not balance"
            );
        }
        Ok(sheet)
    }

    /// Postings to one account with a running balance. The opening balance
    /// covers everything before `from`.
    pub async fn account_ledger(
        &self,
        account_code: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> DbResult<AccountLedger> {
        let chart = self.chart().await?;
        let account = chart
            .get(account_code)
            .ok_or_else(|| CoreError::AccountNotFound(account_code.to_string()))?;

        let journal = self.journal();
        let opening = match from {
            Some(start) => {
                let (debit, credit) = journal.sums_before(account_code, start).await?;
                account.normal_balance().signed(debit, credit)
            }
            None => 0,
        };
        let postings = journal.account_postings(account_code, from, to).await?;

        Ok(AccountLedger::build(account, opening, postings))
    }

    /// Re-checks the double-entry invariant over the stored journal.
    pub async fn verify_integrity(&self) -> DbResult<IntegrityReport> {
        let journal = self.journal();
        let entries = journal.list_entries(None, None).await?;
        let unbalanced = journal.unbalanced_entries().await?;
        let totals = journal.account_totals(None, None).await?;

        let report = IntegrityReport {
            entries_checked: entries.len(),
            unbalanced_entries: unbalanced,
            total_debits_cents: totals.iter().map(|t| t.debit_cents).sum(),
            total_credits_cents: totals.iter().map(|t| t.credit_cents).sum(),
        };

        if report.is_healthy() {
            info!(entries = report.entries_checked, "Ledger integrity verified");
        } else {
            warn!(
                unbalanced = report.unbalanced_entries.len(),
                debits = report.total_debits_cents,
                credits = report.total_credits_cents,
                "Ledger integrity check failed"
            );
        }
        Ok(report)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::ledger_db;
    use chrono::Duration;
    use laptoppos_core::{AccountType, JournalStatus};

    fn cents(c: i64) -> Money {
        Money::from_cents(c)
    }

    #[tokio::test]
    async fn test_post_and_balance() {
        let db = ledger_db().await;
        let finance = db.finance();

        finance
            .post_entry(
                JournalEntryDraft::new("Opening capital")
                    .debit("1000", cents(1_000_000), "")
                    .credit("3000", cents(1_000_000), ""),
            )
            .await
            .unwrap();

        let cash = finance.account_balance("1000", None).await.unwrap();
        assert_eq!(cash.balance_cents, 1_000_000);

        let equity = finance.account_balance("3000", None).await.unwrap();
        assert_eq!(equity.balance_cents, 1_000_000);

        let untouched = finance.account_balance("1010", None).await.unwrap();
        assert_eq!(untouched.balance_cents, 0);
    }

    #[tokio::test]
    async fn test_unbalanced_draft_is_rejected() {
        let db = ledger_db().await;
        let result = db
            .finance()
            .post_entry(
                JournalEntryDraft::new("Broken")
                    .debit("1000", cents(100), "")
                    .credit("3000", cents(90), ""),
            )
            .await;

        assert!(matches!(
            result,
            Err(DbError::Rule(CoreError::UnbalancedEntry { .. }))
        ));
    }

    #[tokio::test]
    async fn test_reverse_restores_balances() {
        let db = ledger_db().await;
        let finance = db.finance();
        let entry = finance
            .post_entry(
                JournalEntryDraft::new("Wrong deposit")
                    .debit("1010", cents(5_000), "")
                    .credit("3000", cents(5_000), ""),
            )
            .await
            .unwrap();

        finance.reverse_entry(&entry.id, "posted twice").await.unwrap();

        assert_eq!(finance.account_balance("1010", None).await.unwrap().balance_cents, 0);
        assert!(matches!(
            finance.reverse_entry(&entry.id, "again").await,
            Err(DbError::Rule(CoreError::AlreadyReversed(_)))
        ));
    }

    #[tokio::test]
    async fn test_manual_entry_cannot_mark_reversal() {
        let db = ledger_db().await;
        let finance = db.finance();
        let original = finance
            .post_entry(
                JournalEntryDraft::new("Capital")
                    .debit("1000", cents(100_000), "")
                    .credit("3000", cents(100_000), ""),
            )
            .await
            .unwrap();

        // A draft arriving as JSON cannot claim to reverse anything.
        let draft: JournalEntryDraft = serde_json::from_value(serde_json::json!({
            "description": "Warranty payout",
            "reference_type": "manual",
            "reference_id": null,
            "reverses_entry_id": original.id,
            "posted_at": null,
            "lines": [
                { "account_code": "6200", "side": "debit", "amount": 1, "memo": null },
                { "account_code": "1000", "side": "credit", "amount": 1, "memo": null }
            ]
        }))
        .unwrap();
        assert_eq!(draft.reverses_entry_id(), None);

        let posted = finance.post_entry(draft).await.unwrap();
        assert!(!posted.is_reversal());
        let stored = db.journal().get_entry(&original.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JournalStatus::Posted);

        finance.reverse_entry(&original.id, "duplicate").await.unwrap();
    }

    #[tokio::test]
    async fn test_record_expense() {
        let db = ledger_db().await;
        let finance = db.finance();
        db.accounts()
            .create("6110", "Rent", AccountType::Expense, Some("6100"))
            .await
            .unwrap();

        finance
            .record_expense("6110", cents(250_000), PaymentMethod::BankTransfer, "October rent")
            .await
            .unwrap();

        assert_eq!(finance.account_balance("6110", None).await.unwrap().balance_cents, 250_000);
        assert_eq!(finance.account_balance("1010", None).await.unwrap().balance_cents, -250_000);

        assert!(matches!(
            finance
                .record_expense("4000", cents(100), PaymentMethod::Cash, "Not an expense")
                .await,
            Err(DbError::Rule(CoreError::NotAnExpenseAccount(_)))
        ));
        assert!(matches!(
            finance
                .record_expense("6110", cents(100), PaymentMethod::Credit, "On account")
                .await,
            Err(DbError::Rule(CoreError::PayoutMethodNotAllowed(_)))
        ));
    }

    #[tokio::test]
    async fn test_reports_balance() {
        let db = ledger_db().await;
        let finance = db.finance();

        finance
            .post_entry(
                JournalEntryDraft::new("Capital")
                    .debit("1000", cents(100_000), "")
                    .credit("3000", cents(100_000), ""),
            )
            .await
            .unwrap();
        finance
            .post_entry(
                JournalEntryDraft::new("Repair income")
                    .debit("1000", cents(30_000), "")
                    .credit("4100", cents(30_000), ""),
            )
            .await
            .unwrap();
        finance
            .record_expense("6100", cents(10_000), PaymentMethod::Cash, "Supplies")
            .await
            .unwrap();

        let now = Utc::now();
        let trial = finance.trial_balance(None).await.unwrap();
        assert!(trial.is_balanced());
        assert_eq!(trial.total_debits_cents, 130_000);

        let income = finance
            .income_statement(now - Duration::days(1), now + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(income.total_revenue_cents, 30_000);
        assert_eq!(income.net_income_cents, 20_000);

        let sheet = finance.balance_sheet(now + Duration::days(1)).await.unwrap();
        assert!(sheet.is_balanced());
        assert_eq!(sheet.total_assets_cents, 120_000);
        assert_eq!(sheet.current_earnings_cents, 20_000);

        let report = finance.verify_integrity().await.unwrap();
        assert!(report.is_healthy());
        assert_eq!(report.entries_checked, 3);
    }

    #[tokio::test]
    async fn test_account_ledger_running_balance() {
        let db = ledger_db().await;
        let finance = db.finance();
        let earlier = Utc::now() - Duration::days(10);

        finance
            .post_entry(
                JournalEntryDraft::new("Old capital")
                    .posted_at(earlier)
                    .debit("1000", cents(50_000), "")
                    .credit("3000", cents(50_000), ""),
            )
            .await
            .unwrap();
        finance
            .post_entry(
                JournalEntryDraft::new("Sale")
                    .debit("1000", cents(7_000), "")
                    .credit("4000", cents(7_000), ""),
            )
            .await
            .unwrap();
        finance
            .record_expense("6100", cents(2_000), PaymentMethod::Cash, "Cleaning")
            .await
            .unwrap();

        let ledger = finance
            .account_ledger("1000", Some(Utc::now() - Duration::days(1)), None)
            .await
            .unwrap();

        assert_eq!(ledger.opening_balance_cents, 50_000);
        assert_eq!(ledger.lines.len(), 2);
        assert_eq!(ledger.lines[0].running_balance_cents, 57_000);
        assert_eq!(ledger.closing_balance_cents, 55_000);
    }

    #[tokio::test]
    async fn test_income_statement_rejects_inverted_period() {
        let db = ledger_db().await;
        let now = Utc::now();
        assert!(db
            .finance()
            .income_statement(now, now - Duration::days(1))
            .await
            .is_err());
    }
}
