//! # Derived Balances & Financial Statements
//!
//! Account balances are never stored. The database hands back per-account
//! debit/credit totals ([`AccountTotals`]) and everything here is computed
//! from them.
//!
//! ```text
//! journal_lines ──SUM by account──► AccountTotals ──┬──► TrialBalance
//!                                                   ├──► IncomeStatement
//!                                                   └──► BalanceSheet
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::account::{Account, AccountType, ChartOfAccounts, NormalBalance};
use crate::error::{CoreError, CoreResult};
use crate::journal::JournalLine;

// =============================================================================
// Totals
// =============================================================================

/// Sum of debits and credits posted to one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct AccountTotals {
    pub account_code: String,
    pub debit_cents: i64,
    pub credit_cents: i64,
}

impl AccountTotals {
    pub fn net_debit(&self) -> i64 {
        self.debit_cents - self.credit_cents
    }
}

/// Aggregates lines in-process. Output is ordered by account code.
pub fn totals_from_lines<'a>(lines: impl IntoIterator<Item = &'a JournalLine>) -> Vec<AccountTotals> {
    let mut by_code: BTreeMap<&str, (i64, i64)> = BTreeMap::new();
    for line in lines {
        let entry = by_code.entry(line.account_code.as_str()).or_insert((0, 0));
        entry.0 += line.debit_cents;
        entry.1 += line.credit_cents;
    }

    by_code
        .into_iter()
        .map(|(code, (debit, credit))| AccountTotals {
            account_code: code.to_string(),
            debit_cents: debit,
            credit_cents: credit,
        })
        .collect()
}

// =============================================================================
// Account Balance
// =============================================================================

/// Balance of one account, signed so that a positive value is a normal balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AccountBalance {
    pub account_code: String,
    pub account_name: String,
    pub account_type: AccountType,
    pub normal_balance: NormalBalance,
    pub debit_cents: i64,
    pub credit_cents: i64,
    pub balance_cents: i64,
}

impl AccountBalance {
    pub fn new(account: &Account, debit_cents: i64, credit_cents: i64) -> Self {
        let normal_balance = account.normal_balance();
        AccountBalance {
            account_code: account.code.clone(),
            account_name: account.name.clone(),
            account_type: account.account_type,
            normal_balance,
            debit_cents,
            credit_cents,
            balance_cents: normal_balance.signed(debit_cents, credit_cents),
        }
    }
}

fn lookup<'a>(chart: &'a ChartOfAccounts, code: &str) -> CoreResult<&'a Account> {
    chart
        .get(code)
        .ok_or_else(|| CoreError::AccountNotFound(code.to_string()))
}

// =============================================================================
// Trial Balance
// =============================================================================

/// One trial balance row: the net balance shown on its debit or credit side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TrialBalanceRow {
    pub account_code: String,
    pub account_name: String,
    pub account_type: AccountType,
    pub debit_cents: i64,
    pub credit_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TrialBalance {
    #[ts(as = "Option<String>")]
    pub as_of: Option<DateTime<Utc>>,
    pub rows: Vec<TrialBalanceRow>,
    pub total_debits_cents: i64,
    pub total_credits_cents: i64,
}

impl TrialBalance {
    /// Builds a trial balance. Accounts with no activity are omitted;
    /// totals referencing unknown accounts are an error.
    pub fn from_totals(
        chart: &ChartOfAccounts,
        totals: &[AccountTotals],
        as_of: Option<DateTime<Utc>>,
    ) -> CoreResult<Self> {
        let mut rows = Vec::with_capacity(totals.len());
        let mut total_debits = 0i64;
        let mut total_credits = 0i64;

        for t in totals {
            let account = lookup(chart, &t.account_code)?;
            if t.debit_cents == 0 && t.credit_cents == 0 {
                continue;
            }

            let net = t.net_debit();
            let (debit, credit) = if net >= 0 { (net, 0) } else { (0, -net) };
            total_debits += debit;
            total_credits += credit;

            rows.push(TrialBalanceRow {
                account_code: account.code.clone(),
                account_name: account.name.clone(),
                account_type: account.account_type,
                debit_cents: debit,
                credit_cents: credit,
            });
        }

        rows.sort_by(|a, b| a.account_code.cmp(&b.account_code));

        Ok(TrialBalance {
            as_of,
            rows,
            total_debits_cents: total_debits,
            total_credits_cents: total_credits,
        })
    }

    pub fn is_balanced(&self) -> bool {
        self.total_debits_cents == self.total_credits_cents
    }
}

// =============================================================================
// Income Statement
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StatementLine {
    pub account_code: String,
    pub account_name: String,
    /// Signed by the account's own normal balance, so contra accounts are
    /// positive too. Section totals subtract them.
    pub amount_cents: i64,
    pub is_contra: bool,
}

/// Lines of one account type, split into regular and contra accounts.
#[derive(Debug, Default)]
struct Section {
    regular: Vec<StatementLine>,
    contra: Vec<StatementLine>,
    regular_total: i64,
    contra_total: i64,
}

impl Section {
    fn collect(
        chart: &ChartOfAccounts,
        totals: &[AccountTotals],
        account_type: AccountType,
    ) -> CoreResult<Self> {
        let mut section = Section::default();

        for t in totals {
            let account = lookup(chart, &t.account_code)?;
            if account.account_type != account_type {
                continue;
            }
            if t.debit_cents == 0 && t.credit_cents == 0 {
                continue;
            }

            let line = StatementLine {
                account_code: account.code.clone(),
                account_name: account.name.clone(),
                amount_cents: account.normal_balance().signed(t.debit_cents, t.credit_cents),
                is_contra: account.is_contra,
            };
            if account.is_contra {
                section.contra_total += line.amount_cents;
                section.contra.push(line);
            } else {
                section.regular_total += line.amount_cents;
                section.regular.push(line);
            }
        }

        section.regular.sort_by(|a, b| a.account_code.cmp(&b.account_code));
        section.contra.sort_by(|a, b| a.account_code.cmp(&b.account_code));
        Ok(section)
    }

    fn net(&self) -> i64 {
        self.regular_total - self.contra_total
    }

    /// Regular and contra lines together, in code order.
    fn into_lines(self) -> Vec<StatementLine> {
        let mut lines = self.regular;
        lines.extend(self.contra);
        lines.sort_by(|a, b| a.account_code.cmp(&b.account_code));
        lines
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct IncomeStatement {
    #[ts(as = "String")]
    pub from: DateTime<Utc>,
    #[ts(as = "String")]
    pub to: DateTime<Utc>,
    pub revenue: Vec<StatementLine>,
    /// Sales returns and other deductions from revenue.
    pub contra_revenue: Vec<StatementLine>,
    pub expenses: Vec<StatementLine>,
    /// Gross revenue, before contra revenue.
    pub total_revenue_cents: i64,
    pub total_contra_revenue_cents: i64,
    pub net_revenue_cents: i64,
    /// Net of any contra expense accounts.
    pub total_expenses_cents: i64,
    pub net_income_cents: i64,
}

/// Net income over a set of totals: net revenue minus net expenses.
pub fn net_income(chart: &ChartOfAccounts, totals: &[AccountTotals]) -> CoreResult<i64> {
    let revenue = Section::collect(chart, totals, AccountType::Revenue)?;
    let expenses = Section::collect(chart, totals, AccountType::Expense)?;
    Ok(revenue.net() - expenses.net())
}

impl IncomeStatement {
    /// `totals` must cover postings between `from` and `to` only.
    pub fn from_totals(
        chart: &ChartOfAccounts,
        totals: &[AccountTotals],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CoreResult<Self> {
        let revenue = Section::collect(chart, totals, AccountType::Revenue)?;
        let expenses = Section::collect(chart, totals, AccountType::Expense)?;

        let net_revenue = revenue.net();
        let total_expenses = expenses.net();

        Ok(IncomeStatement {
            from,
            to,
            total_revenue_cents: revenue.regular_total,
            total_contra_revenue_cents: revenue.contra_total,
            net_revenue_cents: net_revenue,
            total_expenses_cents: total_expenses,
            net_income_cents: net_revenue - total_expenses,
            revenue: revenue.regular,
            contra_revenue: revenue.contra,
            expenses: expenses.into_lines(),
        })
    }
}

// =============================================================================
// Balance Sheet
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct BalanceSheet {
    #[ts(as = "String")]
    pub as_of: DateTime<Utc>,
    pub assets: Vec<StatementLine>,
    pub liabilities: Vec<StatementLine>,
    pub equity: Vec<StatementLine>,
    /// Revenue minus expenses not yet closed to retained earnings.
    pub current_earnings_cents: i64,
    pub total_assets_cents: i64,
    pub total_liabilities_cents: i64,
    /// Equity accounts plus current earnings.
    pub total_equity_cents: i64,
}

impl BalanceSheet {
    /// `totals` must cover every posting up to `as_of`.
    pub fn from_totals(
        chart: &ChartOfAccounts,
        totals: &[AccountTotals],
        as_of: DateTime<Utc>,
    ) -> CoreResult<Self> {
        let assets = Section::collect(chart, totals, AccountType::Asset)?;
        let liabilities = Section::collect(chart, totals, AccountType::Liability)?;
        let equity = Section::collect(chart, totals, AccountType::Equity)?;
        let current_earnings = net_income(chart, totals)?;

        Ok(BalanceSheet {
            as_of,
            current_earnings_cents: current_earnings,
            total_assets_cents: assets.net(),
            total_liabilities_cents: liabilities.net(),
            total_equity_cents: equity.net() + current_earnings,
            assets: assets.into_lines(),
            liabilities: liabilities.into_lines(),
            equity: equity.into_lines(),
        })
    }

    /// Assets == Liabilities + Equity.
    pub fn is_balanced(&self) -> bool {
        self.total_assets_cents == self.total_liabilities_cents + self.total_equity_cents
    }
}

// =============================================================================
// Account Ledger
// =============================================================================

/// A posting to one account, as read for the ledger view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct LedgerPosting {
    pub entry_id: String,
    pub entry_number: String,
    #[ts(as = "String")]
    pub posted_at: DateTime<Utc>,
    pub description: String,
    pub memo: Option<String>,
    pub debit_cents: i64,
    pub credit_cents: i64,
}

/// A ledger line with the account's running balance after it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LedgerEntryLine {
    pub posting: LedgerPosting,
    pub running_balance_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AccountLedger {
    pub account_code: String,
    pub account_name: String,
    pub opening_balance_cents: i64,
    pub lines: Vec<LedgerEntryLine>,
    pub closing_balance_cents: i64,
}

impl AccountLedger {
    /// Walks postings in the given order, accumulating the balance signed by
    /// the account's normal side.
    pub fn build(account: &Account, opening_balance_cents: i64, postings: Vec<LedgerPosting>) -> Self {
        let normal = account.normal_balance();
        let mut running = opening_balance_cents;

        let lines = postings
            .into_iter()
            .map(|posting| {
                running += normal.signed(posting.debit_cents, posting.credit_cents);
                LedgerEntryLine {
                    posting,
                    running_balance_cents: running,
                }
            })
            .collect();

        AccountLedger {
            account_code: account.code.clone(),
            account_name: account.name.clone(),
            opening_balance_cents,
            lines,
            closing_balance_cents: running,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
