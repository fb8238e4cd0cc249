//! # Chart of Accounts
//!
//! Account types, the standard system chart every tenant starts with, and an
//! in-memory `ChartOfAccounts` used to validate postings.
//!
//! ## Code Ranges
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1xxx  Asset       normal balance: DEBIT    Cash, Bank, AR, Inventory  │
//! │  2xxx  Liability   normal balance: CREDIT   AP, Deposits, Tax payable  │
//! │  3xxx  Equity      normal balance: CREDIT   Owner's equity             │
//! │  4xxx  Revenue     normal balance: CREDIT   Sales, Service, Fees       │
//! │        (4900 Sales Returns is contra revenue: DEBIT)                   │
//! │  5xxx+ Expense     normal balance: DEBIT    COGS, Salaries, Warranty   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::validation::{validate_account_code, validate_account_name};

// =============================================================================
// Account Type
// =============================================================================

/// The five elements of the accounting equation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
}

impl AccountType {
    /// All account types in statement order.
    pub const ALL: [AccountType; 5] = [
        AccountType::Asset,
        AccountType::Liability,
        AccountType::Equity,
        AccountType::Revenue,
        AccountType::Expense,
    ];

    /// The side that increases an account of this type.
    pub const fn normal_balance(&self) -> NormalBalance {
        match self {
            AccountType::Asset | AccountType::Expense => NormalBalance::Debit,
            AccountType::Liability | AccountType::Equity | AccountType::Revenue => {
                NormalBalance::Credit
            }
        }
    }

    /// Leading digits allowed for codes of this type.
    pub const fn code_prefixes(&self) -> &'static [char] {
        match self {
            AccountType::Asset => &['1'],
            AccountType::Liability => &['2'],
            AccountType::Equity => &['3'],
            AccountType::Revenue => &['4'],
            AccountType::Expense => &['5', '6', '7', '8', '9'],
        }
    }

    /// Checks whether `code` falls inside this type's range.
    pub fn accepts_code(&self, code: &str) -> bool {
        code.chars()
            .next()
            .map(|first| self.code_prefixes().contains(&first))
            .unwrap_or(false)
    }

    /// Infers the account type from the first digit of a code.
    pub fn from_code(code: &str) -> Option<AccountType> {
        AccountType::ALL.into_iter().find(|t| t.accepts_code(code))
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            AccountType::Asset => "asset",
            AccountType::Liability => "liability",
            AccountType::Equity => "equity",
            AccountType::Revenue => "revenue",
            AccountType::Expense => "expense",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Debit-normal or credit-normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum NormalBalance {
    Debit,
    Credit,
}

impl NormalBalance {
    /// Signed balance for this side: `debits - credits` for debit-normal
    /// accounts, `credits - debits` for credit-normal ones.
    #[inline]
    pub const fn signed(&self, debit_cents: i64, credit_cents: i64) -> i64 {
        match self {
            NormalBalance::Debit => debit_cents - credit_cents,
            NormalBalance::Credit => credit_cents - debit_cents,
        }
    }

    #[inline]
    pub const fn opposite(&self) -> NormalBalance {
        match self {
            NormalBalance::Debit => NormalBalance::Credit,
            NormalBalance::Credit => NormalBalance::Debit,
        }
    }
}

// =============================================================================
// Account
// =============================================================================

/// A ledger account belonging to one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Account {
    pub id: String,
    pub tenant_id: String,
    /// Business identifier, unique per tenant ("1000", "4100", ...).
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    /// Optional grouping parent.
    pub parent_code: Option<String>,
    /// Contra accounts carry the opposite normal balance of their type.
    pub is_contra: bool,
    /// System accounts are referenced by posting rules.
    pub is_system: bool,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Creates a new active, non-system account.
    pub fn new(
        tenant_id: impl Into<String>,
        code: impl Into<String>,
        name: impl Into<String>,
        account_type: AccountType,
        now: DateTime<Utc>,
    ) -> Self {
        Account {
            id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            code: code.into(),
            name: name.into(),
            account_type,
            parent_code: None,
            is_contra: false,
            is_system: false,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Effective normal balance, accounting for contra accounts.
    pub fn normal_balance(&self) -> NormalBalance {
        let normal = self.account_type.normal_balance();
        if self.is_contra {
            normal.opposite()
        } else {
            normal
        }
    }

    /// Validates code, name and code range.
    pub fn validate(&self) -> CoreResult<()> {
        validate_account_code(&self.code)?;
        validate_account_name(&self.name)?;

        if !self.account_type.accepts_code(&self.code) {
            return Err(CoreError::CodeOutOfRange {
                code: self.code.clone(),
                account_type: self.account_type.to_string(),
            });
        }

        Ok(())
    }
}

// =============================================================================
// System Accounts
// =============================================================================

/// Accounts the posting rules rely on. Seeded for every tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SystemAccount {
    Cash,
    Bank,
    AccountsReceivable,
    Inventory,
    AccountsPayable,
    CustomerDeposits,
    SalesTaxPayable,
    PayrollWithholding,
    OwnersEquity,
    RetainedEarnings,
    SalesRevenue,
    ServiceRevenue,
    CancellationFeeIncome,
    SalesReturns,
    CostOfGoodsSold,
    PartsWriteOff,
    SalariesExpense,
    OperatingExpenses,
    WarrantyExpense,
}

impl SystemAccount {
    pub const ALL: [SystemAccount; 19] = [
        SystemAccount::Cash,
        SystemAccount::Bank,
        SystemAccount::AccountsReceivable,
        SystemAccount::Inventory,
        SystemAccount::AccountsPayable,
        SystemAccount::CustomerDeposits,
        SystemAccount::SalesTaxPayable,
        SystemAccount::PayrollWithholding,
        SystemAccount::OwnersEquity,
        SystemAccount::RetainedEarnings,
        SystemAccount::SalesRevenue,
        SystemAccount::ServiceRevenue,
        SystemAccount::CancellationFeeIncome,
        SystemAccount::SalesReturns,
        SystemAccount::CostOfGoodsSold,
        SystemAccount::PartsWriteOff,
        SystemAccount::SalariesExpense,
        SystemAccount::OperatingExpenses,
        SystemAccount::WarrantyExpense,
    ];

    pub const fn code(&self) -> &'static str {
        match self {
            SystemAccount::Cash => "1000",
            SystemAccount::Bank => "1010",
            SystemAccount::AccountsReceivable => "1100",
            SystemAccount::Inventory => "1200",
            SystemAccount::AccountsPayable => "2000",
            SystemAccount::CustomerDeposits => "2100",
            SystemAccount::SalesTaxPayable => "2200",
            SystemAccount::PayrollWithholding => "2300",
            SystemAccount::OwnersEquity => "3000",
            SystemAccount::RetainedEarnings => "3100",
            SystemAccount::SalesRevenue => "4000",
            SystemAccount::ServiceRevenue => "4100",
            SystemAccount::CancellationFeeIncome => "4200",
            SystemAccount::SalesReturns => "4900",
            SystemAccount::CostOfGoodsSold => "5000",
            SystemAccount::PartsWriteOff => "5100",
            SystemAccount::SalariesExpense => "6000",
            SystemAccount::OperatingExpenses => "6100",
            SystemAccount::WarrantyExpense => "6200",
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            SystemAccount::Cash => "Cash",
            SystemAccount::Bank => "Bank",
            SystemAccount::AccountsReceivable => "Accounts Receivable",
            SystemAccount::Inventory => "Inventory",
            SystemAccount::AccountsPayable => "Accounts Payable",
            SystemAccount::CustomerDeposits => "Customer Deposits",
            SystemAccount::SalesTaxPayable => "Sales Tax Payable",
            SystemAccount::PayrollWithholding => "Payroll Withholding Payable",
            SystemAccount::OwnersEquity => "Owner's Equity",
            SystemAccount::RetainedEarnings => "Retained Earnings",
            SystemAccount::SalesRevenue => "Sales Revenue",
            SystemAccount::ServiceRevenue => "Service Revenue",
            SystemAccount::CancellationFeeIncome => "Cancellation Fee Income",
            SystemAccount::SalesReturns => "Sales Returns",
            SystemAccount::CostOfGoodsSold => "Cost of Goods Sold",
            SystemAccount::PartsWriteOff => "Parts Write-off",
            SystemAccount::SalariesExpense => "Salaries Expense",
            SystemAccount::OperatingExpenses => "Operating Expenses",
            SystemAccount::WarrantyExpense => "Warranty Expense",
        }
    }

    pub fn account_type(&self) -> AccountType {
        // Codes are fixed digits, so the lookup cannot miss.
        AccountType::from_code(self.code()).unwrap_or(AccountType::Expense)
    }

    pub const fn is_contra(&self) -> bool {
        matches!(self, SystemAccount::SalesReturns)
    }

    /// Builds the account row seeded for a tenant.
    pub fn to_account(&self, tenant_id: &str, now: DateTime<Utc>) -> Account {
        let mut account = Account::new(tenant_id, self.code(), self.name(), self.account_type(), now);
        account.is_contra = self.is_contra();
        account.is_system = true;
        account
    }
}

// =============================================================================
// Chart of Accounts
// =============================================================================

/// A tenant's accounts, keyed and ordered by code.
#[derive(Debug, Clone, Default)]
pub struct ChartOfAccounts {
    accounts: BTreeMap<String, Account>,
}

impl ChartOfAccounts {
    pub fn new() -> Self {
        ChartOfAccounts::default()
    }

    /// The system chart seeded for a new tenant.
    pub fn standard(tenant_id: &str, now: DateTime<Utc>) -> Self {
        let accounts = SystemAccount::ALL
            .iter()
            .map(|sys| (sys.code().to_string(), sys.to_account(tenant_id, now)))
            .collect();
        ChartOfAccounts { accounts }
    }

    /// Builds a chart from stored rows. Rows are trusted as already valid.
    pub fn from_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        ChartOfAccounts {
            accounts: accounts
                .into_iter()
                .map(|a| (a.code.clone(), a))
                .collect(),
        }
    }

    pub fn get(&self, code: &str) -> Option<&Account> {
        self.accounts.get(code)
    }

    /// Returns the account if it exists and accepts postings.
    pub fn require_postable(&self, code: &str) -> CoreResult<&Account> {
        let account = self
            .accounts
            .get(code)
            .ok_or_else(|| CoreError::AccountNotFound(code.to_string()))?;

        if !account.is_active {
            return Err(CoreError::AccountInactive(code.to_string()));
        }

        Ok(account)
    }

    /// Adds a validated account; codes are unique.
    pub fn insert(&mut self, account: Account) -> CoreResult<()> {
        account.validate()?;

        if self.accounts.contains_key(&account.code) {
            return Err(CoreError::DuplicateAccount(account.code));
        }

        self.accounts.insert(account.code.clone(), account);
        Ok(())
    }

    pub fn accounts_of_type(&self, account_type: AccountType) -> impl Iterator<Item = &Account> {
        self.accounts
            .values()
            .filter(move |a| a.account_type == account_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Codes of system accounts missing from this chart.
    pub fn missing_system_accounts(&self) -> Vec<&'static str> {
        SystemAccount::ALL
            .iter()
            .map(|s| s.code())
            .filter(|code| !self.accounts.contains_key(*code))
            .collect()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
