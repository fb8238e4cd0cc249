//! # Journal Entries
//!
//! Double-entry journal types and the draft builder every posting goes
//! through before it reaches the database.
//!
//! ## Entry Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  JournalEntryDraft::new("Sale R-0001")                                 │
//! │       .debit("1000", 11_100, "cash")                                   │
//! │       .credit("4000", 10_000, "")                                      │
//! │       .credit("2200", 1_100, "")                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  validate_against(&chart)                                              │
//! │   ├── ≥ 2 lines, both sides present                                    │
//! │   ├── every line amount > 0                                            │
//! │   ├── Σ debit == Σ credit                                              │
//! │   └── every account exists and is active                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  JournalEntry { status: Posted }  + JournalLine × n                    │
//! │       │                                                                 │
//! │       ▼ (optional)                                                      │
//! │  reversal_of(entry, lines) ──► mirror entry, original → Reversed       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::account::ChartOfAccounts;
use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::validation::validate_description;

// =============================================================================
// Enums
// =============================================================================

/// Which side of the ledger a line posts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum EntrySide {
    Debit,
    Credit,
}

impl EntrySide {
    pub const fn opposite(&self) -> EntrySide {
        match self {
            EntrySide::Debit => EntrySide::Credit,
            EntrySide::Credit => EntrySide::Debit,
        }
    }
}

/// Posting status of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum JournalStatus {
    Posted,
    /// A reversal entry has been posted against this entry.
    Reversed,
}

/// The business document an entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Sale,
    SaleVoid,
    ServiceDeposit,
    ServiceCompletion,
    ServiceCancellation,
    WarrantyRefund,
    Purchase,
    SupplierPayment,
    Payroll,
    Expense,
    Manual,
    Reversal,
}

impl ReferenceType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::Sale => "sale",
            ReferenceType::SaleVoid => "sale_void",
            ReferenceType::ServiceDeposit => "service_deposit",
            ReferenceType::ServiceCompletion => "service_completion",
            ReferenceType::ServiceCancellation => "service_cancellation",
            ReferenceType::WarrantyRefund => "warranty_refund",
            ReferenceType::Purchase => "purchase",
            ReferenceType::SupplierPayment => "supplier_payment",
            ReferenceType::Payroll => "payroll",
            ReferenceType::Expense => "expense",
            ReferenceType::Manual => "manual",
            ReferenceType::Reversal => "reversal",
        }
    }
}

impl fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Stored Entry & Lines
// =============================================================================

/// A posted journal entry header.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct JournalEntry {
    pub id: String,
    pub tenant_id: String,
    /// Human-readable number, `JE-YYYYMMDD-NNNNNN`.
    pub entry_number: String,
    pub description: String,
    pub reference_type: ReferenceType,
    pub reference_id: Option<String>,
    pub status: JournalStatus,
    /// Set on reversal entries: the entry being undone.
    pub reverses_entry_id: Option<String>,
    /// Σ debits (== Σ credits).
    pub total_cents: i64,
    #[ts(as = "String")]
    pub posted_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl JournalEntry {
    /// True if this entry undoes another one.
    pub fn is_reversal(&self) -> bool {
        self.reverses_entry_id.is_some()
    }

    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// One posting line. Exactly one of `debit_cents`/`credit_cents` is positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct JournalLine {
    pub id: String,
    pub entry_id: String,
    pub line_no: i64,
    pub account_code: String,
    pub debit_cents: i64,
    pub credit_cents: i64,
    pub memo: Option<String>,
}

impl JournalLine {
    pub fn side(&self) -> EntrySide {
        if self.debit_cents > 0 {
            EntrySide::Debit
        } else {
            EntrySide::Credit
        }
    }

    pub fn amount(&self) -> Money {
        Money::from_cents(self.debit_cents.max(self.credit_cents))
    }
}

/// Formats an entry number from the posting date and a per-tenant sequence.
///
/// ```rust
/// use chrono::NaiveDate;
/// use laptoppos_core::journal::format_entry_number;
///
/// let date = NaiveDate::from_ymd_opt(2026, 10, 17).unwrap();
/// assert_eq!(format_entry_number(date, 42), "JE-20261017-000042");
/// ```
pub fn format_entry_number(date: NaiveDate, sequence: i64) -> String {
    format!("JE-{}-{:06}", date.format("%Y%m%d"), sequence)
}

// =============================================================================
// Draft
// =============================================================================

/// A line waiting to be posted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftLine {
    pub account_code: String,
    pub side: EntrySide,
    pub amount: Money,
    pub memo: Option<String>,
}

/// Builder for a journal entry.
///
/// Zero amounts are dropped and negative amounts post to the opposite side,
/// so posting rules can pass computed differences straight through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntryDraft {
    pub description: String,
    pub reference_type: ReferenceType,
    pub reference_id: Option<String>,
    /// Only [`reversal_of`] sets this.
    #[serde(skip_deserializing)]
    reverses_entry_id: Option<String>,
    /// Defaults to the posting time when `None`.
    pub posted_at: Option<DateTime<Utc>>,
    lines: Vec<DraftLine>,
}

impl JournalEntryDraft {
    pub fn new(description: impl Into<String>) -> Self {
        JournalEntryDraft {
            description: description.into(),
            reference_type: ReferenceType::Manual,
            reference_id: None,
            reverses_entry_id: None,
            posted_at: None,
            lines: Vec::new(),
        }
    }

    /// Links the entry to its source document.
    pub fn reference(mut self, reference_type: ReferenceType, reference_id: impl Into<String>) -> Self {
        self.reference_type = reference_type;
        self.reference_id = Some(reference_id.into());
        self
    }

    /// The entry this draft undoes, if it came from [`reversal_of`].
    pub fn reverses_entry_id(&self) -> Option<&str> {
        self.reverses_entry_id.as_deref()
    }

    pub fn posted_at(mut self, at: DateTime<Utc>) -> Self {
        self.posted_at = Some(at);
        self
    }

    pub fn debit(mut self, account_code: &str, amount: Money, memo: &str) -> Self {
        self.add_line(EntrySide::Debit, account_code, amount, memo);
        self
    }

    pub fn credit(mut self, account_code: &str, amount: Money, memo: &str) -> Self {
        self.add_line(EntrySide::Credit, account_code, amount, memo);
        self
    }

    /// Appends a line in place. Zero is skipped, negative flips the side.
    ///
    /// `i64::MIN` has no positive counterpart; it is kept as is and
    /// [`validate`](Self::validate) rejects the line.
    pub fn add_line(&mut self, side: EntrySide, account_code: &str, amount: Money, memo: &str) {
        if amount.is_zero() {
            return;
        }

        let (side, amount) = if amount.is_negative() {
            match amount.cents().checked_neg() {
                Some(flipped) => (side.opposite(), Money::from_cents(flipped)),
                None => (side, amount),
            }
        } else {
            (side, amount)
        };

        self.lines.push(DraftLine {
            account_code: account_code.to_string(),
            side,
            amount,
            memo: if memo.trim().is_empty() {
                None
            } else {
                Some(memo.trim().to_string())
            },
        });
    }

    pub fn lines(&self) -> &[DraftLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn total_debits(&self) -> Money {
        self.side_total(EntrySide::Debit)
    }

    pub fn total_credits(&self) -> Money {
        self.side_total(EntrySide::Credit)
    }

    fn side_total(&self, side: EntrySide) -> Money {
        self.lines
            .iter()
            .filter(|l| l.side == side)
            .map(|l| l.amount)
            .sum()
    }

    /// Checks the double-entry rules and returns the entry total.
    pub fn validate(&self) -> CoreResult<Money> {
        validate_description(&self.description)?;

        if self.lines.len() < 2 {
            return Err(CoreError::EmptyEntry {
                description: self.description.clone(),
            });
        }

        let mut debits = Money::zero();
        let mut credits = Money::zero();

        for (idx, line) in self.lines.iter().enumerate() {
            if !line.amount.is_positive() {
                return Err(CoreError::InvalidLineAmount {
                    line_no: idx + 1,
                    account_code: line.account_code.clone(),
                    reason: "amount must be positive".to_string(),
                });
            }

            let total = match line.side {
                EntrySide::Debit => &mut debits,
                EntrySide::Credit => &mut credits,
            };
            *total = total
                .checked_add(line.amount)
                .ok_or(CoreError::AmountOverflow)?;
        }

        if debits.is_zero() || credits.is_zero() {
            return Err(CoreError::SingleSidedEntry {
                description: self.description.clone(),
            });
        }

        if debits != credits {
            return Err(CoreError::UnbalancedEntry {
                debits: debits.cents(),
                credits: credits.cents(),
            });
        }

        Ok(debits)
    }

    /// `validate` plus: every account exists in the chart and is active.
    pub fn validate_against(&self, chart: &ChartOfAccounts) -> CoreResult<Money> {
        let total = self.validate()?;

        for line in &self.lines {
            chart.require_postable(&line.account_code)?;
        }

        Ok(total)
    }

    /// True if every line undoes exactly one of `original`'s lines: same
    /// account and amount, opposite side. Memos and order are ignored.
    pub fn mirrors(&self, original: &[JournalLine]) -> bool {
        if self.lines.len() != original.len() {
            return false;
        }

        // (account, is_debit, cents)
        let mut ours: Vec<(&str, bool, i64)> = self
            .lines
            .iter()
            .map(|l| (l.account_code.as_str(), l.side == EntrySide::Debit, l.amount.cents()))
            .collect();
        let mut theirs: Vec<(&str, bool, i64)> = original
            .iter()
            .map(|l| {
                let side = l.side().opposite();
                (l.account_code.as_str(), side == EntrySide::Debit, l.amount().cents())
            })
            .collect();

        ours.sort_unstable();
        theirs.sort_unstable();
        ours == theirs
    }

    /// Materializes stored lines for `entry_id`, numbered from 1.
    pub fn to_lines(&self, entry_id: &str) -> Vec<JournalLine> {
        self.lines
            .iter()
            .enumerate()
            .map(|(idx, line)| {
                let (debit, credit) = match line.side {
                    EntrySide::Debit => (line.amount.cents(), 0),
                    EntrySide::Credit => (0, line.amount.cents()),
                };
                JournalLine {
                    id: uuid::Uuid::new_v4().to_string(),
                    entry_id: entry_id.to_string(),
                    line_no: idx as i64 + 1,
                    account_code: line.account_code.clone(),
                    debit_cents: debit,
                    credit_cents: credit,
                    memo: line.memo.clone(),
                }
            })
            .collect()
    }
}

// =============================================================================
// Reversal
// =============================================================================

/// Builds the mirror image of a posted entry.
///
/// ## Rules
/// - Reversal entries cannot be reversed (`ReversalOfReversal`)
/// - An entry can be reversed once (`AlreadyReversed`)
/// - Every line keeps its account and amount with debit/credit swapped
///
/// Callers may override the reference with `.reference(..)`, e.g. a sale void
/// keeps `SaleVoid` + sale id while still pointing at the original entry.
pub fn reversal_of(
    entry: &JournalEntry,
    lines: &[JournalLine],
    reason: &str,
) -> CoreResult<JournalEntryDraft> {
    if entry.is_reversal() {
        return Err(CoreError::ReversalOfReversal(entry.id.clone()));
    }

    if entry.status == JournalStatus::Reversed {
        return Err(CoreError::AlreadyReversed(entry.id.clone()));
    }

    let reason = reason.trim();
    let description = if reason.is_empty() {
        format!("Reversal of {}", entry.entry_number)
    } else {
        format!("Reversal of {}: {}", entry.entry_number, reason)
    };

    let mut draft = JournalEntryDraft::new(description).reference(ReferenceType::Reversal, entry.id.clone());
    draft.reverses_entry_id = Some(entry.id.clone());

    for line in lines {
        let memo = match &line.memo {
            Some(m) => format!("Reversal: {}", m),
            None => String::new(),
        };
        draft.add_line(line.side().opposite(), &line.account_code, line.amount(), &memo);
    }

    Ok(draft)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DEFAULT_TENANT_ID;

    fn m(cents: i64) -> Money {
        Money::from_cents(cents)
    }

    fn posted(draft: &JournalEntryDraft) -> (JournalEntry, Vec<JournalLine>) {
        let total = draft.validate().unwrap();
        let entry = JournalEntry {
            id: "entry-1".to_string(),
            tenant_id: DEFAULT_TENANT_ID.to_string(),
            entry_number: "JE-20261017-000001".to_string(),
            description: draft.description.clone(),
            reference_type: draft.reference_type,
            reference_id: draft.reference_id.clone(),
            status: JournalStatus::Posted,
            reverses_entry_id: draft.reverses_entry_id().map(str::to_string),
            total_cents: total.cents(),
            posted_at: Utc::now(),
            created_at: Utc::now(),
        };
        let lines = draft.to_lines(&entry.id);
        (entry, lines)
    }

    #[test]
    fn test_balanced_entry_validates() {
        let draft = JournalEntryDraft::new("Cash sale")
            .debit("1000", m(11_100), "cash")
            .credit("4000", m(10_000), "")
            .credit("2200", m(1_100), "");

        assert_eq!(draft.validate().unwrap(), m(11_100));
        assert_eq!(draft.total_debits(), draft.total_credits());
    }

    #[test]
    fn test_unbalanced_entry_rejected() {
        let draft = JournalEntryDraft::new("Broken")
            .debit("1000", m(150_000), "")
            .credit("4100", m(149_000), "");

        match draft.validate() {
            Err(CoreError::UnbalancedEntry { debits, credits }) => {
                assert_eq!(debits, 150_000);
                assert_eq!(credits, 149_000);
            }
            other => panic!("expected UnbalancedEntry, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_lines_skipped_and_negative_flips() {
        let draft = JournalEntryDraft::new("Deposit settlement")
            .debit("2100", m(50_000), "")
            .credit("4200", m(0), "no fee")
            .credit("1000", m(-10_000), "customer owes more");

        assert_eq!(draft.lines().len(), 2);
        assert_eq!(draft.lines()[1].side, EntrySide::Debit);
        assert_eq!(draft.lines()[1].amount, m(10_000));
    }

    #[test]
    fn test_single_line_and_single_sided() {
        let one = JournalEntryDraft::new("One").debit("1000", m(10), "");
        assert!(matches!(one.validate(), Err(CoreError::EmptyEntry { .. })));

        let same_side = JournalEntryDraft::new("Two debits")
            .debit("1000", m(10), "")
            .debit("1010", m(10), "");
        assert!(matches!(
            same_side.validate(),
            Err(CoreError::SingleSidedEntry { .. })
        ));
    }

    #[test]
    fn test_missing_description() {
        let draft = JournalEntryDraft::new("  ")
            .debit("1000", m(10), "")
            .credit("4000", m(10), "");
        assert!(matches!(draft.validate(), Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_validate_against_chart() {
        let chart = ChartOfAccounts::standard(DEFAULT_TENANT_ID, Utc::now());
        let draft = JournalEntryDraft::new("Unknown account")
            .debit("1999", m(10), "")
            .credit("4000", m(10), "");
        assert!(matches!(
            draft.validate_against(&chart),
            Err(CoreError::AccountNotFound(code)) if code == "1999"
        ));
    }

    #[test]
    fn test_reversal_swaps_sides() {
        let draft = JournalEntryDraft::new("Service completed")
            .reference(ReferenceType::ServiceCompletion, "svc-1")
            .debit("1000", m(20_000), "balance paid")
            .credit("4100", m(20_000), "labor");
        let (entry, lines) = posted(&draft);

        let reversal = reversal_of(&entry, &lines, "customer cancelled").unwrap();
        assert_eq!(reversal.reference_type, ReferenceType::Reversal);
        assert_eq!(reversal.reverses_entry_id(), Some("entry-1"));
        assert_eq!(reversal.lines()[0].side, EntrySide::Credit);
        assert_eq!(reversal.lines()[0].account_code, "1000");
        assert_eq!(reversal.lines()[1].side, EntrySide::Debit);
        assert_eq!(reversal.lines()[0].memo.as_deref(), Some("Reversal: balance paid"));
        assert_eq!(reversal.validate().unwrap(), m(20_000));
    }

    #[test]
    fn test_reversal_guards() {
        let draft = JournalEntryDraft::new("Sale")
            .debit("1000", m(500), "")
            .credit("4000", m(500), "");
        let (mut entry, lines) = posted(&draft);

        entry.status = JournalStatus::Reversed;
        assert!(matches!(
            reversal_of(&entry, &lines, ""),
            Err(CoreError::AlreadyReversed(_))
        ));

        entry.status = JournalStatus::Posted;
        entry.reverses_entry_id = Some("older".to_string());
        assert!(matches!(
            reversal_of(&entry, &lines, ""),
            Err(CoreError::ReversalOfReversal(_))
        ));
    }

    #[test]
    fn test_mirror_check() {
        let draft = JournalEntryDraft::new("Capital")
            .debit("1000", m(100_000), "")
            .credit("3000", m(100_000), "");
        let (entry, lines) = posted(&draft);

        let reversal = reversal_of(&entry, &lines, "").unwrap();
        assert!(reversal.mirrors(&lines));

        let unrelated = JournalEntryDraft::new("Warranty")
            .debit("6200", m(1), "")
            .credit("1000", m(1), "");
        assert!(!unrelated.mirrors(&lines));
        assert_eq!(unrelated.reverses_entry_id(), None);

        // Right accounts, wrong sides.
        assert!(!draft.mirrors(&lines));
    }

    #[test]
    fn test_min_amount_is_rejected_not_flipped() {
        let draft = JournalEntryDraft::new("Overflow")
            .debit("1000", m(i64::MIN), "")
            .credit("3000", m(100), "");

        assert_eq!(draft.lines()[0].side, EntrySide::Debit);
        assert!(matches!(
            draft.validate(),
            Err(CoreError::InvalidLineAmount { line_no: 1, .. })
        ));
    }

    #[test]
    fn test_to_lines_numbering() {
        let draft = JournalEntryDraft::new("Purchase")
            .debit("1200", m(700), "")
            .credit("2000", m(700), "");
        let lines = draft.to_lines("e-9");
        assert_eq!(lines[0].line_no, 1);
        assert_eq!(lines[1].line_no, 2);
        assert_eq!(lines[0].debit_cents, 700);
        assert_eq!(lines[1].credit_cents, 700);
        assert!(lines.iter().all(|l| l.entry_id == "e-9"));
    }
}
