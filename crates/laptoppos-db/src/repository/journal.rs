//! # Journal Repository
//!
//! Storage for journal entries and their lines.
//!
//! ## Posting Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  JournalEntryDraft                                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  load_chart_tx ──► draft.validate_against(chart)                       │
//! │       │               ├─ Σ debit == Σ credit                           │
//! │       │               └─ every account exists and is active            │
//! │       ▼                                                                 │
//! │  reverses_entry_id? ──► lines mirror the original? else ReversalMismatch│
//! │       │                 UPDATE original SET status = 'reversed'        │
//! │       │                 (0 rows → AlreadyReversed / ReversalOfReversal) │
//! │       ▼                                                                 │
//! │  next_sequence("journal:YYYYMMDD") ──► JE-YYYYMMDD-NNNNNN               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  INSERT journal_entries, INSERT journal_lines × n                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `*_tx` functions run inside the caller's transaction; business
//! repositories use them so an event and its entry commit together.
//! Balances are never stored: [`JournalRepository::account_totals`]
//! aggregates lines on demand.

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::account::load_chart_tx;
use crate::repository::next_sequence;
use laptoppos_core::balance::{AccountTotals, LedgerPosting};
use laptoppos_core::journal::{format_entry_number, reversal_of};
use laptoppos_core::{
    CoreError, JournalEntry, JournalEntryDraft, JournalLine, JournalStatus, ReferenceType,
};

const ENTRY_COLUMNS: &str = r#"
    id, tenant_id, entry_number, description, reference_type, reference_id,
    status, reverses_entry_id, total_cents, posted_at, created_at
"#;

const LINE_COLUMNS: &str = r#"
    id, entry_id, line_no, account_code, debit_cents, credit_cents, memo
"#;

// =============================================================================
// Transaction-Scoped Operations
// =============================================================================

/// Validates and writes a draft inside an open transaction.
pub(crate) async fn insert_entry_tx(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    draft: &JournalEntryDraft,
) -> DbResult<JournalEntry> {
    let chart = load_chart_tx(&mut *conn, tenant_id).await?;
    let total = draft.validate_against(&chart).map_err(|e| {
        warn!(description = %draft.description, error = %e, "Journal entry rejected");
        e
    })?;

    if let Some(original_id) = draft.reverses_entry_id() {
        let original_lines = fetch_lines_tx(&mut *conn, original_id).await?;
        if !original_lines.is_empty() && !draft.mirrors(&original_lines) {
            warn!(entry_id = %original_id, "Reversal lines do not mirror the original");
            return Err(CoreError::ReversalMismatch(original_id.to_string()).into());
        }
        mark_reversed_tx(&mut *conn, tenant_id, original_id).await?;
    }

    let now = Utc::now();
    let posted_at = draft.posted_at.unwrap_or(now);
    let sequence_name = format!("journal:{}", posted_at.format("%Y%m%d"));
    let sequence = next_sequence(&mut *conn, tenant_id, &sequence_name).await?;

    let entry = JournalEntry {
        id: Uuid::new_v4().to_string(),
        tenant_id: tenant_id.to_string(),
        entry_number: format_entry_number(posted_at.date_naive(), sequence),
        description: draft.description.trim().to_string(),
        reference_type: draft.reference_type,
        reference_id: draft.reference_id.clone(),
        status: JournalStatus::Posted,
        reverses_entry_id: draft.reverses_entry_id().map(str::to_string),
        total_cents: total.cents(),
        posted_at,
        created_at: now,
    };

    sqlx::query(
        r#"
        INSERT INTO journal_entries (
            id, tenant_id, entry_number, description, reference_type, reference_id,
            status, reverses_entry_id, total_cents, posted_at, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.tenant_id)
    .bind(&entry.entry_number)
    .bind(&entry.description)
    .bind(entry.reference_type)
    .bind(&entry.reference_id)
    .bind(entry.status)
    .bind(&entry.reverses_entry_id)
    .bind(entry.total_cents)
    .bind(entry.posted_at)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;

    for line in draft.to_lines(&entry.id) {
        sqlx::query(
            r#"
            INSERT INTO journal_lines (
                id, entry_id, line_no, account_code, debit_cents, credit_cents, memo
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&line.id)
        .bind(&line.entry_id)
        .bind(line.line_no)
        .bind(&line.account_code)
        .bind(line.debit_cents)
        .bind(line.credit_cents)
        .bind(&line.memo)
        .execute(&mut *conn)
        .await?;
    }

    info!(
        entry_number = %entry.entry_number,
        reference_type = %entry.reference_type,
        total_cents = entry.total_cents,
        lines = draft.lines().len(),
        "Journal entry posted"
    );

    Ok(entry)
}

/// Flips a posted entry to `reversed`, explaining why when it cannot.
async fn mark_reversed_tx(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    entry_id: &str,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE journal_entries
        SET status = 'reversed'
        WHERE tenant_id = ?1 AND id = ?2
          AND status = 'posted' AND reverses_entry_id IS NULL
        "#,
    )
    .bind(tenant_id)
    .bind(entry_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 1 {
        return Ok(());
    }

    let err = match fetch_entry_tx(&mut *conn, tenant_id, entry_id).await? {
        None => CoreError::EntryNotFound(entry_id.to_string()),
        Some(entry) if entry.is_reversal() => CoreError::ReversalOfReversal(entry_id.to_string()),
        Some(_) => CoreError::AlreadyReversed(entry_id.to_string()),
    };
    warn!(entry_id = %entry_id, error = %err, "Reversal rejected");
    Err(err.into())
}

pub(crate) async fn fetch_entry_tx(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    entry_id: &str,
) -> DbResult<Option<JournalEntry>> {
    let sql = format!(
        "SELECT {} FROM journal_entries WHERE tenant_id = ?1 AND id = ?2",
        ENTRY_COLUMNS
    );
    let entry = sqlx::query_as::<_, JournalEntry>(&sql)
        .bind(tenant_id)
        .bind(entry_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(entry)
}

pub(crate) async fn fetch_lines_tx(
    conn: &mut SqliteConnection,
    entry_id: &str,
) -> DbResult<Vec<JournalLine>> {
    let sql = format!(
        "SELECT {} FROM journal_lines WHERE entry_id = ?1 ORDER BY line_no",
        LINE_COLUMNS
    );
    let lines = sqlx::query_as::<_, JournalLine>(&sql)
        .bind(entry_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(lines)
}

/// Loads an entry and its lines, or `EntryNotFound`.
pub(crate) async fn load_posted_tx(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    entry_id: &str,
) -> DbResult<(JournalEntry, Vec<JournalLine>)> {
    let entry = fetch_entry_tx(&mut *conn, tenant_id, entry_id)
        .await?
        .ok_or_else(|| CoreError::EntryNotFound(entry_id.to_string()))?;
    let lines = fetch_lines_tx(&mut *conn, entry_id).await?;
    Ok((entry, lines))
}

/// Posts the mirror image of an entry inside an open transaction.
pub(crate) async fn reverse_entry_tx(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    entry_id: &str,
    reason: &str,
) -> DbResult<JournalEntry> {
    let (entry, lines) = load_posted_tx(&mut *conn, tenant_id, entry_id).await?;
    let draft = reversal_of(&entry, &lines, reason)?;
    insert_entry_tx(&mut *conn, tenant_id, &draft).await
}

// =============================================================================
// Repository
// =============================================================================

/// Read side of the journal.
#[derive(Debug, Clone)]
pub struct JournalRepository {
    pool: SqlitePool,
    tenant_id: String,
}

impl JournalRepository {
    pub fn new(pool: SqlitePool, tenant_id: String) -> Self {
        JournalRepository { pool, tenant_id }
    }

    pub async fn get_entry(&self, id: &str) -> DbResult<Option<JournalEntry>> {
        let mut conn = self.pool.acquire().await?;
        fetch_entry_tx(&mut conn, &self.tenant_id, id).await
    }

    /// Lines of an entry belonging to this tenant.
    pub async fn get_lines(&self, entry_id: &str) -> DbResult<Vec<JournalLine>> {
        let mut conn = self.pool.acquire().await?;
        if fetch_entry_tx(&mut conn, &self.tenant_id, entry_id).await?.is_none() {
            return Err(DbError::not_found("Journal entry", entry_id));
        }
        fetch_lines_tx(&mut conn, entry_id).await
    }

    /// Entries produced by one business document, oldest first.
    pub async fn list_by_reference(
        &self,
        reference_type: ReferenceType,
        reference_id: &str,
    ) -> DbResult<Vec<JournalEntry>> {
        let sql = format!(
            r#"
            SELECT {} FROM journal_entries
            WHERE tenant_id = ?1 AND reference_type = ?2 AND reference_id = ?3
            ORDER BY posted_at, entry_number
            "#,
            ENTRY_COLUMNS
        );
        let entries = sqlx::query_as::<_, JournalEntry>(&sql)
            .bind(&self.tenant_id)
            .bind(reference_type)
            .bind(reference_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(entries)
    }

    /// Entries posted in `[from, to]`; either bound may be open.
    pub async fn list_entries(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> DbResult<Vec<JournalEntry>> {
        let sql = format!(
            r#"
            SELECT {} FROM journal_entries
            WHERE tenant_id = ?1
              AND (?2 IS NULL OR posted_at >= ?2)
              AND (?3 IS NULL OR posted_at <= ?3)
            ORDER BY posted_at, entry_number
            "#,
            ENTRY_COLUMNS
        );
        let entries = sqlx::query_as::<_, JournalEntry>(&sql)
            .bind(&self.tenant_id)
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = entries.len(), "Listed journal entries");
        Ok(entries)
    }

    /// Debit and credit sums per account for postings in `[from, to]`.
    pub async fn account_totals(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> DbResult<Vec<AccountTotals>> {
        let totals = sqlx::query_as::<_, AccountTotals>(
            r#"
            SELECT
                l.account_code AS account_code,
                COALESCE(SUM(l.debit_cents), 0) AS debit_cents,
                COALESCE(SUM(l.credit_cents), 0) AS credit_cents
            FROM journal_lines l
            JOIN journal_entries e ON e.id = l.entry_id
            WHERE e.tenant_id = ?1
              AND (?2 IS NULL OR e.posted_at >= ?2)
              AND (?3 IS NULL OR e.posted_at <= ?3)
            GROUP BY l.account_code
            ORDER BY l.account_code
            "#,
        )
        .bind(&self.tenant_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        debug!(accounts = totals.len(), "Aggregated account totals");
        Ok(totals)
    }

    /// Debit and credit sums for one account strictly before `before`.
    pub async fn sums_before(&self, account_code: &str, before: DateTime<Utc>) -> DbResult<(i64, i64)> {
        let sums: (i64, i64) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(l.debit_cents), 0), COALESCE(SUM(l.credit_cents), 0)
            FROM journal_lines l
            JOIN journal_entries e ON e.id = l.entry_id
            WHERE e.tenant_id = ?1 AND l.account_code = ?2 AND e.posted_at < ?3
            "#,
        )
        .bind(&self.tenant_id)
        .bind(account_code)
        .bind(before)
        .fetch_one(&self.pool)
        .await?;
        Ok(sums)
    }

    /// Postings to one account in `[from, to]`, in posting order.
    pub async fn account_postings(
        &self,
        account_code: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> DbResult<Vec<LedgerPosting>> {
        let postings = sqlx::query_as::<_, LedgerPosting>(
            r#"
            SELECT
                e.id AS entry_id,
                e.entry_number AS entry_number,
                e.posted_at AS posted_at,
                e.description AS description,
                l.memo AS memo,
                l.debit_cents AS debit_cents,
                l.credit_cents AS credit_cents
            FROM journal_lines l
            JOIN journal_entries e ON e.id = l.entry_id
            WHERE e.tenant_id = ?1 AND l.account_code = ?2
              AND (?3 IS NULL OR e.posted_at >= ?3)
              AND (?4 IS NULL OR e.posted_at <= ?4)
            ORDER BY e.posted_at, e.entry_number, l.line_no
            "#,
        )
        .bind(&self.tenant_id)
        .bind(account_code)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(postings)
    }

    /// Entry numbers whose stored lines do not balance or do not match the
    /// header total. Empty on a healthy ledger.
    pub async fn unbalanced_entries(&self) -> DbResult<Vec<String>> {
        let numbers: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT e.entry_number
            FROM journal_entries e
            LEFT JOIN journal_lines l ON l.entry_id = e.id
            WHERE e.tenant_id = ?1
            GROUP BY e.id, e.entry_number, e.total_cents
            HAVING COUNT(l.id) < 2
                OR COALESCE(SUM(l.debit_cents), 0) <> COALESCE(SUM(l.credit_cents), 0)
                OR COALESCE(SUM(l.debit_cents), 0) <> e.total_cents
            ORDER BY e.entry_number
            "#,
        )
        .bind(&self.tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(numbers)
    }
}

// =============================================================================
// Tests
// =============================================================================
