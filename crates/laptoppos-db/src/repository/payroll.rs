//! # Payroll Repository
//!
//! Pay records per employee and period. Creating a record posts nothing;
//! paying it books gross salary, net pay out and withholdings owed.

use chrono::{NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::journal::insert_entry_tx;
use laptoppos_core::posting::payroll_entry;
use laptoppos_core::validation::validate_party_name;
use laptoppos_core::{payroll_net, CoreError, PaymentMethod, PayrollRecord, PayrollStatus, ValidationError};

const RECORD_COLUMNS: &str = r#"
    id, tenant_id, employee_name, period_start, period_end,
    gross_cents, deductions_cents, net_cents, status, journal_entry_id,
    created_at, paid_at
"#;

#[derive(Debug, Clone)]
pub struct PayrollRepository {
    pool: SqlitePool,
    tenant_id: String,
}

impl PayrollRepository {
    pub fn new(pool: SqlitePool, tenant_id: String) -> Self {
        PayrollRepository { pool, tenant_id }
    }

    pub async fn create_record(
        &self,
        employee_name: &str,
        period_start: NaiveDate,
        period_end: NaiveDate,
        gross_cents: i64,
        deductions_cents: i64,
    ) -> DbResult<PayrollRecord> {
        validate_party_name("employee", employee_name)?;
        if period_end < period_start {
            return Err(ValidationError::InvalidFormat {
                field: "period".to_string(),
                reason: format!("{} is before {}", period_end, period_start),
            }
            .into());
        }
        let net_cents = payroll_net(gross_cents, deductions_cents)?;

        let record = PayrollRecord {
            id: Uuid::new_v4().to_string(),
            tenant_id: self.tenant_id.clone(),
            employee_name: employee_name.trim().to_string(),
            period_start,
            period_end,
            gross_cents,
            deductions_cents,
            net_cents,
            status: PayrollStatus::Pending,
            journal_entry_id: None,
            created_at: Utc::now(),
            paid_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO payroll_records (
                id, tenant_id, employee_name, period_start, period_end,
                gross_cents, deductions_cents, net_cents, status, journal_entry_id,
                created_at, paid_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&record.id)
        .bind(&record.tenant_id)
        .bind(&record.employee_name)
        .bind(record.period_start)
        .bind(record.period_end)
        .bind(record.gross_cents)
        .bind(record.deductions_cents)
        .bind(record.net_cents)
        .bind(record.status)
        .bind(&record.journal_entry_id)
        .bind(record.created_at)
        .bind(record.paid_at)
        .execute(&self.pool)
        .await?;

        info!(employee = %record.employee_name, net_cents, "Payroll record created");
        Ok(record)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<PayrollRecord>> {
        let mut conn = self.pool.acquire().await?;
        fetch_record_tx(&mut conn, &self.tenant_id, id).await
    }

    /// Pays a pending record with `method`.
    pub async fn pay(&self, id: &str, method: PaymentMethod) -> DbResult<PayrollRecord> {
        let mut tx = self.pool.begin().await?;
        let mut record = fetch_record_tx(&mut tx, &self.tenant_id, id)
            .await?
            .ok_or_else(|| CoreError::PayrollNotFound(id.to_string()))?;

        if record.status == PayrollStatus::Paid {
            warn!(payroll = %id, "Payroll already paid");
            return Err(CoreError::PayrollAlreadyPaid(id.to_string()).into());
        }

        let draft = payroll_entry(&record, method)?;
        let entry = insert_entry_tx(&mut tx, &self.tenant_id, &draft).await?;

        record.status = PayrollStatus::Paid;
        record.journal_entry_id = Some(entry.id);
        record.paid_at = Some(Utc::now());

        sqlx::query(
            r#"
            UPDATE payroll_records SET status = ?1, journal_entry_id = ?2, paid_at = ?3
            WHERE tenant_id = ?4 AND id = ?5
            "#,
        )
        .bind(record.status)
        .bind(&record.journal_entry_id)
        .bind(record.paid_at)
        .bind(&self.tenant_id)
        .bind(&record.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            employee = %record.employee_name,
            gross_cents = record.gross_cents,
            entry = %entry.entry_number,
            "Payroll paid"
        );
        Ok(record)
    }

    /// Records whose pay period overlaps `start..=end`.
    pub async fn list_for_period(&self, start: NaiveDate, end: NaiveDate) -> DbResult<Vec<PayrollRecord>> {
        let sql = format!(
            r#"
            SELECT {} FROM payroll_records
            WHERE tenant_id = ?1 AND period_start <= ?3 AND period_end >= ?2
            ORDER BY period_start, employee_name
            "#,
            RECORD_COLUMNS
        );
        let records = sqlx::query_as::<_, PayrollRecord>(&sql)
            .bind(&self.tenant_id)
            .bind(start)
            .bind(end)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }
}

async fn fetch_record_tx(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    id: &str,
) -> DbResult<Option<PayrollRecord>> {
    let sql = format!(
        "SELECT {} FROM payroll_records WHERE tenant_id = ?1 AND id = ?2",
        RECORD_COLUMNS
    );
    let record = sqlx::query_as::<_, PayrollRecord>(&sql)
        .bind(tenant_id)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(record)
}
