//! # Service Repository
//!
//! Repair tickets from intake to delivery, cancellation or warranty refund.
//!
//! ## Ticket Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_ticket ──► Received                                             │
//! │                       │  record_deposit  (Dr settlement / Cr 2100)      │
//! │                       │  add_part        (stock reserved, no entry)     │
//! │                       │  update_status   (Diagnosing, InProgress, ...)  │
//! │                       ▼                                                 │
//! │  complete ──────► Completed  (completion entry, parts leave inventory)  │
//! │                       │                                                 │
//! │                       ▼                                                 │
//! │  update_status ─► Delivered                                             │
//! │                                                                         │
//! │  cancel ────────► Cancelled / WarrantyRefunded                          │
//! │                   plan_cancellation ──► entries + stock returns, one tx │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `paid_cents` tracks money actually received: deposits, balance collected
//! at completion (not when booked to receivables) and minus any refunds.

use chrono::Utc;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::journal::insert_entry_tx;
use crate::repository::next_sequence;
use crate::repository::product::{apply_movement_tx, require_product_tx, set_cost_tx, MovementRequest};
use laptoppos_core::posting::{service_completion_entry, service_deposit_entry};
use laptoppos_core::reversal::plan_cancellation;
use laptoppos_core::service::format_ticket_number;
use laptoppos_core::validation::{validate_price_cents, validate_quantity};
use laptoppos_core::{
    weighted_average_cost, CancellationRequest, CancellationScenario, CoreError, JournalEntry,
    Money, MovementKind, NewServiceTicket, PaymentMethod, ServicePart, ServiceStatus,
    ServiceTicket,
};

const TICKET_COLUMNS: &str = r#"
    id, tenant_id, ticket_number, customer_name, customer_phone,
    device_description, serial_number, problem_description, status,
    labor_cents, deposit_cents, paid_cents, warranty_days,
    completion_entry_id, cancellation_reason,
    created_at, updated_at, completed_at
"#;

const PART_COLUMNS: &str = r#"
    id, ticket_id, product_id, sku_snapshot, name_snapshot,
    quantity, unit_price_cents, unit_cost_cents, created_at
"#;

/// What a cancellation did.
#[derive(Debug, Clone, Serialize)]
pub struct CancellationOutcome {
    pub ticket: ServiceTicket,
    pub scenario: CancellationScenario,
    pub entries: Vec<JournalEntry>,
    pub refund_cents: i64,
    pub fee_cents: i64,
    /// Units put back on the shelf.
    pub units_returned: i64,
}

#[derive(Debug, Clone)]
pub struct ServiceRepository {
    pool: SqlitePool,
    tenant_id: String,
}

impl ServiceRepository {
    pub fn new(pool: SqlitePool, tenant_id: String) -> Self {
        ServiceRepository { pool, tenant_id }
    }

    pub async fn create_ticket(&self, intake: &NewServiceTicket) -> DbResult<ServiceTicket> {
        intake.validate()?;

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let sequence = next_sequence(&mut tx, &self.tenant_id, "service_ticket").await?;

        let ticket = ServiceTicket {
            id: Uuid::new_v4().to_string(),
            tenant_id: self.tenant_id.clone(),
            ticket_number: format_ticket_number(sequence),
            customer_name: intake.customer_name.trim().to_string(),
            customer_phone: intake.customer_phone.clone(),
            device_description: intake.device_description.trim().to_string(),
            serial_number: intake.serial_number.clone(),
            problem_description: intake.problem_description.trim().to_string(),
            status: ServiceStatus::Received,
            labor_cents: intake.labor_cents,
            deposit_cents: 0,
            paid_cents: 0,
            warranty_days: intake.warranty_days,
            completion_entry_id: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO service_tickets (
                id, tenant_id, ticket_number, customer_name, customer_phone,
                device_description, serial_number, problem_description, status,
                labor_cents, deposit_cents, paid_cents, warranty_days,
                completion_entry_id, cancellation_reason,
                created_at, updated_at, completed_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5,
                ?6, ?7, ?8, ?9,
                ?10, ?11, ?12, ?13,
                ?14, ?15,
                ?16, ?17, ?18
            )
            "#,
        )
        .bind(&ticket.id)
        .bind(&ticket.tenant_id)
        .bind(&ticket.ticket_number)
        .bind(&ticket.customer_name)
        .bind(&ticket.customer_phone)
        .bind(&ticket.device_description)
        .bind(&ticket.serial_number)
        .bind(&ticket.problem_description)
        .bind(ticket.status)
        .bind(ticket.labor_cents)
        .bind(ticket.deposit_cents)
        .bind(ticket.paid_cents)
        .bind(ticket.warranty_days)
        .bind(&ticket.completion_entry_id)
        .bind(&ticket.cancellation_reason)
        .bind(ticket.created_at)
        .bind(ticket.updated_at)
        .bind(ticket.completed_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(ticket = %ticket.ticket_number, customer = %ticket.customer_name, "Service ticket created");
        Ok(ticket)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<ServiceTicket>> {
        let mut conn = self.pool.acquire().await?;
        fetch_ticket_tx(&mut conn, &self.tenant_id, id).await
    }

    pub async fn get_parts(&self, ticket_id: &str) -> DbResult<Vec<ServicePart>> {
        let mut conn = self.pool.acquire().await?;
        require_ticket_tx(&mut conn, &self.tenant_id, ticket_id).await?;
        fetch_parts_tx(&mut conn, ticket_id).await
    }

    /// Tickets still on the bench or waiting for pickup, oldest first.
    pub async fn list_open(&self) -> DbResult<Vec<ServiceTicket>> {
        let sql = format!(
            r#"
            SELECT {} FROM service_tickets
            WHERE tenant_id = ?1
              AND status NOT IN ('delivered', 'cancelled', 'warranty_refunded')
            ORDER BY created_at, ticket_number
            "#,
            TICKET_COLUMNS
        );
        let tickets = sqlx::query_as::<_, ServiceTicket>(&sql)
            .bind(&self.tenant_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(tickets)
    }

    /// Moves a ticket along the workflow.
    ///
    /// Completion, cancellation and warranty refunds carry money and go
    /// through [`complete`](Self::complete) and [`cancel`](Self::cancel).
    pub async fn update_status(&self, ticket_id: &str, next: ServiceStatus) -> DbResult<ServiceTicket> {
        let mut tx = self.pool.begin().await?;
        let mut ticket = require_ticket_tx(&mut tx, &self.tenant_id, ticket_id).await?;

        let workflow_only = !matches!(
            next,
            ServiceStatus::Completed | ServiceStatus::Cancelled | ServiceStatus::WarrantyRefunded
        );
        if !workflow_only {
            return Err(CoreError::InvalidServiceTransition {
                ticket: ticket.ticket_number.clone(),
                from: ticket.status.to_string(),
                to: next.to_string(),
            }
            .into());
        }
        ticket.ensure_transition(next)?;

        ticket.status = next;
        ticket.updated_at = Utc::now();
        save_ticket_tx(&mut tx, &ticket).await?;
        tx.commit().await?;

        debug!(ticket = %ticket.ticket_number, status = %next, "Service status updated");
        Ok(ticket)
    }

    /// Revises the labour quote before completion.
    pub async fn set_labor(&self, ticket_id: &str, labor: Money) -> DbResult<ServiceTicket> {
        let mut tx = self.pool.begin().await?;
        let mut ticket = require_ticket_tx(&mut tx, &self.tenant_id, ticket_id).await?;
        ensure_on_bench(&ticket, ServiceStatus::Completed)?;
        validate_price_cents(labor.cents())?;

        ticket.labor_cents = labor.cents();
        ticket.updated_at = Utc::now();
        save_ticket_tx(&mut tx, &ticket).await?;
        tx.commit().await?;
        Ok(ticket)
    }

    /// Fits a part: snapshots price and cost, and takes it out of stock.
    ///
    /// The inventory account is only credited when the ticket completes.
    pub async fn add_part(&self, ticket_id: &str, product_id: &str, quantity: i64) -> DbResult<ServicePart> {
        validate_quantity(quantity)?;

        let mut tx = self.pool.begin().await?;
        let ticket = require_ticket_tx(&mut tx, &self.tenant_id, ticket_id).await?;
        ensure_on_bench(&ticket, ServiceStatus::Completed)?;

        let product = require_product_tx(&mut tx, &self.tenant_id, product_id).await?;
        let unit_cost = if product.track_inventory { product.cost_cents } else { 0 };

        apply_movement_tx(
            &mut tx,
            &self.tenant_id,
            MovementRequest {
                product_id,
                kind: MovementKind::ServiceReserve,
                quantity_delta: -quantity,
                unit_cost_cents: Some(unit_cost),
                reference_id: Some(ticket_id),
                note: Some(&ticket.ticket_number),
            },
        )
        .await?;

        let part = ServicePart {
            id: Uuid::new_v4().to_string(),
            ticket_id: ticket_id.to_string(),
            product_id: product_id.to_string(),
            sku_snapshot: product.sku.clone(),
            name_snapshot: product.name.clone(),
            quantity,
            unit_price_cents: product.price_cents,
            unit_cost_cents: unit_cost,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO service_parts (
                id, ticket_id, product_id, sku_snapshot, name_snapshot,
                quantity, unit_price_cents, unit_cost_cents, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&part.id)
        .bind(&part.ticket_id)
        .bind(&part.product_id)
        .bind(&part.sku_snapshot)
        .bind(&part.name_snapshot)
        .bind(part.quantity)
        .bind(part.unit_price_cents)
        .bind(part.unit_cost_cents)
        .bind(part.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(ticket = %ticket.ticket_number, sku = %part.sku_snapshot, quantity, "Part added");
        Ok(part)
    }

    /// Takes a deposit before the repair is finished.
    pub async fn record_deposit(
        &self,
        ticket_id: &str,
        amount: Money,
        method: PaymentMethod,
    ) -> DbResult<ServiceTicket> {
        let mut tx = self.pool.begin().await?;
        let mut ticket = require_ticket_tx(&mut tx, &self.tenant_id, ticket_id).await?;
        ensure_on_bench(&ticket, ServiceStatus::Completed)?;

        let draft = service_deposit_entry(&ticket, amount, method)?;
        let entry = insert_entry_tx(&mut tx, &self.tenant_id, &draft).await?;

        ticket.deposit_cents += amount.cents();
        ticket.paid_cents += amount.cents();
        ticket.updated_at = Utc::now();
        save_ticket_tx(&mut tx, &ticket).await?;
        tx.commit().await?;

        info!(
            ticket = %ticket.ticket_number,
            amount = %amount,
            entry = %entry.entry_number,
            "Service deposit recorded"
        );
        Ok(ticket)
    }

    /// Finishes the repair: applies the deposit, settles the balance with
    /// `method` and recognises labour and parts revenue.
    pub async fn complete(&self, ticket_id: &str, method: PaymentMethod) -> DbResult<ServiceTicket> {
        let mut tx = self.pool.begin().await?;
        let mut ticket = require_ticket_tx(&mut tx, &self.tenant_id, ticket_id).await?;
        ticket.ensure_transition(ServiceStatus::Completed)?;

        let parts = fetch_parts_tx(&mut tx, ticket_id).await?;
        let total = ticket.total(&parts);
        let balance = ticket.balance_due(&parts);

        let draft = service_completion_entry(&ticket, &parts, method)?;
        if !draft.is_empty() {
            let entry = insert_entry_tx(&mut tx, &self.tenant_id, &draft).await?;
            ticket.completion_entry_id = Some(entry.id);
        }

        // A balance booked to receivables has not been received yet.
        ticket.paid_cents = if balance.is_positive() && method == PaymentMethod::Credit {
            ticket.deposit_cents
        } else {
            total.cents()
        };

        let now = Utc::now();
        ticket.status = ServiceStatus::Completed;
        ticket.completed_at = Some(now);
        ticket.updated_at = now;
        save_ticket_tx(&mut tx, &ticket).await?;
        tx.commit().await?;

        info!(
            ticket = %ticket.ticket_number,
            total = %total,
            balance = %balance,
            method = %method,
            "Service completed"
        );
        Ok(ticket)
    }

    /// Cancels a ticket or honours a warranty claim.
    ///
    /// The scenario is picked from the ticket's status and the request; see
    /// [`laptoppos_core::reversal`]. Entries, stock returns and the status
    /// change commit together.
    pub async fn cancel(&self, ticket_id: &str, request: &CancellationRequest) -> DbResult<CancellationOutcome> {
        let mut tx = self.pool.begin().await?;
        let mut ticket = require_ticket_tx(&mut tx, &self.tenant_id, ticket_id).await?;
        let parts = fetch_parts_tx(&mut tx, ticket_id).await?;

        let now = Utc::now();
        let plan = plan_cancellation(&ticket, &parts, request, now).map_err(|e| {
            warn!(ticket = %ticket.ticket_number, error = %e, "Cancellation rejected");
            e
        })?;

        let mut entries = Vec::with_capacity(plan.entries.len());
        for draft in &plan.entries {
            entries.push(insert_entry_tx(&mut tx, &self.tenant_id, draft).await?);
        }

        let mut units_returned = 0;
        for item in &plan.stock_returns {
            // Returned units come back at their snapshot cost.
            let product = require_product_tx(&mut tx, &self.tenant_id, &item.product_id).await?;
            if product.track_inventory {
                let average = weighted_average_cost(
                    product.current_stock,
                    product.cost_cents,
                    item.quantity,
                    item.unit_cost_cents,
                );
                if average != product.cost_cents {
                    set_cost_tx(&mut tx, &self.tenant_id, &product.id, average).await?;
                    debug!(sku = %product.sku, old = product.cost_cents, new = average, "Cost re-averaged");
                }
            }

            apply_movement_tx(
                &mut tx,
                &self.tenant_id,
                MovementRequest {
                    product_id: &item.product_id,
                    kind: MovementKind::ServiceReturn,
                    quantity_delta: item.quantity,
                    unit_cost_cents: Some(item.unit_cost_cents),
                    reference_id: Some(ticket_id),
                    note: Some(&ticket.ticket_number),
                },
            )
            .await?;
            units_returned += item.quantity;
        }

        ticket.status = plan.target_status;
        ticket.paid_cents -= plan.refund_cents;
        ticket.cancellation_reason = Some(request.reason.trim().to_string());
        ticket.updated_at = now;
        save_ticket_tx(&mut tx, &ticket).await?;
        tx.commit().await?;

        info!(
            ticket = %ticket.ticket_number,
            scenario = ?plan.scenario,
            refund_cents = plan.refund_cents,
            fee_cents = plan.fee_cents,
            entries = entries.len(),
            "Service ticket cancelled"
        );

        Ok(CancellationOutcome {
            ticket,
            scenario: plan.scenario,
            entries,
            refund_cents: plan.refund_cents,
            fee_cents: plan.fee_cents,
            units_returned,
        })
    }
}

// =============================================================================
// Row Helpers
// =============================================================================

/// Deposits, parts and labour changes stop once the work is handed over.
fn ensure_on_bench(ticket: &ServiceTicket, attempted: ServiceStatus) -> DbResult<()> {
    if ticket.status.is_before_completion() {
        return Ok(());
    }
    Err(CoreError::InvalidServiceTransition {
        ticket: ticket.ticket_number.clone(),
        from: ticket.status.to_string(),
        to: attempted.to_string(),
    }
    .into())
}

async fn fetch_ticket_tx(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    ticket_id: &str,
) -> DbResult<Option<ServiceTicket>> {
    let sql = format!(
        "SELECT {} FROM service_tickets WHERE tenant_id = ?1 AND id = ?2",
        TICKET_COLUMNS
    );
    let ticket = sqlx::query_as::<_, ServiceTicket>(&sql)
        .bind(tenant_id)
        .bind(ticket_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(ticket)
}

async fn require_ticket_tx(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    ticket_id: &str,
) -> DbResult<ServiceTicket> {
    fetch_ticket_tx(conn, tenant_id, ticket_id)
        .await?
        .ok_or_else(|| CoreError::ServiceNotFound(ticket_id.to_string()).into())
}

async fn fetch_parts_tx(conn: &mut SqliteConnection, ticket_id: &str) -> DbResult<Vec<ServicePart>> {
    let sql = format!(
        "SELECT {} FROM service_parts WHERE ticket_id = ?1 ORDER BY created_at, rowid",
        PART_COLUMNS
    );
    let parts = sqlx::query_as::<_, ServicePart>(&sql)
        .bind(ticket_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(parts)
}

/// Writes the mutable columns of a ticket.
async fn save_ticket_tx(conn: &mut SqliteConnection, ticket: &ServiceTicket) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE service_tickets SET
            status = ?1,
            labor_cents = ?2,
            deposit_cents = ?3,
            paid_cents = ?4,
            completion_entry_id = ?5,
            cancellation_reason = ?6,
            updated_at = ?7,
            completed_at = ?8
        WHERE tenant_id = ?9 AND id = ?10
        "#,
    )
    .bind(ticket.status)
    .bind(ticket.labor_cents)
    .bind(ticket.deposit_cents)
    .bind(ticket.paid_cents)
    .bind(&ticket.completion_entry_id)
    .bind(&ticket.cancellation_reason)
    .bind(ticket.updated_at)
    .bind(ticket.completed_at)
    .bind(&ticket.tenant_id)
    .bind(&ticket.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::pool::Database;
    use crate::repository::purchase::PurchaseLine;
    use crate::repository::test_support::{ledger_db, stocked_product};
    use laptoppos_core::ReferenceType;

    fn intake(labor_cents: i64, warranty_days: i64) -> NewServiceTicket {
        NewServiceTicket {
            customer_name: "Rina".to_string(),
            customer_phone: Some("0812-555-0101".to_string()),
            device_description: "ThinkPad T480".to_string(),
            serial_number: Some("PF-1XK2".to_string()),
            problem_description: "Slow boot, replace drive".to_string(),
            labor_cents,
            warranty_days,
        }
    }

    async fn balance(db: &Database, code: &str) -> i64 {
        db.finance().account_balance(code, None).await.unwrap().balance_cents
    }

    /// Ticket with a 50_000 cash deposit and one SSD (price 80_000, cost 50_000)
    /// fitted, sitting in `InProgress`. Starting stock is 3.
    async fn ticket_on_bench(db: &Database) -> (ServiceTicket, String) {
        let ssd = stocked_product(db, "SSD-512", 80_000, 50_000, 3).await;
        let services = db.services();

        let ticket = services.create_ticket(&intake(150_000, 30)).await.unwrap();
        services
            .record_deposit(&ticket.id, Money::from_cents(50_000), PaymentMethod::Cash)
            .await
            .unwrap();
        services.add_part(&ticket.id, &ssd.id, 1).await.unwrap();
        let ticket = services
            .update_status(&ticket.id, ServiceStatus::InProgress)
            .await
            .unwrap();
        (ticket, ssd.id)
    }

    #[tokio::test]
    async fn test_create_and_list_open() {
        let db = ledger_db().await;
        let services = db.services();

        let first = services.create_ticket(&intake(100_000, 0)).await.unwrap();
        let second = services.create_ticket(&intake(0, 0)).await.unwrap();
        assert_eq!(first.ticket_number, "SRV-000001");
        assert_eq!(second.ticket_number, "SRV-000002");
        assert_eq!(services.list_open().await.unwrap().len(), 2);

        let bad = NewServiceTicket {
            customer_name: " ".to_string(),
            ..intake(0, 0)
        };
        assert!(services.create_ticket(&bad).await.is_err());
    }

    #[tokio::test]
    async fn test_update_status_follows_workflow() {
        let db = ledger_db().await;
        let services = db.services();
        let ticket = services.create_ticket(&intake(100_000, 0)).await.unwrap();

        services
            .update_status(&ticket.id, ServiceStatus::Diagnosing)
            .await
            .unwrap();
        assert!(matches!(
            services.update_status(&ticket.id, ServiceStatus::Delivered).await,
            Err(DbError::Rule(CoreError::InvalidServiceTransition { .. }))
        ));
        assert!(matches!(
            services.update_status(&ticket.id, ServiceStatus::Cancelled).await,
            Err(DbError::Rule(CoreError::InvalidServiceTransition { .. }))
        ));
    }

    #[tokio::test]
    async fn test_deposit_part_and_completion() {
        let db = ledger_db().await;
        let (ticket, ssd_id) = ticket_on_bench(&db).await;

        assert_eq!(balance(&db, "2100").await, 50_000);
        let stock = db.products().get_by_id(&ssd_id).await.unwrap().unwrap();
        assert_eq!(stock.current_stock, 2);

        let done = db
            .services()
            .complete(&ticket.id, PaymentMethod::Cash)
            .await
            .unwrap();
        assert_eq!(done.status, ServiceStatus::Completed);
        assert_eq!(done.paid_cents, 230_000);
        assert!(done.completion_entry_id.is_some());

        assert_eq!(balance(&db, "2100").await, 0);
        assert_eq!(balance(&db, "1000").await, 230_000);
        assert_eq!(balance(&db, "4100").await, 150_000);
        assert_eq!(balance(&db, "4000").await, 80_000);
        assert_eq!(balance(&db, "5000").await, 50_000);

        assert_eq!(db.services().list_open().await.unwrap().len(), 1);
        db.services()
            .update_status(&ticket.id, ServiceStatus::Delivered)
            .await
            .unwrap();
        assert!(db.services().list_open().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_before_completion_keeps_fee() {
        let db = ledger_db().await;
        let (ticket, ssd_id) = ticket_on_bench(&db).await;

        let outcome = db
            .services()
            .cancel(
                &ticket.id,
                &CancellationRequest::cancel("Customer declined", PaymentMethod::Cash).with_fee(20_000),
            )
            .await
            .unwrap();

        assert_eq!(outcome.scenario, CancellationScenario::BeforeCompletion);
        assert_eq!(outcome.ticket.status, ServiceStatus::Cancelled);
        assert_eq!(outcome.refund_cents, 30_000);
        assert_eq!(outcome.units_returned, 1);
        assert_eq!(outcome.ticket.paid_cents, 20_000);

        assert_eq!(balance(&db, "2100").await, 0);
        assert_eq!(balance(&db, "4200").await, 20_000);
        assert_eq!(balance(&db, "1000").await, 20_000);
        let stock = db.products().get_by_id(&ssd_id).await.unwrap().unwrap();
        assert_eq!(stock.current_stock, 3);

        assert!(matches!(
            db.services()
                .cancel(&ticket.id, &CancellationRequest::cancel("Again", PaymentMethod::Cash))
                .await,
            Err(DbError::Rule(CoreError::InvalidServiceTransition { .. }))
        ));
    }

    #[tokio::test]
    async fn test_fee_larger_than_deposit_changes_nothing() {
        let db = ledger_db().await;
        let (ticket, _) = ticket_on_bench(&db).await;

        let result = db
            .services()
            .cancel(
                &ticket.id,
                &CancellationRequest::cancel("Declined", PaymentMethod::Cash).with_fee(60_000),
            )
            .await;
        assert!(matches!(
            result,
            Err(DbError::Rule(CoreError::CancellationFeeTooLarge { .. }))
        ));

        let unchanged = db.services().get(&ticket.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, ServiceStatus::InProgress);
        assert_eq!(balance(&db, "2100").await, 50_000);
    }

    #[tokio::test]
    async fn test_cancel_after_completion_returns_revenue() {
        let db = ledger_db().await;
        let (ticket, ssd_id) = ticket_on_bench(&db).await;
        db.services()
            .complete(&ticket.id, PaymentMethod::Cash)
            .await
            .unwrap();

        let outcome = db
            .services()
            .cancel(
                &ticket.id,
                &CancellationRequest::cancel("Device still faulty", PaymentMethod::Cash).with_fee(30_000),
            )
            .await
            .unwrap();

        assert_eq!(outcome.scenario, CancellationScenario::AfterCompletion);
        assert_eq!(outcome.refund_cents, 200_000);

        // Revenue stays on its accounts; the contra account offsets it.
        assert_eq!(balance(&db, "4100").await, 150_000);
        assert_eq!(balance(&db, "4900").await, 230_000);
        assert_eq!(balance(&db, "4200").await, 30_000);
        assert_eq!(balance(&db, "1000").await, 30_000);
        assert_eq!(balance(&db, "5000").await, 0);
        assert_eq!(balance(&db, "1200").await, 0);

        let stock = db.products().get_by_id(&ssd_id).await.unwrap().unwrap();
        assert_eq!(stock.current_stock, 3);

        let cancellations = db
            .journal()
            .list_by_reference(ReferenceType::ServiceCancellation, &ticket.id)
            .await
            .unwrap();
        assert_eq!(cancellations.len(), 1);
        assert!(db.finance().trial_balance(None).await.unwrap().is_balanced());

        let now = chrono::Utc::now();
        let income = db
            .finance()
            .income_statement(now - chrono::Duration::days(1), now + chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(income.total_revenue_cents, 260_000);
        assert_eq!(income.total_contra_revenue_cents, 230_000);
        assert_eq!(income.net_revenue_cents, 30_000);
        assert_eq!(income.contra_revenue[0].amount_cents, balance(&db, "4900").await);
    }

    #[tokio::test]
    async fn test_cancel_credit_completion_clears_receivable() {
        let db = ledger_db().await;
        let (ticket, _) = ticket_on_bench(&db).await;
        let done = db
            .services()
            .complete(&ticket.id, PaymentMethod::Credit)
            .await
            .unwrap();
        assert_eq!(done.paid_cents, 50_000);
        assert_eq!(balance(&db, "1100").await, 180_000);

        let outcome = db
            .services()
            .cancel(
                &ticket.id,
                &CancellationRequest::cancel("Never collected", PaymentMethod::Cash).with_fee(10_000),
            )
            .await
            .unwrap();

        assert_eq!(outcome.refund_cents, 40_000);
        assert_eq!(outcome.ticket.paid_cents, 10_000);
        assert_eq!(balance(&db, "1100").await, 0);
        assert_eq!(balance(&db, "1000").await, 10_000);
        assert_eq!(balance(&db, "4900").await, 230_000);
        assert_eq!(balance(&db, "4200").await, 10_000);
        assert!(db.finance().trial_balance(None).await.unwrap().is_balanced());
    }

    #[tokio::test]
    async fn test_warranty_refund_on_partly_paid_ticket() {
        let db = ledger_db().await;
        let (ticket, _) = ticket_on_bench(&db).await;
        db.services()
            .complete(&ticket.id, PaymentMethod::Credit)
            .await
            .unwrap();

        let outcome = db
            .services()
            .cancel(
                &ticket.id,
                &CancellationRequest::warranty("Drive failed again", PaymentMethod::Cash, None),
            )
            .await
            .unwrap();

        assert_eq!(outcome.refund_cents, 50_000);
        assert_eq!(outcome.ticket.paid_cents, 0);
        assert_eq!(balance(&db, "1000").await, 0);
        assert_eq!(balance(&db, "1100").await, 0);
        assert_eq!(balance(&db, "6200").await, 230_000);
        assert!(db.finance().trial_balance(None).await.unwrap().is_balanced());
    }

    #[tokio::test]
    async fn test_warranty_refund_above_paid_changes_nothing() {
        let db = ledger_db().await;
        let (ticket, _) = ticket_on_bench(&db).await;
        db.services()
            .complete(&ticket.id, PaymentMethod::Credit)
            .await
            .unwrap();

        let result = db
            .services()
            .cancel(
                &ticket.id,
                &CancellationRequest::warranty("Screen flicker", PaymentMethod::Cash, Some(60_000)),
            )
            .await;
        assert!(matches!(
            result,
            Err(DbError::Rule(CoreError::RefundExceedsPaid { refund: 60_000, paid: 50_000 }))
        ));

        let unchanged = db.services().get(&ticket.id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, ServiceStatus::Completed);
        assert_eq!(unchanged.paid_cents, 50_000);
        assert_eq!(balance(&db, "1100").await, 180_000);
        assert_eq!(balance(&db, "6200").await, 0);
    }

    #[tokio::test]
    async fn test_returned_parts_reaverage_cost() {
        let db = ledger_db().await;
        let (ticket, ssd_id) = ticket_on_bench(&db).await;

        // 2 on hand at 50_000 + 2 received at 56_000 = 4 at 53_000.
        let purchases = db.purchases();
        let order = purchases
            .create_order("Disk Supplier", &[PurchaseLine::new(ssd_id.clone(), 2, 56_000)], None)
            .await
            .unwrap();
        purchases.receive(&order.id, None).await.unwrap();
        let ssd = db.products().get_by_id(&ssd_id).await.unwrap().unwrap();
        assert_eq!(ssd.cost_cents, 53_000);

        db.services()
            .cancel(&ticket.id, &CancellationRequest::cancel("Declined", PaymentMethod::Cash))
            .await
            .unwrap();

        // 4 at 53_000 + 1 back at 50_000 = 5 at 52_400.
        let ssd = db.products().get_by_id(&ssd_id).await.unwrap().unwrap();
        assert_eq!(ssd.current_stock, 5);
        assert_eq!(ssd.cost_cents, 52_400);
    }

    #[tokio::test]
    async fn test_warranty_refund_within_window() {
        let db = ledger_db().await;
        let (ticket, ssd_id) = ticket_on_bench(&db).await;
        db.services()
            .complete(&ticket.id, PaymentMethod::Cash)
            .await
            .unwrap();

        let outcome = db
            .services()
            .cancel(
                &ticket.id,
                &CancellationRequest::warranty("Drive failed again", PaymentMethod::Cash, Some(100_000)),
            )
            .await
            .unwrap();

        assert_eq!(outcome.scenario, CancellationScenario::WarrantyRefund);
        assert_eq!(outcome.ticket.status, ServiceStatus::WarrantyRefunded);
        assert_eq!(outcome.ticket.paid_cents, 130_000);
        assert_eq!(balance(&db, "6200").await, 100_000);
        assert_eq!(balance(&db, "4100").await, 150_000);

        let stock = db.products().get_by_id(&ssd_id).await.unwrap().unwrap();
        assert_eq!(stock.current_stock, 2);
    }

    #[tokio::test]
    async fn test_warranty_claim_without_warranty() {
        let db = ledger_db().await;
        let services = db.services();
        let ticket = services.create_ticket(&intake(100_000, 0)).await.unwrap();
        services
            .update_status(&ticket.id, ServiceStatus::InProgress)
            .await
            .unwrap();
        services.complete(&ticket.id, PaymentMethod::Card).await.unwrap();

        assert!(matches!(
            services
                .cancel(
                    &ticket.id,
                    &CancellationRequest::warranty("Broke", PaymentMethod::Card, None)
                )
                .await,
            Err(DbError::Rule(CoreError::NoWarranty(_)))
        ));
    }

    #[tokio::test]
    async fn test_completed_ticket_rejects_new_parts() {
        let db = ledger_db().await;
        let (ticket, ssd_id) = ticket_on_bench(&db).await;
        db.services()
            .complete(&ticket.id, PaymentMethod::Cash)
            .await
            .unwrap();

        assert!(db.services().add_part(&ticket.id, &ssd_id, 1).await.is_err());
        assert!(db
            .services()
            .record_deposit(&ticket.id, Money::from_cents(1_000), PaymentMethod::Cash)
            .await
            .is_err());
    }
}
