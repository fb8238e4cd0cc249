//! # Sale Repository
//!
//! Checkout and voids. A sale is written complete or not at all.
//!
//! ## Checkout Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SaleCart + [Tender]                                                    │
//! │       │                                                                 │
//! │       ▼  BEGIN                                                          │
//! │  1. re-read each product (active, stock, current cost)                  │
//! │  2. next_sequence("receipt") ──► R-000042                               │
//! │  3. allocate_payments (change from cash only)                           │
//! │  4. posting::sale_entry ──► insert_entry_tx                             │
//! │  5. INSERT sales, sale_items, payments                                  │
//! │  6. stock_movements (kind = sale) per tracked line                      │
//! │       │                                                                 │
//! │       ▼  COMMIT                                                         │
//! │  Sale { status: Completed, journal_entry_id: Some(..) }                 │
//! │                                                                         │
//! │  void_sale: reverse the entry, put stock back, status = voided          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::journal::{insert_entry_tx, load_posted_tx};
use crate::repository::next_sequence;
use crate::repository::product::{apply_movement_tx, require_product_tx, MovementRequest};
use laptoppos_core::cart::allocate_payments;
use laptoppos_core::posting::{sale_entry, sale_void_entry};
use laptoppos_core::{
    CoreError, MovementKind, Payment, Sale, SaleCart, SaleItem, SaleStatus, Tender,
};

const SALE_COLUMNS: &str = r#"
    id, tenant_id, receipt_number, status,
    subtotal_cents, tax_cents, discount_cents, total_cents, cost_cents,
    user_id, customer_name, notes, journal_entry_id,
    created_at, updated_at, completed_at
"#;

const ITEM_COLUMNS: &str = r#"
    id, sale_id, product_id, sku_snapshot, name_snapshot,
    unit_price_cents, unit_cost_cents, quantity,
    line_total_cents, tax_cents, discount_cents, created_at
"#;

const PAYMENT_COLUMNS: &str = r#"
    id, sale_id, method, amount_cents, tendered_cents, change_cents, reference, created_at
"#;

fn format_receipt_number(sequence: i64) -> String {
    format!("R-{:06}", sequence)
}

#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
    tenant_id: String,
}

impl SaleRepository {
    pub fn new(pool: SqlitePool, tenant_id: String) -> Self {
        SaleRepository { pool, tenant_id }
    }

    /// Completes a sale from a cart.
    ///
    /// ## Arguments
    /// * `cart` - Lines with frozen prices and discounts
    /// * `tenders` - What the customer handed over; cash may exceed the total
    /// * `user_id` - Cashier
    /// * `customer_name` - Required in practice for `Credit` tenders
    pub async fn checkout(
        &self,
        cart: &SaleCart,
        tenders: &[Tender],
        user_id: &str,
        customer_name: Option<&str>,
    ) -> DbResult<Sale> {
        if cart.is_empty() {
            return Err(CoreError::EmptyCart.into());
        }

        let now = Utc::now();
        let sale_id = Uuid::new_v4().to_string();
        let totals = cart.totals();

        let mut tx = self.pool.begin().await?;

        let mut items = Vec::with_capacity(cart.items().len());
        for line in cart.items() {
            let product = require_product_tx(&mut tx, &self.tenant_id, &line.product_id).await?;
            product.ensure_available(line.quantity)?;

            let unit_cost = if product.track_inventory { product.cost_cents } else { 0 };
            items.push(SaleItem {
                id: Uuid::new_v4().to_string(),
                sale_id: sale_id.clone(),
                product_id: line.product_id.clone(),
                sku_snapshot: line.sku.clone(),
                name_snapshot: line.name.clone(),
                unit_price_cents: line.unit_price_cents,
                unit_cost_cents: unit_cost,
                quantity: line.quantity,
                line_total_cents: line.line_total().cents(),
                tax_cents: line.tax().cents(),
                discount_cents: line.discount_cents,
                created_at: now,
            });
        }

        let sequence = next_sequence(&mut tx, &self.tenant_id, "receipt").await?;
        let mut sale = Sale {
            id: sale_id.clone(),
            tenant_id: self.tenant_id.clone(),
            receipt_number: format_receipt_number(sequence),
            status: SaleStatus::Completed,
            subtotal_cents: totals.subtotal_cents,
            tax_cents: totals.tax_cents,
            discount_cents: totals.discount_cents,
            total_cents: totals.total_cents,
            cost_cents: items.iter().map(|i| i.line_cost().cents()).sum(),
            user_id: user_id.to_string(),
            customer_name: customer_name.map(str::to_string),
            notes: None,
            journal_entry_id: None,
            created_at: now,
            updated_at: now,
            completed_at: Some(now),
        };

        let payments = allocate_payments(&sale.id, sale.total_cents, tenders)?;
        let draft = sale_entry(&sale, &items, &payments)?;
        let entry = insert_entry_tx(&mut tx, &self.tenant_id, &draft).await?;
        sale.journal_entry_id = Some(entry.id.clone());

        insert_sale_tx(&mut tx, &sale).await?;
        for item in &items {
            insert_item_tx(&mut tx, item).await?;
            apply_movement_tx(
                &mut tx,
                &self.tenant_id,
                MovementRequest {
                    product_id: &item.product_id,
                    kind: MovementKind::Sale,
                    quantity_delta: -item.quantity,
                    unit_cost_cents: Some(item.unit_cost_cents),
                    reference_id: Some(&sale.id),
                    note: Some(&sale.receipt_number),
                },
            )
            .await?;
        }
        for payment in &payments {
            insert_payment_tx(&mut tx, payment).await?;
        }

        tx.commit().await?;

        info!(
            receipt = %sale.receipt_number,
            total_cents = sale.total_cents,
            items = items.len(),
            entry = %entry.entry_number,
            "Sale completed"
        );
        Ok(sale)
    }

    /// Voids a completed sale: reverses its entry and returns stock.
    pub async fn void_sale(&self, sale_id: &str, reason: &str) -> DbResult<Sale> {
        let mut tx = self.pool.begin().await?;

        let mut sale = fetch_sale_tx(&mut tx, &self.tenant_id, sale_id)
            .await?
            .ok_or_else(|| CoreError::SaleNotFound(sale_id.to_string()))?;

        if sale.status != SaleStatus::Completed {
            warn!(sale_id = %sale_id, status = %sale.status, "Refusing to void sale");
            return Err(CoreError::InvalidSaleStatus {
                sale_id: sale_id.to_string(),
                current_status: sale.status.to_string(),
            }
            .into());
        }

        let entry_id = sale
            .journal_entry_id
            .clone()
            .ok_or_else(|| CoreError::EntryNotFound(format!("sale {}", sale.receipt_number)))?;
        let (entry, lines) = load_posted_tx(&mut tx, &self.tenant_id, &entry_id).await?;
        let draft = sale_void_entry(&sale, &entry, &lines, reason)?;
        let reversal = insert_entry_tx(&mut tx, &self.tenant_id, &draft).await?;

        for item in fetch_items_tx(&mut tx, sale_id).await? {
            apply_movement_tx(
                &mut tx,
                &self.tenant_id,
                MovementRequest {
                    product_id: &item.product_id,
                    kind: MovementKind::SaleVoid,
                    quantity_delta: item.quantity,
                    unit_cost_cents: Some(item.unit_cost_cents),
                    reference_id: Some(sale_id),
                    note: Some(reason),
                },
            )
            .await?;
        }

        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE sales SET status = ?1, notes = ?2, updated_at = ?3
            WHERE tenant_id = ?4 AND id = ?5
            "#,
        )
        .bind(SaleStatus::Voided)
        .bind(reason)
        .bind(now)
        .bind(&self.tenant_id)
        .bind(sale_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            receipt = %sale.receipt_number,
            reversal = %reversal.entry_number,
            "Sale voided"
        );

        sale.status = SaleStatus::Voided;
        sale.notes = Some(reason.to_string());
        sale.updated_at = now;
        Ok(sale)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Sale>> {
        let mut conn = self.pool.acquire().await?;
        fetch_sale_tx(&mut conn, &self.tenant_id, id).await
    }

    pub async fn get_items(&self, sale_id: &str) -> DbResult<Vec<SaleItem>> {
        let mut conn = self.pool.acquire().await?;
        if fetch_sale_tx(&mut conn, &self.tenant_id, sale_id).await?.is_none() {
            return Err(CoreError::SaleNotFound(sale_id.to_string()).into());
        }
        fetch_items_tx(&mut conn, sale_id).await
    }

    pub async fn get_payments(&self, sale_id: &str) -> DbResult<Vec<Payment>> {
        let sql = format!(
            r#"
            SELECT {} FROM payments
            WHERE sale_id = ?1
              AND EXISTS (SELECT 1 FROM sales s WHERE s.id = ?1 AND s.tenant_id = ?2)
            ORDER BY created_at, rowid
            "#,
            PAYMENT_COLUMNS
        );
        let payments = sqlx::query_as::<_, Payment>(&sql)
            .bind(sale_id)
            .bind(&self.tenant_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(payments)
    }
}

// =============================================================================
// Row Helpers
// =============================================================================

async fn fetch_sale_tx(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    sale_id: &str,
) -> DbResult<Option<Sale>> {
    let sql = format!(
        "SELECT {} FROM sales WHERE tenant_id = ?1 AND id = ?2",
        SALE_COLUMNS
    );
    let sale = sqlx::query_as::<_, Sale>(&sql)
        .bind(tenant_id)
        .bind(sale_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(sale)
}

async fn fetch_items_tx(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleItem>> {
    let sql = format!(
        "SELECT {} FROM sale_items WHERE sale_id = ?1 ORDER BY created_at, rowid",
        ITEM_COLUMNS
    );
    let items = sqlx::query_as::<_, SaleItem>(&sql)
        .bind(sale_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(items)
}

async fn insert_sale_tx(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
    debug!(id = %sale.id, receipt_number = %sale.receipt_number, "Inserting sale");

    sqlx::query(
        r#"
        INSERT INTO sales (
            id, tenant_id, receipt_number, status,
            subtotal_cents, tax_cents, discount_cents, total_cents, cost_cents,
            user_id, customer_name, notes, journal_entry_id,
            created_at, updated_at, completed_at
        ) VALUES (
            ?1, ?2, ?3, ?4,
            ?5, ?6, ?7, ?8, ?9,
            ?10, ?11, ?12, ?13,
            ?14, ?15, ?16
        )
        "#,
    )
    .bind(&sale.id)
    .bind(&sale.tenant_id)
    .bind(&sale.receipt_number)
    .bind(sale.status)
    .bind(sale.subtotal_cents)
    .bind(sale.tax_cents)
    .bind(sale.discount_cents)
    .bind(sale.total_cents)
    .bind(sale.cost_cents)
    .bind(&sale.user_id)
    .bind(&sale.customer_name)
    .bind(&sale.notes)
    .bind(&sale.journal_entry_id)
    .bind(sale.created_at)
    .bind(sale.updated_at)
    .bind(sale.completed_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_item_tx(conn: &mut SqliteConnection, item: &SaleItem) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO sale_items (
            id, sale_id, product_id, sku_snapshot, name_snapshot,
            unit_price_cents, unit_cost_cents, quantity,
            line_total_cents, tax_cents, discount_cents, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
    )
    .bind(&item.id)
    .bind(&item.sale_id)
    .bind(&item.product_id)
    .bind(&item.sku_snapshot)
    .bind(&item.name_snapshot)
    .bind(item.unit_price_cents)
    .bind(item.unit_cost_cents)
    .bind(item.quantity)
    .bind(item.line_total_cents)
    .bind(item.tax_cents)
    .bind(item.discount_cents)
    .bind(item.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn insert_payment_tx(conn: &mut SqliteConnection, payment: &Payment) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO payments (
            id, sale_id, method, amount_cents, tendered_cents, change_cents, reference, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&payment.id)
    .bind(&payment.sale_id)
    .bind(payment.method)
    .bind(payment.amount_cents)
    .bind(payment.tendered_cents)
    .bind(payment.change_cents)
    .bind(&payment.reference)
    .bind(payment.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
