//! # Purchase Repository
//!
//! Purchase orders from draft to paid.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create_order ──► Draft  (lines snapshot sku, name and unit cost)      │
//! │                     │                                                   │
//! │  receive(None) ─────┼──► Received   Dr 1200 / Cr 2000 Accounts Payable │
//! │  receive(Some(m)) ──┴──► Paid       Dr 1200 / Cr settlement            │
//! │                     │                                                   │
//! │  pay_supplier(m) ───┴──► Paid       Dr 2000 / Cr settlement            │
//! │                                                                         │
//! │  receive also moves stock in and re-averages product cost              │
//! │  cancel_order: Draft only, nothing was posted                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::journal::insert_entry_tx;
use crate::repository::next_sequence;
use crate::repository::product::{apply_movement_tx, require_product_tx, set_cost_tx, MovementRequest};
use laptoppos_core::posting::{purchase_receipt_entry, supplier_payment_entry};
use laptoppos_core::validation::{validate_party_name, validate_price_cents, validate_quantity};
use laptoppos_core::{
    purchase_total, weighted_average_cost, CoreError, MovementKind, PaymentMethod, PurchaseItem,
    PurchaseOrder, PurchaseStatus, ValidationError,
};

const ORDER_COLUMNS: &str = r#"
    id, tenant_id, po_number, supplier_name, status, total_cents, on_credit,
    receipt_entry_id, payment_entry_id, notes,
    created_at, received_at, paid_at
"#;

const ITEM_COLUMNS: &str = r#"
    id, purchase_id, product_id, sku_snapshot, name_snapshot,
    quantity, unit_cost_cents, line_total_cents
"#;

fn format_po_number(sequence: i64) -> String {
    format!("PO-{:06}", sequence)
}

/// One line of a new purchase order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseLine {
    pub product_id: String,
    pub quantity: i64,
    pub unit_cost_cents: i64,
}

impl PurchaseLine {
    pub fn new(product_id: impl Into<String>, quantity: i64, unit_cost_cents: i64) -> Self {
        PurchaseLine {
            product_id: product_id.into(),
            quantity,
            unit_cost_cents,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PurchaseRepository {
    pool: SqlitePool,
    tenant_id: String,
}

impl PurchaseRepository {
    pub fn new(pool: SqlitePool, tenant_id: String) -> Self {
        PurchaseRepository { pool, tenant_id }
    }

    /// Drafts an order. Nothing touches stock or the ledger until
    /// [`receive`](Self::receive).
    pub async fn create_order(
        &self,
        supplier_name: &str,
        lines: &[PurchaseLine],
        notes: Option<&str>,
    ) -> DbResult<PurchaseOrder> {
        validate_party_name("supplier", supplier_name)?;
        if lines.is_empty() {
            return Err(ValidationError::Required {
                field: "purchase lines".to_string(),
            }
            .into());
        }
        for line in lines {
            validate_quantity(line.quantity)?;
            validate_price_cents(line.unit_cost_cents)?;
        }

        let mut tx = self.pool.begin().await?;
        let order_id = Uuid::new_v4().to_string();

        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            let product = require_product_tx(&mut tx, &self.tenant_id, &line.product_id).await?;
            items.push(PurchaseItem {
                id: Uuid::new_v4().to_string(),
                purchase_id: order_id.clone(),
                product_id: product.id.clone(),
                sku_snapshot: product.sku.clone(),
                name_snapshot: product.name.clone(),
                quantity: line.quantity,
                unit_cost_cents: line.unit_cost_cents,
                line_total_cents: line.unit_cost_cents * line.quantity,
            });
        }

        let sequence = next_sequence(&mut tx, &self.tenant_id, "purchase_order").await?;
        let order = PurchaseOrder {
            id: order_id,
            tenant_id: self.tenant_id.clone(),
            po_number: format_po_number(sequence),
            supplier_name: supplier_name.trim().to_string(),
            status: PurchaseStatus::Draft,
            total_cents: purchase_total(&items).cents(),
            on_credit: false,
            receipt_entry_id: None,
            payment_entry_id: None,
            notes: notes.map(str::to_string),
            created_at: Utc::now(),
            received_at: None,
            paid_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO purchase_orders (
                id, tenant_id, po_number, supplier_name, status, total_cents, on_credit,
                receipt_entry_id, payment_entry_id, notes,
                created_at, received_at, paid_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(&order.id)
        .bind(&order.tenant_id)
        .bind(&order.po_number)
        .bind(&order.supplier_name)
        .bind(order.status)
        .bind(order.total_cents)
        .bind(order.on_credit)
        .bind(&order.receipt_entry_id)
        .bind(&order.payment_entry_id)
        .bind(&order.notes)
        .bind(order.created_at)
        .bind(order.received_at)
        .bind(order.paid_at)
        .execute(&mut *tx)
        .await?;

        for item in &items {
            sqlx::query(
                r#"
                INSERT INTO purchase_items (
                    id, purchase_id, product_id, sku_snapshot, name_snapshot,
                    quantity, unit_cost_cents, line_total_cents
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
            )
            .bind(&item.id)
            .bind(&item.purchase_id)
            .bind(&item.product_id)
            .bind(&item.sku_snapshot)
            .bind(&item.name_snapshot)
            .bind(item.quantity)
            .bind(item.unit_cost_cents)
            .bind(item.line_total_cents)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(po = %order.po_number, supplier = %order.supplier_name, total_cents = order.total_cents, "Purchase order created");
        Ok(order)
    }

    pub async fn get(&self, id: &str) -> DbResult<Option<PurchaseOrder>> {
        let mut conn = self.pool.acquire().await?;
        fetch_order_tx(&mut conn, &self.tenant_id, id).await
    }

    pub async fn get_items(&self, purchase_id: &str) -> DbResult<Vec<PurchaseItem>> {
        let mut conn = self.pool.acquire().await?;
        require_order_tx(&mut conn, &self.tenant_id, purchase_id).await?;
        fetch_items_tx(&mut conn, purchase_id).await
    }

    /// Goods arrive: stock in at the order's unit cost, product cost
    /// re-averaged, inventory debited.
    ///
    /// `pay_with = None` leaves the amount on Accounts Payable.
    pub async fn receive(&self, purchase_id: &str, pay_with: Option<PaymentMethod>) -> DbResult<PurchaseOrder> {
        let mut tx = self.pool.begin().await?;
        let mut order = require_order_tx(&mut tx, &self.tenant_id, purchase_id).await?;
        ensure_status(&order, PurchaseStatus::Draft)?;

        let items = fetch_items_tx(&mut tx, purchase_id).await?;
        for item in &items {
            let product = require_product_tx(&mut tx, &self.tenant_id, &item.product_id).await?;
            if product.track_inventory {
                let average = weighted_average_cost(
                    product.current_stock,
                    product.cost_cents,
                    item.quantity,
                    item.unit_cost_cents,
                );
                set_cost_tx(&mut tx, &self.tenant_id, &product.id, average).await?;
                debug!(sku = %product.sku, old = product.cost_cents, new = average, "Cost re-averaged");
            }

            apply_movement_tx(
                &mut tx,
                &self.tenant_id,
                MovementRequest {
                    product_id: &item.product_id,
                    kind: MovementKind::Purchase,
                    quantity_delta: item.quantity,
                    unit_cost_cents: Some(item.unit_cost_cents),
                    reference_id: Some(purchase_id),
                    note: Some(&order.po_number),
                },
            )
            .await?;
        }

        let draft = purchase_receipt_entry(&order, pay_with)?;
        let entry = insert_entry_tx(&mut tx, &self.tenant_id, &draft).await?;

        let now = Utc::now();
        order.receipt_entry_id = Some(entry.id);
        order.received_at = Some(now);
        order.on_credit = pay_with.is_none();
        if pay_with.is_some() {
            order.status = PurchaseStatus::Paid;
            order.paid_at = Some(now);
        } else {
            order.status = PurchaseStatus::Received;
        }
        save_order_tx(&mut tx, &order).await?;
        tx.commit().await?;

        info!(
            po = %order.po_number,
            status = %order.status,
            total_cents = order.total_cents,
            entry = %entry.entry_number,
            "Purchase received"
        );
        Ok(order)
    }

    /// Settles an order received on credit.
    pub async fn pay_supplier(&self, purchase_id: &str, method: PaymentMethod) -> DbResult<PurchaseOrder> {
        let mut tx = self.pool.begin().await?;
        let mut order = require_order_tx(&mut tx, &self.tenant_id, purchase_id).await?;
        ensure_status(&order, PurchaseStatus::Received)?;

        let draft = supplier_payment_entry(&order, method)?;
        let entry = insert_entry_tx(&mut tx, &self.tenant_id, &draft).await?;

        order.payment_entry_id = Some(entry.id);
        order.status = PurchaseStatus::Paid;
        order.paid_at = Some(Utc::now());
        save_order_tx(&mut tx, &order).await?;
        tx.commit().await?;

        info!(po = %order.po_number, method = %method, entry = %entry.entry_number, "Supplier paid");
        Ok(order)
    }

    pub async fn cancel_order(&self, purchase_id: &str) -> DbResult<PurchaseOrder> {
        let mut tx = self.pool.begin().await?;
        let mut order = require_order_tx(&mut tx, &self.tenant_id, purchase_id).await?;
        ensure_status(&order, PurchaseStatus::Draft)?;

        order.status = PurchaseStatus::Cancelled;
        save_order_tx(&mut tx, &order).await?;
        tx.commit().await?;

        info!(po = %order.po_number, "Purchase order cancelled");
        Ok(order)
    }

    /// Orders received on credit and not yet paid.
    pub async fn list_payable(&self) -> DbResult<Vec<PurchaseOrder>> {
        let sql = format!(
            "SELECT {} FROM purchase_orders WHERE tenant_id = ?1 AND status = 'received' ORDER BY received_at",
            ORDER_COLUMNS
        );
        let orders = sqlx::query_as::<_, PurchaseOrder>(&sql)
            .bind(&self.tenant_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(orders)
    }
}

fn ensure_status(order: &PurchaseOrder, expected: PurchaseStatus) -> DbResult<()> {
    if order.status == expected {
        return Ok(());
    }
    warn!(po = %order.po_number, status = %order.status, expected = %expected, "Purchase operation rejected");
    Err(CoreError::InvalidPurchaseStatus {
        po: order.po_number.clone(),
        current_status: order.status.to_string(),
    }
    .into())
}

async fn fetch_order_tx(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    purchase_id: &str,
) -> DbResult<Option<PurchaseOrder>> {
    let sql = format!(
        "SELECT {} FROM purchase_orders WHERE tenant_id = ?1 AND id = ?2",
        ORDER_COLUMNS
    );
    let order = sqlx::query_as::<_, PurchaseOrder>(&sql)
        .bind(tenant_id)
        .bind(purchase_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(order)
}

async fn require_order_tx(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    purchase_id: &str,
) -> DbResult<PurchaseOrder> {
    fetch_order_tx(conn, tenant_id, purchase_id)
        .await?
        .ok_or_else(|| CoreError::PurchaseNotFound(purchase_id.to_string()).into())
}

async fn fetch_items_tx(conn: &mut SqliteConnection, purchase_id: &str) -> DbResult<Vec<PurchaseItem>> {
    let sql = format!(
        "SELECT {} FROM purchase_items WHERE purchase_id = ?1 ORDER BY rowid",
        ITEM_COLUMNS
    );
    let items = sqlx::query_as::<_, PurchaseItem>(&sql)
        .bind(purchase_id)
        .fetch_all(&mut *conn)
        .await?;
    Ok(items)
}

async fn save_order_tx(conn: &mut SqliteConnection, order: &PurchaseOrder) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE purchase_orders SET
            status = ?1, on_credit = ?2, receipt_entry_id = ?3, payment_entry_id = ?4,
            received_at = ?5, paid_at = ?6
        WHERE tenant_id = ?7 AND id = ?8
        "#,
    )
    .bind(order.status)
    .bind(order.on_credit)
    .bind(&order.receipt_entry_id)
    .bind(&order.payment_entry_id)
    .bind(order.received_at)
    .bind(order.paid_at)
    .bind(&order.tenant_id)
    .bind(&order.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use crate::repository::test_support::{ledger_db, stocked_product};

    #[tokio::test]
    async fn test_receive_on_credit_then_pay() {
        let db = ledger_db().await;
        let ssd = stocked_product(&db, "SSD-512", 80_000, 50_000, 3).await;
        let purchases = db.purchases();

        let order = purchases
            .create_order("PT Sumber Komputer", &[PurchaseLine::new(&ssd.id, 2, 56_000)], None)
            .await
            .unwrap();
        assert_eq!(order.po_number, "PO-000001");
        assert_eq!(order.total_cents, 112_000);
        assert_eq!(order.status, PurchaseStatus::Draft);

        let received = purchases.receive(&order.id, None).await.unwrap();
        assert_eq!(received.status, PurchaseStatus::Received);
        assert!(received.on_credit);

        let product = db.products().get_by_id(&ssd.id).await.unwrap().unwrap();
        assert_eq!(product.current_stock, 5);
        // (3 * 50_000 + 2 * 56_000) / 5
        assert_eq!(product.cost_cents, 52_400);

        let finance = db.finance();
        assert_eq!(finance.account_balance("1200", None).await.unwrap().balance_cents, 112_000);
        assert_eq!(finance.account_balance("2000", None).await.unwrap().balance_cents, 112_000);
        assert_eq!(purchases.list_payable().await.unwrap().len(), 1);

        let paid = purchases
            .pay_supplier(&order.id, PaymentMethod::BankTransfer)
            .await
            .unwrap();
        assert_eq!(paid.status, PurchaseStatus::Paid);
        assert!(paid.payment_entry_id.is_some());
        assert_eq!(finance.account_balance("2000", None).await.unwrap().balance_cents, 0);
        assert_eq!(finance.account_balance("1010", None).await.unwrap().balance_cents, -112_000);
        assert!(purchases.list_payable().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_receive_paid_on_receipt() {
        let db = ledger_db().await;
        let ram = stocked_product(&db, "RAM-16", 45_000, 30_000, 0).await;
        let purchases = db.purchases();

        let order = purchases
            .create_order("Mega Parts", &[PurchaseLine::new(&ram.id, 4, 28_000)], Some("Walk-in"))
            .await
            .unwrap();
        let received = purchases.receive(&order.id, Some(PaymentMethod::Cash)).await.unwrap();
        assert_eq!(received.status, PurchaseStatus::Paid);
        assert!(!received.on_credit);

        // Nothing on hand, so the new cost replaces the old one.
        let product = db.products().get_by_id(&ram.id).await.unwrap().unwrap();
        assert_eq!(product.cost_cents, 28_000);

        assert!(matches!(
            purchases.pay_supplier(&order.id, PaymentMethod::Cash).await,
            Err(DbError::Rule(CoreError::InvalidPurchaseStatus { .. }))
        ));
        assert!(matches!(
            purchases.receive(&order.id, None).await,
            Err(DbError::Rule(CoreError::InvalidPurchaseStatus { .. }))
        ));
    }

    #[tokio::test]
    async fn test_cancel_only_drafts() {
        let db = ledger_db().await;
        let ssd = stocked_product(&db, "SSD-1T", 120_000, 90_000, 1).await;
        let purchases = db.purchases();

        let order = purchases
            .create_order("PT Sumber Komputer", &[PurchaseLine::new(&ssd.id, 1, 90_000)], None)
            .await
            .unwrap();
        let cancelled = purchases.cancel_order(&order.id).await.unwrap();
        assert_eq!(cancelled.status, PurchaseStatus::Cancelled);
        assert!(purchases.receive(&order.id, None).await.is_err());

        let stock = db.products().get_by_id(&ssd.id).await.unwrap().unwrap();
        assert_eq!(stock.current_stock, 1);
    }

    #[tokio::test]
    async fn test_create_order_validation() {
        let db = ledger_db().await;
        let purchases = db.purchases();

        assert!(purchases.create_order("Supplier", &[], None).await.is_err());
        assert!(matches!(
            purchases
                .create_order("Supplier", &[PurchaseLine::new("missing", 1, 100)], None)
                .await,
            Err(DbError::Rule(CoreError::ProductNotFound(_)))
        ));
        assert!(purchases.get("missing").await.unwrap().is_none());
    }
}
