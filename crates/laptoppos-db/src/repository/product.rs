//! # Product Repository
//!
//! Catalogue storage, full-text search and the stock movement log.
//!
//! ## FTS5 Search
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Counter types: "ssd 5"                                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  "ssd" "5"*   ← each term quoted, last term prefix-matched              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  products_fts (sku, name, barcode) MATCH ... AND tenant_id = ?          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  [SSD-512 Samsung 512GB, SSD-500 Crucial 500GB]  ordered by rank        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Stock Changes
//! Every change to `current_stock` goes through [`apply_movement_tx`], which
//! writes a `stock_movements` row in the same transaction. Sales, purchases
//! and repairs call it from their own repositories.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::journal::insert_entry_tx;
use laptoppos_core::posting::stock_adjustment_entry;
use laptoppos_core::validation::{
    validate_price_cents, validate_product_name, validate_search_query, validate_sku,
    validate_tax_rate_bps,
};
use laptoppos_core::{CoreError, MovementKind, Product, StockMovement};

const PRODUCT_COLUMNS: &str = r#"
    id, tenant_id, sku, barcode, name, description,
    price_cents, cost_cents, tax_rate_bps,
    track_inventory, allow_negative_stock, current_stock,
    is_active, created_at, updated_at
"#;

const MOVEMENT_COLUMNS: &str = r#"
    id, tenant_id, product_id, kind, quantity_delta, unit_cost_cents,
    reference_id, note, created_at
"#;

/// A stock change waiting to be applied.
#[derive(Debug, Clone)]
pub(crate) struct MovementRequest<'a> {
    pub product_id: &'a str,
    pub kind: MovementKind,
    pub quantity_delta: i64,
    /// Cost attached to the movement; `None` uses the product's average cost.
    pub unit_cost_cents: Option<i64>,
    pub reference_id: Option<&'a str>,
    pub note: Option<&'a str>,
}

// =============================================================================
// Transaction-Scoped Operations
// =============================================================================

pub(crate) async fn fetch_product_tx(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    product_id: &str,
) -> DbResult<Option<Product>> {
    let sql = format!(
        "SELECT {} FROM products WHERE tenant_id = ?1 AND id = ?2",
        PRODUCT_COLUMNS
    );
    let product = sqlx::query_as::<_, Product>(&sql)
        .bind(tenant_id)
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(product)
}

/// Active product or `ProductNotFound`.
pub(crate) async fn require_product_tx(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    product_id: &str,
) -> DbResult<Product> {
    match fetch_product_tx(&mut *conn, tenant_id, product_id).await? {
        Some(product) if product.is_active => Ok(product),
        _ => Err(CoreError::ProductNotFound(product_id.to_string()).into()),
    }
}

/// Moves stock and logs the movement.
///
/// Untracked products are returned unchanged. Outgoing movements respect
/// `allow_negative_stock`.
pub(crate) async fn apply_movement_tx(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    request: MovementRequest<'_>,
) -> DbResult<Product> {
    let mut product = fetch_product_tx(&mut *conn, tenant_id, request.product_id)
        .await?
        .ok_or_else(|| CoreError::ProductNotFound(request.product_id.to_string()))?;

    if !product.track_inventory || request.quantity_delta == 0 {
        return Ok(product);
    }

    if request.quantity_delta < 0 {
        product.ensure_available(-request.quantity_delta)?;
    }

    let now = Utc::now();
    sqlx::query(
        r#"
        UPDATE products
        SET current_stock = current_stock + ?1, updated_at = ?2
        WHERE tenant_id = ?3 AND id = ?4
        "#,
    )
    .bind(request.quantity_delta)
    .bind(now)
    .bind(tenant_id)
    .bind(request.product_id)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            id, tenant_id, product_id, kind, quantity_delta, unit_cost_cents,
            reference_id, note, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(tenant_id)
    .bind(request.product_id)
    .bind(request.kind)
    .bind(request.quantity_delta)
    .bind(request.unit_cost_cents.unwrap_or(product.cost_cents))
    .bind(request.reference_id)
    .bind(request.note)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    debug!(
        sku = %product.sku,
        kind = ?request.kind,
        delta = request.quantity_delta,
        "Stock moved"
    );

    product.current_stock += request.quantity_delta;
    product.updated_at = now;
    Ok(product)
}

/// Replaces the moving average cost after a receipt.
pub(crate) async fn set_cost_tx(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    product_id: &str,
    cost_cents: i64,
) -> DbResult<()> {
    sqlx::query(
        "UPDATE products SET cost_cents = ?1, updated_at = ?2 WHERE tenant_id = ?3 AND id = ?4",
    )
    .bind(cost_cents)
    .bind(Utc::now())
    .bind(tenant_id)
    .bind(product_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for products and their stock.
///
/// ## Usage
/// ```rust,ignore
/// let products = db.products();
/// let hits = products.search("ssd", 20).await?;
/// products.adjust_stock(&hits[0].id, -1, "Dropped on the floor").await?;
/// ```
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
    tenant_id: String,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool, tenant_id: String) -> Self {
        ProductRepository { pool, tenant_id }
    }

    /// Inserts a product under this repository's tenant.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - SKU already exists for the tenant
    pub async fn insert(&self, product: &Product) -> DbResult<Product> {
        validate_sku(&product.sku)?;
        validate_product_name(&product.name)?;
        validate_price_cents(product.price_cents)?;
        validate_price_cents(product.cost_cents)?;
        validate_tax_rate_bps(product.tax_rate_bps)?;

        let mut product = product.clone();
        product.tenant_id = self.tenant_id.clone();
        product.sku = product.sku.trim().to_string();
        product.name = product.name.trim().to_string();

        debug!(sku = %product.sku, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, tenant_id, sku, barcode, name, description,
                price_cents, cost_cents, tax_rate_bps,
                track_inventory, allow_negative_stock, current_stock,
                is_active, created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6,
                ?7, ?8, ?9,
                ?10, ?11, ?12,
                ?13, ?14, ?15
            )
            "#,
        )
        .bind(&product.id)
        .bind(&product.tenant_id)
        .bind(&product.sku)
        .bind(&product.barcode)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price_cents)
        .bind(product.cost_cents)
        .bind(product.tax_rate_bps)
        .bind(product.track_inventory)
        .bind(product.allow_negative_stock)
        .bind(product.current_stock)
        .bind(product.is_active)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(product)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Product>> {
        let mut conn = self.pool.acquire().await?;
        fetch_product_tx(&mut conn, &self.tenant_id, id).await
    }

    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Product>> {
        let sql = format!(
            "SELECT {} FROM products WHERE tenant_id = ?1 AND sku = ?2",
            PRODUCT_COLUMNS
        );
        let product = sqlx::query_as::<_, Product>(&sql)
            .bind(&self.tenant_id)
            .bind(sku.trim())
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    /// Full-text search over SKU, name and barcode. An empty query lists
    /// active products by name.
    pub async fn search(&self, query: &str, limit: u32) -> DbResult<Vec<Product>> {
        let query = validate_search_query(query)?;

        debug!(query = %query, limit = %limit, "Searching products");

        let Some(fts_query) = fts_match_expression(&query) else {
            return self.list_active(limit).await;
        };

        let sql = format!(
            r#"
            SELECT {}
            FROM products
            WHERE rowid IN (SELECT rowid FROM products_fts WHERE products_fts MATCH ?1)
              AND tenant_id = ?2 AND is_active = 1
            ORDER BY name
            LIMIT ?3
            "#,
            PRODUCT_COLUMNS
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(&fts_query)
            .bind(&self.tenant_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        debug!(count = products.len(), "Search returned products");
        Ok(products)
    }

    pub async fn list_active(&self, limit: u32) -> DbResult<Vec<Product>> {
        let sql = format!(
            "SELECT {} FROM products WHERE tenant_id = ?1 AND is_active = 1 ORDER BY name LIMIT ?2",
            PRODUCT_COLUMNS
        );
        let products = sqlx::query_as::<_, Product>(&sql)
            .bind(&self.tenant_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    /// Corrects on-hand stock after a count and books the value difference.
    ///
    /// ## Ledger
    /// Found stock: Dr Inventory / Cr Parts Write-off.
    /// Missing stock: the reverse, at the product's average cost.
    pub async fn adjust_stock(&self, product_id: &str, quantity_delta: i64, note: &str) -> DbResult<Product> {
        if quantity_delta == 0 {
            return Err(DbError::Internal("Stock adjustment of zero units".to_string()));
        }

        let mut tx = self.pool.begin().await?;
        let product = require_product_tx(&mut tx, &self.tenant_id, product_id).await?;

        let updated = apply_movement_tx(
            &mut tx,
            &self.tenant_id,
            MovementRequest {
                product_id,
                kind: MovementKind::Adjustment,
                quantity_delta,
                unit_cost_cents: None,
                reference_id: None,
                note: Some(note),
            },
        )
        .await?;

        let draft = stock_adjustment_entry(&product, quantity_delta, note);
        if !draft.is_empty() {
            insert_entry_tx(&mut tx, &self.tenant_id, &draft).await?;
        }

        tx.commit().await?;

        info!(
            sku = %updated.sku,
            delta = quantity_delta,
            stock = updated.current_stock,
            "Stock adjusted"
        );
        Ok(updated)
    }

    /// Movement history for a product, newest first.
    pub async fn movements(&self, product_id: &str, limit: u32) -> DbResult<Vec<StockMovement>> {
        let sql = format!(
            r#"
            SELECT {} FROM stock_movements
            WHERE tenant_id = ?1 AND product_id = ?2
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?3
            "#,
            MOVEMENT_COLUMNS
        );
        let movements = sqlx::query_as::<_, StockMovement>(&sql)
            .bind(&self.tenant_id)
            .bind(product_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(movements)
    }

    /// Soft-deletes a product. Past sales and repairs keep referencing it.
    pub async fn deactivate(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE products SET is_active = 0, updated_at = ?1 WHERE tenant_id = ?2 AND id = ?3",
        )
        .bind(Utc::now())
        .bind(&self.tenant_id)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }
        Ok(())
    }
}

/// Quotes every term so FTS5 operators in user input stay literal, and
/// prefix-matches the last one. `None` when nothing searchable remains.
fn fts_match_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
        .collect();

    if terms.is_empty() {
        return None;
    }
    Some(format!("{}*", terms.join(" ")))
}

/// New product with a fresh id and zero stock; callers fill in the rest.
pub fn new_product(sku: &str, name: &str, price_cents: i64, cost_cents: i64) -> Product {
    let now = Utc::now();
    Product {
        id: Uuid::new_v4().to_string(),
        tenant_id: String::new(),
        sku: sku.to_string(),
        barcode: None,
        name: name.to_string(),
        description: None,
        price_cents,
        cost_cents,
        tax_rate_bps: 0,
        track_inventory: true,
        allow_negative_stock: false,
        current_stock: 0,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::test_support::{ledger_db, stocked_product};

    #[test]
    fn test_fts_match_expression() {
        assert_eq!(fts_match_expression("ssd").as_deref(), Some("\"ssd\"*"));
        assert_eq!(
            fts_match_expression("ssd  512").as_deref(),
            Some("\"ssd\" \"512\"*")
        );
        assert_eq!(fts_match_expression("a\"b").as_deref(), Some("\"a\"\"b\"*"));
        assert!(fts_match_expression("   ").is_none());
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let db = ledger_db().await;
        let product = stocked_product(&db, "SSD-512", 90_000, 60_000, 4).await;

        assert_eq!(product.tenant_id, db.tenant_id());
        let by_sku = db.products().get_by_sku("SSD-512").await.unwrap().unwrap();
        assert_eq!(by_sku.id, product.id);

        let duplicate = db.products().insert(&new_product("SSD-512", "Again", 1, 1)).await;
        assert!(matches!(duplicate, Err(DbError::UniqueViolation { .. })));

        let invalid = db.products().insert(&new_product("", "No sku", 1, 1)).await;
        assert!(invalid.is_err());
    }

    #[tokio::test]
    async fn test_search_is_tenant_scoped() {
        let db = ledger_db().await;
        stocked_product(&db, "SSD-512", 90_000, 60_000, 4).await;
        stocked_product(&db, "RAM-8G", 45_000, 30_000, 10).await;

        let hits = db.products().search("ssd", 20).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].sku, "SSD-512");

        assert_eq!(db.products().search("", 20).await.unwrap().len(), 2);

        let other = db
            .for_tenant("6f1c2b7e-9a43-4c55-8d1e-3b2a1c0d9e8f")
            .unwrap();
        assert!(other.products().search("ssd", 20).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_adjust_stock_logs_movement_and_value() {
        let db = ledger_db().await;
        let product = stocked_product(&db, "RAM-8G", 45_000, 30_000, 10).await;

        let updated = db
            .products()
            .adjust_stock(&product.id, -2, "Damaged in storage")
            .await
            .unwrap();
        assert_eq!(updated.current_stock, 8);

        let movements = db.products().movements(&product.id, 10).await.unwrap();
        assert_eq!(movements.len(), 1);
        assert_eq!(movements[0].kind, MovementKind::Adjustment);
        assert_eq!(movements[0].quantity_delta, -2);

        let write_off = db.finance().account_balance("5100", None).await.unwrap();
        assert_eq!(write_off.balance_cents, 60_000);

        assert!(matches!(
            db.products().adjust_stock(&product.id, -9, "Too many").await,
            Err(DbError::Rule(CoreError::InsufficientStock { .. }))
        ));
        let unchanged = db.products().get_by_id(&product.id).await.unwrap().unwrap();
        assert_eq!(unchanged.current_stock, 8);
    }

    #[tokio::test]
    async fn test_deactivated_product_cannot_be_adjusted() {
        let db = ledger_db().await;
        let product = stocked_product(&db, "FAN-01", 15_000, 8_000, 3).await;
        db.products().deactivate(&product.id).await.unwrap();

        assert!(matches!(
            db.products().adjust_stock(&product.id, 1, "Found").await,
            Err(DbError::Rule(CoreError::ProductNotFound(_)))
        ));
        assert!(db.products().list_active(10).await.unwrap().is_empty());
    }
}
