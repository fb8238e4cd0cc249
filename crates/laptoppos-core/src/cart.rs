//! # Sale Cart
//!
//! The counter's working basket before checkout.
//!
//! ## Cart Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Counter Action             Cart Method             State Change        │
//! │  ──────────────             ───────────             ────────────        │
//! │                                                                         │
//! │  Scan product ────────────► add_item() ───────────► push / merge qty   │
//! │  Change quantity ─────────► update_quantity() ────► qty = n (0 drops)  │
//! │  Line discount ───────────► set_discount() ───────► discount_cents     │
//! │  Remove line ─────────────► remove_item() ────────► retain             │
//! │  Checkout ────────────────► totals() / items ─────► SaleRepository     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Price, cost and tax rate are frozen when a product enters the cart, so a
//! catalogue edit mid-sale never changes what the customer was quoted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::types::{Payment, PaymentMethod, Product, TaxRate};
use crate::validation::{validate_payment_amount, validate_quantity};
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

/// A line in the cart.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: String,
    /// SKU at time of adding (frozen)
    pub sku: String,
    /// Name at time of adding (frozen)
    pub name: String,
    pub unit_price_cents: i64,
    /// Moving average cost when added; becomes the COGS of the line.
    pub unit_cost_cents: i64,
    pub tax_rate_bps: u32,
    pub track_inventory: bool,
    pub quantity: i64,
    /// Discount on the whole line, before tax.
    pub discount_cents: i64,
    #[ts(as = "String")]
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    pub fn from_product(product: &Product, quantity: i64) -> Self {
        CartItem {
            product_id: product.id.clone(),
            sku: product.sku.clone(),
            name: product.name.clone(),
            unit_price_cents: product.price_cents,
            unit_cost_cents: product.cost_cents,
            tax_rate_bps: product.tax_rate_bps,
            track_inventory: product.track_inventory,
            quantity,
            discount_cents: 0,
            added_at: Utc::now(),
        }
    }

    /// unit price × quantity
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }

    /// Line total after discount; the tax base.
    pub fn net_total(&self) -> Money {
        self.line_total() - Money::from_cents(self.discount_cents)
    }

    pub fn tax(&self) -> Money {
        self.net_total()
            .calculate_tax(TaxRate::from_bps(self.tax_rate_bps))
    }

    /// Cost of goods for this line. Untracked items (labour, fees) cost nothing.
    pub fn line_cost(&self) -> Money {
        if !self.track_inventory {
            return Money::zero();
        }
        Money::from_cents(self.unit_cost_cents).multiply_quantity(self.quantity)
    }
}

/// Totals for a cart or a sale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub item_count: usize,
    pub total_quantity: i64,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
    pub cost_cents: i64,
}

/// The cart.
///
/// ## Invariants
/// - Lines are unique by `product_id` (adding again merges quantities)
/// - 1 <= quantity <= `MAX_ITEM_QUANTITY`
/// - At most `MAX_CART_ITEMS` lines
/// - 0 <= line discount <= line total
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleCart {
    items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
}

impl Default for SaleCart {
    fn default() -> Self {
        Self::new()
    }
}

impl SaleCart {
    pub fn new() -> Self {
        SaleCart {
            items: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Adds a product or increases its quantity.
    pub fn add_item(&mut self, product: &Product, quantity: i64) -> CoreResult<()> {
        validate_quantity(quantity)?;

        if !product.is_active {
            return Err(CoreError::ProductNotFound(product.sku.clone()));
        }

        if let Some(item) = self.items.iter_mut().find(|i| i.product_id == product.id) {
            let new_qty = item.quantity + quantity;
            if new_qty > MAX_ITEM_QUANTITY {
                return Err(CoreError::QuantityTooLarge {
                    requested: new_qty,
                    max: MAX_ITEM_QUANTITY,
                });
            }
            product.ensure_available(new_qty)?;
            item.quantity = new_qty;
            return Ok(());
        }

        if self.items.len() >= MAX_CART_ITEMS {
            return Err(CoreError::CartTooLarge { max: MAX_CART_ITEMS });
        }

        product.ensure_available(quantity)?;
        self.items.push(CartItem::from_product(product, quantity));
        Ok(())
    }

    /// Sets a line's quantity. Zero removes the line.
    pub fn update_quantity(&mut self, product_id: &str, quantity: i64) -> CoreResult<()> {
        if quantity == 0 {
            return self.remove_item(product_id);
        }

        if quantity > MAX_ITEM_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: quantity,
                max: MAX_ITEM_QUANTITY,
            });
        }
        validate_quantity(quantity)?;

        let item = self.find_mut(product_id)?;
        item.quantity = quantity;
        // A smaller line can no longer carry a larger discount.
        let line_total = item.line_total().cents();
        if item.discount_cents > line_total {
            item.discount_cents = line_total;
        }
        Ok(())
    }

    /// Sets a fixed discount on a line.
    pub fn set_discount(&mut self, product_id: &str, discount_cents: i64) -> CoreResult<()> {
        let item = self.find_mut(product_id)?;
        let line_total = item.line_total().cents();

        if discount_cents < 0 || discount_cents > line_total {
            return Err(CoreError::InvalidPaymentAmount {
                reason: format!(
                    "discount {} must be between 0 and the line total {}",
                    discount_cents, line_total
                ),
            });
        }

        item.discount_cents = discount_cents;
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: &str) -> CoreResult<()> {
        let initial_len = self.items.len();
        self.items.retain(|i| i.product_id != product_id);

        if self.items.len() == initial_len {
            Err(CoreError::NotInCart(product_id.to_string()))
        } else {
            Ok(())
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.created_at = Utc::now();
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn totals(&self) -> CartTotals {
        let subtotal: Money = self.items.iter().map(CartItem::line_total).sum();
        let discount: Money = self
            .items
            .iter()
            .map(|i| Money::from_cents(i.discount_cents))
            .sum();
        let tax: Money = self.items.iter().map(CartItem::tax).sum();
        let cost: Money = self.items.iter().map(CartItem::line_cost).sum();

        CartTotals {
            item_count: self.items.len(),
            total_quantity: self.items.iter().map(|i| i.quantity).sum(),
            subtotal_cents: subtotal.cents(),
            discount_cents: discount.cents(),
            tax_cents: tax.cents(),
            total_cents: (subtotal - discount + tax).cents(),
            cost_cents: cost.cents(),
        }
    }

    fn find_mut(&mut self, product_id: &str) -> CoreResult<&mut CartItem> {
        self.items
            .iter_mut()
            .find(|i| i.product_id == product_id)
            .ok_or_else(|| CoreError::NotInCart(product_id.to_string()))
    }
}

// =============================================================================
// Tender
// =============================================================================

/// Money handed over at the counter, before change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Tender {
    pub method: PaymentMethod,
    pub amount_cents: i64,
    pub reference: Option<String>,
}

impl Tender {
    pub fn new(method: PaymentMethod, amount_cents: i64) -> Self {
        Tender {
            method,
            amount_cents,
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }
}

/// Turns tenders into payments that sum exactly to `total_cents`.
///
/// ## Rules
/// - Every tender is positive
/// - Tenders must cover the total (`Underpaid`)
/// - Only cash gives change; it comes off the last cash tenders first
pub fn allocate_payments(sale_id: &str, total_cents: i64, tenders: &[Tender]) -> CoreResult<Vec<Payment>> {
    for tender in tenders {
        validate_payment_amount(tender.amount_cents)?;
    }

    let tendered: i64 = tenders.iter().map(|t| t.amount_cents).sum();
    if tendered < total_cents {
        return Err(CoreError::Underpaid {
            due: total_cents,
            paid: tendered,
        });
    }

    let mut change_left = tendered - total_cents;
    let cash: i64 = tenders
        .iter()
        .filter(|t| t.method == PaymentMethod::Cash)
        .map(|t| t.amount_cents)
        .sum();
    if change_left > cash {
        return Err(CoreError::InvalidPaymentAmount {
            reason: format!(
                "overpayment of {} cannot be given as change",
                Money::from_cents(change_left)
            ),
        });
    }

    let now = Utc::now();
    let mut payments: Vec<Payment> = tenders
        .iter()
        .map(|t| Payment {
            id: uuid::Uuid::new_v4().to_string(),
            sale_id: sale_id.to_string(),
            method: t.method,
            amount_cents: t.amount_cents,
            tendered_cents: None,
            change_cents: None,
            reference: t.reference.clone(),
            created_at: now,
        })
        .collect();

    for payment in payments.iter_mut().rev() {
        if payment.method != PaymentMethod::Cash {
            continue;
        }
        let change = change_left.min(payment.amount_cents);
        payment.tendered_cents = Some(payment.amount_cents);
        payment.change_cents = Some(change);
        payment.amount_cents -= change;
        change_left -= change;
    }

    // A cash tender fully returned as change is not a payment.
    payments.retain(|p| p.amount_cents > 0);
    Ok(payments)
}

// =============================================================================
// Unit Tests
// =============================================================================
