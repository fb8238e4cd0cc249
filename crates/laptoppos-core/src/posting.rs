//! # Posting Rules
//!
//! Turns business events into balanced [`JournalEntryDraft`]s. Nothing here
//! touches the database; `laptoppos-db` validates each draft against the
//! tenant's chart and writes it in the same transaction as the event.
//!
//! ## Rule Table
//! ```text
//! ┌───────────────────────┬──────────────────────────────┬───────────────────────────┐
//! │ Event                 │ Debit                        │ Credit                    │
//! ├───────────────────────┼──────────────────────────────┼───────────────────────────┤
//! │ Sale                  │ settlement (per payment)     │ 4000 net sales, 2200 tax  │
//! │                       │ 5000 COGS                    │ 1200 inventory            │
//! │ Service deposit       │ settlement                   │ 2100 deposits             │
//! │ Service completion    │ 2100 deposit, settlement     │ 4100 labour, 4000 parts   │
//! │                       │ 5000 COGS                    │ 1200 inventory            │
//! │ Purchase receipt      │ 1200 inventory               │ settlement or 2000 AP     │
//! │ Supplier payment      │ 2000 AP                      │ settlement                │
//! │ Payroll               │ 6000 gross                   │ settlement net, 2300 w/h  │
//! │ Expense               │ 6xxx chosen account          │ settlement                │
//! │ Stock count +/-       │ 1200 inventory / 5100        │ 5100 / 1200 inventory     │
//! └───────────────────────┴──────────────────────────────┴───────────────────────────┘
//! ```
//!
//! Zero amounts are dropped by the draft, so rules add lines unconditionally.

use std::collections::BTreeMap;

use crate::account::{Account, AccountType, SystemAccount};
use crate::error::{CoreError, CoreResult};
use crate::journal::{reversal_of, JournalEntry, JournalEntryDraft, JournalLine, ReferenceType};
use crate::money::Money;
use crate::service::{ServicePart, ServiceTicket};
use crate::types::{Payment, PaymentMethod, PayrollRecord, Product, PurchaseOrder, Sale, SaleItem};
use crate::validation::validate_posting_amount;

// =============================================================================
// Sales
// =============================================================================

/// Entry for a completed sale.
///
/// Payments must cover the sale total exactly; change has already been
/// netted out of `amount_cents`.
pub fn sale_entry(sale: &Sale, items: &[SaleItem], payments: &[Payment]) -> CoreResult<JournalEntryDraft> {
    let paid: Money = payments.iter().map(Payment::amount).sum();
    let total = Money::from_cents(sale.total_cents);

    if paid < total {
        return Err(CoreError::Underpaid {
            due: total.cents(),
            paid: paid.cents(),
        });
    }
    if paid > total {
        return Err(CoreError::InvalidPaymentAmount {
            reason: format!("payments {} exceed sale total {}", paid, total),
        });
    }

    let mut draft = JournalEntryDraft::new(format!("Sale {}", sale.receipt_number))
        .reference(ReferenceType::Sale, sale.id.clone());

    // One debit per settlement account keeps split tender readable.
    let mut by_account: BTreeMap<&'static str, Money> = BTreeMap::new();
    for payment in payments {
        *by_account
            .entry(payment.method.settlement_account().code())
            .or_insert_with(Money::zero) += payment.amount();
    }
    for (code, amount) in by_account {
        draft = draft.debit(code, amount, "Payment received");
    }

    let net_sales = Money::from_cents(sale.subtotal_cents - sale.discount_cents);
    let cost: Money = items.iter().map(SaleItem::line_cost).sum();

    Ok(draft
        .credit(SystemAccount::SalesRevenue.code(), net_sales, "Net sales")
        .credit(SystemAccount::SalesTaxPayable.code(), Money::from_cents(sale.tax_cents), "Sales tax")
        .debit(SystemAccount::CostOfGoodsSold.code(), cost, "Cost of goods sold")
        .credit(SystemAccount::Inventory.code(), cost, "Inventory out"))
}

/// Mirror of the sale's entry, tagged as a void of the sale.
pub fn sale_void_entry(
    sale: &Sale,
    entry: &JournalEntry,
    lines: &[JournalLine],
    reason: &str,
) -> CoreResult<JournalEntryDraft> {
    let draft = reversal_of(entry, lines, reason)?;
    Ok(draft.reference(ReferenceType::SaleVoid, sale.id.clone()))
}

// =============================================================================
// Service Desk
// =============================================================================

pub fn service_deposit_entry(
    ticket: &ServiceTicket,
    amount: Money,
    method: PaymentMethod,
) -> CoreResult<JournalEntryDraft> {
    validate_posting_amount("deposit", amount.cents())?;

    Ok(
        JournalEntryDraft::new(format!("Deposit for service {}", ticket.ticket_number))
            .reference(ReferenceType::ServiceDeposit, ticket.id.clone())
            .debit(method.settlement_account().code(), amount, "Deposit received")
            .credit(SystemAccount::CustomerDeposits.code(), amount, "Customer deposit"),
    )
}

/// Entry recognising a finished repair.
///
/// The deposit is applied first; the balance is collected with `method`, or
/// refunded with it when the deposit was larger than the bill.
pub fn service_completion_entry(
    ticket: &ServiceTicket,
    parts: &[ServicePart],
    method: PaymentMethod,
) -> CoreResult<JournalEntryDraft> {
    let balance = ticket.balance_due(parts);
    let parts_price = ServiceTicket::parts_price(parts);
    let parts_cost = ServiceTicket::parts_cost(parts);

    let mut draft = JournalEntryDraft::new(format!("Service {} completed", ticket.ticket_number))
        .reference(ReferenceType::ServiceCompletion, ticket.id.clone())
        .debit(SystemAccount::CustomerDeposits.code(), ticket.deposit(), "Deposit applied");

    if balance.is_negative() {
        let account = method.payout_account()?;
        draft = draft.credit(account.code(), balance.abs(), "Excess deposit refunded");
    } else {
        draft = draft.debit(method.settlement_account().code(), balance, "Balance collected");
    }

    Ok(draft
        .credit(SystemAccount::ServiceRevenue.code(), ticket.labor(), "Labour")
        .credit(SystemAccount::SalesRevenue.code(), parts_price, "Parts")
        .debit(SystemAccount::CostOfGoodsSold.code(), parts_cost, "Parts cost")
        .credit(SystemAccount::Inventory.code(), parts_cost, "Parts out"))
}

// =============================================================================
// Purchasing
// =============================================================================

/// Goods received. `pay_with = None` books the amount to Accounts Payable.
pub fn purchase_receipt_entry(
    order: &PurchaseOrder,
    pay_with: Option<PaymentMethod>,
) -> CoreResult<JournalEntryDraft> {
    let total = Money::from_cents(order.total_cents);
    validate_posting_amount("purchase total", total.cents())?;

    let (credit_account, memo) = match pay_with {
        Some(method) => (method.payout_account()?, "Paid on receipt"),
        None => (SystemAccount::AccountsPayable, "Owed to supplier"),
    };

    Ok(JournalEntryDraft::new(format!(
        "Purchase {} from {}",
        order.po_number, order.supplier_name
    ))
    .reference(ReferenceType::Purchase, order.id.clone())
    .debit(SystemAccount::Inventory.code(), total, "Stock received")
    .credit(credit_account.code(), total, memo))
}

pub fn supplier_payment_entry(order: &PurchaseOrder, method: PaymentMethod) -> CoreResult<JournalEntryDraft> {
    let total = Money::from_cents(order.total_cents);
    validate_posting_amount("purchase total", total.cents())?;
    let account = method.payout_account()?;

    Ok(JournalEntryDraft::new(format!(
        "Payment to {} for {}",
        order.supplier_name, order.po_number
    ))
    .reference(ReferenceType::SupplierPayment, order.id.clone())
    .debit(SystemAccount::AccountsPayable.code(), total, "Supplier settled")
    .credit(account.code(), total, "Supplier payment"))
}

// =============================================================================
// Payroll & Expenses
// =============================================================================

pub fn payroll_entry(record: &PayrollRecord, method: PaymentMethod) -> CoreResult<JournalEntryDraft> {
    validate_posting_amount("gross pay", record.gross_cents)?;
    let account = method.payout_account()?;

    Ok(JournalEntryDraft::new(format!(
        "Payroll {} {} to {}",
        record.employee_name, record.period_start, record.period_end
    ))
    .reference(ReferenceType::Payroll, record.id.clone())
    .debit(SystemAccount::SalariesExpense.code(), Money::from_cents(record.gross_cents), "Gross pay")
    .credit(account.code(), Money::from_cents(record.net_cents), "Net pay")
    .credit(
        SystemAccount::PayrollWithholding.code(),
        Money::from_cents(record.deductions_cents),
        "Withheld",
    ))
}

/// Operating expense paid out of a settlement account.
pub fn expense_entry(
    account: &Account,
    amount: Money,
    method: PaymentMethod,
    description: &str,
) -> CoreResult<JournalEntryDraft> {
    if account.account_type != AccountType::Expense {
        return Err(CoreError::NotAnExpenseAccount(account.code.clone()));
    }
    validate_posting_amount("expense", amount.cents())?;
    let settlement = method.payout_account()?;

    Ok(JournalEntryDraft::new(description)
        .reference(ReferenceType::Expense, account.code.clone())
        .debit(&account.code, amount, description)
        .credit(settlement.code(), amount, "Paid"))
}

/// Inventory value change for a manual stock count correction, at the
/// product's current average cost. Shrinkage goes to Parts Write-off.
///
/// The draft is empty when nothing is valued (untracked or zero-cost stock).
pub fn stock_adjustment_entry(product: &Product, quantity_delta: i64, note: &str) -> JournalEntryDraft {
    let value = product.cost().multiply_quantity(quantity_delta);
    let description = format!("Stock adjustment {} ({:+})", product.sku, quantity_delta);
    let draft = JournalEntryDraft::new(description).reference(ReferenceType::Manual, product.id.clone());

    if !product.track_inventory {
        return draft;
    }

    // Negative values flip sides, so shrinkage credits inventory.
    draft
        .debit(SystemAccount::Inventory.code(), value, note)
        .credit(SystemAccount::PartsWriteOff.code(), value, note)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::ChartOfAccounts;
    use crate::journal::{EntrySide, JournalStatus};
    use crate::service::tests::{part, ticket};
    use crate::service::ServiceStatus;
    use crate::types::{PayrollStatus, PurchaseStatus, SaleStatus};
    use crate::DEFAULT_TENANT_ID;
    use chrono::{NaiveDate, Utc};

    fn chart() -> ChartOfAccounts {
        ChartOfAccounts::standard(DEFAULT_TENANT_ID, Utc::now())
    }

    fn amount_on(draft: &JournalEntryDraft, code: &str, side: EntrySide) -> i64 {
        draft
            .lines()
            .iter()
            .filter(|l| l.account_code == code && l.side == side)
            .map(|l| l.amount.cents())
            .sum()
    }

    fn sale() -> Sale {
        Sale {
            id: "sale-1".to_string(),
            tenant_id: DEFAULT_TENANT_ID.to_string(),
            receipt_number: "R-000001".to_string(),
            status: SaleStatus::Completed,
            subtotal_cents: 100_000,
            tax_cents: 9_000,
            discount_cents: 10_000,
            total_cents: 99_000,
            cost_cents: 60_000,
            user_id: "cashier".to_string(),
            customer_name: None,
            notes: None,
            journal_entry_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: Some(Utc::now()),
        }
    }

    fn item() -> SaleItem {
        SaleItem {
            id: "item-1".to_string(),
            sale_id: "sale-1".to_string(),
            product_id: "p1".to_string(),
            sku_snapshot: "RAM-8G".to_string(),
            name_snapshot: "RAM 8GB".to_string(),
            unit_price_cents: 50_000,
            unit_cost_cents: 30_000,
            quantity: 2,
            line_total_cents: 100_000,
            tax_cents: 9_000,
            discount_cents: 10_000,
            created_at: Utc::now(),
        }
    }

    fn payment(method: PaymentMethod, cents: i64) -> Payment {
        Payment {
            id: uuid::Uuid::new_v4().to_string(),
            sale_id: "sale-1".to_string(),
            method,
            amount_cents: cents,
            tendered_cents: None,
            change_cents: None,
            reference: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_sale_entry_split_tender() {
        let payments = vec![
            payment(PaymentMethod::Cash, 40_000),
            payment(PaymentMethod::Card, 29_000),
            payment(PaymentMethod::Cash, 30_000),
        ];
        let draft = sale_entry(&sale(), &[item()], &payments).unwrap();

        assert_eq!(draft.validate_against(&chart()).unwrap().cents(), 159_000);
        assert_eq!(amount_on(&draft, "1000", EntrySide::Debit), 70_000);
        assert_eq!(amount_on(&draft, "1010", EntrySide::Debit), 29_000);
        assert_eq!(amount_on(&draft, "4000", EntrySide::Credit), 90_000);
        assert_eq!(amount_on(&draft, "2200", EntrySide::Credit), 9_000);
        assert_eq!(amount_on(&draft, "5000", EntrySide::Debit), 60_000);
        assert_eq!(amount_on(&draft, "1200", EntrySide::Credit), 60_000);
    }

    #[test]
    fn test_sale_entry_rejects_wrong_payment_total() {
        let short = vec![payment(PaymentMethod::Cash, 98_999)];
        assert!(matches!(
            sale_entry(&sale(), &[item()], &short),
            Err(CoreError::Underpaid { due: 99_000, paid: 98_999 })
        ));

        let over = vec![payment(PaymentMethod::Cash, 99_001)];
        assert!(sale_entry(&sale(), &[item()], &over).is_err());
    }

    #[test]
    fn test_sale_void_entry_swaps_sides() {
        let payments = vec![payment(PaymentMethod::Credit, 99_000)];
        let draft = sale_entry(&sale(), &[item()], &payments).unwrap();
        let total = draft.validate().unwrap();
        let entry = JournalEntry {
            id: "je-1".to_string(),
            tenant_id: DEFAULT_TENANT_ID.to_string(),
            entry_number: "JE-20261017-000001".to_string(),
            description: draft.description.clone(),
            reference_type: ReferenceType::Sale,
            reference_id: Some("sale-1".to_string()),
            status: JournalStatus::Posted,
            reverses_entry_id: None,
            total_cents: total.cents(),
            posted_at: Utc::now(),
            created_at: Utc::now(),
        };
        let lines = draft.to_lines(&entry.id);

        let void = sale_void_entry(&sale(), &entry, &lines, "customer changed mind").unwrap();
        assert_eq!(void.reference_type, ReferenceType::SaleVoid);
        assert_eq!(void.reverses_entry_id(), Some("je-1"));
        assert_eq!(amount_on(&void, "1100", EntrySide::Credit), 99_000);
        assert_eq!(amount_on(&void, "1200", EntrySide::Debit), 60_000);
        assert_eq!(void.validate().unwrap(), total);
    }

    #[test]
    fn test_service_deposit_entry() {
        let t = ticket(ServiceStatus::Received);
        let draft = service_deposit_entry(&t, Money::from_cents(50_000), PaymentMethod::BankTransfer).unwrap();
        assert_eq!(amount_on(&draft, "1010", EntrySide::Debit), 50_000);
        assert_eq!(amount_on(&draft, "2100", EntrySide::Credit), 50_000);

        assert!(service_deposit_entry(&t, Money::zero(), PaymentMethod::Cash).is_err());
    }

    #[test]
    fn test_service_completion_collects_balance() {
        let t = ticket(ServiceStatus::InProgress);
        let parts = vec![part(1, 80_000, 50_000)];
        let draft = service_completion_entry(&t, &parts, PaymentMethod::Cash).unwrap();

        draft.validate_against(&chart()).unwrap();
        assert_eq!(amount_on(&draft, "2100", EntrySide::Debit), 50_000);
        assert_eq!(amount_on(&draft, "1000", EntrySide::Debit), 180_000);
        assert_eq!(amount_on(&draft, "4100", EntrySide::Credit), 150_000);
        assert_eq!(amount_on(&draft, "4000", EntrySide::Credit), 80_000);
        assert_eq!(amount_on(&draft, "5000", EntrySide::Debit), 50_000);
    }

    #[test]
    fn test_service_completion_refunds_excess_deposit() {
        let mut t = ticket(ServiceStatus::InProgress);
        t.deposit_cents = 200_000;
        t.paid_cents = 200_000;

        let draft = service_completion_entry(&t, &[], PaymentMethod::Cash).unwrap();
        draft.validate().unwrap();
        assert_eq!(amount_on(&draft, "1000", EntrySide::Credit), 50_000);

        assert!(matches!(
            service_completion_entry(&t, &[], PaymentMethod::Credit),
            Err(CoreError::PayoutMethodNotAllowed(_))
        ));
    }

    fn order() -> PurchaseOrder {
        PurchaseOrder {
            id: "po-1".to_string(),
            tenant_id: DEFAULT_TENANT_ID.to_string(),
            po_number: "PO-000001".to_string(),
            supplier_name: "Parts Depot".to_string(),
            status: PurchaseStatus::Draft,
            total_cents: 500_000,
            on_credit: true,
            receipt_entry_id: None,
            payment_entry_id: None,
            notes: None,
            created_at: Utc::now(),
            received_at: None,
            paid_at: None,
        }
    }

    #[test]
    fn test_purchase_on_credit_then_paid() {
        let receipt = purchase_receipt_entry(&order(), None).unwrap();
        assert_eq!(amount_on(&receipt, "1200", EntrySide::Debit), 500_000);
        assert_eq!(amount_on(&receipt, "2000", EntrySide::Credit), 500_000);

        let payment = supplier_payment_entry(&order(), PaymentMethod::BankTransfer).unwrap();
        assert_eq!(amount_on(&payment, "2000", EntrySide::Debit), 500_000);
        assert_eq!(amount_on(&payment, "1010", EntrySide::Credit), 500_000);

        let cash = purchase_receipt_entry(&order(), Some(PaymentMethod::Cash)).unwrap();
        assert_eq!(amount_on(&cash, "1000", EntrySide::Credit), 500_000);
    }

    #[test]
    fn test_payroll_entry() {
        let record = PayrollRecord {
            id: "pay-1".to_string(),
            tenant_id: DEFAULT_TENANT_ID.to_string(),
            employee_name: "Budi".to_string(),
            period_start: NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2026, 9, 30).unwrap(),
            gross_cents: 600_000,
            deductions_cents: 30_000,
            net_cents: 570_000,
            status: PayrollStatus::Pending,
            journal_entry_id: None,
            created_at: Utc::now(),
            paid_at: None,
        };
        let draft = payroll_entry(&record, PaymentMethod::BankTransfer).unwrap();

        assert_eq!(draft.validate().unwrap().cents(), 600_000);
        assert_eq!(amount_on(&draft, "2300", EntrySide::Credit), 30_000);
        assert_eq!(amount_on(&draft, "1010", EntrySide::Credit), 570_000);
    }

    #[test]
    fn test_expense_entry_requires_expense_account() {
        let chart = chart();
        let rent = chart.get("6100").unwrap();
        let draft = expense_entry(rent, Money::from_cents(250_000), PaymentMethod::Cash, "October rent").unwrap();
        assert_eq!(amount_on(&draft, "6100", EntrySide::Debit), 250_000);

        let cash = chart.get("1000").unwrap();
        assert!(matches!(
            expense_entry(cash, Money::from_cents(1), PaymentMethod::Cash, "oops"),
            Err(CoreError::NotAnExpenseAccount(_))
        ));
    }

    #[test]
    fn test_stock_adjustment_entry_follows_sign() {
        let mut product = Product {
            id: "p1".to_string(),
            tenant_id: DEFAULT_TENANT_ID.to_string(),
            sku: "SSD-512".to_string(),
            barcode: None,
            name: "SSD 512GB".to_string(),
            description: None,
            price_cents: 90_000,
            cost_cents: 60_000,
            tax_rate_bps: 0,
            track_inventory: true,
            allow_negative_stock: false,
            current_stock: 5,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let shrink = stock_adjustment_entry(&product, -2, "Damaged");
        assert_eq!(amount_on(&shrink, "1200", EntrySide::Credit), 120_000);
        assert_eq!(amount_on(&shrink, "5100", EntrySide::Debit), 120_000);

        let found = stock_adjustment_entry(&product, 1, "Recount");
        assert_eq!(amount_on(&found, "1200", EntrySide::Debit), 60_000);

        product.track_inventory = false;
        assert!(stock_adjustment_entry(&product, 3, "Service item").is_empty());
    }
}
