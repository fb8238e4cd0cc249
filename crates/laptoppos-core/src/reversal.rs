//! # Service Cancellation Accounting
//!
//! Plans the ledger and stock effects of cancelling a repair or honouring a
//! warranty claim. The plan is pure; `ServiceRepository::cancel` applies it
//! in one database transaction.
//!
//! ## Scenarios
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ticket status          request            scenario                     │
//! │  ─────────────          ───────            ────────                     │
//! │  Received..WaitingParts  any           ──► BeforeCompletion             │
//! │  Completed / Delivered   no claim      ──► AfterCompletion              │
//! │  Completed / Delivered   warranty      ──► WarrantyRefund               │
//! │  Cancelled / Refunded    any           ──► InvalidServiceTransition     │
//! └─────────────────────────────────────────────────────────────────────────┘
//!
//! BeforeCompletion   Dr 2100 deposit │ Cr 4200 fee, Cr settlement refund
//!                    every part back to stock
//!
//! AfterCompletion    Dr 4900 total   │ Cr 4200 fee, Cr settlement refund
//!                    parts back:  Dr 1200 │ Cr 5000   (at cost)
//!                    parts kept:  Dr 5100 │ Cr 5000   (write-off)
//!
//! WarrantyRefund     Dr 6200 claim   │ Cr settlement refund (≤ paid)
//!                                    │ Cr 1100 unpaid balance
//!                    revenue stands, no stock movement
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::account::SystemAccount;
use crate::error::{CoreError, CoreResult};
use crate::journal::{JournalEntryDraft, ReferenceType};
use crate::money::Money;
use crate::service::{ServicePart, ServiceStatus, ServiceTicket};
use crate::types::PaymentMethod;
use crate::validation::{validate_description, validate_posting_amount};

// =============================================================================
// Request & Scenario
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CancellationRequest {
    pub reason: String,
    /// How money goes back to the customer.
    pub refund_method: PaymentMethod,
    /// Kept by the shop; ignored for warranty refunds.
    pub cancellation_fee_cents: i64,
    pub warranty_claim: bool,
    /// Warranty refunds only; defaults to the amount paid.
    pub refund_cents: Option<i64>,
    /// After completion: whether fitted parts come back into stock.
    pub return_parts_to_stock: bool,
}

impl CancellationRequest {
    pub fn cancel(reason: impl Into<String>, refund_method: PaymentMethod) -> Self {
        CancellationRequest {
            reason: reason.into(),
            refund_method,
            cancellation_fee_cents: 0,
            warranty_claim: false,
            refund_cents: None,
            return_parts_to_stock: true,
        }
    }

    pub fn warranty(reason: impl Into<String>, refund_method: PaymentMethod, refund_cents: Option<i64>) -> Self {
        CancellationRequest {
            warranty_claim: true,
            refund_cents,
            ..Self::cancel(reason, refund_method)
        }
    }

    pub fn with_fee(mut self, fee_cents: i64) -> Self {
        self.cancellation_fee_cents = fee_cents;
        self
    }

    pub fn keep_parts(mut self) -> Self {
        self.return_parts_to_stock = false;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum CancellationScenario {
    BeforeCompletion,
    AfterCompletion,
    WarrantyRefund,
}

impl CancellationScenario {
    pub fn determine(
        ticket: &ServiceTicket,
        request: &CancellationRequest,
        now: DateTime<Utc>,
    ) -> CoreResult<Self> {
        if ticket.status.is_terminal() {
            let to = if request.warranty_claim {
                ServiceStatus::WarrantyRefunded
            } else {
                ServiceStatus::Cancelled
            };
            return Err(CoreError::InvalidServiceTransition {
                ticket: ticket.ticket_number.clone(),
                from: ticket.status.to_string(),
                to: to.to_string(),
            });
        }

        if ticket.status.is_before_completion() {
            if request.warranty_claim {
                return Err(CoreError::InvalidServiceTransition {
                    ticket: ticket.ticket_number.clone(),
                    from: ticket.status.to_string(),
                    to: ServiceStatus::WarrantyRefunded.to_string(),
                });
            }
            return Ok(CancellationScenario::BeforeCompletion);
        }

        if !request.warranty_claim {
            return Ok(CancellationScenario::AfterCompletion);
        }

        match ticket.warranty_expires_at() {
            None => Err(CoreError::NoWarranty(ticket.ticket_number.clone())),
            Some(expires) if now > expires => Err(CoreError::WarrantyExpired {
                ticket: ticket.ticket_number.clone(),
                expired_at: expires.to_rfc3339(),
            }),
            Some(_) => Ok(CancellationScenario::WarrantyRefund),
        }
    }

    pub const fn target_status(&self) -> ServiceStatus {
        match self {
            CancellationScenario::WarrantyRefund => ServiceStatus::WarrantyRefunded,
            _ => ServiceStatus::Cancelled,
        }
    }
}

// =============================================================================
// Plan
// =============================================================================

/// Quantity of a product going back on the shelf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockReturn {
    pub product_id: String,
    pub quantity: i64,
    pub unit_cost_cents: i64,
}

#[derive(Debug, Clone)]
pub struct CancellationPlan {
    pub scenario: CancellationScenario,
    pub target_status: ServiceStatus,
    /// Balanced drafts, already validated.
    pub entries: Vec<JournalEntryDraft>,
    pub refund_cents: i64,
    pub fee_cents: i64,
    pub stock_returns: Vec<StockReturn>,
}

/// Works out everything a cancellation or warranty refund changes.
pub fn plan_cancellation(
    ticket: &ServiceTicket,
    parts: &[ServicePart],
    request: &CancellationRequest,
    now: DateTime<Utc>,
) -> CoreResult<CancellationPlan> {
    validate_description(&request.reason)?;
    let scenario = CancellationScenario::determine(ticket, request, now)?;

    let plan = match scenario {
        CancellationScenario::BeforeCompletion => before_completion(ticket, parts, request)?,
        CancellationScenario::AfterCompletion => after_completion(ticket, parts, request)?,
        CancellationScenario::WarrantyRefund => warranty_refund(ticket, parts, request)?,
    };

    for draft in &plan.entries {
        draft.validate()?;
    }

    Ok(plan)
}

fn fee_of(request: &CancellationRequest) -> CoreResult<Money> {
    if request.cancellation_fee_cents < 0 {
        return Err(CoreError::InvalidPaymentAmount {
            reason: "cancellation fee cannot be negative".to_string(),
        });
    }
    Ok(Money::from_cents(request.cancellation_fee_cents))
}

/// Settlement account for a refund; only resolved when money actually leaves.
fn refund_account(request: &CancellationRequest, refund: Money) -> CoreResult<&'static str> {
    if refund.is_zero() {
        return Ok(request.refund_method.settlement_account().code());
    }
    Ok(request.refund_method.payout_account()?.code())
}

fn all_parts_back(parts: &[ServicePart]) -> Vec<StockReturn> {
    parts
        .iter()
        .map(|p| StockReturn {
            product_id: p.product_id.clone(),
            quantity: p.quantity,
            unit_cost_cents: p.unit_cost_cents,
        })
        .collect()
}

fn before_completion(
    ticket: &ServiceTicket,
    parts: &[ServicePart],
    request: &CancellationRequest,
) -> CoreResult<CancellationPlan> {
    let deposit = ticket.deposit();
    let fee = fee_of(request)?;

    if fee > deposit {
        return Err(CoreError::CancellationFeeTooLarge {
            fee: fee.cents(),
            paid: deposit.cents(),
        });
    }

    let refund = deposit - fee;
    let mut entries = Vec::new();

    if deposit.is_positive() {
        let draft = JournalEntryDraft::new(format!(
            "Service {} cancelled: {}",
            ticket.ticket_number,
            request.reason.trim()
        ))
        .reference(ReferenceType::ServiceCancellation, ticket.id.clone())
        .debit(SystemAccount::CustomerDeposits.code(), deposit, "Deposit released")
        .credit(SystemAccount::CancellationFeeIncome.code(), fee, "Cancellation fee")
        .credit(refund_account(request, refund)?, refund, "Deposit refunded");
        entries.push(draft);
    }

    Ok(CancellationPlan {
        scenario: CancellationScenario::BeforeCompletion,
        target_status: ServiceStatus::Cancelled,
        entries,
        refund_cents: refund.cents(),
        fee_cents: fee.cents(),
        stock_returns: all_parts_back(parts),
    })
}

fn after_completion(
    ticket: &ServiceTicket,
    parts: &[ServicePart],
    request: &CancellationRequest,
) -> CoreResult<CancellationPlan> {
    let total = ticket.total(parts);
    let paid = ticket.paid();
    let fee = fee_of(request)?;

    if total.is_positive() && ticket.completion_entry_id.is_none() {
        return Err(CoreError::MissingCompletionEntry(ticket.ticket_number.clone()));
    }

    if fee > paid {
        return Err(CoreError::CancellationFeeTooLarge {
            fee: fee.cents(),
            paid: paid.cents(),
        });
    }

    let refund = paid - fee;
    // Revenue the fee does not cover is handed back; anything still owed
    // on credit is written off receivables.
    let unpaid = total - paid;

    let mut returns = JournalEntryDraft::new(format!(
        "Service {} cancelled after completion: {}",
        ticket.ticket_number,
        request.reason.trim()
    ))
    .reference(ReferenceType::ServiceCancellation, ticket.id.clone())
    .debit(SystemAccount::SalesReturns.code(), total, "Revenue returned")
    .credit(SystemAccount::CancellationFeeIncome.code(), fee, "Cancellation fee")
    .credit(refund_account(request, refund)?, refund, "Customer refund")
    .credit(SystemAccount::AccountsReceivable.code(), unpaid, "Unpaid balance cancelled");

    let parts_cost = ServiceTicket::parts_cost(parts);
    let stock_returns = if request.return_parts_to_stock {
        returns = returns
            .debit(SystemAccount::Inventory.code(), parts_cost, "Parts returned to stock")
            .credit(SystemAccount::CostOfGoodsSold.code(), parts_cost, "Parts cost reversed");
        all_parts_back(parts)
    } else {
        returns = returns
            .debit(SystemAccount::PartsWriteOff.code(), parts_cost, "Parts written off")
            .credit(SystemAccount::CostOfGoodsSold.code(), parts_cost, "Parts cost reclassified");
        Vec::new()
    };

    let entries = if returns.is_empty() { Vec::new() } else { vec![returns] };

    Ok(CancellationPlan {
        scenario: CancellationScenario::AfterCompletion,
        target_status: ServiceStatus::Cancelled,
        entries,
        refund_cents: refund.cents(),
        fee_cents: fee.cents(),
        stock_returns,
    })
}

fn warranty_refund(
    ticket: &ServiceTicket,
    parts: &[ServicePart],
    request: &CancellationRequest,
) -> CoreResult<CancellationPlan> {
    let total = ticket.total(parts);
    let paid = ticket.paid();
    let refund = request
        .refund_cents
        .map(Money::from_cents)
        .unwrap_or(paid);

    if refund.is_negative() {
        return Err(CoreError::InvalidPaymentAmount {
            reason: "refund cannot be negative".to_string(),
        });
    }
    if refund > total {
        return Err(CoreError::RefundTooLarge {
            refund: refund.cents(),
            total: total.cents(),
        });
    }
    if refund > paid {
        return Err(CoreError::RefundExceedsPaid {
            refund: refund.cents(),
            paid: paid.cents(),
        });
    }

    // The claim closes the ticket, so a balance still on credit is forgiven.
    let unpaid = (total - paid).max(Money::zero());
    let claim = refund + unpaid;
    validate_posting_amount("warranty claim", claim.cents())?;

    let draft = JournalEntryDraft::new(format!(
        "Warranty refund for service {}: {}",
        ticket.ticket_number,
        request.reason.trim()
    ))
    .reference(ReferenceType::WarrantyRefund, ticket.id.clone())
    .debit(SystemAccount::WarrantyExpense.code(), claim, "Warranty claim")
    .credit(refund_account(request, refund)?, refund, "Customer refund")
    .credit(SystemAccount::AccountsReceivable.code(), unpaid, "Unpaid balance forgiven");

    Ok(CancellationPlan {
        scenario: CancellationScenario::WarrantyRefund,
        target_status: ServiceStatus::WarrantyRefunded,
        entries: vec![draft],
        refund_cents: refund.cents(),
        fee_cents: 0,
        stock_returns: Vec::new(),
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::ChartOfAccounts;
    use crate::journal::EntrySide;
    use crate::service::tests::{part, ticket};
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 10, 0, 0).unwrap()
    }

    fn completed() -> ServiceTicket {
        let mut t = ticket(ServiceStatus::Completed);
        // labour 150_000 + one part at 80_000
        t.paid_cents = 230_000;
        t.completed_at = Some(now() - Duration::days(5));
        t.completion_entry_id = Some("je-completion".to_string());
        t
    }

    fn amount_on(draft: &JournalEntryDraft, code: &str, side: EntrySide) -> i64 {
        draft
            .lines()
            .iter()
            .filter(|l| l.account_code == code && l.side == side)
            .map(|l| l.amount.cents())
            .sum()
    }

    #[test]
    fn test_determine_scenarios() {
        let cancel = CancellationRequest::cancel("customer declined quote", PaymentMethod::Cash);
        let claim = CancellationRequest::warranty("fault returned", PaymentMethod::Cash, None);

        assert_eq!(
            CancellationScenario::determine(&ticket(ServiceStatus::Diagnosing), &cancel, now()).unwrap(),
            CancellationScenario::BeforeCompletion
        );
        assert_eq!(
            CancellationScenario::determine(&completed(), &cancel, now()).unwrap(),
            CancellationScenario::AfterCompletion
        );
        assert_eq!(
            CancellationScenario::determine(&completed(), &claim, now()).unwrap(),
            CancellationScenario::WarrantyRefund
        );
        assert!(matches!(
            CancellationScenario::determine(&ticket(ServiceStatus::Cancelled), &cancel, now()),
            Err(CoreError::InvalidServiceTransition { .. })
        ));
        assert!(matches!(
            CancellationScenario::determine(&ticket(ServiceStatus::InProgress), &claim, now()),
            Err(CoreError::InvalidServiceTransition { .. })
        ));
    }

    #[test]
    fn test_warranty_expired_and_missing() {
        let claim = CancellationRequest::warranty("fault returned", PaymentMethod::Cash, None);

        let mut expired = completed();
        expired.completed_at = Some(now() - Duration::days(31));
        assert!(matches!(
            CancellationScenario::determine(&expired, &claim, now()),
            Err(CoreError::WarrantyExpired { .. })
        ));

        let mut none = completed();
        none.warranty_days = 0;
        assert!(matches!(
            CancellationScenario::determine(&none, &claim, now()),
            Err(CoreError::NoWarranty(_))
        ));
    }

    #[test]
    fn test_before_completion_with_fee() {
        let t = ticket(ServiceStatus::WaitingParts);
        let parts = vec![part(2, 40_000, 25_000)];
        let request = CancellationRequest::cancel("too expensive", PaymentMethod::Cash).with_fee(10_000);

        let plan = plan_cancellation(&t, &parts, &request, now()).unwrap();
        assert_eq!(plan.target_status, ServiceStatus::Cancelled);
        assert_eq!(plan.refund_cents, 40_000);
        assert_eq!(plan.fee_cents, 10_000);
        assert_eq!(plan.stock_returns.len(), 1);
        assert_eq!(plan.stock_returns[0].quantity, 2);

        let draft = &plan.entries[0];
        draft
            .validate_against(&ChartOfAccounts::standard(crate::DEFAULT_TENANT_ID, now()))
            .unwrap();
        assert_eq!(amount_on(draft, "2100", EntrySide::Debit), 50_000);
        assert_eq!(amount_on(draft, "4200", EntrySide::Credit), 10_000);
        assert_eq!(amount_on(draft, "1000", EntrySide::Credit), 40_000);
    }

    #[test]
    fn test_before_completion_fee_too_large() {
        let t = ticket(ServiceStatus::Received);
        let request = CancellationRequest::cancel("no show", PaymentMethod::Cash).with_fee(50_001);
        assert!(matches!(
            plan_cancellation(&t, &[], &request, now()),
            Err(CoreError::CancellationFeeTooLarge { fee: 50_001, paid: 50_000 })
        ));
    }

    #[test]
    fn test_before_completion_without_deposit_posts_nothing() {
        let mut t = ticket(ServiceStatus::Received);
        t.deposit_cents = 0;
        t.paid_cents = 0;
        let request = CancellationRequest::cancel("changed mind", PaymentMethod::Credit);

        let plan = plan_cancellation(&t, &[], &request, now()).unwrap();
        assert!(plan.entries.is_empty());
        assert_eq!(plan.refund_cents, 0);
    }

    #[test]
    fn test_after_completion_returns_parts() {
        let parts = vec![part(1, 80_000, 50_000)];
        let request = CancellationRequest::cancel("device replaced", PaymentMethod::BankTransfer).with_fee(30_000);

        let plan = plan_cancellation(&completed(), &parts, &request, now()).unwrap();
        assert_eq!(plan.scenario, CancellationScenario::AfterCompletion);
        assert_eq!(plan.refund_cents, 200_000);
        assert_eq!(plan.stock_returns.len(), 1);

        let draft = &plan.entries[0];
        assert_eq!(amount_on(draft, "4900", EntrySide::Debit), 230_000);
        assert_eq!(amount_on(draft, "4200", EntrySide::Credit), 30_000);
        assert_eq!(amount_on(draft, "1010", EntrySide::Credit), 200_000);
        assert_eq!(amount_on(draft, "1200", EntrySide::Debit), 50_000);
        assert_eq!(amount_on(draft, "5000", EntrySide::Credit), 50_000);
    }

    #[test]
    fn test_after_completion_writes_off_kept_parts() {
        let parts = vec![part(1, 80_000, 50_000)];
        let request = CancellationRequest::cancel("board damaged", PaymentMethod::Cash).keep_parts();

        let plan = plan_cancellation(&completed(), &parts, &request, now()).unwrap();
        assert!(plan.stock_returns.is_empty());

        let draft = &plan.entries[0];
        assert_eq!(amount_on(draft, "5100", EntrySide::Debit), 50_000);
        assert_eq!(amount_on(draft, "5000", EntrySide::Credit), 50_000);
        assert_eq!(amount_on(draft, "1200", EntrySide::Debit), 0);
    }

    #[test]
    fn test_after_completion_requires_completion_entry() {
        let mut t = completed();
        t.completion_entry_id = None;
        let request = CancellationRequest::cancel("device replaced", PaymentMethod::Cash);
        assert!(matches!(
            plan_cancellation(&t, &[], &request, now()),
            Err(CoreError::MissingCompletionEntry(_))
        ));
    }

    /// Completed on credit: only the 50_000 deposit was received.
    fn completed_on_credit() -> ServiceTicket {
        let mut t = completed();
        t.paid_cents = t.deposit_cents;
        t
    }

    #[test]
    fn test_after_completion_on_credit_clears_receivable() {
        let parts = vec![part(1, 80_000, 50_000)];
        let request = CancellationRequest::cancel("never collected", PaymentMethod::Cash).with_fee(10_000);

        let plan = plan_cancellation(&completed_on_credit(), &parts, &request, now()).unwrap();
        assert_eq!(plan.refund_cents, 40_000);

        let draft = &plan.entries[0];
        assert_eq!(amount_on(draft, "4900", EntrySide::Debit), 230_000);
        assert_eq!(amount_on(draft, "4200", EntrySide::Credit), 10_000);
        assert_eq!(amount_on(draft, "1000", EntrySide::Credit), 40_000);
        assert_eq!(amount_on(draft, "1100", EntrySide::Credit), 180_000);
    }

    #[test]
    fn test_warranty_refund_capped_at_paid() {
        let parts = vec![part(1, 80_000, 50_000)];
        let t = completed_on_credit();

        let claim = CancellationRequest::warranty("fan failed", PaymentMethod::Cash, None);
        let plan = plan_cancellation(&t, &parts, &claim, now()).unwrap();
        assert_eq!(plan.refund_cents, 50_000);
        let draft = &plan.entries[0];
        assert_eq!(amount_on(draft, "6200", EntrySide::Debit), 230_000);
        assert_eq!(amount_on(draft, "1000", EntrySide::Credit), 50_000);
        assert_eq!(amount_on(draft, "1100", EntrySide::Credit), 180_000);

        let over = CancellationRequest::warranty("fan failed", PaymentMethod::Cash, Some(50_001));
        assert!(matches!(
            plan_cancellation(&t, &parts, &over, now()),
            Err(CoreError::RefundExceedsPaid { refund: 50_001, paid: 50_000 })
        ));

        let negative = CancellationRequest::warranty("fan failed", PaymentMethod::Cash, Some(-1));
        assert!(matches!(
            plan_cancellation(&t, &parts, &negative, now()),
            Err(CoreError::InvalidPaymentAmount { .. })
        ));
    }

    #[test]
    fn test_warranty_refund() {
        let parts = vec![part(1, 80_000, 50_000)];
        let claim = CancellationRequest::warranty("screen failed again", PaymentMethod::Cash, Some(80_000));

        let plan = plan_cancellation(&completed(), &parts, &claim, now()).unwrap();
        assert_eq!(plan.target_status, ServiceStatus::WarrantyRefunded);
        assert!(plan.stock_returns.is_empty());
        assert_eq!(amount_on(&plan.entries[0], "6200", EntrySide::Debit), 80_000);
        assert_eq!(amount_on(&plan.entries[0], "1000", EntrySide::Credit), 80_000);

        let too_much = CancellationRequest::warranty("full refund", PaymentMethod::Cash, Some(230_001));
        assert!(matches!(
            plan_cancellation(&completed(), &parts, &too_much, now()),
            Err(CoreError::RefundTooLarge { .. })
        ));

        let on_credit = CancellationRequest::warranty("refund", PaymentMethod::Credit, None);
        assert!(matches!(
            plan_cancellation(&completed(), &parts, &on_credit, now()),
            Err(CoreError::PayoutMethodNotAllowed(_))
        ));
    }
}
