//! # Service Tickets
//!
//! Repair jobs taken in at the service desk.
//!
//! ## Status Machine
//! ```text
//!   Received ──► Diagnosing ──► InProgress ◄──► WaitingParts
//!      │             │              │                │
//!      │             │              ▼                │
//!      │             │          Completed ──► Delivered
//!      │             │              │  │           │  │
//!      ▼             ▼              ▼  │           ▼  │
//!   ┌──────────────────────────────────┴───────────────┴──┐
//!   │ Cancelled           (any non-terminal state)        │
//!   │ WarrantyRefunded    (Completed / Delivered only)    │
//!   └─────────────────────────────────────────────────────┘
//! ```
//!
//! Money flows: deposits land in Customer Deposits (2100); completion
//! recognises labour and parts revenue; cancellation is planned by
//! [`crate::reversal`].

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::validation::{
    validate_description, validate_party_name, validate_price_cents, validate_warranty_days,
};

// =============================================================================
// Status
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Received,
    Diagnosing,
    InProgress,
    WaitingParts,
    Completed,
    Delivered,
    Cancelled,
    WarrantyRefunded,
}

impl ServiceStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Received => "received",
            ServiceStatus::Diagnosing => "diagnosing",
            ServiceStatus::InProgress => "in_progress",
            ServiceStatus::WaitingParts => "waiting_parts",
            ServiceStatus::Completed => "completed",
            ServiceStatus::Delivered => "delivered",
            ServiceStatus::Cancelled => "cancelled",
            ServiceStatus::WarrantyRefunded => "warranty_refunded",
        }
    }

    /// Work has not been handed over yet; parts may still be added.
    pub const fn is_before_completion(&self) -> bool {
        matches!(
            self,
            ServiceStatus::Received
                | ServiceStatus::Diagnosing
                | ServiceStatus::InProgress
                | ServiceStatus::WaitingParts
        )
    }

    pub const fn is_completed(&self) -> bool {
        matches!(self, ServiceStatus::Completed | ServiceStatus::Delivered)
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, ServiceStatus::Cancelled | ServiceStatus::WarrantyRefunded)
    }

    pub fn can_transition_to(&self, next: ServiceStatus) -> bool {
        use ServiceStatus::*;

        match (self, next) {
            (Received, Diagnosing | InProgress | Cancelled) => true,
            (Diagnosing, InProgress | WaitingParts | Cancelled) => true,
            (InProgress, WaitingParts | Completed | Cancelled) => true,
            (WaitingParts, InProgress | Cancelled) => true,
            (Completed, Delivered | Cancelled | WarrantyRefunded) => true,
            (Delivered, Cancelled | WarrantyRefunded) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Ticket & Parts
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ServiceTicket {
    pub id: String,
    pub tenant_id: String,
    /// `SRV-NNNNNN`
    pub ticket_number: String,
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub device_description: String,
    pub serial_number: Option<String>,
    pub problem_description: String,
    pub status: ServiceStatus,
    pub labor_cents: i64,
    /// Deposits taken before completion, held as a liability.
    pub deposit_cents: i64,
    /// Net money received for this ticket (deposits, balance, minus refunds).
    pub paid_cents: i64,
    /// 0 means no warranty.
    pub warranty_days: i64,
    pub completion_entry_id: Option<String>,
    pub cancellation_reason: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// A part fitted to a device. Stock is reserved when the part is added.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ServicePart {
    pub id: String,
    pub ticket_id: String,
    pub product_id: String,
    pub sku_snapshot: String,
    pub name_snapshot: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub unit_cost_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl ServicePart {
    pub fn line_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents).multiply_quantity(self.quantity)
    }

    pub fn line_cost(&self) -> Money {
        Money::from_cents(self.unit_cost_cents).multiply_quantity(self.quantity)
    }
}

impl ServiceTicket {
    #[inline]
    pub fn labor(&self) -> Money {
        Money::from_cents(self.labor_cents)
    }

    #[inline]
    pub fn deposit(&self) -> Money {
        Money::from_cents(self.deposit_cents)
    }

    #[inline]
    pub fn paid(&self) -> Money {
        Money::from_cents(self.paid_cents)
    }

    pub fn parts_price(parts: &[ServicePart]) -> Money {
        parts.iter().map(ServicePart::line_price).sum()
    }

    pub fn parts_cost(parts: &[ServicePart]) -> Money {
        parts.iter().map(ServicePart::line_cost).sum()
    }

    /// Labour plus parts at selling price.
    pub fn total(&self, parts: &[ServicePart]) -> Money {
        self.labor() + Self::parts_price(parts)
    }

    /// What the customer still owes at completion. Negative when the
    /// deposit exceeds the final bill.
    pub fn balance_due(&self, parts: &[ServicePart]) -> Money {
        self.total(parts) - self.deposit()
    }

    pub fn warranty_expires_at(&self) -> Option<DateTime<Utc>> {
        if self.warranty_days <= 0 {
            return None;
        }
        self.completed_at
            .map(|at| at + Duration::days(self.warranty_days))
    }

    pub fn is_under_warranty(&self, now: DateTime<Utc>) -> bool {
        match self.warranty_expires_at() {
            Some(expires) => now <= expires,
            None => false,
        }
    }

    /// Checks a status change against the status machine.
    pub fn ensure_transition(&self, next: ServiceStatus) -> CoreResult<()> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(CoreError::InvalidServiceTransition {
                ticket: self.ticket_number.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            })
        }
    }
}

/// Intake form for a new repair.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewServiceTicket {
    pub customer_name: String,
    pub customer_phone: Option<String>,
    pub device_description: String,
    pub serial_number: Option<String>,
    pub problem_description: String,
    /// Quoted labour; can be revised until completion.
    pub labor_cents: i64,
    pub warranty_days: i64,
}

impl NewServiceTicket {
    pub fn validate(&self) -> CoreResult<()> {
        validate_party_name("customer name", &self.customer_name)?;
        validate_description(&self.device_description)?;
        validate_description(&self.problem_description)?;
        validate_price_cents(self.labor_cents)?;
        validate_warranty_days(self.warranty_days)?;
        Ok(())
    }
}

/// `SRV-000042`
pub fn format_ticket_number(sequence: i64) -> String {
    format!("SRV-{:06}", sequence)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;

    pub(crate) fn ticket(status: ServiceStatus) -> ServiceTicket {
        let now = Utc.with_ymd_and_hms(2026, 10, 1, 9, 0, 0).unwrap();
        ServiceTicket {
            id: "ticket-1".to_string(),
            tenant_id: crate::DEFAULT_TENANT_ID.to_string(),
            ticket_number: format_ticket_number(1),
            customer_name: "Rina".to_string(),
            customer_phone: None,
            device_description: "ThinkPad T480".to_string(),
            serial_number: None,
            problem_description: "No power".to_string(),
            status,
            labor_cents: 150_000,
            deposit_cents: 50_000,
            paid_cents: 50_000,
            warranty_days: 30,
            completion_entry_id: None,
            cancellation_reason: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub(crate) fn part(quantity: i64, price: i64, cost: i64) -> ServicePart {
        ServicePart {
            id: "part-1".to_string(),
            ticket_id: "ticket-1".to_string(),
            product_id: "prod-ssd".to_string(),
            sku_snapshot: "SSD-512".to_string(),
            name_snapshot: "SSD 512GB".to_string(),
            quantity,
            unit_price_cents: price,
            unit_cost_cents: cost,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_transitions() {
        use ServiceStatus::*;

        assert!(Received.can_transition_to(Diagnosing));
        assert!(InProgress.can_transition_to(WaitingParts));
        assert!(WaitingParts.can_transition_to(InProgress));
        assert!(Completed.can_transition_to(WarrantyRefunded));
        assert!(!Received.can_transition_to(Completed));
        assert!(!Received.can_transition_to(WarrantyRefunded));
        assert!(!Cancelled.can_transition_to(InProgress));
        assert!(!WarrantyRefunded.can_transition_to(Cancelled));

        let err = ticket(Cancelled).ensure_transition(Completed).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Service ticket SRV-000001 cannot move from cancelled to completed"
        );
    }

    #[test]
    fn test_totals_and_balance() {
        let t = ticket(ServiceStatus::InProgress);
        let parts = vec![part(2, 40_000, 25_000)];

        assert_eq!(ServiceTicket::parts_price(&parts).cents(), 80_000);
        assert_eq!(ServiceTicket::parts_cost(&parts).cents(), 50_000);
        assert_eq!(t.total(&parts).cents(), 230_000);
        assert_eq!(t.balance_due(&parts).cents(), 180_000);

        let mut big_deposit = t.clone();
        big_deposit.deposit_cents = 200_000;
        assert_eq!(big_deposit.balance_due(&[]).cents(), -50_000);
    }

    #[test]
    fn test_warranty_window() {
        let mut t = ticket(ServiceStatus::Completed);
        assert!(t.warranty_expires_at().is_none());

        let done = Utc.with_ymd_and_hms(2026, 10, 2, 12, 0, 0).unwrap();
        t.completed_at = Some(done);
        assert!(t.is_under_warranty(done + Duration::days(30)));
        assert!(!t.is_under_warranty(done + Duration::days(31)));

        t.warranty_days = 0;
        assert!(!t.is_under_warranty(done));
    }

    #[test]
    fn test_new_ticket_validation() {
        let mut intake = NewServiceTicket {
            customer_name: "Rina".to_string(),
            customer_phone: Some("0812-555-0101".to_string()),
            device_description: "ThinkPad T480".to_string(),
            serial_number: None,
            problem_description: "Keyboard dead".to_string(),
            labor_cents: 150_000,
            warranty_days: 30,
        };
        assert!(intake.validate().is_ok());

        intake.labor_cents = -1;
        assert!(intake.validate().is_err());

        intake.labor_cents = 0;
        intake.problem_description = "   ".to_string();
        assert!(intake.validate().is_err());
    }
}
