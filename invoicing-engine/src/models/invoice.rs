//! Invoice model and status state machine.

use chrono::{DateTime, Utc};
use engine_core::error::AppError;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::LineItemInput;

/// Invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Issued,
    Unpaid,
    Paid,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Issued => "issued",
            InvoiceStatus::Unpaid => "unpaid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(InvoiceStatus::Draft),
            "issued" => Some(InvoiceStatus::Issued),
            "unpaid" => Some(InvoiceStatus::Unpaid),
            "paid" => Some(InvoiceStatus::Paid),
            "cancelled" => Some(InvoiceStatus::Cancelled),
            _ => None,
        }
    }

    /// Items and customer may change only while the invoice is a draft.
    pub fn can_modify(&self) -> bool {
        matches!(self, InvoiceStatus::Draft)
    }

    pub fn can_issue(&self) -> bool {
        matches!(self, InvoiceStatus::Draft)
    }

    pub fn can_settle(&self) -> bool {
        matches!(self, InvoiceStatus::Unpaid)
    }

    pub fn can_cancel(&self) -> bool {
        matches!(self, InvoiceStatus::Draft | InvoiceStatus::Issued)
    }

    /// A ledger fact has been recorded for invoices in these states.
    pub fn has_financial_impact(&self) -> bool {
        matches!(self, InvoiceStatus::Unpaid | InvoiceStatus::Paid)
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Validates a status transition against the invoice state graph.
///
/// Legal edges:
/// - draft -> issued, draft -> cancelled
/// - issued -> unpaid, issued -> paid, issued -> cancelled
/// - unpaid -> paid
///
/// `paid` and `cancelled` are terminal; same-state re-entry is not a
/// transition and is rejected for every state.
pub fn validate_transition(from: InvoiceStatus, to: InvoiceStatus) -> Result<(), AppError> {
    let valid = match from {
        InvoiceStatus::Draft => {
            matches!(to, InvoiceStatus::Issued | InvoiceStatus::Cancelled)
        }
        InvoiceStatus::Issued => matches!(
            to,
            InvoiceStatus::Unpaid | InvoiceStatus::Paid | InvoiceStatus::Cancelled
        ),
        InvoiceStatus::Unpaid => matches!(to, InvoiceStatus::Paid),
        InvoiceStatus::Paid => false,
        InvoiceStatus::Cancelled => false,
    };

    if valid {
        Ok(())
    } else {
        Err(AppError::IllegalStateTransition {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
        })
    }
}

/// How an invoice is paid, fixed at issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    /// Paid in full at issuance.
    Cash,
    /// Deferred; settled later against the open invoice.
    Credit,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentType::Cash => "cash",
            PaymentType::Credit => "credit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cash" => Some(PaymentType::Cash),
            "credit" => Some(PaymentType::Credit),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Invoice document. Items and total are frozen once the invoice leaves draft.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub store_id: Uuid,
    /// None means a cash/walk-in sale with no customer on record.
    pub customer_id: Option<Uuid>,
    pub created_by: Uuid,
    pub status: String,
    pub payment_type: Option<String>,
    pub total_cents: i64,
    pub issued_by: Option<Uuid>,
    pub settled_by: Option<Uuid>,
    pub cancelled_by: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    pub issued_utc: Option<DateTime<Utc>>,
    pub settled_utc: Option<DateTime<Utc>>,
    pub cancelled_utc: Option<DateTime<Utc>>,
}

impl Invoice {
    /// Get parsed status.
    pub fn parsed_status(&self) -> Option<InvoiceStatus> {
        InvoiceStatus::parse(&self.status)
    }

    /// Get parsed payment type, if set.
    pub fn parsed_payment_type(&self) -> Option<PaymentType> {
        self.payment_type.as_deref().and_then(PaymentType::parse)
    }
}

/// Input for creating a draft invoice. `created_by` is the declared creator
/// and must match the trusted operator context.
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub store_id: Uuid,
    pub created_by: Uuid,
    pub customer_id: Option<Uuid>,
    pub items: Vec<LineItemInput>,
}

/// Input for updating a draft invoice.
///
/// `customer_id` is a tri-state patch: `None` leaves the customer untouched,
/// `Some(None)` clears it, `Some(Some(id))` assigns it.
#[derive(Debug, Clone, Default)]
pub struct UpdateDraft {
    pub customer_id: Option<Option<Uuid>>,
    pub items: Option<Vec<LineItemInput>>,
}

/// Filter parameters for listing invoices.
#[derive(Debug, Clone, Default)]
pub struct ListInvoicesFilter {
    pub status: Option<InvoiceStatus>,
    pub customer_id: Option<Uuid>,
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

/// Result of a successful issue operation.
#[derive(Debug, Clone, Serialize)]
pub struct IssueOutcome {
    pub invoice_id: Uuid,
    pub previous_status: InvoiceStatus,
    pub current_status: InvoiceStatus,
    pub payment_type: PaymentType,
    pub total_cents: i64,
    pub issued_at: DateTime<Utc>,
    pub message: String,
}

/// Result of a successful settle operation.
#[derive(Debug, Clone, Serialize)]
pub struct SettleOutcome {
    pub invoice_id: Uuid,
    pub previous_status: InvoiceStatus,
    pub current_status: InvoiceStatus,
    pub settled_at: DateTime<Utc>,
    pub message: String,
}

/// Result of a successful cancel operation.
#[derive(Debug, Clone, Serialize)]
pub struct CancelOutcome {
    pub invoice_id: Uuid,
    pub previous_status: InvoiceStatus,
    pub current_status: InvoiceStatus,
    pub cancelled_at: DateTime<Utc>,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [InvoiceStatus; 5] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Issued,
        InvoiceStatus::Unpaid,
        InvoiceStatus::Paid,
        InvoiceStatus::Cancelled,
    ];

    fn legal(from: InvoiceStatus, to: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (from, to),
            (Draft, Issued)
                | (Draft, Cancelled)
                | (Issued, Unpaid)
                | (Issued, Paid)
                | (Issued, Cancelled)
                | (Unpaid, Paid)
        )
    }

    #[test]
    fn transition_matrix_matches_graph() {
        for from in ALL {
            for to in ALL {
                let result = validate_transition(from, to);
                assert_eq!(
                    result.is_ok(),
                    legal(from, to),
                    "unexpected verdict for {} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        for to in ALL {
            assert!(validate_transition(InvoiceStatus::Paid, to).is_err());
            assert!(validate_transition(InvoiceStatus::Cancelled, to).is_err());
        }
    }

    #[test]
    fn same_state_is_not_a_transition() {
        for status in ALL {
            assert!(validate_transition(status, status).is_err());
        }
    }

    #[test]
    fn predicates_follow_status() {
        assert!(InvoiceStatus::Draft.can_modify());
        assert!(InvoiceStatus::Draft.can_issue());
        assert!(!InvoiceStatus::Unpaid.can_modify());
        assert!(InvoiceStatus::Unpaid.can_settle());
        assert!(!InvoiceStatus::Paid.can_settle());
        assert!(InvoiceStatus::Draft.can_cancel());
        assert!(InvoiceStatus::Issued.can_cancel());
        assert!(!InvoiceStatus::Unpaid.can_cancel());
        assert!(!InvoiceStatus::Paid.can_cancel());
        assert!(!InvoiceStatus::Cancelled.can_cancel());
        assert!(InvoiceStatus::Unpaid.has_financial_impact());
        assert!(InvoiceStatus::Paid.has_financial_impact());
        assert!(!InvoiceStatus::Draft.has_financial_impact());
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in ALL {
            assert_eq!(InvoiceStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(InvoiceStatus::parse("voided"), None);
    }
}
