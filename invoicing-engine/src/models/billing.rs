//! Billing account model and subscription status state machine.
//!
//! The billing account is owned by the subscription collaborator; this engine
//! only reads it as an issuance precondition.

use chrono::{DateTime, Utc};
use engine_core::error::AppError;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Billing account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    Active,
    PastDue,
    Grace,
    Suspended,
    Cancelled,
}

impl BillingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingStatus::Active => "active",
            BillingStatus::PastDue => "past_due",
            BillingStatus::Grace => "grace",
            BillingStatus::Suspended => "suspended",
            BillingStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(BillingStatus::Active),
            "past_due" => Some(BillingStatus::PastDue),
            "grace" => Some(BillingStatus::Grace),
            "suspended" => Some(BillingStatus::Suspended),
            "cancelled" => Some(BillingStatus::Cancelled),
            _ => None,
        }
    }

    /// Only fully active accounts may issue invoices.
    pub fn can_issue_invoices(&self) -> bool {
        matches!(self, BillingStatus::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BillingStatus::Cancelled)
    }
}

impl std::fmt::Display for BillingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Validates a billing status transition against the subscription graph.
///
/// Legal edges:
/// - active -> past_due | suspended | cancelled
/// - past_due -> active | grace | suspended | cancelled
/// - grace -> active | suspended | cancelled
/// - suspended -> active | cancelled
///
/// `cancelled` is terminal; same-state re-entry is rejected.
pub fn validate_transition(from: BillingStatus, to: BillingStatus) -> Result<(), AppError> {
    let valid = match from {
        BillingStatus::Active => matches!(
            to,
            BillingStatus::PastDue | BillingStatus::Suspended | BillingStatus::Cancelled
        ),
        BillingStatus::PastDue => matches!(
            to,
            BillingStatus::Active
                | BillingStatus::Grace
                | BillingStatus::Suspended
                | BillingStatus::Cancelled
        ),
        BillingStatus::Grace => matches!(
            to,
            BillingStatus::Active | BillingStatus::Suspended | BillingStatus::Cancelled
        ),
        BillingStatus::Suspended => {
            matches!(to, BillingStatus::Active | BillingStatus::Cancelled)
        }
        BillingStatus::Cancelled => false,
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

/// Billing account, read-only from this engine's perspective.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BillingAccount {
    pub store_id: Uuid,
    pub status: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl BillingAccount {
    /// Get parsed status.
    pub fn parsed_status(&self) -> Option<BillingStatus> {
        BillingStatus::parse(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [BillingStatus; 5] = [
        BillingStatus::Active,
        BillingStatus::PastDue,
        BillingStatus::Grace,
        BillingStatus::Suspended,
        BillingStatus::Cancelled,
    ];

    fn legal(from: BillingStatus, to: BillingStatus) -> bool {
        use BillingStatus::*;
        matches!(
            (from, to),
            (Active, PastDue)
                | (Active, Suspended)
                | (Active, Cancelled)
                | (PastDue, Active)
                | (PastDue, Grace)
                | (PastDue, Suspended)
                | (PastDue, Cancelled)
                | (Grace, Active)
                | (Grace, Suspended)
                | (Grace, Cancelled)
                | (Suspended, Active)
                | (Suspended, Cancelled)
        )
    }

    #[test]
    fn transition_matrix_matches_graph() {
        for from in ALL {
            for to in ALL {
                assert_eq!(
                    validate_transition(from, to).is_ok(),
                    legal(from, to),
                    "unexpected verdict for {} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn cancelled_is_terminal() {
        assert!(BillingStatus::Cancelled.is_terminal());
        for to in ALL {
            assert!(validate_transition(BillingStatus::Cancelled, to).is_err());
        }
    }

    #[test]
    fn only_active_can_issue() {
        for status in ALL {
            assert_eq!(
                status.can_issue_invoices(),
                status == BillingStatus::Active
            );
        }
    }

    #[test]
    fn status_round_trips_through_strings() {
        for status in ALL {
            assert_eq!(BillingStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BillingStatus::parse("trial"), None);
    }
}
