//! Payment model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::PaymentType;

/// A recorded payment against an invoice. Written once, at the point the
/// payment is economically realized: issuance for cash, settlement for credit.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub payment_id: Uuid,
    pub store_id: Uuid,
    pub invoice_id: Uuid,
    pub amount_cents: i64,
    pub method: String,
    pub created_utc: DateTime<Utc>,
}

impl Payment {
    /// Get parsed payment method.
    pub fn parsed_method(&self) -> Option<PaymentType> {
        PaymentType::parse(&self.method)
    }
}
