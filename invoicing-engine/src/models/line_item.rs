//! Invoice line item model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Line item on an invoice. `unit_price_cents` is a snapshot of the product
/// price at the time the line was written; it never tracks later price edits.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoiceItem {
    pub item_id: Uuid,
    pub invoice_id: Uuid,
    pub store_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub created_utc: DateTime<Utc>,
}

impl InvoiceItem {
    /// Line subtotal before any aggregation.
    pub fn subtotal_cents(&self) -> i64 {
        self.unit_price_cents * self.quantity
    }
}

/// Caller-supplied line when creating or replacing draft items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItemInput {
    pub product_id: Uuid,
    pub quantity: i64,
}
