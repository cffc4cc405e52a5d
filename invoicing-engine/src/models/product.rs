//! Product model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A product available for sale in one store.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub product_id: Uuid,
    pub store_id: Uuid,
    pub name: String,
    /// Price in cents (smallest currency unit).
    pub price_cents: i64,
    /// Current stock level; never below zero.
    pub stock: i64,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}
