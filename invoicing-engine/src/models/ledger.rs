//! Ledger entry model. Entries are append-only financial facts: never
//! updated, never deleted, the single source of truth for reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Kind of financial fact recorded for an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerEntryType {
    /// Revenue recognized at issuance, paid or not.
    Sale,
    /// Payment collected for a previously deferred invoice.
    Receipt,
    /// Offset for a sale whose invoice was cancelled after issuance.
    Reversal,
}

impl LedgerEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryType::Sale => "sale",
            LedgerEntryType::Receipt => "receipt",
            LedgerEntryType::Reversal => "reversal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sale" => Some(LedgerEntryType::Sale),
            "receipt" => Some(LedgerEntryType::Receipt),
            "reversal" => Some(LedgerEntryType::Reversal),
            _ => None,
        }
    }
}

impl std::fmt::Display for LedgerEntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Single ledger entry. At most one entry of each type exists per invoice,
/// enforced both by the in-transaction guard and a unique index.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: Uuid,
    pub store_id: Uuid,
    pub invoice_id: Uuid,
    pub entry_type: String,
    pub amount_cents: i64,
    pub created_utc: DateTime<Utc>,
}

impl LedgerEntry {
    /// Get parsed entry type.
    pub fn parsed_entry_type(&self) -> Option<LedgerEntryType> {
        LedgerEntryType::parse(&self.entry_type)
    }
}
