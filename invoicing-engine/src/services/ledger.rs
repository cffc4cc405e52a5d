//! Ledger and payment writers, plus the ledger idempotency guard.
//!
//! Both tables are append-only: inserts only, in-transaction only.

use chrono::Utc;
use engine_core::error::AppError;
use sqlx::SqliteConnection;
use tracing::info;
use uuid::Uuid;

use crate::models::{LedgerEntry, LedgerEntryType, Payment, PaymentType};
use crate::services::metrics::{LEDGER_ENTRIES_TOTAL, PAYMENTS_TOTAL};

/// Idempotency guard: fails with `Conflict` when an entry of this type
/// already exists for the invoice. Must run inside the same transaction as
/// the insert it protects, and must be the last guard before that insert.
pub async fn ensure_no_entry(
    conn: &mut SqliteConnection,
    invoice_id: Uuid,
    entry_type: LedgerEntryType,
) -> Result<(), AppError> {
    let existing: Option<Uuid> = sqlx::query_scalar(
        "SELECT entry_id FROM ledger_entries WHERE invoice_id = $1 AND entry_type = $2 LIMIT 1",
    )
    .bind(invoice_id)
    .bind(entry_type.as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to check ledger: {}", e)))?;

    if existing.is_some() {
        return Err(AppError::Conflict(anyhow::anyhow!(
            "A {} entry already exists for invoice {}",
            entry_type,
            invoice_id
        )));
    }

    Ok(())
}

/// Append a ledger entry. A unique-index violation means another transaction
/// recorded the same fact first and maps to the same `Conflict` as the guard.
pub async fn insert_entry(
    conn: &mut SqliteConnection,
    store_id: Uuid,
    invoice_id: Uuid,
    entry_type: LedgerEntryType,
    amount_cents: i64,
) -> Result<LedgerEntry, AppError> {
    let entry = sqlx::query_as::<_, LedgerEntry>(
        r#"
        INSERT INTO ledger_entries (entry_id, store_id, invoice_id, entry_type, amount_cents, created_utc)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING entry_id, store_id, invoice_id, entry_type, amount_cents, created_utc
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(store_id)
    .bind(invoice_id)
    .bind(entry_type.as_str())
    .bind(amount_cents)
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            AppError::Conflict(anyhow::anyhow!(
                "A {} entry already exists for invoice {}",
                entry_type,
                invoice_id
            ))
        }
        _ => AppError::DatabaseError(anyhow::anyhow!("Failed to insert ledger entry: {}", e)),
    })?;

    LEDGER_ENTRIES_TOTAL
        .with_label_values(&[entry_type.as_str()])
        .inc();

    info!(
        entry_id = %entry.entry_id,
        invoice_id = %invoice_id,
        entry_type = %entry_type,
        amount_cents = amount_cents,
        "Ledger entry recorded"
    );

    Ok(entry)
}

/// Append a payment record.
pub async fn insert_payment(
    conn: &mut SqliteConnection,
    store_id: Uuid,
    invoice_id: Uuid,
    amount_cents: i64,
    method: PaymentType,
) -> Result<Payment, AppError> {
    let payment = sqlx::query_as::<_, Payment>(
        r#"
        INSERT INTO payments (payment_id, store_id, invoice_id, amount_cents, method, created_utc)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING payment_id, store_id, invoice_id, amount_cents, method, created_utc
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(store_id)
    .bind(invoice_id)
    .bind(amount_cents)
    .bind(method.as_str())
    .bind(Utc::now())
    .fetch_one(&mut *conn)
    .await
    .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to insert payment: {}", e)))?;

    PAYMENTS_TOTAL.with_label_values(&[method.as_str()]).inc();

    info!(
        payment_id = %payment.payment_id,
        invoice_id = %invoice_id,
        method = %method,
        amount_cents = amount_cents,
        "Payment recorded"
    );

    Ok(payment)
}
