//! Stock reservation.
//!
//! Drafts never touch stock; only issuance performs the binding decrement,
//! inside the issuing transaction, after validating every line against the
//! same transaction's view of availability.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use engine_core::error::AppError;
use sqlx::SqliteConnection;
use tracing::warn;
use uuid::Uuid;

use crate::models::Product;

/// Sum requested quantities per product. An invoice may reference the same
/// product on several lines; the reservation must hold for the aggregate.
pub fn aggregate_quantities(lines: impl IntoIterator<Item = (Uuid, i64)>) -> BTreeMap<Uuid, i64> {
    let mut aggregated: BTreeMap<Uuid, i64> = BTreeMap::new();
    for (product_id, quantity) in lines {
        *aggregated.entry(product_id).or_insert(0) += quantity;
    }
    aggregated
}

/// Informational availability check for draft paths. Logs a shortfall but
/// never fails: a draft has no inventory impact, and availability at draft
/// time guarantees nothing at issuance time anyway.
pub fn check_availability(products: &HashMap<Uuid, Product>, aggregated: &BTreeMap<Uuid, i64>) {
    for (product_id, requested) in aggregated {
        if let Some(product) = products.get(product_id) {
            if product.stock < *requested {
                warn!(
                    product_id = %product_id,
                    available = product.stock,
                    requested = requested,
                    "Draft references more stock than currently available"
                );
            }
        }
    }
}

/// Validate and decrement stock for every product the invoice references,
/// as part of the caller's transaction. Fails with `InsufficientStock` before
/// any decrement when a single product falls short.
pub async fn reserve(
    conn: &mut SqliteConnection,
    store_id: Uuid,
    aggregated: &BTreeMap<Uuid, i64>,
) -> Result<(), AppError> {
    // Validate every product first so a late shortfall cannot leave a
    // partial decrement behind even outside a rolled-back transaction.
    for (product_id, requested) in aggregated {
        let stock: Option<i64> = sqlx::query_scalar(
            "SELECT stock FROM products WHERE store_id = $1 AND product_id = $2",
        )
        .bind(store_id)
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load stock: {}", e)))?;

        let available = stock.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "Product {} not found in store",
                product_id
            ))
        })?;

        if available < *requested {
            return Err(AppError::InsufficientStock {
                product_id: *product_id,
                available,
                requested: *requested,
            });
        }
    }

    let now = Utc::now();
    for (product_id, requested) in aggregated {
        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock - $3, updated_utc = $4
            WHERE store_id = $1 AND product_id = $2 AND stock >= $3
            "#,
        )
        .bind(store_id)
        .bind(product_id)
        .bind(requested)
        .bind(now)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to decrement stock: {}", e))
        })?;

        if result.rows_affected() == 0 {
            // Stock moved between the check and the decrement; re-read so the
            // caller sees the quantity that actually remains.
            let available: i64 = sqlx::query_scalar(
                "SELECT stock FROM products WHERE store_id = $1 AND product_id = $2",
            )
            .bind(store_id)
            .bind(product_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to load stock: {}", e))
            })?
            .unwrap_or(0);

            return Err(AppError::InsufficientStock {
                product_id: *product_id,
                available,
                requested: *requested,
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregation_sums_repeated_products() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let aggregated = aggregate_quantities(vec![(a, 3), (b, 1), (a, 2)]);
        assert_eq!(aggregated.get(&a), Some(&5));
        assert_eq!(aggregated.get(&b), Some(&1));
        assert_eq!(aggregated.len(), 2);
    }
}
