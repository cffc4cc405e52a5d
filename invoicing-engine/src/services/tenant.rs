//! Tenant boundary enforcement.
//!
//! Upstream layers scope their lookups by store already; this guard still
//! runs unconditionally inside every lifecycle transaction so that a bypassed
//! or buggy caller cannot reach another store's data.

use engine_core::error::AppError;
use tracing::warn;
use uuid::Uuid;

use crate::models::OperatorContext;
use crate::services::metrics::CROSS_TENANT_DENIALS_TOTAL;

/// Fails with `Forbidden` when the resource's owning store differs from the
/// caller's trusted store. Denials are logged with both identifiers for audit.
pub fn enforce_store_boundary(
    resource_store_id: Uuid,
    ctx: &OperatorContext,
    operation: &'static str,
    resource_id: Uuid,
) -> Result<(), AppError> {
    if resource_store_id == ctx.store_id {
        return Ok(());
    }

    warn!(
        operation = operation,
        resource_id = %resource_id,
        resource_store_id = %resource_store_id,
        operator_id = %ctx.operator_id,
        operator_store_id = %ctx.store_id,
        request_id = %ctx.request_id,
        "Cross-tenant access denied"
    );
    CROSS_TENANT_DENIALS_TOTAL
        .with_label_values(&[operation])
        .inc();

    Err(AppError::Forbidden(anyhow::anyhow!(
        "Resource {} does not belong to the caller's store",
        resource_id
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_store_passes() {
        let ctx = OperatorContext::new(Uuid::new_v4(), Uuid::new_v4());
        assert!(
            enforce_store_boundary(ctx.store_id, &ctx, "issue", Uuid::new_v4()).is_ok()
        );
    }

    #[test]
    fn different_store_is_forbidden() {
        let ctx = OperatorContext::new(Uuid::new_v4(), Uuid::new_v4());
        let err = enforce_store_boundary(Uuid::new_v4(), &ctx, "issue", Uuid::new_v4())
            .unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }
}
