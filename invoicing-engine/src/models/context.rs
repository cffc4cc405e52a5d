//! Trusted operator context.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity and tenant scope of the actor performing an operation.
///
/// Resolved by the caller's identity layer; the engine enforces it against
/// resource ownership but never derives it. Passed explicitly to every
/// lifecycle operation, no ambient request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorContext {
    pub operator_id: Uuid,
    pub store_id: Uuid,
    pub request_id: Uuid,
}

impl OperatorContext {
    pub fn new(operator_id: Uuid, store_id: Uuid) -> Self {
        OperatorContext {
            operator_id,
            store_id,
            request_id: Uuid::new_v4(),
        }
    }
}
