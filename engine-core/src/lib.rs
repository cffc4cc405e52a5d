//! engine-core: Shared infrastructure for the invoicing engine workspace.
pub mod config;
pub mod error;
pub mod observability;

pub use anyhow;
pub use serde;
pub use serde_json;
pub use tracing;
