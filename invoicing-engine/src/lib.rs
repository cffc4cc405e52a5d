//! Invoicing Engine - Invoice lifecycle and ledger consistency for multi-tenant stores.

pub mod models;
pub mod services;

pub use services::database::Database;
pub use services::lifecycle::InvoiceLifecycle;
