//! Domain models for the invoicing engine.

pub mod billing;
pub mod context;
pub mod invoice;
pub mod ledger;
pub mod line_item;
pub mod payment;
pub mod product;

pub use billing::{BillingAccount, BillingStatus};
pub use context::OperatorContext;
pub use invoice::{
    CancelOutcome, CreateInvoice, Invoice, InvoiceStatus, IssueOutcome, ListInvoicesFilter,
    PaymentType, SettleOutcome, UpdateDraft,
};
pub use ledger::{LedgerEntry, LedgerEntryType};
pub use line_item::{InvoiceItem, LineItemInput};
pub use payment::Payment;
pub use product::Product;
