//! Billing reconciliation: per-item ledger rules and the invoice lifecycle.

pub mod ledger;
pub mod lifecycle;

pub use ledger::{ledger_for, BillingLedger, LedgerRejection, OnceOnlyLedger, PercentageLedger};
pub use lifecycle::{InvoiceLifecycle, InvoicePage};
