//! Storage seam for rate cards, line items and invoices.
//!
//! Every mutation runs inside a [`UnitOfWork`]. Dropping a unit of work
//! without calling [`UnitOfWork::commit`] discards all of its writes.
//! Line items and invoices read through a unit of work are locked until it
//! ends, which is what serialises concurrent billing of the same item.

mod memory;

pub use memory::MemoryRepository;

use crate::models::{
    Invoice, ListInvoicesFilter, RateCardEntry, SourceDocument, SourceLineItem, Vendor,
};
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// Lock timeout, deadlock or serialization failure; safe to retry.
    #[error("Transient conflict: {0}")]
    Transient(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(anyhow::Error),
}

impl StoreError {
    /// Classify a sqlx error, keeping `context` in the message.
    pub fn from_sqlx(context: &str, err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return Self::UniqueViolation(
                    db_err.constraint().unwrap_or("unknown").to_string(),
                );
            }
            // serialization_failure, deadlock_detected, lock_not_available
            if matches!(db_err.code().as_deref(), Some("40001" | "40P01" | "55P03")) {
                return Self::Transient(format!("{}: {}", context, db_err));
            }
        }
        if matches!(err, sqlx::Error::PoolTimedOut) {
            return Self::Transient(format!("{}: {}", context, err));
        }
        Self::Database(anyhow::anyhow!("{}: {}", context, err))
    }
}

/// Read access plus the transaction factory.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Start a transactional unit of work.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;

    async fn find_rate_card(&self, vendor: Vendor) -> Result<Vec<RateCardEntry>, StoreError>;

    async fn find_document(&self, document_id: Uuid)
        -> Result<Option<SourceDocument>, StoreError>;

    async fn find_line_items(&self, document_id: Uuid)
        -> Result<Vec<SourceLineItem>, StoreError>;

    async fn find_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, StoreError>;

    async fn list_invoices(&self, filter: &ListInvoicesFilter)
        -> Result<Vec<Invoice>, StoreError>;
}

/// One database transaction.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Read a vendor's rate card, holding off concurrent replacement until
    /// this unit of work ends.
    async fn read_rate_card(&mut self, vendor: Vendor) -> Result<Vec<RateCardEntry>, StoreError>;

    /// Delete and re-insert a vendor's whole rate card under a table lock.
    async fn replace_rate_card(
        &mut self,
        vendor: Vendor,
        entries: &[RateCardEntry],
    ) -> Result<(), StoreError>;

    /// Create the `(vendor, reference)` document or refresh its upload fields.
    async fn upsert_document(
        &mut self,
        vendor: Vendor,
        reference: &str,
        file_name: Option<&str>,
        uploaded_by: &str,
    ) -> Result<SourceDocument, StoreError>;

    /// Replace all line items of a document. Returns how many of the
    /// discarded items carried a non-zero invoiced state.
    async fn replace_line_items(
        &mut self,
        document_id: Uuid,
        items: &[SourceLineItem],
    ) -> Result<u64, StoreError>;

    /// Lock and load the given line items. Missing ids are simply absent
    /// from the result. Locks are taken in id order.
    async fn lock_line_items(&mut self, ids: &[Uuid]) -> Result<Vec<SourceLineItem>, StoreError>;

    async fn save_invoiced_state(&mut self, item: &SourceLineItem) -> Result<(), StoreError>;

    async fn invoice_number_exists(&mut self, invoice_number: &str) -> Result<bool, StoreError>;

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError>;

    /// Lock and load an invoice with its lines.
    async fn lock_invoice(&mut self, invoice_id: Uuid) -> Result<Option<Invoice>, StoreError>;

    async fn delete_invoice(&mut self, invoice_id: Uuid) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
