//! In-process repository.
//!
//! A unit of work holds the store-wide mutex for its whole lifetime and
//! edits a private copy that replaces the shared state on commit, so units
//! of work are fully serialised and a dropped one leaves no trace.

use super::{Repository, StoreError, UnitOfWork};
use crate::models::{
    Invoice, ListInvoicesFilter, RateCardEntry, SourceDocument, SourceLineItem, Vendor,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    rate_cards: HashMap<Vendor, Vec<RateCardEntry>>,
    documents: HashMap<Uuid, SourceDocument>,
    line_items: BTreeMap<Uuid, SourceLineItem>,
    invoices: BTreeMap<Uuid, Invoice>,
}

#[derive(Clone, Default)]
pub struct MemoryRepository {
    state: Arc<Mutex<MemoryState>>,
    injected_conflicts: Arc<AtomicU32>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls to `begin` fail with a transient conflict.
    pub fn inject_transient_conflicts(&self, count: u32) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    /// Remove a line item behind the service's back.
    pub async fn delete_line_item(&self, line_item_id: Uuid) -> bool {
        self.state
            .lock()
            .await
            .line_items
            .remove(&line_item_id)
            .is_some()
    }

    pub async fn line_item(&self, line_item_id: Uuid) -> Option<SourceLineItem> {
        self.state.lock().await.line_items.get(&line_item_id).cloned()
    }

    /// Line items across every document.
    pub async fn line_item_count(&self) -> usize {
        self.state.lock().await.line_items.len()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let pending = self
            .injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if pending.is_ok() {
            return Err(StoreError::Transient("injected conflict".to_string()));
        }

        let guard = self.state.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, working }))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_rate_card(&self, vendor: Vendor) -> Result<Vec<RateCardEntry>, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .rate_cards
            .get(&vendor)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_document(
        &self,
        document_id: Uuid,
    ) -> Result<Option<SourceDocument>, StoreError> {
        Ok(self.state.lock().await.documents.get(&document_id).cloned())
    }

    async fn find_line_items(
        &self,
        document_id: Uuid,
    ) -> Result<Vec<SourceLineItem>, StoreError> {
        let state = self.state.lock().await;
        let mut items: Vec<SourceLineItem> = state
            .line_items
            .values()
            .filter(|item| item.document_id == document_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            a.section
                .cmp(&b.section)
                .then(a.row_number.cmp(&b.row_number))
        });
        Ok(items)
    }

    async fn find_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, StoreError> {
        Ok(self.state.lock().await.invoices.get(&invoice_id).cloned())
    }

    async fn list_invoices(
        &self,
        filter: &ListInvoicesFilter,
    ) -> Result<Vec<Invoice>, StoreError> {
        let limit = filter.page_size.clamp(1, 100) as usize;
        let state = self.state.lock().await;
        Ok(state
            .invoices
            .values()
            .filter(|inv| filter.vendor.map_or(true, |v| inv.vendor == v))
            .filter(|inv| filter.page_token.map_or(true, |t| inv.invoice_id > t))
            .take(limit)
            .cloned()
            .collect())
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn read_rate_card(&mut self, vendor: Vendor) -> Result<Vec<RateCardEntry>, StoreError> {
        Ok(self
            .working
            .rate_cards
            .get(&vendor)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace_rate_card(
        &mut self,
        vendor: Vendor,
        entries: &[RateCardEntry],
    ) -> Result<(), StoreError> {
        self.working.rate_cards.insert(vendor, entries.to_vec());
        Ok(())
    }

    async fn upsert_document(
        &mut self,
        vendor: Vendor,
        reference: &str,
        file_name: Option<&str>,
        uploaded_by: &str,
    ) -> Result<SourceDocument, StoreError> {
        let now = Utc::now();
        let existing = self
            .working
            .documents
            .values_mut()
            .find(|d| d.vendor == vendor.as_str() && d.reference == reference);

        let document = match existing {
            Some(doc) => {
                doc.file_name = file_name.map(str::to_string);
                doc.uploaded_by = uploaded_by.to_string();
                doc.updated_utc = now;
                doc.clone()
            }
            None => {
                let doc = SourceDocument {
                    document_id: Uuid::new_v4(),
                    vendor: vendor.as_str().to_string(),
                    reference: reference.to_string(),
                    file_name: file_name.map(str::to_string),
                    uploaded_by: uploaded_by.to_string(),
                    line_item_count: 0,
                    created_utc: now,
                    updated_utc: now,
                };
                self.working.documents.insert(doc.document_id, doc.clone());
                doc
            }
        };
        Ok(document)
    }

    async fn replace_line_items(
        &mut self,
        document_id: Uuid,
        items: &[SourceLineItem],
    ) -> Result<u64, StoreError> {
        let mut billed_discarded = 0;
        self.working.line_items.retain(|_, item| {
            if item.document_id != document_id {
                return true;
            }
            if !item.invoiced.invoiced_percentage().is_zero() {
                billed_discarded += 1;
            }
            false
        });
        for item in items {
            self.working.line_items.insert(item.line_item_id, item.clone());
        }
        if let Some(doc) = self.working.documents.get_mut(&document_id) {
            doc.line_item_count = items.len() as i32;
        }
        Ok(billed_discarded)
    }

    async fn lock_line_items(&mut self, ids: &[Uuid]) -> Result<Vec<SourceLineItem>, StoreError> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();
        Ok(ids
            .iter()
            .filter_map(|id| self.working.line_items.get(id).cloned())
            .collect())
    }

    async fn save_invoiced_state(&mut self, item: &SourceLineItem) -> Result<(), StoreError> {
        match self.working.line_items.get_mut(&item.line_item_id) {
            Some(stored) => {
                stored.invoiced = item.invoiced;
                stored.updated_utc = Utc::now();
                Ok(())
            }
            None => Err(StoreError::Database(anyhow::anyhow!(
                "line item {} disappeared inside its own transaction",
                item.line_item_id
            ))),
        }
    }

    async fn invoice_number_exists(&mut self, invoice_number: &str) -> Result<bool, StoreError> {
        Ok(self
            .working
            .invoices
            .values()
            .any(|inv| inv.invoice_number == invoice_number))
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        if self
            .working
            .invoices
            .values()
            .any(|inv| inv.invoice_number == invoice.invoice_number)
        {
            return Err(StoreError::UniqueViolation(
                "invoices_invoice_number_key".to_string(),
            ));
        }
        self.working
            .invoices
            .insert(invoice.invoice_id, invoice.clone());
        Ok(())
    }

    async fn lock_invoice(&mut self, invoice_id: Uuid) -> Result<Option<Invoice>, StoreError> {
        Ok(self.working.invoices.get(&invoice_id).cloned())
    }

    async fn delete_invoice(&mut self, invoice_id: Uuid) -> Result<(), StoreError> {
        self.working.invoices.remove(&invoice_id);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
