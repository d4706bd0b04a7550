//! Workbook ingestion orchestration: parse, extract, price, persist.

use crate::error::BoqError;
use crate::ingestion::{
    extract_line_records, extract_rate_card, price_line_items, LineRecord, RateCardIndex,
    VendorLayout, Workbook,
};
use crate::models::{RateCardEntry, Vendor};
use crate::repository::Repository;
use crate::services::metrics::{record_ingested_rows, record_ingestion};
use chrono::Utc;
use serde::Serialize;
use service_core::retry::{retry_transient, RetryConfig};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// Outcome of a PO / BOQ ingestion.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionReport {
    pub document_id: Uuid,
    pub items_created: usize,
    pub rows_seen: usize,
    pub rows_skipped: usize,
    /// Non-fatal findings, e.g. item codes missing from the rate card.
    pub errors: Vec<String>,
}

/// Outcome of a rate-card upload.
#[derive(Debug, Clone, Serialize)]
pub struct RateCardReport {
    pub entries_loaded: usize,
    pub rows_seen: usize,
    pub rows_skipped: usize,
}

#[derive(Clone)]
pub struct IngestionService {
    repo: Arc<dyn Repository>,
    retry: RetryConfig,
}

struct Persisted {
    document_id: Uuid,
    items_created: usize,
    unmatched_codes: Vec<String>,
    rows_skipped: usize,
    billed_discarded: u64,
}

impl IngestionService {
    pub fn new(repo: Arc<dyn Repository>, retry: RetryConfig) -> Self {
        Self { repo, retry }
    }

    /// Replace a vendor's rate card with the contents of `bytes`.
    #[instrument(skip(self, bytes), fields(vendor = %vendor, size = bytes.len()))]
    pub async fn replace_rate_card(
        &self,
        vendor: Vendor,
        bytes: Vec<u8>,
        uploaded_by: &str,
    ) -> Result<RateCardReport, BoqError> {
        let result = self.try_replace_rate_card(vendor, bytes, uploaded_by).await;
        record_ingestion("rate_card", vendor.as_str(), status_of(&result));
        result
    }

    async fn try_replace_rate_card(
        &self,
        vendor: Vendor,
        bytes: Vec<u8>,
        uploaded_by: &str,
    ) -> Result<RateCardReport, BoqError> {
        let workbook = parse_workbook(bytes).await?;
        let extraction = extract_rate_card(&workbook, VendorLayout::for_vendor(vendor))?;

        let now = Utc::now();
        let entries: Vec<RateCardEntry> = extraction
            .entries
            .iter()
            .map(|e| RateCardEntry {
                entry_id: Uuid::new_v4(),
                vendor: vendor.as_str().to_string(),
                code: e.code.clone(),
                description: e.description.clone(),
                unit_rate: e.unit_rate,
                uploaded_by: uploaded_by.to_string(),
                created_utc: now,
            })
            .collect();
        let entries = &entries;

        retry_transient(&self.retry, "replace_rate_card", move || async move {
            let mut uow = self.repo.begin().await?;
            uow.replace_rate_card(vendor, entries).await?;
            uow.commit().await?;
            Ok::<_, BoqError>(())
        })
        .await?;

        tracing::info!(
            entries = entries.len(),
            rows_seen = extraction.rows_seen,
            rows_skipped = extraction.rows_skipped,
            "Rate card replaced"
        );

        Ok(RateCardReport {
            entries_loaded: entries.len(),
            rows_seen: extraction.rows_seen,
            rows_skipped: extraction.rows_skipped,
        })
    }

    /// Ingest a PO / BOQ, replacing every line item of the `(vendor,
    /// reference)` document in one transaction.
    #[instrument(skip(self, bytes), fields(vendor = %vendor, size = bytes.len()))]
    pub async fn ingest_document(
        &self,
        vendor: Vendor,
        reference: &str,
        file_name: Option<&str>,
        bytes: Vec<u8>,
        uploaded_by: &str,
    ) -> Result<IngestionReport, BoqError> {
        let result = self
            .try_ingest_document(vendor, reference, file_name, bytes, uploaded_by)
            .await;
        record_ingestion("document", vendor.as_str(), status_of(&result));
        result
    }

    async fn try_ingest_document(
        &self,
        vendor: Vendor,
        reference: &str,
        file_name: Option<&str>,
        bytes: Vec<u8>,
        uploaded_by: &str,
    ) -> Result<IngestionReport, BoqError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(BoqError::Validation("document reference is required".into()));
        }

        let workbook = parse_workbook(bytes).await?;
        let extraction = extract_line_records(&workbook, VendorLayout::for_vendor(vendor))?;
        record_ingested_rows(
            vendor.as_str(),
            extraction.records.len(),
            extraction.rows_skipped,
        );

        let records = &extraction.records;
        let persisted = retry_transient(&self.retry, "ingest_document", move || {
            self.persist_document(vendor, reference, file_name, records, uploaded_by)
        })
        .await?;

        if persisted.billed_discarded > 0 {
            tracing::warn!(
                document_id = %persisted.document_id,
                billed_discarded = persisted.billed_discarded,
                "Re-ingestion discarded line items that were already billed"
            );
        }

        let rows_skipped = extraction.rows_skipped + persisted.rows_skipped;
        let errors: Vec<String> = persisted
            .unmatched_codes
            .iter()
            .map(|code| format!("item code '{}' not found on the {} rate card", code, vendor))
            .collect();

        tracing::info!(
            document_id = %persisted.document_id,
            items_created = persisted.items_created,
            rows_seen = extraction.rows_seen,
            rows_skipped,
            unmatched = errors.len(),
            "Document ingested"
        );

        Ok(IngestionReport {
            document_id: persisted.document_id,
            items_created: persisted.items_created,
            rows_seen: extraction.rows_seen,
            rows_skipped,
            errors,
        })
    }

    async fn persist_document(
        &self,
        vendor: Vendor,
        reference: &str,
        file_name: Option<&str>,
        records: &[LineRecord],
        uploaded_by: &str,
    ) -> Result<Persisted, BoqError> {
        let mut uow = self.repo.begin().await?;

        let card = uow.read_rate_card(vendor).await?;
        let index = RateCardIndex::build(&card);

        let document = uow
            .upsert_document(vendor, reference, file_name, uploaded_by)
            .await?;
        let priced = price_line_items(records.to_vec(), &index, document.document_id, vendor);
        let billed_discarded = uow
            .replace_line_items(document.document_id, &priced.items)
            .await?;

        uow.commit().await?;

        Ok(Persisted {
            document_id: document.document_id,
            items_created: priced.items.len(),
            unmatched_codes: priced.unmatched_codes,
            rows_skipped: priced.rows_skipped,
            billed_discarded,
        })
    }
}

fn status_of<T>(result: &Result<T, BoqError>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(e) => e.kind(),
    }
}

/// Decode off the async runtime; large workbooks take a while.
async fn parse_workbook(bytes: Vec<u8>) -> Result<Workbook, BoqError> {
    tokio::task::spawn_blocking(move || Workbook::from_bytes(&bytes))
        .await
        .map_err(|e| BoqError::InvalidWorkbook(format!("workbook reader failed: {}", e)))?
}
