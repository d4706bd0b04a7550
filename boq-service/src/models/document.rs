//! Source document (PO / BOQ batch) model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A PO or BOQ upload. Line items hang off it and are replaced as a batch
/// whenever the same `(vendor, reference)` is ingested again.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SourceDocument {
    pub document_id: Uuid,
    pub vendor: String,
    pub reference: String,
    pub file_name: Option<String>,
    pub uploaded_by: String,
    pub line_item_count: i32,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}
