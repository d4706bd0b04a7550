//! Error taxonomy for ingestion and billing.

use crate::repository::StoreError;
use rust_decimal::Decimal;
use service_core::error::AppError;
use service_core::retry::Transient;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BoqError {
    /// Bad input at the API boundary.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Workbook is missing required sheets {missing:?} (sheets present: {available:?})")]
    MissingSheets {
        missing: Vec<String>,
        available: Vec<String>,
    },

    #[error("Sheet '{sheet}' is missing required columns {missing:?} (header row: {header_row:?})")]
    MissingColumns {
        sheet: String,
        missing: Vec<String>,
        header_row: Vec<String>,
    },

    #[error("Workbook could not be read: {0}")]
    InvalidWorkbook(String),

    #[error(
        "Line item {line_item_id} ({item_code}) would be over-billed: \
         currently invoiced {currently_invoiced}%, requested {requested}%"
    )]
    OverBilling {
        line_item_id: Uuid,
        item_code: String,
        currently_invoiced: Decimal,
        requested: Decimal,
    },

    #[error("Invoice number '{0}' already exists")]
    DuplicateInvoiceNumber(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Lock contention or serialization failure that outlived the retry budget.
    #[error("Transient storage conflict: {0}")]
    Transient(String),

    #[error("Storage error: {0}")]
    Storage(anyhow::Error),
}

impl BoqError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::MissingSheets { .. } => "missing_sheets",
            Self::MissingColumns { .. } => "missing_columns",
            Self::InvalidWorkbook(_) => "invalid_workbook",
            Self::OverBilling { .. } => "over_billing",
            Self::DuplicateInvoiceNumber(_) => "duplicate_invoice_number",
            Self::NotFound { .. } => "not_found",
            Self::Transient(_) => "transient",
            Self::Storage(_) => "storage",
        }
    }
}

impl Transient for BoqError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<StoreError> for BoqError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Transient(msg) => Self::Transient(msg),
            other => Self::Storage(anyhow::Error::new(other)),
        }
    }
}

impl From<BoqError> for AppError {
    fn from(err: BoqError) -> Self {
        let message = err.to_string();
        match err {
            BoqError::Validation(_)
            | BoqError::MissingSheets { .. }
            | BoqError::MissingColumns { .. }
            | BoqError::InvalidWorkbook(_) => AppError::BadRequest(anyhow::anyhow!(message)),
            BoqError::OverBilling { .. } | BoqError::DuplicateInvoiceNumber(_) => {
                AppError::Conflict(anyhow::anyhow!(message))
            }
            BoqError::NotFound { .. } => AppError::NotFound(anyhow::anyhow!(message)),
            BoqError::Transient(_) => AppError::ServiceUnavailable(message, Some(1)),
            BoqError::Storage(e) => AppError::DatabaseError(e),
        }
    }
}
