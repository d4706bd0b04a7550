//! PO / BOQ upload and line-item reads.

use axum::{
    body::Bytes,
    extract::{Json, Path, State},
    http::{HeaderMap, StatusCode},
};
use serde::Serialize;
use service_core::error::AppError;
use uuid::Uuid;

use super::{api_error, parse_vendor, Actor};
use crate::error::BoqError;
use crate::models::{BillingPhase, SourceDocument, SourceLineItem};
use crate::services::IngestionReport;
use crate::startup::AppState;

/// Optional original file name of an upload.
pub const FILE_NAME_HEADER: &str = "x-file-name";

#[derive(Debug, Serialize)]
pub struct LineItemResponse {
    #[serde(flatten)]
    pub item: SourceLineItem,
    pub phase: BillingPhase,
}

#[derive(Debug, Serialize)]
pub struct LineItemsResponse {
    pub document: SourceDocument,
    pub line_items: Vec<LineItemResponse>,
}

/// Ingest (or re-ingest) a vendor document.
///
/// POST /vendors/:vendor/documents/:reference
pub async fn ingest_document(
    State(state): State<AppState>,
    Path((vendor, reference)): Path<(String, String)>,
    actor: Actor,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<IngestionReport>), AppError> {
    let vendor = parse_vendor(&vendor)?;
    if body.is_empty() {
        return Err(BoqError::Validation("request body must contain a workbook".into()).into());
    }
    let file_name = headers
        .get(FILE_NAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let report = state
        .ingestion
        .ingest_document(vendor, &reference, file_name, body.to_vec(), actor.as_str())
        .await
        .map_err(api_error)?;

    Ok((StatusCode::CREATED, Json(report)))
}

/// GET /documents/:document_id/line-items
pub async fn list_line_items(
    State(state): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> Result<Json<LineItemsResponse>, AppError> {
    let document = state
        .repo
        .find_document(document_id)
        .await
        .map_err(api_error)?
        .ok_or_else(|| BoqError::not_found("Document", document_id))?;

    let line_items = state
        .repo
        .find_line_items(document_id)
        .await
        .map_err(api_error)?
        .into_iter()
        .map(|item| LineItemResponse {
            phase: item.invoiced.phase(),
            item,
        })
        .collect();

    Ok(Json(LineItemsResponse {
        document,
        line_items,
    }))
}
