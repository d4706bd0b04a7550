//! Rate card upload and lookup.

use axum::{
    body::Bytes,
    extract::{Json, Path, State},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;

use super::{api_error, parse_vendor, Actor};
use crate::error::BoqError;
use crate::models::RateCardEntry;
use crate::services::RateCardReport;
use crate::startup::AppState;

/// Rate card entry response.
#[derive(Debug, Serialize)]
pub struct RateCardEntryResponse {
    pub code: String,
    pub description: String,
    pub unit_rate: Decimal,
    pub uploaded_by: String,
    pub created_utc: DateTime<Utc>,
}

impl From<RateCardEntry> for RateCardEntryResponse {
    fn from(entry: RateCardEntry) -> Self {
        Self {
            code: entry.code,
            description: entry.description,
            unit_rate: entry.unit_rate,
            uploaded_by: entry.uploaded_by,
            created_utc: entry.created_utc,
        }
    }
}

/// Replace a vendor's rate card with an uploaded workbook.
///
/// PUT /vendors/:vendor/rate-card
pub async fn replace_rate_card(
    State(state): State<AppState>,
    Path(vendor): Path<String>,
    actor: Actor,
    body: Bytes,
) -> Result<Json<RateCardReport>, AppError> {
    let vendor = parse_vendor(&vendor)?;
    if body.is_empty() {
        return Err(BoqError::Validation("request body must contain a workbook".into()).into());
    }

    let report = state
        .ingestion
        .replace_rate_card(vendor, body.to_vec(), actor.as_str())
        .await
        .map_err(api_error)?;

    Ok(Json(report))
}

/// GET /vendors/:vendor/rate-card
pub async fn get_rate_card(
    State(state): State<AppState>,
    Path(vendor): Path<String>,
) -> Result<Json<Vec<RateCardEntryResponse>>, AppError> {
    let vendor = parse_vendor(&vendor)?;
    let entries = state
        .repo
        .find_rate_card(vendor)
        .await
        .map_err(api_error)?;

    Ok(Json(entries.into_iter().map(Into::into).collect()))
}
