//! Invoice handlers.

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use super::{api_error, parse_vendor, Actor};
use crate::models::{CreateInvoice, Invoice, InvoiceLineRequest, ListInvoicesFilter, Vendor};
use crate::startup::AppState;

const DEFAULT_PAGE_SIZE: i32 = 50;

// ============================================================================
// Request/Response DTOs
// ============================================================================

/// Request to create an invoice.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    #[validate(length(min = 1, max = 64, message = "invoice_number must be 1-64 characters"))]
    pub invoice_number: String,
    pub vendor: Vendor,
    pub vat_percentage: Decimal,
    #[serde(default)]
    pub ssl_percentage: Option<Decimal>,
    #[validate(length(min = 1, max = 1000, message = "an invoice needs 1-1000 lines"))]
    pub lines: Vec<InvoiceLineRequest>,
}

impl From<CreateInvoiceRequest> for CreateInvoice {
    fn from(req: CreateInvoiceRequest) -> Self {
        Self {
            invoice_number: req.invoice_number,
            vendor: req.vendor,
            vat_percentage: req.vat_percentage,
            ssl_percentage: req.ssl_percentage,
            lines: req.lines,
        }
    }
}

/// Query params for listing invoices.
#[derive(Debug, Deserialize)]
pub struct ListInvoicesQuery {
    pub vendor: Option<String>,
    pub page_size: Option<i32>,
    pub page_token: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct ListInvoicesResponse {
    pub invoices: Vec<Invoice>,
    pub next_page_token: Option<Uuid>,
}

// ============================================================================
// Handlers
// ============================================================================

/// Create an invoice, billing every referenced line item or none of them.
///
/// POST /invoices
pub async fn create_invoice(
    State(state): State<AppState>,
    actor: Actor,
    Json(req): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<Invoice>), AppError> {
    req.validate()?;

    let invoice = state
        .invoices
        .create(CreateInvoice::from(req), actor.as_str())
        .await
        .map_err(api_error)?;

    Ok((StatusCode::CREATED, Json(invoice)))
}

/// GET /invoices/:invoice_id
pub async fn get_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Invoice>, AppError> {
    Ok(Json(state.invoices.get(invoice_id).await.map_err(api_error)?))
}

/// GET /invoices
pub async fn list_invoices(
    State(state): State<AppState>,
    Query(query): Query<ListInvoicesQuery>,
) -> Result<Json<ListInvoicesResponse>, AppError> {
    let vendor = query.vendor.as_deref().map(parse_vendor).transpose()?;

    let page = state
        .invoices
        .list(ListInvoicesFilter {
            vendor,
            page_size: query.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            page_token: query.page_token,
        })
        .await
        .map_err(api_error)?;

    Ok(Json(ListInvoicesResponse {
        invoices: page.invoices,
        next_page_token: page.next_page_token,
    }))
}

/// Delete an invoice and reverse its billing.
///
/// DELETE /invoices/:invoice_id
pub async fn delete_invoice(
    State(state): State<AppState>,
    actor: Actor,
    Path(invoice_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    tracing::info!(invoice_id = %invoice_id, actor = %actor.as_str(), "Deleting invoice");
    state.invoices.delete(invoice_id).await.map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}
