//! Invoice model for boq-service.

use super::Vendor;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Invoice aggregate: header totals plus the line applications it made.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub vendor: Vendor,
    pub vat_percentage: Decimal,
    pub vat_amount: Decimal,
    pub ssl_percentage: Option<Decimal>,
    pub ssl_amount: Decimal,
    pub subtotal: Decimal,
    pub total: Decimal,
    pub created_by: String,
    pub created_utc: DateTime<Utc>,
    pub lines: Vec<InvoiceLine>,
}

/// One application of an invoice against a source line item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub invoice_line_id: Uuid,
    pub line_item_id: Uuid,
    /// Item code at the time of billing; the line item may later be replaced.
    pub item_code: String,
    /// Share billed by this line (100 for once-only items).
    pub billed_percentage: Decimal,
    pub line_amount: Decimal,
    pub sort_order: i32,
}

/// Database row for `invoices`.
#[derive(Debug, Clone, FromRow)]
pub struct InvoiceRow {
    pub invoice_id: Uuid,
    pub invoice_number: String,
    pub vendor: String,
    pub vat_percentage: Decimal,
    pub vat_amount: Decimal,
    pub ssl_percentage: Option<Decimal>,
    pub ssl_amount: Decimal,
    pub subtotal: Decimal,
    pub total: Decimal,
    pub created_by: String,
    pub created_utc: DateTime<Utc>,
}

/// Database row for `invoice_lines`.
#[derive(Debug, Clone, FromRow)]
pub struct InvoiceLineRow {
    pub invoice_line_id: Uuid,
    pub invoice_id: Uuid,
    pub line_item_id: Uuid,
    pub item_code: String,
    pub billed_percentage: Decimal,
    pub line_amount: Decimal,
    pub sort_order: i32,
}

impl InvoiceRow {
    /// Assemble the aggregate; `None` if the stored vendor key is unknown.
    pub fn into_domain(self, lines: Vec<InvoiceLineRow>) -> Option<Invoice> {
        let vendor = Vendor::from_key(&self.vendor)?;
        let mut lines: Vec<InvoiceLine> = lines
            .into_iter()
            .map(|l| InvoiceLine {
                invoice_line_id: l.invoice_line_id,
                line_item_id: l.line_item_id,
                item_code: l.item_code,
                billed_percentage: l.billed_percentage,
                line_amount: l.line_amount,
                sort_order: l.sort_order,
            })
            .collect();
        lines.sort_by_key(|l| l.sort_order);

        Some(Invoice {
            invoice_id: self.invoice_id,
            invoice_number: self.invoice_number,
            vendor,
            vat_percentage: self.vat_percentage,
            vat_amount: self.vat_amount,
            ssl_percentage: self.ssl_percentage,
            ssl_amount: self.ssl_amount,
            subtotal: self.subtotal,
            total: self.total,
            created_by: self.created_by,
            created_utc: self.created_utc,
            lines,
        })
    }
}

/// Input for creating an invoice.
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub invoice_number: String,
    pub vendor: Vendor,
    pub vat_percentage: Decimal,
    pub ssl_percentage: Option<Decimal>,
    pub lines: Vec<InvoiceLineRequest>,
}

/// Requested billing of one line item. `percentage` is required for
/// percentage-mode items and optional (implicitly 100) for once-only items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLineRequest {
    pub line_item_id: Uuid,
    pub percentage: Option<Decimal>,
}

/// Filter parameters for listing invoices.
#[derive(Debug, Clone, Default)]
pub struct ListInvoicesFilter {
    pub vendor: Option<Vendor>,
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}
