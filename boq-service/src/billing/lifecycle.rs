//! Invoice creation and deletion against the billing ledger.

use super::ledger::{ledger_for, LedgerRejection};
use crate::error::BoqError;
use crate::models::{
    percentage_of, round_money, BillingMode, CreateInvoice, Invoice, InvoiceLine,
    ListInvoicesFilter, SourceLineItem, FULL_PERCENTAGE,
};
use crate::repository::{Repository, StoreError, UnitOfWork};
use crate::services::metrics::{record_invoice_operation, record_over_billing};
use chrono::Utc;
use rust_decimal::Decimal;
use service_core::retry::{retry_transient, RetryConfig};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

/// One page of invoices.
#[derive(Debug, Clone)]
pub struct InvoicePage {
    pub invoices: Vec<Invoice>,
    /// Pass back as `page_token` to continue; `None` on the last page.
    pub next_page_token: Option<Uuid>,
}

/// Creates and deletes invoices, keeping line-item invoiced state in step.
///
/// Each create/delete is one unit of work: line items are locked, checked
/// and updated together with the invoice row, or not at all.
#[derive(Clone)]
pub struct InvoiceLifecycle {
    repo: Arc<dyn Repository>,
    retry: RetryConfig,
}

impl InvoiceLifecycle {
    pub fn new(repo: Arc<dyn Repository>, retry: RetryConfig) -> Self {
        Self { repo, retry }
    }

    #[instrument(
        skip(self, request),
        fields(invoice_number = %request.invoice_number, vendor = %request.vendor)
    )]
    pub async fn create(&self, request: CreateInvoice, created_by: &str) -> Result<Invoice, BoqError> {
        let request = normalize(request)?;
        let request = &request;

        let result = retry_transient(&self.retry, "create_invoice", move || {
            self.try_create(request, created_by)
        })
        .await;

        match &result {
            Ok(invoice) => {
                record_invoice_operation("create", "success");
                tracing::info!(
                    invoice_id = %invoice.invoice_id,
                    lines = invoice.lines.len(),
                    total = %invoice.total,
                    "Invoice created"
                );
            }
            Err(e) => record_invoice_operation("create", e.kind()),
        }
        result
    }

    async fn try_create(&self, request: &CreateInvoice, created_by: &str) -> Result<Invoice, BoqError> {
        let mut uow = self.repo.begin().await?;

        if uow.invoice_number_exists(&request.invoice_number).await? {
            return Err(BoqError::DuplicateInvoiceNumber(
                request.invoice_number.clone(),
            ));
        }

        let ids: Vec<Uuid> = request.lines.iter().map(|l| l.line_item_id).collect();
        let mut items: HashMap<Uuid, SourceLineItem> = uow
            .lock_line_items(&ids)
            .await?
            .into_iter()
            .map(|item| (item.line_item_id, item))
            .collect();

        let invoice_id = Uuid::new_v4();
        let mut lines = Vec::with_capacity(request.lines.len());

        for (position, line) in request.lines.iter().enumerate() {
            let item = items
                .get_mut(&line.line_item_id)
                .ok_or_else(|| BoqError::not_found("Line item", line.line_item_id))?;

            if item.vendor != request.vendor {
                return Err(BoqError::Validation(format!(
                    "line item {} belongs to vendor {}, not {}",
                    item.line_item_id, item.vendor, request.vendor
                )));
            }

            let requested = line.percentage.unwrap_or(FULL_PERCENTAGE);
            let ledger = ledger_for(item.invoiced.mode());
            item.invoiced = match ledger.apply(&item.invoiced, requested) {
                Ok(state) => state,
                Err(LedgerRejection::OverLimit {
                    currently_invoiced,
                    requested,
                }) => {
                    record_over_billing(request.vendor.as_str());
                    tracing::warn!(
                        line_item_id = %item.line_item_id,
                        item_code = %item.item_code,
                        currently_invoiced = %currently_invoiced,
                        requested = %requested,
                        "Rejecting invoice: line item would be over-billed"
                    );
                    return Err(BoqError::OverBilling {
                        line_item_id: item.line_item_id,
                        item_code: item.item_code.clone(),
                        currently_invoiced,
                        requested,
                    });
                }
                Err(rejection @ LedgerRejection::ModeMismatch { .. }) => {
                    return Err(BoqError::Validation(format!(
                        "line item {}: {}",
                        item.line_item_id, rejection
                    )));
                }
            };

            lines.push(InvoiceLine {
                invoice_line_id: Uuid::new_v4(),
                line_item_id: item.line_item_id,
                item_code: item.item_code.clone(),
                billed_percentage: requested,
                line_amount: percentage_of(item.computed_amount, requested)
                    .ok_or_else(|| amount_out_of_range("line amount"))?,
                sort_order: position as i32,
            });
        }

        let subtotal = lines
            .iter()
            .try_fold(Decimal::ZERO, |acc, l| acc.checked_add(l.line_amount))
            .ok_or_else(|| amount_out_of_range("subtotal"))?;
        let vat_amount = percentage_of(subtotal, request.vat_percentage)
            .ok_or_else(|| amount_out_of_range("VAT amount"))?;
        let ssl_amount =
            percentage_of(subtotal, request.ssl_percentage.unwrap_or(Decimal::ZERO))
                .ok_or_else(|| amount_out_of_range("SSL amount"))?;
        let total = subtotal
            .checked_add(vat_amount)
            .and_then(|t| t.checked_add(ssl_amount))
            .ok_or_else(|| amount_out_of_range("total"))?;

        let invoice = Invoice {
            invoice_id,
            invoice_number: request.invoice_number.clone(),
            vendor: request.vendor,
            vat_percentage: request.vat_percentage,
            vat_amount,
            ssl_percentage: request.ssl_percentage,
            ssl_amount,
            subtotal: round_money(subtotal),
            total: round_money(total),
            created_by: created_by.to_string(),
            created_utc: Utc::now(),
            lines,
        };

        save_states(uow.as_mut(), items.values()).await?;

        uow.insert_invoice(&invoice).await.map_err(|e| match e {
            StoreError::UniqueViolation(_) => {
                BoqError::DuplicateInvoiceNumber(invoice.invoice_number.clone())
            }
            other => other.into(),
        })?;

        uow.commit().await?;
        Ok(invoice)
    }

    /// Delete an invoice and reverse every application it made.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn delete(&self, invoice_id: Uuid) -> Result<(), BoqError> {
        let result = retry_transient(&self.retry, "delete_invoice", move || {
            self.try_delete(invoice_id)
        })
        .await;

        match &result {
            Ok(()) => {
                record_invoice_operation("delete", "success");
                tracing::info!("Invoice deleted");
            }
            Err(e) => record_invoice_operation("delete", e.kind()),
        }
        result
    }

    async fn try_delete(&self, invoice_id: Uuid) -> Result<(), BoqError> {
        let mut uow = self.repo.begin().await?;

        let invoice = uow
            .lock_invoice(invoice_id)
            .await?
            .ok_or_else(|| BoqError::not_found("Invoice", invoice_id))?;

        let ids: Vec<Uuid> = invoice.lines.iter().map(|l| l.line_item_id).collect();
        let mut items: HashMap<Uuid, SourceLineItem> = uow
            .lock_line_items(&ids)
            .await?
            .into_iter()
            .map(|item| (item.line_item_id, item))
            .collect();

        for line in &invoice.lines {
            match items.get_mut(&line.line_item_id) {
                Some(item) => {
                    let ledger = ledger_for(item.invoiced.mode());
                    item.invoiced = ledger.reverse(&item.invoiced, line.billed_percentage);
                }
                None => tracing::warn!(
                    line_item_id = %line.line_item_id,
                    item_code = %line.item_code,
                    "Line item no longer exists; nothing to reverse"
                ),
            }
        }

        save_states(uow.as_mut(), items.values()).await?;
        uow.delete_invoice(invoice_id).await?;
        uow.commit().await?;
        Ok(())
    }

    pub async fn get(&self, invoice_id: Uuid) -> Result<Invoice, BoqError> {
        self.repo
            .find_invoice(invoice_id)
            .await?
            .ok_or_else(|| BoqError::not_found("Invoice", invoice_id))
    }

    pub async fn list(&self, filter: ListInvoicesFilter) -> Result<InvoicePage, BoqError> {
        let page_size = filter.page_size.clamp(1, 100);
        let filter = ListInvoicesFilter {
            page_size,
            ..filter
        };
        let invoices = self.repo.list_invoices(&filter).await?;
        let next_page_token = if invoices.len() == page_size as usize {
            invoices.last().map(|inv| inv.invoice_id)
        } else {
            None
        };
        Ok(InvoicePage {
            invoices,
            next_page_token,
        })
    }
}

fn amount_out_of_range(what: &str) -> BoqError {
    BoqError::Validation(format!("invoice {} is out of range", what))
}

async fn save_states<'a>(
    uow: &mut dyn UnitOfWork,
    items: impl Iterator<Item = &'a SourceLineItem>,
) -> Result<(), BoqError> {
    // Stable order keeps row updates in lock order.
    let ordered: BTreeMap<Uuid, &SourceLineItem> =
        items.map(|item| (item.line_item_id, item)).collect();
    for item in ordered.values() {
        uow.save_invoiced_state(item).await?;
    }
    Ok(())
}

/// Check boundary rules and fill in implicit percentages.
fn normalize(mut request: CreateInvoice) -> Result<CreateInvoice, BoqError> {
    request.invoice_number = request.invoice_number.trim().to_string();
    if request.invoice_number.is_empty() {
        return Err(BoqError::Validation("invoice_number is required".into()));
    }
    if request.lines.is_empty() {
        return Err(BoqError::Validation(
            "an invoice needs at least one line".into(),
        ));
    }
    if !is_percentage(request.vat_percentage) {
        return Err(BoqError::Validation(format!(
            "vat_percentage must be between 0 and 100, got {}",
            request.vat_percentage
        )));
    }

    match request.ssl_percentage {
        Some(ssl) if !request.vendor.supports_ssl() && !ssl.is_zero() => {
            return Err(BoqError::Validation(format!(
                "vendor {} does not levy SSL",
                request.vendor
            )));
        }
        Some(ssl) if !is_percentage(ssl) => {
            return Err(BoqError::Validation(format!(
                "ssl_percentage must be between 0 and 100, got {}",
                ssl
            )));
        }
        _ => {}
    }
    if !request.vendor.supports_ssl() {
        request.ssl_percentage = None;
    }

    let mode = request.vendor.billing_mode();
    for line in &mut request.lines {
        match (mode, line.percentage) {
            (BillingMode::Percentage, None) => {
                return Err(BoqError::Validation(format!(
                    "line item {} needs a percentage",
                    line.line_item_id
                )));
            }
            (BillingMode::Percentage, Some(p)) if p <= Decimal::ZERO || p > FULL_PERCENTAGE => {
                return Err(BoqError::Validation(format!(
                    "line item {}: percentage must be above 0 and at most 100, got {}",
                    line.line_item_id, p
                )));
            }
            (BillingMode::OnceOnly, Some(p)) if p != FULL_PERCENTAGE => {
                return Err(BoqError::Validation(format!(
                    "line item {} is billed once in full; percentage must be 100, got {}",
                    line.line_item_id, p
                )));
            }
            (BillingMode::OnceOnly, _) => line.percentage = Some(FULL_PERCENTAGE),
            _ => {}
        }
    }

    Ok(request)
}

fn is_percentage(value: Decimal) -> bool {
    value >= Decimal::ZERO && value <= FULL_PERCENTAGE
}
