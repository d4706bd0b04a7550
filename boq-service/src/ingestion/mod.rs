//! Spreadsheet ingestion engine.
//!
//! `upload -> locate sheets -> resolve headers -> extract rows -> price`.
//! Structural problems (missing sheets or columns) abort before any row is
//! read; bad individual rows are dropped and counted.

pub mod enricher;
pub mod extractor;
pub mod header;
pub mod layouts;
pub mod numeric;
pub mod sheet_locator;
pub mod workbook;

pub use enricher::{LineItemEnricher, RateCardIndex};
pub use layouts::VendorLayout;
pub use workbook::{Cell, Sheet, Workbook};

use crate::error::BoqError;
use crate::models::{InvoicedState, NewRateCardEntry, SourceLineItem, Vendor};
use chrono::Utc;
use enricher::normalize_code;
use extractor::{extract_rows, Extraction};
use header::{resolve_header, Column, ColumnMap};
use layouts::SheetContract;
use rust_decimal::Decimal;
use sheet_locator::locate_sheets;
use std::collections::HashMap;
use uuid::Uuid;

/// A validated PO / BOQ row, not yet priced.
#[derive(Debug, Clone, PartialEq)]
pub struct LineRecord {
    pub section: String,
    pub row_number: usize,
    pub item_code: String,
    pub description: String,
    pub unit_of_measure: String,
    pub quantity: Decimal,
    pub sheet_price: Option<Decimal>,
    pub is_additional_work: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineExtraction {
    pub records: Vec<LineRecord>,
    pub rows_seen: usize,
    pub rows_skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateCardExtraction {
    pub entries: Vec<NewRateCardEntry>,
    pub rows_seen: usize,
    pub rows_skipped: usize,
}

/// Priced line items plus the codes the rate card did not know.
#[derive(Debug, Clone)]
pub struct PricedItems {
    pub items: Vec<SourceLineItem>,
    pub unmatched_codes: Vec<String>,
    /// Records whose amount overflowed and were dropped.
    pub rows_skipped: usize,
}

/// Resolve every sheet and header of `contracts` before extracting anything.
fn resolve_contracts<'w>(
    workbook: &'w Workbook,
    required: &[&str],
    contracts: &[SheetContract],
) -> Result<Vec<(SheetContract, &'w Sheet, ColumnMap)>, BoqError> {
    let names = workbook.sheet_names();
    let resolved = locate_sheets(&names, required)?;

    contracts
        .iter()
        .map(|contract| {
            let sheet = resolved
                .actual(contract.logical_name)
                .and_then(|actual| workbook.sheet(actual))
                .ok_or_else(|| BoqError::MissingSheets {
                    missing: vec![contract.logical_name.to_string()],
                    available: names.clone(),
                })?;
            let columns = resolve_header(sheet, contract.header, contract.columns)?;
            Ok((*contract, sheet, columns))
        })
        .collect()
}

/// Extract the line rows of a PO / BOQ workbook.
pub fn extract_line_records(
    workbook: &Workbook,
    layout: &VendorLayout,
) -> Result<LineExtraction, BoqError> {
    let sheets = resolve_contracts(workbook, layout.required_sheets, layout.line_sheets)?;

    let mut out = LineExtraction::default();
    for (contract, sheet, columns) in sheets {
        let Extraction {
            rows,
            rows_seen,
            rows_skipped,
        } = extract_rows(sheet, &columns, &contract.rules);

        out.rows_seen += rows_seen;
        out.rows_skipped += rows_skipped;
        out.records.extend(rows.into_iter().map(|row| LineRecord {
            section: contract.logical_name.to_string(),
            row_number: row.row_number,
            item_code: row.text(Column::ItemCode).to_string(),
            description: row.text(Column::Description).to_string(),
            unit_of_measure: row.text(Column::UnitOfMeasure).to_string(),
            quantity: row.number(Column::Quantity).unwrap_or(Decimal::ZERO),
            sheet_price: row.number(Column::UnitPrice),
            is_additional_work: row.is_additional_work,
        }));
    }
    Ok(out)
}

/// Extract a rate card. A code that appears twice keeps its last row.
pub fn extract_rate_card(
    workbook: &Workbook,
    layout: &VendorLayout,
) -> Result<RateCardExtraction, BoqError> {
    let contract = layout.rate_card;
    let mut sheets = resolve_contracts(workbook, &[contract.logical_name], &[contract])?;
    let Some((_, sheet, columns)) = sheets.pop() else {
        return Ok(RateCardExtraction::default());
    };

    let extraction = extract_rows(sheet, &columns, &contract.rules);
    let mut entries: Vec<NewRateCardEntry> = Vec::with_capacity(extraction.rows.len());
    let mut positions: HashMap<String, usize> = HashMap::new();

    for row in &extraction.rows {
        let entry = NewRateCardEntry {
            code: row.text(Column::ItemCode).to_string(),
            description: row.text(Column::Description).to_string(),
            unit_rate: row.number(Column::UnitPrice).unwrap_or(Decimal::ZERO),
        };
        match positions.get(&normalize_code(&entry.code)) {
            Some(&pos) => entries[pos] = entry,
            None => {
                positions.insert(normalize_code(&entry.code), entries.len());
                entries.push(entry);
            }
        }
    }

    Ok(RateCardExtraction {
        entries,
        rows_seen: extraction.rows_seen,
        rows_skipped: extraction.rows_skipped,
    })
}

/// Price records against the rate card and build the document's line items.
pub fn price_line_items(
    records: Vec<LineRecord>,
    index: &RateCardIndex,
    document_id: Uuid,
    vendor: Vendor,
) -> PricedItems {
    let now = Utc::now();
    let mut enricher = LineItemEnricher::new(index);
    let mut rows_skipped = 0;

    let items = records
        .into_iter()
        .filter_map(|record| {
            let Some(pricing) =
                enricher.price(&record.item_code, record.quantity, record.sheet_price)
            else {
                tracing::debug!(
                    section = %record.section,
                    row = record.row_number,
                    item_code = %record.item_code,
                    "Skipping row: amount out of range"
                );
                rows_skipped += 1;
                return None;
            };
            Some(SourceLineItem {
                line_item_id: Uuid::new_v4(),
                document_id,
                vendor,
                section: record.section,
                row_number: record.row_number as i32,
                item_code: record.item_code,
                description: record.description,
                unit_of_measure: record.unit_of_measure,
                quantity: record.quantity,
                unit_price: pricing.unit_price,
                computed_amount: pricing.computed_amount,
                is_additional_work: record.is_additional_work,
                invoiced: InvoicedState::unbilled(vendor.billing_mode()),
                created_utc: now,
                updated_utc: now,
            })
        })
        .collect();

    PricedItems {
        items,
        unmatched_codes: enricher.into_unmatched(),
        rows_skipped,
    }
}
