//! Data-row extraction and row-level validation.

use super::header::{Column, ColumnMap};
use super::numeric::parse_decimal;
use super::workbook::{Cell, Sheet};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Value type and domain constraint of an extracted field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    /// Decimal strictly greater than zero.
    Positive,
    /// Decimal greater than or equal to zero.
    NonNegative,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub column: Column,
    pub kind: FieldKind,
    pub required: bool,
}

/// Row validity rule of one sheet contract.
#[derive(Debug, Clone, Copy)]
pub struct RowRules {
    pub fields: &'static [FieldRule],
    /// Delimiter cell text after which rows are flagged as additional work.
    pub additional_work_marker: Option<&'static str>,
}

/// A kept data row.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRow {
    /// 1-based sheet row.
    pub row_number: usize,
    pub is_additional_work: bool,
    text: HashMap<Column, String>,
    numbers: HashMap<Column, Decimal>,
}

impl ExtractedRow {
    /// Trimmed text of a column, empty when unmapped or blank.
    pub fn text(&self, column: Column) -> &str {
        self.text.get(&column).map(String::as_str).unwrap_or("")
    }

    pub fn number(&self, column: Column) -> Option<Decimal> {
        self.numbers.get(&column).copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub rows: Vec<ExtractedRow>,
    /// Non-blank, non-marker rows below the header.
    pub rows_seen: usize,
    pub rows_skipped: usize,
}

impl Extraction {
    pub fn rows_kept(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug)]
enum SkipReason {
    MissingField(Column),
    Unparseable(Column),
    OutOfRange(Column, Decimal),
}

/// Walk every row below the header, keeping the ones that satisfy `rules`.
///
/// Invalid rows are dropped and counted, never raised.
pub fn extract_rows(sheet: &Sheet, columns: &ColumnMap, rules: &RowRules) -> Extraction {
    let mut extraction = Extraction::default();
    let mut additional_work = false;

    for (index, row) in sheet.rows.iter().enumerate().skip(columns.header_row + 1) {
        if row.iter().all(Cell::is_blank) {
            continue;
        }
        if let Some(marker) = rules.additional_work_marker {
            if is_marker_row(row, marker) {
                additional_work = true;
                continue;
            }
        }

        extraction.rows_seen += 1;
        let row_number = index + 1;

        match extract_row(row, columns, rules) {
            Ok((text, numbers)) => extraction.rows.push(ExtractedRow {
                row_number,
                is_additional_work: additional_work,
                text,
                numbers,
            }),
            Err(reason) => {
                extraction.rows_skipped += 1;
                tracing::debug!(
                    sheet = %sheet.name,
                    row_number = row_number,
                    reason = ?reason,
                    "Skipping invalid row"
                );
            }
        }
    }

    extraction
}

fn is_marker_row(row: &[Cell], marker: &str) -> bool {
    row.iter()
        .any(|cell| cell.as_text().eq_ignore_ascii_case(marker))
}

static EMPTY: Cell = Cell::Empty;

type RowValues = (HashMap<Column, String>, HashMap<Column, Decimal>);

fn extract_row(row: &[Cell], columns: &ColumnMap, rules: &RowRules) -> Result<RowValues, SkipReason> {
    let mut text = HashMap::new();
    let mut numbers = HashMap::new();

    for rule in rules.fields {
        let cell = columns
            .index_of(rule.column)
            .and_then(|i| row.get(i))
            .unwrap_or(&EMPTY);

        if cell.is_blank() {
            if rule.required {
                return Err(SkipReason::MissingField(rule.column));
            }
            continue;
        }

        match rule.kind {
            FieldKind::Text => {
                text.insert(rule.column, cell.as_text());
            }
            FieldKind::Positive | FieldKind::NonNegative => {
                let Some(value) = parse_decimal(cell) else {
                    if rule.required {
                        return Err(SkipReason::Unparseable(rule.column));
                    }
                    continue;
                };
                let in_range = match rule.kind {
                    FieldKind::Positive => value > Decimal::ZERO,
                    _ => value >= Decimal::ZERO,
                };
                if !in_range {
                    return Err(SkipReason::OutOfRange(rule.column, value));
                }
                numbers.insert(rule.column, value);
            }
        }
    }

    Ok((text, numbers))
}
