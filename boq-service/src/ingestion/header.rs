//! Header row discovery and keyword-driven column mapping.

use super::workbook::Sheet;
use crate::error::BoqError;
use std::collections::HashMap;
use std::fmt;

/// How to find the header row of a sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStrategy {
    /// First row with a cell whose lower-cased text contains `marker`.
    Scan { marker: &'static str },
    /// Zero-based row index of a rigid template.
    Fixed { row: usize },
}

/// Logical columns a layout can map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    ItemCode,
    Description,
    UnitOfMeasure,
    Quantity,
    UnitPrice,
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ItemCode => "item_code",
            Self::Description => "description",
            Self::UnitOfMeasure => "unit_of_measure",
            Self::Quantity => "quantity",
            Self::UnitPrice => "unit_price",
        };
        f.write_str(name)
    }
}

/// One logical column and the keyword sets that identify it.
///
/// Sets are tried in order; a header cell matches a set when its lower-cased
/// text contains every token of the set. Specs are resolved in declaration
/// order and a cell claimed by an earlier spec is not offered to later ones.
#[derive(Debug, Clone, Copy)]
pub struct ColumnSpec {
    pub column: Column,
    pub keyword_sets: &'static [&'static [&'static str]],
    pub required: bool,
}

/// Result of header resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMap {
    /// Zero-based index of the header row.
    pub header_row: usize,
    columns: HashMap<Column, usize>,
}

impl ColumnMap {
    pub fn index_of(&self, column: Column) -> Option<usize> {
        self.columns.get(&column).copied()
    }
}

/// Locate the header row and map every column spec to a cell index.
pub fn resolve_header(
    sheet: &Sheet,
    strategy: HeaderStrategy,
    specs: &[ColumnSpec],
) -> Result<ColumnMap, BoqError> {
    let header_row = match strategy {
        HeaderStrategy::Scan { marker } => find_marker_row(sheet, marker),
        HeaderStrategy::Fixed { row } => (row < sheet.rows.len()).then_some(row),
    };

    let Some(header_row) = header_row else {
        return Err(missing_columns(sheet, specs.iter().filter(|s| s.required), Vec::new()));
    };

    let headers: Vec<String> = sheet.rows[header_row]
        .iter()
        .map(|cell| cell.as_text().to_lowercase())
        .collect();

    let mut columns = HashMap::new();
    let mut claimed = vec![false; headers.len()];
    let mut unresolved = Vec::new();

    for spec in specs {
        match match_column(&headers, &claimed, spec.keyword_sets) {
            Some(index) => {
                claimed[index] = true;
                columns.insert(spec.column, index);
            }
            None if spec.required => unresolved.push(spec),
            None => {}
        }
    }

    if !unresolved.is_empty() {
        let row_content = sheet.rows[header_row].iter().map(|c| c.as_text()).collect();
        return Err(missing_columns(sheet, unresolved.into_iter(), row_content));
    }

    Ok(ColumnMap {
        header_row,
        columns,
    })
}

fn find_marker_row(sheet: &Sheet, marker: &str) -> Option<usize> {
    sheet.rows.iter().position(|row| {
        row.iter()
            .any(|cell| cell.as_text().to_lowercase().contains(marker))
    })
}

fn match_column(
    headers: &[String],
    claimed: &[bool],
    keyword_sets: &[&[&str]],
) -> Option<usize> {
    keyword_sets.iter().find_map(|tokens| {
        headers.iter().enumerate().position(|(i, header)| {
            !claimed[i] && !header.is_empty() && tokens.iter().all(|t| header.contains(t))
        })
    })
}

fn missing_columns<'a>(
    sheet: &Sheet,
    specs: impl Iterator<Item = &'a ColumnSpec>,
    header_row: Vec<String>,
) -> BoqError {
    BoqError::MissingColumns {
        sheet: sheet.name.clone(),
        missing: specs.map(|s| s.column.to_string()).collect(),
        header_row,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestion::workbook::Cell;

    const PRICE: ColumnSpec = ColumnSpec {
        column: Column::UnitPrice,
        keyword_sets: &[&["rate"], &["price"], &["amount"], &["cost"]],
        required: true,
    };
    const QUANTITY: ColumnSpec = ColumnSpec {
        column: Column::Quantity,
        keyword_sets: &[&["quantity"], &["qty"]],
        required: true,
    };
    const UNIT: ColumnSpec = ColumnSpec {
        column: Column::UnitOfMeasure,
        keyword_sets: &[&["uom"], &["unit"]],
        required: false,
    };

    fn row(cells: &[&str]) -> Vec<Cell> {
        cells
            .iter()
            .map(|c| if c.is_empty() { Cell::Empty } else { Cell::text(*c) })
            .collect()
    }

    #[test]
    fn test_amount_fallback_resolves_price() {
        let sheet = Sheet::new(
            "PO",
            vec![row(&["Service Number", "Qty", "Amount (LKR)"])],
        );
        let map = resolve_header(&sheet, HeaderStrategy::Scan { marker: "service number" }, &[
            QUANTITY, PRICE,
        ])
        .unwrap();

        assert_eq!(map.index_of(Column::UnitPrice), Some(2));
        assert_eq!(map.index_of(Column::Quantity), Some(1));
    }

    #[test]
    fn test_scan_skips_title_rows() {
        let sheet = Sheet::new(
            "PO",
            vec![
                row(&["Purchase Order 2024/17"]),
                row(&[]),
                row(&["Service Number", "Quantity", "Unit Rate"]),
            ],
        );
        let map = resolve_header(&sheet, HeaderStrategy::Scan { marker: "service number" }, &[
            QUANTITY, PRICE,
        ])
        .unwrap();
        assert_eq!(map.header_row, 2);
    }

    #[test]
    fn test_claimed_cell_is_not_reused() {
        let sheet = Sheet::new("PO", vec![row(&["Unit Price", "Qty", "Unit"])]);
        let map = resolve_header(&sheet, HeaderStrategy::Fixed { row: 0 }, &[
            PRICE, QUANTITY, UNIT,
        ])
        .unwrap();

        assert_eq!(map.index_of(Column::UnitPrice), Some(0));
        assert_eq!(map.index_of(Column::UnitOfMeasure), Some(2));
    }

    #[test]
    fn test_missing_columns_lists_header_content() {
        let sheet = Sheet::new("BOQ", vec![row(&["Item", "Qty"])]);
        let err = resolve_header(&sheet, HeaderStrategy::Fixed { row: 0 }, &[QUANTITY, PRICE])
            .unwrap_err();

        match err {
            BoqError::MissingColumns {
                sheet,
                missing,
                header_row,
            } => {
                assert_eq!(sheet, "BOQ");
                assert_eq!(missing, vec!["unit_price"]);
                assert_eq!(header_row, vec!["Item", "Qty"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_fixed_row_beyond_sheet_reports_every_required_column() {
        let sheet = Sheet::new("BOQ", vec![row(&["Item", "Qty"])]);
        let err = resolve_header(&sheet, HeaderStrategy::Fixed { row: 13 }, &[
            QUANTITY, PRICE, UNIT,
        ])
        .unwrap_err();

        match err {
            BoqError::MissingColumns {
                missing,
                header_row,
                ..
            } => {
                assert_eq!(missing, vec!["quantity", "unit_price"]);
                assert!(header_row.is_empty());
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
