//! Decoding real `.xlsx` files into the workbook model.

mod common;

use boq_service::ingestion::{Cell, Workbook};
use common::*;
use rust_xlsxwriter::Workbook as XlsxWorkbook;

#[test]
fn test_sheet_names_keep_file_order_and_spelling() {
    let bytes = xlsx(&[
        ("Main", vec![vec![Value::Text("x")]]),
        (" BOQ ", vec![vec![Value::Text("x")]]),
        ("Rate Card", vec![vec![Value::Text("x")]]),
    ]);

    let workbook = Workbook::from_bytes(&bytes).unwrap();
    assert_eq!(workbook.sheet_names(), vec!["Main", " BOQ ", "Rate Card"]);
    assert!(workbook.sheet(" BOQ ").is_some());
    assert!(workbook.sheet("BOQ").is_none());
}

#[test]
fn test_cells_keep_absolute_positions() {
    let mut book = XlsxWorkbook::new();
    let sheet = book.add_worksheet();
    sheet.set_name("PO").unwrap();
    sheet.write_string(3, 2, "Service Number").unwrap();
    sheet.write_number(4, 2, 1001).unwrap();
    sheet.write_number(4, 3, 12.5).unwrap();
    let bytes = book.save_to_buffer().unwrap();

    let workbook = Workbook::from_bytes(&bytes).unwrap();
    let sheet = workbook.sheet("PO").unwrap();

    assert_eq!(sheet.rows.len(), 5);
    assert!(sheet.rows[0].is_empty());
    assert_eq!(sheet.rows[3][2], Cell::text("Service Number"));
    assert_eq!(sheet.rows[3][0], Cell::Empty);
    assert_eq!(sheet.rows[4][2].as_text(), "1001");
    assert_eq!(sheet.rows[4][3], Cell::Number(12.5));
}

#[test]
fn test_empty_sheet_has_no_rows() {
    let mut book = XlsxWorkbook::new();
    book.add_worksheet().set_name("Surplus").unwrap();
    let bytes = book.save_to_buffer().unwrap();

    let workbook = Workbook::from_bytes(&bytes).unwrap();
    assert!(workbook.sheet("Surplus").unwrap().rows.is_empty());
}
