//! Common test utilities for boq-service integration tests.

#![allow(dead_code)]

use boq_service::models::{SourceLineItem, Vendor};
use boq_service::repository::{MemoryRepository, Repository};
use boq_service::startup::AppState;
use rust_xlsxwriter::Workbook as XlsxWorkbook;
use service_core::retry::RetryConfig;
use std::sync::{Arc, Once};
use std::time::Duration;
use uuid::Uuid;

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,boq_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub const ACTOR: &str = "test-user";

/// Short backoff so retry tests stay fast.
pub fn fast_retry(max_retries: u32) -> RetryConfig {
    RetryConfig {
        max_retries,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        add_jitter: false,
    }
}

/// Service state over a fresh in-memory repository.
pub struct TestApp {
    pub repo: MemoryRepository,
    pub state: AppState,
}

pub fn spawn_memory_app() -> TestApp {
    spawn_memory_app_with_retries(3)
}

pub fn spawn_memory_app_with_retries(max_retries: u32) -> TestApp {
    init_tracing();
    let repo = MemoryRepository::new();
    let state = AppState::new(Arc::new(repo.clone()), fast_retry(max_retries));
    TestApp { repo, state }
}

impl TestApp {
    pub async fn load_rate_card(&self, vendor: Vendor, entries: &[(&str, f64)]) {
        self.state
            .ingestion
            .replace_rate_card(vendor, rate_card_workbook(entries), ACTOR)
            .await
            .expect("rate card upload failed");
    }

    /// Ingest a document and return its line items in sheet order.
    pub async fn ingest(&self, vendor: Vendor, reference: &str, bytes: Vec<u8>) -> Vec<SourceLineItem> {
        let report = self
            .state
            .ingestion
            .ingest_document(vendor, reference, Some("upload.xlsx"), bytes, ACTOR)
            .await
            .expect("ingestion failed");
        self.line_items(report.document_id).await
    }

    pub async fn line_items(&self, document_id: Uuid) -> Vec<SourceLineItem> {
        self.repo
            .find_line_items(document_id)
            .await
            .expect("line item lookup failed")
    }
}

// ============================================================================
// Workbook fixtures
// ============================================================================

#[derive(Debug, Clone)]
pub enum Value {
    Text(&'static str),
    Number(f64),
    Blank,
}

pub type Grid = Vec<Vec<Value>>;

/// Serialize sheets to `.xlsx` bytes.
pub fn xlsx(sheets: &[(&str, Grid)]) -> Vec<u8> {
    let mut workbook = XlsxWorkbook::new();
    for (name, grid) in sheets {
        let sheet = workbook.add_worksheet();
        sheet.set_name(*name).expect("invalid sheet name");
        for (r, row) in grid.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                match value {
                    Value::Text(s) => {
                        sheet.write_string(r as u32, c as u16, *s).expect("write string");
                    }
                    Value::Number(n) => {
                        sheet.write_number(r as u32, c as u16, *n).expect("write number");
                    }
                    Value::Blank => {}
                }
            }
        }
    }
    workbook.save_to_buffer().expect("xlsx serialization failed")
}

/// `(code, description, quantity, price)` line rows.
pub type Line = (&'static str, &'static str, f64, Option<f64>);

fn line_row(line: &Line) -> Vec<Value> {
    let (code, description, quantity, price) = *line;
    vec![
        Value::Text(code),
        Value::Text(description),
        Value::Text("nos"),
        Value::Number(quantity),
        price.map(Value::Number).unwrap_or(Value::Blank),
    ]
}

/// A service PO: title rows, then a scanned header, then data.
pub fn service_po_workbook(lines: &[Line]) -> Vec<u8> {
    let mut grid: Grid = vec![
        vec![Value::Text("Purchase Order")],
        vec![Value::Blank],
        vec![
            Value::Text("Service Number"),
            Value::Text("Description"),
            Value::Text("Unit"),
            Value::Text("Quantity"),
            Value::Text("Unit Price"),
        ],
    ];
    grid.extend(lines.iter().map(line_row));
    xlsx(&[("PO", grid)])
}

pub fn work_order_workbook(lines: &[Line]) -> Vec<u8> {
    let mut grid: Grid = vec![vec![
        Value::Text("Item Code"),
        Value::Text("Description"),
        Value::Text("UOM"),
        Value::Text("Qty"),
        Value::Text("Rate"),
    ]];
    grid.extend(lines.iter().map(line_row));
    xlsx(&[("Work Order", grid)])
}

/// A BOQ section sheet: header fixed at row index 13.
pub fn boq_section(lines: &[Line]) -> Grid {
    let mut grid: Grid = vec![vec![Value::Text("Bill of Quantities")]];
    grid.extend((1..13).map(|_| vec![Value::Blank]));
    grid.push(vec![
        Value::Text("Item Code"),
        Value::Text("Description"),
        Value::Text("Unit"),
        Value::Text("Qty"),
        Value::Text("Rate"),
    ]);
    grid.extend(lines.iter().map(line_row));
    grid
}

/// Delimiter row that flags everything below it as additional work.
pub fn additional_work_row() -> Vec<Value> {
    vec![Value::Text("Additional Work")]
}

/// A material BOQ with `Main` plus whichever sections are given.
pub fn material_boq_workbook(sections: &[(&str, Grid)]) -> Vec<u8> {
    let mut sheets: Vec<(&str, Grid)> = vec![("Main", vec![vec![Value::Text("Project summary")]])];
    sheets.extend(sections.iter().cloned());
    xlsx(&sheets)
}

pub fn rate_card_workbook(entries: &[(&str, f64)]) -> Vec<u8> {
    let mut workbook = XlsxWorkbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Rate Card").expect("invalid sheet name");
    sheet.write_string(0, 0, "Code").expect("write");
    sheet.write_string(0, 1, "Description").expect("write");
    sheet.write_string(0, 2, "Rate").expect("write");
    for (i, (code, rate)) in entries.iter().enumerate() {
        let row = i as u32 + 1;
        sheet.write_string(row, 0, *code).expect("write");
        sheet.write_string(row, 1, format!("{} service", code)).expect("write");
        sheet.write_number(row, 2, *rate).expect("write");
    }
    workbook.save_to_buffer().expect("xlsx serialization failed")
}
