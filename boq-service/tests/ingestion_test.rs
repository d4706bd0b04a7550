//! Workbook ingestion tests over the in-memory repository.

mod common;

use boq_service::error::BoqError;
use boq_service::models::{BillingPhase, InvoicedState, Vendor};
use boq_service::repository::Repository;
use common::*;
use rust_decimal::Decimal;
use std::str::FromStr;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

#[tokio::test]
async fn test_service_po_priced_from_rate_card() {
    let app = spawn_memory_app();
    app.load_rate_card(Vendor::ServicePo, &[("SVC-001", 250.0), ("SVC-002", 80.5)])
        .await;

    let bytes = service_po_workbook(&[
        ("SVC-001", "Site survey", 4.0, Some(999.0)),
        ("svc-002", "Cabling", 10.0, None),
        ("SVC-404", "Unknown work", 2.0, Some(15.0)),
        ("SVC-005", "No quantity", 0.0, Some(10.0)),
    ]);

    let report = app
        .state
        .ingestion
        .ingest_document(Vendor::ServicePo, "PO-2026-001", Some("po.xlsx"), bytes, ACTOR)
        .await
        .unwrap();

    assert_eq!(report.items_created, 3);
    assert_eq!(report.rows_seen, 4);
    assert_eq!(report.rows_skipped, 1);
    assert_eq!(
        report.errors,
        vec!["item code 'SVC-404' not found on the service-po rate card".to_string()]
    );

    let items = app.line_items(report.document_id).await;
    assert_eq!(items.len(), 3);

    // Rate card wins over the sheet price.
    assert_eq!(items[0].item_code, "SVC-001");
    assert_eq!(items[0].unit_price, dec("250"));
    assert_eq!(items[0].computed_amount, dec("1000"));

    // Lookup ignores case.
    assert_eq!(items[1].unit_price, dec("80.5"));
    assert_eq!(items[1].computed_amount, dec("805"));

    // Unmatched codes keep their sheet price.
    assert_eq!(items[2].unit_price, dec("15"));
    assert_eq!(items[2].computed_amount, dec("30"));

    for item in &items {
        assert_eq!(item.invoiced, InvoicedState::Percentage(Decimal::ZERO));
        assert_eq!(item.invoiced.phase(), BillingPhase::Unbilled);
        assert_eq!(item.section, "PO");
    }
    assert_eq!(items[0].row_number, 4);

    let document = app
        .repo
        .find_document(report.document_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(document.line_item_count, 3);
    assert_eq!(document.file_name.as_deref(), Some("po.xlsx"));
    assert_eq!(document.uploaded_by, ACTOR);
}

#[tokio::test]
async fn test_unmatched_code_without_sheet_price_is_zero() {
    let app = spawn_memory_app();

    let items = app
        .ingest(
            Vendor::WorkOrder,
            "WO-7",
            work_order_workbook(&[("WO-1", "Trenching", 3.0, None)]),
        )
        .await;

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].unit_price, Decimal::ZERO);
    assert_eq!(items[0].computed_amount, Decimal::ZERO);
}

#[tokio::test]
async fn test_material_boq_reads_sections_in_order() {
    let app = spawn_memory_app();
    app.load_rate_card(Vendor::MaterialBoq, &[("MAT-1", 12.0)]).await;

    let mut boq = boq_section(&[("MAT-1", "Cable drum", 5.0, None)]);
    boq.push(additional_work_row());
    boq.extend(boq_section(&[("MAT-2", "Joint kit", 2.0, Some(40.0))]).into_iter().skip(14));

    let bytes = material_boq_workbook(&[
        ("BOQ", boq),
        ("Remove", boq_section(&[("MAT-3", "Old pole", 1.0, Some(0.0))])),
        ("Surplus", boq_section(&[])),
    ]);

    let items = app.ingest(Vendor::MaterialBoq, "BOQ-17", bytes).await;

    let summary: Vec<(&str, &str, bool)> = items
        .iter()
        .map(|i| (i.section.as_str(), i.item_code.as_str(), i.is_additional_work))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("BOQ", "MAT-1", false),
            ("BOQ", "MAT-2", true),
            ("Remove", "MAT-3", false),
        ]
    );

    assert_eq!(items[0].computed_amount, dec("60"));
    assert_eq!(items[1].computed_amount, dec("80"));
    assert!(items
        .iter()
        .all(|i| i.invoiced == InvoicedState::Once(false)));
}

#[tokio::test]
async fn test_missing_section_writes_nothing() {
    let app = spawn_memory_app();

    let bytes = material_boq_workbook(&[
        ("BOQ", boq_section(&[("MAT-1", "Cable drum", 5.0, Some(1.0))])),
        ("Remove", boq_section(&[])),
    ]);

    let err = app
        .state
        .ingestion
        .ingest_document(Vendor::MaterialBoq, "BOQ-18", None, bytes, ACTOR)
        .await
        .unwrap_err();

    match err {
        BoqError::MissingSheets { missing, available } => {
            assert_eq!(missing, vec!["Surplus".to_string()]);
            assert!(available.contains(&"Main".to_string()));
        }
        other => panic!("expected MissingSheets, got {:?}", other),
    }
    assert_eq!(app.repo.line_item_count().await, 0);
}

#[tokio::test]
async fn test_reingest_replaces_items_under_same_document() {
    let app = spawn_memory_app();

    let first = app
        .state
        .ingestion
        .ingest_document(
            Vendor::ServicePo,
            "PO-9",
            None,
            service_po_workbook(&[
                ("SVC-1", "Survey", 1.0, Some(10.0)),
                ("SVC-2", "Install", 1.0, Some(20.0)),
            ]),
            ACTOR,
        )
        .await
        .unwrap();

    let second = app
        .state
        .ingestion
        .ingest_document(
            Vendor::ServicePo,
            " PO-9 ",
            None,
            service_po_workbook(&[("SVC-3", "Commission", 2.0, Some(30.0))]),
            ACTOR,
        )
        .await
        .unwrap();

    assert_eq!(first.document_id, second.document_id);

    let items = app.line_items(second.document_id).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].item_code, "SVC-3");
    assert_eq!(app.repo.line_item_count().await, 1);

    let document = app
        .repo
        .find_document(second.document_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(document.line_item_count, 1);
}

#[tokio::test]
async fn test_missing_columns_reports_header_row() {
    let app = spawn_memory_app();

    let bytes = xlsx(&[(
        "PO",
        vec![
            vec![
                Value::Text("Service Number"),
                Value::Text("Description"),
                Value::Text("Unit Price"),
            ],
            vec![Value::Text("SVC-1"), Value::Text("Survey"), Value::Number(10.0)],
        ],
    )]);

    let err = app
        .state
        .ingestion
        .ingest_document(Vendor::ServicePo, "PO-10", None, bytes, ACTOR)
        .await
        .unwrap_err();

    match err {
        BoqError::MissingColumns {
            sheet,
            missing,
            header_row,
        } => {
            assert_eq!(sheet, "PO");
            assert_eq!(missing, vec!["quantity".to_string()]);
            assert_eq!(header_row, vec!["Service Number", "Description", "Unit Price"]);
        }
        other => panic!("expected MissingColumns, got {:?}", other),
    }
    assert_eq!(app.repo.line_item_count().await, 0);
}

#[tokio::test]
async fn test_unreadable_upload_is_invalid_workbook() {
    let app = spawn_memory_app();

    let err = app
        .state
        .ingestion
        .ingest_document(Vendor::WorkOrder, "WO-1", None, b"not a workbook".to_vec(), ACTOR)
        .await
        .unwrap_err();

    assert!(matches!(err, BoqError::InvalidWorkbook(_)));
}

#[tokio::test]
async fn test_blank_reference_is_rejected() {
    let app = spawn_memory_app();

    let err = app
        .state
        .ingestion
        .ingest_document(
            Vendor::WorkOrder,
            "   ",
            None,
            work_order_workbook(&[("WO-1", "Trenching", 1.0, None)]),
            ACTOR,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BoqError::Validation(_)));
}

#[tokio::test]
async fn test_rate_card_upload_replaces_previous_card() {
    let app = spawn_memory_app();
    app.load_rate_card(Vendor::WorkOrder, &[("A", 1.0), ("B", 2.0)]).await;

    let report = app
        .state
        .ingestion
        .replace_rate_card(Vendor::WorkOrder, rate_card_workbook(&[("C", 3.0)]), ACTOR)
        .await
        .unwrap();
    assert_eq!(report.entries_loaded, 1);
    assert_eq!(report.rows_seen, 1);

    let card = app.repo.find_rate_card(Vendor::WorkOrder).await.unwrap();
    assert_eq!(card.len(), 1);
    assert_eq!(card[0].code, "C");
    assert_eq!(card[0].unit_rate, dec("3"));

    // Other vendors are untouched.
    assert!(app.repo.find_rate_card(Vendor::ServicePo).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_ingestion_retries_transient_conflicts() {
    let app = spawn_memory_app_with_retries(3);
    app.repo.inject_transient_conflicts(2);

    let items = app
        .ingest(
            Vendor::WorkOrder,
            "WO-retry",
            work_order_workbook(&[("WO-1", "Trenching", 1.0, Some(5.0))]),
        )
        .await;

    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn test_row_with_out_of_range_amount_is_skipped() {
    let app = spawn_memory_app();

    let report = app
        .state
        .ingestion
        .ingest_document(
            Vendor::ServicePo,
            "PO-HUGE",
            None,
            service_po_workbook(&[
                ("SVC-1", "Huge", 1e15, Some(1e15)),
                ("SVC-2", "Normal", 2.0, Some(5.0)),
            ]),
            ACTOR,
        )
        .await
        .unwrap();

    assert_eq!(report.rows_seen, 2);
    assert_eq!(report.rows_skipped, 1);
    assert_eq!(report.items_created, 1);

    let items = app.line_items(report.document_id).await;
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].item_code, "SVC-2");
    assert_eq!(items[0].computed_amount, dec("10"));
}
