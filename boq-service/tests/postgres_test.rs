//! PostgreSQL-backed tests. Run with TEST_DATABASE_URL set:
//! `cargo test -p boq-service --test postgres_test -- --ignored`

mod common;

use boq_service::error::BoqError;
use boq_service::models::{CreateInvoice, InvoiceLineRequest, InvoicedState, RateCardEntry, Vendor};
use boq_service::repository::{Repository, StoreError};
use boq_service::services::Database;
use boq_service::startup::AppState;
use common::*;
use rust_decimal::Decimal;
use serial_test::serial;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

async fn spawn_pg_app() -> (Arc<Database>, AppState) {
    init_tracing();

    let database_url = std::env::var("TEST_DATABASE_URL")
        .expect("TEST_DATABASE_URL must be set to run PostgreSQL tests");

    let db = Database::new(&database_url, 5, 1)
        .await
        .expect("Failed to connect to PostgreSQL")
        .with_lock_timeout(2000);
    db.run_migrations().await.expect("Failed to run migrations");

    let db = Arc::new(db);
    let state = AppState::new(db.clone(), fast_retry(3));
    (db, state)
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

fn card_entry(vendor: Vendor, code: &str, rate: i64) -> RateCardEntry {
    RateCardEntry {
        entry_id: Uuid::new_v4(),
        vendor: vendor.as_str().to_string(),
        code: code.to_string(),
        description: String::new(),
        unit_rate: Decimal::from(rate),
        uploaded_by: ACTOR.to_string(),
        created_utc: Utc::now(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
#[serial]
async fn test_concurrent_invoices_cannot_over_bill() {
    let (db, state) = spawn_pg_app().await;

    let report = state
        .ingestion
        .ingest_document(
            Vendor::ServicePo,
            &unique("PO"),
            None,
            service_po_workbook(&[("SVC-1", "Survey", 1.0, Some(1000.0))]),
            ACTOR,
        )
        .await
        .unwrap();
    let items = db.find_line_items(report.document_id).await.unwrap();
    let item_id = items[0].line_item_id;

    let request = |number: String| CreateInvoice {
        invoice_number: number,
        vendor: Vendor::ServicePo,
        vat_percentage: Decimal::from(15),
        ssl_percentage: None,
        lines: vec![InvoiceLineRequest {
            line_item_id: item_id,
            percentage: Some(Decimal::from(60)),
        }],
    };

    let (a, b) = tokio::join!(
        state.invoices.create(request(unique("INV")), ACTOR),
        state.invoices.create(request(unique("INV")), ACTOR),
    );

    let failures: Vec<BoqError> = [a, b].into_iter().filter_map(Result::err).collect();
    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0], BoqError::OverBilling { .. }));

    let items = db.find_line_items(report.document_id).await.unwrap();
    assert_eq!(items[0].invoiced, InvoicedState::Percentage(Decimal::from(60)));
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_create_and_delete_round_trip() {
    let (db, state) = spawn_pg_app().await;

    let report = state
        .ingestion
        .ingest_document(
            Vendor::MaterialBoq,
            &unique("BOQ"),
            Some("boq.xlsx"),
            material_boq_workbook(&[
                ("BOQ", boq_section(&[("MAT-1", "Cable drum", 2.0, Some(50.0))])),
                ("Remove", boq_section(&[("MAT-2", "Old pole", 1.0, Some(10.0))])),
                ("Surplus", boq_section(&[])),
            ]),
            ACTOR,
        )
        .await
        .unwrap();
    let items = db.find_line_items(report.document_id).await.unwrap();
    assert_eq!(items.len(), 2);

    let number = unique("INV");
    let created = state
        .invoices
        .create(
            CreateInvoice {
                invoice_number: number.clone(),
                vendor: Vendor::MaterialBoq,
                vat_percentage: Decimal::from(15),
                ssl_percentage: None,
                lines: items
                    .iter()
                    .map(|i| InvoiceLineRequest {
                        line_item_id: i.line_item_id,
                        percentage: None,
                    })
                    .collect(),
            },
            ACTOR,
        )
        .await
        .unwrap();
    assert_eq!(created.subtotal, Decimal::from(110));

    let stored = state.invoices.get(created.invoice_id).await.unwrap();
    assert_eq!(stored.invoice_number, number);
    assert_eq!(stored.lines.len(), 2);
    assert_eq!(stored.total, created.total);

    let billed = db.find_line_items(report.document_id).await.unwrap();
    assert!(billed.iter().all(|i| i.invoiced == InvoicedState::Once(true)));

    state.invoices.delete(created.invoice_id).await.unwrap();

    let reversed = db.find_line_items(report.document_id).await.unwrap();
    assert!(reversed.iter().all(|i| i.invoiced == InvoicedState::Once(false)));
    assert!(db.find_invoice(created.invoice_id).await.unwrap().is_none());
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_rate_card_replacement_prices_next_ingestion() {
    let (db, state) = spawn_pg_app().await;

    state
        .ingestion
        .replace_rate_card(
            Vendor::WorkOrder,
            rate_card_workbook(&[("WO-1", 10.0), ("WO-2", 20.0)]),
            ACTOR,
        )
        .await
        .unwrap();
    state
        .ingestion
        .replace_rate_card(Vendor::WorkOrder, rate_card_workbook(&[("wo-1", 12.5)]), ACTOR)
        .await
        .unwrap();

    let card = db.find_rate_card(Vendor::WorkOrder).await.unwrap();
    assert_eq!(card.len(), 1);
    assert_eq!(card[0].unit_rate, Decimal::new(125, 1));

    let report = state
        .ingestion
        .ingest_document(
            Vendor::WorkOrder,
            &unique("WO"),
            None,
            work_order_workbook(&[
                ("WO-1", "Trenching", 4.0, Some(1.0)),
                ("WO-2", "Backfill", 1.0, Some(3.0)),
            ]),
            ACTOR,
        )
        .await
        .unwrap();

    assert_eq!(report.errors.len(), 1);
    let items = db.find_line_items(report.document_id).await.unwrap();
    assert_eq!(items[0].computed_amount, Decimal::from(50));
    assert_eq!(items[1].computed_amount, Decimal::from(3));
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_duplicate_invoice_number_across_units_of_work() {
    let (db, state) = spawn_pg_app().await;

    let report = state
        .ingestion
        .ingest_document(
            Vendor::WorkOrder,
            &unique("WO"),
            None,
            work_order_workbook(&[("WO-9", "Survey", 1.0, Some(100.0))]),
            ACTOR,
        )
        .await
        .unwrap();
    let item = db.find_line_items(report.document_id).await.unwrap().remove(0);

    let number = unique("INV");
    let request = || CreateInvoice {
        invoice_number: number.clone(),
        vendor: Vendor::WorkOrder,
        vat_percentage: Decimal::ZERO,
        ssl_percentage: None,
        lines: vec![InvoiceLineRequest {
            line_item_id: item.line_item_id,
            percentage: Some(Decimal::from(10)),
        }],
    };

    state.invoices.create(request(), ACTOR).await.unwrap();
    let err = state.invoices.create(request(), ACTOR).await.unwrap_err();
    assert!(matches!(err, BoqError::DuplicateInvoiceNumber(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
#[serial]
async fn test_rate_card_replace_waits_for_open_reader() {
    let (db, _) = spawn_pg_app().await;
    let vendor = Vendor::WorkOrder;

    // Replace blocks while an ingestion-style reader holds the card, then proceeds.
    let mut reader = db.begin().await.unwrap();
    reader.read_rate_card(vendor).await.unwrap();

    let writer_db = db.clone();
    let writer = tokio::spawn(async move {
        let mut uow = writer_db.begin().await?;
        uow.replace_rate_card(vendor, &[card_entry(vendor, "WO-LOCK", 7)])
            .await?;
        uow.commit().await
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!writer.is_finished(), "replace ran while the card was being read");

    reader.commit().await.unwrap();
    writer.await.unwrap().unwrap();

    let card = db.find_rate_card(vendor).await.unwrap();
    assert_eq!(card.len(), 1);
    assert_eq!(card[0].code, "WO-LOCK");

    // A reader that outlives lock_timeout turns the replace into a retryable conflict.
    let mut reader = db.begin().await.unwrap();
    reader.read_rate_card(vendor).await.unwrap();

    let mut uow = db.begin().await.unwrap();
    let err = uow
        .replace_rate_card(vendor, &[card_entry(vendor, "WO-LATE", 9)])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Transient(_)), "got {:?}", err);
    drop(uow);
    reader.commit().await.unwrap();

    let card = db.find_rate_card(vendor).await.unwrap();
    assert_eq!(card[0].code, "WO-LOCK");
}
