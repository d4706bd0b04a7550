//! PostgreSQL repository for boq-service.

use crate::models::{
    Invoice, InvoiceLineRow, InvoiceRow, LineItemRow, ListInvoicesFilter, RateCardEntry,
    SourceDocument, SourceLineItem, Vendor,
};
use crate::repository::{Repository, StoreError, UnitOfWork};
use crate::services::metrics::DB_QUERY_DURATION;
use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{PgExecutor, Postgres, QueryBuilder, Transaction};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

const RATE_CARD_COLUMNS: &str =
    "entry_id, vendor, code, description, unit_rate, uploaded_by, created_utc";

const DOCUMENT_COLUMNS: &str = "document_id, vendor, reference, file_name, uploaded_by, \
     line_item_count, created_utc, updated_utc";

const LINE_ITEM_COLUMNS: &str = "line_item_id, document_id, vendor, section, row_number, \
     item_code, description, unit_of_measure, quantity, unit_price, computed_amount, \
     is_additional_work, billing_mode, invoiced_percentage, is_invoiced, created_utc, updated_utc";

const INVOICE_COLUMNS: &str = "invoice_id, invoice_number, vendor, vat_percentage, vat_amount, \
     ssl_percentage, ssl_amount, subtotal, total, created_by, created_utc";

const INVOICE_LINE_COLUMNS: &str =
    "invoice_line_id, invoice_id, line_item_id, item_code, billed_percentage, line_amount, sort_order";

// Postgres caps a statement at 65535 bind parameters.
const LINE_ITEM_BATCH: usize = 1000;
const RATE_CARD_BATCH: usize = 5000;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    lock_timeout_ms: u64,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "boq-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self {
            pool,
            lock_timeout_ms: 5000,
        })
    }

    /// Bound how long a unit of work waits for a row or table lock.
    pub fn with_lock_timeout(mut self, lock_timeout_ms: u64) -> Self {
        self.lock_timeout_ms = lock_timeout_ms;
        self
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl Repository for Database {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::from_sqlx("begin transaction", e))?;

        // SET cannot take bind parameters.
        sqlx::query(&format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout_ms))
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::from_sqlx("set lock_timeout", e))?;

        Ok(Box::new(PgUnitOfWork { tx }))
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("health check", e))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self), fields(vendor = %vendor))]
    async fn find_rate_card(&self, vendor: Vendor) -> Result<Vec<RateCardEntry>, StoreError> {
        fetch_rate_card(&self.pool, vendor).await
    }

    #[instrument(skip(self), fields(document_id = %document_id))]
    async fn find_document(
        &self,
        document_id: Uuid,
    ) -> Result<Option<SourceDocument>, StoreError> {
        sqlx::query_as::<_, SourceDocument>(&format!(
            "SELECT {} FROM source_documents WHERE document_id = $1",
            DOCUMENT_COLUMNS
        ))
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("find document", e))
    }

    #[instrument(skip(self), fields(document_id = %document_id))]
    async fn find_line_items(
        &self,
        document_id: Uuid,
    ) -> Result<Vec<SourceLineItem>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["find_line_items"])
            .start_timer();

        let rows = sqlx::query_as::<_, LineItemRow>(&format!(
            "SELECT {} FROM source_line_items WHERE document_id = $1 ORDER BY section, row_number",
            LINE_ITEM_COLUMNS
        ))
        .bind(document_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("find line items", e))?;

        timer.observe_duration();
        line_items_from_rows(rows)
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn find_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, StoreError> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {} FROM invoices WHERE invoice_id = $1",
            INVOICE_COLUMNS
        ))
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("find invoice", e))?;

        match row {
            Some(row) => {
                let mut lines = fetch_invoice_lines(&self.pool, &[invoice_id]).await?;
                let lines = lines.remove(&invoice_id).unwrap_or_default();
                invoice_from_row(row, lines).map(Some)
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn list_invoices(
        &self,
        filter: &ListInvoicesFilter,
    ) -> Result<Vec<Invoice>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            r#"
            SELECT {} FROM invoices
            WHERE ($1::text IS NULL OR vendor = $1)
              AND ($2::uuid IS NULL OR invoice_id > $2)
            ORDER BY invoice_id
            LIMIT $3
            "#,
            INVOICE_COLUMNS
        ))
        .bind(filter.vendor.map(|v| v.as_str()))
        .bind(filter.page_token)
        .bind(i64::from(filter.page_size.clamp(1, 100)))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("list invoices", e))?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.invoice_id).collect();
        let mut lines = fetch_invoice_lines(&self.pool, &ids).await?;

        let invoices = rows
            .into_iter()
            .map(|row| {
                let row_lines = lines.remove(&row.invoice_id).unwrap_or_default();
                invoice_from_row(row, row_lines)
            })
            .collect::<Result<Vec<_>, _>>()?;

        timer.observe_duration();
        Ok(invoices)
    }
}

/// A transaction with `lock_timeout` set. Dropping it rolls back.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn read_rate_card(&mut self, vendor: Vendor) -> Result<Vec<RateCardEntry>, StoreError> {
        // Conflicts with the SHARE ROW EXCLUSIVE lock taken by a replace.
        sqlx::query("LOCK TABLE rate_card_entries IN SHARE MODE")
            .execute(&mut *self.tx)
            .await
            .map_err(|e| StoreError::from_sqlx("lock rate card for read", e))?;

        fetch_rate_card(&mut *self.tx, vendor).await
    }

    #[instrument(skip(self, entries), fields(vendor = %vendor, count = entries.len()))]
    async fn replace_rate_card(
        &mut self,
        vendor: Vendor,
        entries: &[RateCardEntry],
    ) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["replace_rate_card"])
            .start_timer();

        sqlx::query("LOCK TABLE rate_card_entries IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *self.tx)
            .await
            .map_err(|e| StoreError::from_sqlx("lock rate card for replace", e))?;

        let deleted = sqlx::query("DELETE FROM rate_card_entries WHERE vendor = $1")
            .bind(vendor.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| StoreError::from_sqlx("delete rate card", e))?
            .rows_affected();

        for chunk in entries.chunks(RATE_CARD_BATCH) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO rate_card_entries ({}) ",
                RATE_CARD_COLUMNS
            ));
            builder.push_values(chunk, |mut b, entry| {
                b.push_bind(entry.entry_id)
                    .push_bind(&entry.vendor)
                    .push_bind(&entry.code)
                    .push_bind(&entry.description)
                    .push_bind(entry.unit_rate)
                    .push_bind(&entry.uploaded_by)
                    .push_bind(entry.created_utc);
            });
            builder
                .build()
                .execute(&mut *self.tx)
                .await
                .map_err(|e| StoreError::from_sqlx("insert rate card", e))?;
        }

        timer.observe_duration();
        info!(deleted = deleted, inserted = entries.len(), "Rate card rows replaced");
        Ok(())
    }

    #[instrument(skip(self), fields(vendor = %vendor))]
    async fn upsert_document(
        &mut self,
        vendor: Vendor,
        reference: &str,
        file_name: Option<&str>,
        uploaded_by: &str,
    ) -> Result<SourceDocument, StoreError> {
        sqlx::query_as::<_, SourceDocument>(&format!(
            r#"
            INSERT INTO source_documents (document_id, vendor, reference, file_name, uploaded_by)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (vendor, reference) DO UPDATE
               SET file_name = EXCLUDED.file_name,
                   uploaded_by = EXCLUDED.uploaded_by,
                   updated_utc = NOW()
            RETURNING {}
            "#,
            DOCUMENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(vendor.as_str())
        .bind(reference)
        .bind(file_name)
        .bind(uploaded_by)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx("upsert document", e))
    }

    #[instrument(skip(self, items), fields(document_id = %document_id, count = items.len()))]
    async fn replace_line_items(
        &mut self,
        document_id: Uuid,
        items: &[SourceLineItem],
    ) -> Result<u64, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["replace_line_items"])
            .start_timer();

        let billed_discarded: i64 = sqlx::query_scalar(
            r#"
            WITH removed AS (
                DELETE FROM source_line_items WHERE document_id = $1
                RETURNING invoiced_percentage, is_invoiced
            )
            SELECT COUNT(*) FROM removed WHERE invoiced_percentage > 0 OR is_invoiced
            "#,
        )
        .bind(document_id)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx("delete line items", e))?;

        for chunk in items.chunks(LINE_ITEM_BATCH) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO source_line_items ({}) ",
                LINE_ITEM_COLUMNS
            ));
            builder.push_values(chunk, |mut b, item| {
                let (invoiced_percentage, is_invoiced) = item.invoiced_columns();
                b.push_bind(item.line_item_id)
                    .push_bind(item.document_id)
                    .push_bind(item.vendor.as_str())
                    .push_bind(&item.section)
                    .push_bind(item.row_number)
                    .push_bind(&item.item_code)
                    .push_bind(&item.description)
                    .push_bind(&item.unit_of_measure)
                    .push_bind(item.quantity)
                    .push_bind(item.unit_price)
                    .push_bind(item.computed_amount)
                    .push_bind(item.is_additional_work)
                    .push_bind(item.invoiced.mode().as_str())
                    .push_bind(invoiced_percentage)
                    .push_bind(is_invoiced)
                    .push_bind(item.created_utc)
                    .push_bind(item.updated_utc);
            });
            builder
                .build()
                .execute(&mut *self.tx)
                .await
                .map_err(|e| StoreError::from_sqlx("insert line items", e))?;
        }

        sqlx::query(
            "UPDATE source_documents SET line_item_count = $2, updated_utc = NOW() WHERE document_id = $1",
        )
        .bind(document_id)
        .bind(items.len() as i32)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx("update line item count", e))?;

        timer.observe_duration();
        Ok(billed_discarded.max(0) as u64)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn lock_line_items(&mut self, ids: &[Uuid]) -> Result<Vec<SourceLineItem>, StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["lock_line_items"])
            .start_timer();

        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();

        // Ordered so concurrent invoices acquire row locks in the same order.
        let rows = sqlx::query_as::<_, LineItemRow>(&format!(
            r#"
            SELECT {} FROM source_line_items
            WHERE line_item_id = ANY($1)
            ORDER BY line_item_id
            FOR UPDATE
            "#,
            LINE_ITEM_COLUMNS
        ))
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx("lock line items", e))?;

        timer.observe_duration();
        line_items_from_rows(rows)
    }

    async fn save_invoiced_state(&mut self, item: &SourceLineItem) -> Result<(), StoreError> {
        let (invoiced_percentage, is_invoiced) = item.invoiced_columns();
        let updated = sqlx::query(
            r#"
            UPDATE source_line_items
               SET invoiced_percentage = $2, is_invoiced = $3, updated_utc = NOW()
             WHERE line_item_id = $1
            "#,
        )
        .bind(item.line_item_id)
        .bind(invoiced_percentage)
        .bind(is_invoiced)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx("save invoiced state", e))?
        .rows_affected();

        if updated == 0 {
            return Err(StoreError::Corrupt(format!(
                "line item {} vanished while locked",
                item.line_item_id
            )));
        }
        Ok(())
    }

    async fn invoice_number_exists(&mut self, invoice_number: &str) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM invoices WHERE invoice_number = $1)",
        )
        .bind(invoice_number)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx("check invoice number", e))
    }

    #[instrument(skip(self, invoice), fields(invoice_id = %invoice.invoice_id))]
    async fn insert_invoice(&mut self, invoice: &Invoice) -> Result<(), StoreError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_invoice"])
            .start_timer();

        sqlx::query(&format!(
            "INSERT INTO invoices ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            INVOICE_COLUMNS
        ))
        .bind(invoice.invoice_id)
        .bind(&invoice.invoice_number)
        .bind(invoice.vendor.as_str())
        .bind(invoice.vat_percentage)
        .bind(invoice.vat_amount)
        .bind(invoice.ssl_percentage)
        .bind(invoice.ssl_amount)
        .bind(invoice.subtotal)
        .bind(invoice.total)
        .bind(&invoice.created_by)
        .bind(invoice.created_utc)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx("insert invoice", e))?;

        if !invoice.lines.is_empty() {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO invoice_lines ({}) ",
                INVOICE_LINE_COLUMNS
            ));
            builder.push_values(&invoice.lines, |mut b, line| {
                b.push_bind(line.invoice_line_id)
                    .push_bind(invoice.invoice_id)
                    .push_bind(line.line_item_id)
                    .push_bind(&line.item_code)
                    .push_bind(line.billed_percentage)
                    .push_bind(line.line_amount)
                    .push_bind(line.sort_order);
            });
            builder
                .build()
                .execute(&mut *self.tx)
                .await
                .map_err(|e| StoreError::from_sqlx("insert invoice lines", e))?;
        }

        timer.observe_duration();
        Ok(())
    }

    async fn lock_invoice(&mut self, invoice_id: Uuid) -> Result<Option<Invoice>, StoreError> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {} FROM invoices WHERE invoice_id = $1 FOR UPDATE",
            INVOICE_COLUMNS
        ))
        .bind(invoice_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx("lock invoice", e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut lines = fetch_invoice_lines(&mut *self.tx, &[invoice_id]).await?;
        let lines = lines.remove(&invoice_id).unwrap_or_default();
        invoice_from_row(row, lines).map(Some)
    }

    async fn delete_invoice(&mut self, invoice_id: Uuid) -> Result<(), StoreError> {
        // invoice_lines go with it (ON DELETE CASCADE).
        sqlx::query("DELETE FROM invoices WHERE invoice_id = $1")
            .bind(invoice_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| StoreError::from_sqlx("delete invoice", e))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| StoreError::from_sqlx("commit", e))
    }
}

async fn fetch_rate_card<'e, E: PgExecutor<'e>>(
    executor: E,
    vendor: Vendor,
) -> Result<Vec<RateCardEntry>, StoreError> {
    sqlx::query_as::<_, RateCardEntry>(&format!(
        "SELECT {} FROM rate_card_entries WHERE vendor = $1 ORDER BY code",
        RATE_CARD_COLUMNS
    ))
    .bind(vendor.as_str())
    .fetch_all(executor)
    .await
    .map_err(|e| StoreError::from_sqlx("read rate card", e))
}

async fn fetch_invoice_lines<'e, E: PgExecutor<'e>>(
    executor: E,
    invoice_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<InvoiceLineRow>>, StoreError> {
    if invoice_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = sqlx::query_as::<_, InvoiceLineRow>(&format!(
        "SELECT {} FROM invoice_lines WHERE invoice_id = ANY($1) ORDER BY invoice_id, sort_order",
        INVOICE_LINE_COLUMNS
    ))
    .bind(invoice_ids)
    .fetch_all(executor)
    .await
    .map_err(|e| StoreError::from_sqlx("read invoice lines", e))?;

    let mut grouped: HashMap<Uuid, Vec<InvoiceLineRow>> = HashMap::new();
    for row in rows {
        grouped.entry(row.invoice_id).or_default().push(row);
    }
    Ok(grouped)
}

fn line_items_from_rows(rows: Vec<LineItemRow>) -> Result<Vec<SourceLineItem>, StoreError> {
    rows.into_iter()
        .map(|row| {
            let id = row.line_item_id;
            row.into_domain().ok_or_else(|| {
                StoreError::Corrupt(format!(
                    "line item {} has an unknown vendor or billing mode",
                    id
                ))
            })
        })
        .collect()
}

fn invoice_from_row(row: InvoiceRow, lines: Vec<InvoiceLineRow>) -> Result<Invoice, StoreError> {
    let id = row.invoice_id;
    row.into_domain(lines)
        .ok_or_else(|| StoreError::Corrupt(format!("invoice {} has an unknown vendor", id)))
}
