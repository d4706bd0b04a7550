//! Services module for boq-service.

pub mod database;
pub mod ingestion;
pub mod metrics;

pub use database::{Database, PgUnitOfWork};
pub use ingestion::{IngestionReport, IngestionService, RateCardReport};
pub use metrics::{get_metrics, init_metrics, record_error};
