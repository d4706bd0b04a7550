//! Rate card model for boq-service.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One priced code on a vendor's rate card.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RateCardEntry {
    pub entry_id: Uuid,
    pub vendor: String,
    pub code: String,
    pub description: String,
    pub unit_rate: Decimal,
    pub uploaded_by: String,
    pub created_utc: DateTime<Utc>,
}

/// Rate card row extracted from a workbook, before persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRateCardEntry {
    pub code: String,
    pub description: String,
    pub unit_rate: Decimal,
}
