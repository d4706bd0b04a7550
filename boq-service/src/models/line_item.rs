//! Source line item model and its invoiced state.

use super::{Vendor, FULL_PERCENTAGE};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// How a line item may be billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingMode {
    /// Billed in slices across many invoices, up to 100% in total.
    Percentage,
    /// Billed exactly once, in full.
    OnceOnly,
}

impl BillingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Percentage => "percentage",
            Self::OnceOnly => "once_only",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "percentage" => Some(Self::Percentage),
            "once_only" => Some(Self::OnceOnly),
            _ => None,
        }
    }
}

impl std::fmt::Display for BillingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where a line item sits in its billing lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPhase {
    Unbilled,
    PartiallyBilled,
    FullyBilled,
}

/// Invoiced state of a line item.
///
/// `Percentage` stays within `0..=100`; `Once` flips to `true` on billing and
/// back to `false` only when the billing invoice is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum InvoicedState {
    Percentage(Decimal),
    Once(bool),
}

impl InvoicedState {
    pub fn unbilled(mode: BillingMode) -> Self {
        match mode {
            BillingMode::Percentage => Self::Percentage(Decimal::ZERO),
            BillingMode::OnceOnly => Self::Once(false),
        }
    }

    pub fn mode(&self) -> BillingMode {
        match self {
            Self::Percentage(_) => BillingMode::Percentage,
            Self::Once(_) => BillingMode::OnceOnly,
        }
    }

    /// Billed share expressed as a percentage (a billed once-only item is 100).
    pub fn invoiced_percentage(&self) -> Decimal {
        match self {
            Self::Percentage(pct) => *pct,
            Self::Once(true) => FULL_PERCENTAGE,
            Self::Once(false) => Decimal::ZERO,
        }
    }

    pub fn phase(&self) -> BillingPhase {
        let pct = self.invoiced_percentage();
        if pct.is_zero() {
            BillingPhase::Unbilled
        } else if pct >= FULL_PERCENTAGE {
            BillingPhase::FullyBilled
        } else {
            BillingPhase::PartiallyBilled
        }
    }
}

/// A billable row of a PO / BOQ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceLineItem {
    pub line_item_id: Uuid,
    pub document_id: Uuid,
    pub vendor: Vendor,
    /// Logical sheet the row was read from.
    pub section: String,
    /// 1-based sheet row, for tracing a line back to the upload.
    pub row_number: i32,
    pub item_code: String,
    pub description: String,
    pub unit_of_measure: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub computed_amount: Decimal,
    pub is_additional_work: bool,
    pub invoiced: InvoicedState,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Database row for `source_line_items`.
#[derive(Debug, Clone, FromRow)]
pub struct LineItemRow {
    pub line_item_id: Uuid,
    pub document_id: Uuid,
    pub vendor: String,
    pub section: String,
    pub row_number: i32,
    pub item_code: String,
    pub description: String,
    pub unit_of_measure: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub computed_amount: Decimal,
    pub is_additional_work: bool,
    pub billing_mode: String,
    pub invoiced_percentage: Decimal,
    pub is_invoiced: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl LineItemRow {
    /// Convert into the domain model; `None` if a stored enum value is unknown.
    pub fn into_domain(self) -> Option<SourceLineItem> {
        let vendor = Vendor::from_key(&self.vendor)?;
        let invoiced = match BillingMode::from_str(&self.billing_mode)? {
            BillingMode::Percentage => InvoicedState::Percentage(self.invoiced_percentage),
            BillingMode::OnceOnly => InvoicedState::Once(self.is_invoiced),
        };

        Some(SourceLineItem {
            line_item_id: self.line_item_id,
            document_id: self.document_id,
            vendor,
            section: self.section,
            row_number: self.row_number,
            item_code: self.item_code,
            description: self.description,
            unit_of_measure: self.unit_of_measure,
            quantity: self.quantity,
            unit_price: self.unit_price,
            computed_amount: self.computed_amount,
            is_additional_work: self.is_additional_work,
            invoiced,
            created_utc: self.created_utc,
            updated_utc: self.updated_utc,
        })
    }
}

impl SourceLineItem {
    /// Column values `(invoiced_percentage, is_invoiced)` for persistence.
    pub fn invoiced_columns(&self) -> (Decimal, bool) {
        match self.invoiced {
            InvoicedState::Percentage(pct) => (pct, false),
            InvoicedState::Once(flag) => (Decimal::ZERO, flag),
        }
    }
}
