//! Vendor variants and their billing conventions.

use super::BillingMode;
use serde::{Deserialize, Serialize};

/// Vendor whose documents this service ingests.
///
/// Each vendor ships a different workbook template and bills line items
/// differently; the template contract lives in `ingestion::layouts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Vendor {
    /// Service purchase orders billed by percentage, with SSL.
    ServicePo,
    /// Material bills of quantities billed once, in full.
    MaterialBoq,
    /// Work orders billed by percentage, without SSL.
    WorkOrder,
}

impl Vendor {
    pub const ALL: [Vendor; 3] = [Vendor::ServicePo, Vendor::MaterialBoq, Vendor::WorkOrder];

    /// Get string representation for database and URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServicePo => "service-po",
            Self::MaterialBoq => "material-boq",
            Self::WorkOrder => "work-order",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            "service-po" => Some(Self::ServicePo),
            "material-boq" => Some(Self::MaterialBoq),
            "work-order" => Some(Self::WorkOrder),
            _ => None,
        }
    }

    pub fn billing_mode(&self) -> BillingMode {
        match self {
            Self::ServicePo | Self::WorkOrder => BillingMode::Percentage,
            Self::MaterialBoq => BillingMode::OnceOnly,
        }
    }

    /// Whether invoices for this vendor carry a social security levy.
    pub fn supports_ssl(&self) -> bool {
        matches!(self, Self::ServicePo)
    }
}

impl std::fmt::Display for Vendor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
