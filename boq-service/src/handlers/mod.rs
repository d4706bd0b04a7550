//! HTTP handlers for boq-service.

pub mod context;
pub mod documents;
pub mod invoices;
pub mod rate_card;

pub use context::Actor;

use crate::error::BoqError;
use crate::models::Vendor;
use crate::services::record_error;
use service_core::error::AppError;

/// Resolve a `:vendor` path segment.
pub(crate) fn parse_vendor(key: &str) -> Result<Vendor, BoqError> {
    Vendor::from_key(key).ok_or_else(|| {
        BoqError::Validation(format!(
            "unknown vendor '{}' (expected one of: {})",
            key,
            Vendor::ALL.map(|v| v.as_str()).join(", ")
        ))
    })
}

/// Convert a domain error for the response, counting infrastructure failures.
pub(crate) fn api_error(err: impl Into<BoqError>) -> AppError {
    let err: BoqError = err.into();
    if matches!(err, BoqError::Storage(_) | BoqError::Transient(_)) {
        record_error(err.kind());
    }
    err.into()
}
