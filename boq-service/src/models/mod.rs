//! Domain models for boq-service.

mod document;
mod invoice;
mod line_item;
mod rate_card;
mod vendor;

pub use document::SourceDocument;
pub use invoice::{
    CreateInvoice, Invoice, InvoiceLine, InvoiceLineRequest, InvoiceLineRow, InvoiceRow,
    ListInvoicesFilter,
};
pub use line_item::{BillingMode, BillingPhase, InvoicedState, LineItemRow, SourceLineItem};
pub use rate_card::{NewRateCardEntry, RateCardEntry};
pub use vendor::Vendor;

use rust_decimal::{Decimal, RoundingStrategy};

/// Percentage that represents a fully billed line item.
pub const FULL_PERCENTAGE: Decimal = Decimal::ONE_HUNDRED;

/// Round a monetary amount to cents, half away from zero.
pub fn round_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// `amount × percentage / 100`, rounded to cents. `None` on overflow.
pub fn percentage_of(amount: Decimal, percentage: Decimal) -> Option<Decimal> {
    let scaled = amount.checked_mul(percentage)?;
    scaled.checked_div(FULL_PERCENTAGE).map(round_money)
}
