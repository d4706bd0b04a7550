//! Invoiced-state transitions for a single line item.

use crate::models::{BillingMode, InvoicedState, FULL_PERCENTAGE};
use rust_decimal::Decimal;
use thiserror::Error;

/// Why a billing request cannot be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LedgerRejection {
    #[error("currently invoiced {currently_invoiced}%, requested {requested}%")]
    OverLimit {
        currently_invoiced: Decimal,
        requested: Decimal,
    },

    #[error("line item is billed by {actual}, not {expected}")]
    ModeMismatch {
        expected: BillingMode,
        actual: BillingMode,
    },
}

/// Billing rules of one [`BillingMode`].
///
/// `apply` re-checks `can_apply` against the state it is handed, so the
/// caller only has to make sure that state was read under the item's lock.
pub trait BillingLedger: Send + Sync {
    fn mode(&self) -> BillingMode;

    /// Whether `requested` percent can be added to `state`.
    fn can_apply(&self, state: &InvoicedState, requested: Decimal) -> bool;

    /// New state after billing `requested` percent.
    fn apply(&self, state: &InvoicedState, requested: Decimal)
        -> Result<InvoicedState, LedgerRejection>;

    /// New state after undoing `applied` percent. Never fails and never
    /// goes below unbilled.
    fn reverse(&self, state: &InvoicedState, applied: Decimal) -> InvoicedState;
}

/// Accumulates percentages up to 100.
#[derive(Debug, Clone, Copy, Default)]
pub struct PercentageLedger;

/// A single full billing per cycle.
#[derive(Debug, Clone, Copy, Default)]
pub struct OnceOnlyLedger;

static PERCENTAGE: PercentageLedger = PercentageLedger;
static ONCE_ONLY: OnceOnlyLedger = OnceOnlyLedger;

pub fn ledger_for(mode: BillingMode) -> &'static dyn BillingLedger {
    match mode {
        BillingMode::Percentage => &PERCENTAGE,
        BillingMode::OnceOnly => &ONCE_ONLY,
    }
}

fn mode_mismatch(expected: BillingMode, state: &InvoicedState) -> LedgerRejection {
    LedgerRejection::ModeMismatch {
        expected,
        actual: state.mode(),
    }
}

impl BillingLedger for PercentageLedger {
    fn mode(&self) -> BillingMode {
        BillingMode::Percentage
    }

    fn can_apply(&self, state: &InvoicedState, requested: Decimal) -> bool {
        match state {
            InvoicedState::Percentage(current) => {
                requested > Decimal::ZERO && *current + requested <= FULL_PERCENTAGE
            }
            InvoicedState::Once(_) => false,
        }
    }

    fn apply(
        &self,
        state: &InvoicedState,
        requested: Decimal,
    ) -> Result<InvoicedState, LedgerRejection> {
        let InvoicedState::Percentage(current) = state else {
            return Err(mode_mismatch(self.mode(), state));
        };
        if !self.can_apply(state, requested) {
            return Err(LedgerRejection::OverLimit {
                currently_invoiced: *current,
                requested,
            });
        }
        Ok(InvoicedState::Percentage(*current + requested))
    }

    fn reverse(&self, state: &InvoicedState, applied: Decimal) -> InvoicedState {
        match state {
            InvoicedState::Percentage(current) => {
                InvoicedState::Percentage((*current - applied).max(Decimal::ZERO))
            }
            // Stored state disagrees with the ledger; reverse what is there.
            InvoicedState::Once(_) => InvoicedState::Once(false),
        }
    }
}

impl BillingLedger for OnceOnlyLedger {
    fn mode(&self) -> BillingMode {
        BillingMode::OnceOnly
    }

    fn can_apply(&self, state: &InvoicedState, _requested: Decimal) -> bool {
        matches!(state, InvoicedState::Once(false))
    }

    fn apply(
        &self,
        state: &InvoicedState,
        requested: Decimal,
    ) -> Result<InvoicedState, LedgerRejection> {
        match state {
            InvoicedState::Once(false) => Ok(InvoicedState::Once(true)),
            InvoicedState::Once(true) => Err(LedgerRejection::OverLimit {
                currently_invoiced: FULL_PERCENTAGE,
                requested,
            }),
            InvoicedState::Percentage(_) => Err(mode_mismatch(self.mode(), state)),
        }
    }

    fn reverse(&self, state: &InvoicedState, applied: Decimal) -> InvoicedState {
        match state {
            InvoicedState::Once(_) => InvoicedState::Once(false),
            InvoicedState::Percentage(current) => {
                InvoicedState::Percentage((*current - applied).max(Decimal::ZERO))
            }
        }
    }
}
