//! Rate-card lookup and line-item pricing.

use crate::models::RateCardEntry;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Case-insensitive code -> unit rate lookup, built once per ingestion run.
#[derive(Debug, Clone, Default)]
pub struct RateCardIndex {
    rates: HashMap<String, Decimal>,
}

impl RateCardIndex {
    pub fn build(entries: &[RateCardEntry]) -> Self {
        let rates = entries
            .iter()
            .map(|e| (normalize_code(&e.code), e.unit_rate))
            .collect();
        Self { rates }
    }

    pub fn rate_for(&self, code: &str) -> Option<Decimal> {
        self.rates.get(&normalize_code(code)).copied()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

pub(crate) fn normalize_code(code: &str) -> String {
    code.trim().to_lowercase()
}

/// Price resolved for one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pricing {
    pub unit_price: Decimal,
    pub computed_amount: Decimal,
    /// True when the rate card supplied the price.
    pub matched: bool,
}

/// Joins extracted rows with the rate card.
pub struct LineItemEnricher<'a> {
    index: &'a RateCardIndex,
    unmatched: Vec<String>,
}

impl<'a> LineItemEnricher<'a> {
    pub fn new(index: &'a RateCardIndex) -> Self {
        Self {
            index,
            unmatched: Vec::new(),
        }
    }

    /// A rate-card match wins over the sheet price; without a match the sheet
    /// price is kept, falling back to zero.
    ///
    /// Returns `None` when `quantity × unit_price` does not fit in a decimal.
    pub fn price(
        &mut self,
        code: &str,
        quantity: Decimal,
        sheet_price: Option<Decimal>,
    ) -> Option<Pricing> {
        let rate = self.index.rate_for(code);
        let unit_price = rate.or(sheet_price).unwrap_or(Decimal::ZERO);
        let computed_amount = quantity.checked_mul(unit_price)?;

        if rate.is_none() && !self.unmatched.iter().any(|c| c == code) {
            self.unmatched.push(code.to_string());
        }

        Some(Pricing {
            unit_price,
            computed_amount,
            matched: rate.is_some(),
        })
    }

    /// Codes that had no rate-card entry, in first-seen order.
    pub fn into_unmatched(self) -> Vec<String> {
        self.unmatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn entry(code: &str, rate: i64) -> RateCardEntry {
        RateCardEntry {
            entry_id: Uuid::new_v4(),
            vendor: "service-po".to_string(),
            code: code.to_string(),
            description: String::new(),
            unit_rate: Decimal::from(rate),
            uploaded_by: "tester".to_string(),
            created_utc: Utc::now(),
        }
    }

    #[test]
    fn test_lookup_ignores_case_and_padding() {
        let index = RateCardIndex::build(&[entry("SVC-001", 250)]);
        assert_eq!(index.rate_for(" svc-001 "), Some(Decimal::from(250)));
        assert_eq!(index.rate_for("SVC-002"), None);
    }

    #[test]
    fn test_rate_card_overrides_sheet_price() {
        let index = RateCardIndex::build(&[entry("SVC-001", 250)]);
        let mut enricher = LineItemEnricher::new(&index);

        let pricing = enricher
            .price("svc-001", Decimal::from(4), Some(Decimal::from(999)))
            .unwrap();
        assert_eq!(pricing.unit_price, Decimal::from(250));
        assert_eq!(pricing.computed_amount, Decimal::from(1000));
        assert!(pricing.matched);
        assert!(enricher.into_unmatched().is_empty());
    }

    #[test]
    fn test_unmatched_code_falls_back() {
        let index = RateCardIndex::default();
        let mut enricher = LineItemEnricher::new(&index);

        let with_sheet = enricher
            .price("X-1", Decimal::from(3), Some(Decimal::from(7)))
            .unwrap();
        assert_eq!(with_sheet.computed_amount, Decimal::from(21));

        let without = enricher.price("X-2", Decimal::from(3), None).unwrap();
        assert_eq!(without.unit_price, Decimal::ZERO);
        assert_eq!(without.computed_amount, Decimal::ZERO);

        enricher.price("X-1", Decimal::ONE, None);
        assert_eq!(enricher.into_unmatched(), vec!["X-1", "X-2"]);
    }

    #[test]
    fn test_amount_overflow_is_not_priced() {
        let index = RateCardIndex::default();
        let mut enricher = LineItemEnricher::new(&index);
        let huge = Decimal::from(1_000_000_000_000_000i64);

        assert_eq!(enricher.price("BIG-1", huge, Some(huge)), None);
        assert!(enricher.into_unmatched().is_empty());
    }
}
