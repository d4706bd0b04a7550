//! Permissive, locale-agnostic decimal parsing for spreadsheet cells.

use super::workbook::Cell;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Parse a cell as a decimal.
///
/// Numeric cells convert directly. Text is trimmed and stripped of currency
/// codes/symbols and spaces; `,` is a thousands separator unless it is the
/// only separator and is followed by one or two digits, in which case it is
/// the decimal mark. `(12.50)` is negative.
pub fn parse_decimal(cell: &Cell) -> Option<Decimal> {
    match cell {
        Cell::Number(n) => Decimal::from_f64(*n).map(|d| d.normalize()),
        Cell::Text(s) => parse_decimal_str(s),
        Cell::Empty | Cell::Bool(_) => None,
    }
}

pub fn parse_decimal_str(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (negative, body) = match trimmed.strip_prefix('(').and_then(|s| s.strip_suffix(')')) {
        Some(inner) => (true, inner),
        None => (false, trimmed),
    };

    if let Some(mantissa_and_exponent) = scientific(body) {
        let value = Decimal::from_scientific(mantissa_and_exponent).ok()?;
        return Some(if negative { -value } else { value });
    }

    let mut cleaned: String = body
        .split_whitespace()
        .map(strip_currency)
        .collect::<String>()
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-' | '+'))
        .collect();
    if cleaned.is_empty() || !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    if !cleaned.contains('.') && is_decimal_comma(&cleaned) {
        cleaned = cleaned.replace(',', ".");
    } else {
        cleaned.retain(|c| c != ',');
    }

    let value = Decimal::from_str(&cleaned).ok()?;
    Some(if negative { -value } else { value })
}

/// `body` when it is a bare `<mantissa>e<exponent>` literal.
fn scientific(body: &str) -> Option<&str> {
    let (mantissa, exponent) = body.split_once(['e', 'E'])?;
    let mantissa = mantissa.strip_prefix(['-', '+']).unwrap_or(mantissa);
    let exponent = exponent.strip_prefix(['-', '+']).unwrap_or(exponent);

    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
    let digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    let mantissa_ok = !(whole.is_empty() && fraction.is_empty()) && digits(whole) && digits(fraction);
    let exponent_ok = !exponent.is_empty() && digits(exponent);

    (mantissa_ok && exponent_ok).then_some(body)
}

/// Drop a currency code glued to a number (`Rs.450`, `450LKR`, `USD`).
fn strip_currency(token: &str) -> &str {
    let Some(last_alpha) = token.rfind(|c: char| c.is_alphabetic()) else {
        return token;
    };
    let after = &token[last_alpha..];
    let after = after
        .char_indices()
        .nth(1)
        .map(|(i, _)| &after[i..])
        .unwrap_or("")
        .trim_start_matches('.');
    if after.chars().any(|c| c.is_ascii_digit()) {
        return after;
    }
    let first_alpha = token.find(|c: char| c.is_alphabetic()).unwrap_or(0);
    &token[..first_alpha]
}

/// A single comma followed by exactly one or two digits (`12,5`, `3,75`).
fn is_decimal_comma(s: &str) -> bool {
    let mut parts = s.split(',');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(frac), None) => {
            (1..=2).contains(&frac.len()) && frac.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}
