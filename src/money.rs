//! Minor-unit money helpers.
//!
//! All amounts are carried internally as integer minor units (i64). Decimal
//! formatting happens only at the payment-gateway boundary, which expects
//! two-decimal strings and rejects price/paid-price mismatches.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Formats minor units as a two-decimal string, e.g. `12345` -> `"123.45"`.
pub fn format_minor(minor: i64) -> String {
    Decimal::new(minor, 2).to_string()
}

/// Parses a decimal string back into minor units. Amounts with more than two
/// fractional digits are rejected rather than silently rounded.
pub fn parse_minor(text: &str) -> Option<i64> {
    let value: Decimal = text.trim().parse().ok()?;
    let scaled = value * Decimal::new(100, 0);
    if scaled.fract() != Decimal::ZERO {
        return None;
    }
    scaled.to_i64()
}

/// `percent` of `amount`, rounded half-up in minor units.
pub fn percent_of(amount: i64, percent: i64) -> i64 {
    (amount * percent + 50) / 100
}

/// Reduces `amount` by `percent`, floored at zero.
pub fn apply_percent_discount(amount: i64, percent: i64) -> i64 {
    (amount - percent_of(amount, percent)).max(0)
}
