//! Canonical numeric and date forms of raw field values.
//!
//! Pure functions used by cross-field validation. Raw captures stay untouched
//! in the field candidates; these conversions are re-derived on demand.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::models::document::FieldValue;

/// Date formats tried in order. Ambiguous day/month inputs resolve to the
/// first format that parses, not by locale.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y"];

/// Characters removed from amounts before parsing.
const AMOUNT_NOISE: [char; 4] = [',', '$', '€', '£'];

/// Parse an amount, ignoring thousands separators and currency symbols.
///
/// Numeric values are returned as they are.
pub fn normalize_amount(value: &FieldValue) -> Option<Decimal> {
    match value {
        FieldValue::Number(n) => Some(*n),
        FieldValue::Text(raw) => parse_amount(raw),
    }
}

/// Parse a raw amount string such as `"$1,234.50"`.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw.chars().filter(|c| !AMOUNT_NOISE.contains(c)).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(cleaned).ok()
}

/// Parse a date in one of the supported formats.
pub fn normalize_date(value: &FieldValue) -> Option<NaiveDate> {
    match value {
        FieldValue::Text(raw) => parse_date(raw),
        FieldValue::Number(_) => None,
    }
}

/// Parse a raw date string, trying `YYYY-MM-DD`, `DD/MM/YYYY`, `MM/DD/YYYY`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}
