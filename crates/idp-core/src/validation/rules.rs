//! Format rules and cross-field consistency rules.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::document::FieldValue;
use crate::normalize::{normalize_amount, normalize_date};

use super::{Level, ValidationMessage};

/// A format rule: a present value of `field` must match `pattern`.
pub struct FormatRule {
    pub field: &'static str,
    pub pattern: Regex,
    pub description: &'static str,
}

lazy_static! {
    /// Format rules, applied in this order.
    pub static ref FORMAT_RULES: Vec<FormatRule> = vec![
        FormatRule {
            field: "invoice_number",
            pattern: Regex::new(r"^INV[- ]?[0-9A-Za-z]+$").unwrap(),
            description: "INV prefix followed by letters or digits",
        },
        FormatRule {
            field: "tax_id",
            pattern: Regex::new(r"^[0-9A-Za-z-]{9,15}$").unwrap(),
            description: "9 to 15 letters, digits or hyphens",
        },
        FormatRule {
            field: "routing_number",
            pattern: Regex::new(r"^[0-9]{9}$").unwrap(),
            description: "exactly 9 digits",
        },
        FormatRule {
            field: "bank_account",
            pattern: Regex::new(r"^[0-9]{6,20}$").unwrap(),
            description: "6 to 20 digits",
        },
        FormatRule {
            field: "id_number",
            pattern: Regex::new(r"^[0-9A-Za-z-]+$").unwrap(),
            description: "letters, digits or hyphens",
        },
    ];
}

pub type Fields = BTreeMap<String, FieldValue>;

/// Present, non-empty value of a field.
fn present<'a>(fields: &'a Fields, name: &str) -> Option<&'a FieldValue> {
    fields.get(name).filter(|v| !v.is_empty())
}

/// Errors for present values that violate their format rule.
pub fn format_checks(fields: &Fields) -> Vec<ValidationMessage> {
    FORMAT_RULES
        .iter()
        .filter_map(|rule| {
            let value = present(fields, rule.field)?;
            if rule.pattern.is_match(&value.as_text()) {
                None
            } else {
                Some(ValidationMessage::error(
                    rule.field,
                    format!("'{}' is not a valid {}: expected {}", value, rule.field, rule.description),
                ))
            }
        })
        .collect()
}

/// Subtotal plus tax must equal the total, exactly.
pub fn totals_check(fields: &Fields) -> Option<ValidationMessage> {
    let subtotal = normalize_amount(present(fields, "subtotal_amount")?)?;
    let tax = normalize_amount(present(fields, "tax_amount")?)?;
    let total = normalize_amount(present(fields, "total_amount")?)?;

    // An overflowing sum cannot equal any representable total.
    if subtotal.checked_add(tax) == Some(total) {
        return None;
    }

    Some(ValidationMessage::error(
        "total_amount",
        format!("subtotal ({}) + tax ({}) != total ({})", subtotal, tax, total),
    ))
}

/// A due date before the invoice date is suspicious but not invalid.
pub fn invoice_dates_check(fields: &Fields) -> Option<ValidationMessage> {
    let invoice_date = normalize_date(present(fields, "invoice_date")?)?;
    let due_date = normalize_date(present(fields, "due_date")?)?;

    (invoice_date > due_date).then(|| {
        ValidationMessage::warning(
            "due_date",
            format!("due date {} is earlier than invoice date {}", due_date, invoice_date),
        )
    })
}

/// An identity document cannot expire before its holder was born.
pub fn identity_dates_check(fields: &Fields) -> Option<ValidationMessage> {
    let expiry = normalize_date(present(fields, "expiry_date")?)?;
    let birth = normalize_date(present(fields, "birth_date")?)?;

    (expiry < birth).then(|| {
        ValidationMessage::error(
            "expiry_date",
            format!("expiry date {} is earlier than birth date {}", expiry, birth),
        )
    })
}

impl ValidationMessage {
    pub fn error(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
            level: Level::Error,
        }
    }

    pub fn warning(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
            level: Level::Warning,
        }
    }
}
