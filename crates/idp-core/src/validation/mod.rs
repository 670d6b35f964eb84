//! Field validation: format rules and cross-field consistency checks.
//!
//! Validation never fails; every problem is reported as a message in the
//! returned summary.

pub mod rules;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::config::ValidationConfig;

pub use rules::{Fields, FORMAT_RULES};

/// Severity of a validation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Error,
    Warning,
}

/// A single validation finding attributed to one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationMessage {
    pub field: String,
    pub message: String,
    pub level: Level,
}

/// Errors and warnings for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub errors: Vec<ValidationMessage>,
    pub warnings: Vec<ValidationMessage>,
}

impl ValidationSummary {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// True when any error names the field. Warnings never count.
    pub fn has_error_for(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }
}

/// Applies format and cross-field rules to raw field values.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    config: ValidationConfig,
}

impl Validator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Validate a field-name to raw-value mapping.
    ///
    /// Errors list format violations first (in rule order), then cross-field
    /// errors. Fields whose values cannot be normalized are left out of the
    /// cross-field checks.
    pub fn validate(&self, fields: &Fields) -> ValidationSummary {
        let mut cross_field = Vec::new();
        if self.config.enforce_totals {
            cross_field.extend(rules::totals_check(fields));
        }
        if self.config.enforce_dates {
            cross_field.extend(rules::invoice_dates_check(fields));
            cross_field.extend(rules::identity_dates_check(fields));
        }

        let mut errors = rules::format_checks(fields);
        let mut warnings = Vec::new();
        for message in cross_field {
            match message.level {
                Level::Error => errors.push(message),
                Level::Warning => warnings.push(message),
            }
        }

        debug!(
            "Validated {} fields: {} errors, {} warnings",
            fields.len(),
            errors.len(),
            warnings.len()
        );

        ValidationSummary { errors, warnings }
    }
}

/// Validate with every rule enabled.
pub fn validate_fields(fields: &Fields) -> ValidationSummary {
    Validator::default().validate(fields)
}
