//! Heuristic field rules: one pattern per field name.

use lazy_static::lazy_static;
use regex::Regex;

/// Confidence assigned to keyword-anchored matches.
pub const HEURISTIC_CONFIDENCE: f32 = 0.6;

/// Confidence assigned to the looser name-like matches.
pub const NAME_CONFIDENCE: f32 = 0.55;

/// Characters stripped from monetary captures.
const MONEY_NOISE: [char; 4] = [',', '$', '€', '£'];

/// How a captured value is post-processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Amounts: separators, currency symbols and whitespace removed. Still a string.
    Monetary,
    /// Identifiers, dates, MRZ lines: captured text, trimmed.
    Text,
    /// Party names: captured text, trimmed.
    Name,
}

impl FieldKind {
    /// Post-process a raw capture.
    pub fn clean(&self, raw: &str) -> String {
        match self {
            FieldKind::Monetary => raw
                .chars()
                .filter(|c| !MONEY_NOISE.contains(c) && !c.is_whitespace())
                .collect(),
            FieldKind::Text | FieldKind::Name => raw.trim().to_string(),
        }
    }
}

/// A field rule: name, pattern with a single capturing group, post-processing.
pub struct FieldRule {
    pub name: &'static str,
    pub kind: FieldKind,
    pub pattern: Regex,
    pub confidence: f32,
}

impl FieldRule {
    fn new(name: &'static str, kind: FieldKind, pattern: &str) -> Self {
        let confidence = match kind {
            FieldKind::Name => NAME_CONFIDENCE,
            _ => HEURISTIC_CONFIDENCE,
        };
        Self {
            name,
            kind,
            // Every rule is case-insensitive and multi-line
            pattern: Regex::new(&format!("(?im){}", pattern)).unwrap(),
            confidence,
        }
    }
}

const AMOUNT: &str = r"([$€£]?\s?[0-9,.]+)";
const DATE: &str = r"([0-9]{4}-[0-9]{2}-[0-9]{2}|[0-9]{2}/[0-9]{2}/[0-9]{4})";
const NAME: &str = r"([A-Za-z][A-Za-z .,&'\t-]*)$";

lazy_static! {
    /// Field rules in evaluation order.
    pub static ref FIELD_RULES: Vec<FieldRule> = vec![
        FieldRule::new("invoice_number", FieldKind::Text, r"\binvoice\s*(?:no\.?|number)[:\s]*([A-Za-z0-9-]+)"),
        FieldRule::new("total_amount", FieldKind::Monetary, &format!(r"\btotal\s*(?:due|amount)?[:\s]*{AMOUNT}")),
        FieldRule::new("tax_amount", FieldKind::Monetary, &format!(r"\btax(?:\s*amount)?[:\s]*{AMOUNT}")),
        FieldRule::new("subtotal_amount", FieldKind::Monetary, &format!(r"\bsubtotal[:\s]*{AMOUNT}")),
        FieldRule::new("invoice_date", FieldKind::Text, &format!(r"\binvoice\s*date[:\s]*{DATE}")),
        FieldRule::new("due_date", FieldKind::Text, &format!(r"\bdue\s*date[:\s]*{DATE}")),
        FieldRule::new("tax_id", FieldKind::Text, r"\btax\s*(?:id|number)[:\s]*([A-Za-z0-9-]+)"),
        FieldRule::new("routing_number", FieldKind::Text, r"\brouting\s*(?:no\.?|number)[:\s]*([0-9]{9})"),
        FieldRule::new("bank_account", FieldKind::Text, r"\baccount\s*(?:number|no\.?)[:\s]*([0-9]{6,20})"),
        FieldRule::new("id_number", FieldKind::Text, r"\bid\s*(?:no\.?|number)[:\s]*([A-Za-z0-9-]+)"),
        FieldRule::new("mrz_line1", FieldKind::Text, r"^([A-Z0-9<]{30})\n"),
        FieldRule::new("mrz_line2", FieldKind::Text, r"^[A-Z0-9<]{30}\n([A-Z0-9<]{30})$"),
        FieldRule::new("customer_name", FieldKind::Name, &format!(r"\b(?:bill\s*to|customer)[:\s]*{NAME}")),
        FieldRule::new("vendor_name", FieldKind::Name, &format!(r"\b(?:from|seller)[:\s]*{NAME}")),
    ];
}

/// A rule match: cleaned value plus where the raw capture sits in the text.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub value: String,
    pub raw: String,
    pub offset: usize,
}

impl FieldRule {
    /// First match in document order, if any.
    pub fn apply(&self, text: &str) -> Option<RuleMatch> {
        let caps = self.pattern.captures(text)?;
        let group = caps.get(1)?;
        let value = self.kind.clean(group.as_str());
        if value.is_empty() {
            return None;
        }
        Some(RuleMatch {
            value,
            raw: group.as_str().trim().to_string(),
            offset: group.start(),
        })
    }
}

/// Look up a rule by field name.
pub fn rule(name: &str) -> Option<&'static FieldRule> {
    FIELD_RULES.iter().find(|r| r.name == name)
}
