//! Coarse document type from lexical cues.

use crate::models::document::DocType;

/// Cue table in priority order. The first entry with any cue present wins,
/// wherever the cue appears in the text.
const DOC_TYPE_CUES: [(DocType, &[&str]); 3] = [
    (DocType::Invoice, &["invoice"]),
    (DocType::TaxForm, &["form", "irs"]),
    (DocType::IdCard, &["passport", "identification"]),
];

/// Classify a document by case-insensitive substring cues.
pub fn classify(text: &str) -> DocType {
    let lowered = text.to_lowercase();
    DOC_TYPE_CUES
        .iter()
        .find(|(_, cues)| cues.iter().any(|cue| lowered.contains(cue)))
        .map(|(doc_type, _)| *doc_type)
        .unwrap_or(DocType::Unknown)
}
