//! Field detection: heuristic rules merged with optional model candidates.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::debug;

use crate::models::config::LayoutConfig;
use crate::models::document::{AssembledDocument, BBox, CandidateSource, FieldCandidate};
use crate::source::PageImage;

use super::enrichment::Enrichment;
use super::rules::{FieldRule, FIELD_RULES};

/// Produces one candidate per recognized field name.
#[derive(Debug, Default)]
pub struct FieldDetector {
    enrichment: Enrichment,
    confidence_threshold: f32,
}

impl FieldDetector {
    pub fn new(enrichment: Enrichment, config: &LayoutConfig) -> Self {
        Self {
            enrichment,
            confidence_threshold: config.confidence_threshold,
        }
    }

    pub fn has_model(&self) -> bool {
        self.enrichment.is_available()
    }

    /// Detect fields in an assembled document.
    ///
    /// Model candidates whose confidence exceeds the threshold replace the
    /// heuristic candidate of the same name; the rest, NaN included, are
    /// dropped.
    pub fn detect(&self, doc: &AssembledDocument, pages: &[PageImage]) -> BTreeMap<String, FieldCandidate> {
        let mut fields: BTreeMap<String, FieldCandidate> = heuristic_candidates(doc)
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();
        let heuristic_count = fields.len();

        let mut model_count = 0;
        for candidate in self.enrichment.infer(&doc.full_text, pages) {
            if candidate.confidence.partial_cmp(&self.confidence_threshold) != Some(Ordering::Greater) {
                debug!(
                    "Dropping model candidate '{}' ({:.2} <= {:.2})",
                    candidate.name, candidate.confidence, self.confidence_threshold
                );
                continue;
            }
            // One model candidate per field, the first one reported
            if fields
                .get(&candidate.name)
                .is_some_and(|c| c.source == CandidateSource::Model)
            {
                continue;
            }
            model_count += 1;
            fields.insert(candidate.name.clone(), candidate);
        }

        debug!(
            "Detected {} fields ({} heuristic matches, {} model overrides)",
            fields.len(),
            heuristic_count,
            model_count
        );

        fields
    }
}

/// Apply every rule to the document text, in rule order.
pub fn heuristic_candidates(doc: &AssembledDocument) -> Vec<FieldCandidate> {
    FIELD_RULES
        .iter()
        .filter_map(|rule| heuristic_candidate(rule, doc))
        .collect()
}

fn heuristic_candidate(rule: &FieldRule, doc: &AssembledDocument) -> Option<FieldCandidate> {
    let found = rule.apply(&doc.full_text)?;
    let page = doc.page_at(found.offset);

    let mut candidate = FieldCandidate::heuristic(rule.name, found.value, rule.confidence).on_page(page);
    if let Some(bbox) = locate(doc, page, &found.raw) {
        candidate = candidate.with_bbox(bbox);
    }
    Some(candidate)
}

/// Box of the first token on `page` that carries the first word of the capture.
fn locate(doc: &AssembledDocument, page: u32, raw: &str) -> Option<BBox> {
    let first_word = raw.split_whitespace().next()?;
    doc.tokens_on_page(page)
        .find(|t| t.text == first_word)
        .map(|t| t.bbox)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{assembled, ScriptedModel};
    use pretty_assertions::assert_eq;

    fn threshold(confidence_threshold: f32) -> LayoutConfig {
        LayoutConfig {
            confidence_threshold,
            ..LayoutConfig::default()
        }
    }

    fn with_model(candidates: Vec<FieldCandidate>, min: f32) -> FieldDetector {
        FieldDetector::new(
            Enrichment::Model(Box::new(ScriptedModel::returning(candidates))),
            &threshold(min),
        )
    }

    #[test]
    fn test_heuristic_fields() {
        let doc = assembled(&["Invoice Number: INV-4412\nSubtotal: 100.00\nTax: 8.00\nTotal Due: $108.00"]);
        let fields = FieldDetector::default().detect(&doc, &[]);

        let names: Vec<&str> = fields.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["invoice_number", "subtotal_amount", "tax_amount", "total_amount"]);

        let total = &fields["total_amount"];
        assert_eq!(total.value, Some("108.00".into()));
        assert_eq!(total.source, CandidateSource::Heuristic);
        assert_eq!(total.confidence, 0.6);
    }

    #[test]
    fn test_candidate_page_and_bbox() {
        let doc = assembled(&["Cover page", "Remit to bank\nRouting Number: 021000021"]);
        let fields = FieldDetector::default().detect(&doc, &[]);

        let routing = &fields["routing_number"];
        assert_eq!(routing.page, 2);
        let token = doc.tokens_on_page(2).find(|t| t.text == "021000021").unwrap();
        assert_eq!(routing.bbox, Some(token.bbox));
    }

    #[test]
    fn test_no_matches_means_no_fields() {
        let doc = assembled(&["Lorem ipsum dolor sit amet"]);
        assert!(FieldDetector::default().detect(&doc, &[]).is_empty());
    }

    #[test]
    fn test_confident_model_candidate_wins() {
        let doc = assembled(&["Total: 108.00"]);
        let detector = with_model(vec![FieldCandidate::model("total_amount", "110.00", 0.9)], 0.5);

        let fields = detector.detect(&doc, &[]);
        assert_eq!(fields["total_amount"].value, Some("110.00".into()));
        assert_eq!(fields["total_amount"].source, CandidateSource::Model);
    }

    #[test]
    fn test_weak_model_candidate_is_dropped() {
        let doc = assembled(&["Total: 108.00"]);
        let detector = with_model(
            vec![
                FieldCandidate::model("total_amount", "110.00", 0.3),
                FieldCandidate::model("vendor_name", "Acme", 0.2),
            ],
            0.5,
        );

        let fields = detector.detect(&doc, &[]);
        assert_eq!(fields["total_amount"].source, CandidateSource::Heuristic);
        assert!(!fields.contains_key("vendor_name"));
    }

    #[test]
    fn test_model_must_exceed_threshold() {
        let doc = assembled(&["Total: 108.00"]);
        let detector = with_model(
            vec![
                FieldCandidate::model("total_amount", "110.00", 0.5),
                FieldCandidate::model("vendor_name", "Acme", f32::NAN),
            ],
            0.5,
        );

        let fields = detector.detect(&doc, &[]);
        assert_eq!(fields["total_amount"].source, CandidateSource::Heuristic);
        assert_eq!(fields["total_amount"].value, Some("108.00".into()));
        assert!(!fields.contains_key("vendor_name"));
    }

    #[test]
    fn test_model_adds_fields_heuristics_missed() {
        let doc = assembled(&["nothing useful"]);
        let detector = with_model(
            vec![
                FieldCandidate::model("vendor_name", "Acme", 0.8),
                FieldCandidate::model("vendor_name", "Other", 0.95),
            ],
            0.5,
        );

        let fields = detector.detect(&doc, &[]);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields["vendor_name"].value, Some("Acme".into()));
    }

    #[test]
    fn test_failing_model_falls_back_to_heuristics() {
        let doc = assembled(&["Tax: 8.00"]);
        let detector = FieldDetector::new(Enrichment::Model(Box::new(ScriptedModel::failing())), &threshold(0.0));

        let fields = detector.detect(&doc, &[]);
        assert_eq!(fields["tax_amount"].source, CandidateSource::Heuristic);
    }
}
