//! Field detection and document classification.
//!
//! This module provides:
//! - The heuristic rule table (one pattern per field)
//! - The optional model enrichment strategy
//! - The field detector merging both
//! - Lexical document type classification

pub mod classifier;
pub mod detector;
pub mod enrichment;
pub mod rules;

pub use classifier::classify;
pub use detector::{heuristic_candidates, FieldDetector};
pub use enrichment::{Enrichment, FieldModel};
pub use rules::{FieldKind, FieldRule, FIELD_RULES};
