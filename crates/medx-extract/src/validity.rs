//! # Legal Validity and Contraindications
//!
//! Both scans are independent of directive-type confidence. Validity feeds
//! the store's acceptance floor; contraindications are surfaced to human
//! review and never change any score.

use medx_core::Score;

use crate::text::NormalizedText;

/// Score before any marker is applied.
pub const VALIDITY_BASELINE: f64 = 0.5;

/// (any of these phrases, adjustment). Each row applies at most once.
const VALIDITY_MARKERS: &[(&[&str], f64)] = &[
    (&["sound mind", "competent"], 0.20),
    (&["witness", "witnessed", "witnesses"], 0.15),
    (&["signed", "signature"], 0.10),
    (&["dated", "date"], 0.05),
    (&["notarized", "notarised"], 0.10),
    (&["coerced", "forced"], -0.30),
    (&["unclear", "confused"], -0.20),
    (&["under the influence", "under influence"], -0.25),
    (&["not sure", "uncertain"], -0.10),
];

/// Heuristic enforceability estimate, clamped to `[0, 1]`.
pub fn legal_validity(text: &NormalizedText) -> Score {
    let raw = VALIDITY_MARKERS
        .iter()
        .filter(|(phrases, _)| text.contains_any(phrases))
        .fold(VALIDITY_BASELINE, |acc, (_, delta)| acc + delta);
    Score::from_f64(raw)
}

/// Conflicting signals found in the text.
pub fn contraindications(text: &NormalizedText) -> Vec<String> {
    let mut found = Vec::new();
    if text.contains_any(&["religious", "religion", "faith"])
        && text.contains_any(&["objection", "object", "objects", "forbids", "prohibits"])
    {
        found.push("Religious objection noted".to_string());
    }
    if text.contains_phrase("family")
        && text.contains_any(&["disagree", "disagrees", "oppose", "opposes", "override", "overrule"])
    {
        found.push("Family disagreement or override".to_string());
    }
    if text.contains_any(&["uncertain", "maybe", "might", "not sure"]) {
        found.push("Expressed uncertainty".to_string());
    }
    if text.contains_any(&["coerced", "forced", "pressure", "pressured"]) {
        found.push("Possible coercion".to_string());
    }
    found
}
