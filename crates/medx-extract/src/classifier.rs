//! # Classifiers
//!
//! [`Classifier`] is the seam both tiers implement: the local
//! [`PatternClassifier`] and any external model (see
//! [`crate::llm::HttpLanguageModel`]). The extractor composes them.
//!
//! Tier 1 is a pure function of its configuration and the input text. It
//! holds no state between calls, uses no randomness, and iterates
//! configuration in `BTreeMap` order, so identical input yields identical
//! output.

use async_trait::async_trait;
use medx_core::{DirectiveType, Score};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::conditions::{extract_conditions, medical_terms};
use crate::config::ExtractorConfig;
use crate::text::{excerpt, NormalizedText};

/// Longest source excerpt kept on an extracted directive.
pub const EXCERPT_CHARS: usize = 160;

const CONFIDENCE_FLOOR: f64 = 0.1;

/// Errors from a classifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClassifierError {
    /// The classifier could not be reached.
    #[error("classifier unavailable: {reason}")]
    Unavailable {
        reason: String,
    },

    /// The classifier answered with something unusable.
    #[error("invalid classifier response: {reason}")]
    InvalidResponse {
        reason: String,
    },

    /// Escalation exceeded its hard timeout.
    #[error("classifier timed out after {timeout_ms}ms")]
    Timeout {
        timeout_ms: u64,
    },

    /// Extractor configuration failed validation.
    #[error("invalid extractor configuration: {reason}")]
    InvalidConfig {
        reason: String,
    },
}

/// One directive candidate. Transient: consumed to build a store draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDirective {
    pub directive_type: DirectiveType,
    #[serde(default)]
    pub conditions: Vec<String>,
    pub confidence: Score,
    #[serde(default)]
    pub source_excerpt: String,
    #[serde(default)]
    pub medical_terms: Vec<String>,
}

/// Order by confidence descending, then directive type order.
pub fn rank_candidates(candidates: &mut [ExtractedDirective]) {
    candidates.sort_by(|a, b| {
        b.confidence
            .cmp(&a.confidence)
            .then(a.directive_type.cmp(&b.directive_type))
    });
}

/// Anything that turns text into directive candidates.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Short name for logs and metrics.
    fn name(&self) -> &'static str;

    async fn classify(&self, text: &str) -> Result<Vec<ExtractedDirective>, ClassifierError>;
}

/// Tier 1: weighted trigger phrases per directive type.
#[derive(Debug, Clone)]
pub struct PatternClassifier {
    config: ExtractorConfig,
}

impl PatternClassifier {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Accepted candidates, ranked.
    pub fn classify_text(&self, text: &str) -> Vec<ExtractedDirective> {
        let normalized = NormalizedText::new(text);
        self.classify_normalized(text, &normalized)
    }

    pub(crate) fn classify_normalized(
        &self,
        raw: &str,
        text: &NormalizedText,
    ) -> Vec<ExtractedDirective> {
        let boost = statement_boost(text);
        let terms = medical_terms(text, &self.config.medical_terms);
        let source_excerpt = excerpt(raw, EXCERPT_CHARS);

        let mut accepted: Vec<ExtractedDirective> = self
            .config
            .types
            .iter()
            .filter_map(|(&directive_type, rule)| {
                let matched: f64 = rule
                    .phrases
                    .iter()
                    .filter(|p| text.contains_phrase(&p.phrase))
                    .map(|p| p.weight)
                    .sum();
                if matched <= 0.0 {
                    return None;
                }
                let fraction = (matched / rule.saturation).min(1.0);
                let raw_confidence = CONFIDENCE_FLOOR
                    + (1.0 - CONFIDENCE_FLOOR) * fraction * rule.type_weight
                    + boost;
                let confidence = Score::from_f64(raw_confidence.clamp(CONFIDENCE_FLOOR, 1.0));
                if confidence < Score::from_f64(rule.acceptance_threshold) {
                    tracing::trace!(
                        directive_type = %directive_type,
                        confidence = %confidence,
                        "candidate below acceptance threshold"
                    );
                    return None;
                }
                Some(ExtractedDirective {
                    directive_type,
                    conditions: extract_conditions(directive_type, text),
                    confidence,
                    source_excerpt: source_excerpt.clone(),
                    medical_terms: terms.clone(),
                })
            })
            .collect();

        rank_candidates(&mut accepted);
        accepted
    }
}

/// Explicit-statement boosts shared by every matched type.
fn statement_boost(text: &NormalizedText) -> f64 {
    let mut boost = 0.0;
    if text.contains_any(&["i do not want", "i refuse"]) {
        boost += 0.10;
    }
    if text.contains_any(&["witnessed", "signed"]) {
        boost += 0.05;
    }
    if text.contains_phrase("sound mind") {
        boost += 0.05;
    }
    boost
}

#[async_trait]
impl Classifier for PatternClassifier {
    fn name(&self) -> &'static str {
        "pattern"
    }

    async fn classify(&self, text: &str) -> Result<Vec<ExtractedDirective>, ClassifierError> {
        Ok(self.classify_text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn classifier() -> PatternClassifier {
        PatternClassifier::new(ExtractorConfig::default())
    }

    #[test]
    fn explicit_dnr_scores_above_threshold() {
        let out = classifier().classify_text("Do not resuscitate, less than 5% recovery");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].directive_type, DirectiveType::Dnr);
        assert_eq!(out[0].confidence, Score::from_basis_points(9_550).unwrap());
        assert_eq!(out[0].conditions, vec!["Recovery probability < 5%".to_string()]);
    }

    #[test]
    fn weak_dnr_signal_is_not_accepted() {
        // 0.1 + 0.9 * 0.3 * 0.95 = 0.3565
        assert!(classifier().classify_text("I would like palliative care").is_empty());
    }

    #[test]
    fn boosts_lift_borderline_candidates() {
        // "comfort care only" + "no life support" = 1.1 -> fraction 1 -> 0.955
        let plain = classifier().classify_text("comfort care only, no life support");
        let boosted =
            classifier().classify_text("I refuse life support. comfort care only, no life support");
        assert_eq!(plain[0].confidence, Score::from_basis_points(9_550).unwrap());
        assert_eq!(boosted[0].confidence, Score::ONE);
    }

    #[test]
    fn multiple_types_ranked_by_confidence() {
        let out = classifier()
            .classify_text("I am an organ donor. Share data with cancer research. Do not resuscitate.");
        let types: Vec<DirectiveType> = out.iter().map(|d| d.directive_type).collect();
        assert_eq!(
            types,
            vec![DirectiveType::Dnr, DirectiveType::OrganDonation, DirectiveType::DataConsent]
        );
        assert!(out[0].confidence >= out[1].confidence);
    }

    #[test]
    fn excerpt_and_terms_are_attached() {
        let out = classifier().classify_text("After cardiac arrest, DNR.");
        assert_eq!(out[0].source_excerpt, "After cardiac arrest, DNR.");
        assert_eq!(out[0].medical_terms, vec!["cardiac arrest".to_string()]);
    }

    #[test]
    fn unrelated_text_yields_nothing() {
        assert!(classifier().classify_text("The weather is lovely today.").is_empty());
    }

    #[tokio::test]
    async fn trait_object_matches_sync_path() {
        let c = classifier();
        let via_trait: &dyn Classifier = &c;
        let text = "I am an organ donor";
        assert_eq!(via_trait.classify(text).await.unwrap(), c.classify_text(text));
        assert_eq!(via_trait.name(), "pattern");
    }

    proptest! {
        #[test]
        fn tier_one_is_deterministic(s in "[a-zA-Z%,. ]{0,300}") {
            let c = classifier();
            prop_assert_eq!(c.classify_text(&s), c.classify_text(&s));
        }

        #[test]
        fn confidences_respect_bounds(s in "(do not resuscitate|organ donor|living will|research|dnr|signed| )*") {
            for d in classifier().classify_text(&s) {
                prop_assert!(d.confidence >= Score::from_f64(0.1));
                prop_assert!(d.confidence <= Score::ONE);
            }
        }
    }
}
