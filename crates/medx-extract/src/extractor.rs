//! # Directive Extractor
//!
//! ```text
//! text ──► Tier 1 ──► escalation gate ──┬── pass ──────────────► outcome (local_only)
//!                                       └── escalate ──► Tier 2 (hard timeout)
//!                                                         ├── ok ──► merge ──► outcome
//!                                                         └── timeout / error ──► Tier 1 stands,
//!                                                                                 review required
//! ```
//!
//! The gate escalates when aggregate Tier 1 confidence is below the global
//! threshold, the text exceeds the length bound, or it contains complex
//! terminology. Escalation failure is a defined degraded outcome, never an
//! error.
//!
//! ## Merge Rules
//!
//! - Tier 2 candidates are deduplicated by type, highest confidence wins.
//! - A Tier 2 candidate must clear its type's acceptance threshold, the same
//!   bar Tier 1 is held to. One that does not is dropped with a review note.
//! - An accepted Tier 2 candidate replaces Tier 1 for its type.
//! - A Tier 1 candidate that Tier 2 omitted or failed to confirm is kept,
//!   with a review note.

use std::collections::BTreeMap;
use std::sync::Arc;

use medx_core::{ClassificationMetadata, EscalationStatus, ProcessingMethod, Score};
use serde::{Deserialize, Serialize};

use crate::classifier::{
    rank_candidates, Classifier, ClassifierError, ExtractedDirective, PatternClassifier,
};
use crate::config::ExtractorConfig;
use crate::stats::{processing_cost_micros, ProcessingStats, StatsRecorder};
use crate::text::NormalizedText;
use crate::validity::{contraindications, legal_validity};

/// Why a request was escalated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    LowConfidence,
    TextTooLong,
    ComplexTerminology,
}

impl EscalationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LowConfidence => "low_confidence",
            Self::TextTooLong => "text_too_long",
            Self::ComplexTerminology => "complex_terminology",
        }
    }
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the extractor learned about one text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    /// Ranked by confidence descending.
    pub directives: Vec<ExtractedDirective>,
    /// Mean confidence of `directives`; zero when empty.
    pub aggregate_confidence: Score,
    pub legal_validity: Score,
    pub contraindications: Vec<String>,
    pub requires_human_review: bool,
    pub method: ProcessingMethod,
    pub escalation: EscalationStatus,
    pub escalation_reasons: Vec<EscalationReason>,
    pub review_notes: Vec<String>,
    /// Billed cost of this extraction in micro-dollars.
    #[serde(default)]
    pub processing_cost_micros: u64,
}

impl ExtractionOutcome {
    /// Provenance to attach to stored records.
    pub fn classification(&self) -> ClassificationMetadata {
        ClassificationMetadata {
            method: self.method,
            escalation: self.escalation,
            requires_human_review: self.requires_human_review,
            contraindications: self.contraindications.clone(),
        }
    }
}

/// Two-tier extractor.
pub struct DirectiveExtractor {
    tier1: PatternClassifier,
    tier2: Option<Arc<dyn Classifier>>,
    config: ExtractorConfig,
    stats: StatsRecorder,
}

impl DirectiveExtractor {
    /// Tier 1 only. Escalations resolve as `unavailable`.
    pub fn new(config: ExtractorConfig) -> Result<Self, ClassifierError> {
        config.validate()?;
        Ok(Self {
            tier1: PatternClassifier::new(config.clone()),
            tier2: None,
            config,
            stats: StatsRecorder::default(),
        })
    }

    pub fn with_tier2(mut self, tier2: Arc<dyn Classifier>) -> Self {
        self.tier2 = Some(tier2);
        self
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn has_tier2(&self) -> bool {
        self.tier2.is_some()
    }

    /// Totals over every extraction this extractor has run.
    pub fn stats(&self) -> ProcessingStats {
        self.stats.snapshot()
    }

    /// Classify `text`. Never fails: escalation problems degrade to Tier 1.
    pub async fn extract(&self, text: &str) -> ExtractionOutcome {
        let started = std::time::Instant::now();
        let normalized = NormalizedText::new(text);
        let tier1 = self.tier1.classify_normalized(text, &normalized);
        let tier1_aggregate = aggregate(&tier1);
        let reasons = self.escalation_reasons(text, &normalized, tier1_aggregate);

        let mut review_notes = Vec::new();
        let (directives, method, escalation, requires_human_review) = if reasons.is_empty() {
            (tier1, ProcessingMethod::LocalOnly, EscalationStatus::NotRequired, false)
        } else {
            self.escalate(text, tier1, &reasons, &mut review_notes).await
        };

        let outcome = ExtractionOutcome {
            aggregate_confidence: aggregate(&directives),
            directives,
            legal_validity: legal_validity(&normalized),
            contraindications: contraindications(&normalized),
            requires_human_review,
            method,
            escalation,
            escalation_reasons: reasons,
            review_notes,
            processing_cost_micros: processing_cost_micros(method, escalation, text.chars().count()),
        };
        self.stats.record(
            outcome.method,
            outcome.aggregate_confidence,
            outcome.processing_cost_micros,
            started.elapsed().as_millis() as u64,
        );

        metrics::counter!("medx_extractions_total", "method" => outcome.method.as_str()).increment(1);
        tracing::info!(
            candidates = outcome.directives.len(),
            aggregate = %outcome.aggregate_confidence,
            legal_validity = %outcome.legal_validity,
            method = %outcome.method,
            escalation = %outcome.escalation,
            review = outcome.requires_human_review,
            cost_micros = outcome.processing_cost_micros,
            "directive extraction complete"
        );
        outcome
    }

    fn escalation_reasons(
        &self,
        raw: &str,
        text: &NormalizedText,
        aggregate: Score,
    ) -> Vec<EscalationReason> {
        let mut reasons = Vec::new();
        if aggregate < Score::from_f64(self.config.global_acceptance_threshold) {
            reasons.push(EscalationReason::LowConfidence);
        }
        if raw.chars().count() > self.config.max_text_len {
            reasons.push(EscalationReason::TextTooLong);
        }
        if self.config.complex_terms.iter().any(|t| text.contains_phrase(t)) {
            reasons.push(EscalationReason::ComplexTerminology);
        }
        reasons
    }

    async fn escalate(
        &self,
        text: &str,
        tier1: Vec<ExtractedDirective>,
        reasons: &[EscalationReason],
        review_notes: &mut Vec<String>,
    ) -> (Vec<ExtractedDirective>, ProcessingMethod, EscalationStatus, bool) {
        let reasons_label = reasons
            .iter()
            .map(EscalationReason::as_str)
            .collect::<Vec<_>>()
            .join(",");

        let Some(tier2) = &self.tier2 else {
            metrics::counter!("medx_escalations_total", "outcome" => "unavailable").increment(1);
            tracing::debug!(reasons = %reasons_label, "escalation required but no tier 2 configured");
            return (tier1, ProcessingMethod::LocalOnly, EscalationStatus::Unavailable, true);
        };

        let timeout = self.config.escalation_timeout();
        let status = match tokio::time::timeout(timeout, tier2.classify(text)).await {
            Ok(Ok(tier2_out)) => {
                let merged = merge(tier1, tier2_out, &self.config, review_notes);
                let review = aggregate(&merged)
                    < Score::from_f64(self.config.global_acceptance_threshold)
                    || !review_notes.is_empty();
                metrics::counter!("medx_escalations_total", "outcome" => "completed").increment(1);
                return (merged, ProcessingMethod::Escalated, EscalationStatus::Completed, review);
            }
            Ok(Err(err)) => {
                tracing::warn!(
                    classifier = tier2.name(),
                    reasons = %reasons_label,
                    error = %err,
                    "tier 2 classification failed; keeping tier 1 result"
                );
                EscalationStatus::Failed
            }
            Err(_) => {
                tracing::warn!(
                    classifier = tier2.name(),
                    reasons = %reasons_label,
                    timeout_ms = timeout.as_millis() as u64,
                    "tier 2 classification timed out; keeping tier 1 result"
                );
                EscalationStatus::TimedOut
            }
        };
        metrics::counter!("medx_escalations_total", "outcome" => status.as_str()).increment(1);
        (tier1, ProcessingMethod::Escalated, status, true)
    }
}

impl std::fmt::Debug for DirectiveExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectiveExtractor")
            .field("tier2", &self.tier2.as_ref().map(|c| c.name()))
            .finish()
    }
}

fn aggregate(directives: &[ExtractedDirective]) -> Score {
    Score::mean(directives.iter().map(|d| d.confidence)).unwrap_or(Score::ZERO)
}

fn clears_threshold(config: &ExtractorConfig, candidate: &ExtractedDirective) -> bool {
    config
        .rule(candidate.directive_type)
        .is_some_and(|r| candidate.confidence >= Score::from_f64(r.acceptance_threshold))
}

fn merge(
    tier1: Vec<ExtractedDirective>,
    tier2: Vec<ExtractedDirective>,
    config: &ExtractorConfig,
    review_notes: &mut Vec<String>,
) -> Vec<ExtractedDirective> {
    let mut best: BTreeMap<_, ExtractedDirective> = BTreeMap::new();
    for candidate in tier2 {
        match best.get(&candidate.directive_type) {
            Some(existing) if existing.confidence >= candidate.confidence => {}
            _ => {
                best.insert(candidate.directive_type, candidate);
            }
        }
    }

    let mut by_type: BTreeMap<_, ExtractedDirective> = BTreeMap::new();
    for (directive_type, candidate) in best {
        if clears_threshold(config, &candidate) {
            by_type.insert(directive_type, candidate);
        } else {
            tracing::debug!(
                directive_type = %directive_type,
                confidence = %candidate.confidence,
                "tier 2 candidate below acceptance threshold"
            );
            review_notes.push(format!(
                "{directive_type} from escalation scored {} and was not accepted",
                candidate.confidence
            ));
        }
    }

    for candidate in tier1 {
        if by_type.contains_key(&candidate.directive_type) || !clears_threshold(config, &candidate) {
            continue;
        }
        review_notes.push(format!(
            "{} kept from local classification; escalation did not confirm it",
            candidate.directive_type
        ));
        by_type.insert(candidate.directive_type, candidate);
    }

    let mut merged: Vec<ExtractedDirective> = by_type.into_values().collect();
    rank_candidates(&mut merged);
    merged
}
