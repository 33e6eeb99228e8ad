//! # medx-extract: Tiered Directive Extraction
//!
//! Turns free text into ranked, confidence-scored directive candidates:
//!
//! - **Tier 1** ([`PatternClassifier`]): weighted trigger phrases per directive
//!   type, per-type acceptance thresholds, condition extraction. Local,
//!   deterministic and bounded in cost.
//! - **Escalation gate**: low aggregate confidence, long text or complex
//!   terminology send the text to Tier 2 and flag it for human review.
//! - **Tier 2** (any [`Classifier`], e.g. [`HttpLanguageModel`]): runs under a
//!   hard timeout; failure or timeout falls back to Tier 1.
//! - **Legal validity** and **contraindications**: independent scans surfaced
//!   alongside the candidates.
//! - [`stats`]: per-request processing cost and running totals.
//!
//! Extraction never sits on the emergency path. The resolver reads only
//! stored, already-classified records.

pub mod classifier;
pub mod conditions;
pub mod config;
pub mod extractor;
pub mod llm;
pub mod stats;
pub mod text;
pub mod validity;

pub use classifier::{Classifier, ClassifierError, ExtractedDirective, PatternClassifier};
pub use config::{ExtractorConfig, TypeRule, WeightedPhrase};
pub use extractor::{DirectiveExtractor, EscalationReason, ExtractionOutcome};
pub use llm::HttpLanguageModel;
pub use stats::{processing_cost_micros, ProcessingStats};
