//! # Extractor Configuration
//!
//! Phrase sets, weights and thresholds are configuration, not code. The
//! defaults below are the production tuning; deployments override them from
//! the `extractor` section of the server config.
//!
//! ## Tier 1 Confidence
//!
//! ```text
//! fraction   = min(1, Σ weight(matched phrase) / saturation)
//! confidence = clamp(0.1 + 0.9 × fraction × type_weight + boosts, 0.1, 1.0)
//! ```
//!
//! A type is emitted only when `confidence >= acceptance_threshold`.

use std::collections::BTreeMap;
use std::time::Duration;

use medx_core::DirectiveType;
use serde::{Deserialize, Serialize};

use crate::classifier::ClassifierError;

fn default_threshold() -> f64 {
    0.7
}

fn default_unit() -> f64 {
    1.0
}

/// A trigger phrase and how much it contributes to the matched fraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedPhrase {
    pub phrase: String,
    #[serde(default = "default_unit")]
    pub weight: f64,
}

/// Tier 1 rule set for one directive type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeRule {
    pub phrases: Vec<WeightedPhrase>,
    /// Matched weight at which the fraction reaches 1.
    #[serde(default = "default_unit")]
    pub saturation: f64,
    #[serde(default = "default_unit")]
    pub type_weight: f64,
    #[serde(default = "default_threshold")]
    pub acceptance_threshold: f64,
}

impl TypeRule {
    fn new(phrases: &[(&str, f64)], type_weight: f64, acceptance_threshold: f64) -> Self {
        Self {
            phrases: phrases
                .iter()
                .map(|(phrase, weight)| WeightedPhrase {
                    phrase: (*phrase).to_string(),
                    weight: *weight,
                })
                .collect(),
            saturation: 1.0,
            type_weight,
            acceptance_threshold,
        }
    }
}

/// Full extractor configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub types: BTreeMap<DirectiveType, TypeRule>,
    /// Aggregate confidence below this escalates.
    pub global_acceptance_threshold: f64,
    /// Texts longer than this many characters escalate.
    pub max_text_len: usize,
    /// Terminology that Tier 1 is not trusted to interpret.
    pub complex_terms: Vec<String>,
    /// Clinical terms recognized and listed on each extracted directive.
    pub medical_terms: Vec<String>,
    /// Hard timeout on Tier 2.
    pub escalation_timeout_ms: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        let mut types = BTreeMap::new();
        types.insert(
            DirectiveType::Dnr,
            TypeRule::new(
                &[
                    ("do not resuscitate", 1.0),
                    ("dnr", 1.0),
                    ("no resuscitation", 0.9),
                    ("do not revive", 0.9),
                    ("no cpr", 0.9),
                    ("no life support", 0.6),
                    ("no mechanical ventilation", 0.6),
                    ("comfort care only", 0.5),
                    ("palliative care", 0.3),
                    ("end of life", 0.2),
                ],
                0.95,
                0.85,
            ),
        );
        types.insert(
            DirectiveType::OrganDonation,
            TypeRule::new(
                &[
                    ("donate organs", 1.0),
                    ("organ donation", 1.0),
                    ("organ donor", 1.0),
                    ("tissue donation", 0.8),
                    ("donate my", 0.7),
                    ("transplant", 0.4),
                    ("kidney", 0.2),
                    ("liver", 0.2),
                    ("heart", 0.2),
                    ("lung", 0.2),
                    ("cornea", 0.2),
                ],
                0.95,
                0.80,
            ),
        );
        types.insert(
            DirectiveType::DataConsent,
            TypeRule::new(
                &[
                    ("share data", 0.9),
                    ("data sharing", 0.9),
                    ("anonymized data", 0.8),
                    ("cancer research", 0.8),
                    ("medical research", 0.7),
                    ("genetic studies", 0.7),
                    ("clinical trials", 0.6),
                    ("medical studies", 0.6),
                    ("research", 0.4),
                ],
                0.90,
                0.75,
            ),
        );
        types.insert(
            DirectiveType::PowerOfAttorney,
            TypeRule::new(
                &[
                    ("power of attorney", 1.0),
                    ("healthcare proxy", 1.0),
                    ("healthcare agent", 0.9),
                    ("surrogate", 0.6),
                    ("medical decisions", 0.4),
                ],
                0.95,
                0.88,
            ),
        );
        types.insert(
            DirectiveType::LivingWill,
            TypeRule::new(
                &[
                    ("living will", 1.0),
                    ("advance directive", 0.9),
                    ("healthcare directive", 0.8),
                    ("medical directive", 0.7),
                    ("end-of-life wishes", 0.7),
                ],
                0.90,
                0.82,
            ),
        );

        Self {
            types,
            global_acceptance_threshold: 0.85,
            max_text_len: 1000,
            complex_terms: [
                "myocardial infarction",
                "cerebrovascular accident",
                "pulmonary embolism",
                "sepsis",
                "multi-organ failure",
                "intracranial pressure",
                "glasgow coma scale",
                "acute respiratory distress syndrome",
                "disseminated intravascular coagulation",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            medical_terms: [
                "cardiac arrest",
                "heart failure",
                "arrhythmia",
                "respiratory failure",
                "pneumonia",
                "copd",
                "stroke",
                "traumatic brain injury",
                "coma",
                "brain death",
                "persistent vegetative state",
                "terminal condition",
                "cancer",
                "metastasis",
                "chemotherapy",
                "palliative care",
                "dementia",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            escalation_timeout_ms: 2000,
        }
    }
}

impl ExtractorConfig {
    pub fn escalation_timeout(&self) -> Duration {
        Duration::from_millis(self.escalation_timeout_ms)
    }

    /// Rule for a type, if configured.
    pub fn rule(&self, directive_type: DirectiveType) -> Option<&TypeRule> {
        self.types.get(&directive_type)
    }

    /// Reject configurations that would make scoring meaningless.
    pub fn validate(&self) -> Result<(), ClassifierError> {
        let unit = 0.0..=1.0;
        if !unit.contains(&self.global_acceptance_threshold) {
            return Err(ClassifierError::InvalidConfig {
                reason: "global_acceptance_threshold must be within [0, 1]".into(),
            });
        }
        if self.escalation_timeout_ms == 0 {
            return Err(ClassifierError::InvalidConfig {
                reason: "escalation_timeout_ms must be positive".into(),
            });
        }
        for (directive_type, rule) in &self.types {
            if rule.saturation.is_nan() || rule.saturation <= 0.0 {
                return Err(ClassifierError::InvalidConfig {
                    reason: format!("{directive_type}: saturation must be positive"),
                });
            }
            if !unit.contains(&rule.type_weight) || !unit.contains(&rule.acceptance_threshold) {
                return Err(ClassifierError::InvalidConfig {
                    reason: format!("{directive_type}: weights and thresholds must be within [0, 1]"),
                });
            }
            if rule.phrases.iter().any(|p| p.phrase.trim().is_empty() || p.weight < 0.0) {
                return Err(ClassifierError::InvalidConfig {
                    reason: format!("{directive_type}: phrases must be non-empty with non-negative weight"),
                });
            }
        }
        Ok(())
    }
}
