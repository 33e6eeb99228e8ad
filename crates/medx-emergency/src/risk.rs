//! Rule-based recovery risk for a patient in an emergency.
//!
//! Each matching factor scales the recovery probability down from an even
//! 0.5. Condition factors are read from the current condition, history
//! factors from the medical history. Phrases match on word boundaries, so
//! `age` does not fire inside `manage`.

use medx_core::Score;
use serde::{Deserialize, Serialize};

/// Starting recovery probability.
pub const BASE_RECOVERY_BP: u16 = 5_000;
/// Recovery probability is kept within `[0.01, 0.99]`.
pub const RECOVERY_FLOOR_BP: u16 = 100;
pub const RECOVERY_CEILING_BP: u16 = 9_900;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Condition,
    History,
}

struct RiskRule {
    source: Source,
    phrases: &'static [&'static str],
    /// Multiplier in thousandths.
    factor_per_mille: u32,
    risk_factor: &'static str,
    contraindication: Option<&'static str>,
    recommended_action: Option<&'static str>,
}

const RULES: &[RiskRule] = &[
    RiskRule {
        source: Source::Condition,
        phrases: &["cardiac arrest", "heart attack"],
        factor_per_mille: 300,
        risk_factor: "Cardiac event",
        contraindication: None,
        recommended_action: Some("Immediate cardiac intervention"),
    },
    RiskRule {
        source: Source::Condition,
        phrases: &["respiratory failure"],
        factor_per_mille: 400,
        risk_factor: "Respiratory compromise",
        contraindication: None,
        recommended_action: Some("Ventilatory support assessment"),
    },
    RiskRule {
        source: Source::Condition,
        phrases: &["stroke", "brain injury"],
        factor_per_mille: 600,
        risk_factor: "Neurological damage",
        contraindication: Some("Cognitive impairment risk"),
        recommended_action: None,
    },
    RiskRule {
        source: Source::History,
        phrases: &["elderly", "age"],
        factor_per_mille: 800,
        risk_factor: "Advanced age",
        contraindication: None,
        recommended_action: None,
    },
    RiskRule {
        source: Source::History,
        phrases: &["diabetes"],
        factor_per_mille: 900,
        risk_factor: "Diabetes mellitus",
        contraindication: None,
        recommended_action: None,
    },
    RiskRule {
        source: Source::History,
        phrases: &["cancer"],
        factor_per_mille: 700,
        risk_factor: "Oncological condition",
        contraindication: Some("Immunocompromised state"),
        recommended_action: None,
    },
];

/// Input to [`assess_risk`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskQuery {
    #[serde(default)]
    pub medical_history: String,
    pub current_condition: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub recovery_probability: Score,
    pub risk_factors: Vec<String>,
    pub contraindications: Vec<String>,
    pub recommended_actions: Vec<String>,
    /// How much the assessment had to go on.
    pub confidence: Score,
}

/// Lowercased words separated and bracketed by single spaces.
fn normalize(text: &str) -> String {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();
    format!(" {} ", words.join(" "))
}

pub fn assess_risk(query: &RiskQuery) -> RiskAssessment {
    let condition = normalize(&query.current_condition);
    let history = normalize(&query.medical_history);

    let mut recovery = u32::from(BASE_RECOVERY_BP);
    let mut risk_factors = Vec::new();
    let mut contraindications = Vec::new();
    let mut recommended_actions = Vec::new();

    for rule in RULES {
        let text = match rule.source {
            Source::Condition => &condition,
            Source::History => &history,
        };
        if !rule.phrases.iter().any(|p| text.contains(&format!(" {p} "))) {
            continue;
        }
        recovery = (recovery * rule.factor_per_mille + 500) / 1_000;
        risk_factors.push(rule.risk_factor.to_string());
        contraindications.extend(rule.contraindication.map(str::to_string));
        recommended_actions.extend(rule.recommended_action.map(str::to_string));
    }

    let recovery = recovery.clamp(u32::from(RECOVERY_FLOOR_BP), u32::from(RECOVERY_CEILING_BP)) as u16;
    let confidence = if risk_factors.len() > 2 && !query.medical_history.trim().is_empty() {
        8_500
    } else if !risk_factors.is_empty() {
        7_500
    } else {
        6_000
    };

    RiskAssessment {
        recovery_probability: Score::saturating_from_basis_points(recovery),
        risk_factors,
        contraindications,
        recommended_actions,
        confidence: Score::saturating_from_basis_points(confidence),
    }
}
