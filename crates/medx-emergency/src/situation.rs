//! Situation-aware confidence for an emergency resolution.
//!
//! The stored confidence is what intake measured. At the bedside the
//! reported situation and vitals can corroborate a DNR: an arrest is the
//! case the directive was written for. Adjustments only ever raise the
//! score and are capped at 1.0.

use medx_core::{DirectiveType, Score};
use serde::{Deserialize, Serialize};

/// Bonus for a DNR presented during cardiac arrest.
pub const CARDIAC_ARREST_DNR_BP: u16 = 500;
/// Bonus for a DNR presented during respiratory failure.
pub const RESPIRATORY_FAILURE_DNR_BP: u16 = 300;
/// Bonus when the vitals show no circulation.
pub const ARREST_VITALS_BP: u16 = 200;

/// Vitals reported with the request. Absent readings are unknown, not zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vitals {
    #[serde(default)]
    pub pulse_bpm: Option<u16>,
    #[serde(default)]
    pub systolic_mmhg: Option<u16>,
    #[serde(default)]
    pub diastolic_mmhg: Option<u16>,
}

impl Vitals {
    /// Zero pulse, or a 0/0 blood pressure.
    pub fn indicate_arrest(&self) -> bool {
        self.pulse_bpm == Some(0) || (self.systolic_mmhg == Some(0) && self.diastolic_mmhg == Some(0))
    }
}

/// Situations that carry a confidence adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Situation {
    CardiacArrest,
    RespiratoryFailure,
    Other,
}

impl Situation {
    /// Case and separator insensitive: `Cardiac Arrest` and `cardiac-arrest`
    /// both read as [`Situation::CardiacArrest`].
    pub fn classify(situation: &str) -> Self {
        let normalized: String = situation
            .trim()
            .chars()
            .map(|c| if c == ' ' || c == '-' { '_' } else { c.to_ascii_lowercase() })
            .collect();
        match normalized.as_str() {
            "cardiac_arrest" => Self::CardiacArrest,
            "respiratory_failure" => Self::RespiratoryFailure,
            _ => Self::Other,
        }
    }
}

/// The stored confidence and what the situation made of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SituationAssessment {
    pub situation: Situation,
    pub stored_confidence: Score,
    pub adjusted_confidence: Score,
    /// One line per applied adjustment.
    pub adjustments: Vec<String>,
}

pub fn assess_situation(
    directive_type: DirectiveType,
    stored_confidence: Score,
    situation: &str,
    vitals: Option<&Vitals>,
) -> SituationAssessment {
    let situation = Situation::classify(situation);
    let mut bp = u32::from(stored_confidence.basis_points());
    let mut adjustments = Vec::new();

    if directive_type == DirectiveType::Dnr {
        match situation {
            Situation::CardiacArrest => {
                bp += u32::from(CARDIAC_ARREST_DNR_BP);
                adjustments.push("DNR presented during cardiac arrest".to_string());
            }
            Situation::RespiratoryFailure => {
                bp += u32::from(RESPIRATORY_FAILURE_DNR_BP);
                adjustments.push("DNR presented during respiratory failure".to_string());
            }
            Situation::Other => {}
        }
    }
    if vitals.is_some_and(Vitals::indicate_arrest) {
        bp += u32::from(ARREST_VITALS_BP);
        adjustments.push("vitals show no circulation".to_string());
    }

    let capped = bp.min(u32::from(Score::SCALE)) as u16;
    SituationAssessment {
        situation,
        stored_confidence,
        adjusted_confidence: Score::saturating_from_basis_points(capped),
        adjustments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bp(v: u16) -> Score {
        Score::saturating_from_basis_points(v)
    }

    #[test]
    fn cardiac_arrest_raises_dnr_confidence() {
        let a = assess_situation(DirectiveType::Dnr, bp(9_000), "cardiac_arrest", None);
        assert_eq!(a.situation, Situation::CardiacArrest);
        assert_eq!(a.adjusted_confidence, bp(9_500));
        assert_eq!(a.adjustments.len(), 1);
    }

    #[test]
    fn respiratory_failure_and_vitals_stack() {
        let vitals = Vitals {
            pulse_bpm: Some(0),
            ..Vitals::default()
        };
        let a = assess_situation(DirectiveType::Dnr, bp(9_000), "Respiratory Failure", Some(&vitals));
        assert_eq!(a.adjusted_confidence, bp(9_500));
        assert_eq!(a.adjustments.len(), 2);
    }

    #[test]
    fn adjustment_is_capped_at_one() {
        let vitals = Vitals {
            pulse_bpm: Some(40),
            systolic_mmhg: Some(0),
            diastolic_mmhg: Some(0),
        };
        let a = assess_situation(DirectiveType::Dnr, bp(9_800), "cardiac-arrest", Some(&vitals));
        assert_eq!(a.adjusted_confidence, Score::ONE);
    }

    #[test]
    fn situation_bonus_applies_to_dnr_only() {
        let a = assess_situation(DirectiveType::OrganDonation, bp(9_000), "cardiac_arrest", None);
        assert_eq!(a.adjusted_confidence, bp(9_000));
        assert!(a.adjustments.is_empty());

        let vitals = Vitals {
            systolic_mmhg: Some(0),
            diastolic_mmhg: Some(0),
            ..Vitals::default()
        };
        let a = assess_situation(DirectiveType::LivingWill, bp(9_000), "trauma", Some(&vitals));
        assert_eq!(a.adjusted_confidence, bp(9_200));
    }

    #[test]
    fn partial_or_missing_vitals_do_not_count() {
        let only_systolic = Vitals {
            systolic_mmhg: Some(0),
            ..Vitals::default()
        };
        assert!(!only_systolic.indicate_arrest());
        assert!(!Vitals::default().indicate_arrest());
    }
}
