//! Condition extraction for accepted directive types.

use medx_core::{conditions, DirectiveType, Organ};

use crate::text::NormalizedText;

/// Structured conditions qualifying a directive of `directive_type`.
pub fn extract_conditions(directive_type: DirectiveType, text: &NormalizedText) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut push = |c: String| {
        if !out.contains(&c) {
            out.push(c);
        }
    };

    match directive_type {
        DirectiveType::Dnr => {
            if let Some(pct) = recovery_threshold(text) {
                push(format!("{}{pct}%", conditions::RECOVERY_PROBABILITY_PREFIX));
            }
            if text.contains_any(&["terminal", "end stage"]) {
                push(conditions::TERMINAL_CONDITION.to_string());
            }
            if text.contains_any(&["vegetative", "vegetative state"]) {
                push(conditions::PERSISTENT_VEGETATIVE_STATE.to_string());
            }
            if text.contains_any(&["comfort care", "palliative"]) {
                push(conditions::COMFORT_CARE_PREFERENCE.to_string());
            }
        }
        DirectiveType::OrganDonation => {
            for organ in Organ::ALL {
                let plural = format!("{}s", organ.as_str());
                if text.contains_phrase(organ.as_str()) || text.contains_phrase(&plural) {
                    push(organ.condition_label().to_string());
                }
            }
        }
        DirectiveType::DataConsent => {
            if text.contains_any(&["anonymized", "anonymised", "anonymous", "deidentified"]) {
                push(conditions::ANONYMIZATION_REQUIRED.to_string());
            }
            let mut scoped = false;
            if text.contains_phrase("cancer") {
                push(conditions::CANCER_RESEARCH.to_string());
                scoped = true;
            }
            if text.contains_any(&["genetic", "genomic"]) {
                push(conditions::GENETIC_RESEARCH.to_string());
                scoped = true;
            }
            if text.contains_any(&["clinical trial", "clinical trials"]) {
                push(conditions::CLINICAL_TRIALS.to_string());
                scoped = true;
            }
            if !scoped && text.contains_any(&["research", "medical studies", "studies"]) {
                push(conditions::GENERAL_RESEARCH.to_string());
            }
        }
        DirectiveType::PowerOfAttorney | DirectiveType::LivingWill => {}
    }
    out
}

/// `N` from "less than N%" or "less than N percent".
fn recovery_threshold(text: &NormalizedText) -> Option<u32> {
    let tokens: Vec<&str> = text.tokens().collect();
    tokens.windows(4).find_map(|w| match w {
        ["less", "than", n, "%" | "percent"] => n.parse::<u32>().ok().filter(|v| *v <= 100),
        _ => None,
    })
}

/// Recognized clinical terms, in configuration order.
pub fn medical_terms(text: &NormalizedText, vocabulary: &[String]) -> Vec<String> {
    vocabulary
        .iter()
        .filter(|term| text.contains_phrase(term))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conds(t: DirectiveType, s: &str) -> Vec<String> {
        extract_conditions(t, &NormalizedText::new(s))
    }

    #[test]
    fn dnr_recovery_threshold_percent_sign() {
        let c = conds(DirectiveType::Dnr, "Do not resuscitate, less than 5% recovery");
        assert_eq!(c, vec!["Recovery probability < 5%".to_string()]);
    }

    #[test]
    fn dnr_recovery_threshold_word() {
        let c = conds(DirectiveType::Dnr, "if there is less than 10 percent chance");
        assert_eq!(c, vec!["Recovery probability < 10%".to_string()]);
    }

    #[test]
    fn dnr_state_conditions() {
        let c = conds(
            DirectiveType::Dnr,
            "terminal illness or persistent vegetative state; comfort care only",
        );
        assert!(c.contains(&conditions::TERMINAL_CONDITION.to_string()));
        assert!(c.contains(&conditions::PERSISTENT_VEGETATIVE_STATE.to_string()));
        assert!(c.contains(&conditions::COMFORT_CARE_PREFERENCE.to_string()));
    }

    #[test]
    fn organs_are_listed_once_each() {
        let c = conds(DirectiveType::OrganDonation, "donate my kidneys, kidney and corneas");
        assert_eq!(c, vec!["Kidney donation".to_string(), "Cornea donation".to_string()]);
    }

    #[test]
    fn data_consent_scope() {
        let c = conds(DirectiveType::DataConsent, "share anonymized data for cancer research");
        assert_eq!(
            c,
            vec![
                conditions::ANONYMIZATION_REQUIRED.to_string(),
                conditions::CANCER_RESEARCH.to_string()
            ]
        );
        let g = conds(DirectiveType::DataConsent, "use my data for medical research");
        assert_eq!(g, vec![conditions::GENERAL_RESEARCH.to_string()]);
    }

    #[test]
    fn terms_follow_vocabulary_order() {
        let vocab = vec!["stroke".to_string(), "coma".to_string()];
        let t = NormalizedText::new("after a coma following a stroke");
        assert_eq!(medical_terms(&t, &vocab), vec!["stroke", "coma"]);
    }
}
