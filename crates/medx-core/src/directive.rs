//! # Directive Taxonomy
//!
//! The closed set of directive types, the organs a donation directive can
//! name, and the institution categories a data-sharing consent can scope.
//! Condition strings shared between the extractor (which produces them) and
//! the execution engine (which acts on them) live in [`conditions`].

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A patient's structured healthcare instruction kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DirectiveType {
    /// Do not resuscitate.
    Dnr,
    /// Post-mortem organ or tissue donation.
    OrganDonation,
    /// Consent to share (anonymized) medical data.
    DataConsent,
    /// Designation of a healthcare agent.
    PowerOfAttorney,
    /// General end-of-life instructions.
    LivingWill,
}

impl DirectiveType {
    /// Every directive type in declaration order.
    pub const ALL: [DirectiveType; 5] = [
        Self::Dnr,
        Self::OrganDonation,
        Self::DataConsent,
        Self::PowerOfAttorney,
        Self::LivingWill,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dnr => "DNR",
            Self::OrganDonation => "ORGAN_DONATION",
            Self::DataConsent => "DATA_CONSENT",
            Self::PowerOfAttorney => "POWER_OF_ATTORNEY",
            Self::LivingWill => "LIVING_WILL",
        }
    }

    /// Rank used to choose the single record shown on the emergency path.
    /// Lower is more urgent.
    pub fn emergency_priority(&self) -> u8 {
        match self {
            Self::Dnr => 0,
            Self::LivingWill => 1,
            Self::PowerOfAttorney => 2,
            Self::OrganDonation => 3,
            Self::DataConsent => 4,
        }
    }

    /// Whether the execution engine acts on this type after death.
    pub fn is_post_mortem_actionable(&self) -> bool {
        matches!(self, Self::OrganDonation | Self::DataConsent)
    }
}

impl std::fmt::Display for DirectiveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DirectiveType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::UnknownVariant {
                kind: "directive type",
                value: s.to_string(),
            })
    }
}

/// Organ or tissue kinds a donation directive may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Organ {
    Kidney,
    Liver,
    Heart,
    Lung,
    Cornea,
    Pancreas,
    Tissue,
}

impl Organ {
    /// Every organ kind.
    pub const ALL: [Organ; 7] = [
        Self::Kidney,
        Self::Liver,
        Self::Heart,
        Self::Lung,
        Self::Cornea,
        Self::Pancreas,
        Self::Tissue,
    ];

    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kidney => "kidney",
            Self::Liver => "liver",
            Self::Heart => "heart",
            Self::Lung => "lung",
            Self::Cornea => "cornea",
            Self::Pancreas => "pancreas",
            Self::Tissue => "tissue",
        }
    }

    /// The condition string attached to a donation directive naming this organ.
    pub fn condition_label(&self) -> &'static str {
        match self {
            Self::Kidney => "Kidney donation",
            Self::Liver => "Liver donation",
            Self::Heart => "Heart donation",
            Self::Lung => "Lung donation",
            Self::Cornea => "Cornea donation",
            Self::Pancreas => "Pancreas donation",
            Self::Tissue => "Tissue donation",
        }
    }

    /// Inverse of [`condition_label`](Self::condition_label).
    pub fn from_condition(condition: &str) -> Option<Organ> {
        Self::ALL
            .into_iter()
            .find(|o| o.condition_label().eq_ignore_ascii_case(condition.trim()))
    }
}

impl std::fmt::Display for Organ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Organ {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|o| o.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValidationError::UnknownVariant {
                kind: "organ",
                value: s.to_string(),
            })
    }
}

/// Kinds of institution a data-sharing consent may be scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstitutionCategory {
    CancerResearch,
    GeneticResearch,
    ClinicalTrials,
    GeneralResearch,
}

impl InstitutionCategory {
    /// Wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CancerResearch => "cancer_research",
            Self::GeneticResearch => "genetic_research",
            Self::ClinicalTrials => "clinical_trials",
            Self::GeneralResearch => "general_research",
        }
    }

    /// The category a consent condition grants, if it grants one.
    pub fn from_consent_condition(condition: &str) -> Option<InstitutionCategory> {
        match condition {
            conditions::CANCER_RESEARCH => Some(Self::CancerResearch),
            conditions::GENETIC_RESEARCH => Some(Self::GeneticResearch),
            conditions::CLINICAL_TRIALS => Some(Self::ClinicalTrials),
            conditions::GENERAL_RESEARCH => Some(Self::GeneralResearch),
            _ => None,
        }
    }
}

impl std::fmt::Display for InstitutionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical condition strings.
pub mod conditions {
    pub const TERMINAL_CONDITION: &str = "Terminal condition";
    pub const PERSISTENT_VEGETATIVE_STATE: &str = "Persistent vegetative state";
    pub const COMFORT_CARE_PREFERENCE: &str = "Comfort care preference";
    /// Prefix of the recovery threshold condition, e.g. `Recovery probability < 5%`.
    pub const RECOVERY_PROBABILITY_PREFIX: &str = "Recovery probability < ";

    pub const ANONYMIZATION_REQUIRED: &str = "Anonymization required";
    pub const CANCER_RESEARCH: &str = "Cancer research consent";
    pub const GENETIC_RESEARCH: &str = "Genetic research consent";
    pub const CLINICAL_TRIALS: &str = "Clinical trial participation";
    pub const GENERAL_RESEARCH: &str = "General research consent";
}
