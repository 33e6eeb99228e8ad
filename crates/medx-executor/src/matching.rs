//! # Recipient Matching
//!
//! Candidates come from an [`OrganNetwork`](crate::network::OrganNetwork)
//! already carrying a compatibility score. Ranking multiplies that score by
//! the configured weight of the candidate's urgency tier and keeps the top N.
//!
//! ## Determinism
//!
//! [`rank_recipients`] is a stable sort: candidates with equal keys keep the
//! order the network returned them in, so re-running matching on unchanged
//! inputs yields the same ranking.

use std::collections::BTreeMap;

use medx_core::{FacilityId, Organ, RecipientId, Score};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Blood groups
// ---------------------------------------------------------------------------

/// ABO group with Rh factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BloodType {
    #[serde(rename = "O-")]
    ONeg,
    #[serde(rename = "O+")]
    OPos,
    #[serde(rename = "A-")]
    ANeg,
    #[serde(rename = "A+")]
    APos,
    #[serde(rename = "B-")]
    BNeg,
    #[serde(rename = "B+")]
    BPos,
    #[serde(rename = "AB-")]
    AbNeg,
    #[serde(rename = "AB+")]
    AbPos,
}

impl BloodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ONeg => "O-",
            Self::OPos => "O+",
            Self::ANeg => "A-",
            Self::APos => "A+",
            Self::BNeg => "B-",
            Self::BPos => "B+",
            Self::AbNeg => "AB-",
            Self::AbPos => "AB+",
        }
    }

    fn has_a(self) -> bool {
        matches!(self, Self::ANeg | Self::APos | Self::AbNeg | Self::AbPos)
    }

    fn has_b(self) -> bool {
        matches!(self, Self::BNeg | Self::BPos | Self::AbNeg | Self::AbPos)
    }

    fn rh_positive(self) -> bool {
        matches!(self, Self::OPos | Self::APos | Self::BPos | Self::AbPos)
    }

    /// True when a recipient of `recipient` can accept this donor group.
    pub fn can_donate_to(self, recipient: BloodType) -> bool {
        (!self.has_a() || recipient.has_a())
            && (!self.has_b() || recipient.has_b())
            && (!self.rh_positive() || recipient.rh_positive())
    }
}

impl std::fmt::Display for BloodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Donor typing supplied with the death event, when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonorProfile {
    pub blood_type: BloodType,
    /// HLA antigens, e.g. `A*02:01`.
    #[serde(default)]
    pub hla: Vec<String>,
}

// ---------------------------------------------------------------------------
// Candidates and matches
// ---------------------------------------------------------------------------

/// A potential recipient returned by the organ network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecipient {
    pub recipient: RecipientId,
    pub organ: Organ,
    pub facility: FacilityId,
    /// Where to send the offer. `None` leaves delivery to the channel.
    #[serde(default)]
    pub endpoint: Option<String>,
    pub compatibility: Score,
    /// 1 is most urgent.
    pub urgency_tier: u8,
    pub distance_km: u32,
    #[serde(default)]
    pub estimated_survival_benefit_years: u16,
}

/// A ranked candidate plus the notification result. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipientMatch {
    pub recipient: RecipientId,
    pub organ: Organ,
    pub facility: FacilityId,
    pub compatibility: Score,
    pub urgency_tier: u8,
    pub distance_km: u32,
    pub estimated_survival_benefit_years: u16,
    /// Set only after the notification was acknowledged.
    pub notified: bool,
    pub notification_attempts: u32,
}

impl RecipientMatch {
    pub fn from_candidate(candidate: CandidateRecipient, notified: bool, attempts: u32) -> Self {
        Self {
            recipient: candidate.recipient,
            organ: candidate.organ,
            facility: candidate.facility,
            compatibility: candidate.compatibility,
            urgency_tier: candidate.urgency_tier,
            distance_km: candidate.distance_km,
            estimated_survival_benefit_years: candidate.estimated_survival_benefit_years,
            notified,
            notification_attempts: attempts,
        }
    }

    /// Counted toward `estimated_lives_saved`.
    pub fn counts_as_life_saved(&self) -> bool {
        self.notified && self.urgency_tier <= 2
    }
}

// ---------------------------------------------------------------------------
// Urgency weighting
// ---------------------------------------------------------------------------

/// Weight for tiers missing from the table.
pub const FALLBACK_URGENCY_WEIGHT: f64 = 0.5;

/// Urgency tier → ranking weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UrgencyWeights(BTreeMap<u8, f64>);

impl Default for UrgencyWeights {
    fn default() -> Self {
        Self(BTreeMap::from([(1, 3.0), (2, 2.0), (3, 1.0)]))
    }
}

impl UrgencyWeights {
    pub fn new(weights: BTreeMap<u8, f64>) -> Self {
        Self(weights)
    }

    pub fn weight(&self, tier: u8) -> f64 {
        self.0.get(&tier).copied().unwrap_or(FALLBACK_URGENCY_WEIGHT)
    }

    /// Ranking key: `compatibility × urgency_weight(tier)`.
    pub fn ranking_key(&self, candidate: &CandidateRecipient) -> f64 {
        candidate.compatibility.as_f64() * self.weight(candidate.urgency_tier)
    }
}

/// Stable descending sort by ranking key, truncated to `top_n`.
pub fn rank_recipients(
    candidates: Vec<CandidateRecipient>,
    weights: &UrgencyWeights,
    top_n: usize,
) -> Vec<CandidateRecipient> {
    let mut keyed: Vec<(f64, CandidateRecipient)> = candidates
        .into_iter()
        .map(|c| (weights.ranking_key(&c), c))
        .collect();
    keyed.sort_by(|a, b| b.0.total_cmp(&a.0));
    keyed.into_iter().take(top_n).map(|(_, c)| c).collect()
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn candidate(id: &str, organ: Organ, compat: f64, tier: u8) -> CandidateRecipient {
        CandidateRecipient {
            recipient: RecipientId::new(id).unwrap(),
            organ,
            facility: FacilityId::new(format!("TC-{id}")).unwrap(),
            endpoint: None,
            compatibility: Score::from_f64(compat),
            urgency_tier: tier,
            distance_km: 50,
            estimated_survival_benefit_years: 10,
        }
    }
}
