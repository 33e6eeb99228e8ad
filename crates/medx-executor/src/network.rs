//! # Organ Network
//!
//! [`OrganNetwork`] is the outbound collaborator that knows who is waiting
//! for which organ. [`WaitlistRegistry`] is the in-process implementation:
//! a configured waitlist scored against the donor profile.
//!
//! ## Scoring
//!
//! - ABO: identical group 1.0, compatible 0.85, incompatible excluded.
//!   Unknown donor typing scores 0.8. Cornea and tissue ignore ABO.
//! - HLA: fraction of the recipient's antigens shared with the donor, 0.5
//!   when either side is untyped.
//! - Distance: up to 0.2 subtracted, linear to 2000 km.
//!
//! `compatibility = 0.6 × abo + 0.4 × hla − distance_penalty`, clamped.

use async_trait::async_trait;
use medx_core::{FacilityId, Organ, RecipientId, Score};
use serde::{Deserialize, Serialize};

use crate::error::NetworkError;
use crate::matching::{BloodType, CandidateRecipient, DonorProfile};

/// Source of candidate recipients for an organ.
#[async_trait]
pub trait OrganNetwork: Send + Sync {
    fn name(&self) -> &'static str;

    /// Compatible candidates for `organ`, in the network's own order.
    async fn candidates(
        &self,
        organ: Organ,
        donor: Option<&DonorProfile>,
    ) -> Result<Vec<CandidateRecipient>, NetworkError>;
}

/// One waiting recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub recipient: RecipientId,
    pub organ: Organ,
    pub blood_type: BloodType,
    #[serde(default)]
    pub hla: Vec<String>,
    pub urgency_tier: u8,
    pub distance_km: u32,
    pub facility: FacilityId,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub estimated_survival_benefit_years: u16,
}

const MAX_DISTANCE_KM: f64 = 2000.0;
const DISTANCE_PENALTY: f64 = 0.2;

fn abo_component(organ: Organ, donor: Option<&DonorProfile>, recipient: BloodType) -> Option<f64> {
    if matches!(organ, Organ::Cornea | Organ::Tissue) {
        return Some(1.0);
    }
    match donor {
        None => Some(0.8),
        Some(d) if d.blood_type == recipient => Some(1.0),
        Some(d) if d.blood_type.can_donate_to(recipient) => Some(0.85),
        Some(_) => None,
    }
}

fn hla_component(donor: Option<&DonorProfile>, recipient_hla: &[String]) -> f64 {
    match donor {
        Some(d) if !d.hla.is_empty() && !recipient_hla.is_empty() => {
            let shared = recipient_hla.iter().filter(|a| d.hla.contains(a)).count();
            shared as f64 / recipient_hla.len() as f64
        }
        _ => 0.5,
    }
}

/// Compatibility of `entry` with the donor, or `None` when ABO-incompatible.
pub fn compatibility(donor: Option<&DonorProfile>, entry: &WaitlistEntry) -> Option<Score> {
    let abo = abo_component(entry.organ, donor, entry.blood_type)?;
    let hla = hla_component(donor, &entry.hla);
    let penalty = (f64::from(entry.distance_km) / MAX_DISTANCE_KM).min(1.0) * DISTANCE_PENALTY;
    Some(Score::from_f64(0.6 * abo + 0.4 * hla - penalty))
}

/// Configured waitlist scored in process.
#[derive(Debug, Clone, Default)]
pub struct WaitlistRegistry {
    entries: Vec<WaitlistEntry>,
}

impl WaitlistRegistry {
    pub fn new(entries: Vec<WaitlistEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl OrganNetwork for WaitlistRegistry {
    fn name(&self) -> &'static str {
        "waitlist_registry"
    }

    async fn candidates(
        &self,
        organ: Organ,
        donor: Option<&DonorProfile>,
    ) -> Result<Vec<CandidateRecipient>, NetworkError> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.organ == organ)
            .filter_map(|e| {
                compatibility(donor, e).map(|score| CandidateRecipient {
                    recipient: e.recipient.clone(),
                    organ: e.organ,
                    facility: e.facility.clone(),
                    endpoint: e.endpoint.clone(),
                    compatibility: score,
                    urgency_tier: e.urgency_tier,
                    distance_km: e.distance_km,
                    estimated_survival_benefit_years: e.estimated_survival_benefit_years,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, organ: Organ, blood: BloodType, hla: &[&str], km: u32) -> WaitlistEntry {
        WaitlistEntry {
            recipient: RecipientId::new(id).unwrap(),
            organ,
            blood_type: blood,
            hla: hla.iter().map(|s| s.to_string()).collect(),
            urgency_tier: 1,
            distance_km: km,
            facility: FacilityId::new("TC-1").unwrap(),
            endpoint: None,
            estimated_survival_benefit_years: 12,
        }
    }

    fn donor() -> DonorProfile {
        DonorProfile {
            blood_type: BloodType::OPos,
            hla: vec!["A*02:01".into(), "B*07:02".into()],
        }
    }

    #[test]
    fn identical_group_full_hla_nearby_scores_high() {
        let e = entry("r1", Organ::Kidney, BloodType::OPos, &["A*02:01", "B*07:02"], 0);
        assert_eq!(compatibility(Some(&donor()), &e), Some(Score::ONE));
    }

    #[test]
    fn incompatible_group_is_excluded() {
        let e = entry("r1", Organ::Kidney, BloodType::ONeg, &[], 10);
        assert_eq!(compatibility(Some(&donor()), &e), None);
    }

    #[test]
    fn distance_lowers_score() {
        let near = entry("r1", Organ::Liver, BloodType::APos, &["A*02:01"], 10);
        let far = entry("r2", Organ::Liver, BloodType::APos, &["A*02:01"], 1500);
        let d = donor();
        assert!(compatibility(Some(&d), &near) > compatibility(Some(&d), &far));
    }

    #[test]
    fn cornea_ignores_blood_group() {
        let e = entry("r1", Organ::Cornea, BloodType::ONeg, &[], 0);
        assert!(compatibility(Some(&donor()), &e).is_some());
    }

    #[tokio::test]
    async fn registry_filters_by_organ_and_group() {
        let reg = WaitlistRegistry::new(vec![
            entry("k1", Organ::Kidney, BloodType::APos, &[], 10),
            entry("k2", Organ::Kidney, BloodType::ONeg, &[], 10),
            entry("h1", Organ::Heart, BloodType::OPos, &[], 10),
        ]);
        let got = reg.candidates(Organ::Kidney, Some(&donor())).await.unwrap();
        let ids: Vec<_> = got.iter().map(|c| c.recipient.as_str()).collect();
        assert_eq!(ids, ["k1"]);

        let unknown = reg.candidates(Organ::Kidney, None).await.unwrap();
        assert_eq!(unknown.len(), 2);
    }
}
