//! # Consent-Scoped Data Release
//!
//! A data-sharing consent names the institution categories it covers. Only
//! configured research targets in those categories are ever contacted; a
//! consent naming no specific category covers `general_research` alone.
//!
//! Anonymization itself is delegated to an [`Anonymizer`]. The engine only
//! guarantees scope and hands the resulting package reference onward.

use std::collections::BTreeSet;

use async_trait::async_trait;
use medx_core::{
    sha256_hex, CanonicalBytes, ContentDigest, FacilityId, InstitutionCategory, PatientIdHash,
};
use medx_store::DirectiveRecord;
use serde::{Deserialize, Serialize};

use crate::error::AnonymizeError;

/// A research institution that may receive released data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchTarget {
    pub institution: FacilityId,
    pub category: InstitutionCategory,
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Categories a consent's conditions grant.
pub fn consent_scope(conditions: &[String]) -> BTreeSet<InstitutionCategory> {
    let scope: BTreeSet<_> = conditions
        .iter()
        .filter_map(|c| InstitutionCategory::from_consent_condition(c))
        .collect();
    if scope.is_empty() {
        BTreeSet::from([InstitutionCategory::GeneralResearch])
    } else {
        scope
    }
}

/// Targets inside `scope`, in configuration order.
pub fn targets_in_scope<'a>(
    targets: &'a [ResearchTarget],
    scope: &BTreeSet<InstitutionCategory>,
) -> Vec<&'a ResearchTarget> {
    targets.iter().filter(|t| scope.contains(&t.category)).collect()
}

/// Output of anonymization. Holds no identifying content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnonymizedPackage {
    /// Stable pseudonym replacing the patient hash downstream.
    pub pseudonym: String,
    /// Where the anonymized content can be fetched.
    pub package_ref: String,
    /// Hash of the directive content the package was derived from.
    pub source_digest: ContentDigest,
}

/// Produces releasable packages from a consent record.
#[async_trait]
pub trait Anonymizer: Send + Sync {
    async fn anonymize(&self, record: &DirectiveRecord) -> Result<AnonymizedPackage, AnonymizeError>;
}

/// Salted pseudonymization of the patient hash. Stands in for an
/// external de-identification service.
#[derive(Debug, Clone)]
pub struct PseudonymizingAnonymizer {
    salt: String,
}

#[derive(Serialize)]
struct PseudonymInput<'a> {
    salt: &'a str,
    patient: &'a PatientIdHash,
}

impl PseudonymizingAnonymizer {
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }
}

#[async_trait]
impl Anonymizer for PseudonymizingAnonymizer {
    async fn anonymize(&self, record: &DirectiveRecord) -> Result<AnonymizedPackage, AnonymizeError> {
        let input = CanonicalBytes::new(&PseudonymInput {
            salt: &self.salt,
            patient: &record.patient,
        })
        .map_err(|e| AnonymizeError::Failed {
            reason: e.to_string(),
        })?;
        let pseudonym = sha256_hex(&input);
        let package_ref = format!("anon:{}", &pseudonym[..16]);
        Ok(AnonymizedPackage {
            pseudonym,
            package_ref,
            source_digest: record.content_hash.clone(),
        })
    }
}

/// Result of releasing to one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRelease {
    pub institution: FacilityId,
    pub category: InstitutionCategory,
    pub package_ref: String,
    pub released: bool,
    pub attempts: u32,
}
