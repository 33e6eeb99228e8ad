//! # Directive Records
//!
//! A [`DirectiveDraft`] is what intake hands to the store; a
//! [`DirectiveRecord`] is what the store keeps. The store alone assigns
//! `version`, `created_at` and `updated_at`.
//!
//! Neither type carries directive text. `content_hash` commits to the
//! encrypted content held by the PHI blob store at `content_ref`.

use medx_core::{
    ClassificationMetadata, ContentDigest, BlobRef, DirectiveType, JurisdictionCode,
    PatientIdHash, RetentionPeriod, Score, Timestamp,
};
use medx_crypto::Ed25519Signature;
use serde::{Deserialize, Serialize};

/// Input to [`crate::DirectiveStore::store`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectiveDraft {
    pub patient: PatientIdHash,
    pub directive_type: DirectiveType,
    pub content_hash: ContentDigest,
    pub content_ref: BlobRef,
    pub jurisdiction: JurisdictionCode,
    /// Requested retention; must not exceed the jurisdiction maximum.
    pub retention: RetentionPeriod,
    pub legal_validity: Score,
    pub confidence: Score,
    #[serde(default)]
    pub conditions: Vec<String>,
    pub classification: ClassificationMetadata,
    /// Signature from the signing service over the authorization message.
    pub authorizing_signature: Ed25519Signature,
}

/// The current record for one (patient, directive type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectiveRecord {
    pub patient: PatientIdHash,
    pub directive_type: DirectiveType,
    pub content_hash: ContentDigest,
    pub content_ref: BlobRef,
    pub jurisdiction: JurisdictionCode,
    pub retention: RetentionPeriod,
    pub legal_validity: Score,
    pub confidence: Score,
    pub conditions: Vec<String>,
    pub classification: ClassificationMetadata,
    pub authorizing_signature: Ed25519Signature,
    /// Starts at 1; bumped on every update.
    pub version: u32,
    /// Time of first storage. Retention age is measured from here.
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Content hashes of earlier versions, oldest first.
    #[serde(default)]
    pub superseded_digests: Vec<ContentDigest>,
}

impl DirectiveRecord {
    /// First version of a record.
    pub(crate) fn first(draft: DirectiveDraft, now: Timestamp) -> Self {
        Self {
            patient: draft.patient,
            directive_type: draft.directive_type,
            content_hash: draft.content_hash,
            content_ref: draft.content_ref,
            jurisdiction: draft.jurisdiction,
            retention: draft.retention,
            legal_validity: draft.legal_validity,
            confidence: draft.confidence,
            conditions: draft.conditions,
            classification: draft.classification,
            authorizing_signature: draft.authorizing_signature,
            version: 1,
            created_at: now,
            updated_at: now,
            superseded_digests: Vec::new(),
        }
    }

    /// Next version of an existing record. `created_at` is preserved.
    pub(crate) fn superseded_by(self, draft: DirectiveDraft, now: Timestamp) -> Self {
        let mut superseded = self.superseded_digests;
        superseded.push(self.content_hash);
        Self {
            version: self.version.saturating_add(1),
            created_at: self.created_at,
            superseded_digests: superseded,
            ..Self::first(draft, now)
        }
    }

    /// Seconds since first storage, as of `now`.
    pub fn age_secs(&self, now: &Timestamp) -> i64 {
        now.secs_since(&self.created_at)
    }

    /// The effective bound: the shorter of the record's requested retention
    /// and the jurisdiction maximum. `None` means the jurisdiction is no
    /// longer configured, in which case the record's own retention applies.
    pub fn effective_retention(&self, jurisdiction_max: Option<RetentionPeriod>) -> RetentionPeriod {
        match jurisdiction_max {
            Some(max) => self.retention.min(max),
            None => self.retention,
        }
    }

    /// Whether the record has outlived its effective retention as of `now`.
    pub fn is_expired(&self, now: &Timestamp, jurisdiction_max: Option<RetentionPeriod>) -> bool {
        self.effective_retention(jurisdiction_max)
            .is_exceeded_by(self.age_secs(now))
    }
}
