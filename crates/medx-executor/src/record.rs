//! # Execution Records
//!
//! One [`ExecutionRecord`] per death event. It lists an outcome for every
//! directive read at execution time and is sealed with a verification
//! digest: `SHA256(canonical(record without "verification"))`. Anyone holding
//! the record can recompute the digest with [`ExecutionRecord::verify`].

use medx_core::{
    sha256_digest, CanonicalBytes, CanonicalizationError, ContentDigest, DirectiveType,
    ExecutionId, PatientIdHash, Timestamp, TriggerEventId,
};
use serde::{Deserialize, Serialize};

use crate::matching::RecipientMatch;
use crate::release::DataRelease;

/// How one directive's execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Every action was acknowledged.
    Completed,
    /// Some actions were acknowledged and some were exhausted.
    PartialFailure,
    /// No action was acknowledged.
    Failed,
    /// Not actionable post-mortem, or nothing in scope.
    Skipped,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::PartialFailure => "partial_failure",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }

    /// Status from acknowledged and unacknowledged action counts.
    pub fn from_counts(succeeded: usize, failed: usize) -> Self {
        match (succeeded, failed) {
            (_, 0) => Self::Completed,
            (0, _) => Self::Failed,
            _ => Self::PartialFailure,
        }
    }
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of executing one directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectiveOutcome {
    pub directive_type: DirectiveType,
    pub content_hash: ContentDigest,
    pub status: OutcomeStatus,
    #[serde(default)]
    pub matches: Vec<RecipientMatch>,
    #[serde(default)]
    pub releases: Vec<DataRelease>,
    pub estimated_lives_saved: u32,
    #[serde(default)]
    pub notes: Vec<String>,
    /// Whether the EHR acknowledged the status update. `None` when no update
    /// was due.
    #[serde(default)]
    pub ehr_updated: Option<bool>,
    pub elapsed_ms: u64,
}

impl DirectiveOutcome {
    pub(crate) fn new(directive_type: DirectiveType, content_hash: ContentDigest) -> Self {
        Self {
            directive_type,
            content_hash,
            status: OutcomeStatus::Skipped,
            matches: Vec::new(),
            releases: Vec::new(),
            estimated_lives_saved: 0,
            notes: Vec::new(),
            ehr_updated: None,
            elapsed_ms: 0,
        }
    }

    pub(crate) fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

/// Immutable record of one post-mortem execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: ExecutionId,
    pub patient: PatientIdHash,
    pub trigger_event_id: TriggerEventId,
    /// When death was confirmed, as reported by the trigger.
    pub confirmed_at: Timestamp,
    pub executed_at: Timestamp,
    pub outcomes: Vec<DirectiveOutcome>,
    pub estimated_lives_saved: u32,
    pub total_elapsed_ms: u64,
    pub verification: ContentDigest,
}

/// Fields of a record before sealing.
pub(crate) struct UnsealedRecord {
    pub execution_id: ExecutionId,
    pub patient: PatientIdHash,
    pub trigger_event_id: TriggerEventId,
    pub confirmed_at: Timestamp,
    pub executed_at: Timestamp,
    pub outcomes: Vec<DirectiveOutcome>,
    pub total_elapsed_ms: u64,
}

impl ExecutionRecord {
    pub(crate) fn seal(unsealed: UnsealedRecord) -> Result<Self, CanonicalizationError> {
        let estimated_lives_saved = unsealed.outcomes.iter().map(|o| o.estimated_lives_saved).sum();
        let mut record = Self {
            execution_id: unsealed.execution_id,
            patient: unsealed.patient,
            trigger_event_id: unsealed.trigger_event_id,
            confirmed_at: unsealed.confirmed_at,
            executed_at: unsealed.executed_at,
            outcomes: unsealed.outcomes,
            estimated_lives_saved,
            total_elapsed_ms: unsealed.total_elapsed_ms,
            verification: ContentDigest::new(medx_core::DigestAlgorithm::Sha256, [0u8; 32]),
        };
        record.verification = record.compute_verification()?;
        Ok(record)
    }

    /// Digest over every field except `verification`.
    pub fn compute_verification(&self) -> Result<ContentDigest, CanonicalizationError> {
        let mut value = serde_json::to_value(self)?;
        if let Some(obj) = value.as_object_mut() {
            obj.remove("verification");
        }
        Ok(sha256_digest(&CanonicalBytes::new(&value)?))
    }

    /// True when the stored digest matches the content.
    pub fn verify(&self) -> bool {
        self.compute_verification()
            .map(|d| d == self.verification)
            .unwrap_or(false)
    }

    /// Overall status: the worst directive status, ignoring skips.
    pub fn status(&self) -> OutcomeStatus {
        let active: Vec<_> = self
            .outcomes
            .iter()
            .map(|o| o.status)
            .filter(|s| *s != OutcomeStatus::Skipped)
            .collect();
        if active.is_empty() {
            OutcomeStatus::Skipped
        } else if active.iter().all(|s| *s == OutcomeStatus::Completed) {
            OutcomeStatus::Completed
        } else if active.iter().all(|s| *s == OutcomeStatus::Failed) {
            OutcomeStatus::Failed
        } else {
            OutcomeStatus::PartialFailure
        }
    }
}
