//! # Audit Log
//!
//! Append-only record of every READ, WRITE and ERASE against directive data.
//!
//! ## Chain Derivation
//!
//! ```text
//! digest_n = SHA256(JCS({sequence, patient, accessor, action, purpose,
//!                        directive_type, outcome, timestamp, prev_digest}))
//! prev_digest_n = digest_{n-1}      (None for the first entry)
//! ```
//!
//! Entries never carry directive content, only patient hashes, accessor
//! identities and short outcome codes. Erasure of a patient's records leaves
//! their audit entries in place.
//!
//! ## Integrity Invariants
//!
//! - Sequence numbers are dense from zero.
//! - Every entry's `prev_digest` equals the previous entry's `digest`.
//! - Every entry's `digest` equals the recomputed digest of its body.
//!
//! [`AuditLog::verify_chain`] checks all three.

use std::collections::HashMap;
use std::sync::Arc;

use medx_core::{
    sha256_digest, AccessorId, CanonicalBytes, CanonicalizationError, Clock, ContentDigest,
    DirectiveType, MedxError, PatientIdHash, Timestamp,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Vocabulary
// ---------------------------------------------------------------------------

/// What the accessor did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Read,
    Write,
    Erase,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "READ",
            Self::Write => "WRITE",
            Self::Erase => "ERASE",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the access happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditPurpose {
    Creation,
    Update,
    Emergency,
    ErasureRequest,
    RetentionSweep,
    PostMortemExecution,
    Administrative,
}

impl AuditPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creation => "creation",
            Self::Update => "update",
            Self::Emergency => "emergency",
            Self::ErasureRequest => "erasure_request",
            Self::RetentionSweep => "retention_sweep",
            Self::PostMortemExecution => "post_mortem_execution",
            Self::Administrative => "administrative",
        }
    }
}

impl std::fmt::Display for AuditPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Events and entries
// ---------------------------------------------------------------------------

/// An access about to be recorded. The log assigns sequence, time and chain
/// links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub patient: PatientIdHash,
    pub accessor: AccessorId,
    pub action: AuditAction,
    pub purpose: AuditPurpose,
    pub directive_type: Option<DirectiveType>,
    pub outcome: String,
}

impl AuditEvent {
    /// A successful access with no specific directive type.
    pub fn new(
        patient: PatientIdHash,
        accessor: AccessorId,
        action: AuditAction,
        purpose: AuditPurpose,
    ) -> Self {
        Self {
            patient,
            accessor,
            action,
            purpose,
            directive_type: None,
            outcome: "ok".to_string(),
        }
    }

    pub fn with_directive_type(mut self, directive_type: DirectiveType) -> Self {
        self.directive_type = Some(directive_type);
        self
    }

    /// Short outcome code, e.g. `"not_found"` or `"rejected:authentication_failed"`.
    pub fn with_outcome(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = outcome.into();
        self
    }
}

/// One link in the audit chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub sequence: u64,
    pub patient: PatientIdHash,
    pub accessor: AccessorId,
    pub action: AuditAction,
    pub purpose: AuditPurpose,
    pub directive_type: Option<DirectiveType>,
    pub outcome: String,
    pub timestamp: Timestamp,
    pub prev_digest: Option<ContentDigest>,
    pub digest: ContentDigest,
}

/// The hashed portion of an entry: everything except `digest`.
#[derive(Serialize)]
struct EntryBody<'a> {
    sequence: u64,
    patient: &'a PatientIdHash,
    accessor: &'a AccessorId,
    action: AuditAction,
    purpose: AuditPurpose,
    directive_type: Option<DirectiveType>,
    outcome: &'a str,
    timestamp: &'a Timestamp,
    prev_digest: Option<&'a ContentDigest>,
}

impl AuditEntry {
    fn compute_digest(&self) -> Result<ContentDigest, CanonicalizationError> {
        let body = EntryBody {
            sequence: self.sequence,
            patient: &self.patient,
            accessor: &self.accessor,
            action: self.action,
            purpose: self.purpose,
            directive_type: self.directive_type,
            outcome: &self.outcome,
            timestamp: &self.timestamp,
            prev_digest: self.prev_digest.as_ref(),
        };
        Ok(sha256_digest(&CanonicalBytes::new(&body)?))
    }
}

// ---------------------------------------------------------------------------
// Log
// ---------------------------------------------------------------------------

#[derive(Default)]
struct AuditChain {
    entries: Vec<AuditEntry>,
    by_patient: HashMap<PatientIdHash, Vec<usize>>,
}

/// Hash-chained, append-only audit log.
pub struct AuditLog {
    chain: Mutex<AuditChain>,
    clock: Arc<dyn Clock>,
}

impl AuditLog {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            chain: Mutex::new(AuditChain::default()),
            clock,
        }
    }

    /// Append an entry. The chain lock is held across digest computation so
    /// sequence numbers and links stay consistent under concurrent writers.
    pub fn record(&self, event: AuditEvent) -> Result<AuditEntry, CanonicalizationError> {
        let mut chain = self.chain.lock();
        let sequence = chain.entries.len() as u64;
        let prev_digest = chain.entries.last().map(|e| e.digest.clone());

        let mut entry = AuditEntry {
            sequence,
            patient: event.patient,
            accessor: event.accessor,
            action: event.action,
            purpose: event.purpose,
            directive_type: event.directive_type,
            outcome: event.outcome,
            timestamp: self.clock.now(),
            prev_digest,
            // Placeholder until the body digest is computed below.
            digest: ContentDigest::new(medx_core::DigestAlgorithm::Sha256, [0u8; 32]),
        };
        entry.digest = entry.compute_digest()?;

        let index = chain.entries.len();
        chain.by_patient.entry(entry.patient).or_default().push(index);
        chain.entries.push(entry.clone());

        tracing::debug!(
            sequence,
            action = %entry.action,
            purpose = %entry.purpose,
            outcome = %entry.outcome,
            "audit entry recorded"
        );
        Ok(entry)
    }

    /// All entries for a patient, oldest first.
    pub fn entries_for(&self, patient: &PatientIdHash) -> Vec<AuditEntry> {
        let chain = self.chain.lock();
        chain
            .by_patient
            .get(patient)
            .map(|idx| idx.iter().map(|&i| chain.entries[i].clone()).collect())
            .unwrap_or_default()
    }

    /// The most recent `n` entries, oldest first.
    pub fn last_n(&self, n: usize) -> Vec<AuditEntry> {
        let chain = self.chain.lock();
        let start = chain.entries.len().saturating_sub(n);
        chain.entries[start..].to_vec()
    }

    pub fn len(&self) -> usize {
        self.chain.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Digest of the newest entry.
    pub fn head(&self) -> Option<ContentDigest> {
        self.chain.lock().entries.last().map(|e| e.digest.clone())
    }

    /// Recompute every link and digest.
    pub fn verify_chain(&self) -> Result<(), MedxError> {
        let chain = self.chain.lock();
        let mut prev: Option<&ContentDigest> = None;
        for (i, entry) in chain.entries.iter().enumerate() {
            if entry.sequence != i as u64 {
                return Err(MedxError::Integrity(format!(
                    "audit entry {i} has sequence {}",
                    entry.sequence
                )));
            }
            if entry.prev_digest.as_ref() != prev {
                return Err(MedxError::Integrity(format!(
                    "audit entry {i} does not link to its predecessor"
                )));
            }
            if entry.compute_digest()? != entry.digest {
                return Err(MedxError::Integrity(format!(
                    "audit entry {i} digest does not match its body"
                )));
            }
            prev = Some(&entry.digest);
        }
        Ok(())
    }

    #[cfg(test)]
    fn tamper(&self, index: usize, outcome: &str) {
        self.chain.lock().entries[index].outcome = outcome.to_string();
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog").field("len", &self.len()).finish()
    }
}
