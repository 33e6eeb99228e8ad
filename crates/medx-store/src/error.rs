use medx_core::{CanonicalizationError, JurisdictionCode, PatientIdHash, RetentionPeriod, Score};
use thiserror::Error;

/// Errors from [`crate::DirectiveStore`] operations.
///
/// Messages carry patient hashes and jurisdiction codes only.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The record names a jurisdiction with no configured retention bound.
    #[error("jurisdiction {jurisdiction} has no configured retention policy")]
    UnknownJurisdiction {
        jurisdiction: JurisdictionCode,
    },

    /// Requested retention is longer than the jurisdiction allows.
    #[error("retention {requested} exceeds {jurisdiction} maximum of {max}")]
    RetentionExceeded {
        jurisdiction: JurisdictionCode,
        requested: RetentionPeriod,
        max: RetentionPeriod,
    },

    /// Legal-validity score is below the acceptance floor.
    #[error("legal validity {score} is below the minimum {minimum}")]
    LowValidity {
        score: Score,
        minimum: Score,
    },

    /// Erasure was requested before the retention bound elapsed.
    #[error("records for patient {patient} are not yet eligible for erasure under {jurisdiction}")]
    NotEligible {
        patient: PatientIdHash,
        jurisdiction: JurisdictionCode,
    },

    /// No records exist for the patient.
    #[error("no directive records for patient {patient}")]
    NotFound {
        patient: PatientIdHash,
    },

    /// An audit entry or content hash could not be canonicalized.
    #[error("canonicalization failed: {0}")]
    Canonicalization(#[from] CanonicalizationError),
}

impl StoreError {
    /// Short machine-readable reason, used as a metrics label.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::UnknownJurisdiction { .. } => "unknown_jurisdiction",
            Self::RetentionExceeded { .. } => "retention_exceeded",
            Self::LowValidity { .. } => "low_validity",
            Self::NotEligible { .. } => "not_eligible",
            Self::NotFound { .. } => "not_found",
            Self::Canonicalization(_) => "canonicalization",
        }
    }
}
