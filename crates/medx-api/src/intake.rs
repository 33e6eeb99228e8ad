//! # Directive Intake
//!
//! The creation flow behind `POST /v1/directives`:
//!
//! 1. Hash the patient identifier. The raw value goes no further.
//! 2. Extract candidates from the text.
//! 3. Put the text in the PHI blob store; records keep only the reference.
//! 4. Per candidate: canonicalize `{content_ref, type, conditions, excerpt}`,
//!    hash it, sign it under `intake/{accessor}`, and `store` it.
//!
//! Every directive found in one text shares that text's blob reference. The
//! store only releases the blob once no record of the patient points at it.
//!
//! A candidate the store refuses (retention, validity) is reported and the
//! rest still proceed. If nothing is stored the blob is deleted again and
//! the first refusal is returned as the error.

use medx_core::{
    sha256_digest, AccessorId, BlobRef, CanonicalBytes, DirectiveType, JurisdictionCode,
    PatientIdHash, RetentionPeriod, Score,
};
use medx_crypto::{DerivationPath, SigningService};
use medx_extract::ExtractionOutcome;
use medx_store::{DirectiveDraft, DirectiveRecord, PhiBlobStore, StoreError};
use serde::Serialize;

use crate::error::AppError;
use crate::state::AppState;

/// Validated intake input.
#[derive(Debug, Clone)]
pub struct IntakeCommand {
    pub patient: PatientIdHash,
    pub jurisdiction: JurisdictionCode,
    /// Requested retention. `None` takes the jurisdiction maximum.
    pub retention: Option<RetentionPeriod>,
    pub text: String,
    /// Reviewer-attested validity, replacing the textual estimate.
    pub attested_validity: Option<Score>,
}

/// A candidate the store refused.
#[derive(Debug, Clone, Serialize)]
pub struct Rejection {
    pub directive_type: DirectiveType,
    pub reason: &'static str,
    pub message: String,
}

/// What intake did with each candidate.
#[derive(Debug, Clone)]
pub struct IntakeResult {
    pub patient: PatientIdHash,
    pub extraction: ExtractionOutcome,
    pub stored: Vec<DirectiveRecord>,
    pub rejected: Vec<Rejection>,
}

#[derive(Serialize)]
struct DirectiveContent<'a> {
    content_ref: &'a BlobRef,
    directive_type: DirectiveType,
    conditions: &'a [String],
    source_excerpt: &'a str,
}

fn intake_path(accessor: &AccessorId) -> DerivationPath {
    DerivationPath::new(["intake", accessor.as_str()])
}

/// Run the creation flow for one free-text submission.
pub async fn intake(
    state: &AppState,
    command: IntakeCommand,
    accessor: &AccessorId,
) -> Result<IntakeResult, AppError> {
    let retention = match command.retention {
        Some(requested) => requested,
        None => state
            .store
            .retention_table()
            .max_retention(&command.jurisdiction)
            .ok_or_else(|| {
                AppError::from(StoreError::UnknownJurisdiction {
                    jurisdiction: command.jurisdiction.clone(),
                })
            })?,
    };

    let extraction = state.extractor.extract(&command.text).await;
    if extraction.directives.is_empty() {
        return Err(AppError::Validation(
            "no directive was recognized in the submitted text".into(),
        ));
    }
    let legal_validity = command.attested_validity.unwrap_or(extraction.legal_validity);
    let classification = extraction.classification();

    let content_ref = state
        .blobs
        .put(command.text.as_bytes())
        .await
        .map_err(|e| AppError::ServiceUnavailable(format!("PHI blob store: {e}")))?;

    let path = intake_path(accessor);
    let mut stored = Vec::new();
    let mut rejected = Vec::new();
    let mut first_refusal = None;

    for candidate in &extraction.directives {
        let content = CanonicalBytes::new(&DirectiveContent {
            content_ref: &content_ref,
            directive_type: candidate.directive_type,
            conditions: &candidate.conditions,
            source_excerpt: &candidate.source_excerpt,
        })
        .map_err(|e| AppError::Internal(e.to_string()))?;
        let authorizing_signature = state
            .signer
            .sign(&content, &path)
            .await
            .map_err(|e| AppError::ServiceUnavailable(format!("signing service: {e}")))?;

        let draft = DirectiveDraft {
            patient: command.patient,
            directive_type: candidate.directive_type,
            content_hash: sha256_digest(&content),
            content_ref: content_ref.clone(),
            jurisdiction: command.jurisdiction.clone(),
            retention,
            legal_validity,
            confidence: candidate.confidence,
            conditions: candidate.conditions.clone(),
            classification: classification.clone(),
            authorizing_signature,
        };

        match state.store.store(draft, accessor).await {
            Ok(record) => stored.push(record),
            Err(
                err @ (StoreError::UnknownJurisdiction { .. }
                | StoreError::RetentionExceeded { .. }
                | StoreError::LowValidity { .. }),
            ) => {
                rejected.push(Rejection {
                    directive_type: candidate.directive_type,
                    reason: err.reason(),
                    message: err.to_string(),
                });
                first_refusal.get_or_insert(err);
            }
            Err(other) => return Err(other.into()),
        }
    }

    if stored.is_empty() {
        if let Err(e) = state.blobs.delete(&content_ref).await {
            tracing::warn!(error = %e, "failed to delete blob of fully rejected intake");
        }
        if let Some(err) = first_refusal {
            return Err(err.into());
        }
    }

    tracing::info!(
        patient = %command.patient,
        jurisdiction = %command.jurisdiction,
        stored = stored.len(),
        rejected = rejected.len(),
        review = extraction.requires_human_review,
        "directive intake complete"
    );

    Ok(IntakeResult {
        patient: command.patient,
        extraction,
        stored,
        rejected,
    })
}
