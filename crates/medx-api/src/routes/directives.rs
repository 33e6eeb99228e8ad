//! # Directive Records
//!
//! Intake, administrative read, erasure and audit trail.
//!
//! - `POST /v1/directives`: extract, store, report per-candidate outcome.
//! - `GET /v1/directives/{patient_hash}`: audited administrative read.
//! - `DELETE /v1/directives/{patient_hash}?jurisdiction=XX`: erasure once
//!   the jurisdiction's retention bound has elapsed.
//! - `GET /v1/directives/{patient_hash}/audit`: the patient's audit entries.

use std::collections::BTreeSet;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use medx_core::{JurisdictionCode, PatientIdHash, RetentionPeriod, Score};
use medx_extract::ExtractionOutcome;
use medx_store::{AuditEntry, AuditPurpose, DirectiveRecord, PhiBlobStore};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, require_non_empty, Validate};
use crate::intake::{intake, IntakeCommand, Rejection};
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / Response types
// ---------------------------------------------------------------------------

/// Request body for directive intake.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDirectivesRequest {
    /// Raw patient identifier. Hashed on receipt, never stored or logged.
    pub patient_id: String,
    /// Jurisdiction code governing retention (e.g. "US").
    pub jurisdiction: String,
    /// Requested retention in days. Defaults to the jurisdiction maximum.
    #[serde(default)]
    pub retention_days: Option<u64>,
    /// Free-text directive statement.
    pub text: String,
    /// Reviewer-attested legal validity in `[0, 1]`, replacing the
    /// textual estimate.
    #[serde(default)]
    pub attested_validity: Option<f64>,
}

impl Validate for CreateDirectivesRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("patient_id", &self.patient_id)?;
        require_non_empty("jurisdiction", &self.jurisdiction)?;
        require_non_empty("text", &self.text)?;
        if self.retention_days == Some(0) {
            return Err("retention_days must be positive".into());
        }
        if let Some(v) = self.attested_validity {
            if !(0.0..=1.0).contains(&v) {
                return Err("attested_validity must be within [0, 1]".into());
            }
        }
        Ok(())
    }
}

/// Outcome of an intake request.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreateDirectivesResponse {
    /// Hex patient key for later reads.
    pub patient_hash: String,
    /// Records written, one per accepted directive type.
    #[schema(value_type = Vec<Object>)]
    pub stored: Vec<DirectiveRecord>,
    /// Candidates the store refused.
    #[schema(value_type = Vec<Object>)]
    pub rejected: Vec<Rejection>,
    /// Full extraction result, including review flags.
    #[schema(value_type = Object)]
    pub extraction: ExtractionOutcome,
}

/// A patient's current directive records.
#[derive(Debug, Serialize, ToSchema)]
pub struct DirectiveListResponse {
    pub patient_hash: String,
    #[schema(value_type = Vec<Object>)]
    pub records: Vec<DirectiveRecord>,
}

/// Query parameters for erasure.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ErasureParams {
    /// Jurisdiction whose retention bound must have elapsed.
    pub jurisdiction: String,
}

/// Result of a successful erasure.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErasureResponse {
    pub patient_hash: String,
    pub jurisdiction: String,
    /// Number of records removed.
    pub erased: usize,
}

/// Audit trail for one patient.
#[derive(Debug, Serialize, ToSchema)]
pub struct AuditTrailResponse {
    pub patient_hash: String,
    /// True when the whole audit hash chain verifies.
    pub chain_valid: bool,
    #[schema(value_type = Vec<Object>)]
    pub entries: Vec<AuditEntry>,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/directives", post(create_directives))
        .route(
            "/v1/directives/{patient_hash}",
            get(get_directives).delete(erase_directives),
        )
        .route("/v1/directives/{patient_hash}/audit", get(get_audit_trail))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /v1/directives: extract and store directives from free text.
#[utoipa::path(
    post,
    path = "/v1/directives",
    request_body = CreateDirectivesRequest,
    responses(
        (status = 201, description = "At least one directive stored", body = CreateDirectivesResponse),
        (status = 422, description = "Nothing recognized, or every candidate refused", body = crate::error::ErrorBody),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorBody),
    ),
    tag = "directives"
)]
pub(crate) async fn create_directives(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateDirectivesRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateDirectivesResponse>), AppError> {
    let req = extract_validated_json(body)?;
    let command = IntakeCommand {
        patient: PatientIdHash::from_patient_id(&req.patient_id)?,
        jurisdiction: JurisdictionCode::new(req.jurisdiction)?,
        retention: req.retention_days.map(RetentionPeriod::from_days),
        text: req.text,
        attested_validity: req.attested_validity.map(Score::from_f64),
    };

    let result = intake(&state, command, &caller.accessor).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateDirectivesResponse {
            patient_hash: result.patient.to_hex(),
            stored: result.stored,
            rejected: result.rejected,
            extraction: result.extraction,
        }),
    ))
}

/// GET /v1/directives/{patient_hash}: administrative read, audited.
#[utoipa::path(
    get,
    path = "/v1/directives/{patient_hash}",
    params(("patient_hash" = String, Path, description = "Hex patient key")),
    responses(
        (status = 200, description = "Current records", body = DirectiveListResponse),
        (status = 404, description = "No live records", body = crate::error::ErrorBody),
    ),
    tag = "directives"
)]
pub(crate) async fn get_directives(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(patient_hash): Path<String>,
) -> Result<Json<DirectiveListResponse>, AppError> {
    let patient = PatientIdHash::from_hex(&patient_hash)?;
    let records = state
        .store
        .read_audited(&patient, &caller.accessor, AuditPurpose::Administrative)?;
    if records.is_empty() {
        return Err(AppError::NotFound(format!("no directive records for patient {patient}")));
    }
    Ok(Json(DirectiveListResponse {
        patient_hash: patient.to_hex(),
        records,
    }))
}

/// DELETE /v1/directives/{patient_hash}: erase once retention has elapsed.
#[utoipa::path(
    delete,
    path = "/v1/directives/{patient_hash}",
    params(
        ("patient_hash" = String, Path, description = "Hex patient key"),
        ErasureParams,
    ),
    responses(
        (status = 200, description = "Records erased; audit trail kept", body = ErasureResponse),
        (status = 404, description = "No records", body = crate::error::ErrorBody),
        (status = 409, description = "Retention bound not yet elapsed", body = crate::error::ErrorBody),
    ),
    tag = "directives"
)]
pub(crate) async fn erase_directives(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(patient_hash): Path<String>,
    Query(params): Query<ErasureParams>,
) -> Result<Json<ErasureResponse>, AppError> {
    let patient = PatientIdHash::from_hex(&patient_hash)?;
    let jurisdiction = JurisdictionCode::new(params.jurisdiction)?;
    let removed = state.store.erase(&patient, &jurisdiction, &caller.accessor).await?;

    let refs: BTreeSet<_> = removed.iter().map(|r| r.content_ref.clone()).collect();
    for reference in &refs {
        if let Err(e) = state.blobs.delete(reference).await {
            tracing::warn!(patient = %patient, error = %e, "blob purge after erasure failed");
        }
    }

    Ok(Json(ErasureResponse {
        patient_hash: patient.to_hex(),
        jurisdiction: jurisdiction.to_string(),
        erased: removed.len(),
    }))
}

/// GET /v1/directives/{patient_hash}/audit: audit trail, oldest first.
#[utoipa::path(
    get,
    path = "/v1/directives/{patient_hash}/audit",
    params(("patient_hash" = String, Path, description = "Hex patient key")),
    responses(
        (status = 200, description = "Audit entries", body = AuditTrailResponse),
    ),
    tag = "directives"
)]
pub(crate) async fn get_audit_trail(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    Path(patient_hash): Path<String>,
) -> Result<Json<AuditTrailResponse>, AppError> {
    let patient = PatientIdHash::from_hex(&patient_hash)?;
    Ok(Json(AuditTrailResponse {
        patient_hash: patient.to_hex(),
        chain_valid: state.store.audit_log().verify_chain().is_ok(),
        entries: state.store.audit_trail(&patient),
    }))
}
