//! # Emergency Resolution
//!
//! `POST /v1/emergency/resolve` authenticates a hospital's signed
//! `(patient, hospital, situation)` assertion and returns the emergency
//! projection of the patient's highest-priority directive.
//!
//! - `GET /v1/emergency/alerts?limit=N`: alerts raised to hospitals,
//!   newest first.
//! - `POST /v1/emergency/risk`: rule-based recovery risk. Reads nothing
//!   from the store.
//!
//! The patient may be named by raw identifier (hashed here) or by hex key.
//! Every call that reaches the resolver leaves exactly one audit entry.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use medx_core::HospitalId;
use medx_crypto::Ed25519Signature;
use medx_emergency::{
    assess_risk, EmergencyAlert, EmergencyRequest, EmergencyResponse, RiskAssessment, RiskQuery,
    Vitals,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, require_non_empty, Validate};
use crate::routes::patient_key;
use crate::state::AppState;

/// Request body for emergency resolution.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ResolveRequest {
    /// Raw patient identifier. Mutually exclusive with `patient_hash`.
    #[serde(default)]
    pub patient_id: Option<String>,
    /// Hex patient key. Mutually exclusive with `patient_id`.
    #[serde(default)]
    pub patient_hash: Option<String>,
    pub hospital_id: String,
    /// Clinical situation the request is bound to.
    pub situation: String,
    /// Hex Ed25519 signature over the canonical authorization message.
    #[schema(value_type = String)]
    pub signature: Ed25519Signature,
    /// Bedside vitals: `pulse_bpm`, `systolic_mmhg`, `diastolic_mmhg`.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub vitals: Option<Vitals>,
}

impl Validate for ResolveRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("hospital_id", &self.hospital_id)?;
        require_non_empty("situation", &self.situation)
    }
}

/// Alerts returned when no limit is given.
const DEFAULT_ALERT_LIMIT: usize = 50;

/// Query parameters for the alert listing.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AlertParams {
    /// Maximum alerts to return. Defaults to 50.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Recently raised hospital alerts.
#[derive(Debug, Serialize, ToSchema)]
pub struct AlertListResponse {
    #[schema(value_type = Vec<Object>)]
    pub alerts: Vec<EmergencyAlert>,
}

/// Request body for a risk assessment.
#[derive(Debug, Deserialize, ToSchema)]
pub struct RiskRequest {
    /// Free-text history, e.g. "elderly; diabetes".
    #[serde(default)]
    pub medical_history: String,
    /// Presenting condition, e.g. "cardiac arrest".
    pub current_condition: String,
}

impl Validate for RiskRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("current_condition", &self.current_condition)
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/emergency/resolve", post(resolve_emergency))
        .route("/v1/emergency/alerts", get(list_alerts))
        .route("/v1/emergency/risk", post(assess_patient_risk))
}

/// POST /v1/emergency/resolve: authenticated emergency lookup.
#[utoipa::path(
    post,
    path = "/v1/emergency/resolve",
    request_body = ResolveRequest,
    responses(
        (status = 200, description = "Emergency directive projection", body = serde_json::Value),
        (status = 401, description = "Signature did not authenticate", body = crate::error::ErrorBody),
        (status = 404, description = "No directive on file", body = crate::error::ErrorBody),
        (status = 410, description = "Directive retention has expired", body = crate::error::ErrorBody),
    ),
    tag = "emergency"
)]
pub(crate) async fn resolve_emergency(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<ResolveRequest>, JsonRejection>,
) -> Result<Json<EmergencyResponse>, AppError> {
    let req = extract_validated_json(body)?;
    let request = EmergencyRequest {
        patient: patient_key(req.patient_id.as_deref(), req.patient_hash.as_deref())?,
        hospital: HospitalId::new(req.hospital_id)?,
        situation: req.situation,
        signature: req.signature,
        vitals: req.vitals,
    };
    tracing::debug!(
        caller = %caller.accessor,
        patient = %request.patient,
        hospital = %request.hospital,
        "emergency resolution requested"
    );
    Ok(Json(state.resolver.resolve(&request).await?))
}

/// GET /v1/emergency/alerts: recently raised hospital alerts.
#[utoipa::path(
    get,
    path = "/v1/emergency/alerts",
    params(AlertParams),
    responses(
        (status = 200, description = "Alerts, newest first", body = AlertListResponse),
    ),
    tag = "emergency"
)]
pub(crate) async fn list_alerts(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    Query(params): Query<AlertParams>,
) -> Json<AlertListResponse> {
    let limit = params.limit.unwrap_or(DEFAULT_ALERT_LIMIT);
    Json(AlertListResponse {
        alerts: state.resolver.recent_alerts(limit),
    })
}

/// POST /v1/emergency/risk: recovery risk from history and condition.
#[utoipa::path(
    post,
    path = "/v1/emergency/risk",
    request_body = RiskRequest,
    responses(
        (status = 200, description = "Risk assessment", body = serde_json::Value),
        (status = 422, description = "Missing condition", body = crate::error::ErrorBody),
    ),
    tag = "emergency"
)]
pub(crate) async fn assess_patient_risk(
    _caller: CallerIdentity,
    body: Result<Json<RiskRequest>, JsonRejection>,
) -> Result<Json<RiskAssessment>, AppError> {
    let req = extract_validated_json(body)?;
    Ok(Json(assess_risk(&RiskQuery {
        medical_history: req.medical_history,
        current_condition: req.current_condition,
    })))
}
