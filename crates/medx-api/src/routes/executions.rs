//! # Post-Mortem Executions
//!
//! - `POST /v1/executions`: deliver a verified death event. Re-delivery of
//!   the same `(patient, trigger_event_id)` returns the existing record.
//! - `GET /v1/executions?patient_hash=`: execution history, oldest first,
//!   optionally for one patient.
//! - `GET /v1/executions/{execution_id}`: fetch a sealed record.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use medx_core::{ExecutionId, PatientIdHash, Timestamp, TriggerEventId};
use medx_executor::{DeathEvent, DonorProfile, ExecutionRecord};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, require_non_empty, Validate};
use crate::routes::patient_key;
use crate::state::AppState;

/// A death-confirmation event, already verified upstream.
#[derive(Debug, Deserialize, ToSchema)]
pub struct DeathEventRequest {
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub patient_hash: Option<String>,
    /// Idempotency key of the upstream event.
    pub trigger_event_id: String,
    /// RFC 3339 UTC time of confirmation. Defaults to receipt time.
    #[serde(default)]
    pub confirmed_at: Option<String>,
    /// Donor typing, used to score waitlist compatibility.
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub donor: Option<DonorProfile>,
}

impl Validate for DeathEventRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("trigger_event_id", &self.trigger_event_id)
    }
}

/// Query parameters for the execution history.
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryParams {
    /// Hex patient key. All patients when absent.
    #[serde(default)]
    pub patient_hash: Option<String>,
}

/// Stored execution records, oldest first.
#[derive(Debug, Serialize, ToSchema)]
pub struct ExecutionHistoryResponse {
    #[schema(value_type = Vec<Object>)]
    pub executions: Vec<ExecutionRecord>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/executions", post(execute_directives).get(list_executions))
        .route("/v1/executions/{execution_id}", get(get_execution))
}

/// POST /v1/executions: execute a patient's post-mortem directives.
#[utoipa::path(
    post,
    path = "/v1/executions",
    request_body = DeathEventRequest,
    responses(
        (status = 200, description = "Sealed execution record", body = serde_json::Value),
        (status = 422, description = "Invalid event", body = crate::error::ErrorBody),
    ),
    tag = "executions"
)]
pub(crate) async fn execute_directives(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<DeathEventRequest>, JsonRejection>,
) -> Result<Json<ExecutionRecord>, AppError> {
    let req = extract_validated_json(body)?;
    let event = DeathEvent {
        patient: patient_key(req.patient_id.as_deref(), req.patient_hash.as_deref())?,
        trigger_event_id: TriggerEventId::new(req.trigger_event_id)?,
        confirmed_at: match req.confirmed_at.as_deref() {
            Some(ts) => Timestamp::parse(ts)?,
            None => state.store.now(),
        },
        donor: req.donor,
    };
    tracing::info!(
        caller = %caller.accessor,
        patient = %event.patient,
        trigger = %event.trigger_event_id,
        "death event received"
    );
    Ok(Json(state.engine.execute(&event).await?))
}

/// GET /v1/executions: execution history.
#[utoipa::path(
    get,
    path = "/v1/executions",
    params(HistoryParams),
    responses(
        (status = 200, description = "Execution records, oldest first", body = ExecutionHistoryResponse),
        (status = 422, description = "Malformed patient key", body = crate::error::ErrorBody),
    ),
    tag = "executions"
)]
pub(crate) async fn list_executions(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    Query(params): Query<HistoryParams>,
) -> Result<Json<ExecutionHistoryResponse>, AppError> {
    let patient = params
        .patient_hash
        .as_deref()
        .map(PatientIdHash::from_hex)
        .transpose()?;
    Ok(Json(ExecutionHistoryResponse {
        executions: state.engine.history(patient.as_ref()),
    }))
}

/// GET /v1/executions/{execution_id}: fetch a sealed execution record.
#[utoipa::path(
    get,
    path = "/v1/executions/{execution_id}",
    params(("execution_id" = Uuid, Path, description = "Execution ID")),
    responses(
        (status = 200, description = "Sealed execution record", body = serde_json::Value),
        (status = 404, description = "Unknown execution", body = crate::error::ErrorBody),
    ),
    tag = "executions"
)]
pub(crate) async fn get_execution(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    Path(execution_id): Path<Uuid>,
) -> Result<Json<ExecutionRecord>, AppError> {
    Ok(Json(state.engine.get(&ExecutionId(execution_id))?))
}
