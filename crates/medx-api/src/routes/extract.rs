//! # Extraction Dry Run
//!
//! `POST /v1/extract` runs the tiered extractor and returns the outcome
//! without storing anything or touching the audit log.
//!
//! `GET /v1/extract/stats` reports running totals and processing cost for
//! every extraction, intake included.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use medx_extract::{ExtractionOutcome, ProcessingStats};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::extractors::{extract_validated_json, require_non_empty, Validate};
use crate::state::AppState;

/// Request body for an extraction dry run.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ExtractRequest {
    pub text: String,
}

impl Validate for ExtractRequest {
    fn validate(&self) -> Result<(), String> {
        require_non_empty("text", &self.text)
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/extract", post(extract_directives))
        .route("/v1/extract/stats", get(extraction_stats))
}

/// POST /v1/extract: classify text without storing.
#[utoipa::path(
    post,
    path = "/v1/extract",
    request_body = ExtractRequest,
    responses(
        (status = 200, description = "Extraction outcome", body = serde_json::Value),
        (status = 422, description = "Empty text", body = crate::error::ErrorBody),
    ),
    tag = "extraction"
)]
pub(crate) async fn extract_directives(
    State(state): State<AppState>,
    _caller: CallerIdentity,
    body: Result<Json<ExtractRequest>, JsonRejection>,
) -> Result<Json<ExtractionOutcome>, AppError> {
    let req = extract_validated_json(body)?;
    Ok(Json(state.extractor.extract(&req.text).await))
}

/// GET /v1/extract/stats: running extraction totals.
#[utoipa::path(
    get,
    path = "/v1/extract/stats",
    responses(
        (status = 200, description = "Processing statistics", body = serde_json::Value),
    ),
    tag = "extraction"
)]
pub(crate) async fn extraction_stats(
    State(state): State<AppState>,
    _caller: CallerIdentity,
) -> Json<ProcessingStats> {
    Json(state.extractor.stats())
}
