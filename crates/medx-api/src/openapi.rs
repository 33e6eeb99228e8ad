//! # OpenAPI Document Assembly
//!
//! Collects every utoipa-documented handler into one OpenAPI document,
//! served unauthenticated at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Assembled OpenAPI document for the `/v1` surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "MEDX Directive Engine API",
        version = "0.1.0",
        description = "Advance directive intake, emergency resolution, post-mortem execution, retention-bounded erasure and audit."
    ),
    paths(
        // Directives
        crate::routes::directives::create_directives,
        crate::routes::directives::get_directives,
        crate::routes::directives::erase_directives,
        crate::routes::directives::get_audit_trail,
        // Extraction
        crate::routes::extract::extract_directives,
        crate::routes::extract::extraction_stats,
        // Emergency
        crate::routes::emergency::resolve_emergency,
        crate::routes::emergency::list_alerts,
        crate::routes::emergency::assess_patient_risk,
        // Executions
        crate::routes::executions::execute_directives,
        crate::routes::executions::list_executions,
        crate::routes::executions::get_execution,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::routes::directives::CreateDirectivesRequest,
        crate::routes::directives::CreateDirectivesResponse,
        crate::routes::directives::DirectiveListResponse,
        crate::routes::directives::ErasureResponse,
        crate::routes::directives::AuditTrailResponse,
        crate::routes::extract::ExtractRequest,
        crate::routes::emergency::ResolveRequest,
        crate::routes::emergency::AlertListResponse,
        crate::routes::emergency::RiskRequest,
        crate::routes::executions::DeathEventRequest,
        crate::routes::executions::ExecutionHistoryResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "directives", description = "Directive intake, administrative read, erasure and audit"),
        (name = "extraction", description = "Stateless directive extraction"),
        (name = "emergency", description = "Signed emergency resolution, hospital alerts and risk assessment"),
        (name = "executions", description = "Post-mortem directive execution"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

/// Serves the document at `/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
