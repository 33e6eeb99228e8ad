//! # Bearer Authentication
//!
//! Guards the `/v1` surface. Two token shapes are accepted:
//!
//! ```text
//! Bearer {accessor}:{secret}   caller-named accessor, recorded in the audit log
//! Bearer {secret}              operator token, audited as `api:operator`
//! ```
//!
//! The accessor is split at the last `:` so accessors such as `hospital:H1`
//! keep their own separator. The middleware resolves a [`CallerIdentity`]
//! and handlers receive it through its `FromRequestParts` impl.

use axum::extract::{FromRequestParts, Request};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use medx_core::AccessorId;
use subtle::ConstantTimeEq;

use crate::error::{AppError, ErrorBody, ErrorDetail};

const OPERATOR_ACCESSOR: &str = "api:operator";
const UNAUTHENTICATED_ACCESSOR: &str = "api:unauthenticated";

/// Who made the request. Every audited store call uses this accessor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub accessor: AccessorId,
}

impl CallerIdentity {
    fn named(accessor: &str) -> Result<Self, AuthFailure> {
        AccessorId::new(accessor)
            .map(|accessor| Self { accessor })
            .map_err(|e| AuthFailure::InvalidAccessor(e.to_string()))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("request was not authenticated".into()))
    }
}

/// Expected bearer secret, carried as a request extension. `None`
/// disables authentication.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let token = self.token.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("AuthConfig").field("token", &token).finish()
    }
}

#[derive(Debug)]
enum AuthFailure {
    MissingHeader,
    WrongScheme,
    BadToken,
    InvalidAccessor(String),
}

impl AuthFailure {
    fn message(&self) -> String {
        match self {
            Self::MissingHeader => "missing authorization header".into(),
            Self::WrongScheme => "authorization header must use Bearer scheme".into(),
            Self::BadToken => "invalid bearer token".into(),
            Self::InvalidAccessor(reason) => format!("invalid accessor: {reason}"),
        }
    }
}

/// Compare secrets without an early exit on the first differing byte. A
/// length mismatch still performs one comparison.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let (p, e) = (provided.as_bytes(), expected.as_bytes());
    if p.len() == e.len() {
        p.ct_eq(e).into()
    } else {
        let _ = e.ct_eq(e);
        false
    }
}

/// Resolve the caller from a bearer token value.
fn parse_bearer_token(token: &str, secret: &str) -> Result<CallerIdentity, AuthFailure> {
    if constant_time_token_eq(token, secret) {
        return CallerIdentity::named(OPERATOR_ACCESSOR);
    }
    let (accessor, provided) = token
        .rsplit_once(':')
        .filter(|(accessor, _)| !accessor.is_empty())
        .ok_or(AuthFailure::BadToken)?;
    if !constant_time_token_eq(provided, secret) {
        return Err(AuthFailure::BadToken);
    }
    CallerIdentity::named(accessor)
}

fn authenticate(headers: &HeaderMap, config: Option<&AuthConfig>) -> Result<CallerIdentity, AuthFailure> {
    let Some(secret) = config.and_then(|c| c.token.as_deref()) else {
        return CallerIdentity::named(UNAUTHENTICATED_ACCESSOR);
    };
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthFailure::MissingHeader)?
        .to_str()
        .map_err(|_| AuthFailure::WrongScheme)?;
    let token = value.strip_prefix("Bearer ").ok_or(AuthFailure::WrongScheme)?;
    parse_bearer_token(token, secret)
}

/// Authenticate the request and attach its [`CallerIdentity`], or answer 401.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let config = request.extensions().get::<AuthConfig>().cloned();
    match authenticate(request.headers(), config.as_ref()) {
        Ok(identity) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        Err(failure) => {
            tracing::warn!(reason = %failure.message(), "request authentication failed");
            unauthorized(failure)
        }
    }
}

fn unauthorized(failure: AuthFailure) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".into(),
            message: failure.message(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}
